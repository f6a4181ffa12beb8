//! End-to-end behaviour of rules and URL rewriting over manifest lists

mod common;

use chrono::{DateTime, Utc};
use common::{commits_url, init_test_logging, release, releases_url, CountingFetch};
use pluginmaster_core::history::HistoryResolver;
use pluginmaster_core::rewrite::{to_date_before, to_proxy, DEFAULT_MIRROR};
use pluginmaster_core::rules::{apply_rules, ManifestMatch, RuleSet};
use pluginmaster_core::{Error, Manifest, ManifestPatch};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const CUTOFF: &str = "2024-06-28T08:00:00Z";

fn cutoff() -> DateTime<Utc> {
    CUTOFF.parse().unwrap()
}

fn named(name: &str) -> Manifest {
    Manifest {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_raw_content_pinned_to_commit() {
    init_test_logging();
    let fetch = Arc::new(
        CountingFetch::new().with_json(&commits_url("o", "r", "main", CUTOFF), json!([{"sha": "abc123"}])),
    );
    let resolver = HistoryResolver::new(fetch);

    let manifest = Manifest {
        download_link_install: Some("https://raw.githubusercontent.com/o/r/main/x.zip".to_string()),
        ..named("A")
    };

    let out = to_date_before(&[manifest], &cutoff(), &resolver).await.unwrap();
    assert_eq!(
        out[0].download_link_install.as_deref(),
        Some("https://raw.githubusercontent.com/o/r/abc123/x.zip")
    );
    assert_eq!(out[0].name.as_deref(), Some("A"));
}

#[test]
fn test_include_rule_filters_or_fails() {
    let rules = RuleSet {
        include: Some(vec![ManifestMatch::name("A")]),
        ..Default::default()
    };

    let out = apply_rules("src", vec![named("A"), named("B")], &rules).unwrap();
    assert_eq!(out, vec![named("A")]);

    let err = apply_rules("src", vec![named("B")], &rules).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn test_modifier_overrides_author() {
    let rules = RuleSet {
        modifier: Some(vec![(
            ManifestMatch::name("A"),
            ManifestPatch {
                author: Some("X".to_string()),
                ..Default::default()
            },
        )]),
        ..Default::default()
    };
    let input = Manifest {
        author: Some("Y".to_string()),
        ..named("A")
    };

    let out = apply_rules("src", vec![input], &rules).unwrap();
    assert_eq!(
        out,
        vec![Manifest {
            author: Some("X".to_string()),
            ..named("A")
        }]
    );
}

#[test]
fn test_proxy_leaves_unrecognized_url() {
    let manifest = Manifest {
        download_link_install: Some("https://example.com/x.zip".to_string()),
        ..named("A")
    };
    let out = to_proxy(&[manifest.clone()], DEFAULT_MIRROR);
    assert_eq!(out, vec![manifest]);
}

#[test]
fn test_filtering_only_narrows() {
    let input = vec![named("A"), named("B"), named("C")];
    let include_only = RuleSet {
        include: Some(vec![ManifestMatch::name("A"), ManifestMatch::name("B")]),
        ..Default::default()
    };
    let with_exclude = RuleSet {
        exclude: Some(vec![ManifestMatch::name("B")]),
        ..include_only.clone()
    };

    let included = apply_rules("src", input.clone(), &include_only).unwrap();
    let narrowed = apply_rules("src", input, &with_exclude).unwrap();

    assert!(narrowed.iter().all(|m| included.contains(m)));
    assert_eq!(narrowed, vec![named("A")]);
}

#[tokio::test]
async fn test_shared_repo_resolved_once_across_manifests() {
    init_test_logging();
    let commits = commits_url("o", "r", "main", CUTOFF);
    let fetch = Arc::new(
        CountingFetch::new()
            .with_json(&commits, json!([{"sha": "abc123"}]))
            .with_json(
                &releases_url("o", "r", 1),
                json!([release("v1", None, "2024-01-01T00:00:00Z")]),
            ),
    );
    let resolver = HistoryResolver::new(fetch.clone());

    let manifests: Vec<Manifest> = ["A", "B", "C"]
        .iter()
        .map(|name| Manifest {
            download_link_install: Some(format!("https://raw.githubusercontent.com/o/r/main/{name}.zip")),
            download_link_update: Some(format!("https://github.com/o/r/releases/latest/download/{name}.zip")),
            ..named(name)
        })
        .collect();

    // Sequential rewrites share the cache deterministically
    for manifest in &manifests {
        to_date_before(std::slice::from_ref(manifest), &cutoff(), &resolver)
            .await
            .unwrap();
    }
    assert_eq!(fetch.count(&commits), 1);
    assert_eq!(fetch.count(&releases_url("o", "r", 1)), 1);

    // The cache now answers a concurrent fan-out without new requests
    let out = to_date_before(&manifests, &cutoff(), &resolver).await.unwrap();
    assert_eq!(fetch.calls().len(), 2);
    assert_eq!(
        out[2].download_link_update.as_deref(),
        Some("https://github.com/o/r/releases/download/v1/C.zip")
    );
}

#[tokio::test]
async fn test_resolution_failure_propagates() {
    init_test_logging();
    let fetch = Arc::new(
        CountingFetch::new().with_json(&commits_url("o", "r", "gone", CUTOFF), json!([])),
    );
    let resolver = HistoryResolver::new(fetch);

    let manifest = Manifest {
        download_link_install: Some("https://github.com/o/r/raw/gone/x.zip".to_string()),
        ..named("A")
    };

    let err = to_date_before(&[manifest], &cutoff(), &resolver).await.unwrap_err();
    assert!(matches!(err, Error::Resolution { kind: "commit", .. }));
}

#[tokio::test]
async fn test_transport_failure_propagates_unchanged() {
    init_test_logging();
    let resolver = HistoryResolver::new(Arc::new(CountingFetch::new()));

    let manifest = Manifest {
        download_link_install: Some("https://raw.githubusercontent.com/o/r/main/x.zip".to_string()),
        ..named("A")
    };

    let err = to_date_before(&[manifest], &cutoff(), &resolver).await.unwrap_err();
    match err {
        Error::Transport(pluginmaster_core::TransportError::Status { status, .. }) => {
            assert_eq!(status, 404)
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
