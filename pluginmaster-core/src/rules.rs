//! Per-source include / exclude / modifier rules
//!
//! Predicates only look at the identity fields (`Name`, `InternalName`,
//! `Author`). An unset predicate field matches anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::{Manifest, ManifestPatch};

/// Partial record over the identity fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ManifestMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ManifestMatch {
    /// Predicate on `Name` only
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, manifest: &Manifest) -> bool {
        fn field_matches(expected: &Option<String>, actual: &Option<String>) -> bool {
            match expected {
                None => true,
                Some(expected) => actual.as_ref() == Some(expected),
            }
        }

        field_matches(&self.name, &manifest.name)
            && field_matches(&self.internal_name, &manifest.internal_name)
            && field_matches(&self.author, &manifest.author)
    }
}

impl fmt::Display for ManifestMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(format!("Name={name:?}"));
        }
        if let Some(internal_name) = &self.internal_name {
            parts.push(format!("InternalName={internal_name:?}"));
        }
        if let Some(author) = &self.author {
            parts.push(format!("Author={author:?}"));
        }
        if parts.is_empty() {
            write!(f, "{{*}}")
        } else {
            write!(f, "{{{}}}", parts.join(", "))
        }
    }
}

/// Predicate plus the patch to merge when it matches
pub type ModifierRule = (ManifestMatch, ManifestPatch);

/// Rules attached to one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<ManifestMatch>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<ManifestMatch>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Vec<ModifierRule>>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none() && self.modifier.is_none()
    }
}

/// Filter and patch the manifests of one source
///
/// `include` is checked first: every include predicate must match at least
/// one fetched manifest, otherwise the source has renamed or dropped a
/// plugin we ship and the whole source is rejected.
pub fn apply_rules(
    source_label: &str,
    manifests: Vec<Manifest>,
    rules: &RuleSet,
) -> Result<Vec<Manifest>> {
    let mut result = manifests;

    if let Some(include) = &rules.include {
        if let Some(unmatched) = include
            .iter()
            .find(|m| !result.iter().any(|manifest| m.matches(manifest)))
        {
            return Err(Error::configuration(
                source_label,
                format!("include rule {unmatched} matched no plugin"),
            ));
        }
        result.retain(|manifest| include.iter().any(|m| m.matches(manifest)));
    }

    if let Some(exclude) = &rules.exclude {
        result.retain(|manifest| !exclude.iter().any(|m| m.matches(manifest)));
    }

    if let Some(modifier) = &rules.modifier {
        result = result
            .into_iter()
            .map(|manifest| {
                modifier
                    .iter()
                    .filter(|(m, _)| m.matches(&manifest))
                    .fold(manifest.clone(), |acc, (_, patch)| acc.apply_patch(patch))
            })
            .collect();
    }

    debug!("{}: {} plugins after rules", source_label, result.len());
    Ok(result)
}
