//! One full run: fetch, filter, pin or store, then mirror
//!
//! ```text
//! sources ──fetch──▶ rules ──┬─ github-global ─▶ pin to cutoff ─┐
//!                            ├─ delay ─────────▶ store / load ──┤
//!                            └─ github-cn, direct ──────────────┤
//!                                                               ▼
//!                                           direct listing ─▶ to_proxy ─▶ proxied listing
//! ```

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::delay::DelayStore;
use crate::error::{Error, Result};
use crate::fetch::PagedFetch;
use crate::history::HistoryResolver;
use crate::manifest::Manifest;
use crate::repo::{fetch_manifests, RepoDescriptor, RepoSource};
use crate::rewrite::{to_date_before, to_proxy};
use crate::rules::apply_rules;
use crate::schedule::{plan_run, RunPlan};

/// Both listings produced by a run
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub plan: RunPlan,
    /// Listing with upstream URLs
    pub direct: Vec<Manifest>,
    /// Same listing with recognized URLs sent through the mirror
    pub proxied: Vec<Manifest>,
}

/// Wires the resolver and store for a config
pub struct Pipeline {
    config: Config,
    resolver: HistoryResolver,
    store: DelayStore,
}

impl Pipeline {
    pub fn new(config: Config, fetcher: Arc<dyn PagedFetch>) -> Self {
        let resolver = HistoryResolver::with_api_base(fetcher.clone(), &config.github.api_base);
        let store = DelayStore::new(fetcher, &config.store.dir, &config.store.base_url);
        Self {
            config,
            resolver,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &HistoryResolver {
        &self.resolver
    }

    /// Run against the clock value `now`
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunOutput> {
        let plan = plan_run(&self.config.versions, now)?;

        let cutoff = &plan.cutoff;
        let resolver = &self.resolver;
        let fetched = try_join_all(self.config.repos.iter().map(|descriptor| async move {
            let manifests = fetch_manifests(descriptor, Some(cutoff), resolver).await?;
            Ok::<_, Error>((descriptor, manifests))
        }))
        .await?;

        let processed = try_join_all(
            fetched
                .into_iter()
                .map(|(descriptor, manifests)| self.process_source(descriptor, manifests, &plan)),
        )
        .await?;

        let direct: Vec<Manifest> = processed.into_iter().flatten().collect();
        let proxied = to_proxy(&direct, &self.config.proxy.mirror);

        info!(
            "Built listing with {} plugins from {} sources",
            direct.len(),
            self.config.repos.len()
        );

        Ok(RunOutput {
            plan,
            direct,
            proxied,
        })
    }

    async fn process_source(
        &self,
        descriptor: &RepoDescriptor,
        manifests: Vec<Manifest>,
        plan: &RunPlan,
    ) -> Result<Vec<Manifest>> {
        let label = descriptor.label();
        let manifests = apply_rules(&label, manifests, &descriptor.rules)?;

        match &descriptor.source {
            RepoSource::GithubGlobal { .. } => to_date_before(&manifests, &plan.cutoff, &self.resolver)
                .await
                .inspect_err(|e| error!("Failed to get old versions for {}: {}", label, e)),
            RepoSource::Delay { key, .. } => {
                if plan.cn_is_current {
                    self.store.store_manifests(key, manifests).await
                } else {
                    self.store.load_stored(key).await
                }
            }
            RepoSource::GithubCn { .. } | RepoSource::Direct { .. } => Ok(manifests),
        }
    }
}
