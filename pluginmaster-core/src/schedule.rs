//! Version thresholds and cutoff selection
//!
//! The CN client receives each platform version weeks or months after the
//! global one. While it lags, global-only listings are served as they were
//! just before the global release of the version CN has not reached yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::history::format_cutoff;

/// One platform version and its release instant in each region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub global: DateTime<Utc>,
    /// Unset until the CN release date is announced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<DateTime<Utc>>,
}

/// Decision for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Version the CN client is running
    pub cn_version: String,
    /// Point in time global-only sources are pinned to
    pub cutoff: DateTime<Utc>,
    /// Both regions run the same version
    pub cn_is_current: bool,
}

/// Pick the cutoff for a run
///
/// `versions` is ordered newest first. The CN version is the newest entry
/// whose CN date has passed. If a newer global version exists and has been
/// released, the cutoff is that release's instant; otherwise it is `now`.
pub fn plan_run(versions: &[VersionInfo], now: DateTime<Utc>) -> Result<RunPlan> {
    let cn_index = versions
        .iter()
        .position(|v| v.cn.is_some_and(|cn| now >= cn))
        .ok_or_else(|| Error::configuration("versions", "Unknown CN version"))?;

    let cutoff = match cn_index.checked_sub(1).map(|i| &versions[i]) {
        Some(next) if now >= next.global => next.global,
        _ => now,
    };

    let plan = RunPlan {
        cn_version: versions[cn_index].version.clone(),
        cutoff,
        cn_is_current: cn_index == 0,
    };

    info!(
        "CN client on {} (current: {}), cutoff {}",
        plan.cn_version,
        plan.cn_is_current,
        format_cutoff(&plan.cutoff)
    );
    Ok(plan)
}
