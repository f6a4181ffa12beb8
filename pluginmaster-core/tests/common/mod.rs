//! Test helpers shared by the integration tests
//!
//! Pulled in with `mod common;` from each test file, so not every helper is
//! used by every test binary.
#![allow(dead_code)]

use async_trait::async_trait;
use pluginmaster_core::fetch::PagedFetch;
use pluginmaster_core::TransportError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, Once};

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Fetcher serving canned responses by exact URL and counting requests
///
/// Unknown URLs answer with HTTP 404.
#[derive(Default)]
pub struct CountingFetch {
    json: HashMap<String, Value>,
    bytes: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl CountingFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, url: &str, body: Value) -> Self {
        self.json.insert(url.to_string(), body);
        self
    }

    pub fn with_bytes(mut self, url: &str, body: &[u8]) -> Self {
        self.bytes.insert(url.to_string(), body.to_vec());
        self
    }

    /// Every requested URL, in request order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times `url` was requested
    pub fn count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn record(&self, url: &str) {
        self.calls.lock().unwrap().push(url.to_string());
    }

    fn not_found(url: &str) -> TransportError {
        TransportError::Status {
            url: url.to_string(),
            status: 404,
        }
    }
}

#[async_trait]
impl PagedFetch for CountingFetch {
    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        self.record(url);
        // Yield so concurrent callers interleave the way real requests do
        tokio::task::yield_now().await;
        self.json.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.record(url);
        tokio::task::yield_now().await;
        self.bytes.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }
}

pub const API: &str = "https://api.github.com";

/// URL of the single-commit history query for a branch and cutoff
pub fn commits_url(owner: &str, repo: &str, branch: &str, cutoff: &str) -> String {
    format!("{API}/repos/{owner}/{repo}/commits?sha={branch}&until={cutoff}&per_page=1")
}

/// URL of one page of the release listing
pub fn releases_url(owner: &str, repo: &str, page: u32) -> String {
    format!("{API}/repos/{owner}/{repo}/releases?page={page}")
}

/// Release entry as the API returns it
pub fn release(tag: &str, published_at: Option<&str>, created_at: &str) -> Value {
    serde_json::json!({
        "tag_name": tag,
        "published_at": published_at,
        "created_at": created_at,
        "draft": published_at.is_none(),
    })
}
