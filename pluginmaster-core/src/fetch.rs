//! Fetch capability - abstraction over the HTTP transport
//!
//! The resolver, the source fetcher and the delay store only ever talk to
//! the network through this trait:
//! - `GitHubFetcher` (reqwest, behind the `http` feature)
//! - call-counting stubs (tests)

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// Trait for retrieving one page of JSON, or one binary, from a URL
///
/// Implementations own authentication, headers and timeouts. Errors are
/// propagated by the core unchanged.
#[async_trait]
pub trait PagedFetch: Send + Sync {
    /// GET a URL and parse the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value, TransportError>;

    /// GET a URL and return the raw body
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

#[cfg(feature = "http")]
pub use self::http::{GitHubFetcher, GitHubFetcherConfig};

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use tracing::{debug, warn};

    use super::PagedFetch;
    use crate::error::TransportError;

    /// Settings for [`GitHubFetcher`]
    #[derive(Debug, Clone)]
    pub struct GitHubFetcherConfig {
        /// REST API base, e.g. `https://api.github.com`
        pub api_base: String,
        /// Token sent to the API base only
        pub token: Option<String>,
        pub timeout: Duration,
    }

    /// reqwest-backed fetcher for the GitHub REST API and plain HTTP sources
    pub struct GitHubFetcher {
        client: reqwest::Client,
        config: GitHubFetcherConfig,
        api_base: reqwest::Url,
    }

    impl GitHubFetcher {
        pub fn new(config: GitHubFetcherConfig) -> Result<Self, TransportError> {
            let api_base =
                reqwest::Url::parse(&config.api_base).map_err(|e| TransportError::Request {
                    url: config.api_base.clone(),
                    message: format!("Invalid API base: {e}"),
                })?;

            let client = reqwest::Client::builder()
                .user_agent(concat!("pluginmaster/", env!("CARGO_PKG_VERSION")))
                .timeout(config.timeout)
                .build()
                .map_err(|e| TransportError::Request {
                    url: config.api_base.clone(),
                    message: format!("Failed to create HTTP client: {e}"),
                })?;

            if config.token.is_none() {
                warn!("No GitHub token configured; API requests are subject to anonymous rate limits");
            }

            Ok(Self {
                client,
                config,
                api_base,
            })
        }

        /// Whether `url` lives under the API base
        ///
        /// Scheme, host and port must match exactly and the path must sit
        /// below the base path on a segment boundary. Only such requests
        /// carry the token.
        fn is_api(&self, url: &str) -> bool {
            let Ok(target) = reqwest::Url::parse(url) else {
                return false;
            };

            if target.scheme() != self.api_base.scheme()
                || target.host_str() != self.api_base.host_str()
                || target.port_or_known_default() != self.api_base.port_or_known_default()
                || !target.username().is_empty()
                || target.password().is_some()
            {
                return false;
            }

            let base_path = self.api_base.path().trim_end_matches('/');
            let path = target.path();
            base_path.is_empty()
                || path == base_path
                || path
                    .strip_prefix(base_path)
                    .is_some_and(|rest| rest.starts_with('/'))
        }

        async fn send(&self, url: &str) -> Result<reqwest::Response, TransportError> {
            let mut request = self.client.get(url);

            if self.is_api(url) {
                request = request.header("Accept", "application/vnd.github+json");
                if let Some(token) = &self.config.token {
                    request = request.header("Authorization", format!("Bearer {token}"));
                }
            }

            debug!("GET {}", url);
            let response = request.send().await.map_err(|e| TransportError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            if !response.status().is_success() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }

            Ok(response)
        }
    }

    #[async_trait]
    impl PagedFetch for GitHubFetcher {
        async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
            let body = self
                .send(url)
                .await?
                .bytes()
                .await
                .map_err(|e| TransportError::Request {
                    url: url.to_string(),
                    message: format!("Failed to read response body: {e}"),
                })?;

            serde_json::from_slice(&body).map_err(|source| TransportError::Decode {
                url: url.to_string(),
                source,
            })
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            let body = self
                .send(url)
                .await?
                .bytes()
                .await
                .map_err(|e| TransportError::Request {
                    url: url.to_string(),
                    message: format!("Failed to read response body: {e}"),
                })?;
            Ok(body.to_vec())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn fetcher(token: Option<&str>) -> GitHubFetcher {
            fetcher_at("https://api.github.com", token)
        }

        fn fetcher_at(api_base: &str, token: Option<&str>) -> GitHubFetcher {
            GitHubFetcher::new(GitHubFetcherConfig {
                api_base: api_base.to_string(),
                token: token.map(str::to_string),
                timeout: Duration::from_secs(5),
            })
            .unwrap()
        }

        #[test]
        fn test_only_api_base_is_authenticated() {
            let f = fetcher(Some("t"));
            assert!(f.is_api("https://api.github.com/repos/o/r/commits"));
            assert!(!f.is_api("https://raw.githubusercontent.com/o/r/main/x.json"));
        }

        #[test]
        fn test_lookalike_hosts_are_not_authenticated() {
            let f = fetcher(Some("t"));
            assert!(!f.is_api("https://api.github.com.evil.example/x.zip"));
            assert!(!f.is_api("https://api.github.com@evil.example/x.zip"));
            assert!(!f.is_api("https://user@api.github.com/repos/o/r"));
            assert!(!f.is_api("http://api.github.com/repos/o/r"));
            assert!(!f.is_api("https://api.github.com:8443/repos/o/r"));
            assert!(f.is_api("https://api.github.com:443/repos/o/r"));
            assert!(!f.is_api("not a url"));
        }

        #[test]
        fn test_enterprise_base_path_matches_on_segment_boundary() {
            let f = fetcher_at("https://ghe.example.com/api/v3/", Some("t"));
            assert!(f.is_api("https://ghe.example.com/api/v3/repos/o/r/releases?page=1"));
            assert!(f.is_api("https://ghe.example.com/api/v3"));
            assert!(!f.is_api("https://ghe.example.com/api/v3x/repos/o/r"));
            assert!(!f.is_api("https://ghe.example.com/raw/o/r/main/x.zip"));
        }

        #[test]
        fn test_invalid_api_base_rejected() {
            let result = GitHubFetcher::new(GitHubFetcherConfig {
                api_base: "api.github.com".to_string(),
                token: None,
                timeout: Duration::from_secs(5),
            });
            assert!(matches!(result, Err(TransportError::Request { .. })));
        }
    }
}
