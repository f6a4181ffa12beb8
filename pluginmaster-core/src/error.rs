//! Error types for manifest processing and history resolution
//!
//! Every failure is fail-fast: nothing in the core retries, and transport
//! errors from the injected fetcher are propagated unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by a [`PagedFetch`](crate::fetch::PagedFetch) implementation
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The upstream answered with a non-success status
    #[error("Request to {url} failed: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body was not valid JSON
    #[error("Response from {url} is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Core error taxonomy
#[derive(Error, Debug)]
pub enum Error {
    /// Rules or run configuration do not fit the fetched data
    #[error("Configuration error in {source_label}: {message}")]
    Configuration {
        source_label: String,
        message: String,
    },

    /// No qualifying commit or release exists before the cutoff
    #[error("Failing to fetch {kind} of {owner}/{repo} before {cutoff}")]
    Resolution {
        kind: &'static str,
        owner: String,
        repo: String,
        cutoff: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Upstream JSON did not have the expected shape
    #[error("Unexpected payload from {url}")]
    Payload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn configuration(source_label: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            source_label: source_label.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the network rather than from our own checks
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
