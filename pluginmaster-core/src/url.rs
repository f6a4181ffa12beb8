//! GitHub URL classification
//!
//! Recognizes the URL shapes that carry a repository ref or a release tag,
//! so they can be pinned to a point in time or sent through a mirror.
//! Classification is purely syntactic.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical host for raw file content
pub const RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

/// Canonical host for repositories and release downloads
pub const GITHUB_BASE: &str = "https://github.com";

static RAW_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://raw\.githubusercontent\.com/([^/]+)/([^/]+)/([^/]+)/(.*)$")
        .expect("raw content pattern is valid")
});

static GITHUB_RAW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://(?:www\.)?github\.com/([^/]+)/([^/]+)/raw/([^/]+)/(.*)$")
        .expect("github raw pattern is valid")
});

static RELEASE_ASSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://(?:www\.)?github\.com/([^/]+)/([^/]+)/releases/download/(.*)$")
        .expect("release asset pattern is valid")
});

static LATEST_RELEASE_ASSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://(?:www\.)?github\.com/([^/]+)/([^/]+)/releases/latest/download/(.*)$")
        .expect("latest release asset pattern is valid")
});

/// Provenance of a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubUrl {
    /// A file at a branch, tag or commit
    RawContent {
        owner: String,
        repo: String,
        reference: String,
        path: String,
    },
    /// A release asset at an explicit tag; `tailing` is `{tag}/{file}`
    ReleaseAsset {
        owner: String,
        repo: String,
        tailing: String,
    },
    /// A release asset of whatever release is currently the latest
    LatestReleaseAsset {
        owner: String,
        repo: String,
        tailing: String,
    },
    Unrecognized,
}

impl GitHubUrl {
    /// Classify a URL
    ///
    /// The dedicated raw-content host is tried before the `github.com/.../raw/`
    /// form. Patterns are anchored, so a URL already behind a mirror prefix is
    /// `Unrecognized`.
    pub fn classify(url: &str) -> GitHubUrl {
        if let Some(caps) = RAW_CONTENT
            .captures(url)
            .or_else(|| GITHUB_RAW.captures(url))
        {
            return GitHubUrl::RawContent {
                owner: caps[1].to_string(),
                repo: caps[2].to_string(),
                reference: caps[3].to_string(),
                path: caps[4].to_string(),
            };
        }

        if let Some(caps) = RELEASE_ASSET.captures(url) {
            return GitHubUrl::ReleaseAsset {
                owner: caps[1].to_string(),
                repo: caps[2].to_string(),
                tailing: caps[3].to_string(),
            };
        }

        if let Some(caps) = LATEST_RELEASE_ASSET.captures(url) {
            return GitHubUrl::LatestReleaseAsset {
                owner: caps[1].to_string(),
                repo: caps[2].to_string(),
                tailing: caps[3].to_string(),
            };
        }

        GitHubUrl::Unrecognized
    }

    /// Short name of the variant, for logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            GitHubUrl::RawContent { .. } => "raw-content",
            GitHubUrl::ReleaseAsset { .. } => "release-asset",
            GitHubUrl::LatestReleaseAsset { .. } => "latest-release-asset",
            GitHubUrl::Unrecognized => "unrecognized",
        }
    }

    /// Canonical upstream URL, or `None` for `Unrecognized`
    ///
    /// `github.com/.../raw/...` links are normalized to the raw-content host.
    pub fn canonical(&self) -> Option<String> {
        match self {
            GitHubUrl::RawContent {
                owner,
                repo,
                reference,
                path,
            } => Some(raw_content_url(owner, repo, reference, path)),
            GitHubUrl::ReleaseAsset {
                owner,
                repo,
                tailing,
            } => Some(format!(
                "{GITHUB_BASE}/{owner}/{repo}/releases/download/{tailing}"
            )),
            GitHubUrl::LatestReleaseAsset {
                owner,
                repo,
                tailing,
            } => Some(format!(
                "{GITHUB_BASE}/{owner}/{repo}/releases/latest/download/{tailing}"
            )),
            GitHubUrl::Unrecognized => None,
        }
    }
}

/// Raw file URL at a ref
pub fn raw_content_url(owner: &str, repo: &str, reference: &str, path: &str) -> String {
    format!("{RAW_CONTENT_BASE}/{owner}/{repo}/{reference}/{path}")
}

/// Release asset URL at a concrete tag
pub fn release_asset_url(owner: &str, repo: &str, tag: &str, tailing: &str) -> String {
    format!("{GITHUB_BASE}/{owner}/{repo}/releases/download/{tag}/{tailing}")
}

/// Send a URL through the mirror; unrecognized URLs are returned unchanged
pub fn proxy_url(url: &str, mirror: &str) -> String {
    match GitHubUrl::classify(url).canonical() {
        Some(canonical) => format!("{mirror}{canonical}"),
        None => url.to_string(),
    }
}
