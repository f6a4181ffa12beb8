//! Local store for sources that cannot be pinned by history
//!
//! While both regions run the same version, the binaries of a delay source
//! are downloaded into `{dir}/{key}/` and a listing pointing at the published
//! copies is written next to them. Once the global client moves ahead, the
//! stored listing is served instead of the live one.
//!
//! ```text
//! {dir}/{key}/
//!     ├── pluginmaster.json
//!     ├── {InternalName}_Install.zip
//!     ├── {InternalName}_Update.zip
//!     └── {InternalName}_Testing.zip
//! ```

use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fetch::PagedFetch;
use crate::manifest::{DownloadKind, Manifest};

/// Name of the stored listing inside each key directory
pub const STORED_MANIFEST: &str = "pluginmaster.json";

/// Delay store rooted at a directory, published under a base URL
pub struct DelayStore {
    fetcher: Arc<dyn PagedFetch>,
    dir: PathBuf,
    base_url: String,
}

impl DelayStore {
    pub fn new(fetcher: Arc<dyn PagedFetch>, dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            fetcher,
            dir: dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn key_dir(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn file_name(manifest: &Manifest, kind: DownloadKind) -> String {
        let internal_name = manifest
            .internal_name
            .as_deref()
            .unwrap_or_else(|| manifest.display_name());
        format!("{internal_name}_{}.zip", kind.as_str())
    }

    async fn store_link(
        &self,
        key: &str,
        root: &Path,
        manifest: &Manifest,
        kind: DownloadKind,
        link: &str,
    ) -> Result<(DownloadKind, String)> {
        let bytes = self.fetcher.get_bytes(link).await?;
        let file_name = Self::file_name(manifest, kind);
        let path = root.join(&file_name);

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::io(&path, e))?;
        debug!("Stored {} ({} bytes)", path.display(), bytes.len());

        Ok((kind, format!("{}/{key}/{file_name}", self.base_url)))
    }

    async fn store_plugin(&self, key: &str, root: &Path, manifest: &Manifest) -> Result<Manifest> {
        let stored = try_join_all(DownloadKind::ALL.into_iter().filter_map(|kind| {
            manifest
                .download_link(kind)
                .map(|link| self.store_link(key, root, manifest, kind, link))
        }))
        .await?;

        let mut out = manifest.clone();
        for (kind, url) in stored {
            out.set_download_link(kind, url);
        }
        Ok(out)
    }

    /// Download every binary of `manifests` and write the stored listing
    ///
    /// Returns the manifests unchanged; the rewritten copy only exists on disk.
    pub async fn store_manifests(&self, key: &str, manifests: Vec<Manifest>) -> Result<Vec<Manifest>> {
        let root = self.key_dir(key);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::io(&root, e))?;

        let stored = try_join_all(
            manifests
                .iter()
                .map(|manifest| self.store_plugin(key, &root, manifest)),
        )
        .await?;

        let manifest_path = root.join(STORED_MANIFEST);
        let content = to_pretty_json(&stored).map_err(|source| Error::Payload {
            url: manifest_path.display().to_string(),
            source,
        })?;
        tokio::fs::write(&manifest_path, content)
            .await
            .map_err(|e| Error::io(&manifest_path, e))?;

        info!("Stored {} plugins for '{}'", stored.len(), key);
        Ok(manifests)
    }

    /// Read the stored listing of `key`
    pub async fn load_stored(&self, key: &str) -> Result<Vec<Manifest>> {
        let manifest_path = self.key_dir(key).join(STORED_MANIFEST);
        let content = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| Error::io(&manifest_path, e))?;

        let manifests: Vec<Manifest> =
            serde_json::from_str(&content).map_err(|source| Error::Payload {
                url: manifest_path.display().to_string(),
                source,
            })?;

        info!("Loaded {} stored plugins for '{}'", manifests.len(), key);
        Ok(manifests)
    }
}

/// Pretty JSON with 4-space indentation, as published listings use
pub fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
