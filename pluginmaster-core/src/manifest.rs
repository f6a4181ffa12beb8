//! Plugin manifest records (one entry of a pluginmaster listing)
//!
//! Only the identity fields and the URL-bearing fields are modelled. Every
//! other key is kept in `extra`. A parsed record is written back with its
//! keys in their original order, and a modelled key that was `null` stays
//! `null` rather than disappearing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One plugin's listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Manifest {
    pub name: Option<String>,
    pub internal_name: Option<String>,
    pub author: Option<String>,
    pub download_link_install: Option<String>,
    pub download_link_update: Option<String>,
    pub download_link_testing: Option<String>,
    pub icon_url: Option<String>,
    pub image_urls: Option<Vec<String>>,

    /// Everything else (version numbers, API level, changelog, ...)
    pub extra: Map<String, Value>,

    /// Keys of the parsed record, in order
    ///
    /// Listed modelled keys that are unset serialize as `null`. Keys set
    /// later and not listed here are appended after the listed ones.
    pub key_order: Vec<String>,
}

impl TryFrom<Map<String, Value>> for Manifest {
    type Error = serde_json::Error;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut manifest = Manifest {
            key_order: map.keys().cloned().collect(),
            ..Default::default()
        };

        for (key, value) in map {
            match key.as_str() {
                "Name" => manifest.name = serde_json::from_value(value)?,
                "InternalName" => manifest.internal_name = serde_json::from_value(value)?,
                "Author" => manifest.author = serde_json::from_value(value)?,
                "DownloadLinkInstall" => {
                    manifest.download_link_install = serde_json::from_value(value)?
                }
                "DownloadLinkUpdate" => manifest.download_link_update = serde_json::from_value(value)?,
                "DownloadLinkTesting" => {
                    manifest.download_link_testing = serde_json::from_value(value)?
                }
                "IconUrl" => manifest.icon_url = serde_json::from_value(value)?,
                "ImageUrls" => manifest.image_urls = serde_json::from_value(value)?,
                _ => {
                    manifest.extra.insert(key, value);
                }
            }
        }

        Ok(manifest)
    }
}

impl From<Manifest> for Map<String, Value> {
    fn from(manifest: Manifest) -> Self {
        let Manifest {
            name,
            internal_name,
            author,
            download_link_install,
            download_link_update,
            download_link_testing,
            icon_url,
            image_urls,
            extra,
            key_order,
        } = manifest;

        let modelled: [(&str, Option<Value>); 8] = [
            ("Name", name.map(Value::from)),
            ("InternalName", internal_name.map(Value::from)),
            ("Author", author.map(Value::from)),
            ("DownloadLinkInstall", download_link_install.map(Value::from)),
            ("DownloadLinkUpdate", download_link_update.map(Value::from)),
            ("DownloadLinkTesting", download_link_testing.map(Value::from)),
            ("IconUrl", icon_url.map(Value::from)),
            ("ImageUrls", image_urls.map(Value::from)),
        ];

        let mut out = Map::new();
        for key in &key_order {
            if let Some((_, value)) = modelled.iter().find(|(k, _)| *k == key.as_str()) {
                out.insert(key.clone(), value.clone().unwrap_or(Value::Null));
            } else if let Some(value) = extra.get(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in modelled {
            if let Some(value) = value {
                if !out.contains_key(key) {
                    out.insert(key.to_string(), value);
                }
            }
        }
        for (key, value) in extra {
            if !out.contains_key(&key) {
                out.insert(key, value);
            }
        }
        out
    }
}

/// Partial manifest merged over a matching manifest by a modifier rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link_install: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link_update: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link_testing: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which download link of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Install,
    Update,
    Testing,
}

impl DownloadKind {
    pub const ALL: [DownloadKind; 3] = [
        DownloadKind::Install,
        DownloadKind::Update,
        DownloadKind::Testing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Install => "Install",
            DownloadKind::Update => "Update",
            DownloadKind::Testing => "Testing",
        }
    }
}

impl Manifest {
    /// Display name used in log lines
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.internal_name.as_deref())
            .unwrap_or("<unnamed>")
    }

    pub fn download_link(&self, kind: DownloadKind) -> Option<&str> {
        match kind {
            DownloadKind::Install => self.download_link_install.as_deref(),
            DownloadKind::Update => self.download_link_update.as_deref(),
            DownloadKind::Testing => self.download_link_testing.as_deref(),
        }
    }

    pub fn set_download_link(&mut self, kind: DownloadKind, url: String) {
        let slot = match kind {
            DownloadKind::Install => &mut self.download_link_install,
            DownloadKind::Update => &mut self.download_link_update,
            DownloadKind::Testing => &mut self.download_link_testing,
        };
        *slot = Some(url);
    }

    /// Return a copy with every URL-bearing field passed through `f`
    pub fn map_urls(&self, mut f: impl FnMut(&str) -> String) -> Manifest {
        let mut out = self.clone();
        for link in [
            &mut out.download_link_install,
            &mut out.download_link_update,
            &mut out.download_link_testing,
            &mut out.icon_url,
        ] {
            if let Some(url) = link.as_mut() {
                *url = f(url);
            }
        }
        if let Some(images) = out.image_urls.as_mut() {
            for url in images.iter_mut() {
                *url = f(url);
            }
        }
        out
    }

    /// Every URL-bearing field value, in field order
    pub fn urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = [
            &self.download_link_install,
            &self.download_link_update,
            &self.download_link_testing,
            &self.icon_url,
        ]
        .into_iter()
        .filter_map(|u| u.as_deref())
        .collect();
        if let Some(images) = &self.image_urls {
            urls.extend(images.iter().map(String::as_str));
        }
        urls
    }

    /// Merge a patch over this manifest; fields carried by the patch win
    pub fn apply_patch(&self, patch: &ManifestPatch) -> Manifest {
        fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        let mut out = self.clone();
        overlay(&mut out.name, &patch.name);
        overlay(&mut out.internal_name, &patch.internal_name);
        overlay(&mut out.author, &patch.author);
        overlay(&mut out.download_link_install, &patch.download_link_install);
        overlay(&mut out.download_link_update, &patch.download_link_update);
        overlay(&mut out.download_link_testing, &patch.download_link_testing);
        overlay(&mut out.icon_url, &patch.icon_url);
        overlay(&mut out.image_urls, &patch.image_urls);
        for (key, value) in &patch.extra {
            out.extra.insert(key.clone(), value.clone());
        }
        out
    }
}

/// Parse a listing body into manifests
pub fn parse_listing(value: Value) -> Result<Vec<Manifest>, serde_json::Error> {
    serde_json::from_value(value)
}
