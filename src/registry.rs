//! Boundary to the managed content store.
//!
//! Importers hand over a file path, a destination asset path and an overwrite
//! policy; the registry tracks each asset by path. [`ManifestRegistry`] keeps
//! that index as a JSON manifest inside the content store.

use crate::error::{GensysError, Result};
use crate::model::CONTENT_FOLDER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MANIFEST_FILE_NAME: &str = "assets.json";

/// How a registration treats an asset that already exists at the same path.
/// Existing assets are always replaced; registrations never prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPolicy {
    /// Drop settings attached to the previous asset instead of carrying them over.
    pub replace_existing_settings: bool,
    /// Persist the registry as part of the registration.
    pub save: bool,
}

impl ImportPolicy {
    /// Policy used for generated rasters.
    pub const OVERWRITE: ImportPolicy = ImportPolicy {
        replace_existing_settings: true,
        save: true,
    };
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self::OVERWRITE
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    pub source: &'a Path,
    pub asset_path: &'a str,
    pub policy: ImportPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_path: String,
    pub source: PathBuf,
    pub imported_at: String,
    /// Per-asset settings edited inside the store, if any.
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

pub trait AssetRegistry: Send + Sync {
    /// Register `request.source` under `request.asset_path`, synchronously.
    fn register(&self, request: &ImportRequest<'_>) -> Result<AssetRecord>;
}

pub struct ManifestRegistry {
    manifest_path: PathBuf,
    entries: Mutex<BTreeMap<String, AssetRecord>>,
}

impl ManifestRegistry {
    /// Open the registry of `content_dir`, loading an existing manifest if there is one.
    pub fn open(content_dir: &Path) -> Result<Self> {
        let manifest_path = content_dir.join(CONTENT_FOLDER).join(MANIFEST_FILE_NAME);
        let entries = if manifest_path.is_file() {
            let text = std::fs::read_to_string(&manifest_path)
                .map_err(|e| GensysError::io(&manifest_path, e))?;
            serde_json::from_str(&text).map_err(|e| GensysError::json(&manifest_path, e))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            manifest_path,
            entries: Mutex::new(entries),
        })
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn get(&self, asset_path: &str) -> Option<AssetRecord> {
        self.entries.lock().ok()?.get(asset_path).cloned()
    }

    pub fn asset_paths(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Write the manifest to disk.
    pub fn save(&self) -> Result<()> {
        let entries = self.lock()?;
        self.write(&entries)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, AssetRecord>>> {
        self.entries
            .lock()
            .map_err(|_| GensysError::AssetRegistrationUnavailable("registry lock poisoned".into()))
    }

    fn write(&self, entries: &BTreeMap<String, AssetRecord>) -> Result<()> {
        if let Some(parent) = self.manifest_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GensysError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| GensysError::json(&self.manifest_path, e))?;
        std::fs::write(&self.manifest_path, json)
            .map_err(|e| GensysError::io(&self.manifest_path, e))
    }
}

impl AssetRegistry for ManifestRegistry {
    fn register(&self, request: &ImportRequest<'_>) -> Result<AssetRecord> {
        if !request.source.is_file() {
            return Err(GensysError::io(
                request.source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "asset source missing"),
            ));
        }

        let mut entries = self.lock()?;
        let settings = match entries.get(request.asset_path) {
            Some(prev) if !request.policy.replace_existing_settings => prev.settings.clone(),
            _ => BTreeMap::new(),
        };
        let record = AssetRecord {
            asset_path: request.asset_path.to_string(),
            source: request.source.to_path_buf(),
            imported_at: crate::storage::now_rfc3339(),
            settings,
        };
        entries.insert(record.asset_path.clone(), record.clone());

        if request.policy.save {
            self.write(&entries)?;
        }
        log::debug!("Registered {}", record.asset_path);
        Ok(record)
    }
}
