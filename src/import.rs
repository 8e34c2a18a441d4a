//! Brings the generator's rasters into the managed content store.
//!
//! Each artifact is handled on its own: a missing file or a failed
//! registration is recorded and the remaining artifacts still go through.

use crate::error::GensysError;
use crate::model::{
    ArtifactFailure, ArtifactKind, ImportSummary, ImportedAsset, InstallLocation, RunEvent,
    CONTENT_FOLDER,
};
use crate::registry::{AssetRegistry, ImportPolicy, ImportRequest};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// Asset path of `kind` for a run named `identifier`, e.g. `Gensys/valley01/TerrainMap`.
pub fn asset_path(identifier: &str, kind: ArtifactKind) -> String {
    format!("{CONTENT_FOLDER}/{identifier}/{}", kind.asset_name())
}

pub struct ResultImporter<'a> {
    content_dir: &'a Path,
    registry: Option<&'a dyn AssetRegistry>,
    policy: ImportPolicy,
}

impl<'a> ResultImporter<'a> {
    pub fn new(content_dir: &'a Path, registry: Option<&'a dyn AssetRegistry>) -> Self {
        Self {
            content_dir,
            registry,
            policy: ImportPolicy::OVERWRITE,
        }
    }

    pub fn with_policy(mut self, policy: ImportPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn destination(&self, identifier: &str) -> PathBuf {
        self.content_dir.join(CONTENT_FOLDER).join(identifier)
    }

    /// Copy every artifact present in the tool's working directory into
    /// `Gensys/<identifier>/` and register it. Originals are left in place.
    pub fn import(
        &self,
        location: &InstallLocation,
        identifier: &str,
        event_tx: &UnboundedSender<RunEvent>,
    ) -> ImportSummary {
        let destination = self.destination(identifier);
        let mut summary = ImportSummary {
            destination: destination.clone(),
            ..Default::default()
        };

        if let Err(e) = std::fs::create_dir_all(&destination) {
            // Copies below will fail individually and be reported per artifact.
            log::warn!("Could not create {}: {e}", destination.display());
        }

        for kind in ArtifactKind::ALL {
            let source = location.artifact_path(kind);
            if !source.is_file() {
                let reason = GensysError::MissingArtifact(kind).to_string();
                log::warn!("{reason}");
                let _ = event_tx.send(RunEvent::ArtifactSkipped {
                    artifact: kind,
                    reason,
                });
                summary.missing.push(kind);
                continue;
            }

            match self.import_one(kind, &source, &destination, identifier) {
                Ok(asset) => {
                    let _ = event_tx.send(RunEvent::ArtifactImported {
                        artifact: kind,
                        asset_path: asset.asset_path.clone(),
                    });
                    summary.imported.push(asset);
                }
                Err(e) => {
                    let reason = e.to_string();
                    log::warn!("Import of {kind} failed: {reason}");
                    let _ = event_tx.send(RunEvent::ArtifactSkipped {
                        artifact: kind,
                        reason: reason.clone(),
                    });
                    summary.failed.push(ArtifactFailure {
                        artifact: kind,
                        reason,
                    });
                }
            }
        }

        summary
    }

    fn import_one(
        &self,
        kind: ArtifactKind,
        source: &Path,
        destination: &Path,
        identifier: &str,
    ) -> Result<ImportedAsset, GensysError> {
        let file = destination.join(kind.file_name());
        std::fs::copy(source, &file).map_err(|e| GensysError::io(&file, e))?;

        let registry = self.registry.ok_or_else(|| {
            GensysError::AssetRegistrationUnavailable("no asset registry attached".into())
        })?;
        let asset_path = asset_path(identifier, kind);
        registry.register(&ImportRequest {
            source: &file,
            asset_path: &asset_path,
            policy: self.policy,
        })?;

        Ok(ImportedAsset {
            artifact: kind,
            asset_path,
            file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::InstallScope;
    use crate::registry::{AssetRecord, ManifestRegistry};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn tool_dir(plugins_dir: &Path, produced: &[ArtifactKind]) -> InstallLocation {
        let loc = InstallLocation::new(InstallScope::Project, plugins_dir, "tool");
        std::fs::create_dir_all(&loc.working_dir).expect("create working dir");
        for &kind in produced {
            std::fs::write(loc.artifact_path(kind), kind.asset_name()).expect("write artifact");
        }
        loc
    }

    /// Registry that refuses one artifact and records the rest.
    struct FlakyRegistry {
        refuse: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl AssetRegistry for FlakyRegistry {
        fn register(&self, request: &ImportRequest<'_>) -> Result<AssetRecord> {
            if request.asset_path.ends_with(self.refuse) {
                return Err(GensysError::AssetRegistrationUnavailable("offline".into()));
            }
            self.seen
                .lock()
                .expect("registry mutex poisoned")
                .push(request.asset_path.to_string());
            Ok(AssetRecord {
                asset_path: request.asset_path.to_string(),
                source: request.source.to_path_buf(),
                imported_at: String::new(),
                settings: Default::default(),
            })
        }
    }

    #[test]
    fn asset_paths_are_namespaced_by_identifier() {
        assert_eq!(
            asset_path("valley01", ArtifactKind::RiverErosionMap),
            "Gensys/valley01/RiverErosionMap"
        );
    }

    #[test]
    fn imports_only_artifacts_that_exist() {
        let plugins = TempDir::new().expect("failed to create temp dir");
        let content = TempDir::new().expect("failed to create temp dir");
        let loc = tool_dir(
            plugins.path(),
            &[ArtifactKind::TerrainMap, ArtifactKind::FoliageMap],
        );
        let registry = ManifestRegistry::open(content.path()).expect("open registry");
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = ResultImporter::new(content.path(), Some(&registry)).import(&loc, "half", &tx);

        assert_eq!(
            summary.imported_kinds(),
            vec![ArtifactKind::TerrainMap, ArtifactKind::FoliageMap]
        );
        assert_eq!(
            summary.missing,
            vec![ArtifactKind::TerrainLayersMap, ArtifactKind::RiverErosionMap]
        );
        assert!(summary.failed.is_empty());
        assert_eq!(registry.asset_paths().len(), 2);
        assert!(content.path().join("Gensys/half/TerrainMap.png").is_file());
        assert!(!content.path().join("Gensys/half/TerrainLayersMap.png").exists());
        // originals stay for the next run to overwrite
        assert!(loc.artifact_path(ArtifactKind::TerrainMap).is_file());
    }

    #[test]
    fn registration_failure_is_isolated_per_artifact() {
        let plugins = TempDir::new().expect("failed to create temp dir");
        let content = TempDir::new().expect("failed to create temp dir");
        let loc = tool_dir(plugins.path(), &ArtifactKind::ALL);
        let registry = FlakyRegistry {
            refuse: "RiverErosionMap",
            seen: Mutex::new(Vec::new()),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let summary = ResultImporter::new(content.path(), Some(&registry)).import(&loc, "iso", &tx);

        assert_eq!(summary.imported.len(), 3);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].artifact, ArtifactKind::RiverErosionMap);
        assert_eq!(registry.seen.lock().expect("registry mutex poisoned").len(), 3);

        let mut skipped = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, RunEvent::ArtifactSkipped { .. }) {
                skipped += 1;
            }
        }
        assert_eq!(skipped, 1);
    }

    #[test]
    fn no_registry_copies_files_but_reports_every_artifact() {
        let plugins = TempDir::new().expect("failed to create temp dir");
        let content = TempDir::new().expect("failed to create temp dir");
        let loc = tool_dir(plugins.path(), &ArtifactKind::ALL);
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = ResultImporter::new(content.path(), None).import(&loc, "noreg", &tx);

        assert!(summary.imported.is_empty());
        assert_eq!(summary.failed.len(), 4);
        assert!(summary.failed[0].reason.contains("asset registration unavailable"));
        assert!(content.path().join("Gensys/noreg/FoliageMap.png").is_file());
    }

    #[test]
    fn reimport_overwrites_instead_of_duplicating() {
        let plugins = TempDir::new().expect("failed to create temp dir");
        let content = TempDir::new().expect("failed to create temp dir");
        let loc = tool_dir(plugins.path(), &ArtifactKind::ALL);
        let registry = ManifestRegistry::open(content.path()).expect("open registry");
        let (tx, _rx) = mpsc::unbounded_channel();
        let importer = ResultImporter::new(content.path(), Some(&registry));

        importer.import(&loc, "again", &tx);
        std::fs::write(loc.artifact_path(ArtifactKind::TerrainMap), b"second").expect("rewrite");
        importer.import(&loc, "again", &tx);

        assert_eq!(registry.asset_paths().len(), 4);
        let files = std::fs::read_dir(content.path().join("Gensys/again"))
            .expect("read destination")
            .count();
        assert_eq!(files, 4);
        let bytes = std::fs::read(content.path().join("Gensys/again/TerrainMap.png"))
            .expect("read copy");
        assert_eq!(bytes, b"second");
    }

    #[test]
    fn keep_settings_policy_preserves_store_edits_on_reimport() {
        let plugins = TempDir::new().expect("failed to create temp dir");
        let content = TempDir::new().expect("failed to create temp dir");
        let loc = tool_dir(plugins.path(), &[ArtifactKind::TerrainMap]);
        let (tx, _rx) = mpsc::unbounded_channel();
        {
            let registry = ManifestRegistry::open(content.path()).expect("open registry");
            ResultImporter::new(content.path(), Some(&registry)).import(&loc, "kept", &tx);
        }

        // Simulate a settings edit made inside the store between runs.
        let manifest = content.path().join("Gensys/assets.json");
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&manifest).expect("read manifest"))
                .expect("parse manifest");
        value["Gensys/kept/TerrainMap"]["settings"]["srgb"] = serde_json::Value::Bool(false);
        std::fs::write(&manifest, value.to_string()).expect("write manifest");

        let registry = ManifestRegistry::open(content.path()).expect("reopen registry");
        let keep = ImportPolicy {
            replace_existing_settings: false,
            ..ImportPolicy::OVERWRITE
        };
        ResultImporter::new(content.path(), Some(&registry))
            .with_policy(keep)
            .import(&loc, "kept", &tx);
        let record = registry.get("Gensys/kept/TerrainMap").expect("record");
        assert_eq!(record.settings.len(), 1);

        ResultImporter::new(content.path(), Some(&registry)).import(&loc, "kept", &tx);
        let record = registry.get("Gensys/kept/TerrainMap").expect("record");
        assert!(record.settings.is_empty());
    }
}
