//! Startup preparation of the managed content store.
//!
//! Creates the `Gensys` folder layout and mirrors the plugin's shared material
//! assets into it. Nothing here is fatal: problems are logged and returned as
//! warnings, since generation itself does not depend on them.

use crate::model::{InstallLocation, CONTENT_FOLDER, MATERIALS_FOLDER, MATERIAL_FUNCTIONS_FOLDER};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Support-asset folders mirrored from the plugin into the content store.
pub const SUPPORT_FOLDERS: [&str; 2] = [MATERIAL_FUNCTIONS_FOLDER, MATERIALS_FOLDER];

#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub created: Vec<PathBuf>,
    pub copied_files: usize,
    pub warnings: Vec<String>,
}

impl BootstrapReport {
    fn warn(&mut self, msg: String) {
        log::warn!("{msg}");
        self.warnings.push(msg);
    }
}

/// Ensure the content layout exists and copy support assets from `location`, if known.
/// Safe to call repeatedly; existing files are overwritten in place.
pub fn bootstrap_content(content_dir: &Path, location: Option<&InstallLocation>) -> BootstrapReport {
    let mut report = BootstrapReport::default();
    let root = content_dir.join(CONTENT_FOLDER);

    for dir in std::iter::once(root.clone()).chain(SUPPORT_FOLDERS.iter().map(|f| root.join(f))) {
        if dir.is_dir() {
            continue;
        }
        match std::fs::create_dir_all(&dir) {
            Ok(()) => report.created.push(dir),
            Err(e) => report.warn(format!("Could not create {}: {e}", dir.display())),
        }
    }

    let Some(location) = location else {
        report.warn("Generator install not found; shared materials were not copied".into());
        return report;
    };

    for folder in SUPPORT_FOLDERS {
        let src = location.support_assets_dir(folder);
        if !src.is_dir() {
            log::debug!("No support assets at {}", src.display());
            continue;
        }
        let dst = root.join(folder);
        match copy_dir_recursive(&src, &dst) {
            Ok(n) => report.copied_files += n,
            Err(e) => report.warn(format!(
                "Could not copy {} to {}: {e}",
                src.display(),
                dst.display()
            )),
        }
    }

    log::info!(
        "Content store ready at {} ({} folders created, {} support files copied)",
        root.display(),
        report.created.len(),
        report.copied_files
    );
    report
}

/// Copy `src` into `dst` recursively, overwriting files that already exist.
fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
