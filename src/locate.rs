//! Finds which install of the generator tool to run.
//!
//! Two candidate roots are probed: the project's plugins directory and the
//! engine-wide one. The project install wins whenever its executable exists.

use crate::error::{GensysError, Result};
use crate::model::{InstallLocation, InstallScope, RunConfig};
use std::path::PathBuf;
use std::sync::OnceLock;

pub struct LocationResolver {
    project_plugins_dir: PathBuf,
    engine_plugins_dir: Option<PathBuf>,
    executable_name: String,
    resolved: OnceLock<InstallLocation>,
}

impl LocationResolver {
    pub fn new(
        project_plugins_dir: impl Into<PathBuf>,
        engine_plugins_dir: Option<PathBuf>,
        executable_name: impl Into<String>,
    ) -> Self {
        Self {
            project_plugins_dir: project_plugins_dir.into(),
            engine_plugins_dir,
            executable_name: executable_name.into(),
            resolved: OnceLock::new(),
        }
    }

    pub fn from_config(cfg: &RunConfig) -> Self {
        Self::new(
            cfg.project_plugins_dir.clone(),
            cfg.engine_plugins_dir.clone(),
            cfg.executable_name.clone(),
        )
    }

    /// Resolve the install, memoizing the first success for the life of the resolver.
    /// A failed probe is not cached, so installing the tool mid-session is picked up.
    pub fn resolve(&self) -> Result<InstallLocation> {
        if let Some(loc) = self.resolved.get() {
            return Ok(loc.clone());
        }
        let loc = self.probe()?;
        log::info!(
            "Using {:?} install at {}",
            loc.scope,
            loc.working_dir.display()
        );
        Ok(self.resolved.get_or_init(|| loc).clone())
    }

    fn probe(&self) -> Result<InstallLocation> {
        let project = InstallLocation::new(
            InstallScope::Project,
            &self.project_plugins_dir,
            &self.executable_name,
        );
        if project.executable.is_file() {
            return Ok(project);
        }
        log::debug!("No tool at {}", project.executable.display());

        if let Some(engine_dir) = self.engine_plugins_dir.as_deref() {
            let shared =
                InstallLocation::new(InstallScope::Shared, engine_dir, &self.executable_name);
            if shared.executable.is_file() {
                return Ok(shared);
            }
            log::debug!("No tool at {}", shared.executable.display());
        }

        Err(GensysError::ToolNotFound {
            project: project.executable,
            shared: self.engine_plugins_dir.as_ref().map(|d| {
                InstallLocation::new(InstallScope::Shared, d, &self.executable_name).executable
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const EXE: &str = "CoreTester.exe";

    fn install_tool(plugins_dir: &Path) -> PathBuf {
        let loc = InstallLocation::new(InstallScope::Project, plugins_dir, EXE);
        std::fs::create_dir_all(&loc.working_dir).expect("create tool dir");
        std::fs::write(&loc.executable, b"tool").expect("write tool");
        loc.working_dir
    }

    #[test]
    fn project_install_overrides_shared() {
        let project = TempDir::new().expect("failed to create temp dir");
        let engine = TempDir::new().expect("failed to create temp dir");
        let project_dir = install_tool(project.path());
        install_tool(engine.path());

        let resolver =
            LocationResolver::new(project.path(), Some(engine.path().to_path_buf()), EXE);
        let loc = resolver.resolve().expect("resolve");
        assert_eq!(loc.scope, InstallScope::Project);
        assert_eq!(loc.working_dir, project_dir);
    }

    #[test]
    fn falls_back_to_shared_install() {
        let project = TempDir::new().expect("failed to create temp dir");
        let engine = TempDir::new().expect("failed to create temp dir");
        let engine_dir = install_tool(engine.path());

        let resolver =
            LocationResolver::new(project.path(), Some(engine.path().to_path_buf()), EXE);
        let loc = resolver.resolve().expect("resolve");
        assert_eq!(loc.scope, InstallScope::Shared);
        assert_eq!(loc.working_dir, engine_dir);
    }

    #[test]
    fn neither_install_is_tool_not_found() {
        let project = TempDir::new().expect("failed to create temp dir");
        let engine = TempDir::new().expect("failed to create temp dir");
        let resolver =
            LocationResolver::new(project.path(), Some(engine.path().to_path_buf()), EXE);
        match resolver.resolve() {
            Err(GensysError::ToolNotFound { project: p, shared }) => {
                assert!(p.ends_with("GenSys/Resources/GenSysCoreShell/CoreTester.exe"));
                assert!(shared.is_some());
            }
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn a_directory_named_like_the_tool_does_not_count() {
        let project = TempDir::new().expect("failed to create temp dir");
        let loc = InstallLocation::new(InstallScope::Project, project.path(), EXE);
        std::fs::create_dir_all(&loc.executable).expect("create dir");
        let resolver = LocationResolver::new(project.path(), None, EXE);
        assert!(matches!(
            resolver.resolve(),
            Err(GensysError::ToolNotFound { shared: None, .. })
        ));
    }

    #[test]
    fn resolution_is_memoized_after_success() {
        let project = TempDir::new().expect("failed to create temp dir");
        let engine = TempDir::new().expect("failed to create temp dir");
        install_tool(engine.path());
        let resolver =
            LocationResolver::new(project.path(), Some(engine.path().to_path_buf()), EXE);
        assert_eq!(resolver.resolve().expect("resolve").scope, InstallScope::Shared);

        // A project install appearing later does not change the memoized answer.
        install_tool(project.path());
        assert_eq!(resolver.resolve().expect("resolve").scope, InstallScope::Shared);
    }
}
