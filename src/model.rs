use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Plugin folder name under a plugins directory.
pub const PLUGIN_DIR_NAME: &str = "GenSys";
/// Tool folder relative to the plugin root; this is the tool's working directory.
pub const TOOL_RELATIVE_PATH: &str = "Resources/GenSysCoreShell";
pub const DEFAULT_EXECUTABLE: &str = "CoreTester.exe";
/// Exchange file the tool reads from its working directory.
pub const EXCHANGE_FILE_NAME: &str = "input.json";
/// Root folder of everything this crate writes into the managed content store.
pub const CONTENT_FOLDER: &str = "Gensys";
pub const MATERIAL_FUNCTIONS_FOLDER: &str = "MaterialFunctions";
pub const MATERIALS_FOLDER: &str = "Materials";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Project-scoped plugins directory (overrides the shared install).
    pub project_plugins_dir: PathBuf,
    /// Engine-wide plugins directory, if one is known.
    #[serde(default)]
    pub engine_plugins_dir: Option<PathBuf>,
    /// Root of the managed content store.
    pub content_dir: PathBuf,
    pub executable_name: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project_plugins_dir: PathBuf::from("Plugins"),
            engine_plugins_dir: None,
            content_dir: PathBuf::from("Content"),
            executable_name: DEFAULT_EXECUTABLE.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// The four rasters the generator tool writes into its working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactKind {
    TerrainMap,
    TerrainLayersMap,
    RiverErosionMap,
    FoliageMap,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::TerrainMap,
        ArtifactKind::TerrainLayersMap,
        ArtifactKind::RiverErosionMap,
        ArtifactKind::FoliageMap,
    ];

    /// Asset name inside the managed content store.
    pub fn asset_name(self) -> &'static str {
        match self {
            ArtifactKind::TerrainMap => "TerrainMap",
            ArtifactKind::TerrainLayersMap => "TerrainLayersMap",
            ArtifactKind::RiverErosionMap => "RiverErosionMap",
            ArtifactKind::FoliageMap => "FoliageMap",
        }
    }

    /// File name the tool produces.
    pub fn file_name(self) -> String {
        format!("{}.png", self.asset_name())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.asset_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallScope {
    Project,
    Shared,
}

/// A resolved tool install. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallLocation {
    pub scope: InstallScope,
    pub plugin_root: PathBuf,
    pub working_dir: PathBuf,
    pub executable: PathBuf,
}

impl InstallLocation {
    pub fn new(scope: InstallScope, plugins_dir: &Path, executable_name: &str) -> Self {
        let plugin_root = plugins_dir.join(PLUGIN_DIR_NAME);
        let working_dir = plugin_root.join(TOOL_RELATIVE_PATH);
        let executable = working_dir.join(executable_name);
        Self {
            scope,
            plugin_root,
            working_dir,
            executable,
        }
    }

    pub fn exchange_file(&self) -> PathBuf {
        self.working_dir.join(EXCHANGE_FILE_NAME)
    }

    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        self.working_dir.join(kind.file_name())
    }

    /// Static support assets shipped with the plugin (e.g. `Content/Materials`).
    pub fn support_assets_dir(&self, folder: &str) -> PathBuf {
        self.plugin_root.join("Content").join(folder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Resolve,
    Export,
    Invoke,
    Import,
    Summary,
}

/// Lifecycle of one tool process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationState {
    Running,
    /// The process returned control. A non-zero code still counts as having run.
    Exited { code: Option<i32> },
    Failed { reason: String },
    TimedOut {
        #[serde(with = "humantime_serde")]
        after: Duration,
    },
    Cancelled,
}

impl InvocationState {
    pub fn ran(&self) -> bool {
        matches!(self, InvocationState::Exited { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            InvocationState::Running => "running".to_string(),
            InvocationState::Exited { code: Some(c) } => format!("exited with code {c}"),
            InvocationState::Exited { code: None } => "terminated by signal".to_string(),
            InvocationState::Failed { reason } => format!("failed to run: {reason}"),
            InvocationState::TimedOut { after } => {
                format!("timed out after {}", humantime::format_duration(*after))
            }
            InvocationState::Cancelled => "cancelled".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedAsset {
    pub artifact: ArtifactKind,
    pub asset_path: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub artifact: ArtifactKind,
    pub reason: String,
}

/// Per-artifact result of the import step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub destination: PathBuf,
    pub imported: Vec<ImportedAsset>,
    pub missing: Vec<ArtifactKind>,
    pub failed: Vec<ArtifactFailure>,
}

impl ImportSummary {
    pub fn imported_kinds(&self) -> Vec<ArtifactKind> {
        self.imported.iter().map(|a| a.artifact).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded {
        imported: Vec<ArtifactKind>,
    },
    PartiallySucceeded {
        imported: Vec<ArtifactKind>,
        missing: Vec<ArtifactKind>,
        failed: Vec<ArtifactKind>,
    },
    /// The tool never ran to completion; `imported` holds whatever stale
    /// artifacts were still in the working directory.
    FailedToInvoke {
        reason: String,
        imported: Vec<ArtifactKind>,
    },
}

impl RunOutcome {
    pub fn classify(invocation: &InvocationState, import: &ImportSummary) -> Self {
        let imported = import.imported_kinds();
        if !invocation.ran() {
            return RunOutcome::FailedToInvoke {
                reason: invocation.describe(),
                imported,
            };
        }
        if import.is_complete() {
            RunOutcome::Succeeded { imported }
        } else {
            RunOutcome::PartiallySucceeded {
                imported,
                missing: import.missing.clone(),
                failed: import.failed.iter().map(|f| f.artifact).collect(),
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded { .. } => "succeeded",
            RunOutcome::PartiallySucceeded { .. } => "partially succeeded",
            RunOutcome::FailedToInvoke { .. } => "failed to invoke",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp_utc: String,
    pub identifier: String,
    pub location: InstallLocation,
    pub exchange_file: Option<PathBuf>,
    #[serde(default)]
    pub export_error: Option<String>,
    pub invocation: InvocationState,
    pub import: ImportSummary,
    pub outcome: RunOutcome,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    PhaseStarted {
        phase: RunPhase,
    },
    Invocation(InvocationState),
    ArtifactImported {
        artifact: ArtifactKind,
        asset_path: String,
    },
    ArtifactSkipped {
        artifact: ArtifactKind,
        reason: String,
    },
    Info(String),
    /// A Generate request arrived while another run was active.
    RunRejected {
        identifier: String,
    },
    RunFailed {
        message: String,
    },
    RunCompleted {
        // Boxed to keep the event small.
        report: Box<RunReport>,
    },
}
