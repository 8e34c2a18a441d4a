//! Error types shared by the run pipeline.

use crate::model::ArtifactKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GensysError {
    #[error(
        "generator tool not found in project install ({}) or shared install ({})",
        .project.display(),
        display_optional(.shared)
    )]
    ToolNotFound {
        project: PathBuf,
        shared: Option<PathBuf>,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("expected artifact {0} was not produced")]
    MissingArtifact(ArtifactKind),

    #[error("asset registration unavailable: {0}")]
    AssetRegistrationUnavailable(String),

    #[error("invalid parameters: {}", .0.join("; "))]
    InvalidParameters(Vec<String>),

    #[error("a generation run is already in progress")]
    RunInProgress,

    #[error("JSON error at {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl GensysError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GensysError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        GensysError::Json {
            path: path.into(),
            source,
        }
    }
}

fn display_optional(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "not configured".into())
}

pub type Result<T, E = GensysError> = std::result::Result<T, E>;
