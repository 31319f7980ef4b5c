//! Errors that stop an orchestration.

use std::path::PathBuf;

use thiserror::Error;

use crate::revision::RevisionState;
use crate::tags::TagError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid min_version: {0}")]
    MinVersion(#[from] TagError),

    #[error(transparent)]
    Config(#[from] cxxdoc_core::ConfigError),

    #[error("revision '{label}' cannot move from {from} to {to}")]
    InvalidTransition {
        label: String,
        from: RevisionState,
        to: RevisionState,
    },

    #[error("no revisions selected")]
    NoRevisions,

    #[error("{} revision(s) failed in strict mode: {}", .labels.len(), .labels.join(", "))]
    Strict { labels: Vec<String> },

    #[error("failed to write {path}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl OrchestratorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
