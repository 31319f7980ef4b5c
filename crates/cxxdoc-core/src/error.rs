//! Error types for conditions that stop a unit or a whole run
//!
//! Anything the pipeline can work around is a [`Diagnostic`](crate::Diagnostic)
//! instead. These are reserved for I/O failures, missing inputs and input that
//! is too malformed to build the symbol table from.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::symbols::DuplicateSymbolError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("required input not found: {0}")]
    MissingInput(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Symbol(#[from] DuplicateSymbolError),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Whether the error aborts the whole run rather than a single unit
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Read { .. } | Self::Xml { .. })
    }
}
