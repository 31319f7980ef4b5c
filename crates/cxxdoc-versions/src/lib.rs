//! Multi-version documentation for cxxdoc.
//!
//! This crate provides:
//! - Parsing of release tags into comparable versions
//! - Revision selection (minimum version, keep-last-N, patch squashing)
//! - The per-revision state machine
//! - Isolated checkouts from git and per-revision pipeline builds
//! - The merge pass that links every built revision through a version switcher

mod builder;
mod error;
mod merge;
mod orchestrator;
mod revision;
mod select;
mod source;
mod tags;

pub use builder::{BuildError, PipelineBuilder, RevisionBuilder};
pub use error::OrchestratorError;
pub use merge::{
    inject_switcher, merge, validate_schemes, write_descriptor, VersionEntry, DESCRIPTOR_FILE,
    SWITCHER_CLASS,
};
pub use orchestrator::{Orchestration, Orchestrator};
pub use revision::{Revision, RevisionState, HEAD_LABEL};
pub use select::{MinVersion, SelectionPolicy};
pub use source::{GitSource, RevisionSource};
pub use tags::{TagError, Version};
