//! cxxdoc Core - normalization and cross-referencing engine for C++ API docs
//!
//! This crate provides the core functionality:
//! - Symbols: project-wide symbol table built from extractor XML and tagfiles
//! - Normalize: repair of malformed declaration text in the XML tree
//! - Lexer: C++ tokenization and classification
//! - Xref: resolution of classified tokens against the symbol table
//! - Markup: a small HTML element tree
//! - Postprocess: per-page fixes applied to the generated HTML
//! - Pipeline: the two-phase build + resolve run over a whole project

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration file (`cxxdoc.toml`) handling
pub mod config;

/// Diagnostics collected during a run
pub mod diagnostics;

/// Error types for fatal and unit-level failures
pub mod error;

/// Symbol table and its ingestion from XML and tagfiles
pub mod symbols;

/// Declaration normalizer for the extractor's XML tree
pub mod normalize;

/// C++ tokenizer and classifier
pub mod lexer;

/// Cross-reference resolver
pub mod xref;

/// HTML element tree
pub mod markup;

/// Per-page HTML fixes
pub mod postprocess;

/// Project-level run orchestration
pub mod pipeline;

mod xml;

pub use config::{Config, ConfigError};
pub use diagnostics::{Diagnostic, Outcome, Report, Severity};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
