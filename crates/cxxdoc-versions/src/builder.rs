//! Building one revision.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use cxxdoc_core::{Config, ConfigError, Pipeline, Report};
use thiserror::Error;
use tracing::{debug, info};

use crate::revision::Revision;

/// Why one revision could not be built
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("prepare command `{command}` failed: {message}")]
    Prepare { command: String, message: String },

    #[error("no configuration at {0}")]
    MissingConfig(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] cxxdoc_core::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Turns a checkout into a finished HTML tree at `output`.
///
/// Builders run on worker threads, one revision each.
pub trait RevisionBuilder: Sync {
    fn build(
        &self,
        revision: &Revision,
        checkout: &Path,
        output: &Path,
    ) -> Result<Report, BuildError>;
}

/// Runs the prepare command (usually the extractor and renderer), then the
/// cxxdoc pipeline, using the configuration found in the checkout itself.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// Config file path relative to the repository root
    config_file: PathBuf,
    prepare: Vec<String>,
    threads: Option<usize>,
}

impl PipelineBuilder {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            prepare: Vec::new(),
            threads: None,
        }
    }

    /// Command (program and arguments) run in the checkout before the pipeline
    #[must_use]
    pub fn prepare(mut self, command: Vec<String>) -> Self {
        self.prepare = command;
        self
    }

    /// Worker count for each revision's page pass
    #[must_use]
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    fn run_prepare(&self, checkout: &Path) -> Result<(), BuildError> {
        let Some((program, args)) = self.prepare.split_first() else {
            return Ok(());
        };
        let command = self.prepare.join(" ");
        debug!(%command, "running prepare command");
        let output = Command::new(program)
            .args(args)
            .current_dir(checkout)
            .output()
            .map_err(|e| BuildError::Prepare {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::Prepare {
                command,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

impl RevisionBuilder for PipelineBuilder {
    fn build(
        &self,
        revision: &Revision,
        checkout: &Path,
        output: &Path,
    ) -> Result<Report, BuildError> {
        self.run_prepare(checkout)?;

        let config_path = checkout.join(&self.config_file);
        if !config_path.is_file() {
            return Err(BuildError::MissingConfig(config_path));
        }
        let mut config = Config::from_path(&config_path)?;
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        let html_dir = config.sources.html_dir.clone();

        let report = Pipeline::new(config).run()?;
        copy_dir_all(&html_dir, output)?;
        info!(revision = %revision.label, output = %output.display(), "revision built");
        Ok(report)
    }
}

/// Recursively copy a directory
pub(crate) fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), BuildError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| BuildError::Io { path, source }
    };
    fs::create_dir_all(dst).map_err(io(dst))?;

    for entry in fs::read_dir(src).map_err(io(src))? {
        let entry = entry.map_err(io(src))?;
        let ty = entry.file_type().map_err(io(&entry.path()))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(io(&dst_path))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_dir_all() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("index.html"), "i").unwrap();
        fs::write(src.path().join("sub").join("page.html"), "p").unwrap();

        let out = dst.path().join("v1");
        copy_dir_all(src.path(), &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("index.html")).unwrap(), "i");
        assert_eq!(fs::read_to_string(out.join("sub").join("page.html")).unwrap(), "p");
    }

    #[test]
    fn test_missing_config() {
        let checkout = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let err = PipelineBuilder::new("cxxdoc.toml")
            .build(&Revision::head("main"), checkout.path(), out.path())
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingConfig(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_prepare_command() {
        let checkout = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let err = PipelineBuilder::new("cxxdoc.toml")
            .prepare(vec![String::from("false")])
            .build(&Revision::head("main"), checkout.path(), out.path())
            .unwrap_err();
        assert!(matches!(err, BuildError::Prepare { .. }));
    }
}
