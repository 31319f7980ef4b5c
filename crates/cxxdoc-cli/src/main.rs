//! cxxdoc CLI - post-processing for generated C++ API documentation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cxxdoc_core::{Config, Pipeline, Report, Severity};
use cxxdoc_versions::{GitSource, Orchestrator, PipelineBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "cxxdoc")]
#[command(version = cxxdoc_core::VERSION)]
#[command(about = "Normalize and cross-link generated C++ documentation", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = cxxdoc_core::config::CONFIG_FILE_NAME)]
    config: PathBuf,

    /// More logging (repeat for trace output)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less logging (repeat to silence warnings)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the XML, build the symbol table and fix every HTML page
    Run {
        /// Worker threads (defaults to the config, then to one per core)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,

        /// Stop after normalizing the XML
        #[arg(long)]
        xml_only: bool,

        /// Also write the diagnostics report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Build documentation for several tagged versions and link them together
    Versions {
        /// Git repository holding the documented project
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Directory receiving one subdirectory per version
        #[arg(short, long)]
        output: PathBuf,

        /// Where checkouts are made (a temporary directory by default)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Fail when any version fails
        #[arg(long)]
        strict: bool,

        /// Versions built at once
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Some(Commands::Run {
            threads,
            strict,
            xml_only,
            report,
        }) => run(&cli.config, threads, strict, xml_only, report.as_deref()),

        Some(Commands::Versions {
            repo,
            output,
            work_dir,
            strict,
            threads,
        }) => versions(&cli.config, &repo, &output, work_dir, strict, threads),

        // Default behavior: a plain run with the config's settings
        None => run(&cli.config, None, false, false, None),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => Level::ERROR,
        -1 => Level::WARN,
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_path(path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

/// Returns whether the run succeeded under the effective strictness
fn run(
    config_path: &Path,
    threads: Option<usize>,
    strict: bool,
    xml_only: bool,
    report_path: Option<&Path>,
) -> Result<bool> {
    let mut config = load_config(config_path)?;
    if threads.is_some() {
        config.threads = threads;
    }
    config.strict |= strict;
    let strict = config.strict;

    let report = Pipeline::new(config).xml_only(xml_only).run().context("Pipeline failed")?;
    print_report(&report);

    if let Some(path) = report_path {
        let json = report.to_json().context("Failed to serialize report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report '{}'", path.display()))?;
    }
    Ok(report.is_success(strict))
}

fn versions(
    config_path: &Path,
    repo: &Path,
    output: &Path,
    work_dir: Option<PathBuf>,
    strict: bool,
    threads: Option<usize>,
) -> Result<bool> {
    let config = load_config(config_path)?;
    let strict = strict || config.strict;
    let orchestrator = Orchestrator::from_config(&config)
        .context("Invalid version settings")?
        .strict(strict)
        .threads(threads.or(config.threads))
        .work_dir(work_dir);

    // each checkout carries its own copy of the config, at the same relative path
    let relative = config_path
        .strip_prefix(repo)
        .unwrap_or(config_path)
        .to_path_buf();
    let builder = PipelineBuilder::new(relative).prepare(config.versions.prepare.clone());
    let source = GitSource::new(repo);

    let orchestration = orchestrator
        .run(&source, &builder, output)
        .context("Version build failed")?;
    print_report(&orchestration.report);
    for revision in orchestration.merged() {
        println!("built {}", revision.label);
    }
    for revision in orchestration.failed() {
        println!("failed {}: {}", revision.label, revision.failure().unwrap_or("unknown error"));
    }
    Ok(orchestration.report.is_success(strict))
}

fn print_report(report: &Report) {
    for diagnostic in &report.diagnostics {
        eprintln!("{diagnostic}");
    }
    for failed in &report.failed_units {
        eprintln!("failed: {}: {}", failed.unit, failed.reason);
    }
    println!(
        "{} pages processed, {} changed, {} errors, {} warnings",
        report.pages_processed,
        report.pages_changed,
        report.count(Severity::Error),
        report.count(Severity::Warning)
    );
}
