//! One full run over a generated documentation tree
//!
//! A run has two phases. The build phase repairs the extractor's XML in
//! place and reads it into a [`SymbolTable`]; after that the table is
//! frozen. The resolve phase then fixes every HTML page in parallel against
//! the frozen table. Outcomes are collected in page name order, so the
//! report and the written pages do not depend on the number of workers.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::diagnostics::Report;
use crate::error::{Error, Result};
use crate::normalize::normalize_tree;
use crate::postprocess::{PageContext, PageError, PageOutcome, Postprocessor};
use crate::symbols::{ingest_xml_dir, SymbolTable};

/// The single-revision chain: normalize, build the table, fix the pages
pub struct Pipeline {
    config: Config,
    postprocessor: Postprocessor,
    xml_only: bool,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            postprocessor: Postprocessor::new(),
            xml_only: false,
        }
    }

    /// Replace the standard page fixes
    #[must_use]
    pub fn with_postprocessor(mut self, postprocessor: Postprocessor) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    /// Stop after the XML tree is normalized and the table is built
    #[must_use]
    pub fn xml_only(mut self, xml_only: bool) -> Self {
        self.xml_only = xml_only;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run both phases
    pub fn run(&self) -> Result<Report> {
        let span = info_span!("run", xml = %self.config.sources.xml_dir.display());
        let _guard = span.enter();

        let pool = self.thread_pool()?;
        let language = self.config.language()?;
        info!(?language, threads = pool.current_num_threads(), "starting run");

        let mut report = normalize_tree(&self.config.sources.xml_dir, &pool)?;
        let ingested = ingest_xml_dir(&self.config.sources.xml_dir, &self.config.tagfiles, &pool)?;
        report.merge(ingested.report);
        info!(symbols = ingested.table.len(), "symbol table ready");

        if !self.xml_only {
            report.merge(self.fix_pages(&ingested.table, &pool)?);
        }
        report.sort();
        Ok(report)
    }

    /// Resolve phase only, against an already built table
    pub fn process_pages(&self, table: &SymbolTable) -> Result<Report> {
        let pool = self.thread_pool()?;
        let mut report = self.fix_pages(table, &pool)?;
        report.sort();
        Ok(report)
    }

    fn thread_pool(&self) -> Result<ThreadPool> {
        Ok(ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .thread_name(|i| format!("cxxdoc-{i}"))
            .build()?)
    }

    fn fix_pages(&self, table: &SymbolTable, pool: &ThreadPool) -> Result<Report> {
        let html_dir = &self.config.sources.html_dir;
        let pages = html_pages(html_dir)?;
        let ctx = PageContext::new(table, &self.config, html_dir)?;

        let outcomes: Vec<(String, std::result::Result<PageOutcome, PageError>)> = pool.install(|| {
            pages
                .par_iter()
                .map(|name| (name.clone(), self.postprocessor.process_file(name, &ctx)))
                .collect()
        });

        let mut report = Report::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    report.pages_processed += 1;
                    if outcome.changed {
                        report.pages_changed += 1;
                    }
                    report.extend(outcome.diagnostics);
                }
                Err(PageError::Write(source)) => return Err(Error::write(html_dir.join(&name), source)),
                Err(e) => {
                    warn!(page = %name, error = %e, "page skipped");
                    report.fail_unit(name, e.to_string());
                }
            }
        }
        info!(
            pages = report.pages_processed,
            changed = report.pages_changed,
            failed = report.failed_units.len(),
            "processed pages"
        );
        Ok(report)
    }
}

/// Every `.html` file below `dir`, as sorted `/`-separated relative names
fn html_pages(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }
    let pattern = dir.join("**").join("*.html");
    let mut names: Vec<String> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_file())
        .filter_map(|p| relative_name(dir, &p))
        .collect();
    names.sort();
    Ok(names)
}

fn relative_name(dir: &Path, path: &Path) -> Option<String> {
    let relative: PathBuf = path.strip_prefix(dir).ok()?.to_path_buf();
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(segments.join("/"))
}
