//! One retrieval run: list, select, download, preview, purge.

use std::collections::HashSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::Instant;

use crate::afc::{FileTransfer, Scoped};
use crate::config::{DEFAULT_PATTERN, DEFAULT_PREVIEW_BYTES, DEFAULT_REPORT_DIR};
use crate::device::DeviceResolver;
use crate::error::{Error, Result};
use crate::listing::list;
use crate::logger::Logger;
use crate::progress::Progress;
use crate::purge::{purge_candidates, remove, ClearScope};
use crate::select::{select, RemoteEntry, SelectMode};
use crate::session::{Session, SessionOptions};
use crate::transfer::{download, preview, Preview, TransferOptions, TransferResult};

/// What a run should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub target_id: Option<String>,
    /// Destination directory, ending in a path separator
    pub output_path: String,
    pub fetch_all: bool,
    pub clear: bool,
    pub clear_scope: ClearScope,
    pub pattern: String,
    pub report_dir: String,
    pub preview_bytes: usize,
    /// In `All` mode, record a failed download and carry on
    pub keep_going: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_id: None,
            output_path: format!(".{MAIN_SEPARATOR}"),
            fetch_all: false,
            clear: false,
            clear_scope: ClearScope::default(),
            pattern: DEFAULT_PATTERN.to_string(),
            report_dir: DEFAULT_REPORT_DIR.to_string(),
            preview_bytes: DEFAULT_PREVIEW_BYTES,
            keep_going: false,
        }
    }
}

impl RunConfig {
    pub fn mode(&self) -> SelectMode {
        if self.fetch_all {
            SelectMode::All
        } else {
            SelectMode::Latest
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub udid: Option<String>,
    /// Entries the selector picked
    pub matched: Vec<RemoteEntry>,
    pub downloaded: Vec<TransferResult>,
    pub preview: Option<Preview>,
    pub removed: Vec<String>,
    /// Entries a clear left on the device: failed removals and failed downloads
    pub unremoved: Vec<String>,
    /// Per-entry download failures recorded under `keep_going`
    pub failures: Vec<(String, Error)>,
}

impl RunReport {
    pub fn bytes_downloaded(&self) -> u64 {
        self.downloaded.iter().map(|r| r.bytes_written).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Check that `path` is an existing directory and return it with a trailing
/// separator, ready for name concatenation.
pub fn prepare_output_dir(path: &str) -> Result<String> {
    let inaccessible = |reason: String| Error::OutputPathInaccessible {
        path: PathBuf::from(path),
        reason,
    };
    let meta = std::fs::metadata(Path::new(path)).map_err(|e| inaccessible(e.to_string()))?;
    if !meta.is_dir() {
        return Err(inaccessible("not a directory".to_string()));
    }
    std::fs::read_dir(path).map_err(|e| inaccessible(e.to_string()))?;

    let mut dir = path.to_string();
    if !dir.ends_with('/') && !dir.ends_with(MAIN_SEPARATOR) {
        dir.push(MAIN_SEPARATOR);
    }
    Ok(dir)
}

/// Establish a session for `config.target_id` and run against its copy service.
pub fn run(
    config: &RunConfig,
    session_options: &SessionOptions,
    transfer: &TransferOptions,
    resolver: &dyn DeviceResolver,
    logger: &dyn Logger,
    progress: &Progress,
) -> Result<RunReport> {
    let mut session = Session::establish(resolver, config.target_id.as_deref(), session_options)?;
    logger.session(session.udid());
    println!(
        "+ Connected to {} ({} on port {})",
        session.udid(),
        session.copy_service().name,
        session.copy_service().port
    );

    let mut report = run_with_files(session.files(), config, transfer, logger, progress)?;
    report.udid = Some(session.udid().to_string());
    Ok(report)
}

/// The run proper, against any file-transfer client.
pub fn run_with_files<F: FileTransfer + ?Sized>(
    files: &mut F,
    config: &RunConfig,
    transfer: &TransferOptions,
    logger: &dyn Logger,
    progress: &Progress,
) -> Result<RunReport> {
    let started = Instant::now();
    let mut files = Scoped::new(files, &config.report_dir);
    let mut report = RunReport::default();

    let names = list(&mut files, ".")?;
    let mode = config.mode();
    report.matched = select(&mut files, &names, &config.pattern, mode)?;
    for entry in &report.matched {
        logger.found(&entry.name, entry.size);
    }

    match mode {
        SelectMode::All => {
            for entry in &report.matched {
                match fetch(&mut files, &entry.name, config, transfer, progress) {
                    Ok(result) => {
                        logger.downloaded(&result);
                        report.downloaded.push(result);
                    }
                    Err(e) if config.keep_going && !e.is_interrupted() => {
                        logger.error("download", &entry.name, &e.to_string());
                        eprintln!("[!] Skipping {}: {e}", entry.name);
                        report.failures.push((entry.name.clone(), e));
                    }
                    Err(e) => {
                        logger.error("download", &entry.name, &e.to_string());
                        return Err(e);
                    }
                }
            }
        }
        SelectMode::Latest => {
            if let Some(latest) = report.matched.first() {
                let name = latest.name.clone();
                println!("{name}");
                let result = fetch(&mut files, &name, config, transfer, progress).map_err(|e| {
                    logger.error("download", &name, &e.to_string());
                    e
                })?;
                logger.downloaded(&result);
                report.downloaded.push(result);

                let shown = preview(&mut files, &name, config.preview_bytes).map_err(|e| {
                    logger.error("preview", &name, &e.to_string());
                    Error::from(e)
                })?;
                print_preview(&shown);
                report.preview = Some(shown);
            }
        }
    }

    if config.clear {
        let failed: HashSet<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        for name in purge_candidates(&names, &config.pattern, config.clear_scope) {
            // A report that could not be saved stays on the device
            if failed.contains(name) {
                report.unremoved.push(name.to_string());
                continue;
            }
            match remove(&mut files, name) {
                Ok(()) => {
                    logger.removed(name);
                    report.removed.push(name.to_string());
                }
                Err(e) => {
                    logger.error("remove", name, &e.to_string());
                    eprintln!("[!] {e}");
                    report.unremoved.push(name.to_string());
                }
            }
        }
    }

    if report.matched.is_empty() {
        println!("No reports matching '{}' found on device.", config.pattern);
    }

    logger.done(
        report.downloaded.len() as u64,
        report.bytes_downloaded(),
        started.elapsed().as_secs_f64(),
    );
    Ok(report)
}

fn fetch<F: FileTransfer + ?Sized>(
    files: &mut F,
    name: &str,
    config: &RunConfig,
    transfer: &TransferOptions,
    progress: &Progress,
) -> Result<TransferResult> {
    let bar = progress.bar();
    let fetched = download(files, name, &config.output_path, transfer, &bar);
    bar.finish_and_clear();
    let result = fetched?;
    println!(
        "* Found report on device: {} ({} bytes)",
        result.entry_name, result.bytes_written
    );
    println!("Dumping to '{}'...", result.local_path.display());
    println!();
    Ok(result)
}

fn print_preview(shown: &Preview) {
    println!(
        "** Showing first {} bytes for latest report **",
        shown.bytes.len()
    );
    if shown.truncated {
        println!(
            "(report is shorter than the {} bytes requested)",
            shown.requested
        );
    }
    println!("{}", shown.text());
}
