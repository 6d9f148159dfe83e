//! Batch orchestration: runs detect → normalize → render → write for many
//! files on a bounded pool of scoped worker threads.

use crate::adapters;
use crate::config::ConvertConfig;
use crate::detect::{self, SourceSchema};
use crate::error::{ConvertError, ErrorDescriptor};
use crate::importer::RawDocument;
use crate::output::{self, Destinations};
use crate::renderer;
use crossbeam_channel::{SendTimeoutError, bounded, unbounded};
use eyre::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared stop flag. Clones observe the same flag.
///
/// Workers check it before starting each file; a file already in flight
/// always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// Outcome for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub input: PathBuf,
    pub status: Status,
    /// `None` when the file could not be read or was never started.
    pub schema: Option<SourceSchema>,
    /// Files written, or that would be written in a dry run.
    pub output_paths: Vec<PathBuf>,
    pub error: Option<ErrorDescriptor>,
    /// Why a file was skipped.
    pub note: Option<String>,
}

impl ConversionResult {
    fn skipped(input: &Path, schema: Option<SourceSchema>, note: &str) -> Self {
        Self {
            input: input.to_path_buf(),
            status: Status::Skipped,
            schema,
            output_paths: Vec::new(),
            error: None,
            note: Some(note.to_string()),
        }
    }

    fn failed(input: &Path, schema: Option<SourceSchema>, err: &ConvertError) -> Self {
        Self {
            input: input.to_path_buf(),
            status: Status::Failed,
            schema,
            output_paths: Vec::new(),
            error: Some(ErrorDescriptor::from(err)),
            note: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_results(results: &[ConversionResult]) -> Self {
        let mut summary = Self::default();
        summary.add(results);
        summary
    }

    pub fn add(&mut self, results: &[ConversionResult]) {
        for r in results {
            match r.status {
                Status::Success => self.succeeded += 1,
                Status::Skipped => self.skipped += 1,
                Status::Failed => self.failed += 1,
            }
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}

/// Convert every input and return one result per input, in input order.
///
/// `observer` is the single consumer of the progress channel: it runs on
/// the calling thread once per finished file, in completion order. Inputs
/// never started because of `cancel` come back as skipped with the note
/// `"cancelled"` and are not reported to the observer.
///
/// Only run-level problems are returned as `Err`: an unwritable destination
/// is detected before any file starts. Per-file errors become
/// [`Status::Failed`] results.
pub fn run(
    inputs: &[PathBuf],
    config: &ConvertConfig,
    cancel: &CancelToken,
    mut observer: impl FnMut(&ConversionResult),
) -> Result<Vec<ConversionResult>> {
    if !config.dry_run {
        output::ensure_writable(&config.dest_dir)?;
    }
    let plan = output::plan_destinations(inputs, config);
    let mut slots: Vec<Option<ConversionResult>> = vec![None; inputs.len()];

    let n_workers = config.workers.clamp(1, inputs.len().max(1));
    let (job_tx, job_rx) = bounded::<usize>(n_workers * 2);
    let (done_tx, done_rx) = unbounded::<(usize, ConversionResult)>();
    debug!(inputs = inputs.len(), workers = n_workers, "starting batch");

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let (job_rx, done_tx) = (job_rx.clone(), done_tx.clone());
            let plan = &plan;

            s.spawn(move || {
                while let Ok(i) = job_rx.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let result = convert_file(&inputs[i], &plan[i], config);
                    if done_tx.send((i, result)).is_err() {
                        break;
                    }
                }
            });
        }

        drop(job_rx);
        drop(done_tx);

        s.spawn(move || {
            'outer: for i in 0..inputs.len() {
                if cancel.is_cancelled() {
                    break;
                }
                let mut pending = i;
                loop {
                    match job_tx.send_timeout(pending, Duration::from_millis(50)) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Disconnected(_)) => break 'outer,
                        Err(SendTimeoutError::Timeout(r)) => {
                            pending = r;
                            if cancel.is_cancelled() {
                                break 'outer;
                            }
                        }
                    }
                }
            }
        });

        for (i, result) in done_rx.iter() {
            observer(&result);
            slots[i] = Some(result);
        }
    });

    let results: Vec<ConversionResult> = slots
        .into_iter()
        .zip(inputs)
        .map(|(slot, input)| {
            slot.unwrap_or_else(|| ConversionResult::skipped(input, None, "cancelled"))
        })
        .collect();
    debug!(summary = %Summary::from_results(&results), "batch finished");
    Ok(results)
}

/// The whole per-file pipeline. Never panics on bad input and never
/// returns an error: every outcome is a [`ConversionResult`].
fn convert_file(input: &Path, dests: &Destinations, config: &ConvertConfig) -> ConversionResult {
    let raw = match RawDocument::load(input) {
        Ok(raw) => raw,
        Err(e) => return fail(input, None, e),
    };

    let schema = match config.source_format.forced() {
        Some(schema) => schema,
        None => match detect::classify(&raw) {
            Ok(schema) => schema,
            Err(e) => return fail(input, None, e),
        },
    };
    debug!(path = %input.display(), %schema, size = raw.size(), "detected");

    if schema == SourceSchema::Unknown {
        if config.strict {
            return fail(input, Some(schema), ConvertError::UnknownSchema);
        }
        warn!("Skipped {}: unrecognized format", input.display());
        return ConversionResult::skipped(input, Some(schema), "unrecognized format");
    }

    let record = match adapters::normalize(&raw, schema, &config.adapter) {
        Ok(record) => record,
        Err(e) => return fail(input, Some(schema), e),
    };
    drop(raw);

    let rendered = match renderer::render(&record, &config.render) {
        Ok(rendered) => rendered,
        Err(e) => return fail(input, Some(schema), e),
    };

    for (format, text) in &rendered {
        if let Err(e) = renderer::validate_output(*format, text) {
            return fail(input, Some(schema), e);
        }
    }

    // Checked last so a broken input still reports its real error.
    if !config.overwrite
        && let Some((_, existing)) = dests.iter().find(|(_, p)| p.exists())
    {
        warn!("Skipped {}: {} exists", input.display(), existing.display());
        return ConversionResult::skipped(input, Some(schema), "exists");
    }

    let planned: Vec<PathBuf> = dests.iter().map(|(_, p)| p.clone()).collect();
    if config.dry_run {
        info!("Would write {}", join_paths(&planned));
        return ConversionResult {
            input: input.to_path_buf(),
            status: Status::Success,
            schema: Some(schema),
            output_paths: planned,
            error: None,
            note: Some("dry run".to_string()),
        };
    }

    let mut written: Vec<PathBuf> = Vec::new();
    for (format, path) in dests {
        let Some(text) = rendered.get(format) else {
            continue;
        };
        if let Err(e) = output::write_atomic(path, text) {
            // Leave either every format of this input or none.
            for p in &written {
                let _ = fs::remove_file(p);
            }
            return fail(input, Some(schema), e);
        }
        written.push(path.clone());
    }

    info!("Wrote {}", join_paths(&written));
    ConversionResult {
        input: input.to_path_buf(),
        status: Status::Success,
        schema: Some(schema),
        output_paths: written,
        error: None,
        note: None,
    }
}

fn fail(input: &Path, schema: Option<SourceSchema>, err: ConvertError) -> ConversionResult {
    let result = ConversionResult::failed(input, schema, &err);
    if let Some(desc) = &result.error {
        error!("Failed {}: {desc}", input.display());
    }
    result
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wrap [`run`] for callers that only need the summary line.
pub fn run_to_summary(
    inputs: &[PathBuf],
    config: &ConvertConfig,
    cancel: &CancelToken,
) -> Result<Summary> {
    let results = run(inputs, config, cancel, |_| {}).wrap_err("Batch conversion failed")?;
    Ok(Summary::from_results(&results))
}
