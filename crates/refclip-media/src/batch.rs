//! Sequential processing of every source video in a directory.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use refclip_models::{BatchReport, SourceOutcome, SourceReport};
use tracing::{error, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::archive_source;
use crate::metrics;
use crate::pipeline::{panic_message, Pipeline};

/// Which files a batch picks up.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    /// Source container extension, without the dot (matched case-insensitively)
    pub extension: String,
}

/// Source files in `dir` with the given extension, sorted by path.
pub fn list_sources(dir: impl AsRef<Path>, extension: &str) -> MediaResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let extension = extension.trim_start_matches('.');

    if !dir.is_dir() {
        return Err(MediaError::FileNotFound(dir.to_path_buf()));
    }

    let mut sources = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            sources.push(path);
        }
    }

    sources.sort();
    Ok(sources)
}

/// Runs the pipeline over a directory, one source at a time.
///
/// A failing or panicking source never stops the batch; cancellation does,
/// at the next source boundary.
pub struct BatchDriver {
    pipeline: Pipeline,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(pipeline: Pipeline, config: BatchConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Process every source currently in the input directory.
    ///
    /// Fails only if the input directory cannot be listed.
    pub fn run(&mut self) -> MediaResult<BatchReport> {
        let sources = list_sources(&self.config.input_dir, &self.config.extension)?;
        let mut batch = BatchReport::default();

        info!(
            input_dir = %self.config.input_dir.display(),
            sources = sources.len(),
            "Starting batch"
        );

        for (i, path) in sources.iter().enumerate() {
            if self.pipeline.cancellation().is_cancelled() {
                warn!(remaining = sources.len() - i, "Batch cancelled");
                batch.cancelled = true;
                break;
            }

            info!(
                source = %path.display(),
                position = i + 1,
                total = sources.len(),
                "Starting source"
            );

            let pipeline = &mut self.pipeline;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process_source(path)));

            match outcome {
                Ok(Ok(report)) => batch.sources.push(report),
                Ok(Err(failure)) => {
                    let cancelled = matches!(failure.error, MediaError::Cancelled);
                    if cancelled {
                        warn!(source = %path.display(), "Source interrupted by cancellation");
                    } else {
                        error!(source = %path.display(), "Source failed: {}", failure.error);
                    }
                    batch.sources.push(failure.report);
                    if cancelled {
                        batch.cancelled = true;
                        break;
                    }
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(source = %path.display(), "Source processing panicked: {}", message);
                    metrics::record_source_failed("panic");
                    batch.sources.push(self.recover_from_panic(path, message));
                }
            }
        }

        info!(
            completed = batch.completed_count(),
            failed = batch.failed_count(),
            frames_written = batch.total_frames_written(),
            segments = batch.total_segments(),
            cancelled = batch.cancelled,
            "Batch finished"
        );

        Ok(batch)
    }

    /// Archive a source whose processing panicked outside the frame loop,
    /// and report it failed.
    ///
    /// Frame-loop panics are turned into errors by the pipeline and carry a
    /// full report. Panics that reach this point (opening the source,
    /// creating or closing the writer) lose the pipeline's report, so only
    /// the outcome and archive path are filled in. Open segments and the
    /// reader were already released by their guards during unwinding.
    fn recover_from_panic(&self, path: &Path, message: String) -> SourceReport {
        let mut report = SourceReport::new(path);
        report.outcome = SourceOutcome::Failed {
            error: format!("panic: {}", message),
        };

        if path.exists() {
            match archive_source(path, &self.pipeline.config().archive_dir) {
                Ok(archived) => report.archived_to = Some(archived),
                Err(e) => error!(source = %path.display(), "Failed to archive source: {}", e),
            }
        }
        report
    }
}
