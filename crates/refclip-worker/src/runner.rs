//! Batch assembly and execution.

use refclip_media::{
    backend_available, resolve_target_class, BatchDriver, CancellationFlag, Detector,
    DetectorAdapter, IouTracker, OpenCvEncoderFactory, OpenCvOpener, Pipeline, YoloDetector,
};
use refclip_models::BatchReport;
use tracing::info;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;

/// Exit status when every source completed.
pub const EXIT_OK: i32 = 0;
/// Exit status for startup and run errors.
pub const EXIT_ERROR: i32 = 1;
/// Exit status when the batch ran but at least one source failed.
pub const EXIT_SOURCE_FAILURES: i32 = 2;
/// Exit status after a cooperative cancellation.
pub const EXIT_CANCELLED: i32 = 130;

/// Load the detector and resolve the target class id.
///
/// Model load failure and an unknown class (without a configured fallback)
/// are fatal.
pub fn build_detector(config: &WorkerConfig) -> WorkerResult<(DetectorAdapter, usize)> {
    let detector = YoloDetector::new(config.yolo_config())?;
    let device = detector.device();

    let target_class = resolve_target_class(
        detector.class_names(),
        &config.target_class,
        config.class_fallback,
    )?;

    info!(
        device = %device,
        target_class = %config.target_class,
        target_class_id = target_class,
        "Detector ready"
    );

    let adapter = DetectorAdapter::new(Box::new(detector)).with_tracker(IouTracker::default());
    Ok((adapter, target_class))
}

/// Assemble the batch driver around a ready detector.
pub fn build_driver(
    config: &WorkerConfig,
    detector: DetectorAdapter,
    target_class: usize,
    cancel: CancellationFlag,
) -> WorkerResult<BatchDriver> {
    if !backend_available() {
        return Err(WorkerError::config_error(
            "built without the opencv feature; no video backend available",
        ));
    }

    let pipeline = Pipeline::new(
        config.pipeline_config(target_class),
        detector,
        Box::new(OpenCvOpener),
        Box::new(OpenCvEncoderFactory::default()),
    )?
    .with_cancellation(cancel);

    Ok(BatchDriver::new(pipeline, config.batch_config()))
}

/// Run the batch on a blocking thread inside the logger's span.
pub async fn run_batch(mut driver: BatchDriver, logger: &RunLogger) -> WorkerResult<BatchReport> {
    let span = logger.create_span();
    logger.log_start("processing input directory");

    let report = tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        driver.run()
    })
    .await
    .map_err(|e| WorkerError::task_failed(e.to_string()))??;

    if report.cancelled {
        logger.log_warning("batch cancelled before all sources were processed");
    }
    if report.failed_count() > 0 {
        logger.log_error(&format!("{} source(s) failed", report.failed_count()));
    }
    logger.log_completion(&format!(
        "{} completed, {} failed, {} frames written into {} segments",
        report.completed_count(),
        report.failed_count(),
        report.total_frames_written(),
        report.total_segments()
    ));

    Ok(report)
}

/// Process exit status for a finished batch.
pub fn exit_code(report: &BatchReport) -> i32 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.failed_count() > 0 {
        EXIT_SOURCE_FAILURES
    } else {
        EXIT_OK
    }
}
