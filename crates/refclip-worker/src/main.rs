//! Video segmenting worker binary.

use anyhow::Context;
use refclip_media::CancellationFlag;
use tracing::{error, info, warn};

use refclip_worker::runner::EXIT_ERROR;
use refclip_worker::{
    build_detector, build_driver, exit_code, init_tracing, run_batch, RunLogger, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting refclip-worker");

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Worker failed: {:#}", e);
            EXIT_ERROR
        }
    };

    info!(exit_code = code, "Worker shutdown complete");
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let config = WorkerConfig::from_env().context("invalid configuration")?;
    info!("Worker config: {:?}", config);

    config
        .prepare_directories()
        .context("failed to prepare directories")?;

    let (detector, target_class) =
        build_detector(&config).context("failed to initialize detector")?;

    let cancel = CancellationFlag::new();
    let driver = build_driver(&config, detector, target_class, cancel.clone())
        .context("failed to build pipeline")?;

    // Cooperative shutdown: the pipeline stops at its next check-point
    let signal_flag = cancel.clone();
    let shutdown_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, finishing current frame");
            signal_flag.cancel();
        }
    });

    let logger = RunLogger::new("segment");
    let report = run_batch(driver, &logger).await.context("batch run failed")?;
    shutdown_handle.abort();

    match serde_json::to_string(&report) {
        Ok(json) => info!(run_id = %logger.run_id(), report = %json, "Batch report"),
        Err(e) => warn!("Failed to serialize batch report: {}", e),
    }

    Ok(exit_code(&report))
}
