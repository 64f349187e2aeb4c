//! Batch worker for the refclip video segmenter.
//!
//! Reads configuration from the environment, loads the detector, and runs
//! the media pipeline over the input directory on a blocking thread.

pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, RunLogger};
pub use runner::{build_detector, build_driver, exit_code, run_batch};
