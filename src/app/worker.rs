//! Background execution of a run.
//!
//! The pipeline runs on its own thread. The caller receives `Progress` events on
//! a channel and can stop the run through a `CancelToken`; the worker checks the
//! token between files and between groups.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::app::pipeline::{RunOutput, run_pipeline};
use crate::domain::RunConfig;
use crate::error::{AppError, EXIT_INTERNAL};
use crate::io::SeriesSource;

/// Shared cooperative cancellation flag.
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

/// Files processed so far out of all matched files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// A run in flight.
pub struct RunHandle {
    pub progress: Receiver<Progress>,
    cancel: CancelToken,
    handle: JoinHandle<Result<RunOutput, AppError>>,
}

impl RunHandle {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker to finish.
    pub fn join(self) -> Result<RunOutput, AppError> {
        self.handle
            .join()
            .map_err(|_| AppError::new(EXIT_INTERNAL, "Worker thread panicked."))?
    }
}

/// Start `config` on a dedicated thread with a fresh cancel token.
pub fn spawn<S>(config: RunConfig, source: S) -> Result<RunHandle, AppError>
where
    S: SeriesSource + Send + 'static,
{
    spawn_with_token(config, source, CancelToken::new())
}

/// Start `config` on a dedicated thread, observing an existing token.
pub fn spawn_with_token<S>(config: RunConfig, source: S, cancel: CancelToken) -> Result<RunHandle, AppError>
where
    S: SeriesSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let token = cancel.clone();

    let handle = thread::Builder::new()
        .name("assay-worker".to_string())
        .spawn(move || {
            debug!("worker started");
            let mut report = |p: Progress| {
                // The receiver may already be gone; progress is advisory.
                tx.send(p).ok();
            };
            run_pipeline(&config, &source, &token, &mut report)
        })
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to start worker thread: {e}")))?;

    Ok(RunHandle {
        progress: rx,
        cancel,
        handle,
    })
}
