//! Cooperative progress reporting and cancellation.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Clones observe the same flag. Cancellation is cooperative: in-flight
/// IO completes, and the owning stage aborts at its next checkpoint.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

/// Callback invoked at each pipeline step: (current, total, label).
pub type ProgressFn = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Step counter for one pipeline run.
///
/// Each [`step`](Self::step) is a cancellation checkpoint and a
/// cooperative yield point, so a UI task on the same runtime gets a
/// chance to repaint between stages.
pub struct Progress {
    total: usize,
    current: usize,
    callback: Option<ProgressFn>,
    token: CancellationToken,
}

impl Progress {
    pub fn new(total: usize, token: CancellationToken, callback: Option<ProgressFn>) -> Self {
        Self {
            total,
            current: 0,
            callback,
            token,
        }
    }

    /// Advance to the next step.
    ///
    /// Returns [`Error::Cancelled`] if cancellation was requested since
    /// the previous step.
    pub async fn step(&mut self, label: &str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.current += 1;
        if let Some(callback) = &self.callback {
            callback(self.current, self.total, label);
        }

        tokio::task::yield_now().await;
        Ok(())
    }

    /// Steps taken so far.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Total steps this run will take.
    pub fn total(&self) -> usize {
        self.total
    }
}
