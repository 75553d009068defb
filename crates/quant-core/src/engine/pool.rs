//! Bounded worker pool for CPU-bound analytics

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{AnalysisError, Result};

/// rayon pool awaited from async code.
///
/// A job whose caller stopped waiting (for example after a timeout) still
/// runs to completion; its result is discarded.
#[derive(Debug, Clone)]
pub struct ComputePool {
    pool: Arc<rayon::ThreadPool>,
}

impl ComputePool {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("quant-compute-{index}"))
            .build()
            .map_err(|e| AnalysisError::Computation(format!("failed to start compute pool: {e}")))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` on the pool and await its result. Panics inside the job
    /// surface as `Computation` errors.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                Err(AnalysisError::Computation("compute job panicked".to_string()))
            });
            if tx.send(outcome).is_err() {
                tracing::debug!("Compute result dropped; caller no longer waiting");
            }
        });

        rx.await
            .map_err(|_| AnalysisError::Computation("compute worker went away".to_string()))?
    }
}
