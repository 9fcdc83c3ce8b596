use crate::error::{PipelineError, Result};
use log::debug;
use rayon::prelude::*;
use std::io;

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of threads to use
    pub threads: usize,

    /// Records buffered per batch; bounds read-ahead
    pub chunk_size: usize,
}

/// Runs per-record work on a dedicated thread pool, returning results in
/// input order regardless of which worker finishes first.
pub struct ParallelExecutor {
    /// Thread pool
    pool: rayon::ThreadPool,

    /// Configuration
    config: ParallelConfig,
}

impl ParallelExecutor {
    /// Create a new parallel executor
    pub fn new(config: ParallelConfig) -> Result<Self> {
        if config.threads == 0 || config.chunk_size == 0 {
            return Err(PipelineError::InvalidParameter(format!(
                "threads ({}) and chunk size ({}) must be positive",
                config.threads, config.chunk_size
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| {
                PipelineError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to build thread pool: {}", e),
                ))
            })?;
        debug!(
            "Thread pool ready: {} threads, batches of {}",
            config.threads, config.chunk_size
        );

        Ok(ParallelExecutor { pool, config })
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Applies `processor` to every item; `result[i]` belongs to `items[i]`.
    pub fn map_ordered<T, U, F>(&self, items: &[T], processor: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        self.pool
            .install(|| items.par_iter().map(|item| processor(item)).collect())
    }
}
