//! Rayon pool sizing for the reduction and summary paths

use crate::errors::{MeteoError, Result};
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

/// Requested size of the global rayon pool; `None` keeps rayon's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Install the global pool and return the thread count reductions run on.
    ///
    /// # Errors
    ///
    /// Returns [`MeteoError::ThreadPool`] for a zero thread count, or when the
    /// global pool was already built.
    pub fn setup_global_pool(self) -> Result<usize> {
        if let Some(threads) = self.num_threads {
            if threads == 0 {
                return Err(MeteoError::ThreadPool("thread count must be at least 1".into()));
            }
            ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .map_err(|e| {
                    MeteoError::ThreadPool(format!("cannot size pool to {threads} threads: {e}"))
                })?;
        }
        let threads = rayon::current_num_threads();
        info!(threads, "thread pool ready");
        debug!(cores = num_cpus::get(), "available cores");
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(
            ParallelConfig::new(Some(0)).setup_global_pool(),
            Err(MeteoError::ThreadPool(_))
        ));
    }

    #[test]
    fn default_pool_reports_its_size() {
        assert_eq!(ParallelConfig::default().num_threads, None);
        assert!(ParallelConfig::default().setup_global_pool().unwrap() >= 1);
    }
}
