//! World configuration.

/// Tuning knobs for a [`World`](crate::World).
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Worker threads for parallel systems and sorting.
    /// `0` runs on rayon's global pool instead of a dedicated one.
    pub workers: usize,

    /// Smallest slice of a partial pack handed to one worker.
    pub min_entities_per_worker: usize,

    /// Orderings over fewer entities than this sort on one thread.
    pub sort_parallel_threshold: usize,

    /// Whether parallel systems may fan out at all. When off, every system
    /// runs inline on the ticking thread.
    pub parallel: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            min_entities_per_worker: 64,
            sort_parallel_threshold: 2048,
            parallel: true,
        }
    }
}

impl WorldConfig {
    /// Use a dedicated pool of `workers` threads.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the smallest per-worker slice.
    #[must_use]
    pub const fn with_min_entities_per_worker(mut self, min: usize) -> Self {
        self.min_entities_per_worker = min;
        self
    }

    /// Set the parallel sort threshold.
    #[must_use]
    pub const fn with_sort_parallel_threshold(mut self, threshold: usize) -> Self {
        self.sort_parallel_threshold = threshold;
        self
    }

    /// Run everything on the ticking thread.
    #[must_use]
    pub const fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}
