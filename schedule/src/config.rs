//! Reduction planner configuration.
//!
//! Provides typed configuration with bon builders.
//! Supports both explicit configuration and environment variable fallbacks.

use bon::bon;

/// Tunables of the reduction tiling heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionConfig {
    /// Minimum number of minor reduced elements each row thread handles
    /// before another warp of threads is added.
    pub min_elements_per_thread: usize,
    /// Threads per block the row strategy aims for when several output rows
    /// share a block.
    pub threads_per_block_target: usize,
    /// Upper bound on threads cooperating on one output row.
    pub max_row_threads: usize,
    /// Largest batch (major reduced extent) a row reduction may loop over
    /// inside one block.
    pub batch_race_free_bound: usize,
    /// Elements per row thread assumed by the race-free bound:
    /// rows longer than `max_row_threads * row_tile_elements_per_thread`
    /// would need a cross-block combine.
    pub row_tile_elements_per_thread: usize,
    /// Reduced rows per column thread assumed by the race-free bound.
    pub column_tile_rows_per_thread: usize,
    /// Allow vectorized loads along the minor dimension.
    pub vectorize: bool,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            min_elements_per_thread: 16,
            threads_per_block_target: 256,
            max_row_threads: 1024,
            batch_race_free_bound: 8,
            row_tile_elements_per_thread: 16,
            column_tile_rows_per_thread: 128,
            vectorize: true,
        }
    }
}

#[bon]
impl ReductionConfig {
    /// Create a reduction configuration with builder pattern.
    #[builder]
    pub fn builder(
        #[builder(default = 16)] min_elements_per_thread: usize,
        #[builder(default = 256)] threads_per_block_target: usize,
        #[builder(default = 1024)] max_row_threads: usize,
        #[builder(default = 8)] batch_race_free_bound: usize,
        #[builder(default = 16)] row_tile_elements_per_thread: usize,
        #[builder(default = 128)] column_tile_rows_per_thread: usize,
        #[builder(default = true)] vectorize: bool,
    ) -> Self {
        Self {
            min_elements_per_thread,
            threads_per_block_target,
            max_row_threads,
            batch_race_free_bound,
            row_tile_elements_per_thread,
            column_tile_rows_per_thread,
            vectorize,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `STRIDER_NO_VECTORIZE` - Disable vectorized loads if set
    /// * `STRIDER_ROW_THREADS_MAX` - Max threads per output row (default: 1024)
    /// * `STRIDER_THREADS_PER_BLOCK` - Row threads-per-block target (default: 256)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`ReductionConfig::from_env`] with an explicit variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str, default: usize| {
            lookup(key).and_then(|s| s.parse().ok()).filter(|&v: &usize| v > 0).unwrap_or(default)
        };
        let vectorize = lookup("STRIDER_NO_VECTORIZE").is_none();
        let max_row_threads = parse("STRIDER_ROW_THREADS_MAX", defaults.max_row_threads);
        let threads_per_block_target = parse("STRIDER_THREADS_PER_BLOCK", defaults.threads_per_block_target);

        Self { vectorize, max_row_threads, threads_per_block_target, ..defaults }
    }

    /// Name of the first numeric tunable set to zero, if any.
    ///
    /// The builder accepts any value; planning rejects zeros.
    pub fn zero_tunable(&self) -> Option<&'static str> {
        [
            ("min_elements_per_thread", self.min_elements_per_thread),
            ("threads_per_block_target", self.threads_per_block_target),
            ("max_row_threads", self.max_row_threads),
            ("batch_race_free_bound", self.batch_race_free_bound),
            ("row_tile_elements_per_thread", self.row_tile_elements_per_thread),
            ("column_tile_rows_per_thread", self.column_tile_rows_per_thread),
        ]
        .into_iter()
        .find_map(|(name, value)| (value == 0).then_some(name))
    }
}
