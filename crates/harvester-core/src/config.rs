use std::path::PathBuf;
use tracing::error;

pub const DEFAULT_WORKERS: usize = 20;
pub const DEFAULT_QUEUE_SIZE: usize = 20;
/// Upper bounds for user-supplied counts; larger values are capped.
pub const MAX_WORKERS: usize = 1024;
pub const MAX_QUEUE_SIZE: usize = 65_536;
/// Repositories above this size (kB, as reported by the API) are not cloned.
pub const DEFAULT_SIZE_FILTER_KB: u64 = 1_000_000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineOptions {
    pub workers: usize,
    pub queue_size: usize,
    pub size_filter_kb: u64,
    pub skip_forks: bool,
    pub working_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            size_filter_kb: DEFAULT_SIZE_FILTER_KB,
            skip_forks: false,
            working_dir: PathBuf::from("working_dir"),
        }
    }
}

impl PipelineOptions {
    /// Builds options from raw user input. Counts below 1 reset to their
    /// defaults and counts above the maximum are capped.
    pub fn from_raw(
        workers: i64,
        queue_size: i64,
        size_filter_kb: u64,
        skip_forks: bool,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            workers: bounded_count("workers", workers, DEFAULT_WORKERS, MAX_WORKERS),
            queue_size: bounded_count("queue_size", queue_size, DEFAULT_QUEUE_SIZE, MAX_QUEUE_SIZE),
            size_filter_kb,
            skip_forks,
            working_dir,
        }
    }

    pub fn size_filter_enabled(&self) -> bool {
        self.size_filter_kb > 0
    }
}

fn bounded_count(name: &str, value: i64, default: usize, max: usize) -> usize {
    if value < 1 {
        error!(option = name, value, default, "value is too small; resetting");
        return default;
    }
    match usize::try_from(value) {
        Ok(count) if count <= max => count,
        _ => {
            error!(option = name, value, max, "value is too large; capping");
            max
        }
    }
}
