//! Process-wide settings of the processing frameworks.
//!
//! The settings live behind one lock. A framework reads them once when it starts, so changing
//! them while another thread runs a framework only affects later calls.
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};

/// Below this many estimated operations a framework stays on the calling thread.
pub const DEFAULT_THREADING_THRESHOLD: usize = 10_000;

#[derive(Default)]
struct Settings {
    /// Zero means the hardware concurrency.
    threads: usize,
    threshold: Option<usize>,
    pool: Option<Arc<ThreadPool>>,
}

static SETTINGS: OnceLock<RwLock<Settings>> = OnceLock::new();

fn settings() -> &'static RwLock<Settings> {
    SETTINGS.get_or_init(|| RwLock::new(Settings::default()))
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// The number of threads frameworks use unless told otherwise.
pub fn number_of_threads() -> usize {
    let settings = settings().read().unwrap_or_else(PoisonError::into_inner);
    match settings.threads {
        0 => default_threads(),
        n => n,
    }
}

/// Set the number of threads, `0` restores the hardware concurrency.
pub fn set_number_of_threads(threads: usize) {
    let mut settings = settings().write().unwrap_or_else(PoisonError::into_inner);
    if settings.threads != threads {
        log::debug!("number of threads set to {threads}");
        settings.threads = threads;
        settings.pool = None;
    }
}

/// The minimum estimated number of operations for which a framework goes parallel.
pub fn threading_threshold() -> usize {
    let settings = settings().read().unwrap_or_else(PoisonError::into_inner);
    settings.threshold.unwrap_or(DEFAULT_THREADING_THRESHOLD)
}

pub fn set_threading_threshold(operations: usize) {
    let mut settings = settings().write().unwrap_or_else(PoisonError::into_inner);
    settings.threshold = Some(operations);
}

/// The shared pool with [`number_of_threads`] workers.
///
/// Built on first use and again after the number of threads changed.
pub fn thread_pool() -> Result<Arc<ThreadPool>> {
    if let Some(pool) = &settings().read().unwrap_or_else(PoisonError::into_inner).pool {
        return Ok(Arc::clone(pool));
    }

    let mut settings = settings().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(pool) = &settings.pool {
        return Ok(Arc::clone(pool));
    }

    let threads = match settings.threads {
        0 => default_threads(),
        n => n,
    };
    let pool = Arc::new(build_pool(threads)?);
    settings.pool = Some(Arc::clone(&pool));
    Ok(pool)
}

/// A pool with exactly `threads` workers, the shared one when the count matches.
pub(crate) fn pool_for(threads: usize) -> Result<Arc<ThreadPool>> {
    if threads == number_of_threads() {
        thread_pool()
    } else {
        build_pool(threads).map(Arc::new)
    }
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    log::debug!("building a pool of {threads} threads");
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|index| format!("ndimage-{index}"))
        .build()
        .map_err(|err| Error::allocation(format!("could not start worker threads: {err}")))
}
