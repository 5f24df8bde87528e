//! Fixed-size worker pool shared by every pipeline stage.
//!
//! Two ways to hand out work:
//! - [`WorkerPool::submit`] queues an owned task and returns a
//!   [`TaskHandle`]; [`WorkerPool::wait_all`] is the barrier for those.
//! - [`WorkerPool::for_each_region`] and [`WorkerPool::map`] run borrowed
//!   tasks and return once all of them finished, results in input order.
//!
//! A failing or panicking task never stops its siblings. Once everything
//! finished, the first failure (in submission or region order) is returned
//! and the remaining ones are logged.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::warn;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::picture::Region;

/// Counts outstanding submitted tasks.
#[derive(Default)]
struct Latch {
    pending: Mutex<usize>,
    done: Condvar,
}

impl Latch {
    fn increment(&self) {
        *lock(&self.pending) += 1;
    }

    fn decrement(&self) {
        let mut pending = lock(&self.pending);
        *pending -= 1;
        if *pending == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) {
        let mut pending = lock(&self.pending);
        while *pending > 0 {
            pending = self
                .done
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct Shared {
    latch: Latch,
    /// Failures of submitted tasks, tagged with their submission number.
    failures: Mutex<Vec<(u64, Error)>>,
}

/// Receives the result of one submitted task.
#[derive(Debug)]
pub struct TaskHandle<R> {
    rx: mpsc::Receiver<Result<R>>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task finished.
    ///
    /// # Errors
    /// - The task's own error, or [`Error::TaskPanicked`] if it panicked
    pub fn join(self) -> Result<R> {
        self.rx.recv().unwrap_or(Err(Error::TaskLost))
    }
}

pub struct WorkerPool {
    #[cfg(feature = "rayon")]
    pool: rayon::ThreadPool,
    threads: usize,
    shared: Arc<Shared>,
    next_task: AtomicU64,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Starts `threads` workers, or one per logical core if `threads` is 0.
    ///
    /// Without the `rayon` feature tasks run on the calling thread.
    ///
    /// # Errors
    /// - If the operating system refuses to spawn the threads
    #[cfg(feature = "rayon")]
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ivpsnr-worker-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        let threads = pool.current_num_threads();
        Ok(WorkerPool {
            pool,
            threads,
            shared: Arc::default(),
            next_task: AtomicU64::new(0),
        })
    }

    #[cfg(not(feature = "rayon"))]
    pub fn new(_threads: usize) -> Result<Self> {
        Ok(WorkerPool {
            threads: 1,
            shared: Arc::default(),
            next_task: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queues a task. Producers may keep submitting while workers run.
    pub fn submit<F, R>(&self, task: F) -> TaskHandle<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let seq = self.next_task.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        shared.latch.increment();

        let job = move || {
            let result = run_guarded(task);
            if let Err(ref e) = result {
                lock(&shared.failures).push((seq, e.clone()));
            }
            // the handle may already be gone
            let _ = tx.send(result);
            shared.latch.decrement();
        };

        #[cfg(feature = "rayon")]
        self.pool.spawn(job);
        #[cfg(not(feature = "rayon"))]
        job();

        TaskHandle { rx }
    }

    /// Barrier for submitted tasks.
    ///
    /// # Errors
    /// - The first failure among the tasks submitted since the last barrier
    pub fn wait_all(&self) -> Result<()> {
        self.shared.latch.wait();
        let mut failures = std::mem::take(&mut *lock(&self.shared.failures));
        failures.sort_by_key(|&(seq, _)| seq);
        first_failure(failures.into_iter().map(|(_, e)| Err::<(), _>(e))).map(|_| ())
    }

    /// Runs `task` once per tile of a `width`x`height` area and returns the
    /// results in row-major tile order.
    ///
    /// # Errors
    /// - The first failing tile's error
    pub fn for_each_region<R, F>(
        &self,
        width: usize,
        height: usize,
        tile_width: usize,
        tile_height: usize,
        task: F,
    ) -> Result<Vec<R>>
    where
        F: Fn(Region) -> Result<R> + Sync,
        R: Send,
    {
        let regions = Region::tile(width, height, tile_width, tile_height);
        self.map(&regions, |&region| task(region))
    }

    /// Runs `task` for every item and returns the results in item order.
    ///
    /// # Errors
    /// - The first failing item's error
    pub fn map<T, R, F>(&self, items: &[T], task: F) -> Result<Vec<R>>
    where
        T: Sync,
        F: Fn(&T) -> Result<R> + Sync,
        R: Send,
    {
        #[cfg(feature = "rayon")]
        let results: Vec<Result<R>> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| run_guarded(|| task(item)))
                .collect()
        });
        #[cfg(not(feature = "rayon"))]
        let results: Vec<Result<R>> = items
            .iter()
            .map(|item| run_guarded(|| task(item)))
            .collect();

        first_failure(results)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // drain submitted tasks before the threads go away
        self.shared.latch.wait();
        let failures = std::mem::take(&mut *lock(&self.shared.failures));
        for (seq, e) in failures {
            warn!("task {seq} failed and was never awaited: {e}");
        }
    }
}

fn first_failure<R>(results: impl IntoIterator<Item = Result<R>>) -> Result<Vec<R>> {
    let mut values = Vec::new();
    let mut first = None;
    for result in results {
        match result {
            Ok(v) => values.push(v),
            Err(e) if first.is_none() => first = Some(e),
            Err(e) => warn!("additional worker task failure: {e}"),
        }
    }
    first.map_or(Ok(values), Err)
}

fn run_guarded<R>(task: impl FnOnce() -> Result<R>) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(task))
        .unwrap_or_else(|payload| Err(Error::TaskPanicked(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
