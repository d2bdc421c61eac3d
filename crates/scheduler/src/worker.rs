//! Thumbnail worker pool.
//!
//! This module provides a small pool of worker threads that execute
//! thumbnail jobs off the interactive thread. Workers share one job queue,
//! check for shutdown between jobs, and hand every job to the executor
//! callback, which owns cancellation checks and result delivery.

use crate::cancel::{RequestId, SlotId};
use doc_model::{CancellationToken, ViewerConfig};
use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, RecvTimeoutError},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A unit of thumbnail work handed to a worker.
#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    /// Slot the result is destined for
    pub slot: SlotId,

    /// Page to produce a thumbnail for (zero-based)
    pub page_index: u32,

    /// Request this job belongs to
    pub request_id: RequestId,

    /// Token cancelled when the slot is reused or released
    pub token: CancellationToken,
}

/// Runs one thumbnail job on a worker thread.
///
/// Workers invoke this callback for each job they pull from the queue.
/// The callback should check `job.token.is_cancelled()` before delivering
/// anything and return early if the job has been cancelled.
pub type JobExecutor = Arc<dyn Fn(ThumbnailJob) + Send + Sync>;

/// Shared receiving end of the job queue.
pub(crate) type JobQueue = Arc<Mutex<Receiver<ThumbnailJob>>>;

/// Configuration for the thumbnail worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Thumbnail worker threads (at least one).
    /// Default: 2.
    pub num_workers: usize,

    /// How long an idle worker blocks on the queue before re-checking shutdown.
    /// Default: 50ms.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl WorkerPoolConfig {
    /// Pool of `num_workers` workers, clamped to at least one.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Override the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl From<&ViewerConfig> for WorkerPoolConfig {
    fn from(config: &ViewerConfig) -> Self {
        Self::new(config.thumbnail_workers)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms.max(1)))
    }
}

/// Thumbnail worker pool.
///
/// The pool spawns worker threads that pull jobs from a shared queue and
/// run them through the executor callback. Workers exit when the pool is
/// shut down or when the sending side of the queue is dropped.
pub struct WorkerPool {
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn the workers.
    ///
    /// # Arguments
    ///
    /// * `jobs` - Shared job queue to pull jobs from
    /// * `executor` - Called once per dequeued job
    /// * `config` - Worker count and poll interval
    pub(crate) fn new(
        jobs: JobQueue,
        executor: JobExecutor,
        config: &WorkerPoolConfig,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers.max(1) {
            let worker = Worker::new(
                id,
                jobs.clone(),
                executor.clone(),
                shutdown.clone(),
                config.poll_interval,
            );
            match worker {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    // Stop the workers that did start before reporting.
                    shutdown.store(true, Ordering::Release);
                    for worker in workers {
                        worker.join();
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self { workers, shutdown })
    }

    /// Number of running workers.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to stop and join them.
    ///
    /// A worker finishes the job it is running first, so this blocks for
    /// at most one thumbnail render plus `poll_interval`.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);

        for worker in self.workers {
            worker.join();
        }
    }
}

/// One thumbnail worker thread.
struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        id: usize,
        jobs: JobQueue,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("thumbnail-worker-{}", id))
            .spawn(move || {
                Self::run(jobs, executor, shutdown, poll_interval);
            })?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }

    /// Main worker loop.
    ///
    /// Workers wait for the next job for at most `poll_interval`, then
    /// re-check the shutdown flag. A disconnected queue means the pipeline
    /// is gone and the worker exits.
    fn run(
        jobs: JobQueue,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            let next = match jobs.lock() {
                Ok(queue) => queue.recv_timeout(poll_interval),
                Err(_) => break,
            };

            match next {
                Ok(job) => {
                    if job.token.is_cancelled() {
                        log::debug!(
                            "worker: skipping cancelled request {} (slot {:?}, page {})",
                            job.request_id,
                            job.slot,
                            job.page_index
                        );
                        continue;
                    }
                    executor(job);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Wait for the worker thread to finish.
    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("thumbnail worker {} panicked", self.id);
            }
        }
    }
}
