//! Per-slot asynchronous thumbnail pipeline
//!
//! Thumbnails are produced on worker threads and handed back to the thread
//! that owns the pipeline (the UI thread) through a completion channel.
//! Each slot holds at most one outstanding request; issuing a new request for
//! a slot cancels the previous one, and any result that arrives for a request
//! that is no longer current is discarded without touching the slot.

use crate::cancel::{RequestId, SlotId, SlotRegistry};
use crate::worker::{JobExecutor, ThumbnailJob, WorkerPool, WorkerPoolConfig};
use doc_model::CancellationToken;
use log::{debug, info, warn};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Something that can produce a thumbnail image for a page.
///
/// `produce` runs on a worker thread. Implementations should poll
/// `token.is_cancelled()` between expensive steps and return `Ok(None)` as
/// soon as it is set, discarding any partial work.
pub trait ThumbnailSource: Send + Sync + 'static {
    /// Produced image type
    type Image: Send + Sync + 'static;

    /// Production failure
    type Error: fmt::Display + Send + 'static;

    /// Produce the thumbnail for `page_index`, or `None` if cancelled.
    fn produce(
        &self,
        page_index: u32,
        token: &CancellationToken,
    ) -> Result<Option<Self::Image>, Self::Error>;
}

/// Errors reported by the thumbnail pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to spawn thumbnail worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("thumbnail pipeline has shut down")]
    ShutDown,
}

/// Handle for an issued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHandle {
    pub slot: SlotId,
    pub page_index: u32,
    pub request_id: RequestId,
}

/// What a slot currently holds
#[derive(Debug)]
pub enum SlotState<I> {
    /// Request issued, no result yet
    Pending { page_index: u32 },
    /// Image produced for the slot's current request
    Ready { page_index: u32, image: Arc<I> },
    /// Production failed for the slot's current request
    Failed { page_index: u32 },
}

impl<I> SlotState<I> {
    pub fn page_index(&self) -> u32 {
        match self {
            Self::Pending { page_index }
            | Self::Ready { page_index, .. }
            | Self::Failed { page_index } => *page_index,
        }
    }
}

/// A delivered thumbnail, accepted on the owning thread
#[derive(Debug)]
pub struct ThumbnailReady<I> {
    pub slot: SlotId,
    pub page_index: u32,
    pub image: Arc<I>,
}

/// Pipeline statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Total requests issued
    pub requested: u64,

    /// Results written into their slot
    pub delivered: u64,

    /// Results dropped because their request was no longer current
    pub discarded: u64,

    /// Requests whose production failed
    pub failed: u64,
}

enum Outcome<I> {
    Produced(I),
    Cancelled,
    Failed(String),
}

struct Completion<I> {
    slot: SlotId,
    page_index: u32,
    request_id: RequestId,
    outcome: Outcome<I>,
}

/// Per-slot thumbnail pipeline with cancel-on-reuse semantics
///
/// The pipeline itself lives on the UI thread: `request`, `release` and
/// `drain` are called there, and slot state is only ever mutated there.
/// Worker threads only see a `ThumbnailJob` and a sending end of the
/// completion channel.
///
/// # Example
///
/// ```
/// use pageview_scheduler::{
///     CancellationToken, SlotId, ThumbnailPipeline, ThumbnailSource, WorkerPoolConfig,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Labels;
///
/// impl ThumbnailSource for Labels {
///     type Image = String;
///     type Error = std::convert::Infallible;
///
///     fn produce(
///         &self,
///         page_index: u32,
///         token: &CancellationToken,
///     ) -> Result<Option<String>, Self::Error> {
///         if token.is_cancelled() {
///             return Ok(None);
///         }
///         Ok(Some(format!("page {}", page_index + 1)))
///     }
/// }
///
/// let mut pipeline = ThumbnailPipeline::new(Arc::new(Labels), &WorkerPoolConfig::new(1))
///     .expect("pipeline should start");
///
/// pipeline.request(SlotId(0), 4).expect("request should be queued");
/// let ready = pipeline.wait_idle(Duration::from_secs(5));
///
/// assert_eq!(ready.len(), 1);
/// assert_eq!(*ready[0].image, "page 5");
/// ```
pub struct ThumbnailPipeline<S: ThumbnailSource> {
    registry: SlotRegistry,
    states: HashMap<SlotId, SlotState<S::Image>>,
    job_tx: Option<Sender<ThumbnailJob>>,
    done_rx: Receiver<Completion<S::Image>>,
    pool: Option<WorkerPool>,
    stats: PipelineStats,
}

impl<S: ThumbnailSource> ThumbnailPipeline<S> {
    /// Create a pipeline and start its workers
    ///
    /// # Arguments
    /// * `source` - Thumbnail producer shared by all workers
    /// * `config` - Worker pool configuration
    pub fn new(source: Arc<S>, config: &WorkerPoolConfig) -> Result<Self, PipelineError> {
        let (job_tx, job_rx) = mpsc::channel::<ThumbnailJob>();
        let (done_tx, done_rx) = mpsc::channel::<Completion<S::Image>>();

        let executor: JobExecutor = Arc::new(move |job: ThumbnailJob| {
            execute(source.as_ref(), &done_tx, job);
        });

        let pool = WorkerPool::new(Arc::new(Mutex::new(job_rx)), executor, config)?;
        info!("thumbnail pipeline started with {} worker(s)", pool.num_workers());

        Ok(Self {
            registry: SlotRegistry::new(),
            states: HashMap::new(),
            job_tx: Some(job_tx),
            done_rx,
            pool: Some(pool),
            stats: PipelineStats::default(),
        })
    }

    /// Request a thumbnail of `page_index` for `slot`
    ///
    /// Any outstanding request for the same slot is cancelled first, and the
    /// slot's previous image is dropped.
    pub fn request(
        &mut self,
        slot: SlotId,
        page_index: u32,
    ) -> Result<RequestHandle, PipelineError> {
        let job_tx = self.job_tx.as_ref().ok_or(PipelineError::ShutDown)?;

        if let Some(SlotState::Pending { page_index: previous }) = self.states.get(&slot) {
            debug!("slot {:?}: cancelling pending page {} for page {}", slot, previous, page_index);
        }

        let (request_id, token) = self.registry.issue(slot, page_index);
        self.states.insert(slot, SlotState::Pending { page_index });
        self.stats.requested += 1;

        let job = ThumbnailJob { slot, page_index, request_id, token };
        if job_tx.send(job).is_err() {
            self.registry.cancel(slot);
            self.states.remove(&slot);
            return Err(PipelineError::ShutDown);
        }

        Ok(RequestHandle { slot, page_index, request_id })
    }

    /// Reset a slot that is being recycled or destroyed
    ///
    /// Cancels its outstanding request and drops its image. Returns `true`
    /// if the slot held anything.
    pub fn release(&mut self, slot: SlotId) -> bool {
        let was_bound = self.registry.cancel(slot);
        self.states.remove(&slot).is_some() || was_bound
    }

    /// Cancel every outstanding request and clear all slots
    ///
    /// Returns the number of slots that were bound.
    pub fn cancel_all(&mut self) -> usize {
        self.states.clear();
        self.registry.cancel_all()
    }

    /// Current state of a slot
    pub fn state(&self, slot: SlotId) -> Option<&SlotState<S::Image>> {
        self.states.get(&slot)
    }

    /// Image held by a slot, if its current request completed
    pub fn image(&self, slot: SlotId) -> Option<&Arc<S::Image>> {
        match self.states.get(&slot) {
            Some(SlotState::Ready { image, .. }) => Some(image),
            _ => None,
        }
    }

    /// Page index a slot is bound to
    pub fn page_for(&self, slot: SlotId) -> Option<u32> {
        self.registry.page_for(slot)
    }

    /// Number of slots still waiting for a result
    pub fn outstanding(&self) -> usize {
        self.states.values().filter(|state| matches!(state, SlotState::Pending { .. })).count()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Accept every completion that has arrived, without blocking
    ///
    /// Must be called on the owning thread. Stale results are discarded.
    pub fn drain(&mut self) -> Vec<ThumbnailReady<S::Image>> {
        let mut ready = Vec::new();
        while let Ok(completion) = self.done_rx.try_recv() {
            if let Some(delivered) = self.accept(completion) {
                ready.push(delivered);
            }
        }
        ready
    }

    /// Block until no slot is pending or `timeout` elapses
    ///
    /// Returns everything delivered while waiting.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<ThumbnailReady<S::Image>> {
        let deadline = Instant::now() + timeout;
        let mut ready = self.drain();

        while self.outstanding() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.done_rx.recv_timeout(remaining) {
                Ok(completion) => {
                    if let Some(delivered) = self.accept(completion) {
                        ready.push(delivered);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        ready
    }

    /// Cancel everything and stop the workers
    ///
    /// Blocks until every worker has exited.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let cancelled = self.cancel_all();
        self.job_tx.take();
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
            info!("thumbnail pipeline shut down ({} slot(s) cancelled)", cancelled);
        }
    }

    fn accept(&mut self, completion: Completion<S::Image>) -> Option<ThumbnailReady<S::Image>> {
        let Completion { slot, page_index, request_id, outcome } = completion;

        if !self.registry.is_current(slot, request_id) {
            debug!(
                "discarding stale thumbnail for slot {:?} (page {}, request {})",
                slot, page_index, request_id
            );
            self.stats.discarded += 1;
            return None;
        }

        match outcome {
            Outcome::Produced(image) => {
                let image = Arc::new(image);
                self.states.insert(slot, SlotState::Ready { page_index, image: image.clone() });
                self.stats.delivered += 1;
                Some(ThumbnailReady { slot, page_index, image })
            }
            Outcome::Cancelled => {
                self.registry.cancel(slot);
                self.states.remove(&slot);
                None
            }
            Outcome::Failed(message) => {
                warn!("thumbnail for page {} failed: {}", page_index, message);
                self.states.insert(slot, SlotState::Failed { page_index });
                self.stats.failed += 1;
                None
            }
        }
    }
}

impl<S: ThumbnailSource> Drop for ThumbnailPipeline<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Runs one job on a worker thread.
///
/// A panicking producer fails only its own slot; the worker keeps serving
/// the queue.
fn execute<S: ThumbnailSource>(
    source: &S,
    done_tx: &Sender<Completion<S::Image>>,
    job: ThumbnailJob,
) {
    let ThumbnailJob { slot, page_index, request_id, token } = job;

    let produced = panic::catch_unwind(AssertUnwindSafe(|| source.produce(page_index, &token)));
    let outcome = match produced {
        Ok(Ok(Some(image))) => Outcome::Produced(image),
        Ok(Ok(None)) => Outcome::Cancelled,
        Ok(Err(err)) => Outcome::Failed(err.to_string()),
        Err(payload) => {
            Outcome::Failed(format!("producer panicked: {}", panic_message(&*payload)))
        }
    };

    // A cancelled request's slot has already moved on; nothing to report.
    if token.is_cancelled() {
        debug!("worker: dropping result of cancelled request {} (page {})", request_id, page_index);
        return;
    }

    let _ = done_tx.send(Completion { slot, page_index, request_id, outcome });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Condvar;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(5);

    /// Produces "page N" labels immediately.
    struct Labels;

    impl ThumbnailSource for Labels {
        type Image = String;
        type Error = String;

        fn produce(
            &self,
            page_index: u32,
            token: &CancellationToken,
        ) -> Result<Option<String>, String> {
            if token.is_cancelled() {
                return Ok(None);
            }
            Ok(Some(format!("page {}", page_index)))
        }
    }

    /// Holds production of gated pages until `open` is called.
    #[derive(Default)]
    struct Gated {
        gated_page: u32,
        open: Mutex<bool>,
        opened: Condvar,
        started: AtomicUsize,
        finished_after_cancel: AtomicUsize,
    }

    impl Gated {
        fn new(gated_page: u32) -> Self {
            Self { gated_page, ..Self::default() }
        }

        fn open(&self) {
            let mut open = self.open.lock().unwrap();
            *open = true;
            self.opened.notify_all();
        }

        fn wait_started(&self, count: usize) {
            let deadline = Instant::now() + WAIT;
            while self.started.load(Ordering::SeqCst) < count && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    impl ThumbnailSource for Gated {
        type Image = String;
        type Error = String;

        fn produce(
            &self,
            page_index: u32,
            token: &CancellationToken,
        ) -> Result<Option<String>, String> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if page_index == self.gated_page {
                let mut open = self.open.lock().unwrap();
                while !*open {
                    open = self.opened.wait(open).unwrap();
                }
            }
            if token.is_cancelled() {
                self.finished_after_cancel.fetch_add(1, Ordering::SeqCst);
                return Ok(None);
            }
            Ok(Some(format!("page {}", page_index)))
        }
    }

    struct Failing;

    impl ThumbnailSource for Failing {
        type Image = String;
        type Error = String;

        fn produce(
            &self,
            page_index: u32,
            _token: &CancellationToken,
        ) -> Result<Option<String>, String> {
            Err(format!("page {} is corrupt", page_index))
        }
    }

    /// Panics while producing `broken_page`, labels every other page.
    struct Panicking {
        broken_page: u32,
    }

    impl ThumbnailSource for Panicking {
        type Image = String;
        type Error = String;

        fn produce(
            &self,
            page_index: u32,
            _token: &CancellationToken,
        ) -> Result<Option<String>, String> {
            if page_index == self.broken_page {
                panic!("page {} has a malformed content stream", page_index);
            }
            Ok(Some(format!("page {}", page_index)))
        }
    }

    #[test]
    fn test_request_delivers_image_into_slot() {
        let mut pipeline = ThumbnailPipeline::new(Arc::new(Labels), &WorkerPoolConfig::new(2))
            .expect("pipeline should start");

        let handle = pipeline.request(SlotId(3), 7).expect("request should be queued");
        assert_eq!(handle.slot, SlotId(3));
        assert_eq!(handle.page_index, 7);
        assert!(matches!(pipeline.state(SlotId(3)), Some(SlotState::Pending { .. })));
        assert_eq!(pipeline.state(SlotId(3)).map(SlotState::page_index), Some(7));

        let ready = pipeline.wait_idle(WAIT);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].slot, SlotId(3));
        assert_eq!(ready[0].page_index, 7);
        assert_eq!(pipeline.image(SlotId(3)).map(|image| image.as_str()), Some("page 7"));
        assert_eq!(pipeline.state(SlotId(3)).map(SlotState::page_index), Some(7));
        assert_eq!(pipeline.outstanding(), 0);
        assert_eq!(pipeline.stats().delivered, 1);
    }

    #[test]
    fn test_reissued_slot_only_holds_second_result() {
        let source = Arc::new(Gated::new(1));
        let mut pipeline = ThumbnailPipeline::new(source.clone(), &WorkerPoolConfig::new(2))
            .expect("pipeline should start");

        pipeline.request(SlotId(0), 1).expect("first request");
        source.wait_started(1);

        pipeline.request(SlotId(0), 2).expect("second request");
        let ready = pipeline.wait_idle(WAIT);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].page_index, 2);

        // Let the first (cancelled) production finish late.
        source.open();
        thread::sleep(Duration::from_millis(50));
        assert!(pipeline.drain().is_empty());

        assert_eq!(pipeline.image(SlotId(0)).map(|image| image.as_str()), Some("page 2"));
        assert_eq!(pipeline.page_for(SlotId(0)), Some(2));
        assert_eq!(source.finished_after_cancel.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_result_is_discarded_on_owning_thread() {
        let mut pipeline = ThumbnailPipeline::new(Arc::new(Labels), &WorkerPoolConfig::new(2))
            .expect("pipeline should start");

        let first = pipeline.request(SlotId(0), 1).expect("first request");
        pipeline.request(SlotId(0), 2).expect("second request");
        pipeline.wait_idle(WAIT);

        // A result for the first request that slipped past the worker's check
        let late = Completion {
            slot: SlotId(0),
            page_index: 1,
            request_id: first.request_id,
            outcome: Outcome::Produced("page 1".to_owned()),
        };
        let discarded_before = pipeline.stats().discarded;

        assert!(pipeline.accept(late).is_none());
        assert_eq!(pipeline.stats().discarded, discarded_before + 1);
        assert_eq!(pipeline.image(SlotId(0)).map(|image| image.as_str()), Some("page 2"));
    }

    #[test]
    fn test_release_discards_late_result() {
        let source = Arc::new(Gated::new(4));
        let mut pipeline = ThumbnailPipeline::new(source.clone(), &WorkerPoolConfig::new(1))
            .expect("pipeline should start");

        pipeline.request(SlotId(1), 4).expect("request");
        source.wait_started(1);

        assert!(pipeline.release(SlotId(1)));
        assert!(pipeline.state(SlotId(1)).is_none());

        source.open();
        thread::sleep(Duration::from_millis(50));
        assert!(pipeline.drain().is_empty());
        assert!(pipeline.image(SlotId(1)).is_none());
    }

    #[test]
    fn test_failure_marks_slot_failed() {
        let mut pipeline = ThumbnailPipeline::new(Arc::new(Failing), &WorkerPoolConfig::new(1))
            .expect("pipeline should start");

        pipeline.request(SlotId(0), 3).expect("request");
        let ready = pipeline.wait_idle(WAIT);

        assert!(ready.is_empty());
        assert!(matches!(pipeline.state(SlotId(0)), Some(SlotState::Failed { page_index: 3 })));
        assert_eq!(pipeline.stats().failed, 1);
    }

    #[test]
    fn test_panicking_producer_fails_only_its_slot() {
        let source = Arc::new(Panicking { broken_page: 0 });
        let mut pipeline = ThumbnailPipeline::new(source, &WorkerPoolConfig::new(1))
            .expect("pipeline should start");

        pipeline.request(SlotId(0), 0).expect("request");
        pipeline.request(SlotId(1), 5).expect("request");
        let ready = pipeline.wait_idle(WAIT);

        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].page_index, 5);
        assert!(matches!(pipeline.state(SlotId(0)), Some(SlotState::Failed { page_index: 0 })));
        assert_eq!(pipeline.image(SlotId(1)).map(|image| image.as_str()), Some("page 5"));
        assert_eq!(pipeline.outstanding(), 0);
        assert_eq!(pipeline.stats().failed, 1);

        // The lone worker survived the panic and still serves new requests.
        pipeline.request(SlotId(0), 7).expect("request");
        let ready = pipeline.wait_idle(WAIT);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].page_index, 7);
    }

    #[test]
    fn test_cancel_all_clears_every_slot() {
        let source = Arc::new(Gated::new(0));
        let mut pipeline = ThumbnailPipeline::new(source.clone(), &WorkerPoolConfig::new(1))
            .expect("pipeline should start");

        pipeline.request(SlotId(0), 0).expect("request");
        pipeline.request(SlotId(1), 1).expect("request");

        assert_eq!(pipeline.cancel_all(), 2);
        assert_eq!(pipeline.outstanding(), 0);

        source.open();
        thread::sleep(Duration::from_millis(50));
        assert!(pipeline.drain().is_empty());
    }

    #[test]
    fn test_shutdown_joins_workers() {
        let source = Arc::new(Gated::new(0));
        let mut pipeline = ThumbnailPipeline::new(source.clone(), &WorkerPoolConfig::new(1))
            .expect("pipeline should start");

        pipeline.request(SlotId(0), 0).expect("request");
        source.wait_started(1);
        source.open();

        // Completes only if the worker observed the cancellation and exited
        pipeline.shutdown();
    }
}
