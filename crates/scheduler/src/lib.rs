//! Pageview Scheduler Library
//!
//! Off-thread thumbnail production with per-slot cancellation.
//!
//! This crate provides the asynchronous half of the page viewer: a small
//! worker pool that produces thumbnail images, a registry that binds each
//! reusable strip slot to a single outstanding request, and a pipeline that
//! hands finished images back to the owning (UI) thread only while the
//! request that produced them is still current.
//!
//! # Example
//!
//! ```
//! use pageview_scheduler::{
//!     CancellationToken, SlotId, ThumbnailPipeline, ThumbnailSource, WorkerPoolConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct PageNumbers;
//!
//! impl ThumbnailSource for PageNumbers {
//!     type Image = u32;
//!     type Error = std::convert::Infallible;
//!
//!     fn produce(
//!         &self,
//!         page_index: u32,
//!         token: &CancellationToken,
//!     ) -> Result<Option<u32>, Self::Error> {
//!         Ok((!token.is_cancelled()).then_some(page_index))
//!     }
//! }
//!
//! let mut pipeline = ThumbnailPipeline::new(Arc::new(PageNumbers), &WorkerPoolConfig::default())
//!     .expect("pipeline should start");
//!
//! // The strip scrolled: slot 0 now shows page 8 instead of page 2.
//! pipeline.request(SlotId(0), 2).expect("request should be queued");
//! pipeline.request(SlotId(0), 8).expect("request should be queued");
//!
//! pipeline.wait_idle(Duration::from_secs(5));
//! assert_eq!(pipeline.image(SlotId(0)).map(|page| **page), Some(8));
//! ```

mod cancel;
mod pipeline;
mod worker;

// Re-export public API
pub use cancel::{RequestId, SlotId, SlotRegistry};
pub use doc_model::CancellationToken;
pub use pipeline::{
    PipelineError, PipelineStats, RequestHandle, SlotState, ThumbnailPipeline, ThumbnailReady,
    ThumbnailSource,
};
pub use worker::WorkerPoolConfig;
