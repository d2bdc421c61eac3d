use crate::pager::{Pager, PageChange, ProgrammaticTransition, ScrollOffset, ViewportSize};
use crate::sitemap::SitemapIndex;
use crate::strip::{SlotChange, StripLayout, ThumbnailStrip};
use crate::thumbnails::DocumentThumbnails;
use doc_model::{Document, PageCount, PageIndex, RgbaImage, SitemapEntry, ViewerConfig};
use log::{debug, info, warn};
use pageview_scheduler::{
    PipelineError, PipelineStats, SlotId, ThumbnailPipeline, ThumbnailReady, WorkerPoolConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// Outward notifications, delivered in commit order.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent {
    PageChanged { index: PageIndex, page_count: u32, counter: PageCount },
    SitemapSelectionChanged { row: Option<usize> },
    /// The pager view should scroll so `index` fills the viewport.
    ScrollToPage { index: PageIndex },
    /// The page at `index` is now shown and should be rendered.
    RenderPage { index: PageIndex },
    ThumbnailReady { slot: SlotId, page_index: PageIndex, image: Arc<RgbaImage> },
}

pub trait NavigationObserver {
    fn on_event(&mut self, event: &NavigationEvent);
}

impl<F: FnMut(&NavigationEvent)> NavigationObserver for F {
    fn on_event(&mut self, event: &NavigationEvent) {
        self(event)
    }
}

/// A request to jump to a page, consumed by [`NavigationCoordinator::navigate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationIntent {
    Thumbnail(PageIndex),
    Sitemap(SitemapEntry),
    Page(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("failed to start thumbnail pipeline: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Host-supplied session parameters.
#[derive(Debug, Clone, Default)]
pub struct NavigationOptions {
    /// Shown as the viewer title; the document's file name when `None`.
    pub title: Option<String>,
    /// Out-of-range values open the first page.
    pub start_page_index: i64,
    pub sitemap: Option<Vec<SitemapEntry>>,
    pub config: ViewerConfig,
    pub viewport: ViewportSize,
}

type Thumbnails<D> = ThumbnailPipeline<DocumentThumbnails<D>>;

/// Keeps the pager, thumbnail strip, page counter and sitemap selection
/// consistent with the pager's current index.
///
/// Everything here runs on the thread that owns the UI. Thumbnails are
/// produced on worker threads and only reach observers through
/// [`pump`](Self::pump) or [`wait_for_thumbnails`](Self::wait_for_thumbnails).
pub struct NavigationCoordinator<D: Document> {
    document: Arc<D>,
    title: String,
    pager: Pager,
    sitemap: Option<SitemapIndex>,
    active_row: Option<usize>,
    strip: ThumbnailStrip,
    thumbnails: Option<Thumbnails<D>>,
    viewport: ViewportSize,
    observers: Vec<Box<dyn NavigationObserver>>,
}

impl<D: Document> NavigationCoordinator<D> {
    pub fn new(document: Arc<D>, options: NavigationOptions) -> Result<Self, NavigationError> {
        let NavigationOptions { title, start_page_index, sitemap, config, viewport } = options;
        let page_count = document.page_count();

        let title = title.unwrap_or_else(|| document.file_name().to_string());
        let sitemap = sitemap.map(SitemapIndex::new);

        let mut pager = Pager::new(page_count, config.axis);
        if (0..i64::from(page_count)).contains(&start_page_index) {
            pager.set_index(start_page_index);
        } else {
            debug!(
                "start page {} out of range (page_count {}), opening page 0",
                start_page_index, page_count
            );
        }
        let current = pager.current_index();

        let mut strip = ThumbnailStrip::new(
            StripLayout::from_config(&config),
            page_count,
            config.thumbnails_enabled,
            viewport.width,
        );
        strip.set_active(current);

        let thumbnails = if config.thumbnails_enabled {
            let source = DocumentThumbnails::new(document.clone(), config.thumbnail_size());
            Some(ThumbnailPipeline::new(Arc::new(source), &WorkerPoolConfig::from(&config))?)
        } else {
            None
        };

        let active_row = sitemap.as_ref().and_then(|sitemap| sitemap.active_row(current));

        info!(
            "opened {:?}: {} page(s), starting at {}, sitemap {}",
            title,
            page_count,
            current,
            sitemap.as_ref().map_or(0, SitemapIndex::len)
        );

        let mut coordinator = Self {
            document,
            title,
            pager,
            sitemap,
            active_row,
            strip,
            thumbnails,
            viewport,
            observers: Vec::new(),
        };
        coordinator.sync_slots();

        Ok(coordinator)
    }

    pub fn subscribe(&mut self, observer: impl NavigationObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn document(&self) -> &Arc<D> {
        &self.document
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn current_index(&self) -> PageIndex {
        self.pager.current_index()
    }

    pub fn page_count(&self) -> u32 {
        self.pager.page_count()
    }

    pub fn page_counter(&self) -> PageCount {
        PageCount::for_index(self.current_index(), self.page_count())
    }

    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn is_suppressing_feedback(&self) -> bool {
        self.pager.is_suppressing_feedback()
    }

    /// `(title, page label)` for each sitemap row.
    pub fn sitemap_rows(&self) -> Vec<(&str, String)> {
        self.sitemap
            .iter()
            .flat_map(SitemapIndex::entries)
            .map(|entry| (entry.title.as_str(), entry.page_label()))
            .collect()
    }

    /// Row highlighted in the sitemap list; `None` before the first section.
    pub fn active_sitemap_row(&self) -> Option<usize> {
        self.active_row
    }

    pub fn strip(&self) -> &ThumbnailStrip {
        &self.strip
    }

    pub fn strip_width(&self) -> f64 {
        self.strip.width()
    }

    pub fn thumbnail(&self, slot: SlotId) -> Option<&Arc<RgbaImage>> {
        self.thumbnails.as_ref()?.image(slot)
    }

    pub fn thumbnail_stats(&self) -> Option<PipelineStats> {
        self.thumbnails.as_ref().map(ThumbnailPipeline::stats)
    }

    /// Routes an intent into the pager. Returns whether the index changed.
    pub fn navigate(&mut self, intent: NavigationIntent) -> bool {
        let requested = match intent {
            NavigationIntent::Thumbnail(page_index) => {
                if !self.strip.is_enabled() {
                    debug!("thumbnails disabled; ignoring tap on page {}", page_index);
                    return false;
                }
                i64::from(page_index)
            }
            NavigationIntent::Sitemap(entry) => i64::from(SitemapIndex::resolve_target(&entry)),
            NavigationIntent::Page(index) => index,
        };

        let change = self.pager.set_index(requested);
        self.commit(change)
    }

    pub fn go_to_page(&mut self, index: i64) -> bool {
        self.navigate(NavigationIntent::Page(index))
    }

    pub fn tap_thumbnail(&mut self, page_index: PageIndex) -> bool {
        self.navigate(NavigationIntent::Thumbnail(page_index))
    }

    /// Tap at strip coordinate `x`; misses are ignored.
    pub fn tap_strip(&mut self, x: f64) -> bool {
        match self.strip.hit_test(x) {
            Some(page_index) => self.tap_thumbnail(page_index),
            None => false,
        }
    }

    pub fn tap_sitemap_row(&mut self, row: usize) -> bool {
        let Some(entry) = self.sitemap.as_ref().and_then(|sitemap| sitemap.get(row)).cloned() else {
            debug!("no sitemap row {}", row);
            return false;
        };
        self.navigate(NavigationIntent::Sitemap(entry))
    }

    /// Pager scroll position reported by the host view.
    pub fn on_scroll(&mut self, offset: ScrollOffset) -> bool {
        let change = self.pager.on_scroll_offset_changed(offset, self.viewport);
        self.commit(change)
    }

    /// The user scrolled the thumbnail strip itself.
    pub fn scroll_strip(&mut self, offset: f64) {
        self.strip.scroll_to(offset);
        self.sync_slots();
    }

    /// After a layout pass, keep the pager view on the current page.
    pub fn layout_pass(&mut self) {
        let index = self.current_index();
        self.emit(NavigationEvent::ScrollToPage { index });
    }

    /// Viewport change such as a rotation. Scroll feedback is suppressed
    /// until the pager has been moved back to the current page.
    pub fn resize(&mut self, viewport: ViewportSize) {
        let mut transition = self.programmatic_transition();

        transition.viewport = viewport;
        transition.strip.set_viewport_width(viewport.width);
        transition.sync_slots();
        debug!(
            "resized to {}x{}, strip width {}",
            viewport.width,
            viewport.height,
            transition.strip.width()
        );

        transition.layout_pass();
    }

    /// Delivers thumbnails that finished since the last call, without blocking.
    pub fn pump(&mut self) -> usize {
        let ready = match self.thumbnails.as_mut() {
            Some(thumbnails) => thumbnails.drain(),
            None => return 0,
        };
        self.deliver(ready)
    }

    /// Blocks until every bound slot has its thumbnail or `timeout` elapses.
    pub fn wait_for_thumbnails(&mut self, timeout: Duration) -> usize {
        let ready = match self.thumbnails.as_mut() {
            Some(thumbnails) => thumbnails.wait_idle(timeout),
            None => return 0,
        };
        self.deliver(ready)
    }

    /// Cancels all thumbnail work and stops the workers.
    pub fn close(mut self) {
        if let Some(thumbnails) = self.thumbnails.take() {
            thumbnails.shutdown();
        }
        info!("closed {:?} at page {}", self.title, self.current_index());
    }

    fn commit(&mut self, change: Option<PageChange>) -> bool {
        let Some(PageChange { index, page_count, .. }) = change else {
            return false;
        };

        self.emit(NavigationEvent::PageChanged {
            index,
            page_count,
            counter: PageCount::for_index(index, page_count),
        });

        if self.strip.set_active(index) {
            self.sync_slots();
        }

        let row = self.sitemap.as_ref().and_then(|sitemap| sitemap.active_row(index));
        if row != self.active_row {
            self.active_row = row;
            self.emit(NavigationEvent::SitemapSelectionChanged { row });
        }

        self.emit(NavigationEvent::RenderPage { index });
        true
    }

    fn sync_slots(&mut self) {
        let changes = self.strip.refresh();
        let Some(thumbnails) = self.thumbnails.as_mut() else {
            return;
        };

        for change in changes {
            match change {
                SlotChange::Release { slot } => {
                    thumbnails.release(slot);
                }
                SlotChange::Bind { slot, page_index } => {
                    if let Err(err) = thumbnails.request(slot, page_index) {
                        warn!("thumbnail request for page {} failed: {}", page_index, err);
                    }
                }
            }
        }
    }

    fn deliver(&mut self, ready: Vec<ThumbnailReady<RgbaImage>>) -> usize {
        let delivered = ready.len();
        for ThumbnailReady { slot, page_index, image } in ready {
            self.emit(NavigationEvent::ThumbnailReady { slot, page_index, image });
        }
        delivered
    }

    fn emit(&mut self, event: NavigationEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

impl<D: Document> ProgrammaticTransition for NavigationCoordinator<D> {
    fn begin_programmatic_transition(&mut self) {
        self.pager.begin_programmatic_transition();
    }

    fn end_programmatic_transition(&mut self) {
        self.pager.end_programmatic_transition();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{CancellationToken, DocumentError, ThumbnailSize};
    use image::Rgba;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Blank {
        pages: u32,
    }

    impl Document for Blank {
        fn page_count(&self) -> u32 {
            self.pages
        }

        fn file_name(&self) -> &str {
            "manual.pdf"
        }

        fn file_data(&self) -> &[u8] {
            &[]
        }

        fn render_page(
            &self,
            page_index: PageIndex,
            _scale: f32,
            token: &CancellationToken,
        ) -> Result<RgbaImage, DocumentError> {
            self.render_thumbnail(page_index, ThumbnailSize::default(), token)
        }

        fn render_thumbnail(
            &self,
            _page_index: PageIndex,
            size: ThumbnailSize,
            _token: &CancellationToken,
        ) -> Result<RgbaImage, DocumentError> {
            Ok(RgbaImage::from_pixel(size.width_px, size.height_px, Rgba([255, 255, 255, 255])))
        }
    }

    fn sitemap() -> Vec<SitemapEntry> {
        vec![SitemapEntry::new("A", 1), SitemapEntry::new("B", 5), SitemapEntry::new("C", 10)]
    }

    fn options(start_page_index: i64) -> NavigationOptions {
        NavigationOptions {
            start_page_index,
            viewport: ViewportSize { width: 100.0, height: 200.0 },
            ..NavigationOptions::default()
        }
    }

    type Recorded = Rc<RefCell<Vec<NavigationEvent>>>;

    fn open(pages: u32, options: NavigationOptions) -> (NavigationCoordinator<Blank>, Recorded) {
        let mut coordinator = NavigationCoordinator::new(Arc::new(Blank { pages }), options)
            .expect("coordinator should open");
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        coordinator.subscribe(move |event: &NavigationEvent| sink.borrow_mut().push(event.clone()));
        (coordinator, events)
    }

    fn page_changes(events: &[NavigationEvent]) -> Vec<PageIndex> {
        events
            .iter()
            .filter_map(|event| match event {
                NavigationEvent::PageChanged { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn out_of_range_start_opens_first_page_and_sitemap_tap_jumps() {
        let mut options = options(5);
        options.sitemap = Some(vec![SitemapEntry::new("A", 1), SitemapEntry::new("C", 3)]);
        let (mut coordinator, events) = open(3, options);

        assert_eq!(coordinator.current_index(), 0);
        assert_eq!(coordinator.active_sitemap_row(), Some(0));

        assert!(coordinator.tap_sitemap_row(1));
        assert_eq!(coordinator.current_index(), 2);
        assert_eq!(coordinator.active_sitemap_row(), Some(1));
        assert_eq!(page_changes(&events.borrow()), vec![2]);
    }

    #[test]
    fn start_page_in_range_is_honoured() {
        let (coordinator, _) = open(10, options(4));
        assert_eq!(coordinator.current_index(), 4);
        assert_eq!(coordinator.page_counter().to_string(), "5 of 10");

        let (coordinator, _) = open(10, options(-1));
        assert_eq!(coordinator.current_index(), 0);
    }

    #[test]
    fn title_defaults_to_file_name() {
        let (coordinator, _) = open(1, options(0));
        assert_eq!(coordinator.title(), "manual.pdf");
        assert_eq!(coordinator.document().file_name(), "manual.pdf");

        let mut titled = options(0);
        titled.title = Some("User Manual".to_string());
        let (coordinator, _) = open(1, titled);
        assert_eq!(coordinator.title(), "User Manual");
    }

    #[test]
    fn commit_fans_out_in_order() {
        let mut options = options(0);
        options.sitemap = Some(sitemap());
        let (mut coordinator, events) = open(12, options);

        coordinator.go_to_page(6);
        assert_eq!(coordinator.strip().active(), 6);

        let events = events.borrow();
        assert_eq!(
            *events,
            vec![
                NavigationEvent::PageChanged {
                    index: 6,
                    page_count: 12,
                    counter: PageCount { current_page: 7, page_count: 12 },
                },
                NavigationEvent::SitemapSelectionChanged { row: Some(1) },
                NavigationEvent::RenderPage { index: 6 },
            ]
        );
    }

    #[test]
    fn sitemap_selection_only_reported_when_row_changes() {
        let mut options = options(0);
        options.sitemap = Some(sitemap());
        let (mut coordinator, events) = open(12, options);

        coordinator.go_to_page(1);
        coordinator.go_to_page(2);

        let selections = events
            .borrow()
            .iter()
            .filter(|event| matches!(event, NavigationEvent::SitemapSelectionChanged { .. }))
            .count();
        assert_eq!(selections, 0);
    }

    #[test]
    fn repeated_intents_notify_once() {
        let (mut coordinator, events) = open(3, options(0));

        assert!(coordinator.go_to_page(9));
        assert!(!coordinator.go_to_page(2));
        assert!(!coordinator.tap_thumbnail(2));

        assert_eq!(coordinator.current_index(), 2);
        assert_eq!(page_changes(&events.borrow()), vec![2]);
    }

    #[test]
    fn scroll_offsets_drive_the_pager() {
        let (mut coordinator, events) = open(5, options(0));

        assert!(coordinator.on_scroll(ScrollOffset { x: 149.0, y: 0.0 }));
        assert_eq!(coordinator.current_index(), 1);
        assert!(coordinator.on_scroll(ScrollOffset { x: 150.0, y: 0.0 }));
        assert_eq!(coordinator.current_index(), 2);
        assert!(coordinator.on_scroll(ScrollOffset { x: -10.0, y: 0.0 }));
        assert_eq!(coordinator.current_index(), 0);

        assert_eq!(page_changes(&events.borrow()), vec![1, 2, 0]);
    }

    #[test]
    fn scroll_feedback_is_ignored_during_transition() {
        let (mut coordinator, events) = open(5, options(1));

        coordinator.begin_programmatic_transition();
        assert!(!coordinator.on_scroll(ScrollOffset { x: 300.0, y: 0.0 }));
        coordinator.end_programmatic_transition();

        assert_eq!(coordinator.current_index(), 1);
        assert!(events.borrow().is_empty());

        assert!(coordinator.on_scroll(ScrollOffset { x: 300.0, y: 0.0 }));
        assert_eq!(coordinator.current_index(), 3);
    }

    #[test]
    fn resize_rescrolls_and_releases_suppression() {
        let (mut coordinator, events) = open(40, options(7));

        coordinator.resize(ViewportSize { width: 300.0, height: 100.0 });

        assert_eq!(coordinator.viewport(), ViewportSize { width: 300.0, height: 100.0 });
        assert!(!coordinator.is_suppressing_feedback());
        assert_eq!(coordinator.strip_width(), 300.0);
        assert_eq!(*events.borrow(), vec![NavigationEvent::ScrollToPage { index: 7 }]);

        // Offsets are now measured against the new viewport.
        coordinator.on_scroll(ScrollOffset { x: 600.0, y: 0.0 });
        assert_eq!(coordinator.current_index(), 2);
    }

    #[test]
    fn layout_pass_requests_scroll_to_current_page() {
        let (mut coordinator, events) = open(4, options(3));

        coordinator.layout_pass();

        assert_eq!(*events.borrow(), vec![NavigationEvent::ScrollToPage { index: 3 }]);
    }

    #[test]
    fn strip_width_is_capped_by_viewport() {
        let (coordinator, _) = open(3, options(0));
        assert_eq!(coordinator.strip_width(), 3.0 * 24.0 + 2.0 * 2.0);

        let (coordinator, _) = open(50, options(0));
        assert_eq!(coordinator.strip_width(), 100.0);
    }

    #[test]
    fn disabled_thumbnails_ignore_taps() {
        let mut options = options(0);
        options.config.thumbnails_enabled = false;
        let (mut coordinator, events) = open(5, options);

        assert_eq!(coordinator.strip_width(), 0.0);
        assert!(coordinator.thumbnail_stats().is_none());
        assert!(!coordinator.tap_thumbnail(3));
        assert!(!coordinator.tap_strip(10.0));
        assert_eq!(coordinator.wait_for_thumbnails(Duration::from_millis(10)), 0);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn strip_tap_selects_page_under_finger() {
        let (mut coordinator, _) = open(5, options(0));

        assert!(coordinator.tap_strip(60.0));
        assert_eq!(coordinator.current_index(), 2);
        assert!(!coordinator.tap_strip(500.0));
    }

    #[test]
    fn visible_thumbnails_are_delivered() {
        let (mut coordinator, events) = open(3, options(0));

        let delivered = coordinator.wait_for_thumbnails(Duration::from_secs(5));

        assert_eq!(delivered, 3);
        let mut pages: Vec<PageIndex> = events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                NavigationEvent::ThumbnailReady { page_index, image, .. } => {
                    assert_eq!(image.dimensions(), (48, 88));
                    Some(*page_index)
                }
                _ => None,
            })
            .collect();
        pages.sort_unstable();
        assert_eq!(pages, vec![0, 1, 2]);

        let slot = coordinator.strip().slot_for(1);
        assert!(coordinator.thumbnail(slot).is_some());
        coordinator.close();
    }

    #[test]
    fn empty_document_never_notifies() {
        let (mut coordinator, events) = open(0, options(3));

        assert_eq!(coordinator.current_index(), 0);
        assert!(!coordinator.go_to_page(1));
        assert!(!coordinator.on_scroll(ScrollOffset { x: 500.0, y: 0.0 }));
        assert_eq!(coordinator.strip_width(), 0.0);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn sitemap_rows_show_page_labels() {
        let mut options = options(0);
        options.sitemap = Some(sitemap());
        let (coordinator, _) = open(12, options);

        assert_eq!(
            coordinator.sitemap_rows(),
            vec![("A", "1".to_string()), ("B", "5".to_string()), ("C", "10".to_string())]
        );
    }
}
