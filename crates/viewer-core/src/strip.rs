use doc_model::{PageIndex, ViewerConfig};
use log::debug;
use pageview_scheduler::SlotId;
use std::collections::BTreeMap;
use std::ops::Range;

/// Fixed geometry of the thumbnail strip: equal slots separated by `spacing`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripLayout {
    pub slot_width: f64,
    pub slot_height: f64,
    pub spacing: f64,
}

impl Default for StripLayout {
    fn default() -> Self {
        Self::from_config(&ViewerConfig::default())
    }
}

impl StripLayout {
    pub fn new(slot_width: f64, slot_height: f64, spacing: f64) -> Self {
        Self { slot_width, slot_height, spacing }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(
            f64::from(config.thumbnail_width),
            f64::from(config.thumbnail_height),
            f64::from(config.thumbnail_spacing),
        )
    }

    /// Distance from one slot's leading edge to the next.
    pub fn pitch(&self) -> f64 {
        self.slot_width + self.spacing
    }

    /// Width of every slot laid end to end, without trailing spacing.
    pub fn content_width(&self, page_count: u32) -> f64 {
        if page_count == 0 {
            return 0.0;
        }
        let count = f64::from(page_count);
        count * self.slot_width + (count - 1.0) * self.spacing
    }

    /// On-screen width of the strip, capped at the viewport.
    pub fn strip_width(&self, page_count: u32, viewport_width: f64) -> f64 {
        self.content_width(page_count).min(viewport_width.max(0.0))
    }

    pub fn slot_origin(&self, page_index: PageIndex) -> f64 {
        f64::from(page_index) * self.pitch()
    }

    /// Page whose slot (or the spacing after it) contains content coordinate `x`.
    pub fn page_at(&self, x: f64, page_count: u32) -> Option<PageIndex> {
        let pitch = self.pitch();
        if !x.is_finite() || x < 0.0 || pitch <= 0.0 {
            return None;
        }

        let page = (x / pitch).floor();
        (page < f64::from(page_count)).then_some(page as PageIndex)
    }

    /// Pages whose slots intersect `[scroll_offset, scroll_offset + width)`.
    pub fn visible_range(
        &self,
        scroll_offset: f64,
        width: f64,
        page_count: u32,
    ) -> Range<PageIndex> {
        let pitch = self.pitch();
        if page_count == 0 || width <= 0.0 || pitch <= 0.0 {
            return 0..0;
        }

        let start = scroll_offset.max(0.0);
        let end = start + width;

        let mut first = (start / pitch).floor() as u32;
        if start >= self.slot_origin(first) + self.slot_width {
            // Scrolled into the gap after `first`.
            first += 1;
        }
        let last = ((end / pitch).ceil() as u32).min(page_count);

        first.min(last)..last
    }
}

/// Slot rebinding produced by [`ThumbnailStrip::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    /// The slot now shows `page_index`; request its thumbnail.
    Bind { slot: SlotId, page_index: PageIndex },
    /// The slot scrolled out of view; cancel and drop whatever it held.
    Release { slot: SlotId },
}

/// Horizontally scrolling strip of reusable thumbnail slots.
///
/// Keeps only geometry and slot bindings. Images are owned by the
/// thumbnail pipeline, keyed by the slot ids handed out here.
#[derive(Debug, Clone)]
pub struct ThumbnailStrip {
    layout: StripLayout,
    enabled: bool,
    page_count: u32,
    viewport_width: f64,
    scroll_offset: f64,
    active: PageIndex,
    bindings: BTreeMap<SlotId, PageIndex>,
}

impl ThumbnailStrip {
    pub fn new(layout: StripLayout, page_count: u32, enabled: bool, viewport_width: f64) -> Self {
        Self {
            layout,
            enabled,
            page_count,
            viewport_width,
            scroll_offset: 0.0,
            active: 0,
            bindings: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn active(&self) -> PageIndex {
        self.active
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    /// Visible width; zero while thumbnails are disabled.
    pub fn width(&self) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        self.layout.strip_width(self.page_count, self.viewport_width)
    }

    pub fn max_scroll(&self) -> f64 {
        (self.layout.content_width(self.page_count) - self.width()).max(0.0)
    }

    /// Number of reusable slots; enough for every page that can be
    /// partially visible at once.
    pub fn capacity(&self) -> usize {
        let pitch = self.layout.pitch();
        if pitch <= 0.0 {
            return 1;
        }
        (self.width() / pitch).ceil() as usize + 1
    }

    pub fn slot_for(&self, page_index: PageIndex) -> SlotId {
        SlotId(page_index as usize % self.capacity())
    }

    pub fn bound_page(&self, slot: SlotId) -> Option<PageIndex> {
        self.bindings.get(&slot).copied()
    }

    pub fn bindings(&self) -> impl Iterator<Item = (SlotId, PageIndex)> + '_ {
        self.bindings.iter().map(|(slot, page)| (*slot, *page))
    }

    pub fn visible_pages(&self) -> Range<PageIndex> {
        if !self.enabled {
            return 0..0;
        }
        self.layout.visible_range(self.scroll_offset, self.width(), self.page_count)
    }

    /// Moves the highlight and scrolls just far enough to show it.
    ///
    /// Returns `false` if `index` was already active.
    pub fn set_active(&mut self, index: PageIndex) -> bool {
        if index == self.active {
            return false;
        }
        self.active = index;
        self.reveal_active();
        true
    }

    pub fn scroll_to(&mut self, offset: f64) {
        if offset.is_nan() {
            return;
        }
        self.scroll_offset = offset.clamp(0.0, self.max_scroll());
    }

    pub fn set_viewport_width(&mut self, viewport_width: f64) {
        self.viewport_width = viewport_width;
        self.scroll_offset = self.scroll_offset.clamp(0.0, self.max_scroll());
        self.reveal_active();
    }

    /// Page under strip coordinate `x` (0 is the strip's leading edge).
    pub fn hit_test(&self, x: f64) -> Option<PageIndex> {
        if !self.enabled || x < 0.0 || x > self.width() {
            return None;
        }
        self.layout.page_at(x + self.scroll_offset, self.page_count)
    }

    /// Rebinds slots to the currently visible pages.
    ///
    /// Releases come before binds. A slot whose page is unchanged produces
    /// nothing, so an unchanged view requests nothing.
    pub fn refresh(&mut self) -> Vec<SlotChange> {
        let desired: BTreeMap<SlotId, PageIndex> =
            self.visible_pages().map(|page| (self.slot_for(page), page)).collect();

        let mut changes: Vec<SlotChange> = self
            .bindings
            .keys()
            .filter(|slot| !desired.contains_key(*slot))
            .map(|&slot| SlotChange::Release { slot })
            .collect();

        changes.extend(
            desired
                .iter()
                .filter(|&(slot, page)| self.bindings.get(slot) != Some(page))
                .map(|(&slot, &page_index)| SlotChange::Bind { slot, page_index }),
        );

        if !changes.is_empty() {
            debug!(
                "strip: {} slot change(s), visible {:?}, capacity {}",
                changes.len(),
                self.visible_pages(),
                self.capacity()
            );
        }

        self.bindings = desired;
        changes
    }

    fn reveal_active(&mut self) {
        let width = self.width();
        if width <= 0.0 {
            return;
        }

        let start = self.layout.slot_origin(self.active);
        let end = start + self.layout.slot_width;
        let mut target = self.scroll_offset;

        if start < self.scroll_offset {
            target = start;
        } else if end > self.scroll_offset + width {
            target = end - width;
        }

        self.scroll_offset = target.clamp(0.0, self.max_scroll());
    }
}
