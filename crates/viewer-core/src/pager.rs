use doc_model::{PageIndex, ScrollAxis};
use log::debug;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

impl ScrollOffset {
    pub fn along(axis: ScrollAxis, offset: f64) -> Self {
        match axis {
            ScrollAxis::Horizontal => Self { x: offset, y: 0.0 },
            ScrollAxis::Vertical => Self { x: 0.0, y: offset },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self { width: 1024.0, height: 768.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    pub previous: PageIndex,
    pub index: PageIndex,
    pub page_count: u32,
}

/// Scoped suppression of scroll-derived index updates.
///
/// `begin`/`end` calls nest; feedback stays suppressed until every `begin`
/// has been matched. Prefer [`ProgrammaticTransition::programmatic_transition`],
/// whose guard ends the transition on every exit path.
pub trait ProgrammaticTransition {
    fn begin_programmatic_transition(&mut self);

    fn end_programmatic_transition(&mut self);

    fn programmatic_transition(&mut self) -> TransitionGuard<'_, Self>
    where
        Self: Sized,
    {
        self.begin_programmatic_transition();
        TransitionGuard { target: self }
    }
}

/// Ends the programmatic transition when dropped.
pub struct TransitionGuard<'a, T: ProgrammaticTransition> {
    target: &'a mut T,
}

impl<T: ProgrammaticTransition> Deref for TransitionGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: ProgrammaticTransition> DerefMut for TransitionGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: ProgrammaticTransition> Drop for TransitionGuard<'_, T> {
    fn drop(&mut self) {
        self.target.end_programmatic_transition();
    }
}

/// Sole owner of the current page index.
#[derive(Debug, Clone)]
pub struct Pager {
    current: PageIndex,
    page_count: u32,
    axis: ScrollAxis,
    transition_depth: u32,
}

impl Pager {
    pub fn new(page_count: u32, axis: ScrollAxis) -> Self {
        Self { current: 0, page_count, axis, transition_depth: 0 }
    }

    pub fn current_index(&self) -> PageIndex {
        self.current
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn is_suppressing_feedback(&self) -> bool {
        self.transition_depth > 0
    }

    /// Clamps `requested` into the document and commits it.
    ///
    /// Returns the change when the index moved; `None` when it was already
    /// current or the document has no pages.
    pub fn set_index(&mut self, requested: i64) -> Option<PageChange> {
        if self.page_count == 0 {
            return None;
        }

        let index = clamp_index(requested, self.page_count);
        if index == self.current {
            return None;
        }

        let previous = std::mem::replace(&mut self.current, index);
        debug!(
            "pager: {} -> {} (requested {}, page_count {})",
            previous, index, requested, self.page_count
        );

        Some(PageChange { previous, index, page_count: self.page_count })
    }

    pub fn on_scroll_offset_changed(
        &mut self,
        offset: ScrollOffset,
        viewport: ViewportSize,
    ) -> Option<PageChange> {
        if self.is_suppressing_feedback() {
            debug!("pager: ignoring scroll offset {:?} during programmatic transition", offset);
            return None;
        }

        let along = self.axis.along(offset.x, offset.y);
        let extent = self.axis.along(viewport.width, viewport.height);
        let candidate = scroll_page_index(along, extent)?;

        self.set_index(candidate)
    }
}

impl ProgrammaticTransition for Pager {
    fn begin_programmatic_transition(&mut self) {
        self.transition_depth += 1;
    }

    fn end_programmatic_transition(&mut self) {
        match self.transition_depth.checked_sub(1) {
            Some(depth) => self.transition_depth = depth,
            None => debug!("pager: end_programmatic_transition without matching begin"),
        }
    }
}

pub fn clamp_index(requested: i64, page_count: u32) -> PageIndex {
    if page_count == 0 {
        return 0;
    }

    requested.clamp(0, i64::from(page_count) - 1) as PageIndex
}

/// Index whose page is nearest `offset`, rounding half away from zero.
///
/// Negative offsets (overscroll) count as 0. Returns `None` for a degenerate
/// viewport, which happens during layout before the view has a size.
pub fn scroll_page_index(offset: f64, viewport_extent: f64) -> Option<i64> {
    if offset.is_nan() || !viewport_extent.is_finite() || viewport_extent <= 0.0 {
        return None;
    }

    Some((offset.max(0.0) / viewport_extent).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> ViewportSize {
        ViewportSize { width: 100.0, height: 200.0 }
    }

    #[test]
    fn set_index_clamps_into_document() {
        for page_count in 1..=4_u32 {
            for requested in -3..=8_i64 {
                let mut pager = Pager::new(page_count, ScrollAxis::Horizontal);
                pager.set_index(requested);
                let expected = requested.clamp(0, i64::from(page_count) - 1) as u32;
                assert_eq!(
                    pager.current_index(),
                    expected,
                    "page_count={page_count} requested={requested}"
                );
            }
        }
    }

    #[test]
    fn set_index_is_idempotent() {
        let mut pager = Pager::new(5, ScrollAxis::Horizontal);

        let first = pager.set_index(3);
        let second = pager.set_index(3);

        assert_eq!(first, Some(PageChange { previous: 0, index: 3, page_count: 5 }));
        assert_eq!(second, None);
    }

    #[test]
    fn out_of_range_requests_that_clamp_to_current_do_not_notify() {
        let mut pager = Pager::new(3, ScrollAxis::Horizontal);
        pager.set_index(2);

        assert_eq!(pager.set_index(40), None);
        assert_eq!(pager.current_index(), 2);
    }

    #[test]
    fn empty_document_never_changes() {
        let mut pager = Pager::new(0, ScrollAxis::Horizontal);
        assert_eq!(pager.set_index(1), None);
        assert_eq!(pager.current_index(), 0);
    }

    #[test]
    fn scroll_rounding_breaks_ties_upward() {
        assert_eq!(scroll_page_index(149.0, 100.0), Some(1));
        assert_eq!(scroll_page_index(150.0, 100.0), Some(2));
        assert_eq!(scroll_page_index(-10.0, 100.0), Some(0));
        assert_eq!(scroll_page_index(49.999, 100.0), Some(0));
        assert_eq!(scroll_page_index(50.0, 100.0), Some(1));
    }

    #[test]
    fn degenerate_viewport_is_ignored() {
        assert_eq!(scroll_page_index(100.0, 0.0), None);
        assert_eq!(scroll_page_index(100.0, -5.0), None);
        assert_eq!(scroll_page_index(f64::NAN, 100.0), None);
        assert_eq!(scroll_page_index(100.0, f64::INFINITY), None);
    }

    #[test]
    fn scroll_uses_configured_axis() {
        let mut horizontal = Pager::new(10, ScrollAxis::Horizontal);
        let offset = ScrollOffset { x: 150.0, y: 900.0 };
        let change = horizontal.on_scroll_offset_changed(offset, viewport());
        assert_eq!(change.map(|change| change.index), Some(2));

        let mut vertical = Pager::new(10, ScrollAxis::Vertical);
        let change = vertical.on_scroll_offset_changed(offset, viewport());
        assert_eq!(change.map(|change| change.index), Some(5));
    }

    #[test]
    fn scroll_past_the_end_clamps_to_last_page() {
        let mut pager = Pager::new(3, ScrollAxis::Horizontal);
        pager.on_scroll_offset_changed(ScrollOffset { x: 10_000.0, y: 0.0 }, viewport());
        assert_eq!(pager.current_index(), 2);
    }

    #[test]
    fn scroll_during_transition_never_changes_index() {
        let mut pager = Pager::new(10, ScrollAxis::Horizontal);
        pager.set_index(4);

        pager.begin_programmatic_transition();
        for offset in [0.0, 120.0, 730.0, 990.0] {
            let change =
                pager.on_scroll_offset_changed(ScrollOffset { x: offset, y: 0.0 }, viewport());
            assert_eq!(change, None);
        }
        pager.end_programmatic_transition();

        assert_eq!(pager.current_index(), 4);
        let change = pager.on_scroll_offset_changed(ScrollOffset { x: 730.0, y: 0.0 }, viewport());
        assert_eq!(change.map(|change| change.index), Some(7));
    }

    #[test]
    fn transition_guard_releases_on_early_return() {
        fn rotate(pager: &mut Pager, bail: bool) -> Result<(), &'static str> {
            let mut guard = pager.programmatic_transition();
            assert!(guard.is_suppressing_feedback());
            guard.on_scroll_offset_changed(ScrollOffset { x: 500.0, y: 0.0 }, viewport());
            if bail {
                return Err("layout failed");
            }
            guard.set_index(1);
            Ok(())
        }

        let mut pager = Pager::new(10, ScrollAxis::Horizontal);
        assert!(rotate(&mut pager, true).is_err());
        assert!(!pager.is_suppressing_feedback());
        assert_eq!(pager.current_index(), 0);

        assert!(rotate(&mut pager, false).is_ok());
        assert!(!pager.is_suppressing_feedback());
        assert_eq!(pager.current_index(), 1);
    }

    #[test]
    fn nested_transitions_suppress_until_outermost_ends() {
        let mut pager = Pager::new(10, ScrollAxis::Horizontal);

        pager.begin_programmatic_transition();
        pager.begin_programmatic_transition();
        pager.end_programmatic_transition();
        assert!(pager.is_suppressing_feedback());

        pager.end_programmatic_transition();
        assert!(!pager.is_suppressing_feedback());

        // Unbalanced end is harmless
        pager.end_programmatic_transition();
        assert!(!pager.is_suppressing_feedback());
    }
}
