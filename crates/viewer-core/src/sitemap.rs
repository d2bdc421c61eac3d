use doc_model::{PageIndex, SitemapEntry};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveEntry<'a> {
    pub row: usize,
    pub entry: &'a SitemapEntry,
}

/// Table of contents ordered by starting page.
///
/// Lookups assume entries are sorted by `page` (non-decreasing). Unsorted
/// input is kept as given and logged, never reordered; lookups on it still
/// return some row or none, but which one is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapIndex {
    entries: Vec<SitemapEntry>,
    sorted: bool,
}

impl SitemapIndex {
    pub fn new(entries: Vec<SitemapEntry>) -> Self {
        let sorted = entries.windows(2).all(|pair| pair[0].page <= pair[1].page);
        if !sorted {
            warn!("sitemap: entries are not sorted by page; section highlighting may be wrong");
            debug_unsorted(&entries);
        }

        Self { entries, sorted }
    }

    pub fn entries(&self) -> &[SitemapEntry] {
        &self.entries
    }

    pub fn get(&self, row: usize) -> Option<&SitemapEntry> {
        self.entries.get(row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Last entry starting at or before the 1-based `page`.
    pub fn active_entry(&self, page: u32) -> Option<ActiveEntry<'_>> {
        let starts_before = self.entries.partition_point(|entry| entry.page <= page);
        let row = starts_before.checked_sub(1)?;

        Some(ActiveEntry { row, entry: &self.entries[row] })
    }

    /// Active row for a zero-based page index.
    pub fn active_row(&self, index: PageIndex) -> Option<usize> {
        self.active_entry(index.saturating_add(1)).map(|active| active.row)
    }

    /// Zero-based page a sitemap entry points at.
    pub fn resolve_target(entry: &SitemapEntry) -> PageIndex {
        entry.page.saturating_sub(1)
    }

    pub fn resolve_row(&self, row: usize) -> Option<PageIndex> {
        self.get(row).map(Self::resolve_target)
    }
}

fn debug_unsorted(entries: &[SitemapEntry]) {
    for (row, pair) in entries.windows(2).enumerate() {
        if pair[0].page > pair[1].page {
            log::debug!(
                "sitemap: row {} ({:?}, page {}) follows page {}",
                row + 1,
                pair[1].title,
                pair[1].page,
                pair[0].page
            );
        }
    }
}
