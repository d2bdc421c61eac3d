mod navigation;
mod pager;
mod sitemap;
mod strip;
mod thumbnails;

pub use navigation::{
    NavigationCoordinator, NavigationError, NavigationEvent, NavigationIntent, NavigationObserver,
    NavigationOptions,
};
pub use pager::{
    clamp_index, scroll_page_index, PageChange, Pager, ProgrammaticTransition, ScrollOffset,
    TransitionGuard, ViewportSize,
};
pub use sitemap::{ActiveEntry, SitemapIndex};
pub use strip::{SlotChange, StripLayout, ThumbnailStrip};
pub use thumbnails::DocumentThumbnails;
