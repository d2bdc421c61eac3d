use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod cancel;
mod config;

pub use cancel::CancellationToken;
pub use config::{ConfigError, ViewerConfig};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Zero-based page index.
pub type PageIndex = u32;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: PageIndex, page_count: u32 },
    #[error("rendering cancelled")]
    Cancelled,
    #[error("render error: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self { width_px: 48, height_px: 88 }
    }
}

/// The document being viewed.
///
/// Owned by the host application and immutable for the lifetime of a viewing
/// session. Rendering may be slow and is called from worker threads; it
/// should poll `token` between steps and return [`DocumentError::Cancelled`]
/// once it is set.
pub trait Document: Send + Sync + 'static {
    fn page_count(&self) -> u32;

    fn file_name(&self) -> &str;

    fn file_data(&self) -> &[u8];

    fn password(&self) -> Option<&str> {
        None
    }

    fn render_page(
        &self,
        page_index: PageIndex,
        scale: f32,
        token: &CancellationToken,
    ) -> Result<RgbaImage, DocumentError>;

    fn render_thumbnail(
        &self,
        page_index: PageIndex,
        size: ThumbnailSize,
        token: &CancellationToken,
    ) -> Result<RgbaImage, DocumentError>;
}

/// One table-of-contents entry. `page` is 1-based, as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub title: String,
    pub page: u32,
}

impl SitemapEntry {
    pub fn new(title: impl Into<String>, page: u32) -> Self {
        Self { title: title.into(), page }
    }

    /// Text shown in the page-number column of the sitemap row.
    pub fn page_label(&self) -> String {
        self.page.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAxis {
    #[default]
    Horizontal,
    Vertical,
}

impl ScrollAxis {
    /// Picks the component of an `(x, y)` pair that lies along this axis.
    pub fn along(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Horizontal => x,
            Self::Vertical => y,
        }
    }
}

impl FromStr for ScrollAxis {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "horizontal" | "h" => Ok(Self::Horizontal),
            "vertical" | "v" => Ok(Self::Vertical),
            other => {
                Err(format!("unknown scroll axis `{other}` (expected horizontal or vertical)"))
            }
        }
    }
}

impl fmt::Display for ScrollAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => f.write_str("horizontal"),
            Self::Vertical => f.write_str("vertical"),
        }
    }
}

/// Page counter contents: `current_page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub current_page: u32,
    pub page_count: u32,
}

impl PageCount {
    pub fn for_index(index: PageIndex, page_count: u32) -> Self {
        Self { current_page: index.saturating_add(1), page_count }
    }
}

impl fmt::Display for PageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.current_page, self.page_count)
    }
}
