use doc_model::{
    CancellationToken, Document, DocumentError, PageIndex, RgbaImage, ThumbnailSize,
};
use image::Rgba;
use log::{debug, warn};
use std::fs;
use std::path::Path;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

/// Page size used when a page has no readable `MediaBox` (US Letter).
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// Pages are rasterized at this scale before being reduced to a thumbnail.
const THUMBNAIL_RENDER_SCALE: f32 = 0.25;

/// Longest side of any placeholder raster; larger pages are scaled down.
pub const MAX_RASTER_SIDE: u32 = 4096;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<PdfEngineError> for DocumentError {
    fn from(err: PdfEngineError) -> Self {
        match err {
            PdfEngineError::PageOutOfRange { page, page_count } => {
                DocumentError::PageOutOfRange { page, page_count }
            }
            other => DocumentError::Render(other.to_string()),
        }
    }
}

/// A PDF held in memory, with page sizes read up front.
///
/// Pages are drawn as placeholders (blank paper with a border) at the size
/// the page would have; actual content rasterization is left to the host.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    file_name: String,
    bytes: Vec<u8>,
    page_sizes: Vec<PageSize>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, PdfEngineError> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self::from_bytes(file_name, bytes)
    }

    pub fn from_bytes(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, PdfEngineError> {
        let page_sizes = parse_sizes(&bytes)?;
        let file_name = file_name.into();
        debug!("pdf: {} has {} page(s)", file_name, page_sizes.len());

        Ok(Self { file_name, bytes, page_sizes })
    }

    pub fn page_size(&self, page_index: PageIndex) -> Result<PageSize, PdfEngineError> {
        self.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: self.page_sizes.len() as u32,
        })
    }
}

impl Document for PdfDocument {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn file_data(&self) -> &[u8] {
        &self.bytes
    }

    fn render_page(
        &self,
        page_index: PageIndex,
        scale: f32,
        token: &CancellationToken,
    ) -> Result<RgbaImage, DocumentError> {
        let size = self.page_size(page_index)?;
        render_placeholder(size, scale, token)
    }

    fn render_thumbnail(
        &self,
        page_index: PageIndex,
        size: ThumbnailSize,
        token: &CancellationToken,
    ) -> Result<RgbaImage, DocumentError> {
        let page = self.render_page(page_index, THUMBNAIL_RENDER_SCALE, token)?;
        shrink(&page, size, token)
    }
}

/// An in-memory document of blank pages.
#[derive(Debug, Clone)]
pub struct BlankDocument {
    file_name: String,
    page_count: u32,
    page_size: PageSize,
}

impl BlankDocument {
    pub fn new(page_count: u32) -> Self {
        Self { file_name: "blank.pdf".to_string(), page_count, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    fn check(&self, page_index: PageIndex) -> Result<(), DocumentError> {
        if page_index >= self.page_count {
            return Err(DocumentError::PageOutOfRange {
                page: page_index,
                page_count: self.page_count,
            });
        }
        Ok(())
    }
}

impl Document for BlankDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn file_data(&self) -> &[u8] {
        &[]
    }

    fn render_page(
        &self,
        page_index: PageIndex,
        scale: f32,
        token: &CancellationToken,
    ) -> Result<RgbaImage, DocumentError> {
        self.check(page_index)?;
        render_placeholder(self.page_size, scale, token)
    }

    fn render_thumbnail(
        &self,
        page_index: PageIndex,
        size: ThumbnailSize,
        token: &CancellationToken,
    ) -> Result<RgbaImage, DocumentError> {
        let page = self.render_page(page_index, THUMBNAIL_RENDER_SCALE, token)?;
        shrink(&page, size, token)
    }
}

fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
    if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }

    let doc = lopdf::Document::load_mem(bytes)?;
    let pages = doc.get_pages();
    let mut sizes = Vec::with_capacity(pages.len());

    for (page_number, object_id) in pages {
        let dict = doc.get_dictionary(object_id)?;
        let size = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| {
                if array.len() != 4 {
                    return None;
                }
                let x0 = array[0].as_float().ok()?;
                let y0 = array[1].as_float().ok()?;
                let x1 = array[2].as_float().ok()?;
                let y1 = array[3].as_float().ok()?;
                Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
            })
            .filter(|size| {
                let usable = size.width_pt.is_finite()
                    && size.height_pt.is_finite()
                    && size.width_pt > 0.0
                    && size.height_pt > 0.0;
                if !usable {
                    warn!("pdf: page {} has an unusable MediaBox {:?}", page_number, size);
                }
                usable
            })
            .unwrap_or(DEFAULT_PAGE_SIZE);

        sizes.push(size);
    }

    if sizes.is_empty() {
        return Err(PdfEngineError::Backend("document has no pages".to_owned()));
    }

    Ok(sizes)
}

fn render_placeholder(
    size: PageSize,
    scale: f32,
    token: &CancellationToken,
) -> Result<RgbaImage, DocumentError> {
    if token.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }

    let (width, height) = raster_dimensions(size, scale);

    let mut image = RgbaImage::from_pixel(width, height, PAPER);

    if width >= 4 && height >= 4 {
        for x in 0..width {
            image.put_pixel(x, 0, BORDER);
            image.put_pixel(x, height - 1, BORDER);
        }
        if token.is_cancelled() {
            return Err(DocumentError::Cancelled);
        }
        for y in 0..height {
            image.put_pixel(0, y, BORDER);
            image.put_pixel(width - 1, y, BORDER);
        }
    }

    Ok(image)
}

/// Pixel dimensions of `size` at `scale`, capped at [`MAX_RASTER_SIDE`]
/// with the aspect ratio kept.
fn raster_dimensions(size: PageSize, scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() && scale > 0.0 { f64::from(scale) } else { 1.0 };
    let mut width = f64::from(size.width_pt) * scale;
    let mut height = f64::from(size.height_pt) * scale;

    let longest = width.max(height);
    let limit = f64::from(MAX_RASTER_SIDE);
    if longest > limit {
        debug!("pdf: capping {:.0}x{:.0} raster to {} px", width, height, MAX_RASTER_SIDE);
        width *= limit / longest;
        height *= limit / longest;
    }

    let side = |value: f64| value.round().clamp(1.0, limit) as u32;
    (side(width), side(height))
}

fn shrink(
    page: &RgbaImage,
    size: ThumbnailSize,
    token: &CancellationToken,
) -> Result<RgbaImage, DocumentError> {
    if token.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }
    Ok(image::imageops::thumbnail(page, size.width_px.max(1), size.height_px.max(1)))
}
