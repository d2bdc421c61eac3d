use doc_model::{CancellationToken, Document, DocumentError, RgbaImage, ThumbnailSize};
use pageview_scheduler::ThumbnailSource;
use std::sync::Arc;

/// Produces strip thumbnails by rendering pages of a [`Document`].
pub struct DocumentThumbnails<D: Document> {
    document: Arc<D>,
    size: ThumbnailSize,
}

impl<D: Document> DocumentThumbnails<D> {
    pub fn new(document: Arc<D>, size: ThumbnailSize) -> Self {
        Self { document, size }
    }
}

impl<D: Document> ThumbnailSource for DocumentThumbnails<D> {
    type Image = RgbaImage;
    type Error = DocumentError;

    fn produce(
        &self,
        page_index: u32,
        token: &CancellationToken,
    ) -> Result<Option<RgbaImage>, DocumentError> {
        if token.is_cancelled() {
            return Ok(None);
        }

        match self.document.render_thumbnail(page_index, self.size, token) {
            Ok(_) if token.is_cancelled() => Ok(None),
            Ok(image) => Ok(Some(image)),
            Err(DocumentError::Cancelled) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
