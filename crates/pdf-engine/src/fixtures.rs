//! Synthetic PDFs for tests.

use crate::{PageSize, PdfEngineError};
use lopdf::{dictionary, Object, Stream};

/// Size of every page written by [`blank_pdf`].
pub const PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// Builds a PDF with `page_count` empty pages.
pub fn blank_pdf(page_count: u32) -> Result<Vec<u8>, PdfEngineError> {
    pdf_with_page_size(page_count, PAGE_SIZE.width_pt, PAGE_SIZE.height_pt)
}

/// Builds a PDF whose pages all carry `MediaBox [0 0 width height]`.
pub fn pdf_with_page_size(
    page_count: u32,
    width_pt: f32,
    height_pt: f32,
) -> Result<Vec<u8>, PdfEngineError> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(page_count as usize);
    for _ in 0..page_count {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width_pt),
            Object::Real(height_pt),
        ];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => media_box,
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(i64::from(page_count)),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|err| PdfEngineError::Backend(err.to_string()))?;
    Ok(bytes)
}
