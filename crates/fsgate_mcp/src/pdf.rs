//! PDF Pager - Page Rasterization for read-file
//!
//! A PDF of at most `MAX_PDF_PAGES` pages becomes, per page, a WebP image
//! followed by that page's extracted text. Longer documents come back as
//! text only.
//!
//! Rendering happens on one blocking worker because the codec is not
//! thread-safe. Each rendered page is handed over a bounded channel and
//! encoded on its own blocking task, so encoding overlaps rendering.
//!
//! ```text
//! spawn_blocking: open ─► page 1 ─► page 2 ─► ...      (render worker)
//!                            │         │
//!                            ▼         ▼
//! JoinSet:                encode 1  encode 2  ...       (spawn_blocking each)
//! ```

use crate::types::ToolContent;
use pdfium_render::prelude::{
    PdfDocument as PdfiumDocumentHandle, PdfPage, PdfPageIndex, PdfRenderConfig, Pdfium,
    PdfiumError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Documents longer than this are returned as text only
pub const MAX_PDF_PAGES: usize = 100;

/// Rendered pages stay below this many pixels on either side (2^10 + 2^7)
pub const PIXEL_CEILING: f64 = 1152.0;

pub const WEBP_QUALITY: f32 = 80.0;

const MIN_ZOOM: f64 = 1.0;
const MAX_ZOOM: f64 = 10.0;
const ZOOM_STEP: f64 = 0.1;
const MAX_ZOOM_ITERATIONS: usize = 64;

/// Rendered pages waiting for an encoder
const RENDER_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("PDF renderer unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to open PDF: {0}")]
    Open(String),

    #[error("Failed to process page {page}: {reason}")]
    Page { page: usize, reason: String },

    #[error("Failed to encode page {page}: {reason}")]
    Encode { page: usize, reason: String },

    #[error("PDF worker failed: {0}")]
    Worker(String),

    #[error("PDF conversion cancelled")]
    Cancelled,
}

/// One rendered page as tightly packed RGBA8
#[derive(Debug, Clone)]
pub struct RgbaPage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// An open PDF. Page indices are 0-based.
pub trait PdfDocument {
    fn page_count(&self) -> usize;

    /// Page size in points (width, height)
    fn page_size(&self, index: usize) -> Result<(f64, f64), CodecError>;

    fn page_text(&self, index: usize) -> Result<String, CodecError>;

    fn render_page(&self, index: usize, zoom: f64) -> Result<RgbaPage, CodecError>;
}

/// Opens PDF bytes and lends the document to `visit`.
///
/// Documents borrow from the codec library handle, so they are only
/// available inside the callback. Called on a blocking thread.
pub trait PdfBackend: Send + Sync {
    fn with_document(
        &self,
        bytes: Vec<u8>,
        visit: &mut dyn FnMut(&dyn PdfDocument) -> Result<(), CodecError>,
    ) -> Result<(), CodecError>;
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub index: usize,
    pub image: RgbaPage,
    pub text: String,
}

/// What the render worker produces
#[derive(Debug, Clone)]
pub enum PdfItem {
    TextOnly { page_count: usize, text: String },
    Page(RenderedPage),
}

/// Largest zoom in `[1, 10]` keeping the page under the pixel ceiling,
/// found by binary search in 0.1 steps.
pub fn optimal_zoom(width: f64, height: f64) -> f64 {
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return MIN_ZOOM;
    }

    let mut low = MIN_ZOOM;
    let mut high = MAX_ZOOM;
    let mut iterations = 0;

    while low < high && iterations < MAX_ZOOM_ITERATIONS {
        let mid = (low + high) / 2.0;
        if width * mid >= PIXEL_CEILING || height * mid >= PIXEL_CEILING {
            high = mid;
        } else {
            low = mid + ZOOM_STEP;
        }
        iterations += 1;
    }

    low
}

/// Walk a document and emit either one text-only item or one item per page.
pub fn rasterize_document(
    doc: &dyn PdfDocument,
    emit: &mut dyn FnMut(PdfItem) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    let page_count = doc.page_count();

    if page_count > MAX_PDF_PAGES {
        debug!(page_count, "PDF over page cap, extracting text only");
        let mut text = String::new();
        for index in 0..page_count {
            text.push_str(&doc.page_text(index)?);
        }
        return emit(PdfItem::TextOnly { page_count, text });
    }

    for index in 0..page_count {
        let (width, height) = doc.page_size(index)?;
        let zoom = optimal_zoom(width, height);
        let image = doc.render_page(index, zoom)?;
        let text = doc.page_text(index)?;
        emit(PdfItem::Page(RenderedPage { index, image, text }))?;
    }

    Ok(())
}

/// Convert PDF bytes into read-file content blocks.
///
/// Dropping the returned future stops the render worker at its next page.
pub async fn pdf_to_contents(
    backend: Arc<dyn PdfBackend>,
    bytes: Vec<u8>,
) -> Result<Vec<ToolContent>, CodecError> {
    let (tx, mut rx) = mpsc::channel::<PdfItem>(RENDER_QUEUE_DEPTH);

    let renderer = tokio::task::spawn_blocking(move || {
        backend.with_document(bytes, &mut |doc: &dyn PdfDocument| {
            rasterize_document(doc, &mut |item: PdfItem| {
                tx.blocking_send(item).map_err(|_| CodecError::Cancelled)
            })
        })
    });

    let mut text_only = None;
    let mut texts = BTreeMap::new();
    let mut encoders = JoinSet::new();

    while let Some(item) = rx.recv().await {
        match item {
            PdfItem::TextOnly { page_count, text } => text_only = Some((page_count, text)),
            PdfItem::Page(RenderedPage { index, image, text }) => {
                texts.insert(index, text);
                encoders.spawn_blocking(move || encode_webp(index, &image).map(|webp| (index, webp)));
            }
        }
    }

    renderer
        .await
        .map_err(|e| CodecError::Worker(e.to_string()))??;

    if let Some((page_count, text)) = text_only {
        debug!(page_count, "PDF returned as text");
        return Ok(vec![
            ToolContent::text(format!(
                "PDF contains more than {} pages, only text is returned.",
                MAX_PDF_PAGES
            )),
            ToolContent::text(extracted_text(&text)),
        ]);
    }

    let mut images = BTreeMap::new();
    while let Some(joined) = encoders.join_next().await {
        let (index, webp) = joined.map_err(|e| CodecError::Worker(e.to_string()))??;
        images.insert(index, webp);
    }

    let mut contents = Vec::with_capacity(texts.len() * 2);
    for (index, text) in texts {
        let webp = images.remove(&index).ok_or_else(|| CodecError::Encode {
            page: index + 1,
            reason: "encoder produced no output".to_string(),
        })?;
        contents.push(ToolContent::image(&webp, "image/webp"));
        contents.push(ToolContent::text(extracted_text(&text)));
    }

    debug!(pages = contents.len() / 2, "PDF rasterized");
    Ok(contents)
}

fn extracted_text(text: &str) -> String {
    format!("<extractedText>{}</extractedText>", text)
}

fn encode_webp(index: usize, page: &RgbaPage) -> Result<Vec<u8>, CodecError> {
    let expected = page.width as usize * page.height as usize * 4;
    if page.width == 0 || page.height == 0 || page.pixels.len() != expected {
        return Err(CodecError::Encode {
            page: index + 1,
            reason: format!(
                "bitmap is {} bytes, expected {} for {}x{}",
                page.pixels.len(),
                expected,
                page.width,
                page.height
            ),
        });
    }

    webp::Encoder::from_rgba(&page.pixels, page.width, page.height)
        .encode_simple(false, WEBP_QUALITY)
        .map(|memory| memory.to_vec())
        .map_err(|e| CodecError::Encode {
            page: index + 1,
            reason: format!("{:?}", e),
        })
}

// =============================================================================
// pdfium backend
// =============================================================================

/// Renders with the pdfium library found on the system library path
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumBackend;

impl PdfBackend for PdfiumBackend {
    fn with_document(
        &self,
        bytes: Vec<u8>,
        visit: &mut dyn FnMut(&dyn PdfDocument) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        let bindings = Pdfium::bind_to_system_library().map_err(|e| {
            warn!(error = ?e, "Could not bind pdfium");
            CodecError::Unavailable(format!("{:?}", e))
        })?;
        let pdfium = Pdfium::new(bindings);
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| CodecError::Open(format!("{:?}", e)))?;

        visit(&PdfiumDocument {
            document: &document,
        })
    }
}

struct PdfiumDocument<'d, 'a> {
    document: &'d PdfiumDocumentHandle<'a>,
}

impl<'d, 'a> PdfiumDocument<'d, 'a> {
    fn with_page<T>(
        &self,
        index: usize,
        f: impl FnOnce(&PdfPage<'a>) -> Result<T, PdfiumError>,
    ) -> Result<T, CodecError> {
        let page_error = |reason: String| CodecError::Page {
            page: index + 1,
            reason,
        };
        let page_index = PdfPageIndex::try_from(index)
            .map_err(|_| page_error("page index out of range".to_string()))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| page_error(format!("{:?}", e)))?;
        f(&page).map_err(|e| page_error(format!("{:?}", e)))
    }
}

impl PdfDocument for PdfiumDocument<'_, '_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<(f64, f64), CodecError> {
        self.with_page(index, |page| {
            Ok((page.width().value as f64, page.height().value as f64))
        })
    }

    fn page_text(&self, index: usize) -> Result<String, CodecError> {
        self.with_page(index, |page| Ok(page.text()?.all()))
    }

    fn render_page(&self, index: usize, zoom: f64) -> Result<RgbaPage, CodecError> {
        self.with_page(index, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(zoom as f32);
            let bitmap = page.render_with_config(&config)?;
            Ok(RgbaPage {
                width: bitmap.width() as u32,
                height: bitmap.height() as u32,
                pixels: bitmap.as_rgba_bytes(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Letter-sized pages rendering to a tiny solid bitmap
    struct FakeDocument {
        pages: usize,
        renders: AtomicUsize,
    }

    impl FakeDocument {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                renders: AtomicUsize::new(0),
            }
        }
    }

    impl PdfDocument for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn page_size(&self, _index: usize) -> Result<(f64, f64), CodecError> {
            Ok((612.0, 792.0))
        }

        fn page_text(&self, index: usize) -> Result<String, CodecError> {
            Ok(format!("page {};", index + 1))
        }

        fn render_page(&self, _index: usize, _zoom: f64) -> Result<RgbaPage, CodecError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            Ok(RgbaPage {
                width: 4,
                height: 4,
                pixels: vec![200; 4 * 4 * 4],
            })
        }
    }

    struct FakeBackend {
        pages: usize,
    }

    impl PdfBackend for FakeBackend {
        fn with_document(
            &self,
            _bytes: Vec<u8>,
            visit: &mut dyn FnMut(&dyn PdfDocument) -> Result<(), CodecError>,
        ) -> Result<(), CodecError> {
            visit(&FakeDocument::new(self.pages))
        }
    }

    struct BrokenBackend;

    impl PdfBackend for BrokenBackend {
        fn with_document(
            &self,
            _bytes: Vec<u8>,
            _visit: &mut dyn FnMut(&dyn PdfDocument) -> Result<(), CodecError>,
        ) -> Result<(), CodecError> {
            Err(CodecError::Unavailable("no pdfium".to_string()))
        }
    }

    #[test]
    fn test_zoom_for_letter_page() {
        let zoom = optimal_zoom(612.0, 792.0);
        assert!(zoom > 1.3 && zoom < 1.6, "zoom {}", zoom);
    }

    #[test]
    fn test_zoom_bounds() {
        assert_eq!(optimal_zoom(5000.0, 5000.0), 1.0);
        assert!(optimal_zoom(10.0, 10.0) >= 9.9);
        assert_eq!(optimal_zoom(0.0, 100.0), 1.0);
        assert_eq!(optimal_zoom(f64::NAN, 100.0), 1.0);
    }

    #[test]
    fn test_page_cap_skips_rendering() {
        let doc = FakeDocument::new(150);
        let mut items = Vec::new();
        rasterize_document(&doc, &mut |item: PdfItem| {
            items.push(item);
            Ok(())
        })
        .unwrap();

        assert_eq!(doc.renders.load(Ordering::SeqCst), 0);
        assert_eq!(items.len(), 1);
        match &items[0] {
            PdfItem::TextOnly { page_count, text } => {
                assert_eq!(*page_count, 150);
                assert!(text.starts_with("page 1;page 2;"));
                assert!(text.ends_with("page 150;"));
            }
            other => panic!("expected text only, got {:?}", other),
        }
    }

    #[test]
    fn test_exactly_cap_pages_are_rendered() {
        let doc = FakeDocument::new(MAX_PDF_PAGES);
        let mut pages = 0;
        rasterize_document(&doc, &mut |item: PdfItem| {
            assert!(matches!(item, PdfItem::Page(_)));
            pages += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(pages, MAX_PDF_PAGES);
    }

    #[tokio::test]
    async fn test_over_cap_contents() {
        let contents = pdf_to_contents(Arc::new(FakeBackend { pages: 150 }), Vec::new())
            .await
            .unwrap();

        assert_eq!(contents.len(), 2);
        assert_eq!(
            contents[0].as_text(),
            Some("PDF contains more than 100 pages, only text is returned.")
        );
        let text = contents[1].as_text().unwrap();
        assert!(text.starts_with("<extractedText>page 1;"));
        assert!(text.ends_with("page 150;</extractedText>"));
        assert!(contents
            .iter()
            .all(|c| matches!(c, ToolContent::Text { .. })));
    }

    #[tokio::test]
    async fn test_pages_interleave_image_and_text_in_order() {
        let contents = pdf_to_contents(Arc::new(FakeBackend { pages: 3 }), Vec::new())
            .await
            .unwrap();

        assert_eq!(contents.len(), 6);
        for (page, pair) in contents.chunks(2).enumerate() {
            match &pair[0] {
                ToolContent::Image { mime_type, .. } => assert_eq!(mime_type, "image/webp"),
                other => panic!("expected image, got {:?}", other),
            }
            assert_eq!(
                pair[1].as_text().unwrap(),
                format!("<extractedText>page {};</extractedText>", page + 1)
            );
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let result = pdf_to_contents(Arc::new(BrokenBackend), Vec::new()).await;
        assert!(matches!(result, Err(CodecError::Unavailable(_))));
    }

    #[test]
    fn test_encode_rejects_short_bitmap() {
        let page = RgbaPage {
            width: 4,
            height: 4,
            pixels: vec![0; 10],
        };
        assert!(matches!(
            encode_webp(0, &page),
            Err(CodecError::Encode { page: 1, .. })
        ));
    }
}
