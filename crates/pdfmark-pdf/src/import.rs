//! Read native highlight annotations back into highlights.

use crate::error::{CodecError, CodecResult};
use crate::page::{PageBox, annotations, name, page_box, read_date, read_numbers, read_rect, read_text};
use chrono::Utc;
use kurbo::Rect;
use lopdf::{Dictionary, Document};
use pdfmark_core::transform::from_pdf_points;
use pdfmark_core::{Highlight, HighlightColor, OwnerKey};
use uuid::Uuid;

/// What an import found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub highlights: Vec<Highlight>,
    /// `Highlight`/`Square` annotations that could not be read.
    pub skipped: usize,
    /// Annotations of other subtypes.
    pub ignored: usize,
}

/// Import every highlight annotation in a PDF for `owner`.
pub fn import_highlights(pdf_bytes: &[u8], owner: &OwnerKey) -> CodecResult<ImportReport> {
    let doc = Document::load_mem(pdf_bytes)?;
    import_from_document(&doc, owner)
}

/// Import from an already loaded document.
///
/// Highlights come back in PDF space of their page: `base_size` is the page's
/// MediaBox size, so they render correctly once rescaled by the caller's surface.
pub fn import_from_document(doc: &Document, owner: &OwnerKey) -> CodecResult<ImportReport> {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(CodecError::NoPages);
    }

    let mut report = ImportReport::default();
    for (&page, &page_id) in &pages {
        let page_box = page_box(doc, page_id);
        for annot in annotations(doc, page_id) {
            let dict = annot.dict();
            let kind = match name(dict, b"Subtype") {
                Some(b"Highlight") => AnnotKind::Text,
                Some(b"Square") => AnnotKind::Area,
                _ => {
                    report.ignored += 1;
                    continue;
                }
            };
            match read_annotation(doc, dict, kind, page, page_box, owner) {
                Some(highlight) => report.highlights.push(highlight),
                None => {
                    log::warn!("skipping unreadable annotation on page {}", page);
                    report.skipped += 1;
                }
            }
        }
    }

    log::info!(
        "imported {} highlights ({} skipped, {} ignored)",
        report.highlights.len(),
        report.skipped,
        report.ignored
    );
    Ok(report)
}

#[derive(Clone, Copy)]
enum AnnotKind {
    Text,
    Area,
}

fn read_annotation(
    doc: &Document,
    dict: &Dictionary,
    kind: AnnotKind,
    page: u32,
    page_box: PageBox,
    owner: &OwnerKey,
) -> Option<Highlight> {
    let to_base = |rect: Rect| from_pdf_points(page_box.to_local(rect), page_box.size, page_box.size);
    let base_size = page_box.size;
    let color = read_color(doc, dict);

    let highlight = match kind {
        AnnotKind::Text => {
            let rects: Vec<Rect> = quad_rects(doc, dict)
                .or_else(|| read_rect(doc, dict.get(b"Rect").ok()?).map(|r| vec![r]))?
                .into_iter()
                .map(to_base)
                .collect();
            let text = read_text(doc, dict, b"Contents").unwrap_or_default();
            Highlight::text(owner.clone(), page, rects, base_size, color, text)
        }
        AnnotKind::Area => {
            let rect = to_base(read_rect(doc, dict.get(b"Rect").ok()?)?);
            let text = read_text(doc, dict, b"Contents").unwrap_or_default();
            Highlight::area(owner.clone(), page, rect, base_size, color).with_text(text)
        }
    };

    if highlight.rects().iter().any(|r| r.width() <= 0.0 || r.height() <= 0.0) {
        return None;
    }
    if let Err(reason) = highlight.validate() {
        log::debug!("annotation rejected: {}", reason);
        return None;
    }

    let id = read_text(doc, dict, b"NM")
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let created_at = read_date(doc, dict, b"CreationDate")
        .or_else(|| read_date(doc, dict, b"M"))
        .unwrap_or_else(Utc::now);
    Some(highlight.with_id(id).with_created_at(created_at))
}

/// One bounding rectangle per quadrilateral. `None` when absent or malformed.
fn quad_rects(doc: &Document, dict: &Dictionary) -> Option<Vec<Rect>> {
    let values = read_numbers(doc, dict.get(b"QuadPoints").ok()?)?;
    if values.is_empty() || values.len() % 8 != 0 {
        return None;
    }
    Some(
        values
            .chunks_exact(8)
            .map(|q| {
                let xs = [q[0], q[2], q[4], q[6]];
                let ys = [q[1], q[3], q[5], q[7]];
                Rect::new(
                    xs.iter().copied().fold(f64::INFINITY, f64::min),
                    ys.iter().copied().fold(f64::INFINITY, f64::min),
                    xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                )
            })
            .collect(),
    )
}

/// Interior color, else stroke color, snapped to the palette.
fn read_color(doc: &Document, dict: &Dictionary) -> HighlightColor {
    [b"IC".as_slice(), b"C".as_slice()]
        .into_iter()
        .filter_map(|key| read_numbers(doc, dict.get(key).ok()?))
        .find_map(|values| match values.as_slice() {
            [r, g, b] => Some(HighlightColor::nearest([*r as f32, *g as f32, *b as f32])),
            _ => None,
        })
        .unwrap_or_default()
}
