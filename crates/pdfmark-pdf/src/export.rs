//! Write highlights into a PDF as native annotations.

use crate::appearance::normal_appearance;
use crate::error::{CodecError, CodecResult};
use crate::page::{
    AnnotRef, annotations, append_annotation, format_date, number_array, page_box, read_text, rect_object, resolve,
    text_string,
};
use chrono::Utc;
use kurbo::Rect;
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use pdfmark_core::transform::{bounding_box, to_pdf_points};
use pdfmark_core::{Highlight, HighlightKind};

/// Print flag (bit 3).
const FLAG_PRINT: i64 = 4;

/// What an export did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// New annotations added.
    pub written: usize,
    /// Existing annotations with the same `NM` overwritten.
    pub replaced: usize,
    /// Highlights whose page does not exist in the document.
    pub skipped: usize,
}

/// Export highlights into a copy of `pdf_bytes`.
pub fn export_highlights(pdf_bytes: &[u8], highlights: &[Highlight]) -> CodecResult<Vec<u8>> {
    export_with_report(pdf_bytes, highlights).map(|(bytes, _)| bytes)
}

/// [`export_highlights`], also returning what was written.
pub fn export_with_report(pdf_bytes: &[u8], highlights: &[Highlight]) -> CodecResult<(Vec<u8>, ExportReport)> {
    let mut doc = Document::load_mem(pdf_bytes)?;
    let report = export_to_document(&mut doc, highlights)?;
    log::info!(
        "exported {} highlights ({} replaced, {} skipped)",
        report.written + report.replaced,
        report.replaced,
        report.skipped
    );

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| CodecError::Write(e.to_string()))?;
    Ok((output, report))
}

/// Export highlights into an already loaded document.
pub fn export_to_document(doc: &mut Document, highlights: &[Highlight]) -> CodecResult<ExportReport> {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(CodecError::NoPages);
    }

    let mut report = ExportReport::default();
    for highlight in highlights {
        let Some(&page_id) = pages.get(&highlight.page) else {
            log::warn!(
                "highlight {} is on page {} but the document has {} pages",
                highlight.id,
                highlight.page,
                pages.len()
            );
            report.skipped += 1;
            continue;
        };

        let annotation = build_annotation(doc, page_id, highlight)?;
        match find_by_name(doc, page_id, &highlight.id) {
            Some(existing) => {
                let stale = appearance_streams(doc, existing);
                doc.objects.insert(existing, Object::Dictionary(annotation));
                for id in stale {
                    doc.objects.remove(&id);
                }
                report.replaced += 1;
            }
            None => {
                let annot_id = doc.add_object(annotation);
                append_annotation(doc, page_id, annot_id)?;
                report.written += 1;
            }
        }
    }
    Ok(report)
}

/// An indirect annotation on the page whose `NM` equals `name`.
fn find_by_name(doc: &Document, page_id: ObjectId, name: &str) -> Option<ObjectId> {
    annotations(doc, page_id).into_iter().find_map(|annot| match annot {
        AnnotRef::Indirect(id, dict) if read_text(doc, dict, b"NM").as_deref() == Some(name) => Some(id),
        _ => None,
    })
}

/// Indirect appearance streams of an annotation (`AP` entries `N`, `R` and `D`).
fn appearance_streams(doc: &Document, annot_id: ObjectId) -> Vec<ObjectId> {
    let Some(ap) = doc
        .get_dictionary(annot_id)
        .ok()
        .and_then(|annot| annot.get(b"AP").ok())
        .and_then(|ap| resolve(doc, ap))
        .and_then(|ap| ap.as_dict().ok())
    else {
        return Vec::new();
    };
    ap.iter()
        .filter_map(|(_, entry)| entry.as_reference().ok())
        .collect()
}

/// Quad points for one rectangle: top-left, top-right, bottom-left, bottom-right.
fn quad(rect: Rect) -> [f64; 8] {
    [rect.x0, rect.y1, rect.x1, rect.y1, rect.x0, rect.y0, rect.x1, rect.y0]
}

fn build_annotation(doc: &mut Document, page_id: ObjectId, highlight: &Highlight) -> CodecResult<Dictionary> {
    let page_box = page_box(doc, page_id);
    let rects: Vec<Rect> = highlight
        .rects()
        .iter()
        .map(|r| page_box.to_document(to_pdf_points(*r, highlight.base_size, page_box.size)))
        .collect();
    let bbox = bounding_box(&rects).unwrap_or(Rect::ZERO);

    let color = number_array(&highlight.color.rgb_unit().map(f64::from));
    let opacity = Object::Real(highlight.color.opacity());
    let appearance = normal_appearance(doc, highlight.kind(), highlight.color, &rects, bbox)?;

    let mut annotation = dictionary! {
        "Type" => "Annot",
        "Rect" => rect_object(bbox),
        "P" => Object::Reference(page_id),
        "NM" => text_string(&highlight.id),
        "Contents" => text_string(&highlight.text),
        "C" => color.clone(),
        "IC" => color,
        "CA" => opacity,
        "F" => FLAG_PRINT,
        "M" => format_date(Utc::now()),
        "CreationDate" => format_date(highlight.created_at),
        "AP" => dictionary! { "N" => Object::Reference(appearance) },
    };

    match highlight.kind() {
        HighlightKind::Text => {
            let quads: Vec<f64> = rects.iter().flat_map(|r| quad(*r)).collect();
            annotation.set("Subtype", Object::Name(b"Highlight".to_vec()));
            annotation.set("QuadPoints", number_array(&quads));
        }
        HighlightKind::Area => {
            annotation.set("Subtype", Object::Name(b"Square".to_vec()));
            annotation.set("BS", dictionary! { "W" => 0 });
        }
    }
    Ok(annotation)
}
