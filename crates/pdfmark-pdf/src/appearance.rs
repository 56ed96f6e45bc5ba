//! Appearance streams, so viewers that ignore `C`/`QuadPoints` still paint the highlight.

use crate::error::{CodecError, CodecResult};
use crate::page::{number_array, rect_object};
use kurbo::Rect;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use pdfmark_core::{HighlightColor, HighlightKind};

/// Build the normal appearance (`AP.N`) for a highlight as a Form XObject.
///
/// `rects` and `bbox` are in document PDF space. The form fills each rectangle
/// with the palette color at the palette opacity; text highlights also multiply
/// so the underlying glyphs stay readable.
pub fn normal_appearance(
    doc: &mut Document,
    kind: HighlightKind,
    color: HighlightColor,
    rects: &[Rect],
    bbox: Rect,
) -> CodecResult<ObjectId> {
    let [r, g, b] = color.rgb_unit();
    let opacity = color.opacity();

    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(b"GS0".to_vec())]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
    ];
    for rect in rects {
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.x0 as f32),
                Object::Real(rect.y0 as f32),
                Object::Real(rect.width() as f32),
                Object::Real(rect.height() as f32),
            ],
        ));
    }
    operations.push(Operation::new("f", vec![]));
    operations.push(Operation::new("Q", vec![]));

    let content = Content { operations }
        .encode()
        .map_err(|e| CodecError::Write(format!("Failed to encode appearance: {}", e)))?;

    let mut state = dictionary! {
        "Type" => "ExtGState",
        "CA" => Object::Real(opacity),
        "ca" => Object::Real(opacity),
    };
    if kind == HighlightKind::Text {
        state.set("BM", Object::Name(b"Multiply".to_vec()));
    }

    let form = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => rect_object(bbox),
        "Matrix" => number_array(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
        "Resources" => dictionary! {
            "ExtGState" => dictionary! { "GS0" => state },
        },
    };
    Ok(doc.add_object(Stream::new(form, content)))
}
