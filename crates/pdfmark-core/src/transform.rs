//! Conversions between base, canvas and PDF coordinate spaces.
//!
//! * **Base space**: logical CSS pixels at the page's natural size, origin top-left.
//!   All stored geometry lives here.
//! * **Canvas space**: physical pixels of the drawing surface (device pixel ratio
//!   and zoom applied), origin top-left.
//! * **PDF space**: points, origin bottom-left.
//!
//! Scaling is per-axis, so a non-uniform canvas is handled correctly. A degenerate
//! size on either side leaves the input unchanged instead of producing NaNs.

use kurbo::{Affine, Point, Rect, Size};

/// Ratio above which a declared base size is treated as unreliable.
pub const LEGACY_SIZE_RATIO: f64 = 1.2;

/// Whether a size can be used as a scaling reference.
pub fn is_valid_size(size: Size) -> bool {
    size.width.is_finite() && size.height.is_finite() && size.width > 0.0 && size.height > 0.0
}

/// Affine mapping `from`-sized space onto `to`-sized space (same origin and axis direction).
fn scale_between(from: Size, to: Size) -> Affine {
    if !is_valid_size(from) || !is_valid_size(to) {
        return Affine::IDENTITY;
    }
    Affine::scale_non_uniform(to.width / from.width, to.height / from.height)
}

/// Affine mapping base space onto PDF space, flipping the y-axis.
fn base_to_pdf(base_size: Size, pdf_page_size: Size) -> Affine {
    if !is_valid_size(base_size) || !is_valid_size(pdf_page_size) {
        return Affine::IDENTITY;
    }
    let sx = pdf_page_size.width / base_size.width;
    let sy = pdf_page_size.height / base_size.height;
    Affine::new([sx, 0.0, 0.0, -sy, 0.0, pdf_page_size.height])
}

/// Base rectangle → canvas rectangle.
pub fn to_canvas(rect: Rect, base_size: Size, canvas_size: Size) -> Rect {
    scale_between(base_size, canvas_size).transform_rect_bbox(rect)
}

/// Canvas rectangle → base rectangle.
pub fn to_base(rect: Rect, base_size: Size, canvas_size: Size) -> Rect {
    scale_between(canvas_size, base_size).transform_rect_bbox(rect)
}

/// Base point → canvas point.
pub fn point_to_canvas(point: Point, base_size: Size, canvas_size: Size) -> Point {
    scale_between(base_size, canvas_size) * point
}

/// Canvas point → base point.
pub fn point_to_base(point: Point, base_size: Size, canvas_size: Size) -> Point {
    scale_between(canvas_size, base_size) * point
}

/// Base rectangle → PDF rectangle (`y0` is the bottom edge in the result).
///
/// `pdf_y = pdf_h - (base_y + base_h) * sy`
pub fn to_pdf_points(rect: Rect, base_size: Size, pdf_page_size: Size) -> Rect {
    base_to_pdf(base_size, pdf_page_size).transform_rect_bbox(rect)
}

/// PDF rectangle → base rectangle, undoing the y flip.
pub fn from_pdf_points(rect: Rect, pdf_page_size: Size, base_size: Size) -> Rect {
    base_to_pdf(base_size, pdf_page_size)
        .inverse()
        .transform_rect_bbox(rect)
}

/// Pick the size stored geometry should be scaled from.
///
/// Older records were captured in canvas pixels while declaring a CSS-pixel base
/// size. When any rectangle reaches past `ratio` times the declared size, the
/// declared size is ignored and `current` is used instead.
pub fn effective_base_size_with_ratio(rects: &[Rect], declared: Size, current: Size, ratio: f64) -> Size {
    if !is_valid_size(declared) {
        return current;
    }
    let overflows = rects
        .iter()
        .any(|r| r.x1 > declared.width * ratio || r.y1 > declared.height * ratio);
    if overflows && is_valid_size(current) {
        log::debug!(
            "declared base size {}x{} too small for stored geometry, using {}x{}",
            declared.width,
            declared.height,
            current.width,
            current.height
        );
        current
    } else {
        declared
    }
}

/// [`effective_base_size_with_ratio`] with [`LEGACY_SIZE_RATIO`].
pub fn effective_base_size(rects: &[Rect], declared: Size, current: Size) -> Size {
    effective_base_size_with_ratio(rects, declared, current, LEGACY_SIZE_RATIO)
}

/// Smallest rectangle containing every rectangle in `rects`.
pub fn bounding_box(rects: &[Rect]) -> Option<Rect> {
    let (first, rest) = rects.split_first()?;
    Some(rest.iter().fold(*first, |acc, r| acc.union(*r)))
}
