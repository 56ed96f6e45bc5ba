//! Remote store contract and wire format.

use crate::highlight::{Geometry, Highlight, HighlightKind};
use crate::palette::HighlightColor;
use crate::storage::BoxFuture;
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rectangle as sent over the wire, in base-space pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect> for WireRect {
    fn from(rect: Rect) -> Self {
        let rect = rect.abs();
        Self {
            x: rect.x0,
            y: rect.y0,
            width: rect.width(),
            height: rect.height(),
        }
    }
}

impl From<WireRect> for Rect {
    fn from(rect: WireRect) -> Self {
        Rect::new(rect.x, rect.y, rect.x + rect.width, rect.y + rect.height)
    }
}

/// Highlight geometry on the wire: `{"rects": [...]}` or `{"area": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Rects(Vec<WireRect>),
    Area(WireRect),
}

impl From<&Geometry> for Position {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Text { rects } => Position::Rects(rects.iter().copied().map(WireRect::from).collect()),
            Geometry::Area { rect } => Position::Area((*rect).into()),
        }
    }
}

/// Body of a remote save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePayload {
    pub reference_id: String,
    #[serde(rename = "type")]
    pub kind: HighlightKind,
    pub page_number: u32,
    pub content: String,
    pub position: Position,
    pub color: HighlightColor,
}

impl SavePayload {
    /// Build the payload for a highlight. `None` when the owner has no remote reference.
    pub fn from_highlight(highlight: &Highlight) -> Option<Self> {
        let reference_id = highlight.owner.reference_id()?;
        Some(Self {
            reference_id: reference_id.to_string(),
            kind: highlight.kind(),
            page_number: highlight.page,
            content: highlight.text.clone(),
            position: Position::from(&highlight.geometry),
            color: highlight.color,
        })
    }
}

/// Body of a remote delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePayload {
    #[serde(rename = "annotationId")]
    pub annotation_id: String,
}

/// Annotation as confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAnnotation {
    pub id: String,
}

/// Remote call failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rejected by remote ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Remote call timed out")]
    Timeout,
}

/// The remote annotation store.
///
/// Implementations own transport concerns, including applying timeouts.
pub trait RemoteStore: Send + Sync {
    fn save(&self, payload: &SavePayload) -> BoxFuture<'_, Result<RemoteAnnotation, RemoteError>>;

    fn delete(&self, payload: &DeletePayload) -> BoxFuture<'_, Result<(), RemoteError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::OwnerKey;
    use kurbo::Size;
    use serde_json::json;

    #[test]
    fn test_text_payload_shape() {
        let h = Highlight::text(
            OwnerKey::Remote("ref-1".to_string()),
            2,
            vec![Rect::new(10.0, 20.0, 110.0, 32.0)],
            Size::new(612.0, 792.0),
            HighlightColor::Green,
            "quoted",
        );
        let payload = SavePayload::from_highlight(&h).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "reference_id": "ref-1",
                "type": "text",
                "page_number": 2,
                "content": "quoted",
                "position": { "rects": [ { "x": 10.0, "y": 20.0, "width": 100.0, "height": 12.0 } ] },
                "color": "green"
            })
        );
    }

    #[test]
    fn test_area_payload_shape() {
        let h = Highlight::area(
            OwnerKey::Remote("ref-1".to_string()),
            1,
            Rect::new(5.0, 5.0, 25.0, 45.0),
            Size::new(612.0, 792.0),
            HighlightColor::Yellow,
        );
        let payload = SavePayload::from_highlight(&h).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value["position"],
            json!({ "area": { "x": 5.0, "y": 5.0, "width": 20.0, "height": 40.0 } })
        );
        assert_eq!(value["type"], "area");
    }

    #[test]
    fn test_no_payload_without_reference() {
        let h = Highlight::area(
            OwnerKey::Local("cache".to_string()),
            1,
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Size::new(612.0, 792.0),
            HighlightColor::Yellow,
        );
        assert!(SavePayload::from_highlight(&h).is_none());
    }

    #[test]
    fn test_delete_payload_shape() {
        let payload = DeletePayload { annotation_id: "a-7".to_string() };
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({ "annotationId": "a-7" }));
    }

    #[test]
    fn test_wire_rect_roundtrip() {
        let rect = Rect::new(1.5, 2.5, 10.0, 20.0);
        assert_eq!(Rect::from(WireRect::from(rect)), rect);
    }
}
