//! Highlight entity.

use crate::palette::HighlightColor;
use crate::transform::{bounding_box, is_valid_size};
use chrono::{DateTime, Utc};
use kurbo::{Rect, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for highlights.
pub type HighlightId = String;

/// Current on-disk geometry format. Records written before versioning read as `0`.
pub const GEOMETRY_VERSION: u32 = 1;

/// Which document a highlight belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum OwnerKey {
    /// Document known to the remote store by this reference id.
    Remote(String),
    /// Document only present in the local cache.
    Local(String),
    /// Throwaway session; never sent to the remote store.
    Ephemeral,
}

impl OwnerKey {
    /// Whether highlights under this owner can be saved remotely.
    pub fn is_remote(&self) -> bool {
        matches!(self, OwnerKey::Remote(_))
    }

    /// Remote reference id, if any.
    pub fn reference_id(&self) -> Option<&str> {
        match self {
            OwnerKey::Remote(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKey::Remote(id) => write!(f, "remote:{}", id),
            OwnerKey::Local(id) => write!(f, "local:{}", id),
            OwnerKey::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid owner key {0:?}: expected remote:<id>, local:<id> or ephemeral")]
pub struct ParseOwnerError(pub String);

impl FromStr for OwnerKey {
    type Err = ParseOwnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "ephemeral" {
            return Ok(OwnerKey::Ephemeral);
        }
        match s.split_once(':') {
            Some(("remote", id)) if !id.is_empty() => Ok(OwnerKey::Remote(id.to_string())),
            Some(("local", id)) if !id.is_empty() => Ok(OwnerKey::Local(id.to_string())),
            _ => Err(ParseOwnerError(s.to_string())),
        }
    }
}

/// Highlight kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightKind {
    Text,
    Area,
}

impl HighlightKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HighlightKind::Text => "text",
            HighlightKind::Area => "area",
        }
    }
}

impl fmt::Display for HighlightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Highlight geometry in base space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Geometry {
    /// One rectangle per visual line fragment, in selection order.
    Text { rects: Vec<Rect> },
    /// A single free-drawn rectangle.
    Area { rect: Rect },
}

impl Geometry {
    pub fn kind(&self) -> HighlightKind {
        match self {
            Geometry::Text { .. } => HighlightKind::Text,
            Geometry::Area { .. } => HighlightKind::Area,
        }
    }

    pub fn rects(&self) -> &[Rect] {
        match self {
            Geometry::Text { rects } => rects,
            Geometry::Area { rect } => std::slice::from_ref(rect),
        }
    }
}

/// A highlight drawn over one page of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: HighlightId,
    pub owner: OwnerKey,
    /// 1-based page number.
    pub page: u32,
    pub geometry: Geometry,
    pub color: HighlightColor,
    /// Selected text; may be empty for area highlights.
    #[serde(default)]
    pub text: String,
    /// Logical page size the geometry was captured against.
    pub base_size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub geometry_version: u32,
}

impl Highlight {
    fn new(owner: OwnerKey, page: u32, geometry: Geometry, base_size: Size, color: HighlightColor) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            page,
            geometry,
            color,
            text: String::new(),
            base_size,
            remote_id: None,
            created_at: Utc::now(),
            synced: false,
            geometry_version: GEOMETRY_VERSION,
        }
    }

    /// Create a text highlight from line-fragment rectangles.
    pub fn text(
        owner: OwnerKey,
        page: u32,
        rects: Vec<Rect>,
        base_size: Size,
        color: HighlightColor,
        text: impl Into<String>,
    ) -> Self {
        let mut highlight = Self::new(owner, page, Geometry::Text { rects }, base_size, color);
        highlight.text = text.into();
        highlight
    }

    /// Create an area highlight.
    pub fn area(owner: OwnerKey, page: u32, rect: Rect, base_size: Size, color: HighlightColor) -> Self {
        Self::new(owner, page, Geometry::Area { rect: rect.abs() }, base_size, color)
    }

    /// Replace the generated id (used when round-tripping through other stores).
    pub fn with_id(mut self, id: impl Into<HighlightId>) -> Self {
        self.id = id.into();
        self
    }

    /// Give the highlight a freshly generated id.
    pub fn with_new_id(self) -> Self {
        self.with_id(Uuid::new_v4().to_string())
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn kind(&self) -> HighlightKind {
        self.geometry.kind()
    }

    pub fn rects(&self) -> &[Rect] {
        self.geometry.rects()
    }

    /// Bounding box of all rectangles, in base space.
    pub fn bounds(&self) -> Rect {
        bounding_box(self.rects()).unwrap_or(Rect::ZERO)
    }

    /// Key identifying semantically identical highlights.
    ///
    /// Rectangles are rounded to whole pixels and sorted so jitter and fragment
    /// order from text selection do not produce distinct keys.
    pub fn signature(&self) -> String {
        let mut rects: Vec<String> = self
            .rects()
            .iter()
            .map(|r| {
                format!(
                    "{},{},{},{}",
                    r.x0.round() as i64,
                    r.y0.round() as i64,
                    r.width().round() as i64,
                    r.height().round() as i64
                )
            })
            .collect();
        rects.sort();
        format!(
            "{}|{}|{}|{}|{}",
            self.page,
            self.kind(),
            self.color,
            rects.join(";"),
            self.text.trim()
        )
    }

    pub fn is_duplicate_of(&self, other: &Highlight) -> bool {
        self.signature() == other.signature()
    }

    /// Check structural invariants. Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.page == 0 {
            return Err("page numbers are 1-based".to_string());
        }
        if !is_valid_size(self.base_size) {
            return Err(format!(
                "base size {}x{} is not usable",
                self.base_size.width, self.base_size.height
            ));
        }
        let rects = self.rects();
        if rects.is_empty() {
            return Err("highlight has no rectangles".to_string());
        }
        if rects
            .iter()
            .any(|r| ![r.x0, r.y0, r.x1, r.y1].iter().all(|v| v.is_finite()))
        {
            return Err("highlight geometry is not finite".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_size() -> Size {
        Size::new(612.0, 792.0)
    }

    #[test]
    fn test_owner_key_roundtrip() {
        for key in [
            OwnerKey::Remote("abc".to_string()),
            OwnerKey::Local("cache-1".to_string()),
            OwnerKey::Ephemeral,
        ] {
            assert_eq!(key.to_string().parse::<OwnerKey>().unwrap(), key);
        }
        assert!("remote:".parse::<OwnerKey>().is_err());
        assert!("cloud:x".parse::<OwnerKey>().is_err());
    }

    #[test]
    fn test_area_normalizes_rect() {
        let h = Highlight::area(
            OwnerKey::Ephemeral,
            1,
            Rect::new(50.0, 60.0, 10.0, 20.0),
            page_size(),
            HighlightColor::Yellow,
        );
        assert_eq!(h.rects(), &[Rect::new(10.0, 20.0, 50.0, 60.0)]);
        assert_eq!(h.kind(), HighlightKind::Area);
    }

    #[test]
    fn test_signature_ignores_jitter_and_order() {
        let a = Highlight::text(
            OwnerKey::Ephemeral,
            2,
            vec![Rect::new(10.0, 10.0, 100.0, 22.0), Rect::new(10.0, 30.0, 80.0, 42.0)],
            page_size(),
            HighlightColor::Green,
            "hello world ",
        );
        let b = Highlight::text(
            OwnerKey::Ephemeral,
            2,
            vec![Rect::new(10.2, 29.9, 80.1, 42.0), Rect::new(9.8, 10.1, 100.0, 21.9)],
            page_size(),
            HighlightColor::Green,
            "hello world",
        );
        assert!(a.is_duplicate_of(&b));
    }

    #[test]
    fn test_signature_distinguishes_color_and_page() {
        let base = Highlight::area(
            OwnerKey::Ephemeral,
            1,
            Rect::new(0.0, 0.0, 20.0, 20.0),
            page_size(),
            HighlightColor::Yellow,
        );
        let mut other_color = base.clone();
        other_color.color = HighlightColor::Blue;
        let mut other_page = base.clone();
        other_page.page = 2;
        assert!(!base.is_duplicate_of(&other_color));
        assert!(!base.is_duplicate_of(&other_page));
    }

    #[test]
    fn test_validate() {
        let ok = Highlight::area(
            OwnerKey::Ephemeral,
            1,
            Rect::new(0.0, 0.0, 20.0, 20.0),
            page_size(),
            HighlightColor::Yellow,
        );
        assert!(ok.validate().is_ok());

        let mut zero_page = ok.clone();
        zero_page.page = 0;
        assert!(zero_page.validate().is_err());

        let empty = Highlight::text(OwnerKey::Ephemeral, 1, vec![], page_size(), HighlightColor::Yellow, "x");
        assert!(empty.validate().is_err());

        let mut no_size = ok.clone();
        no_size.base_size = Size::ZERO;
        assert!(no_size.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip_and_legacy_defaults() {
        let h = Highlight::text(
            OwnerKey::Remote("doc-9".to_string()),
            3,
            vec![Rect::new(1.0, 2.0, 3.0, 4.0)],
            page_size(),
            HighlightColor::Pink,
            "quote",
        );
        let json = serde_json::to_string(&h).unwrap();
        let back: Highlight = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);

        let mut value = serde_json::to_value(&h).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("geometry_version");
        obj.remove("synced");
        let legacy: Highlight = serde_json::from_value(value).unwrap();
        assert_eq!(legacy.geometry_version, 0);
        assert!(!legacy.synced);
    }
}
