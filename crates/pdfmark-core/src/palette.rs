//! Fixed highlight color palette.

use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Named highlight colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
    Purple,
}

/// A palette entry: display RGB plus the fill opacity used when painting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteEntry {
    pub color: HighlightColor,
    pub name: &'static str,
    pub rgb: (u8, u8, u8),
    pub opacity: f32,
}

/// The palette, in picker order.
pub const PALETTE: [PaletteEntry; 6] = [
    PaletteEntry { color: HighlightColor::Yellow, name: "yellow", rgb: (255, 235, 59), opacity: 0.4 },
    PaletteEntry { color: HighlightColor::Green, name: "green", rgb: (76, 175, 80), opacity: 0.35 },
    PaletteEntry { color: HighlightColor::Blue, name: "blue", rgb: (33, 150, 243), opacity: 0.3 },
    PaletteEntry { color: HighlightColor::Pink, name: "pink", rgb: (233, 30, 99), opacity: 0.3 },
    PaletteEntry { color: HighlightColor::Orange, name: "orange", rgb: (255, 152, 0), opacity: 0.35 },
    PaletteEntry { color: HighlightColor::Purple, name: "purple", rgb: (156, 39, 176), opacity: 0.3 },
];

impl HighlightColor {
    /// All palette colors in picker order.
    pub fn all() -> impl Iterator<Item = HighlightColor> {
        PALETTE.iter().map(|entry| entry.color)
    }

    /// The palette entry for this color.
    pub fn entry(self) -> &'static PaletteEntry {
        // PALETTE is declared in enum order.
        &PALETTE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Fill opacity in `0.0..=1.0`.
    pub fn opacity(self) -> f32 {
        self.entry().opacity
    }

    /// RGB components in `0.0..=1.0`, as PDF color arrays expect them.
    pub fn rgb_unit(self) -> [f32; 3] {
        let (r, g, b) = self.entry().rgb;
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
    }

    /// Opaque display color.
    pub fn to_color(self) -> Color {
        let (r, g, b) = self.entry().rgb;
        Color::from_rgba8(r, g, b, 255)
    }

    /// Display color with the palette fill opacity applied.
    pub fn fill_color(self) -> Color {
        let (r, g, b) = self.entry().rgb;
        let alpha = (self.opacity() * 255.0).round().clamp(0.0, 255.0) as u8;
        Color::from_rgba8(r, g, b, alpha)
    }

    /// Nearest palette color to an arbitrary RGB triple in `0.0..=1.0`.
    ///
    /// Used when recovering colors from PDF annotations written by other tools.
    pub fn nearest(rgb: [f32; 3]) -> HighlightColor {
        let target = rgb.map(|c| c.clamp(0.0, 1.0));
        let mut best = HighlightColor::default();
        let mut best_dist = f32::MAX;
        for color in HighlightColor::all() {
            let candidate = color.rgb_unit();
            let dist: f32 = candidate
                .iter()
                .zip(target.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if dist < best_dist {
                best_dist = dist;
                best = color;
            }
        }
        best
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown highlight color: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for HighlightColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PALETTE
            .iter()
            .find(|entry| entry.name == wanted)
            .map(|entry| entry.color)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}
