//! Per-page interaction layer: drawing, text capture, hit-testing and deletion.

mod surface;

pub use surface::{PageSurface, ResizeObserver, StaticSurface};

use crate::highlight::{Highlight, HighlightId, OwnerKey};
use crate::palette::HighlightColor;
use crate::repository::{HighlightRepository, RepositoryResult};
use crate::storage::HighlightStore;
use crate::transform::{LEGACY_SIZE_RATIO, effective_base_size_with_ratio, point_to_base, to_base, to_canvas};
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum width and height of an area highlight, in canvas pixels.
pub const MIN_AREA_SIZE: f64 = 10.0;

/// Overlay tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Smallest drag, per axis, that still creates an area highlight.
    pub min_area_size: f64,
    /// Threshold for treating a declared base size as unreliable.
    pub legacy_ratio: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            min_area_size: MIN_AREA_SIZE,
            legacy_ratio: LEGACY_SIZE_RATIO,
        }
    }
}

/// What pointer gestures do on this page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OverlayMode {
    /// Drag a rectangle.
    #[default]
    Area,
    /// Capture the host's text selection.
    Text,
}

/// State of an area drag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DrawState {
    #[default]
    Idle,
    /// Drag in progress, canvas coordinates.
    Drawing { start: Point, current: Point },
}

/// Text selection reported by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextSelection {
    pub text: String,
    /// One rectangle per line fragment, client coordinates.
    pub client_rects: Vec<Rect>,
}

/// What an Escape press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeOutcome {
    CancelledDrawing,
    /// The host should clear its text selection.
    ClearedTextSelection,
    ClearedSelection,
    Nothing,
}

/// A highlight rectangle ready to paint, canvas coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRect {
    pub id: HighlightId,
    pub color: HighlightColor,
    pub rect: Rect,
}

/// Interaction layer for one page.
///
/// Owns the page's working set of highlights and the in-progress drag.
/// Every mutation goes through the shared repository; call [`refresh`](Self::refresh)
/// to pick up changes made elsewhere.
pub struct PageOverlay<S: HighlightStore, P: PageSurface> {
    repository: Arc<HighlightRepository<S>>,
    surface: P,
    owner: OwnerKey,
    page: u32,
    config: OverlayConfig,
    mode: OverlayMode,
    color: HighlightColor,
    state: DrawState,
    selected: Option<HighlightId>,
    text_selection_active: bool,
    highlights: Vec<Highlight>,
}

impl<S: HighlightStore, P: PageSurface> PageOverlay<S, P> {
    pub fn new(repository: Arc<HighlightRepository<S>>, surface: P, owner: OwnerKey, page: u32) -> Self {
        Self {
            repository,
            surface,
            owner,
            page,
            config: OverlayConfig::default(),
            mode: OverlayMode::default(),
            color: HighlightColor::default(),
            state: DrawState::default(),
            selected: None,
            text_selection_active: false,
            highlights: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: OverlayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    /// Switch mode, abandoning any drag in progress.
    pub fn set_mode(&mut self, mode: OverlayMode) {
        if self.mode != mode {
            self.state = DrawState::Idle;
            self.mode = mode;
        }
    }

    pub fn color(&self) -> HighlightColor {
        self.color
    }

    pub fn set_color(&mut self, color: HighlightColor) {
        self.color = color;
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    pub fn surface(&self) -> &P {
        &self.surface
    }

    /// Mutable access for hosts that update surface dimensions in place.
    /// Follow up with [`ResizeObserver::surface_resized`].
    pub fn surface_mut(&mut self) -> &mut P {
        &mut self.surface
    }

    /// Current working set, oldest first.
    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    /// Reload this page's highlights from the repository.
    pub async fn refresh(&mut self) -> RepositoryResult<()> {
        self.highlights = self.repository.list_by_page(&self.owner, self.page).await?;
        let still_present = self
            .selected
            .as_ref()
            .is_some_and(|id| self.highlights.iter().any(|h| &h.id == id));
        if !still_present {
            self.selected = None;
        }
        Ok(())
    }

    pub fn pointer_down(&mut self, point: Point) {
        if self.mode != OverlayMode::Area {
            return;
        }
        self.selected = None;
        self.state = DrawState::Drawing { start: point, current: point };
    }

    pub fn pointer_move(&mut self, point: Point) {
        if let DrawState::Drawing { current, .. } = &mut self.state {
            *current = point;
        }
    }

    /// Rectangle being dragged, canvas coordinates.
    pub fn pending_rect(&self) -> Option<Rect> {
        match self.state {
            DrawState::Drawing { start, current } => Some(Rect::from_points(start, current)),
            DrawState::Idle => None,
        }
    }

    /// Finish a drag. Stores an area highlight when the drag is large enough.
    pub async fn pointer_up(&mut self, point: Point) -> RepositoryResult<Option<Highlight>> {
        let DrawState::Drawing { start, .. } = std::mem::take(&mut self.state) else {
            return Ok(None);
        };

        let canvas_size = self.surface.canvas_size();
        let canvas_bounds = Rect::from_origin_size(Point::ZERO, canvas_size);
        let rect = Rect::from_points(start, point).intersect(canvas_bounds);
        if rect.width() < self.config.min_area_size || rect.height() < self.config.min_area_size {
            log::debug!("ignoring {:.0}x{:.0} drag on page {}", rect.width(), rect.height(), self.page);
            return Ok(None);
        }

        let base_size = self.surface.base_size();
        let highlight = Highlight::area(
            self.owner.clone(),
            self.page,
            to_base(rect, base_size, canvas_size),
            base_size,
            self.color,
        );
        self.store(highlight).await
    }

    /// Turn the host's text selection into a text highlight.
    ///
    /// Only fragments overlapping this page are kept, clipped to it.
    pub async fn text_selected(&mut self, selection: &TextSelection) -> RepositoryResult<Option<Highlight>> {
        if self.mode != OverlayMode::Text {
            return Ok(None);
        }
        let text = selection.text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        self.text_selection_active = true;

        let bounds = self.surface.client_bounds();
        let canvas_size = self.surface.canvas_size();
        let base_size = self.surface.base_size();
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Ok(None);
        }
        let sx = canvas_size.width / bounds.width();
        let sy = canvas_size.height / bounds.height();

        let rects: Vec<Rect> = selection
            .client_rects
            .iter()
            .map(|r| r.abs().intersect(bounds))
            .filter(|r| r.width() > 0.0 && r.height() > 0.0)
            .map(|r| {
                let local = Rect::new(
                    (r.x0 - bounds.x0) * sx,
                    (r.y0 - bounds.y0) * sy,
                    (r.x1 - bounds.x0) * sx,
                    (r.y1 - bounds.y0) * sy,
                );
                to_base(local, base_size, canvas_size)
            })
            .collect();
        if rects.is_empty() {
            return Ok(None);
        }

        let highlight = Highlight::text(self.owner.clone(), self.page, rects, base_size, self.color, text);
        self.store(highlight).await
    }

    /// Host reports whether a text selection exists.
    pub fn selection_changed(&mut self, active: bool) {
        self.text_selection_active = active;
    }

    pub fn text_selection_active(&self) -> bool {
        self.text_selection_active
    }

    async fn store(&mut self, highlight: Highlight) -> RepositoryResult<Option<Highlight>> {
        let stored = self.repository.add(highlight).await?;
        if let Some(h) = &stored {
            self.highlights.push(h.clone());
        }
        Ok(stored)
    }

    /// Size the stored geometry of `highlight` should be scaled from.
    fn source_size(&self, highlight: &Highlight) -> Size {
        effective_base_size_with_ratio(
            highlight.rects(),
            highlight.base_size,
            self.surface.canvas_size(),
            self.config.legacy_ratio,
        )
    }

    /// Topmost highlight under a canvas point.
    pub fn hit_test(&self, point: Point) -> Option<&Highlight> {
        let canvas_size = self.surface.canvas_size();
        self.highlights.iter().rev().find(|h| {
            let local = point_to_base(point, self.source_size(h), canvas_size);
            h.rects().iter().any(|r| r.contains(local))
        })
    }

    /// Target the highlight under a secondary click. Returns its id.
    pub fn context_click(&mut self, point: Point) -> Option<HighlightId> {
        self.selected = self.hit_test(point).map(|h| h.id.clone());
        self.selected.clone()
    }

    pub fn selected(&self) -> Option<&Highlight> {
        let id = self.selected.as_ref()?;
        self.highlights.iter().find(|h| &h.id == id)
    }

    /// Remove the targeted highlight from the repository.
    pub async fn delete_selected(&mut self) -> RepositoryResult<Option<Highlight>> {
        let Some(id) = self.selected.take() else {
            return Ok(None);
        };
        self.repository.remove(&id).await?;
        let index = self.highlights.iter().position(|h| h.id == id);
        Ok(index.map(|i| self.highlights.remove(i)))
    }

    /// Cancel the most immediate transient state. Committed highlights are untouched.
    pub fn escape(&mut self) -> EscapeOutcome {
        if matches!(self.state, DrawState::Drawing { .. }) {
            self.state = DrawState::Idle;
            EscapeOutcome::CancelledDrawing
        } else if self.text_selection_active {
            self.text_selection_active = false;
            EscapeOutcome::ClearedTextSelection
        } else if self.selected.take().is_some() {
            EscapeOutcome::ClearedSelection
        } else {
            EscapeOutcome::Nothing
        }
    }

    /// Every highlight rectangle in canvas coordinates, bottom to top.
    pub fn render_rects(&self) -> Vec<OverlayRect> {
        let canvas_size = self.surface.canvas_size();
        self.highlights
            .iter()
            .flat_map(|h| {
                let source = self.source_size(h);
                h.rects().iter().map(move |r| OverlayRect {
                    id: h.id.clone(),
                    color: h.color,
                    rect: to_canvas(*r, source, canvas_size),
                })
            })
            .collect()
    }
}

impl<S: HighlightStore, P: PageSurface> ResizeObserver for PageOverlay<S, P> {
    /// Geometry captured against the old size is meaningless now.
    fn surface_resized(&mut self) {
        if matches!(self.state, DrawState::Drawing { .. }) {
            log::debug!("surface resized mid-drag on page {}, cancelling", self.page);
        }
        self.state = DrawState::Idle;
        self.selected = None;
    }
}
