//! The rendered page an overlay draws over.

use kurbo::{Rect, Size};

/// A rendered page as seen by its overlay.
pub trait PageSurface {
    /// Natural page size in logical pixels (scale 1, no device pixel ratio).
    fn base_size(&self) -> Size;

    /// Physical size of the drawing surface.
    fn canvas_size(&self) -> Size;

    /// Page bounds in client (viewport) coordinates, as reported by the host.
    fn client_bounds(&self) -> Rect;
}

/// Receives surface size changes (zoom, window resize, DPR change).
pub trait ResizeObserver {
    fn surface_resized(&mut self);
}

/// A surface with fixed, host-provided dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSurface {
    pub base_size: Size,
    pub canvas_size: Size,
    pub client_bounds: Rect,
}

impl StaticSurface {
    /// Surface at `scale` with the page's top-left corner at the client origin.
    pub fn new(base_size: Size, scale: f64) -> Self {
        let canvas_size = Size::new(base_size.width * scale, base_size.height * scale);
        Self {
            base_size,
            canvas_size,
            client_bounds: Rect::from_origin_size((0.0, 0.0), canvas_size),
        }
    }

    pub fn with_client_bounds(mut self, client_bounds: Rect) -> Self {
        self.client_bounds = client_bounds;
        self
    }
}

impl PageSurface for StaticSurface {
    fn base_size(&self) -> Size {
        self.base_size
    }

    fn canvas_size(&self) -> Size {
        self.canvas_size
    }

    fn client_bounds(&self) -> Rect {
        self.client_bounds
    }
}
