use egui::{Pos2, Rect, pos2};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Integer pixel area, half-open on the max side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    /// The whole `width` x `height` buffer
    pub fn full(width: u32, height: u32) -> Self {
        Self { x0: 0, y0: 0, x1: width, y1: height }
    }

    /// Pixels touched by `rect`, clamped to a `width` x `height` buffer.
    pub fn from_rect(rect: Rect, width: u32, height: u32) -> Self {
        if !rect.is_positive() {
            return Self::default();
        }
        let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min(max as f32) as u32 };
        let x0 = clamp(rect.min.x.floor(), width);
        let y0 = clamp(rect.min.y.floor(), height);
        let x1 = clamp(rect.max.x.ceil(), width).max(x0);
        let y1 = clamp(rect.max.y.ceil(), height).max(y0);
        Self { x0, y0, x1, y1 }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// A pending clip animation for the host to play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipTransition {
    pub from: Rect,
    pub to: Rect,
}

/// The rectangle bounding the composited area of the layer stack.
///
/// The identity clip is the full layer bounds, fixed when the canvas is laid
/// out; `rect` is always contained in it once the canvas has a size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRegion {
    rect: Rect,
    identity: Rect,
}

impl Default for ClipRegion {
    fn default() -> Self {
        Self {
            rect: Rect::NOTHING,
            identity: Rect::NOTHING,
        }
    }
}

impl ClipRegion {
    /// Identity clip for a `width` x `height` canvas
    pub fn identity(width: u32, height: u32) -> Self {
        let full = Rect::from_min_max(Pos2::ZERO, pos2(width as f32, height as f32));
        Self { rect: full, identity: full }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn identity_rect(&self) -> Rect {
        self.identity
    }

    pub fn is_identity(&self) -> bool {
        self.rect == self.identity
    }

    /// Clamp `requested` into the canvas.
    pub fn resolve(&self, requested: Rect) -> EngineResult<Rect> {
        let clipped = requested.intersect(self.identity);
        if !clipped.is_positive() || !clipped.is_finite() {
            return Err(EngineError::InvalidClip(requested));
        }
        Ok(clipped)
    }

    /// Overwrite the clip without validation. Used when restoring history,
    /// where the rect was validated when it was first set.
    pub(crate) fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    /// Adopt new canvas dimensions. A clip that no longer fits is reset to
    /// the new identity.
    pub fn relayout(&mut self, width: u32, height: u32) {
        let fresh = Self::identity(width, height);
        let keep = self.rect.is_positive() && fresh.identity.contains_rect(self.rect);
        self.identity = fresh.identity;
        if !keep {
            self.rect = fresh.identity;
        }
    }

    /// The clip as a pixel area of a `width` x `height` buffer
    pub fn pixel_bounds(&self, width: u32, height: u32) -> PixelBounds {
        PixelBounds::from_rect(self.rect, width, height)
    }
}
