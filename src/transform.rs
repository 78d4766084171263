use egui::Vec2;
use serde::{Deserialize, Serialize};

/// View-to-layer transform handed to tools when they are initialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ViewTransform {
    /// Offset of the canvas in the view
    pub position: Vec2,
    /// Scale factor (1.0 = one view pixel per layer pixel)
    pub scale: Vec2,
    /// Rotation in radians
    pub rotation: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            scale: Vec2::new(1.0, 1.0),
            rotation: 0.0,
        }
    }
}

impl ViewTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Mean of the two scale axes. Mirrored axes count by magnitude.
    pub fn uniform_scale(&self) -> f32 {
        (self.scale.x.abs() + self.scale.y.abs()) * 0.5
    }
}
