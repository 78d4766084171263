use egui::{Pos2, Rect};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

use super::{Tool, ToolContext, ToolMessage};
use crate::composite::{BlendOperator, blend_pixel};
use crate::transform::ViewTransform;

/// Round brush that paints straight into the selected layer.
pub struct BrushTool {
    color: Rgba<u8>,
    /// Radius in view pixels
    radius: f32,
    /// View pixels per layer pixel
    view_scale: f32,
    // Transient state: the stroke being drawn (if any)
    current_stroke: Option<Vec<Pos2>>,
    reference: Option<Arc<RgbaImage>>,
}

impl BrushTool {
    pub fn new(color: Rgba<u8>, radius: f32) -> Self {
        Self {
            color,
            radius,
            view_scale: 1.0,
            current_stroke: None,
            reference: None,
        }
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.color = color;
    }

    /// Radius in layer pixels
    pub fn layer_radius(&self) -> f32 {
        (self.radius / self.view_scale).max(0.5)
    }

    /// Points of the stroke in progress
    pub fn stroke_points(&self) -> &[Pos2] {
        self.current_stroke.as_deref().unwrap_or(&[])
    }

    /// Colour of the composited image at `pos`, from the last reference the
    /// engine handed over.
    pub fn sample(&self, pos: Pos2) -> Option<Rgba<u8>> {
        let reference = self.reference.as_ref()?;
        if pos.x < 0.0 || pos.y < 0.0 {
            return None;
        }
        let (x, y) = (pos.x as u32, pos.y as u32);
        if x >= reference.width() || y >= reference.height() {
            return None;
        }
        Some(*reference.get_pixel(x, y))
    }

    fn stamp(&self, buffer: &mut RgbaImage, center: Pos2) {
        let r = self.layer_radius();
        let bounds = Rect::from_center_size(center, egui::vec2(2.0 * r, 2.0 * r));
        let area = crate::clip::PixelBounds::from_rect(bounds, buffer.width(), buffer.height());
        for y in area.y0..area.y1 {
            for x in area.x0..area.x1 {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                if dx * dx + dy * dy <= r * r {
                    let pixel = buffer.get_pixel_mut(x, y);
                    *pixel = blend_pixel(*pixel, self.color, 1.0, BlendOperator::Normal);
                }
            }
        }
    }

    /// Stamps from `from` to `to`, spacing dabs half a radius apart.
    fn stamp_segment(&self, buffer: &mut RgbaImage, from: Pos2, to: Pos2) {
        let spacing = (self.layer_radius() * 0.5).max(0.5);
        let steps = ((to - from).length() / spacing).ceil().max(1.0) as usize;
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            self.stamp(buffer, from.lerp(to, t));
        }
    }
}

impl Tool for BrushTool {
    fn name(&self) -> &'static str {
        "Brush"
    }

    fn initialize(&mut self, _bounds: Rect, transform: &ViewTransform) {
        self.view_scale = transform.uniform_scale().max(f32::EPSILON);
        self.current_stroke = None;
    }

    fn on_reference_layer_created(&mut self, reference: Arc<RgbaImage>) {
        self.reference = Some(reference);
    }

    fn on_move_begin(&mut self, pos: Pos2, ctx: &mut ToolContext<'_>) {
        if let Some(buffer) = ctx.layer.as_deref_mut() {
            self.stamp(buffer, pos);
        }
        self.current_stroke = Some(vec![pos]);
        ctx.send(ToolMessage::Invalidate);
    }

    fn on_move(&mut self, pos: Pos2, ctx: &mut ToolContext<'_>) {
        let Some(last) = self.current_stroke.as_ref().and_then(|s| s.last().copied()) else {
            return;
        };
        if let Some(buffer) = ctx.layer.as_deref_mut() {
            self.stamp_segment(buffer, last, pos);
        }
        if let Some(stroke) = &mut self.current_stroke {
            stroke.push(pos);
        }
        ctx.send(ToolMessage::Invalidate);
    }

    fn on_move_ended(&mut self, pos: Pos2, ctx: &mut ToolContext<'_>) {
        let Some(stroke) = self.current_stroke.take() else {
            return;
        };
        if let (Some(buffer), Some(last)) = (ctx.layer.as_deref_mut(), stroke.last().copied()) {
            if last != pos {
                self.stamp_segment(buffer, last, pos);
            }
        }
        ctx.send(ToolMessage::Invalidate);
    }
}
