use egui::{Pos2, Rect};
use image::RgbaImage;
use std::sync::Arc;

use crate::layer::Layer;
use crate::transform::ViewTransform;

mod brush;
mod channel;

pub use brush::BrushTool;
pub use channel::{MessageChannel, ToolMessage};

/// What a tool may touch during a callback.
pub struct ToolContext<'a> {
    /// Pixels of the selected layer. `None` outside a gesture when nothing is
    /// selected, or when the selected layer is locked.
    pub layer: Option<&'a mut RgbaImage>,
    /// Requests back to the engine
    pub channel: &'a mut MessageChannel,
}

impl ToolContext<'_> {
    pub fn send(&mut self, message: ToolMessage) {
        self.channel.send(message);
    }
}

/// The active tool: receives gesture phases and draws into the selected
/// layer. The engine holds at most one at a time.
pub trait Tool {
    /// Return the name of the tool
    fn name(&self) -> &'static str;

    /// Called once per activation with the canvas bounds and view transform.
    fn initialize(&mut self, _bounds: Rect, _transform: &ViewTransform) {}

    /// Called whenever the selected layer changes, including to none.
    fn on_layer_changed(&mut self, _layer: Option<&Layer>) {}

    /// Called after every cache recompute with a read-only composite of the
    /// whole image, for tools that sample surrounding pixels.
    fn on_reference_layer_created(&mut self, _reference: Arc<RgbaImage>) {}

    /// Gesture start, position in layer space.
    fn on_move_begin(&mut self, pos: Pos2, ctx: &mut ToolContext<'_>);

    /// Gesture movement. Must stay cheap: no full-buffer copies.
    fn on_move(&mut self, pos: Pos2, ctx: &mut ToolContext<'_>);

    /// Gesture end.
    fn on_move_ended(&mut self, pos: Pos2, ctx: &mut ToolContext<'_>);

    /// Draws the tool's live overlay (guides, previews) onto `canvas`, which
    /// is in layer space and already holds everything up to the selected
    /// layer.
    fn draw(&self, _canvas: &mut RgbaImage) {}

    /// Tools that keep their own undo/redo return true; the engine then
    /// skips its own snapshots for them and forwards undo/redo.
    fn does_handle_history(&self) -> bool {
        false
    }

    fn undo(&mut self, _ctx: &mut ToolContext<'_>) {}

    fn redo(&mut self, _ctx: &mut ToolContext<'_>) {}
}
