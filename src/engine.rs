//! The paint view's core: owns the layer stack and keeps the composite
//! cache and the undo history consistent with it.
//!
//! Every user-visible edit follows the same shape: validate, commit a
//! "before" snapshot, mutate the store, commit a coalescible "after"
//! snapshot, recompute the cache. Undo and redo restore snapshots through
//! [`PaintEngine::undo`] and [`PaintEngine::redo`]; gestures come in through
//! [`PaintEngine::begin_gesture`], [`PaintEngine::move_gesture`] and
//! [`PaintEngine::end_gesture`] and are forwarded to the active [`Tool`].
//!
//! # Example
//!
//! ```rust,no_run
//! use paint_layers::{EngineConfig, PaintEngine};
//! use paint_layers::tool::BrushTool;
//! use paint_layers::transform::ViewTransform;
//!
//! let mut engine = PaintEngine::new(EngineConfig::default());
//! engine.add_layer(image::RgbaImage::new(64, 64))?;
//! engine.layout(egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(64.0, 64.0)), ViewTransform::identity());
//! engine.set_tool(Box::new(BrushTool::new(image::Rgba([0, 0, 0, 255]), 2.0)))?;
//!
//! engine.begin_gesture(egui::pos2(4.0, 4.0))?;
//! engine.move_gesture(egui::pos2(30.0, 30.0))?;
//! engine.end_gesture(egui::pos2(30.0, 30.0))?;
//! let frame = engine.draw()?;
//! # let _ = frame;
//! engine.undo()?;
//! # Ok::<(), paint_layers::EngineError>(())
//! ```
use egui::{ColorImage, Pos2, Rect};
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;

use crate::cache::CompositeCache;
use crate::clip::{ClipRegion, ClipTransition, PixelBounds};
use crate::composite::{self, BlendOperator};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::{CommitOrigin, HistoryManager, HistoryStep, Popped, Snapshot};
use crate::layer::{Layer, LayerId, LayerState};
use crate::renderer::Renderer;
use crate::state::GestureState;
use crate::store::LayerStore;
use crate::tool::{MessageChannel, Tool, ToolContext, ToolMessage};
use crate::transform::ViewTransform;

/// Host view geometry, set by [`PaintEngine::layout`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub bounds: Rect,
    pub transform: ViewTransform,
}

/// Layer compositing and edit-history engine behind a paint view.
pub struct PaintEngine {
    config: EngineConfig,
    store: LayerStore,
    cache: CompositeCache,
    history: HistoryManager,
    clip: ClipRegion,
    renderer: Renderer,
    tool: Option<Box<dyn Tool>>,
    channel: MessageChannel,
    viewport: Option<Viewport>,
    gesture: GestureState,
    redraw_requested: bool,
    clip_transition: Option<ClipTransition>,
}

impl std::fmt::Debug for PaintEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaintEngine")
            .field("layers", &self.store.len())
            .field("selected", &self.store.selected_index())
            .field("cache", &self.cache)
            .field("history", &(self.history.undo_len(), self.history.redo_len()))
            .field("clip", &self.clip.rect())
            .field("tool", &self.tool.as_ref().map(|t| t.name()))
            .field("gesture", &self.gesture)
            .finish()
    }
}

impl Default for PaintEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl PaintEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            history: HistoryManager::new(config.maximum_history_size),
            config,
            store: LayerStore::new(),
            cache: CompositeCache::default(),
            clip: ClipRegion::default(),
            renderer: Renderer::new(),
            tool: None,
            channel: MessageChannel::new(),
            viewport: None,
            gesture: GestureState::Idle,
            redraw_requested: false,
            clip_transition: None,
        }
    }

    // ------------------------------------------------------------------
    // Queries

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn layers(&self) -> &[Layer] {
        self.store.layers()
    }

    pub fn layer_count(&self) -> usize {
        self.store.len()
    }

    pub fn layer(&self, index: usize) -> EngineResult<&Layer> {
        self.store.get(index)
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.store.selected_layer()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.store.selected_index()
    }

    pub fn selected_id(&self) -> Option<LayerId> {
        self.store.selected_id()
    }

    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.store.dimensions()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn cache(&self) -> &CompositeCache {
        &self.cache
    }

    /// True while the cache matches the last committed state
    pub fn is_cached(&self) -> bool {
        self.cache.is_valid()
    }

    /// Read-only composite of the whole image as of the last recompute
    pub fn reference(&self) -> Arc<RgbaImage> {
        self.cache.reference()
    }

    pub fn clip(&self) -> &ClipRegion {
        &self.clip
    }

    pub fn clip_rect(&self) -> Rect {
        self.clip.rect()
    }

    pub fn gesture(&self) -> GestureState {
        self.gesture
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn tool(&self) -> Option<&dyn Tool> {
        self.tool.as_deref()
    }

    /// Returns and clears the pending redraw request. Requests made since the
    /// last call are coalesced into one.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    /// Returns the clip animation requested by the last animated clip change
    pub fn take_clip_transition(&mut self) -> Option<ClipTransition> {
        self.clip_transition.take()
    }

    // ------------------------------------------------------------------
    // Setup

    /// Replaces the configuration; a smaller history bound evicts at once.
    pub fn set_config(&mut self, config: EngineConfig) {
        if self.history.set_maximum_size(config.maximum_history_size) > 0 {
            self.prune_archive();
        }
        self.config = config;
        self.request_redraw();
    }

    pub fn set_maximum_history_size(&mut self, maximum_size: usize) {
        self.config.maximum_history_size = maximum_size;
        if self.history.set_maximum_size(maximum_size) > 0 {
            self.prune_archive();
        }
    }

    /// Drops every snapshot on both stacks.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.prune_archive();
    }

    /// Records the host's bounds and view-to-layer transform, and initializes
    /// the active tool with them.
    pub fn layout(&mut self, bounds: Rect, transform: ViewTransform) {
        log::debug!("Layout: bounds={:?}, transform={:?}", bounds, transform);
        self.viewport = Some(Viewport { bounds, transform });
        if let Some(tool) = self.tool.as_deref_mut() {
            tool.initialize(bounds, &transform);
        }
        self.request_redraw();
    }

    /// Activates `tool`, returning the one it replaces.
    pub fn set_tool(&mut self, tool: Box<dyn Tool>) -> EngineResult<Option<Box<dyn Tool>>> {
        self.ensure_idle()?;
        log::info!("Active tool: {}", tool.name());
        let previous = self.tool.replace(tool);
        if let Some(tool) = self.tool.as_deref_mut() {
            if let Some(viewport) = &self.viewport {
                tool.initialize(viewport.bounds, &viewport.transform);
            }
            tool.on_layer_changed(self.store.selected_layer());
            if self.cache.is_valid() {
                tool.on_reference_layer_created(self.cache.reference());
            }
        }
        self.request_redraw();
        Ok(previous)
    }

    /// Deactivates and returns the active tool.
    pub fn take_tool(&mut self) -> EngineResult<Option<Box<dyn Tool>>> {
        self.ensure_idle()?;
        self.request_redraw();
        Ok(self.tool.take())
    }

    // ------------------------------------------------------------------
    // Layer store operations

    /// Adds `buffer` as a new top layer and selects it.
    pub fn add_layer(&mut self, buffer: RgbaImage) -> EngineResult<LayerId> {
        self.ensure_idle()?;
        self.check_layer_size(&buffer)?;
        let previous = self.store.selected_id();

        self.begin_step(previous, false);
        let name = self.store.next_layer_name();
        let id = self.store.push(Layer::from_buffer(&name, buffer))?;
        self.sync_canvas_size()?;
        self.end_step(Some(id), false);

        log::info!("Added {} ({} layers)", name, self.store.len());
        self.finish_edit(previous)?;
        Ok(id)
    }

    /// Adds a transparent layer the size of the canvas, or of the view bounds
    /// when there are no layers yet.
    pub fn add_empty_layer(&mut self) -> EngineResult<LayerId> {
        let (width, height) = match (self.store.dimensions(), &self.viewport) {
            (Some(size), _) => size,
            (None, Some(viewport)) => (
                viewport.bounds.width().round().max(1.0) as u32,
                viewport.bounds.height().round().max(1.0) as u32,
            ),
            (None, None) => return Err(EngineError::NotInitialized),
        };
        self.add_layer(RgbaImage::new(width, height))
    }

    /// Like [`Self::add_layer`], but leaves history untouched.
    pub fn add_layer_without_history(&mut self, buffer: RgbaImage) -> EngineResult<LayerId> {
        self.ensure_idle()?;
        let previous = self.store.selected_id();
        let name = self.store.next_layer_name();
        let id = self.store.push(Layer::from_buffer(&name, buffer))?;
        self.sync_canvas_size()?;
        log::info!("Added {} without history", name);
        self.finish_edit(previous)?;
        Ok(id)
    }

    /// Adds a layer seeded from `image`, placed at the canvas origin. An
    /// empty engine takes its canvas size from the image.
    pub fn import_image(&mut self, image: &DynamicImage) -> EngineResult<LayerId> {
        let pixels = image.to_rgba8();
        let buffer = match self.store.dimensions() {
            Some((width, height)) if pixels.dimensions() != (width, height) => {
                let mut canvas = RgbaImage::new(width, height);
                image::imageops::replace(&mut canvas, &pixels, 0, 0);
                canvas
            }
            _ => pixels,
        };
        self.add_layer(buffer)
    }

    /// Decodes `bytes` with any format the `image` crate knows and imports
    /// the result.
    pub fn import_image_bytes(&mut self, bytes: &[u8]) -> EngineResult<LayerId> {
        let image = image::load_from_memory(bytes)?;
        log::debug!("Decoded image: {}x{}", image.width(), image.height());
        self.import_image(&image)
    }

    pub fn remove_layer_at(&mut self, index: usize) -> EngineResult<()> {
        self.ensure_idle()?;
        let target = self.store.get(index)?.id;
        let previous = self.store.selected_id();

        self.begin_step(Some(target), false);
        self.store.remove_at(index)?;
        self.end_step(Some(target), false);

        log::info!("Removed layer {} ({} left)", index, self.store.len());
        self.finish_edit(previous)
    }

    /// Removes every layer in `indices` as one undo step.
    pub fn remove_layers(&mut self, indices: &[usize]) -> EngineResult<()> {
        if indices.is_empty() {
            return Ok(());
        }
        self.ensure_idle()?;
        let sorted = self.store.validate_indices(indices)?;
        let target = self.store.layers()[sorted[0]].id;
        let previous = self.store.selected_id();

        self.begin_step(Some(target), false);
        self.store.remove_many(&sorted)?;
        self.end_step(Some(target), false);

        log::info!("Removed layers {:?} ({} left)", sorted, self.store.len());
        self.finish_edit(previous)
    }

    /// Composites the layers at `indices` onto the lowest of them and removes
    /// the rest. Undoes as a single step.
    pub fn merge_layers(&mut self, indices: &[usize]) -> EngineResult<LayerId> {
        self.ensure_idle()?;
        if indices.len() < 2 {
            return Err(EngineError::NotEnoughLayers(indices.len()));
        }
        let sorted = self.store.validate_indices(indices)?;
        let target = &self.store.layers()[sorted[0]];
        if target.locked {
            return Err(EngineError::LayerLocked(target.id));
        }
        let target = target.id;
        self.store.uniform_dimensions()?;
        let previous = self.store.selected_id();

        self.begin_step(Some(target), true);
        let merged = self.store.merge(&sorted)?;
        self.end_step(Some(merged), true);

        log::info!("Merged layers {:?}", sorted);
        self.finish_edit(previous)?;
        Ok(merged)
    }

    /// Moves the layer at `from` so it ends up at `to`. Selection follows the
    /// layer, not the index.
    pub fn move_layer(&mut self, from: usize, to: usize) -> EngineResult<()> {
        self.ensure_idle()?;
        let target = self.store.get(from)?.id;
        self.store.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let previous = self.store.selected_id();

        self.begin_step(Some(target), false);
        self.store.move_layer(from, to)?;
        self.end_step(Some(target), false);

        log::debug!("Moved layer {} to {}", from, to);
        self.finish_edit(previous)
    }

    /// Moves the selected layer one step towards the top. Returns false when
    /// it is already there or nothing is selected.
    pub fn move_selected_up(&mut self) -> EngineResult<bool> {
        match self.store.selected_index() {
            Some(index) if index + 1 < self.store.len() => {
                self.move_layer(index, index + 1)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Moves the selected layer one step towards the bottom.
    pub fn move_selected_down(&mut self) -> EngineResult<bool> {
        match self.store.selected_index() {
            Some(index) if index > 0 => {
                self.move_layer(index, index - 1)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn select_layer(&mut self, index: usize) -> EngineResult<()> {
        self.ensure_idle()?;
        let previous = self.store.selected_id();
        self.store.select(index)?;
        if self.store.selected_id() != previous {
            self.finish_edit(previous)?;
        }
        Ok(())
    }

    pub fn select_layer_by_id(&mut self, id: LayerId) -> EngineResult<()> {
        self.ensure_idle()?;
        let previous = self.store.selected_id();
        self.store.select_id(id)?;
        if self.store.selected_id() != previous {
            self.finish_edit(previous)?;
        }
        Ok(())
    }

    pub fn set_opacity(&mut self, index: usize, opacity: f32) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(EngineError::InvalidOpacity(opacity));
        }
        self.edit_attributes(index, |layer| {
            let changed = layer.opacity != opacity;
            layer.opacity = opacity;
            changed
        })
    }

    pub fn set_blend_operator(&mut self, index: usize, blend: BlendOperator) -> EngineResult<()> {
        self.edit_attributes(index, |layer| {
            let changed = layer.blend != blend;
            layer.blend = blend;
            changed
        })
    }

    pub fn set_locked(&mut self, index: usize, locked: bool) -> EngineResult<()> {
        self.edit_attributes(index, |layer| {
            let changed = layer.locked != locked;
            layer.locked = locked;
            changed
        })
    }

    pub fn rename_layer(&mut self, index: usize, name: &str) -> EngineResult<()> {
        self.edit_attributes(index, |layer| {
            let changed = layer.name != name;
            layer.name = name.to_string();
            changed
        })
    }

    /// Shared path for attribute edits: a layer-order-only step, skipped
    /// entirely when `edit` reports no change.
    fn edit_attributes<F>(&mut self, index: usize, edit: F) -> EngineResult<()>
    where
        F: FnOnce(&mut LayerState) -> bool,
    {
        self.ensure_idle()?;
        let mut state = self.store.get(index)?.state();
        if !edit(&mut state) {
            return Ok(());
        }
        let target = state.id;
        let previous = self.store.selected_id();

        self.begin_step(Some(target), false);
        self.store.get_mut(index)?.apply_state(&state);
        self.end_step(Some(target), false);

        log::debug!("Layer {} attributes now {:?}", index, state);
        self.finish_edit(previous)
    }

    // ------------------------------------------------------------------
    // Clip region

    /// Sets the clip, clamped to the canvas. Undoes as a single step.
    pub fn set_clip_rect(&mut self, rect: Rect, animate: bool) -> EngineResult<()> {
        self.ensure_idle()?;
        if self.store.is_empty() {
            return Err(EngineError::NotInitialized);
        }
        let resolved = self.clip.resolve(rect)?;
        let from = self.clip.rect();
        if resolved == from {
            return Ok(());
        }
        let target = self.store.selected_id();
        let previous = target;

        self.begin_step(target, false);
        self.clip.set_rect(resolved);
        self.end_step(target, false);

        if animate {
            self.clip_transition = Some(ClipTransition { from, to: resolved });
        }
        log::debug!("Clip {:?} -> {:?}", from, resolved);
        self.finish_edit(previous)
    }

    /// Returns the clip to the full canvas.
    pub fn reset_clip(&mut self, animate: bool) -> EngineResult<()> {
        let identity = self.clip.identity_rect();
        self.set_clip_rect(identity, animate)
    }

    // ------------------------------------------------------------------
    // Gestures

    /// Starts a gesture on the selected layer. With nothing selected, or no
    /// tool, the whole gesture is ignored.
    pub fn begin_gesture(&mut self, pos: Pos2) -> EngineResult<()> {
        if self.viewport.is_none() {
            return Err(EngineError::NotInitialized);
        }
        self.ensure_idle()?;
        let Some(layer) = self.store.selected_layer() else {
            log::debug!("Gesture ignored: no selected layer");
            return Ok(());
        };
        if layer.locked {
            log::warn!("Gesture rejected: layer {} is locked", layer.name);
            return Err(EngineError::LayerLocked(layer.id));
        }
        let id = layer.id;
        if self.tool.is_none() {
            log::debug!("Gesture ignored: no active tool");
            return Ok(());
        }

        self.commit(CommitOrigin::Tool, Some(id), true, false);
        // Non-normal operators may blend in ways the live path cannot show.
        self.cache.invalidate();
        self.gesture = GestureState::Active { layer: id, moves: 0 };
        self.run_tool(|tool, ctx| tool.on_move_begin(pos, ctx))
    }

    pub fn move_gesture(&mut self, pos: Pos2) -> EngineResult<()> {
        if !self.gesture.is_active() {
            return Ok(());
        }
        self.gesture.record_move();
        self.run_tool(|tool, ctx| tool.on_move(pos, ctx))
    }

    pub fn end_gesture(&mut self, pos: Pos2) -> EngineResult<()> {
        let Some(id) = self.gesture.layer() else {
            return Ok(());
        };
        let result = self.run_tool(|tool, ctx| tool.on_move_ended(pos, ctx));
        self.gesture = GestureState::Idle;
        // The step is closed even if the tool's requests failed.
        self.commit(CommitOrigin::Tool, Some(id), true, true);
        result?;

        self.cache_layers()?;
        self.request_redraw();
        Ok(())
    }

    /// Runs `action` against the active tool outside a gesture, then performs
    /// whatever the tool asked for.
    pub fn with_tool<F>(&mut self, action: F) -> EngineResult<()>
    where
        F: FnOnce(&mut dyn Tool, &mut ToolContext<'_>),
    {
        self.run_tool(action)
    }

    fn run_tool<F>(&mut self, action: F) -> EngineResult<()>
    where
        F: FnOnce(&mut dyn Tool, &mut ToolContext<'_>),
    {
        let Some(tool) = self.tool.as_deref_mut() else {
            return Ok(());
        };
        let layer = self
            .store
            .selected_layer_mut()
            .filter(|layer| !layer.locked)
            .map(|layer| &mut layer.buffer);
        let mut ctx = ToolContext {
            layer,
            channel: &mut self.channel,
        };
        action(tool, &mut ctx);
        self.dispatch_messages()
    }

    fn dispatch_messages(&mut self) -> EngineResult<()> {
        for message in self.channel.drain() {
            match message {
                ToolMessage::Invalidate => self.request_redraw(),
                ToolMessage::SaveHistory => {
                    let target = self.store.selected_id();
                    self.commit(CommitOrigin::Tool, target, true, false);
                }
                ToolMessage::CacheLayers => self.cache_layers()?,
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // History

    pub fn undo(&mut self) -> EngineResult<()> {
        self.ensure_idle()?;
        if self.tool_handles_history() {
            log::debug!("Undo delegated to the active tool");
            self.run_tool(|tool, ctx| tool.undo(ctx))?;
            self.cache_layers()?;
            self.request_redraw();
            return Ok(());
        }

        let Some(popped) = self.history.pop_undo() else {
            log::debug!("Nothing to undo");
            return Ok(());
        };
        let previous_index = self.store.selected_index();
        match popped {
            Popped::Step(step) => {
                if let Err(err) = self.restore(&step.before, previous_index) {
                    self.history.push_undo_step(step);
                    return Err(err);
                }
                self.history.push_redo(step);
            }
            Popped::Lone(before) => {
                // Nothing recorded the state this undo leaves; capture it so
                // the step can be redone.
                let after = self.capture(before.target(), !before.is_layer_order_only(), true);
                if let Err(err) = self.restore(&before, previous_index) {
                    self.history.push_undo_lone(before);
                    return Err(err);
                }
                self.history.push_redo(HistoryStep { before, after });
            }
        }
        self.after_restore()
    }

    pub fn redo(&mut self) -> EngineResult<()> {
        self.ensure_idle()?;
        if self.tool_handles_history() {
            log::debug!("Redo delegated to the active tool");
            self.run_tool(|tool, ctx| tool.redo(ctx))?;
            self.cache_layers()?;
            self.request_redraw();
            return Ok(());
        }

        let Some(popped) = self.history.pop_redo() else {
            log::debug!("Nothing to redo");
            return Ok(());
        };
        let previous_index = self.store.selected_index();
        match popped {
            Popped::Step(step) => {
                if let Err(err) = self.restore(&step.after, previous_index) {
                    self.history.push_redo(step);
                    return Err(err);
                }
                self.history.push_undo_step(step);
            }
            Popped::Lone(snapshot) => {
                if let Err(err) = self.restore(&snapshot, previous_index) {
                    self.history.push_redo_lone(snapshot);
                    return Err(err);
                }
                self.history.push_undo_lone(snapshot);
            }
        }
        self.after_restore()
    }

    fn tool_handles_history(&self) -> bool {
        self.tool.as_ref().is_some_and(|tool| tool.does_handle_history())
    }

    fn capture(&self, target: Option<LayerId>, clone_buffer: bool, coalescible: bool) -> Snapshot {
        Snapshot::capture(&self.store, target, clone_buffer, coalescible, self.clip.rect())
    }

    /// Pushes a snapshot unless the active tool keeps its own history and
    /// this commit came from it.
    fn commit(
        &mut self,
        origin: CommitOrigin,
        target: Option<LayerId>,
        clone_buffer: bool,
        coalescible: bool,
    ) -> bool {
        if origin == CommitOrigin::Tool && self.tool_handles_history() && self.history.can_undo() {
            log::debug!("Commit suppressed: the active tool keeps its own history");
            return false;
        }
        let snapshot = self.capture(target, clone_buffer, coalescible);
        log::debug!("Commit {:?}", snapshot);
        if self.history.push(snapshot) > 0 {
            self.prune_archive();
        }
        true
    }

    fn begin_step(&mut self, target: Option<LayerId>, clone_buffer: bool) {
        self.commit(CommitOrigin::Engine, target, clone_buffer, false);
    }

    fn end_step(&mut self, target: Option<LayerId>, clone_buffer: bool) {
        self.commit(CommitOrigin::Engine, target, clone_buffer, true);
    }

    /// Puts the store, pixels, clip and selection back to `snapshot`.
    fn restore(&mut self, snapshot: &Snapshot, previous_index: Option<usize>) -> EngineResult<()> {
        self.store.restore_order(snapshot.layers())?;
        if let (Some(target), Some(pixels)) = (snapshot.target(), snapshot.pixels()) {
            match self.store.find_mut(target) {
                Some(layer) => layer.buffer = pixels.clone(),
                None => log::warn!("Snapshot target {} is not in the restored stack", target),
            }
        }
        if snapshot.clip() != self.clip.rect() {
            self.clip.set_rect(snapshot.clip());
        }
        self.store.restore_selection(snapshot.selected(), previous_index);
        log::debug!("Restored {:?}", snapshot.id());
        Ok(())
    }

    fn after_restore(&mut self) -> EngineResult<()> {
        self.prune_archive();
        self.cache_layers()?;
        self.notify_layer_changed();
        self.request_redraw();
        Ok(())
    }

    fn prune_archive(&mut self) {
        let referenced = self.history.referenced_layers();
        let pruned = self.store.prune_archive(&referenced);
        if pruned > 0 {
            log::debug!("Released {} archived layer(s)", pruned);
        }
    }

    // ------------------------------------------------------------------
    // Cache and drawing

    /// Invalidates and rebuilds the composite cache, then hands the tool the
    /// new reference. A no-op without a selected layer.
    pub fn cache_layers(&mut self) -> EngineResult<()> {
        self.cache.invalidate();
        if self.store.is_empty() {
            return Ok(());
        }
        self.sync_canvas_size()?;
        let area = self.clip_area();
        let reference = self.cache.recompute(&self.store, area, self.tool.as_deref())?;
        if let (Some(reference), Some(tool)) = (reference, self.tool.as_deref_mut()) {
            tool.on_reference_layer_created(reference);
        }
        Ok(())
    }

    /// Renders the current frame.
    pub fn draw(&mut self) -> EngineResult<&RgbaImage> {
        if !self.cache.is_valid() {
            self.cache_layers()?;
        }
        self.redraw_requested = false;
        let area = self.clip_area();
        self.renderer
            .render(&self.store, &self.cache, area, self.tool.as_deref(), &self.config)
    }

    /// Renders the current frame as an egui image.
    pub fn draw_color_image(&mut self) -> EngineResult<ColorImage> {
        let frame = self.draw()?;
        Ok(Renderer::to_color_image(frame))
    }

    /// From-scratch composite of every layer inside the clip, without the
    /// tool overlay or checkerboard.
    pub fn flatten(&self) -> EngineResult<RgbaImage> {
        let (width, height) = self.store.dimensions().unwrap_or((0, 0));
        composite::flatten(self.store.layers(), width, height, self.clip_area())
    }

    // ------------------------------------------------------------------
    // Helpers

    fn ensure_idle(&self) -> EngineResult<()> {
        if self.gesture.is_active() {
            return Err(EngineError::GestureInProgress);
        }
        Ok(())
    }

    fn check_layer_size(&self, buffer: &RgbaImage) -> EngineResult<()> {
        match self.store.dimensions() {
            Some(expected) if expected != buffer.dimensions() => Err(EngineError::DimensionMismatch {
                expected,
                actual: buffer.dimensions(),
            }),
            _ => Ok(()),
        }
    }

    /// Re-lays out the derived buffers when the layers' size no longer
    /// matches them, or when the clip is still the empty one of a canvas
    /// with no layers. Layers that disagree with each other are an error.
    fn sync_canvas_size(&mut self) -> EngineResult<()> {
        let Some((width, height)) = self.store.uniform_dimensions()? else {
            return Ok(());
        };
        let identity = ClipRegion::identity(width, height).identity_rect();
        if self.cache.dimensions() != (width, height)
            || self.clip.identity_rect() != identity
            || !self.clip.rect().is_positive()
        {
            log::info!("Re-layout canvas to {}x{}", width, height);
            self.cache.resize(width, height);
            self.renderer.resize(width, height);
            self.clip.relayout(width, height);
        }
        Ok(())
    }

    fn clip_area(&self) -> PixelBounds {
        let (width, height) = self.store.dimensions().unwrap_or((0, 0));
        self.clip.pixel_bounds(width, height)
    }

    fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    fn notify_layer_changed(&mut self) {
        if let Some(tool) = self.tool.as_deref_mut() {
            tool.on_layer_changed(self.store.selected_layer());
        }
    }

    /// Common tail of every edit: rebuild the cache, tell the tool about a
    /// new selection, ask for a redraw.
    fn finish_edit(&mut self, previous_selection: Option<LayerId>) -> EngineResult<()> {
        self.cache_layers()?;
        if self.store.selected_id() != previous_selection {
            self.notify_layer_changed();
        }
        self.request_redraw();
        Ok(())
    }
}
