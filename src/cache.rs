use image::RgbaImage;
use std::sync::Arc;

use crate::clip::PixelBounds;
use crate::composite::{clear, composite_layer, copy_area};
use crate::error::EngineResult;
use crate::store::LayerStore;
use crate::tool::Tool;

/// Derived buffers that keep per-frame redraw cheap during a gesture.
///
/// `below` holds every layer under the selected one and `above` every layer
/// over it, so a frame only composites the selected layer live. `reference`
/// is the full image, tool overlay included, for tools to sample. None of it
/// is history; it can always be rebuilt from the store and the clip.
pub struct CompositeCache {
    below: RgbaImage,
    above: RgbaImage,
    reference: Arc<RgbaImage>,
    all_layers_cached: bool,
}

impl std::fmt::Debug for CompositeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeCache")
            .field("size", &self.below.dimensions())
            .field("all_layers_cached", &self.all_layers_cached)
            .finish()
    }
}

impl Default for CompositeCache {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl CompositeCache {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            below: RgbaImage::new(width, height),
            above: RgbaImage::new(width, height),
            reference: Arc::new(RgbaImage::new(width, height)),
            all_layers_cached: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.below.dimensions()
    }

    /// Reallocates every buffer for a new canvas size and invalidates.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    pub fn invalidate(&mut self) {
        self.all_layers_cached = false;
    }

    pub fn is_valid(&self) -> bool {
        self.all_layers_cached
    }

    pub fn below(&self) -> &RgbaImage {
        &self.below
    }

    pub fn above(&self) -> &RgbaImage {
        &self.above
    }

    pub fn reference(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.reference)
    }

    /// Rebuilds every buffer from `store` inside `area`.
    ///
    /// With no selected layer there is nothing to split around and the call
    /// is a no-op returning `None`. The caller must have sized the cache to
    /// the store first.
    pub fn recompute(
        &mut self,
        store: &LayerStore,
        area: PixelBounds,
        tool: Option<&dyn Tool>,
    ) -> EngineResult<Option<Arc<RgbaImage>>> {
        let Some(selected) = store.selected_index() else {
            log::debug!("Cache recompute skipped: no selected layer");
            return Ok(None);
        };
        let layers = store.layers();

        clear(&mut self.below);
        for layer in &layers[..selected] {
            composite_layer(&mut self.below, layer, area)?;
        }

        clear(&mut self.above);
        for layer in &layers[selected + 1..] {
            composite_layer(&mut self.above, layer, area)?;
        }

        // The layers above go on one at a time rather than as `above`, so the
        // reference matches a from-scratch composite exactly for every
        // operator.
        let mut reference = self.below.clone();
        composite_layer(&mut reference, &layers[selected], area)?;
        if let Some(tool) = tool {
            let mut overlay = reference.clone();
            tool.draw(&mut overlay);
            copy_area(&mut reference, &overlay, area)?;
        }
        for layer in &layers[selected + 1..] {
            composite_layer(&mut reference, layer, area)?;
        }
        self.reference = Arc::new(reference);

        self.all_layers_cached = true;
        log::debug!("Cached {} layers around layer {}", layers.len(), selected);
        Ok(Some(self.reference()))
    }
}
