use egui::ColorImage;
use image::RgbaImage;

use crate::cache::CompositeCache;
use crate::clip::PixelBounds;
use crate::composite::{BlendOperator, checkerboard, clear, composite_layer, composite_over, copy_area};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::store::LayerStore;
use crate::tool::Tool;

type CheckerKey = ((u32, u32), u32, [u8; 4], [u8; 4]);

/// Produces the frame the host shows.
///
/// With every layer on [`BlendOperator::Normal`] and a valid cache, a frame
/// is below + selected layer + tool overlay + above. Any other operator makes
/// the split unsound, and every layer is composited again per frame.
pub struct Renderer {
    frame: RgbaImage,
    scratch: RgbaImage,
    checker: Option<(CheckerKey, RgbaImage)>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("frame", &self.frame.dimensions())
            .field("checker", &self.checker.as_ref().map(|(key, _)| key))
            .finish()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            frame: RgbaImage::new(0, 0),
            scratch: RgbaImage::new(0, 0),
            checker: None,
        }
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last rendered frame
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.frame = RgbaImage::new(width, height);
        self.scratch = RgbaImage::new(width, height);
        self.checker = None;
    }

    /// Whether the cached below/above split can stand in for the layers it
    /// covers.
    pub fn can_use_split(store: &LayerStore) -> bool {
        store.layers().iter().all(|layer| layer.blend.is_normal())
    }

    /// Renders a frame and returns it.
    pub fn render(
        &mut self,
        store: &LayerStore,
        cache: &CompositeCache,
        area: PixelBounds,
        tool: Option<&dyn Tool>,
        config: &EngineConfig,
    ) -> EngineResult<&RgbaImage> {
        let size = store.dimensions().unwrap_or((0, 0));
        if self.frame.dimensions() != size {
            self.resize(size.0, size.1);
        }
        clear(&mut self.frame);
        if store.is_empty() {
            return Ok(&self.frame);
        }

        if config.show_transparency_background {
            self.draw_checkerboard(area, config)?;
        }

        let selected = store.selected_index();
        match selected {
            Some(selected) if cache.is_valid() && Self::can_use_split(store) => {
                composite_over(&mut self.frame, cache.below(), 1.0, BlendOperator::Normal, area)?;
                composite_layer(&mut self.frame, &store.layers()[selected], area)?;
                self.draw_overlay(tool, area)?;
                composite_over(&mut self.frame, cache.above(), 1.0, BlendOperator::Normal, area)?;
            }
            _ => {
                for (index, layer) in store.layers().iter().enumerate() {
                    composite_layer(&mut self.frame, layer, area)?;
                    if Some(index) == selected {
                        self.draw_overlay(tool, area)?;
                    }
                }
            }
        }
        Ok(&self.frame)
    }

    fn draw_overlay(&mut self, tool: Option<&dyn Tool>, area: PixelBounds) -> EngineResult<()> {
        let Some(tool) = tool else {
            return Ok(());
        };
        self.scratch.clone_from(&self.frame);
        tool.draw(&mut self.scratch);
        copy_area(&mut self.frame, &self.scratch, area)
    }

    fn draw_checkerboard(&mut self, area: PixelBounds, config: &EngineConfig) -> EngineResult<()> {
        let key: CheckerKey = (
            self.frame.dimensions(),
            config.checker_size,
            config.checker_light,
            config.checker_dark,
        );
        if self.checker.as_ref().is_none_or(|(cached, _)| *cached != key) {
            let (width, height) = key.0;
            let pattern = checkerboard(width, height, key.1, key.2, key.3);
            self.checker = Some((key, pattern));
        }
        if let Some((_, pattern)) = &self.checker {
            copy_area(&mut self.frame, pattern, area)?;
        }
        Ok(())
    }

    /// Straight-alpha RGBA frame as an egui image, ready for texture upload
    pub fn to_color_image(image: &RgbaImage) -> ColorImage {
        let (width, height) = image.dimensions();
        ColorImage::from_rgba_unmultiplied([width as usize, height as usize], image.as_raw())
    }
}
