use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::composite::BlendOperator;

/// A unique identifier for a layer.
///
/// Identity is independent of the pixels: a layer keeps its id when its
/// buffer is replaced wholesale by an undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub Uuid);

impl LayerId {
    /// Creates a fresh, never-before-seen id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raster layer: an owned pixel buffer plus how it is composited.
#[derive(Clone)]
pub struct Layer {
    /// Stable identity
    pub id: LayerId,
    /// Display name of the layer
    pub name: String,
    /// Pixels, same size as every other layer in the store
    pub buffer: RgbaImage,
    /// In [0, 1]
    pub opacity: f32,
    pub blend: BlendOperator,
    /// Locked layers reject tool edits but are still composited
    pub locked: bool,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.buffer.dimensions())
            .field("opacity", &self.opacity)
            .field("blend", &self.blend)
            .field("locked", &self.locked)
            .finish()
    }
}

impl Layer {
    /// A fully transparent layer
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self::from_buffer(name, RgbaImage::new(width, height))
    }

    /// A layer seeded from existing pixels
    pub fn from_buffer(name: &str, buffer: RgbaImage) -> Self {
        Self {
            id: LayerId::new(),
            name: name.to_string(),
            buffer,
            opacity: 1.0,
            blend: BlendOperator::Normal,
            locked: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Captures everything about this layer except its pixels
    pub fn state(&self) -> LayerState {
        LayerState {
            id: self.id,
            name: self.name.clone(),
            opacity: self.opacity,
            blend: self.blend,
            locked: self.locked,
        }
    }

    /// Applies captured attributes. The id must match.
    pub fn apply_state(&mut self, state: &LayerState) {
        debug_assert_eq!(self.id, state.id, "state applied to the wrong layer");
        self.name.clone_from(&state.name);
        self.opacity = state.opacity;
        self.blend = state.blend;
        self.locked = state.locked;
    }
}

/// A layer's attributes without its pixels, as recorded in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub id: LayerId,
    pub name: String,
    pub opacity: f32,
    pub blend: BlendOperator,
    pub locked: bool,
}
