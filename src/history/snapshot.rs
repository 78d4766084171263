use egui::Rect;
use image::RgbaImage;
use std::fmt;

use crate::id_generator::generate_snapshot_id;
use crate::layer::{LayerId, LayerState};
use crate::store::LayerStore;

/// Id of a snapshot, increasing in capture order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(pub u64);

/// Immutable capture of enough state to return to an earlier moment: one
/// layer's pixels, every layer's attributes and order, the selection and
/// the clip.
///
/// A snapshot without pixels is layer-order-only and never touches buffer
/// contents when restored.
#[derive(Clone)]
pub struct Snapshot {
    id: SnapshotId,
    target: Option<LayerId>,
    pixels: Option<RgbaImage>,
    layers: Vec<LayerState>,
    selected: Option<LayerId>,
    clip: Rect,
    coalescible: bool,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("pixels", &self.pixels.as_ref().map(RgbaImage::dimensions))
            .field("layers", &self.layers.len())
            .field("selected", &self.selected)
            .field("clip", &self.clip)
            .field("coalescible", &self.coalescible)
            .finish()
    }
}

impl Snapshot {
    /// Captures `store` and `clip`.
    ///
    /// With `clone_buffer` the target's pixels are deep-copied; without it
    /// the snapshot is layer-order-only. `coalescible` marks the "after"
    /// half of a before/after pair.
    pub fn capture(
        store: &LayerStore,
        target: Option<LayerId>,
        clone_buffer: bool,
        coalescible: bool,
        clip: Rect,
    ) -> Self {
        let pixels = if clone_buffer {
            target.and_then(|id| store.find(id)).map(|layer| layer.buffer.clone())
        } else {
            None
        };
        Self {
            id: SnapshotId(generate_snapshot_id()),
            target,
            pixels,
            layers: store.states(),
            selected: store.selected_id(),
            clip,
            coalescible,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn target(&self) -> Option<LayerId> {
        self.target
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.pixels.as_ref()
    }

    pub fn layers(&self) -> &[LayerState] {
        &self.layers
    }

    pub fn selected(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    pub fn is_layer_order_only(&self) -> bool {
        self.pixels.is_none()
    }

    pub fn is_coalescible(&self) -> bool {
        self.coalescible
    }

    /// Whether `self`, taken after `earlier`, closes the step `earlier` opened.
    pub fn pairs_with(&self, earlier: &Snapshot) -> bool {
        self.coalescible
            && (self.target == earlier.target
                || self.is_layer_order_only()
                || earlier.is_layer_order_only())
    }

    /// Ids of every layer this snapshot can bring back
    pub fn referenced_layers(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.iter().map(|s| s.id).chain(self.target)
    }
}
