use std::collections::{HashMap, HashSet};

use crate::clip::PixelBounds;
use crate::composite::composite_layer;
use crate::error::{EngineError, EngineResult};
use crate::layer::{Layer, LayerId, LayerState};

/// The ordered layer stack. Index 0 is the bottom layer.
///
/// Selection is held by identity, so reordering never changes which layer is
/// selected. Layers that leave the stack are parked in an archive until no
/// history snapshot can bring them back.
#[derive(Debug, Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
    selected: Option<LayerId>,
    archive: HashMap<LayerId, Layer>,
    layers_created: usize,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn check_index(&self, index: usize) -> EngineResult<()> {
        if index >= self.layers.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> EngineResult<&Layer> {
        self.check_index(index)?;
        Ok(&self.layers[index])
    }

    pub fn get_mut(&mut self, index: usize) -> EngineResult<&mut Layer> {
        self.check_index(index)?;
        Ok(&mut self.layers[index])
    }

    pub fn find(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn find_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn selected_id(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected.and_then(|id| self.index_of(id))
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.and_then(|id| self.find(id))
    }

    pub fn selected_layer_mut(&mut self) -> Option<&mut Layer> {
        let id = self.selected?;
        self.find_mut(id)
    }

    /// Size shared by every layer, taken from the bottom layer
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.layers.first().map(Layer::dimensions)
    }

    /// Like [`Self::dimensions`], but fails if any layer disagrees.
    pub fn uniform_dimensions(&self) -> EngineResult<Option<(u32, u32)>> {
        let Some(expected) = self.dimensions() else {
            return Ok(None);
        };
        for layer in &self.layers {
            let actual = layer.dimensions();
            if actual != expected {
                return Err(EngineError::DimensionMismatch { expected, actual });
            }
        }
        Ok(Some(expected))
    }

    /// Name for the next layer created without an explicit one
    pub fn next_layer_name(&mut self) -> String {
        self.layers_created += 1;
        format!("Layer {}", self.layers_created)
    }

    /// Puts `layer` on top of the stack and selects it.
    pub fn push(&mut self, layer: Layer) -> EngineResult<LayerId> {
        if let Some(expected) = self.dimensions() {
            let actual = layer.dimensions();
            if actual != expected {
                return Err(EngineError::DimensionMismatch { expected, actual });
            }
        }
        let id = layer.id;
        self.layers.push(layer);
        self.selected = Some(id);
        Ok(id)
    }

    /// Removes the layer at `index` into the archive.
    ///
    /// If it was selected, the layer below it becomes selected, or the one
    /// above if there is none below.
    pub fn remove_at(&mut self, index: usize) -> EngineResult<LayerId> {
        self.check_index(index)?;
        let layer = self.layers.remove(index);
        let id = layer.id;
        if self.selected == Some(id) {
            self.selected = if index > 0 {
                Some(self.layers[index - 1].id)
            } else {
                self.layers.first().map(|l| l.id)
            };
        }
        self.archive.insert(id, layer);
        Ok(id)
    }

    /// Sorted copy of `indices`, checked for range and duplicates.
    pub fn validate_indices(&self, indices: &[usize]) -> EngineResult<Vec<usize>> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(EngineError::DuplicateIndex(pair[0]));
            }
        }
        for &index in &sorted {
            self.check_index(index)?;
        }
        Ok(sorted)
    }

    /// Removes every layer in `indices`; the selection rule matches
    /// [`Self::remove_at`], measured from the selected layer's old index.
    pub fn remove_many(&mut self, indices: &[usize]) -> EngineResult<Vec<LayerId>> {
        let sorted = self.validate_indices(indices)?;

        let next_selected = match self.selected_index() {
            Some(sel) if sorted.binary_search(&sel).is_ok() => {
                let survives = |i: &usize| sorted.binary_search(i).is_err();
                (0..sel)
                    .rev()
                    .find(survives)
                    .or_else(|| (sel + 1..self.layers.len()).find(survives))
                    .map(|i| self.layers[i].id)
            }
            _ => self.selected,
        };

        let mut removed = Vec::with_capacity(sorted.len());
        for &index in sorted.iter().rev() {
            let layer = self.layers.remove(index);
            removed.push(layer.id);
            self.archive.insert(layer.id, layer);
        }
        removed.reverse();
        self.selected = next_selected;
        Ok(removed)
    }

    /// Composites the layers at `indices` onto the lowest of them, in index
    /// order, then removes the rest. Returns the surviving layer's id.
    pub fn merge(&mut self, indices: &[usize]) -> EngineResult<LayerId> {
        if indices.len() < 2 {
            return Err(EngineError::NotEnoughLayers(indices.len()));
        }
        let sorted = self.validate_indices(indices)?;
        let target_index = sorted[0];
        let target_id = self.layers[target_index].id;
        if self.layers[target_index].locked {
            return Err(EngineError::LayerLocked(target_id));
        }
        let Some((width, height)) = self.uniform_dimensions()? else {
            return Err(EngineError::NotEnoughLayers(0));
        };

        let area = PixelBounds::full(width, height);
        let (lower, upper) = self.layers.split_at_mut(target_index + 1);
        let target = &mut lower[target_index];
        for &index in &sorted[1..] {
            composite_layer(&mut target.buffer, &upper[index - target_index - 1], area)?;
        }

        let selected_was_merged = self
            .selected_index()
            .is_some_and(|sel| sorted[1..].binary_search(&sel).is_ok());
        for &index in sorted[1..].iter().rev() {
            let layer = self.layers.remove(index);
            self.archive.insert(layer.id, layer);
        }
        if selected_was_merged {
            self.selected = Some(target_id);
        }
        Ok(target_id)
    }

    pub fn move_layer(&mut self, from: usize, to: usize) -> EngineResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        Ok(())
    }

    pub fn select(&mut self, index: usize) -> EngineResult<LayerId> {
        let id = self.get(index)?.id;
        self.selected = Some(id);
        Ok(id)
    }

    pub fn select_id(&mut self, id: LayerId) -> EngineResult<()> {
        if self.find(id).is_none() {
            return Err(EngineError::UnknownLayer(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Attributes of every live layer, bottom to top
    pub fn states(&self) -> Vec<LayerState> {
        self.layers.iter().map(Layer::state).collect()
    }

    /// Rebuilds the stack from `states`, matching layers by identity.
    ///
    /// Layers named in `states` come from the live stack or the archive;
    /// live layers not named are archived. Nothing changes on error.
    pub fn restore_order(&mut self, states: &[LayerState]) -> EngineResult<()> {
        for state in states {
            if self.find(state.id).is_none() && !self.archive.contains_key(&state.id) {
                return Err(EngineError::UnknownLayer(state.id));
            }
        }

        let mut pool: HashMap<LayerId, Layer> = self.layers.drain(..).map(|l| (l.id, l)).collect();
        for state in states {
            let layer = pool.remove(&state.id).or_else(|| self.archive.remove(&state.id));
            if let Some(mut layer) = layer {
                layer.apply_state(state);
                self.layers.push(layer);
            }
        }
        self.archive.extend(pool);
        Ok(())
    }

    /// Selects `preferred` if it is live, otherwise the layer at
    /// `fallback_index` clamped into range. Empty stores select nothing.
    pub fn restore_selection(&mut self, preferred: Option<LayerId>, fallback_index: Option<usize>) {
        if let Some(id) = preferred.filter(|id| self.find(*id).is_some()) {
            self.selected = Some(id);
            return;
        }
        self.selected = match self.layers.len() {
            0 => None,
            len => {
                let index = fallback_index.unwrap_or(len - 1).min(len - 1);
                Some(self.layers[index].id)
            }
        };
    }

    /// Drops archived layers whose ids are not in `referenced`.
    pub fn prune_archive(&mut self, referenced: &HashSet<LayerId>) -> usize {
        let before = self.archive.len();
        self.archive.retain(|id, _| referenced.contains(id));
        before - self.archive.len()
    }

    pub fn archived_len(&self) -> usize {
        self.archive.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn store_with(n: usize) -> LayerStore {
        let mut store = LayerStore::new();
        for _ in 0..n {
            let name = store.next_layer_name();
            store.push(Layer::new(&name, 4, 4)).unwrap();
        }
        store
    }

    #[test]
    fn test_push_selects_new_layer() {
        let store = store_with(2);
        assert_eq!(store.selected_index(), Some(1));
        assert_eq!(store.layers()[1].name, "Layer 2");
    }

    #[test]
    fn test_push_rejects_other_size() {
        let mut store = store_with(1);
        let result = store.push(Layer::new("odd", 3, 3));
        assert!(matches!(result, Err(EngineError::DimensionMismatch { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_selected_prefers_layer_below() {
        let mut store = store_with(3);
        store.select(1).unwrap();
        let below = store.layers()[0].id;
        store.remove_at(1).unwrap();
        assert_eq!(store.selected_id(), Some(below));
        assert_eq!(store.archived_len(), 1);
    }

    #[test]
    fn test_remove_bottom_selects_layer_above() {
        let mut store = store_with(2);
        store.select(0).unwrap();
        let above = store.layers()[1].id;
        store.remove_at(0).unwrap();
        assert_eq!(store.selected_id(), Some(above));
    }

    #[test]
    fn test_remove_many_rejects_duplicates() {
        let mut store = store_with(3);
        let result = store.remove_many(&[1, 1]);
        assert!(matches!(result, Err(EngineError::DuplicateIndex(1))));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_many_reselects_nearest_survivor() {
        let mut store = store_with(4);
        store.select(2).unwrap();
        let survivor = store.layers()[0].id;
        store.remove_many(&[1, 2]).unwrap();
        assert_eq!(store.selected_id(), Some(survivor));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_merge_composites_onto_lowest() {
        let mut store = store_with(3);
        store.get_mut(2).unwrap().buffer = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
        let bottom = store.layers()[0].id;
        let merged = store.merge(&[2, 0]).unwrap();
        assert_eq!(merged, bottom);
        assert_eq!(store.len(), 2);
        assert_eq!(*store.layers()[0].buffer.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
        // The merged-away layer was selected.
        assert_eq!(store.selected_id(), Some(bottom));
    }

    #[test]
    fn test_merge_requires_two_layers() {
        let mut store = store_with(2);
        assert!(matches!(store.merge(&[0]), Err(EngineError::NotEnoughLayers(1))));
    }

    #[test]
    fn test_restore_order_brings_back_archived_layer() {
        let mut store = store_with(2);
        let states = store.states();
        store.remove_at(0).unwrap();
        store.restore_order(&states).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.states(), states);
        assert_eq!(store.archived_len(), 0);
    }

    #[test]
    fn test_restore_order_unknown_layer_changes_nothing() {
        let mut store = store_with(2);
        let mut states = store.states();
        states.push(Layer::new("ghost", 4, 4).state());
        assert!(matches!(store.restore_order(&states), Err(EngineError::UnknownLayer(_))));
        assert_eq!(store.len(), 2);
    }
}
