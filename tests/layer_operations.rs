use egui::{Pos2, Rect, pos2, vec2};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use paint_layers::{BlendOperator, BrushTool, EngineConfig, EngineError, PaintEngine, ViewTransform};
use std::io::Cursor;

const SIZE: u32 = 16;
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

// Helper to create a laid-out engine with `n` solid layers of different
// greys and an empty history
fn create_test_engine(n: usize) -> PaintEngine {
    let mut engine = PaintEngine::new(EngineConfig::default());
    engine.layout(
        Rect::from_min_size(Pos2::ZERO, vec2(SIZE as f32, SIZE as f32)),
        ViewTransform::identity(),
    );
    for i in 0..n {
        let grey = (40 * i) as u8;
        engine
            .add_layer(RgbaImage::from_pixel(SIZE, SIZE, Rgba([grey, grey, grey, 160])))
            .unwrap();
    }
    engine.clear_history();
    engine
}

#[test]
fn test_add_on_empty_store_selects_new_layer() {
    let mut engine = PaintEngine::default();
    assert_eq!(engine.selected_index(), None);

    let id = engine.add_layer(RgbaImage::new(SIZE, SIZE)).unwrap();
    assert_eq!(engine.selected_index(), Some(0));
    assert_eq!(engine.selected_id(), Some(id));
    assert_eq!(engine.canvas_size(), Some((SIZE, SIZE)));
    assert_eq!(engine.clip_rect(), Rect::from_min_size(Pos2::ZERO, vec2(SIZE as f32, SIZE as f32)));
    assert_eq!(engine.layers()[0].name, "Layer 1");
}

#[test]
fn test_add_appends_on_top() {
    let mut engine = create_test_engine(2);
    engine.select_layer(0).unwrap();

    let id = engine.add_empty_layer().unwrap();
    assert_eq!(engine.layer_count(), 3);
    assert_eq!(engine.layers()[2].id, id);
    assert_eq!(engine.selected_index(), Some(2));
}

#[test]
fn test_add_rejects_other_size() {
    let mut engine = create_test_engine(1);
    let result = engine.add_layer(RgbaImage::new(SIZE + 1, SIZE));
    assert!(matches!(result, Err(EngineError::DimensionMismatch { .. })));
    assert_eq!(engine.layer_count(), 1);
    assert!(!engine.can_undo());
}

#[test]
fn test_add_empty_layer_needs_a_canvas() {
    let mut engine = PaintEngine::default();
    assert!(matches!(engine.add_empty_layer(), Err(EngineError::NotInitialized)));

    // Laid out but empty: the view bounds give the size
    engine.layout(Rect::from_min_size(Pos2::ZERO, vec2(12.0, 9.0)), ViewTransform::identity());
    engine.add_empty_layer().unwrap();
    assert_eq!(engine.canvas_size(), Some((12, 9)));
}

#[test]
fn test_add_without_history() {
    let mut engine = create_test_engine(1);
    engine.add_layer_without_history(RgbaImage::new(SIZE, SIZE)).unwrap();
    assert_eq!(engine.layer_count(), 2);
    assert!(!engine.can_undo());
}

#[test]
fn test_remove_only_layer_leaves_empty_store() {
    let mut engine = create_test_engine(1);
    engine.remove_layer_at(0).unwrap();

    assert_eq!(engine.layer_count(), 0);
    assert_eq!(engine.selected_index(), None);
    assert_eq!(engine.history().undo_len(), 2);
}

#[test]
fn test_remove_out_of_range() {
    let mut engine = create_test_engine(2);
    let result = engine.remove_layer_at(5);
    assert!(matches!(result, Err(EngineError::IndexOutOfRange { index: 5, len: 2 })));
    assert!(!engine.can_undo());
}

#[test]
fn test_remove_many_is_one_step() {
    let mut engine = create_test_engine(4);
    let ids: Vec<_> = engine.layers().iter().map(|l| l.id).collect();
    engine.select_layer(2).unwrap();

    engine.remove_layers(&[2, 0]).unwrap();
    assert_eq!(engine.layer_count(), 2);
    // Nearest survivor below the removed selection
    assert_eq!(engine.selected_id(), Some(ids[1]));

    engine.undo().unwrap();
    let restored: Vec<_> = engine.layers().iter().map(|l| l.id).collect();
    assert_eq!(restored, ids);
    assert!(!engine.can_undo());
}

#[test]
fn test_remove_many_edge_cases() {
    let mut engine = create_test_engine(3);

    // Empty set is a no-op
    engine.remove_layers(&[]).unwrap();
    assert_eq!(engine.layer_count(), 3);
    assert!(!engine.can_undo());

    let result = engine.remove_layers(&[1, 1]);
    assert!(matches!(result, Err(EngineError::DuplicateIndex(1))));
    assert_eq!(engine.layer_count(), 3);
}

#[test]
fn test_move_keeps_selection_on_layer() {
    let mut engine = create_test_engine(3);
    engine.select_layer(0).unwrap();
    let selected = engine.selected_id();

    engine.move_layer(0, 2).unwrap();
    assert_eq!(engine.selected_id(), selected);
    assert_eq!(engine.selected_index(), Some(2));

    engine.undo().unwrap();
    assert_eq!(engine.selected_index(), Some(0));
}

#[test]
fn test_move_selected_up_and_down() {
    let mut engine = create_test_engine(3);

    // Already on top
    assert!(!engine.move_selected_up().unwrap());
    assert!(!engine.can_undo());

    assert!(engine.move_selected_down().unwrap());
    assert_eq!(engine.selected_index(), Some(1));
    assert!(engine.move_selected_down().unwrap());
    assert!(!engine.move_selected_down().unwrap());
    assert_eq!(engine.selected_index(), Some(0));
}

#[test]
fn test_merge_is_atomic_and_undoes_in_one_step() {
    let mut engine = create_test_engine(3);
    let ids: Vec<_> = engine.layers().iter().map(|l| l.id).collect();
    let before = engine.flatten().unwrap();

    let merged = engine.merge_layers(&[0, 1, 2]).unwrap();
    assert_eq!(merged, ids[0]);
    assert_eq!(engine.layer_count(), 1);
    assert_eq!(engine.selected_id(), Some(ids[0]));
    // Merging all layers keeps the composite
    assert_eq!(engine.flatten().unwrap(), before);

    engine.undo().unwrap();
    let restored: Vec<_> = engine.layers().iter().map(|l| l.id).collect();
    assert_eq!(restored, ids);
    assert_eq!(engine.flatten().unwrap(), before);
    assert!(!engine.can_undo());
}

#[test]
fn test_merge_preconditions() {
    let mut engine = create_test_engine(3);

    assert!(matches!(engine.merge_layers(&[1]), Err(EngineError::NotEnoughLayers(1))));
    assert!(matches!(engine.merge_layers(&[0, 0]), Err(EngineError::DuplicateIndex(0))));
    assert!(matches!(
        engine.merge_layers(&[0, 7]),
        Err(EngineError::IndexOutOfRange { index: 7, .. })
    ));

    engine.set_locked(0, true).unwrap();
    let undo_len = engine.history().undo_len();
    assert!(matches!(engine.merge_layers(&[0, 2]), Err(EngineError::LayerLocked(_))));
    assert_eq!(engine.layer_count(), 3);
    assert_eq!(engine.history().undo_len(), undo_len);
}

#[test]
fn test_attribute_changes_validate_and_record() {
    let mut engine = create_test_engine(2);

    assert!(matches!(engine.set_opacity(0, 1.5), Err(EngineError::InvalidOpacity(_))));
    assert!(matches!(engine.set_opacity(0, f32::NAN), Err(EngineError::InvalidOpacity(_))));
    assert!(!engine.can_undo());

    // Unchanged value records nothing
    engine.set_opacity(0, 1.0).unwrap();
    assert!(!engine.can_undo());

    engine.set_blend_operator(1, BlendOperator::Screen).unwrap();
    engine.rename_layer(1, "Highlights").unwrap();
    assert_eq!(engine.layers()[1].name, "Highlights");

    engine.undo().unwrap();
    assert_eq!(engine.layers()[1].name, "Layer 2");
    assert_eq!(engine.layers()[1].blend, BlendOperator::Screen);
    engine.undo().unwrap();
    assert_eq!(engine.layers()[1].blend, BlendOperator::Normal);
}

#[test]
fn test_gesture_preconditions() {
    let mut engine = PaintEngine::default();
    engine.add_layer(RgbaImage::new(SIZE, SIZE)).unwrap();
    assert!(matches!(engine.begin_gesture(pos2(1.0, 1.0)), Err(EngineError::NotInitialized)));

    let mut engine = create_test_engine(2);
    engine
        .set_tool(Box::new(BrushTool::new(RED, 1.0)))
        .unwrap();
    engine.set_locked(1, true).unwrap();
    let undo_len = engine.history().undo_len();
    assert!(matches!(engine.begin_gesture(pos2(1.0, 1.0)), Err(EngineError::LayerLocked(_))));
    assert_eq!(engine.history().undo_len(), undo_len);
    assert!(!engine.gesture().is_active());
}

#[test]
fn test_gesture_without_selection_is_ignored() {
    let mut engine = create_test_engine(0);
    engine.set_tool(Box::new(BrushTool::new(RED, 1.0))).unwrap();

    engine.begin_gesture(pos2(1.0, 1.0)).unwrap();
    engine.move_gesture(pos2(2.0, 2.0)).unwrap();
    engine.end_gesture(pos2(3.0, 3.0)).unwrap();
    assert!(!engine.can_undo());
}

#[test]
fn test_layer_edits_blocked_mid_gesture() {
    let mut engine = create_test_engine(2);
    engine.set_tool(Box::new(BrushTool::new(RED, 1.0))).unwrap();
    engine.begin_gesture(pos2(1.0, 1.0)).unwrap();

    assert!(matches!(engine.remove_layer_at(0), Err(EngineError::GestureInProgress)));
    assert!(matches!(engine.select_layer(0), Err(EngineError::GestureInProgress)));
    engine.end_gesture(pos2(1.0, 1.0)).unwrap();
    engine.select_layer(0).unwrap();
}

#[test]
fn test_import_smaller_image_lands_at_origin() {
    let mut engine = create_test_engine(1);
    let small = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, RED));

    engine.import_image(&small).unwrap();
    let layer = engine.selected_layer().unwrap();
    assert_eq!(layer.dimensions(), (SIZE, SIZE));
    assert_eq!(*layer.buffer.get_pixel(3, 3), RED);
    assert_eq!(layer.buffer.get_pixel(10, 10)[3], 0);
}

#[test]
fn test_import_encoded_bytes() {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 5, RED))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();

    // An empty engine takes its canvas size from the image
    let mut engine = PaintEngine::default();
    engine.import_image_bytes(&bytes).unwrap();
    assert_eq!(engine.canvas_size(), Some((6, 5)));
    assert_eq!(*engine.layers()[0].buffer.get_pixel(5, 4), RED);

    let result = engine.import_image_bytes(b"not an image");
    assert!(matches!(result, Err(EngineError::Image(_))));
    assert_eq!(engine.layer_count(), 1);
}

#[test]
fn test_merge_undo_restores_every_attribute_and_pixel() {
    let mut engine = create_test_engine(3);
    engine.set_opacity(2, 0.45).unwrap();
    engine.set_blend_operator(2, BlendOperator::Screen).unwrap();
    engine.set_opacity(1, 0.7).unwrap();
    engine.set_blend_operator(1, BlendOperator::Multiply).unwrap();
    engine.rename_layer(1, "Shadows").unwrap();
    engine.clear_history();

    let states: Vec<_> = engine.layers().iter().map(|l| l.state()).collect();
    let buffers: Vec<_> = engine.layers().iter().map(|l| l.buffer.clone()).collect();

    engine.merge_layers(&[1, 2]).unwrap();
    assert_eq!(engine.layer_count(), 2);
    // The lower layer absorbs the upper one and keeps its own attributes
    assert_ne!(engine.layers()[1].buffer, buffers[1]);
    assert_eq!(engine.layers()[1].state(), states[1]);

    engine.undo().unwrap();
    assert!(!engine.can_undo());
    let restored_states: Vec<_> = engine.layers().iter().map(|l| l.state()).collect();
    let restored_buffers: Vec<_> = engine.layers().iter().map(|l| l.buffer.clone()).collect();
    assert_eq!(restored_states, states);
    assert_eq!(restored_buffers, buffers);
}
