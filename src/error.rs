use thiserror::Error;

use crate::layer::LayerId;

/// Errors raised by the layer engine.
///
/// Everything except `Image` and `Config` is a precondition violation on the
/// host's side: the engine reports it immediately and leaves its state as it
/// was before the call.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("layer index {index} out of range for {len} layers")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("merging needs at least two layers, got {0}")]
    NotEnoughLayers(usize),

    #[error("layer index {0} given more than once")]
    DuplicateIndex(usize),

    #[error("layer {0} is locked")]
    LayerLocked(LayerId),

    #[error("engine has no view or canvas yet")]
    NotInitialized,

    #[error("buffer is {actual:?} but the canvas is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("opacity {0} is outside [0, 1]")]
    InvalidOpacity(f32),

    #[error("clip rect {0:?} does not overlap the canvas")]
    InvalidClip(egui::Rect),

    #[error("a gesture is in progress")]
    GestureInProgress,

    #[error("layer {0} is neither live nor archived")]
    UnknownLayer(LayerId),

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
