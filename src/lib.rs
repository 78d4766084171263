#![warn(clippy::all, rust_2018_idioms)]

pub mod cache;
pub mod clip;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod id_generator;
pub mod layer;
pub mod renderer;
pub mod state;
pub mod store;
pub mod tool;
pub mod transform;

pub use cache::CompositeCache;
pub use clip::{ClipRegion, ClipTransition, PixelBounds};
pub use composite::BlendOperator;
pub use config::EngineConfig;
pub use engine::{PaintEngine, Viewport};
pub use error::{EngineError, EngineResult};
pub use history::{HistoryManager, Snapshot, SnapshotId};
pub use layer::{Layer, LayerId, LayerState};
pub use renderer::Renderer;
pub use state::GestureState;
pub use store::LayerStore;
pub use tool::{BrushTool, MessageChannel, Tool, ToolContext, ToolMessage};
pub use transform::ViewTransform;
