pub mod adapters;
pub mod compositor;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod validator;

pub const CANVAS_WIDTH: u32 = 1280;
pub const CANVAS_HEIGHT: u32 = 720;

pub use config::EngineConfig;
pub use error::{error_chain_text, GenerationError};
pub use pipeline::{ArtifactPaths, Pipeline, PipelineConfig};
