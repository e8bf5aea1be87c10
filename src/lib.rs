pub mod batch;
pub mod config;
pub mod error;
pub mod gemini;
pub mod logger;
pub mod models;
pub mod persist;
pub mod styles;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{run_batch, BatchEntry, BatchOptions, BatchReport};
pub use config::{ApiKeyResolver, Config, GeminiConfig};
pub use error::{GenError, Result};
pub use gemini::{GeminiClient, GeminiProvider, ImageClient, ImageProvider};
pub use models::{GeneratedImage, GenerationRequest, GenerationResult, ImageKind, Resolution};
pub use persist::{persist, PersistReport};
pub use styles::{list_styles, StyleReference};
