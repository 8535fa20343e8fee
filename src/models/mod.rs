//! Generation backends and model routing.
//!
//! - [`Generator`](backend::Generator): the blocking inference seam
//! - [`ModelRegistry`](registry::ModelRegistry): name to loaded model, with one default
//! - [`CommandGenerator`](command::CommandGenerator): external inference program
//! - [`PreviewGenerator`](preview::PreviewGenerator): built-in seeded WAV renderer

pub mod backend;
pub mod command;
pub mod preview;
pub mod registry;

pub use backend::{GenerationError, Generator};
pub use command::CommandGenerator;
pub use preview::PreviewGenerator;
pub use registry::{model_name_from_path, ModelEntry, ModelInfo, ModelRegistry};
