//! Neural amp models: the engine trait, model files, the resampling adapter
//! and the staged/live hand-off between the control and audio threads.

pub mod engine;
pub mod host;
pub mod linear;
pub mod loader;
pub mod resampling;
pub mod staging;

pub use engine::InferenceEngine;
pub use host::{ModelHost, ModelLoader, TARGET_LOUDNESS_DB};
pub use linear::LinearModel;
pub use resampling::{FinalizeTicket, ProtocolState, ResamplingModel};
