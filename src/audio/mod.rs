pub mod buffer;
pub mod engine;
pub mod limiter;
pub mod peak_meter;

pub use buffer::AudioBuffer;
pub use engine::{Engine, EngineHandle};
