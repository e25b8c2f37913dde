//! Effect pedals placed before and after the amp section.
//!
//! Pedals are plain processors: the chain decides whether they run and pushes
//! their parameters before each block.

pub mod boost;
pub mod centaur;
pub mod chorus;
pub mod compressor;
pub mod delay;
pub mod doubler;
pub mod overdrive;
pub mod reverb;

pub use boost::BoostPedal;
pub use centaur::CentaurPedal;
pub use chorus::ChorusPedal;
pub use compressor::CompressorPedal;
pub use delay::DelayPedal;
pub use doubler::DoublerPedal;
pub use overdrive::OverdrivePedal;
pub use reverb::ReverbPedal;

use crate::audio::buffer::AudioBuffer;

/// Session format a pedal is prepared for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f32,
    pub max_block_size: usize,
    pub num_channels: usize,
}

// The core trait that all pedals must implement
pub trait Pedal: Send + 'static {
    fn name(&self) -> &'static str;

    // Allocate state for a session. Not called on the audio thread.
    fn prepare(&mut self, spec: &ProcessSpec);

    // Set a parameter by name. Out-of-range values are clamped; only unknown
    // names are rejected.
    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str>;

    // Process one block in place.
    fn process(&mut self, buffer: &mut AudioBuffer);

    // Clear internal state (delay lines, filters, envelopes).
    fn reset(&mut self) {}
}

/// Clamp a knob value into `[min, max]`; NaN maps to `min`.
#[inline]
pub(crate) fn clamp_param(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
