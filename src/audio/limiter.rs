use crate::audio::buffer::AudioBuffer;

/// Limit slightly below 0 dBFS (-0.1 dB).
pub const SAFETY_CLIP_THRESHOLD: f32 = 0.988;

/// Final soft clipper: `y = T * tanh(x / T)`.
///
/// Runs on every channel of every block regardless of which optional stages
/// were active, so `|y| <= T` always holds.
#[derive(Debug, Clone, Copy)]
pub struct SafetyLimiter {
    threshold: f32,
}

impl Default for SafetyLimiter {
    fn default() -> Self {
        Self::new(SAFETY_CLIP_THRESHOLD)
    }
}

impl SafetyLimiter {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(f32::EPSILON, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    pub fn process_sample(&self, input: f32) -> f32 {
        if input.is_nan() {
            return 0.0;
        }
        // tanh(x) rounds to exactly 1.0 for large x, which keeps the bound.
        self.threshold * (input / self.threshold).tanh()
    }

    pub fn process(&self, buffer: &mut AudioBuffer) {
        for channel in buffer.channels_mut() {
            for sample in channel.iter_mut() {
                *sample = self.process_sample(*sample);
            }
        }
    }
}
