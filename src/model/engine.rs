/// Sample rate assumed for models that do not record their own.
pub const ASSUMED_MODEL_SAMPLE_RATE: f64 = 48_000.0;

/// An opaque, block-oriented inference engine.
///
/// Engines follow a two-phase protocol: every `process` call is followed by
/// exactly one `finalize` with the same frame count before the next
/// `process`. Implementations must not allocate in either call.
pub trait InferenceEngine: Send + 'static {
    /// Run the model over `input`, writing `input.len()` frames to `output`.
    fn process(&mut self, input: &[f32], output: &mut [f32]);

    /// Commit internal state after the `process` call that produced
    /// `num_frames` frames.
    fn finalize(&mut self, num_frames: usize);

    /// Native sample rate of the model, if it knows it.
    fn expected_sample_rate(&self) -> Option<f64> {
        None
    }

    /// Reported output loudness in dB, if the model carries it.
    fn loudness(&self) -> Option<f64> {
        None
    }

    /// Run the model on silence until its receptive field is settled.
    fn prewarm(&mut self) {}
}

/// The rate a model should be run at.
pub fn model_sample_rate(engine: &dyn InferenceEngine) -> f64 {
    match engine.expected_sample_rate() {
        Some(rate) if rate > 0.0 => rate,
        _ => ASSUMED_MODEL_SAMPLE_RATE,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScaleEngine;
    use super::*;

    #[test]
    fn unknown_rate_defaults_to_48k() {
        let engine = ScaleEngine::new(1.0);
        assert_eq!(model_sample_rate(&engine), 48_000.0);
        let engine = ScaleEngine::new(1.0).at_rate(44_100.0);
        assert_eq!(model_sample_rate(&engine), 44_100.0);
        let engine = ScaleEngine::new(1.0).at_rate(-1.0);
        assert_eq!(model_sample_rate(&engine), 48_000.0);
    }
}
