use anyhow::{Result, bail};

use crate::model::engine::InferenceEngine;

/// Longest receptive field accepted from a model file (one second at 48 kHz).
pub const MAX_RECEPTIVE_FIELD: usize = 48_000;

/// FIR model: `y[n] = bias + sum_k w[k] * x[n - k]`.
///
/// `process` only reads the committed history; the history is advanced when
/// `finalize` is called, so repeated `process` calls on the same block are
/// idempotent.
pub struct LinearModel {
    weights: Vec<f32>,
    bias: f32,
    /// Last `weights.len() - 1` committed input samples, oldest first.
    history: Vec<f32>,
    /// History as it will be after the pending block is finalized.
    pending: Vec<f32>,
    pending_frames: Option<usize>,
    sample_rate: Option<f64>,
    loudness: Option<f64>,
}

impl LinearModel {
    pub fn new(
        weights: Vec<f32>,
        bias: f32,
        sample_rate: Option<f64>,
        loudness: Option<f64>,
    ) -> Result<Self> {
        if weights.is_empty() {
            bail!("linear model needs at least one weight");
        }
        if weights.len() > MAX_RECEPTIVE_FIELD {
            bail!(
                "receptive field {} exceeds the maximum of {MAX_RECEPTIVE_FIELD}",
                weights.len()
            );
        }
        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            bail!("linear model contains non-finite weights");
        }

        let history_len = weights.len() - 1;
        Ok(Self {
            weights,
            bias,
            history: vec![0.0; history_len],
            pending: vec![0.0; history_len],
            pending_frames: None,
            sample_rate,
            loudness,
        })
    }

    pub fn receptive_field(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    fn sample_at(&self, input: &[f32], n: usize, k: usize) -> f32 {
        if k <= n {
            input[n - k]
        } else {
            // k - n samples before the block start.
            self.history[self.history.len() - (k - n)]
        }
    }
}

impl InferenceEngine for LinearModel {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = input.len().min(output.len());

        for n in 0..frames {
            let mut acc = self.bias;
            for (k, w) in self.weights.iter().enumerate() {
                acc += w * self.sample_at(input, n, k);
            }
            output[n] = acc;
        }

        // New history = last `history_len` samples of (history ++ input).
        let history_len = self.history.len();
        let from_input = frames.min(history_len);
        let from_history = history_len - from_input;
        self.pending[..from_history].copy_from_slice(&self.history[from_input..]);
        self.pending[from_history..].copy_from_slice(&input[frames - from_input..frames]);
        self.pending_frames = Some(frames);
    }

    fn finalize(&mut self, num_frames: usize) {
        debug_assert_eq!(self.pending_frames, Some(num_frames));
        if self.pending_frames.take().is_some() {
            std::mem::swap(&mut self.history, &mut self.pending);
        }
    }

    fn expected_sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    fn loudness(&self) -> Option<f64> {
        self.loudness
    }

    fn prewarm(&mut self) {
        self.history.fill(0.0);
        self.pending_frames = None;
    }
}
