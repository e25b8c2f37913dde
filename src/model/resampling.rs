//! Runs an inference engine at its native rate inside a host session.
//!
//! When the host and model rates match, calls are forwarded one to one. When
//! they differ, host audio is collected into fixed chunks, converted to the
//! model rate with rubato, run through the engine, and converted back. The
//! output FIFO is primed with silence so every host block can be satisfied;
//! that priming plus the resampler delays is the reported latency.

use anyhow::{Context, Result, bail};
use log::debug;
use rubato::{FftFixedInOut, Resampler};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::engine::{InferenceEngine, model_sample_rate};

const CHANNELS: usize = 1;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    AwaitingProcess,
    AwaitingFinalize,
}

/// Proof that `process` ran. Must be handed back to `finalize` on the same
/// model before the next `process`.
#[must_use = "every process call must be finalized"]
#[derive(Debug)]
pub struct FinalizeTicket {
    owner: u64,
    frames: usize,
}

impl FinalizeTicket {
    pub fn frames(&self) -> usize {
        self.frames
    }
}

struct ResampledPath {
    upsampler: FftFixedInOut<f32>,
    downsampler: FftFixedInOut<f32>,
    host_chunk: usize,
    model_chunk: usize,
    input_fifo: VecDeque<f32>,
    output_fifo: VecDeque<f32>,
    host_in: Vec<Vec<f32>>,
    model_in: Vec<Vec<f32>>,
    model_out: Vec<Vec<f32>>,
    host_out: Vec<Vec<f32>>,
    priming: usize,
    latency: usize,
}

impl ResampledPath {
    fn new(host_rate: usize, model_rate: usize, max_block_size: usize) -> Result<Self> {
        let upsampler = FftFixedInOut::<f32>::new(host_rate, model_rate, max_block_size, CHANNELS)
            .context("failed to create model-rate resampler")?;
        let host_chunk = upsampler.input_frames_next();
        let model_chunk = upsampler.output_frames_next();

        let downsampler = FftFixedInOut::<f32>::new(model_rate, host_rate, model_chunk, CHANNELS)
            .context("failed to create host-rate resampler")?;
        if downsampler.input_frames_next() != model_chunk
            || downsampler.output_frames_next() != host_chunk
        {
            bail!(
                "resampler chunks do not line up: {}->{} then {}->{}",
                host_chunk,
                model_chunk,
                downsampler.input_frames_next(),
                downsampler.output_frames_next()
            );
        }

        // Input carry-over is below one chunk; output never exceeds the
        // priming plus one chunk.
        let priming = host_chunk - 1;
        let up_delay_host =
            (upsampler.output_delay() as f64 * host_rate as f64 / model_rate as f64).round();
        let latency = priming + up_delay_host as usize + downsampler.output_delay();

        let host_out = downsampler.output_buffer_allocate(true);
        let model_in = upsampler.output_buffer_allocate(true);

        let mut path = Self {
            upsampler,
            downsampler,
            host_chunk,
            model_chunk,
            input_fifo: VecDeque::with_capacity(host_chunk + max_block_size),
            output_fifo: VecDeque::with_capacity(priming + host_chunk + max_block_size),
            host_in: vec![vec![0.0; host_chunk]; CHANNELS],
            model_in,
            model_out: vec![vec![0.0; model_chunk]; CHANNELS],
            host_out,
            priming,
            latency,
        };
        path.clear();
        Ok(path)
    }

    fn clear(&mut self) {
        self.upsampler.reset();
        self.downsampler.reset();
        self.input_fifo.clear();
        self.output_fifo.clear();
        self.output_fifo.extend(std::iter::repeat_n(0.0, self.priming));
    }

    fn process(&mut self, engine: &mut dyn InferenceEngine, input: &[f32], output: &mut [f32]) {
        self.input_fifo.extend(input.iter().copied());

        while self.input_fifo.len() >= self.host_chunk {
            for (dst, src) in self.host_in[0].iter_mut().zip(self.input_fifo.drain(..self.host_chunk)) {
                *dst = src;
            }
            self.run_chunk(engine);
        }

        for sample in output.iter_mut() {
            *sample = self.output_fifo.pop_front().unwrap_or(0.0);
        }
    }

    fn run_chunk(&mut self, engine: &mut dyn InferenceEngine) {
        let model_frames = match self
            .upsampler
            .process_into_buffer(&self.host_in, &mut self.model_in, None)
        {
            Ok((_, frames)) => frames,
            Err(_) => 0,
        };

        let model_frames = model_frames.min(self.model_chunk);
        engine.process(
            &self.model_in[0][..model_frames],
            &mut self.model_out[0][..model_frames],
        );
        engine.finalize(model_frames);
        self.model_out[0][model_frames..].fill(0.0);

        match self
            .downsampler
            .process_into_buffer(&self.model_out, &mut self.host_out, None)
        {
            Ok((_, frames)) => {
                self.output_fifo
                    .extend(self.host_out[0][..frames].iter().copied());
            }
            Err(_) => {
                // Keep the FIFO level consistent so later blocks stay aligned.
                self.output_fifo
                    .extend(std::iter::repeat_n(0.0, self.host_chunk));
            }
        }
    }
}

/// An inference engine bound to a host session format.
pub struct ResamplingModel {
    id: u64,
    engine: Box<dyn InferenceEngine>,
    host_rate: f64,
    model_rate: f64,
    max_block_size: usize,
    resampled: Option<ResampledPath>,
    state: ProtocolState,
    last_frames: usize,
}

impl ResamplingModel {
    /// Wrap `engine` for a host session and run its warm-up.
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        sample_rate: f64,
        max_block_size: usize,
    ) -> Result<Self> {
        let model_rate = model_sample_rate(engine.as_ref());
        let mut model = Self {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            engine,
            host_rate: sample_rate,
            model_rate,
            max_block_size,
            resampled: None,
            state: ProtocolState::AwaitingProcess,
            last_frames: 0,
        };
        model.reset(sample_rate, max_block_size)?;
        Ok(model)
    }

    /// Rebuild the rate conversion for a new session format and pre-run the
    /// engine on silence. Not real-time safe.
    pub fn reset(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            bail!("invalid host sample rate {sample_rate}");
        }
        if max_block_size == 0 {
            bail!("max block size must be positive");
        }

        self.host_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.state = ProtocolState::AwaitingProcess;
        self.last_frames = 0;

        let host = sample_rate.round() as usize;
        let model = self.model_rate.round() as usize;
        self.resampled = if host == model {
            None
        } else {
            Some(ResampledPath::new(host, model, max_block_size)?)
        };

        let warmup_frames = match &self.resampled {
            Some(path) => path.model_chunk,
            None => max_block_size,
        };
        let silence = vec![0.0; warmup_frames];
        let mut scratch = vec![0.0; warmup_frames];
        self.engine.prewarm();
        self.engine.process(&silence, &mut scratch);
        self.engine.finalize(warmup_frames);

        debug!(
            "Model prepared: host {} Hz, model {} Hz, max block {}, latency {}",
            self.host_rate,
            self.model_rate,
            self.max_block_size,
            self.latency()
        );
        Ok(())
    }

    /// Process one host block. `output` must be at least as long as `input`.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> FinalizeTicket {
        assert!(
            self.state == ProtocolState::AwaitingProcess,
            "process called while awaiting finalize"
        );
        let frames = input.len();
        assert!(
            frames <= self.max_block_size,
            "block of {frames} frames exceeds max block size {}",
            self.max_block_size
        );
        assert!(
            output.len() >= frames,
            "output of {} frames is shorter than input of {frames}",
            output.len()
        );

        let output = &mut output[..frames];
        match self.resampled.as_mut() {
            Some(path) => path.process(self.engine.as_mut(), input, output),
            None => self.engine.process(input, output),
        }

        self.state = ProtocolState::AwaitingFinalize;
        self.last_frames = frames;
        FinalizeTicket {
            owner: self.id,
            frames,
        }
    }

    /// Commit the block produced by the matching `process` call.
    pub fn finalize(&mut self, ticket: FinalizeTicket) {
        assert!(
            self.state == ProtocolState::AwaitingFinalize,
            "finalize called without a pending process"
        );
        assert!(
            ticket.frames == self.last_frames,
            "finalize ticket for {} frames does not match processed {}",
            ticket.frames,
            self.last_frames
        );
        assert!(
            ticket.owner == self.id,
            "finalize ticket belongs to a different model"
        );

        if self.resampled.is_none() {
            self.engine.finalize(ticket.frames);
        }
        self.state = ProtocolState::AwaitingProcess;
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn is_resampling(&self) -> bool {
        self.resampled.is_some()
    }

    /// Added delay in host frames.
    pub fn latency(&self) -> usize {
        self.resampled.as_ref().map_or(0, |path| path.latency)
    }

    pub fn host_sample_rate(&self) -> f64 {
        self.host_rate
    }

    pub fn model_sample_rate(&self) -> f64 {
        self.model_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn loudness(&self) -> Option<f64> {
        self.engine.loudness()
    }

    /// Drop any queued audio without rebuilding. Real-time safe.
    pub fn flush(&mut self) {
        if let Some(path) = self.resampled.as_mut() {
            path.clear();
        }
        self.state = ProtocolState::AwaitingProcess;
    }
}
