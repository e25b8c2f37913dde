use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::amp::AmpSection;
use crate::audio::buffer::AudioBuffer;
use crate::audio::limiter::SafetyLimiter;
use crate::audio::peak_meter::{PeakMeter, PeakMeterHandle, PeakMeterInfo};
use crate::chain::{Chain, Stage, default_chain};
use crate::dsp::db_to_lin;
use crate::model::{InferenceEngine, ModelLoader};
use crate::params::{ParamId, Parameters};
use crate::pedals::ProcessSpec;

/// Audio-thread side of the processor.
///
/// Owns every stage and all scratch buffers. `process` runs the chain over
/// one block without locking, blocking or allocating.
pub struct Engine {
    params: Arc<Parameters>,
    chain: Chain,
    amp: AmpSection,
    /// Input, pre-amp pedals and the amp section run on one channel.
    mono: AudioBuffer,
    output: AudioBuffer,
    input_meter: PeakMeter,
    output_meter: PeakMeter,
    limiter: SafetyLimiter,
    sample_rate: f64,
    max_block_size: usize,
    num_channels: usize,
}

/// Control-side handle: model loading, parameters and status.
#[derive(Clone)]
pub struct EngineHandle {
    params: Arc<Parameters>,
    loader: ModelLoader,
    gating: Arc<AtomicBool>,
    input_meter: PeakMeterHandle,
    output_meter: PeakMeterHandle,
}

fn validate_format(sample_rate: f64, max_block_size: usize) -> Result<()> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        bail!("invalid sample rate {sample_rate}");
    }
    if max_block_size == 0 {
        bail!("max block size must be positive");
    }
    Ok(())
}

impl Engine {
    pub fn new(
        sample_rate: f64,
        max_block_size: usize,
        num_channels: usize,
    ) -> Result<(Self, EngineHandle)> {
        Self::with_chain(sample_rate, max_block_size, num_channels, default_chain())
    }

    /// Build an engine around a custom chain.
    pub fn with_chain(
        sample_rate: f64,
        max_block_size: usize,
        num_channels: usize,
        chain: Chain,
    ) -> Result<(Self, EngineHandle)> {
        validate_format(sample_rate, max_block_size)?;
        if num_channels < 2 {
            bail!("at least 2 output channels are required, got {num_channels}");
        }

        let params = Arc::new(Parameters::new());
        let (amp, loader) =
            AmpSection::new(sample_rate, max_block_size).context("failed to create amp section")?;
        let (input_meter, input_meter_handle) = PeakMeter::new(sample_rate as usize);
        let (output_meter, output_meter_handle) = PeakMeter::new(sample_rate as usize);
        let gating = amp.gating_flag();

        let mut engine = Self {
            params: Arc::clone(&params),
            chain,
            amp,
            mono: AudioBuffer::new(1, max_block_size),
            output: AudioBuffer::new(num_channels, max_block_size),
            input_meter,
            output_meter,
            limiter: SafetyLimiter::default(),
            sample_rate,
            max_block_size,
            num_channels,
        };
        engine.prepare_chain();

        info!(
            "Engine ready: {sample_rate} Hz, {max_block_size} frames, {num_channels} channels, {} stages",
            engine.chain.len()
        );

        Ok((
            engine,
            EngineHandle {
                params,
                loader,
                gating,
                input_meter: input_meter_handle,
                output_meter: output_meter_handle,
            },
        ))
    }

    /// Reconfigure for a new session. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        validate_format(sample_rate, max_block_size)?;
        self.amp
            .prepare(sample_rate, max_block_size)
            .context("failed to prepare amp section")?;

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.mono = AudioBuffer::new(1, max_block_size);
        self.output = AudioBuffer::new(self.num_channels, max_block_size);
        self.input_meter.set_sample_rate(sample_rate as usize);
        self.output_meter.set_sample_rate(sample_rate as usize);
        self.input_meter.reset();
        self.output_meter.reset();
        self.prepare_chain();

        debug!("Engine prepared: {sample_rate} Hz, {max_block_size} frames");
        Ok(())
    }

    /// Pedals before dual mono get one channel, pedals after it get all.
    fn prepare_chain(&mut self) {
        let mut num_channels = 1;
        for entry in self.chain.entries_mut() {
            match &mut entry.stage {
                Stage::DualMono => num_channels = self.num_channels,
                Stage::Pedal { pedal, .. } => pedal.prepare(&ProcessSpec {
                    sample_rate: self.sample_rate as f32,
                    max_block_size: self.max_block_size,
                    num_channels,
                }),
                _ => {}
            }
        }
    }

    /// Clear all DSP state without touching the loaded model.
    pub fn reset(&mut self) {
        self.amp.reset();
        for entry in self.chain.entries_mut() {
            if let Stage::Pedal { pedal, .. } = &mut entry.stage {
                pedal.reset();
            }
        }
        self.input_meter.reset();
        self.output_meter.reset();
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Process one block: mono `input`, one slice per output channel.
    ///
    /// Output channels past `num_channels` are zeroed.
    pub fn process(&mut self, input: &[f32], outputs: &mut [&mut [f32]]) -> Result<()> {
        let frames = input.len();
        if frames > self.max_block_size {
            bail!(
                "block of {frames} frames exceeds max block size {}",
                self.max_block_size
            );
        }
        if outputs.len() < self.num_channels {
            bail!(
                "expected {} output channels, got {}",
                self.num_channels,
                outputs.len()
            );
        }
        if outputs.iter().any(|channel| channel.len() < frames) {
            bail!("output channel shorter than the {frames}-frame block");
        }

        self.amp.apply_staging();

        self.mono.set_frames(frames);
        self.output.set_frames(frames);
        self.mono.channel_mut(0).copy_from_slice(input);

        let params = &*self.params;
        let mut widened = false;

        for entry in self.chain.entries_mut() {
            if !entry.is_enabled(params) {
                continue;
            }
            if matches!(entry.stage, Stage::DualMono) {
                if !widened {
                    dual_mono(&self.mono, &mut self.output);
                    widened = true;
                }
                continue;
            }

            let buffer = if widened {
                &mut self.output
            } else {
                &mut self.mono
            };

            match &mut entry.stage {
                Stage::InputGain => {
                    buffer.apply_gain(db_to_lin(params.get(ParamId::PluginInputGain)));
                }
                Stage::InputMeter => self.input_meter.process(buffer),
                Stage::Pedal { pedal, bindings } => {
                    for (name, id) in bindings.iter() {
                        let accepted = pedal.set_parameter(name, params.get(*id));
                        debug_assert!(accepted.is_ok(), "{} rejected {name}", pedal.name());
                    }
                    pedal.process(buffer);
                }
                Stage::AmpSection => self.amp.process(params, buffer.channel_mut(0)),
                Stage::OutputGain => {
                    buffer.apply_gain(db_to_lin(params.get(ParamId::PluginOutputGain)));
                }
                Stage::SafetyLimiter => self.limiter.process(buffer),
                Stage::OutputMeter => self.output_meter.process(buffer),
                Stage::DualMono => {}
            }
        }

        if !widened {
            dual_mono(&self.mono, &mut self.output);
        }

        for (c, out) in outputs.iter_mut().enumerate() {
            if c < self.num_channels {
                out[..frames].copy_from_slice(self.output.channel(c));
            } else {
                out[..frames].fill(0.0);
            }
        }

        Ok(())
    }
}

fn dual_mono(mono: &AudioBuffer, output: &mut AudioBuffer) {
    let source = mono.channel(0);
    for channel in output.channels_mut() {
        channel.copy_from_slice(source);
    }
}

impl EngineHandle {
    /// Load a model file and stage it. Failures are logged and leave the
    /// current model in place.
    pub fn load_model(&self, path: impl AsRef<Path>) -> bool {
        self.loader.load_model(path.as_ref())
    }

    pub fn try_load_model(&self, path: impl AsRef<Path>) -> Result<()> {
        self.loader.try_load_model(path.as_ref())
    }

    pub fn load_model_from_bytes(&self, bytes: &[u8]) -> bool {
        self.loader.load_model_from_bytes(bytes)
    }

    /// Stage an already constructed engine.
    pub fn stage_engine(&self, engine: Box<dyn InferenceEngine>) -> Result<()> {
        self.loader.stage_engine(engine)
    }

    /// Remove the live model at the next block.
    pub fn clear_model(&self) {
        self.loader.clear_model();
    }

    pub fn is_model_loaded(&self) -> bool {
        self.loader.is_model_loaded()
    }

    pub fn is_gating(&self) -> bool {
        self.gating.load(Ordering::Relaxed)
    }

    /// Latency of the live model in host frames.
    pub fn latency(&self) -> usize {
        self.loader.latency()
    }

    pub fn set_parameter(&self, id: ParamId, value: f32) {
        self.params.set(id, value);
    }

    pub fn set_parameter_by_name(&self, name: &str, value: f32) -> Result<()> {
        let id = ParamId::from_name(name).ok_or_else(|| anyhow!("unknown parameter '{name}'"))?;
        self.params.set(id, value);
        Ok(())
    }

    /// Current value, clamped to the parameter's range.
    pub fn parameter(&self, id: ParamId) -> f32 {
        self.params.get(id)
    }

    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.params
    }

    pub fn input_meter(&self) -> PeakMeterInfo {
        self.input_meter.get_info()
    }

    pub fn output_meter(&self) -> PeakMeterInfo {
        self.output_meter.get_info()
    }
}
