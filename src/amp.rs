use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::dsp::db_to_lin;
use crate::gate::{NoiseGate, TriggerParams};
use crate::model::{ModelHost, ModelLoader};
use crate::params::{GATE_DISABLED_BELOW_DB, ParamId, Parameters};
use crate::tonestack::ToneStack;

/// The mono amp block: gate detector, model, gate gain, tone stack and amp
/// output level, in that order.
pub struct AmpSection {
    host: ModelHost,
    gate: NoiseGate,
    tone_stack: ToneStack,
}

impl AmpSection {
    pub fn new(sample_rate: f64, max_block_size: usize) -> Result<(Self, ModelLoader)> {
        let (host, loader) = ModelHost::new(sample_rate, max_block_size)?;
        Ok((
            Self {
                host,
                gate: NoiseGate::new(sample_rate, 1, max_block_size),
                tone_stack: ToneStack::new(sample_rate as f32),
            },
            loader,
        ))
    }

    /// Resize for a new session. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        self.host.prepare(sample_rate, max_block_size)?;
        self.gate.prepare(sample_rate, 1, max_block_size);
        self.tone_stack.prepare(sample_rate as f32);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.gate.reset();
        self.tone_stack.reset();
    }

    /// Promote or remove models. Call once at the start of every block.
    #[inline]
    pub fn apply_staging(&mut self) {
        self.host.apply_staging();
    }

    pub fn gating_flag(&self) -> Arc<AtomicBool> {
        self.gate.gating_flag()
    }

    pub fn host(&self) -> &ModelHost {
        &self.host
    }

    pub fn process(&mut self, params: &Parameters, samples: &mut [f32]) {
        let threshold = params.get(ParamId::NoiseGateThreshold);
        let gate_active = threshold >= GATE_DISABLED_BELOW_DB;

        if gate_active {
            self.gate.detect(trigger_params(params, threshold), 0, samples);
        } else {
            self.gate.bypass();
        }

        self.host.process(
            params.get(ParamId::AmpInputLevel),
            params.get_bool(ParamId::OutputNormalize),
            samples,
        );

        if gate_active {
            self.gate.apply(0, samples);
        }

        if params.get_bool(ParamId::ToneStackEnabled) {
            self.tone_stack.set_knobs(
                params.get(ParamId::ToneBass),
                params.get(ParamId::ToneMid),
                params.get(ParamId::ToneTreble),
            );
            self.tone_stack.process(samples);
        }

        let output_gain = db_to_lin(params.get(ParamId::AmpOutputLevel));
        if output_gain != 1.0 {
            for sample in samples.iter_mut() {
                *sample *= output_gain;
            }
        }
    }
}

fn trigger_params(params: &Parameters, threshold_db: f32) -> TriggerParams {
    TriggerParams {
        time: f64::from(params.get(ParamId::GateTime)),
        threshold_db: f64::from(threshold_db),
        ratio: f64::from(params.get(ParamId::GateRatio)),
        open_time: f64::from(params.get(ParamId::GateOpenTime)),
        hold_time: f64::from(params.get(ParamId::GateHoldTime)),
        close_time: f64::from(params.get(ParamId::GateCloseTime)),
    }
}
