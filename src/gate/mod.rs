//! Noise gate: a detector that computes gain reduction and a gain stage that
//! applies it.

pub mod gain;
pub mod trigger;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use gain::GateGain;
pub use trigger::{GateMode, Trigger, TriggerParams};

pub struct NoiseGate {
    trigger: Trigger,
    gain: GateGain,
    gating_flag: Arc<AtomicBool>,
}

impl NoiseGate {
    pub fn new(sample_rate: f64, num_channels: usize, max_frames: usize) -> Self {
        let trigger = Trigger::new(
            TriggerParams::noise_gate(-80.0),
            sample_rate,
            num_channels,
            max_frames,
        );
        let gating_flag = trigger.gating_flag();
        Self {
            trigger,
            gain: GateGain,
            gating_flag,
        }
    }

    pub fn prepare(&mut self, sample_rate: f64, num_channels: usize, max_frames: usize) {
        self.trigger.prepare(sample_rate, num_channels, max_frames);
    }

    pub fn reset(&mut self) {
        self.trigger.reset();
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Readable from any thread; true while the gate is closing or closed.
    pub fn gating_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.gating_flag)
    }

    /// Run the detector on the pre-amp signal.
    pub fn detect(&mut self, params: TriggerParams, channel: usize, samples: &[f32]) {
        self.trigger.set_params(params);
        self.trigger.process(channel, samples);
    }

    /// Apply the reduction computed by the last `detect` on `channel`.
    pub fn apply(&self, channel: usize, samples: &mut [f32]) {
        self.gain
            .apply(self.trigger.gain_reduction_db(channel), samples);
    }

    /// Detect and apply on the same signal.
    pub fn process(&mut self, params: TriggerParams, channel: usize, samples: &mut [f32]) {
        self.detect(params, channel, samples);
        self.apply(channel, samples);
    }

    /// Skip the gate for this block.
    pub fn bypass(&mut self) {
        self.gating_flag.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_gate_silences_quiet_input() {
        let mut gate = NoiseGate::new(48_000.0, 1, 64);
        let params = TriggerParams::noise_gate(-40.0);
        let mut samples = [1.0e-4; 64];
        for _ in 0..100 {
            samples = [1.0e-4; 64];
            gate.process(params, 0, &mut samples);
        }
        assert!(samples.iter().all(|s| s.abs() < 1.0e-8));
    }

    #[test]
    fn open_gate_passes_loud_input() {
        let mut gate = NoiseGate::new(48_000.0, 1, 64);
        let params = TriggerParams::noise_gate(-80.0);
        let mut samples = [0.5; 64];
        for _ in 0..20 {
            samples = [0.5; 64];
            gate.process(params, 0, &mut samples);
        }
        assert_eq!(samples, [0.5; 64]);
        assert!(!gate.gating_flag().load(Ordering::Relaxed));
    }

    #[test]
    fn bypass_clears_gating_flag() {
        let mut gate = NoiseGate::new(48_000.0, 1, 8);
        let params = TriggerParams::noise_gate(-40.0);
        let mut samples = [0.5; 8];
        gate.process(params, 0, &mut samples);
        for _ in 0..2_000 {
            let mut silence = [0.0; 8];
            gate.process(params, 0, &mut silence);
        }
        assert!(gate.gating_flag().load(Ordering::Relaxed));
        gate.bypass();
        assert!(!gate.gating_flag().load(Ordering::Relaxed));
    }
}
