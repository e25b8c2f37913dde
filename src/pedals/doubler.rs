use crate::audio::buffer::AudioBuffer;
use crate::dsp::calculate_coefficient;
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

const MAX_SPREAD_MS: f32 = 20.0;
const SMOOTH_TIME_MS: f32 = 30.0;

/// Haas-style stereo doubler: the right channel is a short delayed copy of
/// itself, the left channel is untouched. Mono buffers pass through.
pub struct DoublerPedal {
    spread_ms: f32,
    sample_rate: f32,
    line: Vec<f32>,
    write_pos: usize,
    delay_smoothed: f32,
    smooth_coeff: f32,
}

impl Default for DoublerPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl DoublerPedal {
    pub fn new() -> Self {
        Self {
            spread_ms: 0.0,
            sample_rate: 48_000.0,
            line: Vec::new(),
            write_pos: 0,
            delay_smoothed: 0.0,
            smooth_coeff: 0.0,
        }
    }

    fn target_samples(&self) -> f32 {
        self.spread_ms * 0.001 * self.sample_rate
    }
}

impl Pedal for DoublerPedal {
    fn name(&self) -> &'static str {
        "doubler"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        let len = (MAX_SPREAD_MS * 0.001 * spec.sample_rate) as usize + 2;
        self.line = vec![0.0; len];
        self.write_pos = 0;
        self.smooth_coeff = calculate_coefficient(SMOOTH_TIME_MS, spec.sample_rate);
        self.delay_smoothed = self.target_samples();
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "spread" => {
                self.spread_ms = clamp_param(value, 0.0, MAX_SPREAD_MS);
                Ok(())
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if buffer.num_channels() < 2 || self.line.is_empty() {
            return;
        }
        let target = self.target_samples();
        let len = self.line.len();
        let (_, right) = buffer.stereo_mut();

        for sample in right.iter_mut() {
            self.delay_smoothed = self
                .smooth_coeff
                .mul_add(self.delay_smoothed, (1.0 - self.smooth_coeff) * target);

            self.line[self.write_pos] = *sample;
            let read_pos = self.write_pos as f32 - self.delay_smoothed + len as f32;
            let idx = read_pos as usize % len;
            let next = (idx + 1) % len;
            let frac = read_pos.fract();
            *sample = (1.0 - frac).mul_add(self.line[idx], frac * self.line[next]);

            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    fn reset(&mut self) {
        self.line.fill(0.0);
        self.write_pos = 0;
        self.delay_smoothed = self.target_samples();
    }
}
