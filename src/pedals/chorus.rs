use std::f32::consts::TAU;

use crate::audio::buffer::AudioBuffer;
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

const CENTRE_DELAY_MS: f32 = 7.0;
const MAX_MODULATION_MS: f32 = 20.0;
const FEEDBACK: f32 = 0.5;

struct Voice {
    line: Vec<f32>,
    write_pos: usize,
}

impl Voice {
    fn new(len: usize) -> Self {
        Self {
            line: vec![0.0; len],
            write_pos: 0,
        }
    }

    #[inline]
    fn read(&self, delay_samples: f32) -> f32 {
        let len = self.line.len();
        let read_pos = self.write_pos as f32 - delay_samples + len as f32;
        let idx = read_pos as usize % len;
        let next = (idx + 1) % len;
        let frac = read_pos.fract();
        (1.0 - frac).mul_add(self.line[idx], frac * self.line[next])
    }

    #[inline]
    fn push(&mut self, value: f32) {
        self.line[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.line.len();
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.write_pos = 0;
    }
}

/// Modulated-delay chorus. Each channel's LFO is offset by a quarter cycle.
pub struct ChorusPedal {
    rate: f32,
    depth: f32,
    mix: f32,
    sample_rate: f32,
    phase: f32,
    voices: Vec<Voice>,
}

impl Default for ChorusPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl ChorusPedal {
    pub fn new() -> Self {
        Self {
            rate: 0.8,
            depth: 0.03,
            mix: 50.0,
            sample_rate: 48_000.0,
            phase: 0.0,
            voices: Vec::new(),
        }
    }
}

impl Pedal for ChorusPedal {
    fn name(&self) -> &'static str {
        "chorus"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        let max_ms = CENTRE_DELAY_MS + MAX_MODULATION_MS;
        let len = (max_ms * 0.001 * spec.sample_rate) as usize + 4;
        self.voices = (0..spec.num_channels).map(|_| Voice::new(len)).collect();
        self.phase = 0.0;
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "rate" => self.rate = clamp_param(value, 0.3, 3.0),
            "depth" => self.depth = clamp_param(value, 0.0, 0.2),
            "mix" => self.mix = clamp_param(value, 0.0, 100.0),
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let wet = self.mix / 100.0;
        let dry = 1.0 - wet;
        let phase_inc = self.rate / self.sample_rate;
        let ms_to_samples = 0.001 * self.sample_rate;
        let frames = buffer.frames();
        let channels = buffer.num_channels().min(self.voices.len());
        let start_phase = self.phase;

        for c in 0..channels {
            let voice = &mut self.voices[c];
            let offset = c as f32 * 0.25;
            let mut phase = start_phase;
            for sample in buffer.channel_mut(c).iter_mut() {
                let lfo = (TAU * (phase + offset)).sin();
                let delay_ms = (CENTRE_DELAY_MS + self.depth * MAX_MODULATION_MS * lfo).max(0.5);
                let delayed = voice.read(delay_ms * ms_to_samples);
                voice.push(FEEDBACK.mul_add(delayed, *sample));
                *sample = dry.mul_add(*sample, wet * delayed);
                phase = (phase + phase_inc).fract();
            }
        }

        self.phase = (start_phase + phase_inc * frames as f32).fract();
    }

    fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.clear();
        }
        self.phase = 0.0;
    }
}
