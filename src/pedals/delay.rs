use crate::audio::buffer::AudioBuffer;
use crate::dsp::{Biquad, BiquadCoeffs, calculate_coefficient};
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

const MAX_DELAY_MS: f32 = 1000.0;
const SMOOTH_TIME_MS: f32 = 50.0;
/// Repeats lose lows and highs on every pass.
const REPEAT_HIGH_PASS_HZ: f32 = 82.5;
const REPEAT_LOW_PASS_HZ: f32 = 9_250.0;

/// Mono echo with filtered repeats.
///
/// Reads channel 0, writes the same result to every channel. Uses a
/// pre-allocated ring buffer with linear interpolation for fractional delay
/// lengths and one-pole smoothing on the delay time to prevent clicks when
/// the time knob moves.
pub struct DelayPedal {
    time_ms: f32,
    feedback: f32,
    mix: f32,
    sample_rate: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples_smoothed: f32,
    delay_samples_target: f32,
    smooth_coeff: f32,
    high_pass: Biquad,
    low_pass: Biquad,
    last_repeat: f32,
}

impl Default for DelayPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayPedal {
    pub fn new() -> Self {
        Self {
            time_ms: 250.0,
            feedback: 0.5,
            mix: 0.5,
            sample_rate: 48_000.0,
            buffer: Vec::new(),
            write_pos: 0,
            delay_samples_smoothed: 0.0,
            delay_samples_target: 0.0,
            smooth_coeff: 0.0,
            high_pass: Biquad::default(),
            low_pass: Biquad::default(),
            last_repeat: 0.0,
        }
    }

    fn update_delay_target(&mut self) {
        self.delay_samples_target = self.time_ms * 0.001 * self.sample_rate;
    }

    #[inline]
    fn process_sample(&mut self, input: f32) -> f32 {
        self.delay_samples_smoothed = self.smooth_coeff.mul_add(
            self.delay_samples_smoothed,
            (1.0 - self.smooth_coeff) * self.delay_samples_target,
        );

        let buf_len = self.buffer.len();
        let read_pos = self.write_pos as f32 - self.delay_samples_smoothed + buf_len as f32;
        let read_idx = read_pos as usize % buf_len;
        let frac = read_pos.fract();
        let next_idx = (read_idx + 1) % buf_len;
        let delayed = (1.0 - frac).mul_add(self.buffer[read_idx], frac * self.buffer[next_idx]);

        let repeat = self.low_pass.process(self.high_pass.process(delayed));

        self.buffer[self.write_pos] = self.feedback.mul_add(self.last_repeat, input);
        self.write_pos = (self.write_pos + 1) % buf_len;
        self.last_repeat = repeat;

        self.mix.mul_add(repeat, input)
    }
}

impl Pedal for DelayPedal {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        let max_samples = (MAX_DELAY_MS * 0.001 * spec.sample_rate) as usize + 2;
        self.buffer = vec![0.0; max_samples];
        self.write_pos = 0;
        self.smooth_coeff = calculate_coefficient(SMOOTH_TIME_MS, spec.sample_rate);
        self.update_delay_target();
        self.delay_samples_smoothed = self.delay_samples_target;
        self.high_pass = Biquad::new(BiquadCoeffs::high_pass(
            REPEAT_HIGH_PASS_HZ,
            0.707,
            spec.sample_rate,
        ));
        self.low_pass = Biquad::new(BiquadCoeffs::low_pass(
            REPEAT_LOW_PASS_HZ,
            0.707,
            spec.sample_rate,
        ));
        self.last_repeat = 0.0;
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "time" => {
                self.time_ms = clamp_param(value, 1.0, MAX_DELAY_MS);
                self.update_delay_target();
            }
            "feedback" => self.feedback = clamp_param(value, 0.0, 1.0),
            "mix" => self.mix = clamp_param(value, 0.0, 1.2),
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.buffer.is_empty() || buffer.num_channels() == 0 {
            return;
        }
        for sample in buffer.channel_mut(0).iter_mut() {
            *sample = self.process_sample(*sample);
        }
        buffer.duplicate_first_channel();
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.high_pass.reset();
        self.low_pass.reset();
        self.last_repeat = 0.0;
        self.delay_samples_smoothed = self.delay_samples_target;
    }
}
