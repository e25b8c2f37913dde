use crate::audio::buffer::AudioBuffer;
use crate::dsp::{Biquad, BiquadCoeffs, db_to_lin};
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

/// The clipping loop only amplifies above this corner, giving the mid hump.
const CLIP_PATH_HZ: f32 = 720.0;
const TONE_MIN_HZ: f32 = 700.0;
const TONE_MAX_HZ: f32 = 5_000.0;

#[derive(Clone, Copy, Default)]
struct ChannelState {
    clip_hp: Biquad,
    tone_lp: Biquad,
}

/// Green-box style overdrive: a high-passed copy of the signal is driven into
/// a soft diode clipper and summed with the dry signal, then low-passed by the
/// tone knob and scaled by the level knob.
pub struct OverdrivePedal {
    drive: f32,
    tone: f32,
    level: f32,
    sample_rate: f32,
    channels: Vec<ChannelState>,
}

impl Default for OverdrivePedal {
    fn default() -> Self {
        Self::new()
    }
}

impl OverdrivePedal {
    pub fn new() -> Self {
        Self {
            drive: 5.0,
            tone: 5.0,
            level: 5.0,
            sample_rate: 48_000.0,
            channels: Vec::new(),
        }
    }

    fn tone_coeffs(&self) -> BiquadCoeffs {
        // Logarithmic sweep across the tone range.
        let t = self.tone / 10.0;
        let freq = TONE_MIN_HZ * (TONE_MAX_HZ / TONE_MIN_HZ).powf(t);
        BiquadCoeffs::first_order_low_pass(freq, self.sample_rate)
    }

    #[inline]
    fn drive_gain(&self) -> f32 {
        // 0..10 maps to +6..+46 dB in the clipping loop.
        db_to_lin(6.0 + self.drive * 4.0)
    }

    #[inline]
    fn diode_clip(x: f32) -> f32 {
        x / (1.0 + x.abs())
    }
}

impl Pedal for OverdrivePedal {
    fn name(&self) -> &'static str {
        "overdrive"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        let state = ChannelState {
            clip_hp: Biquad::new(BiquadCoeffs::high_pass(CLIP_PATH_HZ, 0.707, spec.sample_rate)),
            tone_lp: Biquad::new(self.tone_coeffs()),
        };
        self.channels = vec![state; spec.num_channels];
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "drive" => self.drive = clamp_param(value, 0.0, 10.0),
            "tone" => {
                let tone = clamp_param(value, 0.0, 10.0);
                if tone != self.tone {
                    self.tone = tone;
                    let coeffs = self.tone_coeffs();
                    for ch in &mut self.channels {
                        ch.tone_lp.set_coeffs(coeffs);
                    }
                }
            }
            "level" => self.level = clamp_param(value, 0.0, 10.0),
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let gain = self.drive_gain();
        let level = self.level / 10.0;
        let channels = buffer.num_channels().min(self.channels.len());

        for c in 0..channels {
            let state = &mut self.channels[c];
            for sample in buffer.channel_mut(c).iter_mut() {
                let x = *sample;
                let driven = Self::diode_clip(state.clip_hp.process(x) * gain);
                let y = state.tone_lp.process(Self::diode_clip(x + driven));
                *sample = y * level;
            }
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.clip_hp.reset();
            ch.tone_lp.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_level_is_silent() {
        let mut od = OverdrivePedal::new();
        od.prepare(&ProcessSpec {
            sample_rate: 48_000.0,
            max_block_size: 64,
            num_channels: 1,
        });
        od.set_parameter("level", 0.0).unwrap();
        let mut buffer = AudioBuffer::new(1, 64);
        buffer.channel_mut(0).fill(0.5);
        od.process(&mut buffer);
        assert!(buffer.channel(0).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn output_is_bounded_by_level() {
        let mut od = OverdrivePedal::new();
        od.prepare(&ProcessSpec {
            sample_rate: 48_000.0,
            max_block_size: 512,
            num_channels: 1,
        });
        od.set_parameter("drive", 10.0).unwrap();
        od.set_parameter("level", 10.0).unwrap();
        let mut buffer = AudioBuffer::new(1, 512);
        for (n, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = 10.0 * (n as f32 * 0.1).sin();
        }
        od.process(&mut buffer);
        assert!(buffer.channel(0).iter().all(|s| s.abs() <= 1.0));
    }
}
