use crate::audio::buffer::AudioBuffer;
use crate::dsp::{EnvelopeFollower, calculate_coefficient, db_to_lin};
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

const THRESHOLD_DB: f32 = -25.0;
const RATIO: f32 = 3.0;

/// Pick-friendly compressor: fixed threshold and ratio, adjustable attack,
/// sustain (release) and output volume.
pub struct CompressorPedal {
    attack_ms: f32,
    sustain_ms: f32,
    volume: f32,
    threshold: f32,
    sample_rate: f32,
    envelopes: Vec<EnvelopeFollower>,
}

impl Default for CompressorPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressorPedal {
    pub fn new() -> Self {
        Self {
            attack_ms: 26.38,
            sustain_ms: 263.75,
            volume: 5.0,
            threshold: db_to_lin(THRESHOLD_DB),
            sample_rate: 48_000.0,
            envelopes: Vec::new(),
        }
    }

    fn update_attack(&mut self, attack_ms: f32) {
        self.attack_ms = attack_ms;
        let coeff = calculate_coefficient(attack_ms, self.sample_rate);
        for env in &mut self.envelopes {
            env.set_attack_coeff(coeff);
        }
    }

    fn update_release(&mut self, sustain_ms: f32) {
        self.sustain_ms = sustain_ms;
        let coeff = calculate_coefficient(sustain_ms, self.sample_rate);
        for env in &mut self.envelopes {
            env.set_release_coeff(coeff);
        }
    }

    #[inline]
    fn gain_for(&self, envelope: f32) -> f32 {
        let over_threshold = (envelope / self.threshold).max(1.0);
        if over_threshold > 1.0 {
            over_threshold.powf((1.0 / RATIO) - 1.0)
        } else {
            1.0
        }
    }
}

impl Pedal for CompressorPedal {
    fn name(&self) -> &'static str {
        "compressor"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        self.envelopes = vec![
            EnvelopeFollower::from_ms(self.attack_ms, self.sustain_ms, spec.sample_rate);
            spec.num_channels
        ];
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "volume" => self.volume = clamp_param(value, 0.0, 10.0),
            "attack" => {
                let attack = clamp_param(value, 5.0, 50.0);
                if attack != self.attack_ms {
                    self.update_attack(attack);
                }
            }
            "sustain" => {
                let sustain = clamp_param(value, 50.0, 500.0);
                if sustain != self.sustain_ms {
                    self.update_release(sustain);
                }
            }
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        // 5 on the volume knob is unity.
        let makeup = self.volume / 5.0;
        let channels = buffer.num_channels().min(self.envelopes.len());

        for c in 0..channels {
            let samples = buffer.channel_mut(c);
            for sample in samples.iter_mut() {
                let env = self.envelopes[c].process(sample.abs().max(1e-10));
                *sample *= self.gain_for(env) * makeup;
            }
        }
    }

    fn reset(&mut self) {
        for env in &mut self.envelopes {
            env.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared() -> CompressorPedal {
        let mut comp = CompressorPedal::new();
        comp.prepare(&ProcessSpec {
            sample_rate: 48_000.0,
            max_block_size: 512,
            num_channels: 1,
        });
        comp
    }

    #[test]
    fn quiet_signal_is_untouched_at_unity_volume() {
        let mut comp = prepared();
        let mut buffer = AudioBuffer::new(1, 512);
        buffer.channel_mut(0).fill(0.01);
        comp.process(&mut buffer);
        assert!(buffer.channel(0).iter().all(|s| (s - 0.01).abs() < 1e-6));
    }

    #[test]
    fn loud_signal_is_reduced() {
        let mut comp = prepared();
        let mut buffer = AudioBuffer::new(1, 512);
        for _ in 0..200 {
            buffer.channel_mut(0).fill(0.9);
            comp.process(&mut buffer);
        }
        let out = buffer.channel(0)[511];
        assert!(out < 0.5, "expected compression, got {out}");
    }

    #[test]
    fn volume_scales_output() {
        let mut comp = prepared();
        comp.set_parameter("volume", 10.0).unwrap();
        let mut buffer = AudioBuffer::new(1, 16);
        buffer.channel_mut(0).fill(0.01);
        comp.process(&mut buffer);
        assert!((buffer.channel(0)[0] - 0.02).abs() < 1e-6);
    }
}
