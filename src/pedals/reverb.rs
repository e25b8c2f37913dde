use crate::audio::buffer::AudioBuffer;
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

/// Tunings are given at 44.1 kHz and scaled to the session rate.
const TUNING_SAMPLE_RATE: f32 = 44_100.0;
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

const ALLPASS_FEEDBACK: f32 = 0.5;
const INPUT_GAIN: f32 = 0.015;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const WET_SCALE: f32 = 3.0;

struct Comb {
    line: Vec<f32>,
    pos: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            line: vec![0.0; len.max(1)],
            pos: 0,
            store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.line[self.pos];
        self.store = output.mul_add(1.0 - damp, self.store * damp);
        self.line[self.pos] = self.store.mul_add(feedback, input);
        self.pos = (self.pos + 1) % self.line.len();
        output
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.pos = 0;
        self.store = 0.0;
    }
}

struct Allpass {
    line: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            line: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.line[self.pos];
        self.line[self.pos] = ALLPASS_FEEDBACK.mul_add(buffered, input);
        self.pos = (self.pos + 1) % self.line.len();
        buffered - input
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.pos = 0;
    }
}

/// One Schroeder-Moorer tank: parallel damped combs into series allpasses.
struct Tank {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Tank {
    fn new(sample_rate: f32, spread: usize) -> Self {
        let scale = |tuning: usize| {
            ((tuning + spread) as f32 * sample_rate / TUNING_SAMPLE_RATE).round() as usize
        };
        Self {
            combs: COMB_TUNINGS.iter().map(|&t| Comb::new(scale(t))).collect(),
            allpasses: ALLPASS_TUNINGS
                .iter()
                .map(|&t| Allpass::new(scale(t)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
    }
}

/// Freeverb-style room reverb. Stereo buffers get a second tank with
/// slightly longer delay lines for width; mono buffers use only the first.
pub struct ReverbPedal {
    mix: f32,
    tone: f32,
    size: f32,
    tanks: Vec<Tank>,
}

impl Default for ReverbPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverbPedal {
    pub fn new() -> Self {
        Self {
            mix: 3.0,
            tone: 5.0,
            size: 5.0,
            tanks: Vec::new(),
        }
    }

    fn feedback(&self) -> f32 {
        (self.size / 10.0).mul_add(ROOM_SCALE, ROOM_OFFSET)
    }

    fn damping(&self) -> f32 {
        self.tone / 10.0 * DAMP_SCALE
    }
}

impl Pedal for ReverbPedal {
    fn name(&self) -> &'static str {
        "reverb"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        let tanks = spec.num_channels.clamp(1, 2);
        self.tanks = (0..tanks)
            .map(|i| Tank::new(spec.sample_rate, i * STEREO_SPREAD))
            .collect();
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "mix" => self.mix = clamp_param(value, 0.0, 10.0),
            "tone" => self.tone = clamp_param(value, 0.0, 10.0),
            "size" => self.size = clamp_param(value, 0.0, 10.0),
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.tanks.is_empty() || buffer.num_channels() == 0 {
            return;
        }
        let wet = self.mix / 10.0;
        let dry = 1.0 - wet;
        let wet = wet * WET_SCALE;
        let feedback = self.feedback();
        let damp = self.damping();

        if buffer.num_channels() >= 2 && self.tanks.len() == 2 {
            let (left, right) = buffer.stereo_mut();
            let (tank_l, tank_r) = self.tanks.split_at_mut(1);
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let input = (*l + *r) * INPUT_GAIN;
                let out_l = tank_l[0].process(input, feedback, damp);
                let out_r = tank_r[0].process(input, feedback, damp);
                *l = dry.mul_add(*l, wet * out_l);
                *r = dry.mul_add(*r, wet * out_r);
            }
        } else {
            let tank = &mut self.tanks[0];
            for sample in buffer.channel_mut(0).iter_mut() {
                let out = tank.process(*sample * INPUT_GAIN, feedback, damp);
                *sample = dry.mul_add(*sample, wet * out);
            }
        }
    }

    fn reset(&mut self) {
        self.tanks.iter_mut().for_each(Tank::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(channels: usize) -> ReverbPedal {
        let mut reverb = ReverbPedal::new();
        reverb.prepare(&ProcessSpec {
            sample_rate: 48_000.0,
            max_block_size: 4_800,
            num_channels: channels,
        });
        reverb
    }

    #[test]
    fn zero_mix_is_dry() {
        let mut reverb = prepared(2);
        reverb.set_parameter("mix", 0.0).unwrap();
        let mut buffer = AudioBuffer::new(2, 256);
        buffer.channel_mut(0).fill(0.4);
        buffer.channel_mut(1).fill(-0.2);
        reverb.process(&mut buffer);
        assert!(buffer.channel(0).iter().all(|s| (*s - 0.4).abs() < 1e-6));
        assert!(buffer.channel(1).iter().all(|s| (*s + 0.2).abs() < 1e-6));
    }

    #[test]
    fn impulse_leaves_a_decaying_tail() {
        let mut reverb = prepared(2);
        reverb.set_parameter("mix", 10.0).unwrap();
        let mut buffer = AudioBuffer::new(2, 4_800);
        buffer.channel_mut(0)[0] = 1.0;
        buffer.channel_mut(1)[0] = 1.0;
        reverb.process(&mut buffer);
        let early: f32 = buffer.channel(0).iter().map(|s| s * s).sum();
        assert!(early > 0.0, "no reverb tail");

        let mut later = 0.0;
        for _ in 0..20 {
            buffer.clear();
            reverb.process(&mut buffer);
            later = buffer.channel(0).iter().map(|s| s * s).sum::<f32>();
        }
        assert!(later < early, "tail does not decay: {later} >= {early}");
    }

    #[test]
    fn stereo_tanks_differ() {
        let mut reverb = prepared(2);
        reverb.set_parameter("mix", 10.0).unwrap();
        let mut buffer = AudioBuffer::new(2, 4_800);
        buffer.channel_mut(0)[0] = 1.0;
        reverb.process(&mut buffer);
        assert_ne!(buffer.channel(0), buffer.channel(1));
    }
}
