use crate::audio::buffer::AudioBuffer;
use crate::dsp::{Biquad, BiquadCoeffs, db_to_lin};
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

const TREBLE_SHELF_HZ: f32 = 1_200.0;
const TREBLE_RANGE_DB: f32 = 6.0;
/// Corner of the low-pass in front of the clipper.
const CLIP_INPUT_LP_HZ: f32 = 6_000.0;

#[derive(Clone, Copy, Default)]
struct ChannelState {
    clip_lp: Biquad,
    treble: Biquad,
}

/// Transparent overdrive: the gain knob raises the clipper drive and fades
/// the clipped path in over the clean path.
pub struct CentaurPedal {
    gain: f32,
    treble: f32,
    level: f32,
    sample_rate: f32,
    channels: Vec<ChannelState>,
}

impl Default for CentaurPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl CentaurPedal {
    pub fn new() -> Self {
        Self {
            gain: 5.0,
            treble: 5.0,
            level: 5.0,
            sample_rate: 48_000.0,
            channels: Vec::new(),
        }
    }

    fn treble_coeffs(&self) -> BiquadCoeffs {
        let gain_db = (self.treble / 5.0 - 1.0) * TREBLE_RANGE_DB;
        BiquadCoeffs::high_shelf(TREBLE_SHELF_HZ, 0.707, gain_db, self.sample_rate)
    }
}

impl Pedal for CentaurPedal {
    fn name(&self) -> &'static str {
        "centaur"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        let state = ChannelState {
            clip_lp: Biquad::new(BiquadCoeffs::low_pass(CLIP_INPUT_LP_HZ, 0.707, spec.sample_rate)),
            treble: Biquad::new(self.treble_coeffs()),
        };
        self.channels = vec![state; spec.num_channels];
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "gain" => self.gain = clamp_param(value, 0.0, 10.0),
            "treble" => {
                let treble = clamp_param(value, 0.0, 10.0);
                if treble != self.treble {
                    self.treble = treble;
                    let coeffs = self.treble_coeffs();
                    for ch in &mut self.channels {
                        ch.treble.set_coeffs(coeffs);
                    }
                }
            }
            "level" => self.level = clamp_param(value, 0.0, 10.0),
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let amount = self.gain / 10.0;
        let drive = db_to_lin(amount * 36.0);
        // Clean path dominates at low gain, clipped path at high gain.
        let wet = amount.sqrt();
        let dry = 1.0 - 0.5 * amount;
        let level = self.level / 5.0;
        let channels = buffer.num_channels().min(self.channels.len());

        for c in 0..channels {
            let state = &mut self.channels[c];
            for sample in buffer.channel_mut(c).iter_mut() {
                let x = *sample;
                let clipped = (state.clip_lp.process(x) * drive).tanh();
                let mixed = dry.mul_add(x, wet * clipped);
                *sample = state.treble.process(mixed) * level;
            }
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.clip_lp.reset();
            ch.treble.reset();
        }
    }
}
