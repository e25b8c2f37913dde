use crate::audio::buffer::AudioBuffer;
use crate::dsp::{Biquad, BiquadCoeffs, db_to_lin};
use crate::pedals::{Pedal, ProcessSpec, clamp_param};

const MAX_BOOST_DB: f32 = 8.0;
const OUTPUT_CEILING: f32 = 0.95;

#[derive(Clone, Copy, Default)]
struct ChannelFilters {
    high_pass: Biquad,
    presence: Biquad,
    low_pass: Biquad,
}

/// Clean boost: 30 Hz high-pass, up to +8 dB of gain, tanh saturation, a
/// 2 kHz presence lift and a 10 kHz roll-off.
pub struct BoostPedal {
    volume: f32,
    gain: f32,
    filters: Vec<ChannelFilters>,
}

impl Default for BoostPedal {
    fn default() -> Self {
        Self::new()
    }
}

impl BoostPedal {
    pub fn new() -> Self {
        Self {
            volume: 5.0,
            gain: db_to_lin(MAX_BOOST_DB * 0.5),
            filters: Vec::new(),
        }
    }
}

impl Pedal for BoostPedal {
    fn name(&self) -> &'static str {
        "boost"
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        let sr = spec.sample_rate;
        let filters = ChannelFilters {
            high_pass: Biquad::new(BiquadCoeffs::high_pass(30.0, 0.707, sr)),
            presence: Biquad::new(BiquadCoeffs::peak(2_000.0, 1.5, 2.0, sr)),
            low_pass: Biquad::new(BiquadCoeffs::first_order_low_pass(10_000.0, sr)),
        };
        self.filters = vec![filters; spec.num_channels];
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "volume" => {
                self.volume = clamp_param(value, 0.0, 10.0);
                self.gain = db_to_lin(self.volume / 10.0 * MAX_BOOST_DB);
                Ok(())
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels().min(self.filters.len());
        for c in 0..channels {
            let filters = &mut self.filters[c];
            for sample in buffer.channel_mut(c).iter_mut() {
                let x = filters.high_pass.process(*sample);
                let x = (x * self.gain).tanh();
                let x = filters.presence.process(x);
                let x = filters.low_pass.process(x);
                *sample = x.clamp(-OUTPUT_CEILING, OUTPUT_CEILING);
            }
        }
    }

    fn reset(&mut self) {
        for f in &mut self.filters {
            f.high_pass.reset();
            f.presence.reset();
            f.low_pass.reset();
        }
    }
}
