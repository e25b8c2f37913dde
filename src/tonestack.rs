use crate::dsp::{Biquad, BiquadCoeffs};

const BASS_HZ: f32 = 150.0;
const MID_HZ: f32 = 425.0;
const TREBLE_HZ: f32 = 1800.0;
const SHELF_Q: f32 = 0.707;
const MID_Q: f32 = 0.707;

/// dB per knob step away from 5.
const BASS_DB_PER_STEP: f32 = 4.0;
const MID_DB_PER_STEP: f32 = 3.0;
const TREBLE_DB_PER_STEP: f32 = 2.0;

/// Three-band EQ after the amp model: low shelf, mid peak, high shelf.
///
/// Knobs run 0 to 10 with 5 meaning flat.
pub struct ToneStack {
    sample_rate: f32,
    bass: f32,
    mid: f32,
    treble: f32,
    bass_filter: Biquad,
    mid_filter: Biquad,
    treble_filter: Biquad,
}

impl ToneStack {
    pub fn new(sample_rate: f32) -> Self {
        let mut stack = Self {
            sample_rate,
            bass: 5.0,
            mid: 5.0,
            treble: 5.0,
            bass_filter: Biquad::default(),
            mid_filter: Biquad::default(),
            treble_filter: Biquad::default(),
        };
        stack.update_coefficients();
        stack
    }

    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.bass_filter.reset();
        self.mid_filter.reset();
        self.treble_filter.reset();
    }

    /// Set all three knobs. Coefficients are only recomputed on change.
    pub fn set_knobs(&mut self, bass: f32, mid: f32, treble: f32) {
        let bass = bass.clamp(0.0, 10.0);
        let mid = mid.clamp(0.0, 10.0);
        let treble = treble.clamp(0.0, 10.0);
        if bass == self.bass && mid == self.mid && treble == self.treble {
            return;
        }
        self.bass = bass;
        self.mid = mid;
        self.treble = treble;
        self.update_coefficients();
    }

    pub fn knobs(&self) -> (f32, f32, f32) {
        (self.bass, self.mid, self.treble)
    }

    fn update_coefficients(&mut self) {
        let sr = self.sample_rate;
        self.bass_filter.set_coeffs(BiquadCoeffs::low_shelf(
            BASS_HZ,
            SHELF_Q,
            BASS_DB_PER_STEP * (self.bass - 5.0),
            sr,
        ));
        self.mid_filter.set_coeffs(BiquadCoeffs::peak(
            MID_HZ,
            MID_Q,
            MID_DB_PER_STEP * (self.mid - 5.0),
            sr,
        ));
        self.treble_filter.set_coeffs(BiquadCoeffs::high_shelf(
            TREBLE_HZ,
            SHELF_Q,
            TREBLE_DB_PER_STEP * (self.treble - 5.0),
            sr,
        ));
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let x = self.bass_filter.process(input);
        let x = self.mid_filter.process(x);
        self.treble_filter.process(x)
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}
