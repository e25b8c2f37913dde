//! Small DSP building blocks shared by the amp section and the pedals.

use std::f32::consts::PI;

/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels.
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(1e-9).log10()
}

/// Calculate a one-pole smoothing coefficient from a time constant in milliseconds.
///
/// Returns `exp(-1 / (sample_rate * time_ms * 0.001))`.
#[inline]
pub fn calculate_coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (sample_rate * 0.001 * time_ms)).exp()
}

/// DC blocker using a first-order high-pass filter.
///
/// `y[n] = x[n] - x[n-1] + R * y[n-1]`
#[derive(Clone)]
pub struct DcBlocker {
    x_prev: f32,
    y_prev: f32,
    coeff: f32,
}

impl DcBlocker {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        let coeff = (-2.0 * PI * cutoff_hz / sample_rate).exp();
        Self {
            x_prev: 0.0,
            y_prev: 0.0,
            coeff,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.coeff.mul_add(self.y_prev, input - self.x_prev);
        self.x_prev = input;
        self.y_prev = output;
        output
    }

    pub fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }
}

/// One-pole envelope follower with separate attack and release coefficients.
#[derive(Clone)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    pub const fn new(attack_coeff: f32, release_coeff: f32) -> Self {
        Self {
            envelope: 0.0,
            attack_coeff,
            release_coeff,
        }
    }

    pub fn from_ms(attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        Self::new(
            calculate_coefficient(attack_ms, sample_rate),
            calculate_coefficient(release_ms, sample_rate),
        )
    }

    pub const fn set_attack_coeff(&mut self, coeff: f32) {
        self.attack_coeff = coeff;
    }

    pub const fn set_release_coeff(&mut self, coeff: f32) {
        self.release_coeff = coeff;
    }

    pub const fn value(&self) -> f32 {
        self.envelope
    }

    pub const fn reset(&mut self) {
        self.envelope = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff.mul_add(self.envelope, (1.0 - coeff) * abs_input);
        self.envelope
    }
}

/// Normalised biquad coefficients (a0 == 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::identity()
    }
}

impl BiquadCoeffs {
    pub const fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    fn normalised(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
        }
    }

    fn omega(freq: f32, sample_rate: f32) -> (f32, f32) {
        let freq = freq.clamp(1.0, sample_rate * 0.49);
        let w0 = 2.0 * PI * freq / sample_rate;
        (w0.sin(), w0.cos())
    }

    pub fn low_pass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let (sin, cos) = Self::omega(freq, sample_rate);
        let alpha = sin / (2.0 * q);
        let b1 = 1.0 - cos;
        Self::normalised(b1 * 0.5, b1, b1 * 0.5, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    pub fn high_pass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let (sin, cos) = Self::omega(freq, sample_rate);
        let alpha = sin / (2.0 * q);
        let b1 = -(1.0 + cos);
        Self::normalised(
            -b1 * 0.5,
            b1,
            -b1 * 0.5,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    /// First-order low-pass (bilinear), expressed as a biquad.
    pub fn first_order_low_pass(freq: f32, sample_rate: f32) -> Self {
        let freq = freq.clamp(1.0, sample_rate * 0.49);
        let k = (PI * freq / sample_rate).tan();
        let norm = 1.0 / (1.0 + k);
        Self {
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        }
    }

    pub fn peak(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (sin, cos) = Self::omega(freq, sample_rate);
        let a = 10f32.powf(gain_db / 40.0);
        let alpha = sin / (2.0 * q);
        Self::normalised(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }

    pub fn low_shelf(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (sin, cos) = Self::omega(freq, sample_rate);
        let a = 10f32.powf(gain_db / 40.0);
        let alpha = sin / (2.0 * q);
        let sqrt_a2 = 2.0 * a.sqrt() * alpha;
        Self::normalised(
            a * ((a + 1.0) - (a - 1.0) * cos + sqrt_a2),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
            a * ((a + 1.0) - (a - 1.0) * cos - sqrt_a2),
            (a + 1.0) + (a - 1.0) * cos + sqrt_a2,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos),
            (a + 1.0) + (a - 1.0) * cos - sqrt_a2,
        )
    }

    pub fn high_shelf(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (sin, cos) = Self::omega(freq, sample_rate);
        let a = 10f32.powf(gain_db / 40.0);
        let alpha = sin / (2.0 * q);
        let sqrt_a2 = 2.0 * a.sqrt() * alpha;
        Self::normalised(
            a * ((a + 1.0) + (a - 1.0) * cos + sqrt_a2),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
            a * ((a + 1.0) + (a - 1.0) * cos - sqrt_a2),
            (a + 1.0) - (a - 1.0) * cos + sqrt_a2,
            2.0 * ((a - 1.0) - (a + 1.0) * cos),
            (a + 1.0) - (a - 1.0) * cos - sqrt_a2,
        )
    }
}

/// Transposed direct form II biquad.
#[derive(Debug, Clone, Copy, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Swap coefficients without clearing state.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let output = c.b0.mul_add(input, self.z1);
        self.z1 = c.b1.mul_add(input, -c.a1 * output) + self.z2;
        self.z2 = c.b2.mul_add(input, -c.a2 * output);
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
