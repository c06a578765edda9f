//! Filters used by the synth voice and the chopper.
//!
//! Coefficients glide toward their targets a fixed fraction per sample so
//! live cutoff edits never click.

use core::f32::consts::TAU;
use pb_ir::MAX_CHANNELS;

/// Fraction of the remaining coefficient distance covered per sample.
pub const COEFF_SMOOTHING: f32 = 0.002;

const MIN_ONE_POLE_HZ: f32 = 10.0;

fn one_pole_coefficient(sample_rate: f32, cutoff_hz: f32) -> f32 {
    libm::expf(-TAU * cutoff_hz.max(MIN_ONE_POLE_HZ) / sample_rate)
}

/// One-pole low-pass: `y += (1 - a) * (x - y)`.
#[derive(Clone, Debug)]
pub struct OnePoleLowPass {
    a: f32,
    target: f32,
    y: f32,
}

impl OnePoleLowPass {
    pub fn new(sample_rate: f32, cutoff_hz: f32) -> Self {
        let a = one_pole_coefficient(sample_rate, cutoff_hz);
        Self { a, target: a, y: 0.0 }
    }

    /// Retarget the cutoff; the coefficient glides there.
    pub fn set_cutoff(&mut self, sample_rate: f32, cutoff_hz: f32) {
        self.target = one_pole_coefficient(sample_rate, cutoff_hz);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.a += (self.target - self.a) * COEFF_SMOOTHING;
        self.y += (1.0 - self.a) * (x - self.y);
        self.y
    }

    pub fn reset(&mut self) {
        self.y = 0.0;
    }
}

/// One-pole high-pass: `y = a * (y + x - x_prev)`.
#[derive(Clone, Debug)]
pub struct OnePoleHighPass {
    a: f32,
    target: f32,
    y: f32,
    x_prev: f32,
}

impl OnePoleHighPass {
    pub fn new(sample_rate: f32, cutoff_hz: f32) -> Self {
        let a = one_pole_coefficient(sample_rate, cutoff_hz);
        Self { a, target: a, y: 0.0, x_prev: 0.0 }
    }

    pub fn set_cutoff(&mut self, sample_rate: f32, cutoff_hz: f32) {
        self.target = one_pole_coefficient(sample_rate, cutoff_hz);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.a += (self.target - self.a) * COEFF_SMOOTHING;
        self.y = self.a * (self.y + x - self.x_prev);
        self.x_prev = x;
        self.y
    }

    pub fn reset(&mut self) {
        self.y = 0.0;
        self.x_prev = 0.0;
    }
}

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// RBJ cookbook low-pass. Cutoff is clamped to `[20, 0.45 * fs]` and Q
    /// to `[0.1, 10]`.
    pub fn low_pass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let fs = sample_rate as f64;
        let fc = if cutoff_hz.is_nan() { 20.0 } else { (cutoff_hz as f64).clamp(20.0, fs * 0.45) };
        let q = if q.is_nan() { 0.707 } else { (q as f64).clamp(0.1, 10.0) };
        let w0 = core::f64::consts::TAU * fc / fs;
        let (sin, cos) = (libm::sin(w0), libm::cos(w0));
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn approach(&mut self, target: &Self, amount: f64) {
        self.b0 += (target.b0 - self.b0) * amount;
        self.b1 += (target.b1 - self.b1) * amount;
        self.b2 += (target.b2 - self.b2) * amount;
        self.a1 += (target.a1 - self.a1) * amount;
        self.a2 += (target.a2 - self.a2) * amount;
    }
}

/// Multi-channel biquad: shared, smoothed coefficients and independent
/// delay registers per channel (transposed direct form II).
#[derive(Clone, Debug)]
pub struct Biquad {
    current: BiquadCoeffs,
    target: BiquadCoeffs,
    z: [[f64; 2]; MAX_CHANNELS],
}

impl Biquad {
    pub fn low_pass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let c = BiquadCoeffs::low_pass(sample_rate, cutoff_hz, q);
        Self { current: c, target: c, z: [[0.0; 2]; MAX_CHANNELS] }
    }

    pub fn set_low_pass(&mut self, sample_rate: f32, cutoff_hz: f32, q: f32) {
        self.target = BiquadCoeffs::low_pass(sample_rate, cutoff_hz, q);
    }

    /// Move the coefficients one sample's worth toward the target.
    #[inline]
    pub fn smooth(&mut self) {
        self.current.approach(&self.target, COEFF_SMOOTHING as f64);
    }

    /// Filter one sample on `channel` (`channel < MAX_CHANNELS`).
    #[inline]
    pub fn process(&mut self, channel: usize, x: f32) -> f32 {
        let c = &self.current;
        let z = &mut self.z[channel];
        let x = x as f64;
        let y = c.b0 * x + z[0];
        z[0] = c.b1 * x + z[1] - c.a1 * y;
        z[1] = c.b2 * x - c.a2 * y;
        y as f32
    }

    pub fn reset(&mut self) {
        self.z = [[0.0; 2]; MAX_CHANNELS];
    }

    pub fn coefficients(&self) -> BiquadCoeffs {
        self.current
    }
}
