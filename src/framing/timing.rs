use std::ops::Sub;

use num_complex::Complex;

use crate::prelude::*;

/// A sample type the timing recovery loop can operate on.
pub trait Symbol: Copy + Default + Sub<Output = Self> + Send {
    /// Binary slice to +/-1, independently per component.
    fn slice(self) -> Self;
    /// `Re[self * conj(other)]`
    fn mul_conj_re(self, other: Self) -> f64;
    /// Hard bit decision on the real part.
    fn bit(self) -> bool;
}

impl Symbol for f64 {
    fn slice(self) -> Self {
        if self > 0.0 {
            1.0
        } else {
            -1.0
        }
    }

    fn mul_conj_re(self, other: Self) -> f64 {
        self * other
    }

    fn bit(self) -> bool {
        self > 0.0
    }
}

impl Symbol for Complex<f64> {
    fn slice(self) -> Self {
        Complex::new(self.re.slice(), self.im.slice())
    }

    fn mul_conj_re(self, other: Self) -> f64 {
        (self * other.conj()).re
    }

    fn bit(self) -> bool {
        self.re > 0.0
    }
}

/// Mueller and Müller symbol timing recovery.
///
/// Converts samples into one bit per symbol. State is kept between calls to
/// [TimingRecovery::recover] so a continuous stream can be processed in arbitrary chunks and
/// yield the same bits as processing it in one call.
#[derive(Debug, Clone)]
pub struct TimingRecovery<S: Symbol = f64> {
    samples_per_symbol: f64,
    gain: f64,
    initial_mu: f64,
    // Sampling instant relative to the sample at `offset`, in [-0.5, 0.5)
    mu: f64,
    // Index of the next sample to take, relative to the start of the next chunk
    offset: usize,
    // Previous two outputs and their sliced values, oldest first
    out: [S; 2],
    rail: [S; 2],
}

impl<S: Symbol> TimingRecovery<S> {
    pub const DEFAULT_GAIN: f64 = 0.001;
    pub const DEFAULT_MU: f64 = 0.001;

    /// # Errors
    /// [Error::InvalidParameter] if either rate is not a positive finite number.
    pub fn new(sample_rate: f64, baudrate: f64) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if !(baudrate.is_finite() && baudrate > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "baudrate must be positive, got {baudrate}"
            )));
        }
        let mut tr = TimingRecovery {
            samples_per_symbol: sample_rate / baudrate,
            gain: Self::DEFAULT_GAIN,
            initial_mu: Self::DEFAULT_MU,
            mu: 0.0,
            offset: 0,
            out: [S::default(); 2],
            rail: [S::default(); 2],
        };
        tr.reset();
        Ok(tr)
    }

    /// Loop gain applied to the timing error.
    #[must_use]
    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Initial fractional sample phase, in `[0, 1)`.
    #[must_use]
    pub fn with_initial_phase(mut self, mu: f64) -> Self {
        self.initial_mu = mu.clamp(0.0, 1.0 - f64::EPSILON);
        self.reset();
        self
    }

    #[must_use]
    pub fn samples_per_symbol(&self) -> f64 {
        self.samples_per_symbol
    }

    /// Current fractional sample phase, in `[0, 1)`.
    #[must_use]
    pub fn phase(&self) -> f64 {
        self.mu.rem_euclid(1.0)
    }

    /// Recover bits from the next chunk of the stream. Each symbol is taken from the sample
    /// nearest the estimated optimal sampling instant.
    pub fn recover(&mut self, samples: &[S]) -> Vec<bool> {
        let mut bits = Vec::with_capacity(
            (samples.len() as f64 / self.samples_per_symbol).ceil() as usize + 1,
        );

        let mut idx = self.offset;
        while idx < samples.len() {
            let cur = samples[idx];
            let rail = cur.slice();

            let x = (rail - self.rail[0]).mul_conj_re(self.out[1]);
            let y = (cur - self.out[0]).mul_conj_re(self.rail[1]);
            let err = y - x;

            self.out = [self.out[1], cur];
            self.rail = [self.rail[1], rail];
            bits.push(cur.bit());

            self.mu += self.samples_per_symbol + self.gain * err;
            // never step backwards
            if self.mu < -0.5 {
                self.mu = -0.5;
            }
            let step = (self.mu + 0.5).floor();
            idx += step as usize;
            self.mu -= step;
        }
        self.offset = idx - samples.len();

        bits
    }

    /// Forget all stream state.
    pub fn reset(&mut self) {
        if self.initial_mu >= 0.5 {
            self.mu = self.initial_mu - 1.0;
            self.offset = 1;
        } else {
            self.mu = self.initial_mu;
            self.offset = 0;
        }
        self.out = [S::default(); 2];
        self.rail = [S::default(); 2];
    }
}

/// Recover bits from a complete capture with a fresh [TimingRecovery].
///
/// # Errors
/// [Error::InvalidParameter] if either rate is not a positive finite number.
pub fn decode(samples: &[f64], sample_rate: f64, baudrate: f64) -> Result<Vec<bool>> {
    Ok(TimingRecovery::new(sample_rate, baudrate)?.recover(samples))
}

/// Generate rectangular NRZ samples for `bytes`, most-significant bit first, with `1` bits at
/// `+amplitude` and `0` bits at `-amplitude`.
///
/// # Errors
/// [Error::InvalidParameter] if the rates give less than one sample per bit.
pub fn modulate_nrz(
    bytes: &[u8],
    sample_rate: f64,
    baudrate: f64,
    amplitude: f64,
) -> Result<Vec<f64>> {
    let per_bit = (sample_rate / baudrate).floor();
    if !per_bit.is_finite() || per_bit < 1.0 {
        return Err(Error::InvalidParameter(format!(
            "{sample_rate} Hz at {baudrate} baud gives less than one sample per bit"
        )));
    }
    let per_bit = per_bit as usize;

    let mut samples = Vec::with_capacity(bytes.len() * 8 * per_bit);
    for byte in bytes {
        for i in (0..8).rev() {
            let level = if (byte >> i) & 1 == 1 {
                amplitude
            } else {
                -amplitude
            };
            samples.extend(std::iter::repeat(level).take(per_bit));
        }
    }
    Ok(samples)
}
