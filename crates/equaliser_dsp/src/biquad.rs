//! Biquad Filter
//!
//! Second-order IIR section with coefficients from the RBJ (Robert
//! Bristow-Johnson) Audio EQ Cookbook, Q variants throughout.
//!
//! ```text
//! w0    = 2*pi*f0/Fs
//! alpha = sin(w0) / (2*Q)
//! A     = 10^(gain_db/40)
//! ```
//!
//! Coefficients come from the `biquad` crate in f64 whatever the sample
//! precision. The filter runs its own transposed direct form II with f64
//! state and a denormal flush. Samples enter and leave as f32.

use std::f64::consts::PI;

use biquad::{Coefficients, Errors, Hertz, Type};

use crate::error::DspError;
use crate::params::{validate_sample_rate, BandParameters, FilterType};

/// Filter state and outputs smaller than this are flushed to zero
const DENORMAL_THRESHOLD: f64 = 1e-30;

/// Normalized biquad coefficients (`a0` is always 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Pass-through section
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a0: 1.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Design coefficients for `params` at `sample_rate`.
    ///
    /// Pure: the same inputs always produce the same coefficients. Fails when
    /// the frequency is at or above Nyquist, or when the result would not be
    /// finite and stable.
    pub fn design(params: &BandParameters, sample_rate: f64) -> Result<Self, DspError> {
        validate_sample_rate(sample_rate)?;
        params.validate_for_rate(sample_rate)?;

        let fs = Hertz::<f64>::from_hz(sample_rate)
            .map_err(|_| DspError::InvalidSampleRate(sample_rate))?;
        let f0 = Hertz::<f64>::from_hz(params.frequency_hz())
            .map_err(|e| design_error(e, params))?;
        let c = Coefficients::<f64>::from_params(cookbook_type(params), fs, f0, params.q())
            .map_err(|e| design_error(e, params))?;

        let coeffs = Self {
            b0: c.b0,
            b1: c.b1,
            b2: c.b2,
            a0: 1.0,
            a1: c.a1,
            a2: c.a2,
        };
        if !coeffs.is_finite() {
            return Err(DspError::invalid(
                "frequency",
                params.frequency_hz(),
                "produces non-finite coefficients",
            ));
        }
        if !coeffs.is_stable() {
            return Err(DspError::invalid(
                "q",
                params.q(),
                "produces poles outside the unit circle",
            ));
        }
        Ok(coeffs)
    }

    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a0, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Stability triangle for a second-order denominator
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }

    /// |H(e^jw)| at `frequency_hz`
    pub fn magnitude_at(&self, frequency_hz: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency_hz / sample_rate;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();

        // e^{-jw} = cos w - j sin w
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = self.a0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        num / den
    }
}

impl Default for BiquadCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Delay registers of one transposed direct form II section
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadState {
    pub s1: f64,
    pub s2: f64,
}

impl BiquadState {
    pub fn is_zero(&self) -> bool {
        self.s1 == 0.0 && self.s2 == 0.0
    }
}

/// One biquad section: coefficients plus its own state
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadFilter {
    coeffs: BiquadCoefficients,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    /// Design and install coefficients for `params`. State is left alone so
    /// a parameter change between buffers does not click.
    pub fn configure(
        &mut self,
        params: &BandParameters,
        sample_rate: f64,
    ) -> Result<BiquadCoefficients, DspError> {
        let coeffs = BiquadCoefficients::design(params, sample_rate)?;
        self.coeffs = coeffs;
        Ok(coeffs)
    }

    /// Install already-designed coefficients
    pub fn set_coefficients(&mut self, coeffs: BiquadCoefficients) {
        self.coeffs = coeffs;
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coeffs
    }

    pub fn state(&self) -> &BiquadState {
        &self.state
    }

    /// Run one sample through the section.
    ///
    /// # Real-time Safety
    /// No allocations, no branches beyond the denormal flush.
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let c = &self.coeffs;
        let x = sample as f64;
        let y = flush_denormal(c.b0 * x + self.state.s1);
        self.state.s1 = flush_denormal(c.b1 * x - c.a1 * y + self.state.s2);
        self.state.s2 = flush_denormal(c.b2 * x - c.a2 * y);
        y as f32
    }

    /// Clear the delay line
    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}

/// Cookbook response for a band. LP/HP/Notch carry no gain.
fn cookbook_type(params: &BandParameters) -> Type<f64> {
    match params.filter_type() {
        FilterType::Peaking => Type::PeakingEQ(params.gain_db()),
        FilterType::LowShelf => Type::LowShelf(params.gain_db()),
        FilterType::HighShelf => Type::HighShelf(params.gain_db()),
        FilterType::LowPass => Type::LowPass,
        FilterType::HighPass => Type::HighPass,
        FilterType::Notch => Type::Notch,
    }
}

fn design_error(err: Errors, params: &BandParameters) -> DspError {
    match err {
        Errors::OutsideNyquist => {
            DspError::invalid("frequency", params.frequency_hz(), "at or above Nyquist")
        }
        Errors::NegativeFrequency => {
            DspError::invalid("frequency", params.frequency_hz(), "must be positive")
        }
        Errors::NegativeQ => DspError::invalid("q", params.q(), "must be positive"),
    }
}

#[inline(always)]
fn flush_denormal(value: f64) -> f64 {
    if value.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        value
    }
}
