//! Filter Band
//!
//! A live cascade stage: one [`Band`] plus one [`BiquadFilter`] per channel.
//! All channels share coefficients but keep separate delay lines.

use crate::biquad::{BiquadCoefficients, BiquadFilter};
use crate::config::{Band, BandId};
use crate::error::DspError;

/// Stereo is the widest supported layout
pub const MAX_CHANNELS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct FilterBand {
    band: Band,
    coeffs: BiquadCoefficients,
    filters: [BiquadFilter; MAX_CHANNELS],
}

impl FilterBand {
    /// New stage with zeroed state.
    ///
    /// If the design fails the stage falls back to a pass-through section;
    /// the error is returned alongside so callers off the audio thread can
    /// surface it.
    pub fn new(band: Band, sample_rate: f64) -> (Self, Result<(), DspError>) {
        let mut stage = Self {
            band,
            coeffs: BiquadCoefficients::IDENTITY,
            filters: [BiquadFilter::default(); MAX_CHANNELS],
        };
        let result = stage.redesign(sample_rate);
        (stage, result)
    }

    pub fn id(&self) -> BandId {
        self.band.id
    }

    pub fn band(&self) -> &Band {
        &self.band
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coeffs
    }

    pub fn is_enabled(&self) -> bool {
        self.band.enabled
    }

    /// Take on new band settings, re-deriving coefficients only when the
    /// parameters actually changed. State is kept.
    pub fn update(&mut self, band: Band, sample_rate: f64) -> Result<(), DspError> {
        let params_changed = band.params != self.band.params;
        self.band = band;
        if params_changed {
            self.redesign(sample_rate)
        } else {
            Ok(())
        }
    }

    /// Re-derive coefficients, e.g. after a sample-rate change
    pub fn redesign(&mut self, sample_rate: f64) -> Result<(), DspError> {
        let result = BiquadCoefficients::design(&self.band.params, sample_rate);
        self.coeffs = match result {
            Ok(coeffs) => coeffs,
            Err(_) => BiquadCoefficients::IDENTITY,
        };
        for filter in &mut self.filters {
            filter.set_coefficients(self.coeffs);
        }
        result.map(|_| ())
    }

    /// Process one sample on `channel`
    #[inline]
    pub fn process(&mut self, channel: usize, sample: f32) -> f32 {
        self.filters[channel].process(sample)
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    pub fn is_silent(&self) -> bool {
        self.filters.iter().all(|f| f.state().is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BandParameters;

    fn band(id: u32, gain: f64) -> Band {
        Band::new(BandId(id), BandParameters::peaking(1000.0, gain, 1.0).unwrap())
    }

    #[test]
    fn test_new_band_is_silent() {
        let (stage, result) = FilterBand::new(band(1, 6.0), 48000.0);
        assert!(result.is_ok());
        assert!(stage.is_silent());
        assert_eq!(stage.id(), BandId(1));
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut stage, _) = FilterBand::new(band(1, 6.0), 48000.0);
        for _ in 0..32 {
            stage.process(0, 0.5);
        }
        assert!(!stage.filters[0].state().is_zero());
        assert!(stage.filters[1].state().is_zero());
    }

    #[test]
    fn test_update_recomputes_only_on_change() {
        let (mut stage, _) = FilterBand::new(band(1, 6.0), 48000.0);
        let before = *stage.coefficients();

        let mut disabled = band(1, 6.0);
        disabled.enabled = false;
        stage.update(disabled, 48000.0).unwrap();
        assert_eq!(*stage.coefficients(), before);
        assert!(!stage.is_enabled());

        stage.update(band(1, -6.0), 48000.0).unwrap();
        assert_ne!(*stage.coefficients(), before);
    }

    #[test]
    fn test_failed_design_falls_back_to_identity() {
        let high = Band::new(BandId(3), BandParameters::peaking(30000.0, 6.0, 1.0).unwrap());
        let (mut stage, result) = FilterBand::new(high, 48000.0);
        assert!(result.is_err());
        assert_eq!(*stage.coefficients(), BiquadCoefficients::IDENTITY);
        assert_eq!(stage.process(0, 0.25), 0.25);
    }
}
