//! Frequency Response
//!
//! Magnitude response of a whole configuration, for drawing the EQ curve.
//! Computed from coefficients alone; no audio state is touched.

use serde::{Deserialize, Serialize};

use crate::biquad::BiquadCoefficients;
use crate::config::EngineConfig;
use crate::error::DspError;
use crate::params::validate_sample_rate;

/// Lowest frequency of a response curve (Hz)
pub const RESPONSE_MIN_HZ: f64 = 20.0;

/// Default number of points of a response curve
pub const DEFAULT_RESPONSE_POINTS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponsePoint {
    pub frequency_hz: f64,
    pub magnitude_db: f64,
}

/// `points` log-spaced frequencies from 20 Hz up to Nyquist, inclusive
pub fn log_frequencies(sample_rate: f64, points: usize) -> Vec<f64> {
    let nyquist = sample_rate / 2.0;
    match points {
        0 => Vec::new(),
        1 => vec![RESPONSE_MIN_HZ],
        _ => {
            let (lo, hi) = (RESPONSE_MIN_HZ.ln(), nyquist.ln());
            let step = (hi - lo) / (points - 1) as f64;
            (0..points).map(|i| (lo + step * i as f64).exp()).collect()
        }
    }
}

/// Magnitude response (dB) of the enabled cascade plus global gain.
///
/// A bypassed config is flat at 0 dB.
pub fn frequency_response(
    config: &EngineConfig,
    sample_rate: f64,
    points: usize,
) -> Result<Vec<ResponsePoint>, DspError> {
    validate_sample_rate(sample_rate)?;
    let frequencies = log_frequencies(sample_rate, points);

    if config.bypass() {
        return Ok(frequencies
            .into_iter()
            .map(|frequency_hz| ResponsePoint {
                frequency_hz,
                magnitude_db: 0.0,
            })
            .collect());
    }

    let sections = config
        .bands()
        .iter()
        .filter(|band| band.enabled)
        .map(|band| BiquadCoefficients::design(&band.params, sample_rate))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(frequencies
        .into_iter()
        .map(|frequency_hz| {
            let magnitude: f64 = sections
                .iter()
                .map(|c| c.magnitude_at(frequency_hz, sample_rate))
                .product();
            ResponsePoint {
                frequency_hz,
                magnitude_db: 20.0 * magnitude.max(1e-12).log10() + config.global_gain_db(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Band, BandId};
    use crate::params::{BandParameters, FilterType};

    #[test]
    fn test_frequencies_are_log_spaced() {
        let f = log_frequencies(48000.0, 512);
        assert_eq!(f.len(), 512);
        assert!((f[0] - 20.0).abs() < 1e-9);
        assert!((f[511] - 24000.0).abs() < 1e-6);
        let r1 = f[1] / f[0];
        let r2 = f[300] / f[299];
        assert!((r1 - r2).abs() < 1e-9);
        assert!(log_frequencies(48000.0, 0).is_empty());
    }

    #[test]
    fn test_empty_config_is_global_gain() {
        let curve = frequency_response(&EngineConfig::default(), 48000.0, 64).unwrap();
        assert!(curve.iter().all(|p| (p.magnitude_db + 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_peak_shows_at_center() {
        let config = EngineConfig::flat()
            .with_band(Band::new(
                BandId(0),
                BandParameters::peaking(1000.0, 6.0, 1.5).unwrap(),
            ))
            .unwrap();
        let curve = frequency_response(&config, 48000.0, 512).unwrap();
        let max = curve
            .iter()
            .max_by(|a, b| a.magnitude_db.total_cmp(&b.magnitude_db))
            .unwrap();
        assert!((max.frequency_hz / 1000.0 - 1.0).abs() < 0.03);
        assert!((max.magnitude_db - 6.0).abs() < 0.1);
        assert!(curve[0].magnitude_db.abs() < 0.1);
    }

    #[test]
    fn test_bypass_and_disabled_bands_are_flat() {
        let band = Band::new(
            BandId(0),
            BandParameters::new(FilterType::LowShelf, 200.0, 9.0, 0.7).unwrap(),
        );
        let config = EngineConfig::flat().with_band(band).unwrap();

        let bypassed = frequency_response(&config.with_bypass(true), 48000.0, 32).unwrap();
        assert!(bypassed.iter().all(|p| p.magnitude_db == 0.0));

        let disabled = config.with_band_enabled(0, false).unwrap();
        let curve = frequency_response(&disabled, 48000.0, 32).unwrap();
        assert!(curve.iter().all(|p| p.magnitude_db.abs() < 1e-9));
    }

    #[test]
    fn test_band_above_nyquist_is_an_error() {
        let config = EngineConfig::flat()
            .with_band(Band::new(
                BandId(0),
                BandParameters::peaking(30000.0, 3.0, 1.0).unwrap(),
            ))
            .unwrap();
        assert!(frequency_response(&config, 48000.0, 16).is_err());
    }
}
