//! Built-in EQ Presets
//!
//! Presets are laid out as a classic 10-band graphic EQ: a low shelf, eight
//! octave-spaced peaking bands and a high shelf. Loading one produces an
//! ordinary [`EngineConfig`] that can then be edited band by band.

use crate::config::{Band, BandId, EngineConfig};
use crate::error::DspError;
use crate::params::{BandParameters, FilterType};

/// ISO octave centres (Hz) used by the presets
pub const PRESET_FREQUENCIES: [f64; 10] = [
    31.0,    // Sub-bass
    62.0,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Mid
    1000.0,  // Upper-mid
    2000.0,  // Presence
    4000.0,  // Brilliance
    8000.0,  // High
    16000.0, // Air
];

/// One-octave bandwidth for the peaking bands
const OCTAVE_Q: f64 = std::f64::consts::SQRT_2;

/// Shelf slope
const SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Named EQ preset with 10 band gains
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub gains_db: [f64; 10],
}

impl Preset {
    /// Build the preset's config with the default global gain
    pub fn to_config(&self) -> Result<EngineConfig, DspError> {
        let bands = PRESET_FREQUENCIES
            .iter()
            .zip(self.gains_db)
            .enumerate()
            .map(|(i, (&frequency, gain))| {
                let (filter_type, q) = match i {
                    0 => (FilterType::LowShelf, SHELF_Q),
                    9 => (FilterType::HighShelf, SHELF_Q),
                    _ => (FilterType::Peaking, OCTAVE_Q),
                };
                let params = BandParameters::new(filter_type, frequency, gain, q)?;
                Ok(Band::new(BandId(i as u32), params))
            })
            .collect::<Result<Vec<_>, DspError>>()?;

        let defaults = EngineConfig::default();
        EngineConfig::new(bands, defaults.global_gain_db(), defaults.bypass())
    }
}

/// List of built-in presets
pub const PRESETS: &[Preset] = &[
    Preset { name: "Flat", gains_db: [0.0; 10] },
    Preset { name: "Bass Boost", gains_db: [6.0, 5.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] },
    Preset { name: "Treble Boost", gains_db: [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0, 5.0, 6.0, 6.0] },
    Preset { name: "Vocal Clarity", gains_db: [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 2.0, 1.0, 0.0] },
    Preset { name: "Bass Reduce", gains_db: [-6.0, -4.0, -2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] },
    Preset { name: "Loudness", gains_db: [4.0, 3.0, 0.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0] },
    Preset { name: "Electronic", gains_db: [4.0, 3.0, 1.0, 0.0, -2.0, -2.0, 0.0, 1.0, 3.0, 4.0] },
];

/// Look a preset up by name, ignoring case
pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::frequency_response;

    #[test]
    fn test_all_presets_build() {
        for preset in PRESETS {
            let config = preset.to_config().unwrap();
            assert_eq!(config.len(), 10, "{}", preset.name);
            assert!(config.validate_for_rate(44100.0).is_ok(), "{}", preset.name);
        }
    }

    #[test]
    fn test_flat_preset_response_is_global_gain() {
        let config = find_preset("flat").unwrap().to_config().unwrap();
        let curve = frequency_response(&config, 48000.0, 128).unwrap();
        for point in curve {
            assert!((point.magnitude_db - config.global_gain_db()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_bass_boost_lifts_lows() {
        let config = find_preset("Bass Boost").unwrap().to_config().unwrap();
        let curve = frequency_response(&config, 48000.0, 256).unwrap();
        let low = curve.first().unwrap().magnitude_db;
        let high = curve.last().unwrap().magnitude_db;
        assert!(low > high + 3.0, "low {low} high {high}");
    }

    #[test]
    fn test_unknown_preset() {
        assert!(find_preset("Nonexistent").is_none());
    }
}
