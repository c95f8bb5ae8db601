//! Band Parameters
//!
//! The immutable, validated description of a single EQ band. Values are
//! checked when they are built and again when they meet a sample rate;
//! out-of-range input is rejected, never clamped.

use serde::{Deserialize, Serialize};

use crate::error::DspError;

/// Maximum boost/cut of a single band (dB)
pub const MAX_BAND_GAIN_DB: f64 = 24.0;

/// Q bounds (inclusive)
pub const MIN_Q: f64 = 0.1;
pub const MAX_Q: f64 = 10.0;

/// Filter shape, selects the cookbook formula used for the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Peaking,
    LowShelf,
    HighShelf,
    LowPass,
    HighPass,
    Notch,
}

impl FilterType {
    pub const ALL: [FilterType; 6] = [
        FilterType::Peaking,
        FilterType::LowShelf,
        FilterType::HighShelf,
        FilterType::LowPass,
        FilterType::HighPass,
        FilterType::Notch,
    ];

    /// Whether `gain_db` has any effect on this filter shape
    pub fn uses_gain(self) -> bool {
        matches!(
            self,
            FilterType::Peaking | FilterType::LowShelf | FilterType::HighShelf
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterType::Peaking => "peaking",
            FilterType::LowShelf => "low_shelf",
            FilterType::HighShelf => "high_shelf",
            FilterType::LowPass => "low_pass",
            FilterType::HighPass => "high_pass",
            FilterType::Notch => "notch",
        }
    }
}

impl std::str::FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        FilterType::ALL
            .into_iter()
            .find(|t| t.name() == normalized || t.name().replace('_', "") == normalized)
            .ok_or_else(|| format!("unknown filter type '{s}'"))
    }
}

/// Validated parameters of one band
///
/// Fields are private so every value in circulation went through
/// [`BandParameters::new`]. Editing a band means building a new value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBandParameters")]
pub struct BandParameters {
    filter_type: FilterType,
    frequency_hz: f64,
    gain_db: f64,
    q: f64,
}

/// Unvalidated wire form, only used as a deserialization stepping stone
#[derive(Deserialize)]
struct RawBandParameters {
    filter_type: FilterType,
    frequency_hz: f64,
    gain_db: f64,
    q: f64,
}

impl TryFrom<RawBandParameters> for BandParameters {
    type Error = DspError;

    fn try_from(raw: RawBandParameters) -> Result<Self, Self::Error> {
        BandParameters::new(raw.filter_type, raw.frequency_hz, raw.gain_db, raw.q)
    }
}

impl BandParameters {
    /// Build a band, rejecting values the engine cannot represent.
    ///
    /// The Nyquist bound depends on the stream's sample rate and is checked
    /// separately by [`BandParameters::validate_for_rate`].
    pub fn new(
        filter_type: FilterType,
        frequency_hz: f64,
        gain_db: f64,
        q: f64,
    ) -> Result<Self, DspError> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(DspError::invalid(
                "frequency",
                frequency_hz,
                "must be positive and finite",
            ));
        }
        if !gain_db.is_finite() || gain_db.abs() > MAX_BAND_GAIN_DB {
            return Err(DspError::invalid(
                "gain_db",
                gain_db,
                "must be within +/-24 dB",
            ));
        }
        if !q.is_finite() || q <= 0.0 {
            return Err(DspError::invalid("q", q, "must be positive and finite"));
        }
        if !(MIN_Q..=MAX_Q).contains(&q) {
            return Err(DspError::invalid("q", q, "must be within [0.1, 10]"));
        }

        Ok(Self {
            filter_type,
            frequency_hz,
            gain_db,
            q,
        })
    }

    /// Peaking band, the default shape of a freshly added band
    pub fn peaking(frequency_hz: f64, gain_db: f64, q: f64) -> Result<Self, DspError> {
        Self::new(FilterType::Peaking, frequency_hz, gain_db, q)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    /// Copy with a different gain
    pub fn with_gain_db(self, gain_db: f64) -> Result<Self, DspError> {
        Self::new(self.filter_type, self.frequency_hz, gain_db, self.q)
    }

    /// Copy with a different center/corner frequency
    pub fn with_frequency_hz(self, frequency_hz: f64) -> Result<Self, DspError> {
        Self::new(self.filter_type, frequency_hz, self.gain_db, self.q)
    }

    /// Copy with a different Q
    pub fn with_q(self, q: f64) -> Result<Self, DspError> {
        Self::new(self.filter_type, self.frequency_hz, self.gain_db, q)
    }

    /// Copy with a different filter shape
    pub fn with_filter_type(self, filter_type: FilterType) -> Self {
        Self { filter_type, ..self }
    }

    /// Check the rate-dependent bound: frequency must sit below Nyquist
    pub fn validate_for_rate(&self, sample_rate: f64) -> Result<(), DspError> {
        validate_sample_rate(sample_rate)?;
        if self.frequency_hz >= sample_rate / 2.0 {
            return Err(DspError::invalid(
                "frequency",
                self.frequency_hz,
                "must be below the Nyquist frequency",
            ));
        }
        Ok(())
    }
}

impl Default for BandParameters {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Peaking,
            frequency_hz: 1000.0,
            gain_db: 0.0,
            q: 1.0,
        }
    }
}

pub(crate) fn validate_sample_rate(sample_rate: f64) -> Result<(), DspError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

/// Convert dB gain to linear amplitude: 10^(dB/20)
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to dB, mapping silence to `floor_db`
#[inline]
pub fn linear_to_db(value: f64, floor_db: f64) -> f64 {
    if value <= 0.0 || !value.is_finite() {
        return floor_db;
    }
    (20.0 * value.log10()).max(floor_db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_band() {
        let band = BandParameters::new(FilterType::Peaking, 1000.0, 6.0, 1.5).unwrap();
        assert_eq!(band.filter_type(), FilterType::Peaking);
        assert_eq!(band.frequency_hz(), 1000.0);
        assert_eq!(band.gain_db(), 6.0);
        assert_eq!(band.q(), 1.5);
    }

    #[test]
    fn test_rejects_bad_frequency() {
        assert!(BandParameters::peaking(0.0, 0.0, 1.0).is_err());
        assert!(BandParameters::peaking(-10.0, 0.0, 1.0).is_err());
        assert!(BandParameters::peaking(f64::NAN, 0.0, 1.0).is_err());
        assert!(BandParameters::peaking(f64::INFINITY, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_rejects_bad_gain() {
        assert!(BandParameters::peaking(1000.0, 24.5, 1.0).is_err());
        assert!(BandParameters::peaking(1000.0, -30.0, 1.0).is_err());
        assert!(BandParameters::peaking(1000.0, 24.0, 1.0).is_ok());
        assert!(BandParameters::peaking(1000.0, -24.0, 1.0).is_ok());
    }

    #[test]
    fn test_rejects_bad_q() {
        assert!(BandParameters::peaking(1000.0, 0.0, 0.0).is_err());
        assert!(BandParameters::peaking(1000.0, 0.0, -1.0).is_err());
        assert!(BandParameters::peaking(1000.0, 0.0, 0.05).is_err());
        assert!(BandParameters::peaking(1000.0, 0.0, 10.5).is_err());
        assert!(BandParameters::peaking(1000.0, 0.0, 0.1).is_ok());
        assert!(BandParameters::peaking(1000.0, 0.0, 10.0).is_ok());
    }

    #[test]
    fn test_nyquist_bound() {
        let band = BandParameters::peaking(24000.0, 0.0, 1.0).unwrap();
        assert!(band.validate_for_rate(48000.0).is_err());
        assert!(band.validate_for_rate(96000.0).is_ok());
        assert!(band.validate_for_rate(0.0).is_err());
    }

    #[test]
    fn test_edits_build_new_values() {
        let band = BandParameters::peaking(1000.0, 3.0, 1.0).unwrap();
        let louder = band.with_gain_db(9.0).unwrap();
        assert_eq!(band.gain_db(), 3.0);
        assert_eq!(louder.gain_db(), 9.0);
        assert!(band.with_q(100.0).is_err());
        assert_eq!(
            band.with_filter_type(FilterType::Notch).filter_type(),
            FilterType::Notch
        );
    }

    #[test]
    fn test_filter_type_parsing() {
        assert_eq!("peaking".parse::<FilterType>().unwrap(), FilterType::Peaking);
        assert_eq!("low-shelf".parse::<FilterType>().unwrap(), FilterType::LowShelf);
        assert_eq!("HighPass".parse::<FilterType>().unwrap(), FilterType::HighPass);
        assert!("bandpass".parse::<FilterType>().is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let good = r#"{"filter_type":"notch","frequency_hz":60.0,"gain_db":0.0,"q":4.0}"#;
        let band: BandParameters = serde_json::from_str(good).unwrap();
        assert_eq!(band.filter_type(), FilterType::Notch);

        let bad = r#"{"filter_type":"peaking","frequency_hz":1000.0,"gain_db":99.0,"q":1.0}"#;
        assert!(serde_json::from_str::<BandParameters>(bad).is_err());
    }

    #[test]
    fn test_db_conversions() {
        assert!((db_to_linear(20.0) - 10.0).abs() < 1e-12);
        assert_eq!(db_to_linear(0.0), 1.0);
        assert_eq!(linear_to_db(0.0, -96.0), -96.0);
        assert!((linear_to_db(1.0, -96.0)).abs() < 1e-12);
        assert_eq!(linear_to_db(1e-9, -96.0), -96.0);
    }
}
