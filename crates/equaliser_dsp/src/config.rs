//! EQ Configuration
//!
//! `EngineConfig` is the unit handed from the control path to the audio
//! path. It is an immutable value: every edit method returns a new config
//! and leaves `self` untouched.

use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::params::BandParameters;

/// Maximum number of bands in one cascade
pub const MAX_BANDS: usize = 32;

/// Global gain bound (dB, symmetric)
pub const MAX_GLOBAL_GAIN_DB: f64 = 12.0;

/// Default global gain: a little headroom for boosts
pub const DEFAULT_GLOBAL_GAIN_DB: f64 = -3.0;

/// Stable identity of a band across edits and reorders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BandId(pub u32);

impl std::fmt::Display for BandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "band#{}", self.0)
    }
}

/// One entry of the cascade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub id: BandId,
    pub params: BandParameters,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Band {
    pub fn new(id: BandId, params: BandParameters) -> Self {
        Self {
            id,
            params,
            enabled: true,
        }
    }
}

/// Complete EQ configuration: ordered bands, global gain and bypass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEngineConfig")]
pub struct EngineConfig {
    bands: Vec<Band>,
    global_gain_db: f64,
    bypass: bool,
}

#[derive(Deserialize)]
struct RawEngineConfig {
    bands: Vec<Band>,
    global_gain_db: f64,
    #[serde(default)]
    bypass: bool,
}

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = DspError;

    fn try_from(raw: RawEngineConfig) -> Result<Self, Self::Error> {
        EngineConfig::new(raw.bands, raw.global_gain_db, raw.bypass)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            global_gain_db: DEFAULT_GLOBAL_GAIN_DB,
            bypass: false,
        }
    }
}

impl EngineConfig {
    pub fn new(bands: Vec<Band>, global_gain_db: f64, bypass: bool) -> Result<Self, DspError> {
        validate_global_gain(global_gain_db)?;
        validate_bands(&bands)?;
        Ok(Self {
            bands,
            global_gain_db,
            bypass,
        })
    }

    /// Empty cascade at 0 dB, not bypassed
    pub fn flat() -> Self {
        Self {
            global_gain_db: 0.0,
            ..Self::default()
        }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn global_gain_db(&self) -> f64 {
        self.global_gain_db
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Position of the band with `id`, if present
    pub fn index_of(&self, id: BandId) -> Option<usize> {
        self.bands.iter().position(|b| b.id == id)
    }

    /// Append a band at the end of the cascade
    pub fn with_band(&self, band: Band) -> Result<Self, DspError> {
        self.with_band_inserted(self.bands.len(), band)
    }

    /// Insert a band at `index` (`index == len` appends)
    pub fn with_band_inserted(&self, index: usize, band: Band) -> Result<Self, DspError> {
        if index > self.bands.len() {
            return Err(self.index_error(index));
        }
        let mut bands = self.bands.clone();
        bands.insert(index, band);
        validate_bands(&bands)?;
        Ok(self.replacing_bands(bands))
    }

    /// Replace the parameters of band `index`, keeping its identity
    pub fn with_band_replaced(&self, index: usize, params: BandParameters) -> Result<Self, DspError> {
        let mut bands = self.bands.clone();
        let band = bands.get_mut(index).ok_or_else(|| self.index_error(index))?;
        band.params = params;
        Ok(self.replacing_bands(bands))
    }

    pub fn with_band_enabled(&self, index: usize, enabled: bool) -> Result<Self, DspError> {
        let mut bands = self.bands.clone();
        let band = bands.get_mut(index).ok_or_else(|| self.index_error(index))?;
        band.enabled = enabled;
        Ok(self.replacing_bands(bands))
    }

    /// Remove band `index`
    pub fn without_band(&self, index: usize) -> Result<Self, DspError> {
        if index >= self.bands.len() {
            return Err(self.index_error(index));
        }
        let mut bands = self.bands.clone();
        bands.remove(index);
        Ok(self.replacing_bands(bands))
    }

    /// Move band `from` to position `to`, shifting the bands in between
    pub fn with_band_moved(&self, from: usize, to: usize) -> Result<Self, DspError> {
        if from >= self.bands.len() {
            return Err(self.index_error(from));
        }
        if to >= self.bands.len() {
            return Err(self.index_error(to));
        }
        let mut bands = self.bands.clone();
        let band = bands.remove(from);
        bands.insert(to, band);
        Ok(self.replacing_bands(bands))
    }

    pub fn with_global_gain(&self, global_gain_db: f64) -> Result<Self, DspError> {
        validate_global_gain(global_gain_db)?;
        Ok(Self {
            global_gain_db,
            ..self.clone()
        })
    }

    pub fn with_bypass(&self, bypass: bool) -> Self {
        Self {
            bypass,
            ..self.clone()
        }
    }

    /// Check every band against the Nyquist bound of `sample_rate`
    pub fn validate_for_rate(&self, sample_rate: f64) -> Result<(), DspError> {
        self.bands
            .iter()
            .try_for_each(|band| band.params.validate_for_rate(sample_rate))
    }

    /// Highest id in use, for seeding an id allocator
    pub fn max_band_id(&self) -> Option<BandId> {
        self.bands.iter().map(|b| b.id).max()
    }

    fn replacing_bands(&self, bands: Vec<Band>) -> Self {
        Self {
            bands,
            global_gain_db: self.global_gain_db,
            bypass: self.bypass,
        }
    }

    fn index_error(&self, index: usize) -> DspError {
        DspError::InvalidBandIndex {
            index,
            len: self.bands.len(),
        }
    }
}

fn validate_global_gain(global_gain_db: f64) -> Result<(), DspError> {
    if !global_gain_db.is_finite() || global_gain_db.abs() > MAX_GLOBAL_GAIN_DB {
        return Err(DspError::invalid(
            "global_gain_db",
            global_gain_db,
            "must be within +/-12 dB",
        ));
    }
    Ok(())
}

fn validate_bands(bands: &[Band]) -> Result<(), DspError> {
    if bands.len() > MAX_BANDS {
        return Err(DspError::TooManyBands {
            count: bands.len(),
            max: MAX_BANDS,
        });
    }
    for (i, band) in bands.iter().enumerate() {
        if bands[..i].iter().any(|other| other.id == band.id) {
            return Err(DspError::DuplicateBandId(band.id.0));
        }
    }
    Ok(())
}
