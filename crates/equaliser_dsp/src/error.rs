//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Invalid {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("Too many bands: {count} (maximum is {max})")]
    TooManyBands { count: usize, max: usize },

    #[error("Duplicate band id: {0}")]
    DuplicateBandId(u32),

    #[error("Invalid band index: {index} (config has {len} bands)")]
    InvalidBandIndex { index: usize, len: usize },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("Unsupported channel count: {0} (must be 1 or 2)")]
    InvalidChannelCount(usize),
}

impl DspError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        DspError::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}
