//! Processing Context
//!
//! Stream metadata an engine is built for. Fixed for the lifetime of an
//! engine except for the sample rate, which can be changed explicitly.

use crate::band::MAX_CHANNELS;
use crate::error::DspError;
use crate::params::validate_sample_rate;

/// Context passed to the engine containing stream metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: f64,
    pub channels: usize,
    /// Largest block (in frames) the engine is expected to see per call
    pub buffer_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f64, channels: usize, buffer_size: usize) -> Result<Self, DspError> {
        let context = Self {
            sample_rate,
            channels,
            buffer_size,
        };
        context.validate()?;
        Ok(context)
    }

    pub fn validate(&self) -> Result<(), DspError> {
        validate_sample_rate(self.sample_rate)?;
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(DspError::InvalidChannelCount(self.channels));
        }
        if self.buffer_size == 0 {
            return Err(DspError::invalid(
                "buffer_size",
                self.buffer_size as f64,
                "must be at least one frame",
            ));
        }
        Ok(())
    }

    /// Nyquist frequency of this context
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_context() {
        let context = ProcessContext::new(48000.0, 2, 512).unwrap();
        assert_eq!(context.nyquist(), 24000.0);
    }

    #[test]
    fn test_rejects_bad_context() {
        assert!(matches!(
            ProcessContext::new(48000.0, 6, 512),
            Err(DspError::InvalidChannelCount(6))
        ));
        assert!(matches!(
            ProcessContext::new(48000.0, 0, 512),
            Err(DspError::InvalidChannelCount(0))
        ));
        assert!(matches!(
            ProcessContext::new(-1.0, 2, 512),
            Err(DspError::InvalidSampleRate(_))
        ));
        assert!(ProcessContext::new(48000.0, 2, 0).is_err());
    }
}
