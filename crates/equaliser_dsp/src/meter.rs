//! Level Meter
//!
//! Block RMS and peak in dBFS. One meter per tap point (input, output);
//! each `measure` call overwrites the previous reading.

use serde::{Deserialize, Serialize};

use crate::params::linear_to_db;

/// Readings below this are reported as this value
pub const METER_FLOOR_DB: f64 = -96.0;

/// One meter reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub rms_db: f64,
    pub peak_db: f64,
    /// Incremented on every measurement, lets readers spot stale values
    pub sequence: u64,
}

impl Default for MeterReading {
    fn default() -> Self {
        Self::SILENT
    }
}

impl MeterReading {
    pub const SILENT: Self = Self {
        rms_db: METER_FLOOR_DB,
        peak_db: METER_FLOOR_DB,
        sequence: 0,
    };
}

#[derive(Debug, Default)]
pub struct LevelMeter {
    last: MeterReading,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure one block of (interleaved) samples
    ///
    /// # Real-time Safety
    /// Single pass, no allocation.
    #[inline]
    pub fn measure(&mut self, buffer: &[f32]) -> MeterReading {
        let (sum_squares, peak) = buffer.iter().fold((0.0_f64, 0.0_f32), |(sum, peak), &s| {
            (sum + (s as f64) * (s as f64), peak.max(s.abs()))
        });
        let rms = if buffer.is_empty() {
            0.0
        } else {
            (sum_squares / buffer.len() as f64).sqrt()
        };

        self.last = MeterReading {
            rms_db: linear_to_db(rms, METER_FLOOR_DB),
            peak_db: linear_to_db(peak as f64, METER_FLOOR_DB),
            sequence: self.last.sequence.wrapping_add(1),
        };
        self.last
    }

    pub fn last(&self) -> MeterReading {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = MeterReading::SILENT;
    }
}

/// Linear RMS of a buffer, 0 for an empty one
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f64 {
    samples.iter().fold(0.0_f64, |acc, &s| acc.max((s as f64).abs()))
}
