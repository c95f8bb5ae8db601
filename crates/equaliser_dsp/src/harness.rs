//! Offline Harness
//!
//! Runs a complete signal through a fresh engine block by block, the same
//! way the audio callback would, and reports levels before and after.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::eq::EqEngine;
use crate::error::DspError;
use crate::meter::{peak, rms, METER_FLOOR_DB};
use crate::params::linear_to_db;
use crate::processor::ProcessContext;

/// Levels of one offline run
#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub input_rms: f64,
    pub output_rms: f64,
    pub input_rms_db: f64,
    pub output_rms_db: f64,
    pub input_peak_db: f64,
    pub output_peak_db: f64,
    pub frames: usize,
    /// Processed signal, interleaved
    #[serde(skip)]
    pub output: Vec<f32>,
}

impl HarnessReport {
    /// Output level relative to input (dB)
    pub fn gain_db(&self) -> f64 {
        self.output_rms_db - self.input_rms_db
    }
}

/// Process `signal` (interleaved, `channels` wide) through `config`
pub fn run_offline(
    signal: &[f32],
    channels: usize,
    sample_rate: f64,
    config: &EngineConfig,
    block_size: usize,
) -> Result<HarnessReport, DspError> {
    let context = ProcessContext::new(sample_rate, channels, block_size)?;
    let mut engine = EqEngine::with_config(context, config)?;

    let mut output = vec![0.0_f32; signal.len()];
    let block_samples = block_size * channels;
    for (input, out) in signal
        .chunks(block_samples)
        .zip(output.chunks_mut(block_samples))
    {
        engine.process(input, out)?;
    }

    let input_rms = rms(signal);
    let output_rms = rms(&output);
    Ok(HarnessReport {
        input_rms,
        output_rms,
        input_rms_db: linear_to_db(input_rms, METER_FLOOR_DB),
        output_rms_db: linear_to_db(output_rms, METER_FLOOR_DB),
        input_peak_db: linear_to_db(peak(signal), METER_FLOOR_DB),
        output_peak_db: linear_to_db(peak(&output), METER_FLOOR_DB),
        frames: signal.len() / channels,
        output,
    })
}
