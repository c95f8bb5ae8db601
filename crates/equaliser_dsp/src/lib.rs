//! Equaliser DSP - Digital Signal Processing Module
//!
//! This crate provides the audio processing pipeline for the equaliser:
//! - RBJ cookbook biquad design for six filter shapes
//! - A cascade engine driven by immutable `EngineConfig` values
//! - Block level metering and frequency-response evaluation
//! - Synthetic signals and an offline harness for smoke tests
//!
//! # Architecture
//!
//! The DSP chain follows a strict "no allocation in audio callback" rule.
//! Configs are built and validated off the audio thread; the engine only
//! reconciles its pre-allocated stages with whatever config it is handed.

mod band;
mod biquad;
mod config;
mod eq;
mod error;
pub mod harness;
mod meter;
mod params;
pub mod presets;
mod processor;
mod response;
pub mod signals;

pub use band::{FilterBand, MAX_CHANNELS};
pub use biquad::{BiquadCoefficients, BiquadFilter, BiquadState};
pub use config::{
    Band, BandId, EngineConfig, DEFAULT_GLOBAL_GAIN_DB, MAX_BANDS, MAX_GLOBAL_GAIN_DB,
};
pub use eq::EqEngine;
pub use error::DspError;
pub use harness::{run_offline, HarnessReport};
pub use meter::{peak, rms, LevelMeter, MeterReading, METER_FLOOR_DB};
pub use params::{
    db_to_linear, linear_to_db, BandParameters, FilterType, MAX_BAND_GAIN_DB, MAX_Q, MIN_Q,
};
pub use presets::{find_preset, Preset, PRESETS};
pub use processor::ProcessContext;
pub use response::{
    frequency_response, log_frequencies, ResponsePoint, DEFAULT_RESPONSE_POINTS,
    RESPONSE_MIN_HZ,
};
