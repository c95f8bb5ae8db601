//! Callback Body
//!
//! Everything the playback callback does once it holds an input block,
//! with no cpal types involved. The stream wires this into the device
//! callback; tests drive it directly with synthetic buffers.

use std::sync::Arc;

use equaliser_dsp::{EqEngine, LevelMeter, ProcessContext};

use crate::bridge::ConfigReader;
use crate::error::EngineResult;
use crate::levels::MeterBank;
use crate::stream::{StreamState, StreamStatus};

/// Per-stream processing state, owned by the playback callback
pub struct StreamProcessor {
    engine: EqEngine,
    reader: ConfigReader,
    applied_generation: u64,
    input_meter: LevelMeter,
    output_meter: LevelMeter,
    meters: Arc<MeterBank>,
    status: Arc<StreamStatus>,
}

impl StreamProcessor {
    /// Build a fresh engine for `context` from the reader's current config.
    ///
    /// Runs off the audio thread: this is where the config meets the
    /// stream's sample rate, so a band above Nyquist fails here.
    pub fn new(
        context: ProcessContext,
        mut reader: ConfigReader,
        meters: Arc<MeterBank>,
        status: Arc<StreamStatus>,
    ) -> EngineResult<Self> {
        let snapshot = Arc::clone(reader.acquire_latest());
        let engine = EqEngine::with_config(context, &snapshot.config)?;
        Ok(Self {
            engine,
            reader,
            applied_generation: snapshot.generation,
            input_meter: LevelMeter::new(),
            output_meter: LevelMeter::new(),
            meters,
            status,
        })
    }

    /// Process one block: pick up the newest config, meter, filter, meter.
    ///
    /// Writes silence unless the stream is Running.
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no logging.
    #[inline]
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        if self.status.state() != StreamState::Running {
            output.fill(0.0);
            return;
        }

        let snapshot = self.reader.acquire_latest();
        if snapshot.generation != self.applied_generation {
            // A band that fails to design passes audio through unchanged
            if self.engine.apply(&snapshot.config).is_err() {
                self.status.record_design_failure();
            }
            self.applied_generation = snapshot.generation;
        }

        let input_reading = self.input_meter.measure(input);
        if self.engine.process(input, output).is_err() {
            output.fill(0.0);
        }
        let output_reading = self.output_meter.measure(output);
        self.meters.publish(input_reading, output_reading);
    }

    pub fn engine(&self) -> &EqEngine {
        &self.engine
    }

    /// Generation of the config the engine currently runs
    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }
}
