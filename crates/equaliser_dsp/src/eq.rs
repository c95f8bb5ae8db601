//! Parametric Equalizer Engine
//!
//! A cascade of [`FilterBand`]s followed by a global gain stage. The cascade
//! is driven by [`EngineConfig`] values: applying a config reconciles the
//! live stages with the config's bands by id, so an edit to one band never
//! disturbs the filter state of the others.

use crate::band::FilterBand;
use crate::config::{BandId, EngineConfig, MAX_BANDS};
use crate::error::DspError;
use crate::params::{db_to_linear, validate_sample_rate};
use crate::processor::ProcessContext;

/// The main equalizer processor
///
/// Holds the filter state and processes interleaved audio.
/// Designed for real-time use: `apply()` and `process()` never allocate.
pub struct EqEngine {
    context: ProcessContext,
    // Twice MAX_BANDS so reconciliation can stage every new band before
    // dropping the removed ones without growing the Vec
    stages: Vec<FilterBand>,
    global_gain_db: f64,
    gain_linear: f32,
    bypass: bool,
}

impl EqEngine {
    /// Create an engine with an empty cascade at 0 dB
    pub fn new(context: ProcessContext) -> Self {
        Self {
            context,
            stages: Vec::with_capacity(MAX_BANDS * 2),
            global_gain_db: 0.0,
            gain_linear: 1.0,
            bypass: false,
        }
    }

    /// Create an engine and apply `config` to it
    pub fn with_config(context: ProcessContext, config: &EngineConfig) -> Result<Self, DspError> {
        context.validate()?;
        config.validate_for_rate(context.sample_rate)?;
        let mut engine = Self::new(context);
        engine.apply(config)?;
        Ok(engine)
    }

    /// Bring the cascade in line with `config`.
    ///
    /// Stages whose band id survives keep their state, new ids start from
    /// zero and missing ids are discarded. Coefficients are only re-derived
    /// for bands whose parameters changed.
    ///
    /// A band that cannot be designed at the current rate passes audio
    /// through unchanged; the first such failure is returned.
    ///
    /// # Real-time Safety
    /// No allocations: the stage Vec is pre-sized for the worst case.
    pub fn apply(&mut self, config: &EngineConfig) -> Result<(), DspError> {
        let sample_rate = self.context.sample_rate;
        let mut result = Ok(());

        for (position, band) in config.bands().iter().enumerate() {
            let existing = self.stages[position..]
                .iter()
                .position(|stage| stage.id() == band.id);

            let outcome = match existing {
                Some(offset) => {
                    self.stages.swap(position, position + offset);
                    self.stages[position].update(*band, sample_rate)
                }
                None => {
                    let (stage, outcome) = FilterBand::new(*band, sample_rate);
                    self.stages.push(stage);
                    let last = self.stages.len() - 1;
                    self.stages.swap(position, last);
                    outcome
                }
            };

            if result.is_ok() {
                result = outcome;
            }
        }
        self.stages.truncate(config.len());

        if self.bypass && !config.bypass() {
            self.reset();
        }
        self.bypass = config.bypass();
        self.global_gain_db = config.global_gain_db();
        self.gain_linear = db_to_linear(config.global_gain_db()) as f32;

        result
    }

    /// Process an interleaved buffer from `input` into `output`
    ///
    /// Both buffers must have the same length, a whole number of frames
    /// for the engine's channel count.
    ///
    /// # Real-time Safety
    /// This function performs NO allocations and NO syscalls.
    /// Safe to call from audio callback.
    #[inline]
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), DspError> {
        let channels = self.context.channels;
        if input.len() != output.len() {
            return Err(DspError::BufferSizeMismatch {
                expected: input.len(),
                got: output.len(),
            });
        }
        if input.len() % channels != 0 {
            return Err(DspError::BufferSizeMismatch {
                expected: input.len() - input.len() % channels,
                got: input.len(),
            });
        }

        if self.bypass {
            output.copy_from_slice(input);
            return Ok(());
        }

        for (frame_in, frame_out) in input
            .chunks_exact(channels)
            .zip(output.chunks_exact_mut(channels))
        {
            for (channel, (&x, y)) in frame_in.iter().zip(frame_out.iter_mut()).enumerate() {
                let mut sample = x;
                for stage in &mut self.stages {
                    if stage.is_enabled() {
                        sample = stage.process(channel, sample);
                    }
                }
                *y = sample * self.gain_linear;
            }
        }

        Ok(())
    }

    /// Apply `config` then process one block
    pub fn render(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        config: &EngineConfig,
    ) -> Result<(), DspError> {
        let applied = self.apply(config);
        self.process(input, output)?;
        applied
    }

    /// Switch to a new sample rate.
    ///
    /// Every band is re-designed and all filter state is cleared. Fails
    /// without changing anything if a band would sit at or above the new
    /// Nyquist frequency.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<(), DspError> {
        validate_sample_rate(sample_rate)?;
        for stage in &self.stages {
            stage.band().params.validate_for_rate(sample_rate)?;
        }

        self.context.sample_rate = sample_rate;
        for stage in &mut self.stages {
            stage.redesign(sample_rate)?;
        }
        self.reset();
        Ok(())
    }

    /// Reset filter state (clear delay lines)
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    pub fn sample_rate(&self) -> f64 {
        self.context.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.context.channels
    }

    /// Live stages in cascade order
    pub fn stages(&self) -> &[FilterBand] {
        &self.stages
    }

    /// Band ids in cascade order
    pub fn band_ids(&self) -> impl Iterator<Item = BandId> + '_ {
        self.stages.iter().map(FilterBand::id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn global_gain_db(&self) -> f64 {
        self.global_gain_db
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// True when no stage holds any residual state
    pub fn is_silent(&self) -> bool {
        self.stages.iter().all(FilterBand::is_silent)
    }
}
