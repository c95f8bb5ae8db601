//! Stream Configuration

use serde::{Deserialize, Serialize};

use equaliser_dsp::{DspError, ProcessContext};

/// Audio stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,

    /// Capture-to-playback ring capacity, in buffers
    #[serde(default = "default_ring_buffer_blocks")]
    pub ring_buffer_blocks: u32,
}

fn default_ring_buffer_blocks() -> u32 {
    4
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 256,
            ring_buffer_blocks: default_ring_buffer_blocks(),
        }
    }
}

impl StreamConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            buffer_size: 128, // ~2.6ms latency
            ring_buffer_blocks: 8,
            ..Self::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            buffer_size: 1024, // ~21ms latency
            ring_buffer_blocks: 4,
            ..Self::default()
        }
    }

    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Samples (not frames) in one device buffer
    pub fn block_samples(&self) -> usize {
        self.buffer_size as usize * self.channels as usize
    }

    /// Ring capacity in samples
    pub fn ring_capacity(&self) -> usize {
        self.block_samples() * self.ring_buffer_blocks as usize
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        if self.ring_buffer_blocks < 2 || self.ring_buffer_blocks > 16 {
            return Err(format!(
                "Invalid ring buffer size: {} blocks",
                self.ring_buffer_blocks
            ));
        }
        Ok(())
    }

    /// DSP context matching this stream
    pub fn process_context(&self) -> Result<ProcessContext, DspError> {
        ProcessContext::new(
            self.sample_rate as f64,
            self.channels as usize,
            self.buffer_size as usize,
        )
    }

    pub(crate) fn to_cpal(self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.buffer_size),
        }
    }
}
