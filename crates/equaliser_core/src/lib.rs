//! Equaliser Core - Real-time Engine
//!
//! This crate runs the DSP from `equaliser_dsp` against live audio:
//! - Audio device enumeration and stream management (via CPAL)
//! - Lock-free hand-off of EQ configurations into the audio callback
//! - Lock-free level metering back out of it
//! - The `EqController` control surface a UI drives
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │   UI ──edits──▶ EqController ──publish──▶ ParameterBridge   │
//! │        ◀──snapshot/events──     │                           │
//! └─────────────────────────────────┼───────────────────────────┘
//!                 crossbeam-channel │ (bounded, lock-free)
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Threads                          │
//! │   Capture ──rtrb──▶ StreamProcessor (EqEngine) ──▶ Output   │
//! │                           │                                 │
//! │                           └──▶ MeterBank (atomics)          │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod bridge;
mod callback;
mod config;
mod controller;
mod device;
mod error;
mod levels;
mod message;
mod stream;

pub use bridge::{ConfigReader, ConfigSnapshot, ParameterBridge, PENDING_CAPACITY};
pub use callback::StreamProcessor;
pub use config::StreamConfig;
pub use controller::{EqController, Snapshot};
pub use device::{check_support, resolve_device, AudioDevice, DeviceType};
pub use error::{EngineError, EngineResult};
pub use levels::MeterBank;
pub use message::Event;
pub use stream::{AudioStream, StopHandle, StreamState, StreamStatus};

// Re-export DSP types for convenience
pub use equaliser_dsp::{
    Band, BandId, BandParameters, EngineConfig, FilterType, MeterReading, ResponsePoint, MAX_BANDS,
};
