//! Message Types for Thread Communication
//!
//! Commands flow from the controller -> stream thread
//! Events flow from the stream thread and audio callbacks -> controller

use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::bridge::ConfigReader;
use crate::config::StreamConfig;
use crate::error::EngineResult;
use crate::levels::MeterBank;

/// Everything the stream thread needs to bring a stream up
pub(crate) struct StartRequest {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub config: StreamConfig,
    pub reader: ConfigReader,
    pub meters: Arc<MeterBank>,
    pub events: Sender<Event>,
    pub reply: Sender<EngineResult<()>>,
}

/// Commands sent from the controller to the stream thread
pub(crate) enum Command {
    /// Open devices and start processing
    Start(Box<StartRequest>),

    /// Stop processing and release the devices
    Stop { reply: Sender<()> },

    /// Shut the stream thread down
    Shutdown,
}

/// Events sent to the controller (and on to the UI)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Stream started successfully
    Started { sample_rate: u32, buffer_size: u32 },

    /// Stream stopped
    Stopped,

    /// Error occurred
    Error { message: String },

    /// Playback found the ring empty (audio glitch). At most one is
    /// queued until polled; every occurrence is counted in the status.
    BufferUnderrun,

    /// Capture found the ring full; samples were dropped
    BufferOverrun,

    /// A device went away; the stream has been halted. Reported by
    /// `EqController::poll_event` from the status flag, never queued.
    DeviceLost,

    /// A new EQ configuration was published
    ConfigPublished { generation: u64 },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
