//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the audio engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] equaliser_dsp::DspError),

    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Stream configuration error: {0}")]
    ConfigError(String),

    #[error("Stream already running")]
    AlreadyRunning,

    #[error("Stream not running")]
    NotRunning,

    #[error("Stream start cancelled")]
    Cancelled,

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("Channel receive error - sender dropped")]
    ChannelRecvError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
