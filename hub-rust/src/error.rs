//! # error
//!
//! Error type for the hub library. Driver code wraps these in `anyhow` at the edges.

use armband_types::DeviceHandle;
use thiserror::Error;

/// Errors surfaced by the handshake hub library.
#[derive(Error, Debug)]
pub enum MeetError {
    /// An orientation/pose/connection event arrived for a handle that never paired.
    /// This is an integration error in the driver, not a gesture condition.
    #[error("event for unpaired device {0}")]
    UnknownDevice(DeviceHandle),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("recording line {line}: {source}")]
    Recording {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type MeetResult<T> = Result<T, MeetError>;
