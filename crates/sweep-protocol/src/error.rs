//! Sweep Protocol Error Types

use thiserror::Error;

/// Errors surfaced by the sweep protocol crate
///
/// Decoding itself never fails: malformed input is dropped and counted.
/// These errors cover encoding, configuration and stream I/O.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Payload does not fit the one-byte length field
    #[error("Payload of {len} samples exceeds the 255 sample frame limit")]
    PayloadTooLong { len: usize },

    /// Configuration rejected by validation
    #[error("Invalid decoder configuration: {0}")]
    InvalidConfig(String),

    /// Underlying byte stream failed
    #[error("Stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame consumer went away
    #[error("Frame consumer closed the channel")]
    ChannelClosed,
}
