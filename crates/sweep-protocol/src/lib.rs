//! Spectrum Analyzer Sweep Protocol
//!
//! This crate turns the raw, unsynchronized byte stream of a spectrum
//! analyzer into validated sweep frames. Bytes may arrive in chunks of any
//! size; the decoder buffers them, locks onto the `$S` sync pattern and
//! reassembles frames across chunk boundaries.

pub mod amplitude;
mod config;
mod decoder;
mod error;
mod frame;
mod reader;

pub use config::{DecoderConfig, FrequencySpan, LengthPolicy, OverflowPolicy};
pub use decoder::{DecodeState, DecoderStats, FrameDecoder, RejectReason};
pub use error::SweepError;
pub use frame::{encode_frame, Frame, PeakSample, SampleStats, SweepRecord};
pub use reader::FrameReader;

/// Wire format constants
///
/// ```text
/// '$' 'S' N <N amplitude bytes> '\r' '\n'
/// ```
pub mod wire {
    /// First sync byte ('$')
    pub const SYNC_1: u8 = 0x24;
    /// Second sync byte ('S')
    pub const SYNC_2: u8 = 0x53;
    /// First terminator byte ('\r')
    pub const TERM_1: u8 = 0x0D;
    /// Second terminator byte ('\n')
    pub const TERM_2: u8 = 0x0A;
    /// Sync bytes plus the length byte
    pub const HEADER_LEN: usize = 3;
    /// Terminator bytes
    pub const TERMINATOR_LEN: usize = 2;
    /// Largest payload the one-byte length field can declare
    pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
    /// Accumulator size, one byte larger than the largest legal frame
    pub const MAX_FRAME_LEN: usize = 261;
}
