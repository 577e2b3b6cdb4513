//! Sweep Frame Definitions
//!
//! A [`Frame`] is one validated sweep: the amplitude samples between the
//! header and terminator, plus statistics computed once at decode time.

use crate::amplitude;
use crate::config::FrequencySpan;
use crate::error::SweepError;
use crate::wire;
use serde::{Deserialize, Serialize};

/// Per-frame statistics in native amplitude-code space
///
/// Native codes are sign-inverted, so `min` is the strongest sample and
/// `max` the weakest. The dBm helpers take care of the inversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Smallest code (strongest signal)
    pub min: u8,
    /// Largest code (weakest signal)
    pub max: u8,
    /// Truncated integer mean of all codes
    pub mean: u8,
    /// First position holding `max`
    pub max_position: usize,
}

impl SampleStats {
    /// Compute statistics over a payload; all zero for an empty payload
    pub fn compute(samples: &[u8]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut min = u8::MAX;
        let mut max = 0u8;
        let mut max_position = 0;
        let mut sum = 0u32;

        for (position, &code) in samples.iter().enumerate() {
            min = min.min(code);
            // Strict comparison keeps the first occurrence
            if code > max {
                max = code;
                max_position = position;
            }
            sum += code as u32;
        }

        Self {
            min,
            max,
            mean: (sum / samples.len() as u32) as u8,
            max_position,
        }
    }

    /// Strongest sample in dBm (from `min`)
    pub fn strongest_dbm(&self) -> f64 {
        amplitude::to_dbm(self.min)
    }

    /// Weakest sample in dBm (from `max`)
    pub fn weakest_dbm(&self) -> f64 {
        amplitude::to_dbm(self.max)
    }

    /// Mean sample in dBm
    pub fn mean_dbm(&self) -> f64 {
        amplitude::to_dbm(self.mean)
    }
}

/// A single sample located within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSample {
    /// Sequence index of the frame holding the sample
    pub frame_index: u64,
    /// Position within that frame's payload
    pub position: usize,
    /// Native amplitude code
    pub value: u8,
}

impl PeakSample {
    /// Sample value in dBm
    pub fn dbm(&self) -> f64 {
        amplitude::to_dbm(self.value)
    }

    /// Frequency of the sample in a sweep of `steps` samples over `span`
    pub fn frequency_khz(&self, span: &FrequencySpan, steps: usize) -> f64 {
        span.frequency_khz(self.position, steps)
    }
}

/// One fully decoded sweep
///
/// Immutable once built; the samples are an independent copy of the
/// decoder's accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    index: u64,
    timestamp_ms: u64,
    session_offset_ms: u64,
    samples: Vec<u8>,
    stats: SampleStats,
    global_max: Option<PeakSample>,
    below_threshold_pct: f64,
}

impl Frame {
    pub(crate) fn new(
        index: u64,
        timestamp_ms: u64,
        session_offset_ms: u64,
        samples: Vec<u8>,
        stats: SampleStats,
        global_max: Option<PeakSample>,
        below_threshold_pct: f64,
    ) -> Self {
        Self {
            index,
            timestamp_ms,
            session_offset_ms,
            samples,
            stats,
            global_max,
            below_threshold_pct,
        }
    }

    /// Sequence index within the session, starting at 0
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Capture timestamp (caller's monotonic clock, ms) of the frame's first byte
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Milliseconds between the session start and this frame
    pub fn session_offset_ms(&self) -> u64 {
        self.session_offset_ms
    }

    /// Raw amplitude codes, in wire order
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Number of samples (the step count)
    pub fn step_count(&self) -> usize {
        self.samples.len()
    }

    /// Statistics for this frame alone
    pub fn stats(&self) -> &SampleStats {
        &self.stats
    }

    /// Session-wide maximum code as of this frame
    ///
    /// `None` only while the session has seen nothing but empty payloads.
    pub fn global_max(&self) -> Option<PeakSample> {
        self.global_max
    }

    /// Percentage of samples at or below the decoder's dBm threshold
    pub fn below_threshold_pct(&self) -> f64 {
        self.below_threshold_pct
    }

    /// Samples converted to dBm
    pub fn samples_dbm(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|&code| amplitude::to_dbm(code))
    }

    /// Frequency of sample `position` when this sweep covered `span`
    pub fn frequency_khz(&self, position: usize, span: &FrequencySpan) -> f64 {
        span.frequency_khz(position, self.step_count())
    }

    /// Frequency of this frame's weakest sample (`stats().max`)
    pub fn max_frequency_khz(&self, span: &FrequencySpan) -> f64 {
        self.frequency_khz(self.stats.max_position, span)
    }
}

/// Storage-ready view of a frame with whole-dBm values
///
/// Built with [`amplitude::to_dbm_truncated`], so every value loses its
/// half-dB bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    pub index: u64,
    pub timestamp_ms: u64,
    pub session_offset_ms: u64,
    pub samples_dbm: Vec<i16>,
    pub strongest_dbm: i16,
    pub weakest_dbm: i16,
    pub mean_dbm: i16,
    pub below_threshold_pct: f64,
}

impl From<&Frame> for SweepRecord {
    fn from(frame: &Frame) -> Self {
        Self {
            index: frame.index,
            timestamp_ms: frame.timestamp_ms,
            session_offset_ms: frame.session_offset_ms,
            samples_dbm: frame
                .samples
                .iter()
                .map(|&code| amplitude::to_dbm_truncated(code))
                .collect(),
            strongest_dbm: amplitude::to_dbm_truncated(frame.stats.min),
            weakest_dbm: amplitude::to_dbm_truncated(frame.stats.max),
            mean_dbm: amplitude::to_dbm_truncated(frame.stats.mean),
            below_threshold_pct: frame.below_threshold_pct,
        }
    }
}

/// Encode a payload as a complete wire frame
pub fn encode_frame(samples: &[u8]) -> Result<Vec<u8>, SweepError> {
    if samples.len() > wire::MAX_PAYLOAD_LEN {
        return Err(SweepError::PayloadTooLong { len: samples.len() });
    }

    let mut bytes = Vec::with_capacity(wire::HEADER_LEN + samples.len() + wire::TERMINATOR_LEN);
    bytes.push(wire::SYNC_1);
    bytes.push(wire::SYNC_2);
    bytes.push(samples.len() as u8);
    bytes.extend_from_slice(samples);
    bytes.push(wire::TERM_1);
    bytes.push(wire::TERM_2);
    Ok(bytes)
}
