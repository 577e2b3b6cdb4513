//! Decoder configuration

use crate::error::SweepError;
use serde::{Deserialize, Serialize};

/// What to do with a new frame when the output queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame
    #[default]
    DropOldest,
    /// Discard the frame that just completed
    DropNewest,
}

/// How a declared payload length is checked against the step count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Accept any length; a differing length becomes the new step count
    #[default]
    Lenient,
    /// Reject frames whose length differs from a known step count
    Strict,
}

/// Swept frequency range, both ends included
///
/// Samples are spread evenly: the first sits on `start_khz`, the last on
/// `end_khz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencySpan {
    pub start_khz: u32,
    pub end_khz: u32,
}

impl FrequencySpan {
    /// Build a span, rejecting an empty or inverted range
    pub fn new(start_khz: u32, end_khz: u32) -> Result<Self, SweepError> {
        let span = Self { start_khz, end_khz };
        span.validate()?;
        Ok(span)
    }

    pub fn width_khz(&self) -> u32 {
        self.end_khz.saturating_sub(self.start_khz)
    }

    /// Frequency of sample `position` in a sweep of `steps` samples
    ///
    /// A single-step sweep sits on `start_khz`.
    pub fn frequency_khz(&self, position: usize, steps: usize) -> f64 {
        if steps <= 1 {
            return self.start_khz as f64;
        }
        let step_khz = self.width_khz() as f64 / (steps - 1) as f64;
        self.start_khz as f64 + position as f64 * step_khz
    }

    pub(crate) fn validate(&self) -> Result<(), SweepError> {
        if self.start_khz >= self.end_khz {
            return Err(SweepError::InvalidConfig(format!(
                "span start {} kHz must be below end {} kHz",
                self.start_khz, self.end_khz
            )));
        }
        Ok(())
    }
}

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Ring buffer capacity in bytes
    pub buffer_capacity: usize,

    /// Expected samples per frame, if already negotiated
    pub step_count: Option<u8>,

    /// dBm level used for the below-threshold percentage
    pub threshold_dbm: f64,

    /// Maximum queued frames (`None` = unbounded)
    pub queue_depth: Option<usize>,

    /// Applied when `queue_depth` is reached
    pub overflow_policy: OverflowPolicy,

    /// Step count validation
    pub length_policy: LengthPolicy,

    /// Re-examine a rejected byte as a possible frame start
    pub rescan_rejected_byte: bool,

    /// Swept range, for locating samples in frequency
    pub span: Option<FrequencySpan>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: ring_buffer::DEFAULT_CAPACITY,
            step_count: None,
            threshold_dbm: -100.0,
            queue_depth: None,
            overflow_policy: OverflowPolicy::DropOldest,
            length_policy: LengthPolicy::Lenient,
            rescan_rejected_byte: false,
            span: None,
        }
    }
}

impl DecoderConfig {
    /// Strict config: fixed step count, fast resync, bounded queue
    pub fn strict(step_count: u8) -> Self {
        Self {
            step_count: Some(step_count),
            queue_depth: Some(1024),
            length_policy: LengthPolicy::Strict,
            rescan_rejected_byte: true,
            ..Default::default()
        }
    }

    /// Check values that would otherwise panic or misbehave at runtime
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.buffer_capacity == 0 {
            return Err(SweepError::InvalidConfig(
                "buffer_capacity must be non-zero".to_string(),
            ));
        }
        if self.queue_depth == Some(0) {
            return Err(SweepError::InvalidConfig(
                "queue_depth must be non-zero when set".to_string(),
            ));
        }
        if !self.threshold_dbm.is_finite() {
            return Err(SweepError::InvalidConfig(format!(
                "threshold_dbm must be finite, got {}",
                self.threshold_dbm
            )));
        }
        if let Some(span) = &self.span {
            span.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DecoderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.length_policy, LengthPolicy::Lenient);
        assert!(!config.rescan_rejected_byte);
        assert!(config.queue_depth.is_none());
    }

    #[test]
    fn test_strict_preset() {
        let config = DecoderConfig::strict(112);
        assert!(config.validate().is_ok());
        assert_eq!(config.step_count, Some(112));
        assert_eq!(config.length_policy, LengthPolicy::Strict);
    }

    #[test]
    fn test_invalid_values() {
        let zero_capacity = DecoderConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_capacity.validate(),
            Err(SweepError::InvalidConfig(_))
        ));

        let zero_queue = DecoderConfig {
            queue_depth: Some(0),
            ..Default::default()
        };
        assert!(zero_queue.validate().is_err());

        let nan_threshold = DecoderConfig {
            threshold_dbm: f64::NAN,
            ..Default::default()
        };
        assert!(nan_threshold.validate().is_err());

        let inverted_span = DecoderConfig {
            span: Some(FrequencySpan {
                start_khz: 440_000,
                end_khz: 430_000,
            }),
            ..Default::default()
        };
        assert!(inverted_span.validate().is_err());
    }

    #[test]
    fn test_span_frequency_mapping() {
        let span = FrequencySpan::new(100_000, 101_110).unwrap();
        assert_eq!(span.width_khz(), 1110);
        // 112 steps => 111 intervals of 10 kHz
        assert_eq!(span.frequency_khz(0, 112), 100_000.0);
        assert_eq!(span.frequency_khz(1, 112), 100_010.0);
        assert_eq!(span.frequency_khz(111, 112), 101_110.0);
        assert_eq!(span.frequency_khz(0, 1), 100_000.0);
        assert!(FrequencySpan::new(5, 5).is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"step_count": 112, "overflow_policy": "drop_newest"}"#)
                .unwrap();
        assert_eq!(config.step_count, Some(112));
        assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.threshold_dbm, -100.0);
        assert!(config.span.is_none());
    }

    #[test]
    fn test_span_deserialize() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"span": {"start_khz": 430000, "end_khz": 440000}}"#)
                .unwrap();
        assert_eq!(config.span, Some(FrequencySpan::new(430_000, 440_000).unwrap()));
        assert!(config.validate().is_ok());
    }
}
