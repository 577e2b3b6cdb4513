//! Sweep Frame Decoder
//!
//! Byte-stream state machine that recognizes `$S N <payload> \r\n` frames.
//! Input is staged in a [`RingBuffer`] and scanned one byte at a time
//! (payload bytes are copied in bulk). The machine suspends between `feed`
//! calls with its partial frame intact, so chunk boundaries can fall
//! anywhere.

use crate::amplitude;
use crate::config::{DecoderConfig, FrequencySpan, LengthPolicy, OverflowPolicy};
use crate::error::SweepError;
use crate::frame::{Frame, PeakSample, SampleStats};
use crate::wire::{
    HEADER_LEN, MAX_FRAME_LEN, SYNC_1, SYNC_2, TERMINATOR_LEN, TERM_1, TERM_2,
};
use metrics::counter;
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Bytes moved from the ring buffer per scan pass
const DRAIN_CHUNK: usize = 512;

/// Parser position within a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeState {
    /// Scanning for '$'; anything else is noise
    #[default]
    AwaitSync1,
    /// Expecting 'S'
    AwaitSync2,
    /// Next byte is the payload length
    AwaitLength,
    /// Collecting payload bytes
    AwaitPayload,
    /// Expecting '\r'
    AwaitTerm1,
    /// Expecting '\n'
    AwaitTerm2,
}

/// Why an in-flight frame was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Second sync byte did not follow the first
    SyncMismatch,
    /// Declared length differs from the step count under [`LengthPolicy::Strict`]
    LengthMismatch,
    /// Terminator bytes missing after the payload
    TerminatorMismatch,
    /// Declared frame would not fit the accumulator
    AccumulatorOverflow,
}

impl RejectReason {
    /// Short label for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::SyncMismatch => "sync_mismatch",
            RejectReason::LengthMismatch => "length_mismatch",
            RejectReason::TerminatorMismatch => "terminator_mismatch",
            RejectReason::AccumulatorOverflow => "accumulator_overflow",
        }
    }
}

/// Running decoder counters
///
/// These make silent drops observable without changing control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    /// Bytes passed to `feed`
    pub bytes_fed: u64,
    /// Bytes skipped while waiting for a frame start
    pub noise_bytes: u64,
    /// Frames completed (including any later dropped from the queue)
    pub frames_decoded: u64,
    pub frames_rejected_sync: u64,
    pub frames_rejected_length: u64,
    pub frames_rejected_terminator: u64,
    pub frames_rejected_overflow: u64,
    /// Frames discarded because the output queue was full
    pub frames_dropped: u64,
    /// Times a frame's length replaced the expected step count
    pub step_count_changes: u64,
    /// In-flight frames abandoned by `reset`
    pub partial_frames_discarded: u64,
}

impl DecoderStats {
    /// Total frames abandoned for any reason
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected_sync
            + self.frames_rejected_length
            + self.frames_rejected_terminator
            + self.frames_rejected_overflow
    }

    fn record_reject(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::SyncMismatch => self.frames_rejected_sync += 1,
            RejectReason::LengthMismatch => self.frames_rejected_length += 1,
            RejectReason::TerminatorMismatch => self.frames_rejected_terminator += 1,
            RejectReason::AccumulatorOverflow => self.frames_rejected_overflow += 1,
        }
    }
}

/// Stateful sweep frame decoder
///
/// Single producer of the frame queue. Not internally synchronized: wrap
/// it in a lock if `feed` may be called from more than one thread.
pub struct FrameDecoder {
    config: DecoderConfig,
    ring: RingBuffer,
    state: DecodeState,
    accumulator: [u8; MAX_FRAME_LEN],
    acc_len: usize,
    declared_len: usize,
    /// Timestamp of the chunk holding the in-flight frame's first byte
    frame_started_ms: u64,
    step_count: Option<u8>,
    next_index: u64,
    global_max: Option<PeakSample>,
    /// Set when the global maximum moves, cleared by the caller
    global_max_changed: bool,
    last_below_threshold_pct: Option<f64>,
    /// Origin of `Frame::session_offset_ms`
    session_started_ms: Option<u64>,
    queue: VecDeque<Frame>,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a decoder after validating `config`
    pub fn new(config: DecoderConfig) -> Result<Self, SweepError> {
        config.validate()?;
        debug!(
            buffer_capacity = config.buffer_capacity,
            step_count = ?config.step_count,
            "Creating frame decoder"
        );
        Ok(Self::build(config))
    }

    fn build(config: DecoderConfig) -> Self {
        Self {
            ring: RingBuffer::new(config.buffer_capacity),
            step_count: config.step_count,
            config,
            state: DecodeState::AwaitSync1,
            accumulator: [0u8; MAX_FRAME_LEN],
            acc_len: 0,
            declared_len: 0,
            frame_started_ms: 0,
            next_index: 0,
            global_max: None,
            global_max_changed: false,
            last_below_threshold_pct: None,
            session_started_ms: None,
            queue: VecDeque::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Ingest a chunk of raw bytes received at `timestamp_ms`
    ///
    /// Any number of frames may complete; they are queued for
    /// [`pop_frame`](Self::pop_frame). Returns how many frames completed
    /// during this call. A chunk ending mid-frame leaves the partial frame
    /// pending for the next call.
    pub fn feed(&mut self, bytes: &[u8], timestamp_ms: u64) -> usize {
        let decoded_before = self.stats.frames_decoded;
        let noise_before = self.stats.noise_bytes;
        self.stats.bytes_fed += bytes.len() as u64;

        // The ring is drained after every write, so each pass makes progress
        let mut offset = 0;
        while offset < bytes.len() {
            offset += self.ring.write(&bytes[offset..]);
            self.drain(timestamp_ms);
        }

        counter!("sweep_bytes_fed_total").increment(bytes.len() as u64);
        let noise = self.stats.noise_bytes - noise_before;
        if noise > 0 {
            counter!("sweep_noise_bytes_total").increment(noise);
        }
        (self.stats.frames_decoded - decoded_before) as usize
    }

    /// Whether a decoded frame is waiting
    pub fn has_frame(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Take the oldest decoded frame
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.queue.pop_front()
    }

    /// Number of decoded frames waiting
    pub fn pending_frames(&self) -> usize {
        self.queue.len()
    }

    /// Pop frames until the queue is empty
    pub fn frames(&mut self) -> impl Iterator<Item = Frame> + '_ {
        std::iter::from_fn(move || self.pop_frame())
    }

    /// Abandon the in-flight frame and any staged bytes
    ///
    /// Queued frames, the frame sequence and the global maximum are kept.
    pub fn reset(&mut self) {
        if self.acc_len > 0 || !self.ring.is_empty() {
            debug!(
                partial = self.acc_len,
                staged = self.ring.used(),
                "Discarding partial frame on reset"
            );
        }
        if self.acc_len > 0 {
            self.stats.partial_frames_discarded += 1;
            counter!("sweep_partial_frames_discarded_total").increment(1);
        }
        self.reset_state();
        self.ring.clear();
    }

    /// Set the negotiated step count and begin a new session
    pub fn configure(&mut self, step_count: u8) {
        debug!(step_count, "Configuring decoder");
        self.step_count = Some(step_count);
        self.reset();
        self.start_session();
    }

    /// Begin a new acquisition session
    ///
    /// The next frame gets index 0 and re-seeds the global maximum. The
    /// session clock starts at that frame's timestamp.
    pub fn start_session(&mut self) {
        debug!(previous_frames = self.next_index, "Starting new session");
        self.next_index = 0;
        self.global_max = None;
        self.global_max_changed = false;
        self.last_below_threshold_pct = None;
        self.session_started_ms = None;
    }

    /// Begin a new session whose clock starts at `timestamp_ms`
    ///
    /// Use this with the time the sweep configuration was sent, so frame
    /// offsets include the analyzer's settling delay.
    pub fn start_session_at(&mut self, timestamp_ms: u64) {
        self.start_session();
        self.session_started_ms = Some(timestamp_ms);
    }

    /// Set the swept frequency range used to locate samples
    ///
    /// Takes effect immediately and does not start a session.
    pub fn set_span(&mut self, span: Option<FrequencySpan>) -> Result<(), SweepError> {
        if let Some(span) = &span {
            span.validate()?;
        }
        debug!(?span, "Frequency span set");
        self.config.span = span;
        Ok(())
    }

    /// Change the dBm threshold used for subsequent frames
    pub fn set_threshold_dbm(&mut self, threshold_dbm: f64) -> Result<(), SweepError> {
        if !threshold_dbm.is_finite() {
            return Err(SweepError::InvalidConfig(format!(
                "threshold_dbm must be finite, got {threshold_dbm}"
            )));
        }
        self.config.threshold_dbm = threshold_dbm;
        Ok(())
    }

    /// Replace the staging buffer with one of `capacity` bytes
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn set_buffer_capacity(&mut self, capacity: usize) {
        self.ring.resize(capacity);
        self.config.buffer_capacity = capacity;
    }

    /// Current parser state
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes held for the in-flight frame
    pub fn partial_len(&self) -> usize {
        self.acc_len
    }

    /// Expected samples per frame, if known
    pub fn step_count(&self) -> Option<u8> {
        self.step_count
    }

    /// Session-wide maximum code, if any non-empty frame has been decoded
    pub fn global_max(&self) -> Option<PeakSample> {
        self.global_max
    }

    /// Whether the global maximum moved since the flag was last taken
    pub fn global_max_changed(&self) -> bool {
        self.global_max_changed
    }

    /// Read and clear the global-maximum change flag
    pub fn take_global_max_changed(&mut self) -> bool {
        std::mem::take(&mut self.global_max_changed)
    }

    /// Frequency of the global maximum, in kHz
    ///
    /// `None` until a span is set and a non-empty frame has been decoded.
    pub fn global_max_frequency_khz(&self) -> Option<f64> {
        let span = self.config.span?;
        let steps = self.step_count?;
        self.global_max
            .map(|peak| span.frequency_khz(peak.position, steps as usize))
    }

    /// Timestamp the current session's clock started at
    pub fn session_started_ms(&self) -> Option<u64> {
        self.session_started_ms
    }

    /// Milliseconds from the session start to `timestamp_ms`
    pub fn session_elapsed_ms(&self, timestamp_ms: u64) -> Option<u64> {
        self.session_started_ms
            .map(|started| timestamp_ms.saturating_sub(started))
    }

    /// Below-threshold percentage of the most recent frame
    pub fn last_below_threshold_pct(&self) -> Option<f64> {
        self.last_below_threshold_pct
    }

    /// Frames decoded in the current session
    pub fn session_frames(&self) -> u64 {
        self.next_index
    }

    /// Counters since construction
    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Staging buffer, for capacity and loss inspection
    pub fn buffer(&self) -> &RingBuffer {
        &self.ring
    }

    fn drain(&mut self, timestamp_ms: u64) {
        let mut chunk = [0u8; DRAIN_CHUNK];
        loop {
            let n = self.ring.read(&mut chunk);
            if n == 0 {
                break;
            }
            self.consume(&chunk[..n], timestamp_ms);
        }
    }

    fn consume(&mut self, bytes: &[u8], timestamp_ms: u64) {
        let mut i = 0;
        while i < bytes.len() {
            if self.state == DecodeState::AwaitPayload {
                let wanted = HEADER_LEN + self.declared_len - self.acc_len;
                let take = wanted.min(bytes.len() - i);
                self.accumulator[self.acc_len..self.acc_len + take]
                    .copy_from_slice(&bytes[i..i + take]);
                self.acc_len += take;
                i += take;
                if take == wanted {
                    self.state = DecodeState::AwaitTerm1;
                }
                continue;
            }
            self.step(bytes[i], timestamp_ms);
            i += 1;
        }
    }

    fn step(&mut self, byte: u8, timestamp_ms: u64) {
        match self.state {
            DecodeState::AwaitSync1 => {
                if byte == SYNC_1 {
                    self.begin_frame(timestamp_ms);
                } else {
                    self.stats.noise_bytes += 1;
                }
            }
            DecodeState::AwaitSync2 => {
                if byte == SYNC_2 {
                    self.push(byte);
                    self.state = DecodeState::AwaitLength;
                } else {
                    self.reject(RejectReason::SyncMismatch, byte, timestamp_ms);
                }
            }
            DecodeState::AwaitLength => {
                let len = byte as usize;
                if HEADER_LEN + len + TERMINATOR_LEN > MAX_FRAME_LEN {
                    // Unreachable with a one-byte length and a 261-byte accumulator
                    self.reject(RejectReason::AccumulatorOverflow, byte, timestamp_ms);
                    return;
                }
                if self.config.length_policy == LengthPolicy::Strict {
                    if let Some(expected) = self.step_count {
                        if expected != byte {
                            debug!(expected, declared = byte, "Declared length mismatch");
                            self.reject(RejectReason::LengthMismatch, byte, timestamp_ms);
                            return;
                        }
                    }
                }
                self.push(byte);
                self.declared_len = len;
                self.state = if len == 0 {
                    DecodeState::AwaitTerm1
                } else {
                    DecodeState::AwaitPayload
                };
            }
            DecodeState::AwaitPayload => {
                self.push(byte);
                if self.acc_len == HEADER_LEN + self.declared_len {
                    self.state = DecodeState::AwaitTerm1;
                }
            }
            DecodeState::AwaitTerm1 => {
                if byte == TERM_1 {
                    self.push(byte);
                    self.state = DecodeState::AwaitTerm2;
                } else {
                    self.reject(RejectReason::TerminatorMismatch, byte, timestamp_ms);
                }
            }
            DecodeState::AwaitTerm2 => {
                if byte == TERM_2 {
                    self.push(byte);
                    self.complete_frame();
                } else {
                    self.reject(RejectReason::TerminatorMismatch, byte, timestamp_ms);
                }
            }
        }
    }

    fn begin_frame(&mut self, timestamp_ms: u64) {
        self.acc_len = 0;
        self.declared_len = 0;
        self.frame_started_ms = timestamp_ms;
        self.push(SYNC_1);
        self.state = DecodeState::AwaitSync2;
    }

    fn push(&mut self, byte: u8) {
        debug_assert!(self.acc_len < MAX_FRAME_LEN, "accumulator overflow");
        self.accumulator[self.acc_len] = byte;
        self.acc_len += 1;
    }

    fn reset_state(&mut self) {
        self.state = DecodeState::AwaitSync1;
        self.acc_len = 0;
        self.declared_len = 0;
    }

    fn reject(&mut self, reason: RejectReason, byte: u8, timestamp_ms: u64) {
        warn!(
            reason = reason.as_str(),
            state = ?self.state,
            partial = self.acc_len,
            byte,
            "Rejected frame"
        );
        self.stats.record_reject(reason);
        counter!("sweep_frames_rejected_total", "reason" => reason.as_str()).increment(1);
        self.reset_state();

        if self.config.rescan_rejected_byte && byte == SYNC_1 {
            self.begin_frame(timestamp_ms);
        }
    }

    fn complete_frame(&mut self) {
        let samples = self.accumulator[HEADER_LEN..HEADER_LEN + self.declared_len].to_vec();
        let declared = self.declared_len as u8;

        match self.step_count {
            Some(expected) if expected != declared => {
                warn!(expected, actual = declared, "Step count changed, adopting frame length");
                self.stats.step_count_changes += 1;
                counter!("sweep_step_count_changes_total").increment(1);
                self.step_count = Some(declared);
            }
            None => {
                debug!(step_count = declared, "Step count taken from first frame");
                self.step_count = Some(declared);
            }
            _ => {}
        }

        let index = self.next_index;
        self.next_index += 1;

        let session_started = *self.session_started_ms.get_or_insert(self.frame_started_ms);
        let session_offset_ms = self.frame_started_ms.saturating_sub(session_started);

        let stats = SampleStats::compute(&samples);
        // An empty payload has no sample to offer the tracker
        if !samples.is_empty() {
            let local_max = PeakSample {
                frame_index: index,
                position: stats.max_position,
                value: stats.max,
            };
            match self.global_max {
                Some(current) if index != 0 && local_max.value <= current.value => {}
                _ => {
                    self.global_max = Some(local_max);
                    self.global_max_changed = true;
                }
            }
        }

        let below_threshold_pct =
            amplitude::percent_at_or_below(&samples, self.config.threshold_dbm);
        self.last_below_threshold_pct = Some(below_threshold_pct);

        trace!(index, samples = samples.len(), max = stats.max, "Frame decoded");
        let frame = Frame::new(
            index,
            self.frame_started_ms,
            session_offset_ms,
            samples,
            stats,
            self.global_max,
            below_threshold_pct,
        );

        self.stats.frames_decoded += 1;
        counter!("sweep_frames_decoded_total").increment(1);
        self.enqueue(frame);
        self.reset_state();
    }

    fn enqueue(&mut self, frame: Frame) {
        if let Some(depth) = self.config.queue_depth {
            if self.queue.len() >= depth {
                self.stats.frames_dropped += 1;
                counter!("sweep_frames_dropped_total").increment(1);
                match self.config.overflow_policy {
                    OverflowPolicy::DropOldest => {
                        warn!(depth, "Frame queue full, dropping oldest frame");
                        self.queue.pop_front();
                    }
                    OverflowPolicy::DropNewest => {
                        warn!(depth, index = frame.index(), "Frame queue full, dropping new frame");
                        return;
                    }
                }
            }
        }
        self.queue.push_back(frame);
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::build(DecoderConfig::default())
    }
}
