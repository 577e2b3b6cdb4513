//! Circular Byte Buffer Implementation

use tracing::{debug, warn};

/// Default buffer capacity (16 KiB, far above a single serial burst)
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

/// Fixed-capacity circular byte buffer
///
/// Not synchronized: the owner is responsible for serializing access.
/// Overflowing writes are truncated rather than overwriting unread data,
/// so the caller must check the returned count.
#[derive(Debug)]
pub struct RingBuffer {
    /// Pre-allocated storage
    storage: Box<[u8]>,
    /// Read cursor (oldest unread byte)
    head: usize,
    /// Number of bytes currently held
    len: usize,
    /// Total bytes accepted by `write` (for statistics)
    total_written: usize,
    /// Bytes rejected by full writes or dropped by a shrinking resize
    bytes_lost: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity in bytes
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            total_written: 0,
            bytes_lost: 0,
        }
    }

    /// Create a buffer with default capacity (16 KiB)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Copy as many bytes as fit into free space
    ///
    /// Returns `min(data.len(), free())`. Bytes past that point are dropped
    /// and counted in [`bytes_lost`](Self::bytes_lost).
    pub fn write(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.free());
        if count < data.len() {
            self.bytes_lost += data.len() - count;
        }
        if count == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;
        let first = count.min(capacity - tail);
        self.storage[tail..tail + first].copy_from_slice(&data[..first]);

        // Wrapped remainder
        let second = count - first;
        if second > 0 {
            self.storage[..second].copy_from_slice(&data[first..count]);
        }

        self.len += count;
        self.total_written += count;
        count
    }

    /// Move up to `out.len()` oldest bytes into `out`
    ///
    /// Returns the number of bytes transferred (`min(out.len(), used())`).
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let count = self.peek(out);
        self.advance(count);
        count
    }

    /// Copy up to `out.len()` oldest bytes into `out` without consuming them
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        if count == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = count.min(capacity - self.head);
        out[..first].copy_from_slice(&self.storage[self.head..self.head + first]);

        let second = count - first;
        if second > 0 {
            out[first..count].copy_from_slice(&self.storage[..second]);
        }
        count
    }

    /// Drop up to `count` oldest bytes without copying them out
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len);
        self.advance(count);
        count
    }

    /// Replace the backing storage with one of `new_capacity` bytes
    ///
    /// Held bytes are repacked from offset 0. When shrinking below the
    /// current fill, the oldest `used() - new_capacity` bytes are discarded
    /// first and counted as lost.
    ///
    /// # Panics
    /// Panics if `new_capacity` is zero.
    pub fn resize(&mut self, new_capacity: usize) {
        assert!(new_capacity > 0, "ring buffer capacity must be non-zero");
        if new_capacity == self.capacity() {
            return;
        }

        if self.len > new_capacity {
            let excess = self.discard(self.len - new_capacity);
            self.bytes_lost += excess;
            warn!(excess, new_capacity, "Ring buffer shrink discarded oldest bytes");
        }

        let mut storage = vec![0u8; new_capacity].into_boxed_slice();
        let len = self.peek(&mut storage[..self.len]);
        debug!(
            old_capacity = self.capacity(),
            new_capacity, len, "Ring buffer resized"
        );

        self.storage = storage;
        self.head = 0;
        self.len = len;
    }

    /// Reset to empty without reallocating
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Number of bytes currently held
    pub fn used(&self) -> usize {
        self.len
    }

    /// Number of bytes that can be written before truncation
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    /// Total bytes accepted by `write` since construction
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Bytes lost to truncated writes or shrinking resizes
    pub fn bytes_lost(&self) -> usize {
        self.bytes_lost
    }

    fn advance(&mut self, count: usize) {
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
        if self.len == 0 {
            self.head = 0;
        }
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn drain(buffer: &mut RingBuffer) -> Vec<u8> {
        let mut out = vec![0u8; buffer.used()];
        let n = buffer.read(&mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn test_write_and_read() {
        let mut buffer = RingBuffer::new(16);
        assert_eq!(buffer.write(b"hello"), 5);
        assert_eq!(buffer.used(), 5);
        assert_eq!(buffer.free(), 11);

        let mut out = [0u8; 3];
        assert_eq!(buffer.read(&mut out), 3);
        assert_eq!(&out, b"hel");
        assert_eq!(drain(&mut buffer), b"lo");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_more_than_held() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"ab");
        let mut out = [0u8; 6];
        assert_eq!(buffer.read(&mut out), 2);
        assert_eq!(&out[..2], b"ab");
    }

    #[test]
    fn test_wraparound() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"123456");
        let mut out = [0u8; 4];
        buffer.read(&mut out);

        // Straddles the end of storage
        assert_eq!(buffer.write(b"abcdef"), 6);
        assert!(buffer.is_full());
        assert_eq!(drain(&mut buffer), b"56abcdef");
    }

    #[test]
    fn test_overflow_truncates() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"12345");
        assert_eq!(buffer.write(b"ABCDEFG"), 3);
        assert_eq!(buffer.bytes_lost(), 4);
        assert_eq!(drain(&mut buffer), b"12345ABC");
    }

    #[test]
    fn test_write_when_full() {
        let mut buffer = RingBuffer::new(4);
        buffer.write(b"abcd");
        assert_eq!(buffer.write(b"e"), 0);
        assert_eq!(buffer.total_written(), 4);
        assert_eq!(buffer.bytes_lost(), 1);
    }

    #[test]
    fn test_discard() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"abcdef");
        assert_eq!(buffer.discard(4), 4);
        assert_eq!(buffer.discard(10), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes_lost(), 0);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"xyz");
        let mut out = [0u8; 2];
        assert_eq!(buffer.peek(&mut out), 2);
        assert_eq!(&out, b"xy");
        assert_eq!(buffer.used(), 3);
    }

    #[test]
    fn test_resize_grow_repacks() {
        let mut buffer = RingBuffer::new(6);
        buffer.write(b"abcd");
        buffer.discard(3);
        buffer.write(b"efgh");

        buffer.resize(12);
        assert_eq!(buffer.capacity(), 12);
        assert_eq!(buffer.free(), 7);
        assert_eq!(drain(&mut buffer), b"defgh");
    }

    #[test]
    fn test_resize_shrink_drops_oldest() {
        let mut buffer = RingBuffer::new(10);
        buffer.write(b"0123456789");
        buffer.resize(4);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.bytes_lost(), 6);
        assert_eq!(drain(&mut buffer), b"6789");
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = RingBuffer::new(8);
        buffer.write(b"abc");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.free(), 8);
    }

    #[test]
    fn test_fill_ratio() {
        let mut buffer = RingBuffer::new(100);
        assert_eq!(buffer.fill_ratio(), 0.0);
        buffer.write(&[0u8; 50]);
        assert!((buffer.fill_ratio() - 0.5).abs() < 0.01);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_resize_panics() {
        let mut buffer = RingBuffer::new(4);
        buffer.resize(0);
    }

    proptest! {
        #[test]
        fn prop_writes_within_capacity_read_back_in_order(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..24), 0..10)
        ) {
            let total: usize = chunks.iter().map(Vec::len).sum();
            let mut buffer = RingBuffer::new(total.max(1));
            for chunk in &chunks {
                prop_assert_eq!(buffer.write(chunk), chunk.len());
            }
            let expected: Vec<u8> = chunks.concat();
            prop_assert_eq!(drain(&mut buffer), expected);
        }

        #[test]
        fn prop_overflow_keeps_leading_bytes(
            capacity in 1usize..64,
            prefill in prop::collection::vec(any::<u8>(), 0..64),
            data in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            let mut buffer = RingBuffer::new(capacity);
            let held = buffer.write(&prefill);
            let free = buffer.free();
            let written = buffer.write(&data);
            prop_assert_eq!(written, data.len().min(free));

            let mut expected = prefill[..held].to_vec();
            expected.extend_from_slice(&data[..written]);
            prop_assert_eq!(drain(&mut buffer), expected);
        }

        #[test]
        fn prop_shrink_keeps_newest(
            data in prop::collection::vec(any::<u8>(), 1..64),
            skip in 0usize..32,
            new_capacity in 1usize..64,
        ) {
            let mut buffer = RingBuffer::new(64);
            // Offset the cursor so the held bytes wrap
            buffer.write(&vec![0u8; skip]);
            buffer.discard(skip);
            buffer.write(&data);

            buffer.resize(new_capacity);
            let kept = data.len().min(new_capacity);
            prop_assert_eq!(buffer.bytes_lost(), data.len() - kept);
            prop_assert_eq!(drain(&mut buffer), data[data.len() - kept..].to_vec());
        }

        #[test]
        fn prop_matches_queue_model(
            ops in prop::collection::vec((any::<bool>(), prop::collection::vec(any::<u8>(), 0..12)), 0..64)
        ) {
            let mut buffer = RingBuffer::new(16);
            let mut model: VecDeque<u8> = VecDeque::new();
            for (is_write, bytes) in ops {
                if is_write {
                    let n = buffer.write(&bytes);
                    prop_assert_eq!(n, bytes.len().min(16 - model.len()));
                    model.extend(&bytes[..n]);
                } else {
                    let mut out = vec![0u8; bytes.len()];
                    let n = buffer.read(&mut out);
                    let expected: Vec<u8> = model.drain(..n.min(model.len())).collect();
                    prop_assert_eq!(&out[..n], expected.as_slice());
                }
                prop_assert_eq!(buffer.used(), model.len());
            }
        }
    }
}
