//! Async Frame Reader
//!
//! Pulls byte chunks from any tokio reader (serial port, socket, capture
//! file), feeds them to a [`FrameDecoder`] and yields decoded frames.

use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::SweepError;
use crate::frame::Frame;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Bytes requested from the reader per read call
const READ_CHUNK: usize = 4096;

/// Frame source over an async byte stream
pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
    buf: Box<[u8]>,
    /// Origin of the monotonic chunk timestamps
    started: Instant,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `inner`, decoding with `decoder`
    pub fn new(inner: R, decoder: FrameDecoder) -> Self {
        Self {
            inner,
            decoder,
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
            started: Instant::now(),
            eof: false,
        }
    }

    /// Next decoded frame, or `None` once the stream has ended
    ///
    /// Frames already queued are returned before the stream is read again.
    /// A partial frame left at end of stream is discarded.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, SweepError> {
        loop {
            if let Some(frame) = self.decoder.pop_frame() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.inner.read(&mut self.buf[..]).await?;
            if n == 0 {
                debug!(partial = self.decoder.partial_len(), "Byte stream ended");
                self.decoder.reset();
                self.eof = true;
                continue;
            }

            let timestamp_ms = self.started.elapsed().as_millis() as u64;
            self.decoder.feed(&self.buf[..n], timestamp_ms);
        }
    }

    /// Forward every frame into `tx` until the stream ends
    ///
    /// The bounded channel blocks decoding while the consumer is behind.
    /// Returns the decoder counters at end of stream.
    pub async fn pump(mut self, tx: mpsc::Sender<Frame>) -> Result<DecoderStats, SweepError> {
        while let Some(frame) = self.next_frame().await? {
            tx.send(frame)
                .await
                .map_err(|_| SweepError::ChannelClosed)?;
        }

        let stats = self.decoder.stats().clone();
        info!(
            frames = stats.frames_decoded,
            rejected = stats.frames_rejected(),
            "Frame pump finished"
        );
        Ok(stats)
    }

    /// Whether the underlying stream has ended
    pub fn is_finished(&self) -> bool {
        self.eof && !self.decoder.has_frame()
    }

    /// Decoder in use
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Mutable decoder access, e.g. to reconfigure between sessions
    pub fn decoder_mut(&mut self) -> &mut FrameDecoder {
        &mut self.decoder
    }

    /// Release the stream and decoder
    pub fn into_parts(self) -> (R, FrameDecoder) {
        (self.inner, self.decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use tokio::io::AsyncWriteExt;

    fn capture(payloads: &[&[u8]]) -> Vec<u8> {
        let mut bytes = vec![0x11, 0x22];
        for payload in payloads {
            bytes.extend(encode_frame(payload).unwrap());
        }
        bytes
    }

    #[tokio::test]
    async fn test_reads_all_frames() {
        let bytes = capture(&[&[1, 2, 3], &[4, 5]]);
        let mut reader = FrameReader::new(&bytes[..], FrameDecoder::default());

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.samples(), &[1, 2, 3]);
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second.samples(), &[4, 5]);
        assert!(reader.next_frame().await.unwrap().is_none());
        assert!(reader.is_finished());
        assert_eq!(reader.decoder().stats().noise_bytes, 2);
    }

    #[tokio::test]
    async fn test_truncated_tail_discarded() {
        let mut bytes = capture(&[&[9]]);
        bytes.extend_from_slice(&[0x24, 0x53, 0x04, 0x01]);
        let mut reader = FrameReader::new(&bytes[..], FrameDecoder::default());

        assert!(reader.next_frame().await.unwrap().is_some());
        assert!(reader.next_frame().await.unwrap().is_none());
        assert_eq!(reader.decoder().partial_len(), 0);
        assert_eq!(reader.decoder().stats().partial_frames_discarded, 1);
        assert_eq!(reader.decoder().stats().frames_decoded, 1);
    }

    #[tokio::test]
    async fn test_small_writes_reassembled() {
        let (mut tx, rx) = tokio::io::duplex(3);
        let bytes = capture(&[&[10, 20, 30, 40], &[50]]);

        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(2) {
                tx.write_all(chunk).await.unwrap();
            }
        });

        let mut reader = FrameReader::new(rx, FrameDecoder::default());
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            frames.push(frame);
        }
        writer.await.unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[10, 20, 30, 40]);
        assert_eq!(frames[1].index(), 1);
    }

    #[tokio::test]
    async fn test_pump_forwards_frames() {
        let bytes = capture(&[&[1], &[2], &[3]]);
        let reader = FrameReader::new(std::io::Cursor::new(bytes), FrameDecoder::default());
        let (tx, mut rx) = mpsc::channel(1);

        let pump = tokio::spawn(reader.pump(tx));
        let mut received = Vec::new();
        while let Some(frame) = rx.recv().await {
            received.push(frame.samples()[0]);
        }

        let stats = pump.await.unwrap().unwrap();
        assert_eq!(received, vec![1, 2, 3]);
        assert_eq!(stats.frames_decoded, 3);
    }

    #[tokio::test]
    async fn test_pump_reports_closed_consumer() {
        let bytes = capture(&[&[1], &[2]]);
        let reader = FrameReader::new(&bytes[..], FrameDecoder::default());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(matches!(
            reader.pump(tx).await,
            Err(SweepError::ChannelClosed)
        ));
    }
}
