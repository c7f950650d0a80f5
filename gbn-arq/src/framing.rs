//! Length-prefixed frame delineation on a byte stream.
//!
//! A stream connection has no message boundaries, so every serialised
//! [`Frame`] is preceded by its byte length written as a fixed-width,
//! zero-padded ASCII decimal number:
//!
//! ```text
//! 0000000016<16 bytes of frame>0000000011<11 bytes of frame>...
//! ```
//!
//! This layer knows nothing about DATA/ACK semantics; it only moves whole
//! frames on and off the stream.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::frame::{Frame, FrameError};

/// Default width of the length prefix.
pub const DEFAULT_PREFIX_WIDTH: usize = 10;

/// Errors from reading or writing a framed stream.
#[derive(Error, Debug)]
pub enum FramingError {
    /// The peer closed the stream (possibly in the middle of a frame).
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The length prefix is not a decimal number.
    #[error("malformed length prefix {0:?}")]
    BadPrefix(String),
    /// The frame is longer than the configured maximum or the prefix width.
    #[error("frame of {len} bytes exceeds the limit of {max} bytes")]
    TooLarge { len: usize, max: usize },
    /// A complete frame was read but could not be decoded.
    #[error("undecodable frame: {0}")]
    Format(#[from] FrameError),
    #[error("stream I/O error: {0}")]
    Io(#[source] io::Error),
}

impl FramingError {
    /// `false` only for errors after which the stream is still aligned on a
    /// frame boundary and can keep being read.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Format(_))
    }
}

impl From<io::Error> for FramingError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::Io(e),
        }
    }
}

/// Prefix-width and size limits shared by both directions of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFraming {
    prefix_width: usize,
    max_frame_len: usize,
}

impl Default for StreamFraming {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX_WIDTH, 1024 * 1024)
    }
}

impl StreamFraming {
    pub fn new(prefix_width: usize, max_frame_len: usize) -> Self {
        assert!(prefix_width >= 1, "prefix width must be at least 1");
        Self {
            prefix_width,
            max_frame_len,
        }
    }

    pub fn prefix_width(&self) -> usize {
        self.prefix_width
    }

    /// Largest length expressible in `prefix_width` decimal digits, capped
    /// at the configured maximum frame length.
    fn limit(&self) -> usize {
        let digits_max = u32::try_from(self.prefix_width)
            .ok()
            .and_then(|w| 10usize.checked_pow(w))
            .map_or(usize::MAX, |p| p - 1);
        digits_max.min(self.max_frame_len)
    }

    /// Encode `frame` and write `prefix ‖ bytes`, flushing before returning.
    ///
    /// Oversized frames are rejected before anything is written, so the
    /// stream never carries a partial frame from this side.
    pub async fn send_frame<W>(&self, conn: &mut W, frame: &Frame) -> Result<(), FramingError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let bytes = frame.encode();
        let limit = self.limit();
        if bytes.len() > limit {
            return Err(FramingError::TooLarge {
                len: bytes.len(),
                max: limit,
            });
        }

        let prefix = format!("{:0width$}", bytes.len(), width = self.prefix_width);
        conn.write_all(prefix.as_bytes()).await?;
        conn.write_all(&bytes).await?;
        conn.flush().await?;
        Ok(())
    }

    /// Read one prefixed frame.
    ///
    /// `read_exact` loops over short reads, so a frame split across many
    /// segments is reassembled transparently.
    pub async fn recv_frame<R>(&self, conn: &mut R) -> Result<Frame, FramingError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut prefix = vec![0u8; self.prefix_width];
        conn.read_exact(&mut prefix).await?;

        let len = parse_prefix(&prefix)?;
        let limit = self.limit();
        if len > limit {
            return Err(FramingError::TooLarge { len, max: limit });
        }

        let mut bytes = vec![0u8; len];
        conn.read_exact(&mut bytes).await?;
        Ok(Frame::decode(&bytes)?)
    }
}

fn parse_prefix(prefix: &[u8]) -> Result<usize, FramingError> {
    let text = std::str::from_utf8(prefix)
        .map_err(|_| FramingError::BadPrefix(String::from_utf8_lossy(prefix).into_owned()))?;
    text.trim()
        .parse::<usize>()
        .map_err(|_| FramingError::BadPrefix(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_LEN;

    #[tokio::test]
    async fn prefix_is_ten_zero_padded_digits() {
        let framing = StreamFraming::default();
        let mut wire = Vec::new();
        framing.send_frame(&mut wire, &Frame::ack(2)).await.unwrap();

        assert_eq!(&wire[..10], format!("{:010}", HEADER_LEN).as_bytes());
        assert_eq!(wire.len(), 10 + HEADER_LEN);
    }

    #[tokio::test]
    async fn frames_read_back_in_order() {
        let framing = StreamFraming::default();
        let mut wire = Vec::new();
        framing
            .send_frame(&mut wire, &Frame::data(0, b"first".to_vec()))
            .await
            .unwrap();
        framing.send_frame(&mut wire, &Frame::ack(1)).await.unwrap();

        let mut rd = wire.as_slice();
        let a = framing.recv_frame(&mut rd).await.unwrap();
        let b = framing.recv_frame(&mut rd).await.unwrap();
        assert_eq!(a.payload_bytes(), b"first");
        assert!(b.is_ack());
        assert!(matches!(
            framing.recv_frame(&mut rd).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn partial_reads_are_reassembled() {
        let framing = StreamFraming::default();
        let mut wire = Vec::new();
        framing
            .send_frame(&mut wire, &Frame::data(3, vec![7u8; 300]))
            .await
            .unwrap();

        // Deliver the bytes a few at a time through a tiny duplex buffer.
        let (mut tx, mut rx) = tokio::io::duplex(7);
        let writer = tokio::spawn(async move {
            for piece in wire.chunks(5) {
                tx.write_all(piece).await.unwrap();
            }
        });
        let frame = framing.recv_frame(&mut rx).await.unwrap();
        writer.await.unwrap();

        assert_eq!(frame.seq_num, 3);
        assert_eq!(frame.payload_bytes().len(), 300);
    }

    #[tokio::test]
    async fn close_mid_frame_is_connection_closed() {
        let framing = StreamFraming::default();
        let mut wire = Vec::new();
        framing
            .send_frame(&mut wire, &Frame::data(0, b"truncated".to_vec()))
            .await
            .unwrap();
        wire.truncate(wire.len() - 2);

        let mut rd = wire.as_slice();
        let err = framing.recv_frame(&mut rd).await.unwrap_err();
        assert!(matches!(err, FramingError::ConnectionClosed));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn garbage_prefix_is_fatal() {
        let framing = StreamFraming::default();
        let mut rd: &[u8] = b"12345abcde";
        let err = framing.recv_frame(&mut rd).await.unwrap_err();
        assert!(matches!(err, FramingError::BadPrefix(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn undecodable_body_keeps_stream_aligned() {
        let framing = StreamFraming::default();
        let mut wire = b"0000000003xyz".to_vec();
        framing.send_frame(&mut wire, &Frame::ack(4)).await.unwrap();

        let mut rd = wire.as_slice();
        let err = framing.recv_frame(&mut rd).await.unwrap_err();
        assert!(matches!(err, FramingError::Format(FrameError::BufferTooShort(3))));
        assert!(!err.is_fatal());

        let next = framing.recv_frame(&mut rd).await.unwrap();
        assert_eq!(next, Frame::ack(4));
    }

    #[tokio::test]
    async fn oversized_frame_rejected_before_write() {
        let framing = StreamFraming::new(2, 1024);
        let mut wire = Vec::new();
        let err = framing
            .send_frame(&mut wire, &Frame::data(0, vec![0u8; 200]))
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::TooLarge { max: 99, .. }));
        assert!(wire.is_empty());
    }

    #[tokio::test]
    async fn oversized_prefix_rejected_on_read() {
        let framing = StreamFraming::new(10, 64);
        let mut rd: &[u8] = b"0000000100";
        let err = framing.recv_frame(&mut rd).await.unwrap_err();
        assert!(matches!(err, FramingError::TooLarge { len: 100, max: 64 }));
    }
}
