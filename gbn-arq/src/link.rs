//! The two directions of a session's stream connection.
//!
//! - [`Link`] owns the write half.  Every outbound frame passes through the
//!   session's [`FaultInjector`] before the framing layer writes it, which is
//!   where simulated loss and corruption happen.
//! - [`spawn_reader`] moves the read half into a background task that turns
//!   the byte stream into a channel of decoded frames.  Receiving from an
//!   mpsc channel is cancel-safe, so the session event loop can `select!`
//!   between inbound frames and timers without ever tearing a frame in half.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fault::FaultInjector;
use crate::frame::Frame;
use crate::framing::{FramingError, StreamFraming};

/// Depth of the inbound frame queue between the reader task and the session.
const INBOUND_QUEUE: usize = 64;

/// What happened to a frame handed to [`Link::transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    Sent,
    /// Written with one payload bit flipped and the original crc.
    Corrupted,
    /// Swallowed by the fault injector; nothing was written.
    Dropped,
}

/// Fault-injecting write half of a stream.
pub struct Link<W> {
    writer: W,
    framing: StreamFraming,
    faults: Box<dyn FaultInjector>,
}

impl<W> Link<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, framing: StreamFraming, faults: Box<dyn FaultInjector>) -> Self {
        Self {
            writer,
            framing,
            faults,
        }
    }

    /// Send `frame` through the fault model and onto the stream.
    pub async fn transmit(&mut self, frame: &Frame) -> Result<Transmission, FramingError> {
        if self.faults.should_drop(frame, frame.is_ack()) {
            return Ok(Transmission::Dropped);
        }

        if let Some(payload) = &frame.payload {
            let wire_payload = self.faults.maybe_corrupt(payload.clone());
            if &wire_payload != payload {
                let wire = Frame {
                    payload: Some(wire_payload),
                    ..frame.clone()
                };
                self.framing.send_frame(&mut self.writer, &wire).await?;
                return Ok(Transmission::Corrupted);
            }
        }

        self.framing.send_frame(&mut self.writer, frame).await?;
        Ok(Transmission::Sent)
    }

    /// [`transmit`](Self::transmit), abandoned as soon as `cancel` fires.
    ///
    /// A write blocked on a peer that stopped reading never completes on its
    /// own, so every session write goes through here.  `Ok(None)` means the
    /// session was cancelled; the stream may then end in a partial frame.
    pub async fn transmit_or_cancel(
        &mut self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<Option<Transmission>, FramingError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            outcome = self.transmit(frame) => outcome.map(Some),
        }
    }

    /// Close the write direction.  Errors are irrelevant at this point.
    pub async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// Item delivered by the reader task.
pub type Inbound = Result<Frame, FramingError>;

/// Spawn the task that reads frames from `reader` until the stream fails or
/// `cancel` fires.
///
/// Undecodable frames are logged and skipped.  The first fatal error is
/// forwarded and ends the task; a cancelled task simply closes the channel.
pub fn spawn_reader<R>(
    mut reader: R,
    framing: StreamFraming,
    cancel: CancellationToken,
    role: &'static str,
) -> (mpsc::Receiver<Inbound>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let handle = tokio::spawn(async move {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = framing.recv_frame(&mut reader) => result,
            };
            match result {
                Ok(frame) => {
                    if tx.send(Ok(frame)).await.is_err() {
                        break;
                    }
                }
                Err(e) if !e.is_fatal() => {
                    log::warn!("[{role}] dropping malformed frame: {e}");
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        log::debug!("[{role}] reader task finished");
    });
    (rx, handle)
}
