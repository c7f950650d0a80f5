//! Async receiver session: serves exactly one sender over a stream
//! connection and hands back whatever was delivered in order.
//!
//! ```text
//!  read half ──▶ recv_frame ──▶ GbnReceiver::on_frame ──▶ Link::transmit(ACK)
//!                                      │
//!                                      └──▶ assembled payloads
//! ```
//!
//! The receive loop ends when the peer closes, when the stream fails or
//! when the session is cancelled.  In every case the payloads accepted so
//! far are returned in a [`ReceiveReport`].

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::ArqConfig;
use crate::fault::{injector_for, FaultInjector};
use crate::frame::Frame;
use crate::framing::{FramingError, StreamFraming};
use crate::link::{Link, Transmission};
use crate::receiver::{GbnReceiver, ReceiverStats, Verdict};
use crate::session::{framing_for, SessionError};

/// Why the receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    Cancelled,
    Failed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed the connection"),
            CloseReason::Cancelled => f.write_str("cancelled"),
            CloseReason::Failed(e) => write!(f, "stream failure: {e}"),
        }
    }
}

/// Result of one receiver session.
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// Accepted payloads in delivery order.
    pub payloads: Vec<Vec<u8>>,
    pub stats: ReceiverStats,
    /// ACKs swallowed by the fault injector.
    pub acks_dropped: u64,
    pub close_reason: CloseReason,
}

impl ReceiveReport {
    /// The delivered payloads concatenated.
    pub fn message(&self) -> Vec<u8> {
        self.payloads.concat()
    }
}

enum Event {
    Cancelled,
    Frame(Result<Frame, FramingError>),
}

/// The receiving half of a Go-Back-N session.
pub struct ReceiverSession<S> {
    engine: GbnReceiver,
    link: Link<WriteHalf<S>>,
    reader: ReadHalf<S>,
    framing: StreamFraming,
    cancel: CancellationToken,
    acks_dropped: u64,
}

impl ReceiverSession<TcpStream> {
    /// Bind the listening socket at `config.address()`.
    pub async fn bind(config: &ArqConfig) -> Result<TcpListener, SessionError> {
        config.validate()?;
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| SessionError::Bind {
                addr: addr.clone(),
                source,
            })?;
        log::info!("[receiver] listening on {addr}");
        Ok(listener)
    }

    /// Wait for one sender to connect.
    pub async fn accept(
        listener: &TcpListener,
        config: &ArqConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = accepted.map_err(SessionError::Accept)?;
        log::info!("[receiver] sender connected from {peer}");
        Self::new(stream, config, injector_for(&config.faults), cancel)
    }

    /// Bind, serve a single sender until it disconnects, and return what it
    /// delivered.
    pub async fn listen(
        config: &ArqConfig,
        cancel: CancellationToken,
    ) -> Result<ReceiveReport, SessionError> {
        let listener = Self::bind(config).await?;
        let session = Self::accept(&listener, config, cancel).await?;
        Ok(session.run().await)
    }
}

impl<S> ReceiverSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an established stream after validating `config`.
    pub fn new(
        stream: S,
        config: &ArqConfig,
        faults: Box<dyn FaultInjector>,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let framing = framing_for(config);
        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            engine: GbnReceiver::from_config(config),
            link: Link::new(writer, framing, faults),
            reader,
            framing,
            cancel,
            acks_dropped: 0,
        })
    }

    /// Run the receive loop to completion.
    pub async fn run(mut self) -> ReceiveReport {
        let close_reason = loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => Event::Cancelled,
                result = self.framing.recv_frame(&mut self.reader) => Event::Frame(result),
            };

            match event {
                Event::Cancelled => break CloseReason::Cancelled,
                Event::Frame(Ok(frame)) => {
                    if let Err(reason) = self.on_frame(&frame).await {
                        break reason;
                    }
                }
                Event::Frame(Err(e)) if !e.is_fatal() => {
                    log::warn!("[receiver] dropping malformed frame: {e}");
                }
                Event::Frame(Err(e)) => break close_reason_for(e),
            }
        };

        self.link.close().await;
        let stats = self.engine.stats();
        log::info!(
            "[receiver] session ended ({close_reason}); accepted={} corrupt={} out_of_order={}",
            stats.accepted,
            stats.corrupt,
            stats.out_of_order
        );
        ReceiveReport {
            payloads: self.engine.into_assembled(),
            stats,
            acks_dropped: self.acks_dropped,
            close_reason,
        }
    }

    /// Feed `frame` to the engine and send its ACK.  An error ends the
    /// session with the returned reason.
    async fn on_frame(&mut self, frame: &Frame) -> Result<(), CloseReason> {
        let (verdict, ack) = self.engine.on_frame(frame);
        let Some(ack) = ack else {
            return Ok(());
        };
        let sent = self
            .link
            .transmit_or_cancel(&ack, &self.cancel)
            .await
            .map_err(close_reason_for)?;
        let Some(outcome) = sent else {
            return Err(CloseReason::Cancelled);
        };
        match outcome {
            Transmission::Dropped => self.acks_dropped += 1,
            _ if verdict == Verdict::Accepted => {
                log::debug!("[receiver] → ACK {}", ack.seq_num)
            }
            _ => log::debug!("[receiver] → ACK {} ({verdict:?})", ack.seq_num),
        }
        Ok(())
    }
}

fn close_reason_for(e: FramingError) -> CloseReason {
    match e {
        FramingError::ConnectionClosed => CloseReason::PeerClosed,
        other => CloseReason::Failed(other.to_string()),
    }
}
