//! Async sender session: drives a [`GbnSender`] over a stream connection.
//!
//! # Architecture
//!
//! ```text
//!  send_message(msg)
//!      │ chunk_message
//!      ▼
//!  ┌──────────────────────── event loop (one task) ───────────────────────┐
//!  │  fill window ──▶ Link::transmit ──▶ (faults) ──▶ write half           │
//!  │  select! {                                                           │
//!  │      inbound ACK   ──▶ GbnSender::on_ack                             │
//!  │      timer due     ──▶ GbnSender::on_timeout ──▶ retransmit          │
//!  │      cancelled     ──▶ stop                                          │
//!  │  }                                                                   │
//!  └──────────────────────────────────────────────────────────────────────┘
//!      ▲ mpsc<Frame>
//!  reader task (ACK-receive loop) ◀── read half
//! ```
//!
//! Window fill, ACK processing and timer expiry all run on the event loop,
//! so they are serialised without a lock: a retransmission can never
//! interleave with an ACK-driven window advance.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ArqConfig;
use crate::fault::{injector_for, FaultInjector};
use crate::frame::Frame;
use crate::link::{spawn_reader, Inbound, Link, Transmission};
use crate::sender::{chunk_message, AckOutcome, GbnSender};
use crate::session::{framing_for, SessionError};

/// Counters over the lifetime of one sender session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Payload units acknowledged by the receiver.
    pub frames_delivered: u64,
    /// DATA frames handed to the link, including retransmissions.
    pub transmissions: u64,
    pub retransmissions: u64,
    /// Timer expiries handled.
    pub timeouts: u64,
    pub acks_received: u64,
    /// ACKs that did not move the window.
    pub stale_acks: u64,
    /// Frames swallowed by the fault injector.
    pub dropped: u64,
    /// Frames written with a flipped payload bit.
    pub corrupted: u64,
}

enum Event {
    Cancelled,
    Inbound(Option<Inbound>),
    TimerDue,
}

/// The sending half of a Go-Back-N session.
pub struct SenderSession<S> {
    engine: GbnSender,
    link: Link<WriteHalf<S>>,
    inbound: mpsc::Receiver<Inbound>,
    reader: JoinHandle<()>,
    cancel: CancellationToken,
    chunk_size: usize,
    report: SendReport,
}

impl SenderSession<TcpStream> {
    /// Connect to the receiver at `config.address()`.
    pub async fn connect(
        config: &ArqConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let addr = config.address();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        log::info!("[sender] connected to receiver at {addr}");
        Self::new(stream, config, injector_for(&config.faults), cancel)
    }
}

impl<S> SenderSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an established stream after validating `config`.
    ///
    /// Cancelling `cancel` (or dropping the session) stops the session and
    /// its reader task.
    pub fn new(
        stream: S,
        config: &ArqConfig,
        faults: Box<dyn FaultInjector>,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let framing = framing_for(config);
        let (rd, wr): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        let cancel = cancel.child_token();
        let (inbound, reader) = spawn_reader(rd, framing, cancel.clone(), "sender");
        Ok(Self {
            engine: GbnSender::from_config(config),
            link: Link::new(wr, framing, faults),
            inbound,
            reader,
            cancel,
            chunk_size: config.chunk_size,
            report: SendReport::default(),
        })
    }

    pub fn engine(&self) -> &GbnSender {
        &self.engine
    }

    pub fn report(&self) -> &SendReport {
        &self.report
    }

    /// Deliver `message` reliably, returning once every chunk has been
    /// acknowledged.
    ///
    /// On failure all retransmission timers are cancelled and the session
    /// can no longer be used.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<SendReport, SessionError> {
        let mut pending = chunk_message(message, self.chunk_size);
        log::info!(
            "[sender] sending {} bytes as {} frame(s)",
            message.len(),
            pending.len()
        );

        match self.drive(&mut pending).await {
            Ok(()) => Ok(self.report.clone()),
            Err(e) => {
                log::warn!("[sender] session terminated: {e}");
                self.terminate();
                Err(e)
            }
        }
    }

    /// Stop the reader, cancel every timer and close the write direction.
    pub async fn close(mut self) -> SendReport {
        self.terminate();
        self.link.close().await;
        let _ = (&mut self.reader).await;
        log::info!("[sender] closed; {:?}", self.report);
        self.report.clone()
    }

    fn terminate(&mut self) {
        self.engine.shutdown();
        self.cancel.cancel();
    }

    async fn drive(&mut self, pending: &mut VecDeque<Vec<u8>>) -> Result<(), SessionError> {
        loop {
            let frames = self.engine.enqueue(pending, Instant::now());
            for frame in &frames {
                self.transmit(frame, false).await?;
            }

            if pending.is_empty() && !self.engine.has_unacked() {
                return Ok(());
            }

            let deadline = self.engine.next_deadline();
            let event = tokio::select! {
                _ = self.cancel.cancelled() => Event::Cancelled,
                inbound = self.inbound.recv() => Event::Inbound(inbound),
                _ = sleep_until(deadline) => Event::TimerDue,
            };

            match event {
                Event::Cancelled => return Err(SessionError::Cancelled),
                Event::Inbound(Some(Ok(frame))) => self.on_inbound(&frame),
                Event::Inbound(Some(Err(e))) => return Err(e.into()),
                Event::Inbound(None) => return Err(SessionError::ConnectionClosed),
                Event::TimerDue => self.on_timers().await?,
            }
        }
    }

    fn on_inbound(&mut self, frame: &Frame) {
        if !frame.is_ack() {
            log::warn!("[sender] ignoring unexpected {frame}");
            return;
        }
        self.report.acks_received += 1;
        match self.engine.on_ack(frame.seq_num) {
            AckOutcome::Advanced { released, base } => {
                self.report.frames_delivered += released as u64;
                log::debug!(
                    "[sender] ← ACK {} (released {released}, base → {base})",
                    frame.seq_num
                );
            }
            AckOutcome::Stale => {
                self.report.stale_acks += 1;
                log::debug!(
                    "[sender] ← ACK {} stale (base {})",
                    frame.seq_num,
                    self.engine.base()
                );
            }
        }
    }

    async fn on_timers(&mut self) -> Result<(), SessionError> {
        let now = Instant::now();
        while let Some(seq) = self.engine.pop_expired(now) {
            self.report.timeouts += 1;
            let frames = self.engine.on_timeout(seq, now)?;
            log::debug!(
                "[sender] timeout seq={seq}, retransmitting {} frame(s)",
                frames.len()
            );
            for frame in &frames {
                self.transmit(frame, true).await?;
            }
        }
        Ok(())
    }

    async fn transmit(&mut self, frame: &Frame, retransmission: bool) -> Result<(), SessionError> {
        let Some(outcome) = self.link.transmit_or_cancel(frame, &self.cancel).await? else {
            return Err(SessionError::Cancelled);
        };
        self.report.transmissions += 1;
        if retransmission {
            self.report.retransmissions += 1;
        }
        match outcome {
            Transmission::Sent => {}
            Transmission::Dropped => self.report.dropped += 1,
            Transmission::Corrupted => self.report.corrupted += 1,
        }
        log::debug!(
            "[sender] → DATA seq={} len={} in_flight={} {:?}",
            frame.seq_num,
            frame.payload_bytes().len(),
            self.engine.in_flight(),
            outcome
        );
        Ok(())
    }
}

impl<S> Drop for SenderSession<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
