//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight DATA
//! frames together with one retransmission timer per frame.
//!
//! # Protocol contract
//!
//! - At most `window_size` frames may be in flight at once.
//! - ACKs are **cumulative**: `ack = K` means the receiver has accepted every
//!   frame before sequence number `K` and is waiting for `K`.
//! - An ACK that does not move the window forward (a duplicate of the base or
//!   an old one) changes nothing; recovery is left to the timers.
//! - When the timer of frame `s` expires, every buffered frame from `s`
//!   onwards is retransmitted (go back to `s`) and its timer restarted.
//! - Sequence numbers wrap around in a [`SeqSpace`].
//!
//! Frames and their timers are removed together inside [`GbnSender::on_ack`],
//! so an expiry for an acknowledged frame can never be observed.
//!
//! This module only manages state; all I/O is the caller's responsibility.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::ArqConfig;
use crate::frame::{calculate_crc8, Frame};
use crate::seq::SeqSpace;
use crate::timer::RetransmitTimers;

/// Split an outbound message into payload units of at most `chunk_size`
/// bytes.  An empty message yields no chunks.
pub fn chunk_message(message: &[u8], chunk_size: usize) -> VecDeque<Vec<u8>> {
    assert!(chunk_size >= 1, "chunk_size must be at least 1");
    message.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

/// A single in-flight frame occupying one slot of the window.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub frame: Frame,
    /// Total number of times this frame has been handed out for transmission.
    pub tx_count: u32,
}

/// Result of feeding an ACK to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window base moved forward, releasing `released` frames.
    Advanced { released: usize, base: u32 },
    /// Duplicate of the current base, or an ACK outside the in-flight range.
    Stale,
}

/// A frame was retransmitted more often than the configured budget allows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("frame {seq} still unacknowledged after {attempts} transmissions")]
pub struct RetriesExhausted {
    pub seq: u32,
    pub attempts: u32,
}

/// Go-Back-N send-side state for one session.
///
/// # Sequence-number layout
///
/// ```text
///  expected_ack     sequence_number
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space (mod N)
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct GbnSender {
    seq: SeqSpace,
    window_size: usize,
    /// Next sequence number to assign.
    sequence_number: u32,
    /// Oldest unacknowledged sequence number (left window edge).
    expected_ack: u32,
    /// In-flight frames ordered from `expected_ack` upwards.
    send_buffer: VecDeque<InFlight>,
    timers: RetransmitTimers,
    max_retransmissions: Option<u32>,
}

impl GbnSender {
    /// # Panics
    ///
    /// Panics if `window_size` is zero or larger than `seq.max_seq()`.
    pub fn new(seq: SeqSpace, window_size: usize, timeout: Duration) -> Self {
        assert!(
            window_size >= 1 && window_size as u64 <= u64::from(seq.max_seq()),
            "window_size must be in 1..=max_seq"
        );
        Self {
            seq,
            window_size,
            sequence_number: 0,
            expected_ack: 0,
            send_buffer: VecDeque::with_capacity(window_size),
            timers: RetransmitTimers::new(timeout),
            max_retransmissions: None,
        }
    }

    /// Build a sender from a validated configuration.
    pub fn from_config(config: &ArqConfig) -> Self {
        Self::new(
            SeqSpace::new(config.max_seq_num),
            config.window_size,
            config.timeout,
        )
        .with_retry_limit(config.max_retransmissions)
    }

    /// Give up once a frame has been retransmitted `limit` times.
    pub fn with_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.max_retransmissions = limit;
        self
    }

    pub fn seq_space(&self) -> SeqSpace {
        self.seq
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Window base: the oldest unacknowledged sequence number.
    pub fn base(&self) -> u32 {
        self.expected_ack
    }

    /// Sequence number the next new frame will carry.
    pub fn next_seq(&self) -> u32 {
        self.sequence_number
    }

    /// `true` when there is room for at least one more in-flight frame.
    pub fn can_send(&self) -> bool {
        self.send_buffer.len() < self.window_size
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.send_buffer.len()
    }

    pub fn has_unacked(&self) -> bool {
        !self.send_buffer.is_empty()
    }

    /// Iterate over all in-flight frames from oldest to newest.
    pub fn window_entries(&self) -> impl Iterator<Item = &InFlight> {
        self.send_buffer.iter()
    }

    pub fn timers(&self) -> &RetransmitTimers {
        &self.timers
    }

    /// Move chunks from the front of `chunks` into the window while it has
    /// room, returning the DATA frames to transmit in order.
    ///
    /// Each frame's timer starts at `now`.
    pub fn enqueue(&mut self, chunks: &mut VecDeque<Vec<u8>>, now: Instant) -> Vec<Frame> {
        let mut out = Vec::new();
        while self.can_send() {
            let Some(chunk) = chunks.pop_front() else {
                break;
            };
            out.push(self.push(chunk, now));
        }
        out
    }

    /// Assign the next sequence number to `payload` and buffer it.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`can_send`](Self::can_send) before calling.
    pub fn push(&mut self, payload: Vec<u8>, now: Instant) -> Frame {
        debug_assert!(
            self.can_send(),
            "push called on a full window ({} / {})",
            self.send_buffer.len(),
            self.window_size
        );
        let frame = Frame::data(self.sequence_number, payload);
        self.send_buffer.push_back(InFlight {
            frame: frame.clone(),
            tx_count: 1,
        });
        self.timers.arm(self.sequence_number, now);
        self.sequence_number = self.seq.next(self.sequence_number);
        frame
    }

    /// Process a cumulative ACK.
    ///
    /// The ACK makes progress when it moves the base forward onto, or past,
    /// frames that are actually in flight.  Measuring the forward distance
    /// from the base agrees with the half-range `seq_ge` ordering for every
    /// gap up to half the sequence space, and stays exact when an ACK covers
    /// a full window whose width reaches half the space.  On progress every
    /// frame in `[base, ack)` is released together with its timer and the
    /// base jumps to `ack` in one step.
    ///
    /// An ACK outside the sequence space is stale.
    pub fn on_ack(&mut self, ack: u32) -> AckOutcome {
        if !self.seq.contains(ack) {
            return AckOutcome::Stale;
        }
        let base = self.expected_ack;
        let released = self.seq.distance(base, ack) as usize;
        if released == 0 || released > self.send_buffer.len() {
            // Duplicate of the base, behind it, or covering unsent frames.
            return AckOutcome::Stale;
        }

        for _ in 0..released {
            if let Some(entry) = self.send_buffer.pop_front() {
                self.timers.cancel(entry.frame.seq_num);
            }
        }
        self.expected_ack = ack;
        AckOutcome::Advanced { released, base: ack }
    }

    /// Handle the expiry of `seq`'s timer.
    ///
    /// Returns every buffered frame at or after `seq`, oldest first, each
    /// with a crc freshly computed over the payload currently held, and
    /// restarts their timers at `now`.  Expiry of a frame that is no longer
    /// buffered returns nothing.
    pub fn on_timeout(&mut self, seq: u32, now: Instant) -> Result<Vec<Frame>, RetriesExhausted> {
        // The buffer is ordered from the base, so "at or after `seq`" is
        // everything from its position onwards.
        let Some(pos) = self.send_buffer.iter().position(|e| e.frame.seq_num == seq) else {
            return Ok(Vec::new());
        };

        if let Some(limit) = self.max_retransmissions {
            if let Some(entry) = self
                .send_buffer
                .iter()
                .skip(pos)
                .find(|e| e.tx_count > limit)
            {
                return Err(RetriesExhausted {
                    seq: entry.frame.seq_num,
                    attempts: entry.tx_count,
                });
            }
        }

        let mut out = Vec::with_capacity(self.send_buffer.len() - pos);
        for entry in self.send_buffer.iter_mut().skip(pos) {
            if let Some(payload) = &entry.frame.payload {
                entry.frame.crc = Some(calculate_crc8(payload));
            }
            entry.tx_count += 1;
            self.timers.arm(entry.frame.seq_num, now);
            out.push(entry.frame.clone());
        }
        Ok(out)
    }

    /// Earliest pending retransmission deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Stop and return the timer of the oldest in-flight frame that has
    /// expired at `now`.
    ///
    /// Deadlines never decrease from the base towards the newest frame, so
    /// the oldest expired frame is also the earliest; scanning in window
    /// order keeps that true across a sequence-number wrap.
    pub fn pop_expired(&mut self, now: Instant) -> Option<u32> {
        let seq = self
            .send_buffer
            .iter()
            .map(|e| e.frame.seq_num)
            .find(|&seq| self.timers.is_expired(seq, now))?;
        self.timers.cancel(seq);
        Some(seq)
    }

    /// Cancel every outstanding timer (session termination).
    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
    }
}
