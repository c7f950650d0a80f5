//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - A DATA frame whose crc does not match its payload is discarded.
//! - Only the **in-order** frame (`seq == expected_seq`) is accepted; every
//!   other frame, ahead or behind, is discarded without buffering.
//! - Every DATA frame, accepted or not, is answered with one **cumulative
//!   ACK** carrying `expected_seq`, the next frame the receiver wants.
//!
//! This module only manages state; the caller writes the returned ACK.

use crate::config::ArqConfig;
use crate::frame::Frame;
use crate::seq::SeqSpace;

/// What the receiver did with one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// In order with a valid crc; payload appended.
    Accepted,
    /// In order but already delivered; not appended again.
    Duplicate,
    /// crc mismatch; discarded.
    Corrupt,
    /// Valid crc but not the expected sequence number; discarded.
    OutOfOrder,
    /// Not a DATA frame; ignored without an ACK.
    Ignored,
}

/// Counters over the lifetime of one receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub corrupt: u64,
    pub out_of_order: u64,
    pub ignored: u64,
    pub acks_generated: u64,
}

/// Go-Back-N receive-side state for one session.
#[derive(Debug)]
pub struct GbnReceiver {
    seq: SeqSpace,
    /// Next in-order sequence number to accept.
    expected_seq: u32,
    /// Slot of the most recently appended payload.
    last_accepted_seq: Option<u32>,
    /// Accepted payloads in delivery order.
    assembled: Vec<Vec<u8>>,
    stats: ReceiverStats,
}

impl GbnReceiver {
    pub fn new(seq: SeqSpace) -> Self {
        Self {
            seq,
            expected_seq: 0,
            last_accepted_seq: None,
            assembled: Vec::new(),
            stats: ReceiverStats::default(),
        }
    }

    pub fn from_config(config: &ArqConfig) -> Self {
        Self::new(SeqSpace::new(config.max_seq_num))
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn last_accepted_seq(&self) -> Option<u32> {
        self.last_accepted_seq
    }

    /// Accepted payloads, in order.
    pub fn assembled(&self) -> &[Vec<u8>] {
        &self.assembled
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// The accepted payloads concatenated into one message.
    pub fn message(&self) -> Vec<u8> {
        self.assembled.concat()
    }

    /// Tear down the receiver, yielding the assembled payloads.
    pub fn into_assembled(self) -> Vec<Vec<u8>> {
        self.assembled
    }

    /// Process one inbound frame.
    ///
    /// Returns the verdict and the ACK to send, if any.  DATA frames always
    /// produce exactly one ACK; other frame types produce none.
    pub fn on_frame(&mut self, frame: &Frame) -> (Verdict, Option<Frame>) {
        if !frame.is_data() {
            self.stats.ignored += 1;
            log::warn!("[receiver] ignoring unexpected {frame}");
            return (Verdict::Ignored, None);
        }

        let verdict = if !frame.crc_ok() {
            self.stats.corrupt += 1;
            log::warn!(
                "[receiver] crc mismatch on DATA {}; discarding",
                frame.seq_num
            );
            Verdict::Corrupt
        } else if frame.seq_num == self.expected_seq {
            let verdict = if self.last_accepted_seq != Some(self.expected_seq) {
                self.assembled.push(frame.payload_bytes().to_vec());
                self.last_accepted_seq = Some(self.expected_seq);
                self.stats.accepted += 1;
                log::debug!("[receiver] ← DATA seq={} accepted", frame.seq_num);
                Verdict::Accepted
            } else {
                self.stats.duplicates += 1;
                log::debug!("[receiver] ← DATA seq={} duplicate", frame.seq_num);
                Verdict::Duplicate
            };
            self.expected_seq = self.seq.next(self.expected_seq);
            verdict
        } else {
            self.stats.out_of_order += 1;
            log::debug!(
                "[receiver] ← DATA seq={} out of order (expected {}); discarding",
                frame.seq_num,
                self.expected_seq
            );
            Verdict::OutOfOrder
        };

        self.stats.acks_generated += 1;
        (verdict, Some(Frame::ack(self.expected_seq)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> GbnReceiver {
        GbnReceiver::new(SeqSpace::new(7))
    }

    #[test]
    fn initial_state() {
        let r = receiver();
        assert_eq!(r.expected_seq(), 0);
        assert_eq!(r.last_accepted_seq(), None);
        assert!(r.assembled().is_empty());
    }

    #[test]
    fn in_order_frame_accepted() {
        let mut r = receiver();
        let (verdict, ack) = r.on_frame(&Frame::data(0, b"hello".to_vec()));
        assert_eq!(verdict, Verdict::Accepted);
        assert_eq!(ack, Some(Frame::ack(1)));
        assert_eq!(r.assembled(), &[b"hello".to_vec()]);
        assert_eq!(r.last_accepted_seq(), Some(0));
    }

    #[test]
    fn out_of_order_frame_discarded_and_reacked() {
        let mut r = receiver();
        let (verdict, ack) = r.on_frame(&Frame::data(2, b"future".to_vec()));
        assert_eq!(verdict, Verdict::OutOfOrder);
        assert_eq!(ack, Some(Frame::ack(0)));
        assert_eq!(r.expected_seq(), 0);
        assert!(r.assembled().is_empty());
    }

    #[test]
    fn corrupt_frame_leaves_state_unchanged() {
        let mut r = receiver();
        r.on_frame(&Frame::data(0, b"first".to_vec()));

        let mut bad = Frame::data(1, b"second".to_vec());
        bad.payload = Some(b"secoNd".to_vec());
        let (verdict, ack) = r.on_frame(&bad);

        assert_eq!(verdict, Verdict::Corrupt);
        assert_eq!(ack, Some(Frame::ack(1)));
        assert_eq!(r.expected_seq(), 1);
        assert_eq!(r.assembled().len(), 1);
        assert_eq!(r.stats().acks_generated, 2);
    }

    #[test]
    fn retransmitted_copy_of_accepted_frame_not_appended() {
        let mut r = receiver();
        r.on_frame(&Frame::data(0, b"once".to_vec()));
        let (verdict, ack) = r.on_frame(&Frame::data(0, b"once".to_vec()));

        assert_eq!(verdict, Verdict::OutOfOrder);
        assert_eq!(ack, Some(Frame::ack(1)));
        assert_eq!(r.message(), b"once");
    }

    #[test]
    fn duplicate_of_expected_slot_not_appended() {
        let mut r = receiver();
        // The slot about to be accepted was already delivered.
        r.last_accepted_seq = Some(0);
        let (verdict, ack) = r.on_frame(&Frame::data(0, b"again".to_vec()));

        assert_eq!(verdict, Verdict::Duplicate);
        assert_eq!(ack, Some(Frame::ack(1)));
        assert!(r.assembled().is_empty());
        assert_eq!(r.expected_seq(), 1);
    }

    #[test]
    fn ack_frames_are_ignored() {
        let mut r = receiver();
        assert_eq!(r.on_frame(&Frame::ack(3)), (Verdict::Ignored, None));
        assert_eq!(r.expected_seq(), 0);
    }

    #[test]
    fn expected_seq_wraps() {
        let mut r = receiver();
        for i in 0..10u32 {
            let seq = i % 8;
            let (verdict, _) = r.on_frame(&Frame::data(seq, vec![i as u8]));
            assert_eq!(verdict, Verdict::Accepted);
        }
        assert_eq!(r.expected_seq(), 2);
        assert_eq!(r.message(), (0..10u8).collect::<Vec<_>>());
    }
}
