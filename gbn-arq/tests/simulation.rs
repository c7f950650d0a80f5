//! Deterministic simulations of the Go-Back-N engines.
//!
//! [`GbnSender`] and [`GbnReceiver`] are wired together through two FIFO
//! queues with a fixed one-way latency and driven by a virtual clock that
//! advances one millisecond per step.  Faults come from a seeded
//! [`RandomFaults`], so every run is reproducible.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use gbn_arq::config::FaultConfig;
use gbn_arq::fault::{FaultInjector, NoFaults, RandomFaults};
use gbn_arq::frame::Frame;
use gbn_arq::receiver::{GbnReceiver, Verdict};
use gbn_arq::sender::{chunk_message, AckOutcome, GbnSender};
use gbn_arq::seq::SeqSpace;

const STEP: Duration = Duration::from_millis(1);
const LATENCY: Duration = Duration::from_millis(5);
const RTO: Duration = Duration::from_millis(100);
const GIVE_UP: Duration = Duration::from_secs(600);

/// Drops the first DATA frame (or ACK) carrying one sequence number.
struct DropFirst {
    seq: u32,
    ack: bool,
    fired: bool,
}

impl FaultInjector for DropFirst {
    fn should_drop(&mut self, frame: &Frame, is_ack: bool) -> bool {
        if is_ack == self.ack && frame.seq_num == self.seq && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }

    fn maybe_corrupt(&mut self, payload: Vec<u8>) -> Vec<u8> {
        payload
    }
}

/// Everything observed during one simulated transfer.
#[derive(Default)]
struct Trace {
    /// Receiver verdicts with the ACK each produced.
    verdicts: Vec<(u32, Verdict, u32)>,
    /// Sequence numbers retransmitted, in order.
    retransmitted: Vec<u32>,
    max_in_flight: usize,
    delivered: usize,
}

struct Harness {
    sender: GbnSender,
    receiver: GbnReceiver,
    data_faults: Box<dyn FaultInjector>,
    ack_faults: Box<dyn FaultInjector>,
    to_receiver: VecDeque<(Instant, Frame)>,
    to_sender: VecDeque<(Instant, Frame)>,
    trace: Trace,
}

impl Harness {
    fn new(
        max_seq: u32,
        window: usize,
        data_faults: Box<dyn FaultInjector>,
        ack_faults: Box<dyn FaultInjector>,
    ) -> Self {
        let space = SeqSpace::new(max_seq);
        Self {
            sender: GbnSender::new(space, window, RTO),
            receiver: GbnReceiver::new(space),
            data_faults,
            ack_faults,
            to_receiver: VecDeque::new(),
            to_sender: VecDeque::new(),
            trace: Trace::default(),
        }
    }

    fn put(
        faults: &mut dyn FaultInjector,
        queue: &mut VecDeque<(Instant, Frame)>,
        frame: Frame,
        now: Instant,
    ) {
        if faults.should_drop(&frame, frame.is_ack()) {
            return;
        }
        let mut wire = frame;
        if let Some(payload) = wire.payload.take() {
            wire.payload = Some(faults.maybe_corrupt(payload));
        }
        queue.push_back((now + LATENCY, wire));
    }

    fn run(mut self, message: &[u8], chunk_size: usize) -> (Vec<u8>, Trace) {
        let mut pending = chunk_message(message, chunk_size);
        let expected_frames = pending.len();
        let start = Instant::now();
        let mut now = start;

        while !pending.is_empty() || self.sender.has_unacked() {
            assert!(now - start < GIVE_UP, "transfer did not complete");

            for frame in self.sender.enqueue(&mut pending, now) {
                Self::put(self.data_faults.as_mut(), &mut self.to_receiver, frame, now);
            }

            while let Some(seq) = self.sender.pop_expired(now) {
                let frames = self.sender.on_timeout(seq, now).expect("no retry limit");
                for frame in frames {
                    self.trace.retransmitted.push(frame.seq_num);
                    Self::put(self.data_faults.as_mut(), &mut self.to_receiver, frame, now);
                }
            }

            while self.to_receiver.front().is_some_and(|(at, _)| *at <= now) {
                let (_, frame) = self.to_receiver.pop_front().unwrap();
                let (verdict, ack) = self.receiver.on_frame(&frame);
                let ack = ack.expect("every DATA frame is acknowledged");
                self.trace.verdicts.push((frame.seq_num, verdict, ack.seq_num));
                Self::put(self.ack_faults.as_mut(), &mut self.to_sender, ack, now);
            }

            while self.to_sender.front().is_some_and(|(at, _)| *at <= now) {
                let (_, ack) = self.to_sender.pop_front().unwrap();
                let base_before = self.sender.base();
                match self.sender.on_ack(ack.seq_num) {
                    AckOutcome::Advanced { released, base } => {
                        let space = self.sender.seq_space();
                        assert_eq!(space.distance(base_before, base) as usize, released);
                        assert!(released <= self.sender.window_size());
                        self.trace.delivered += released;
                    }
                    AckOutcome::Stale => assert_eq!(self.sender.base(), base_before),
                }
            }

            let in_flight = self.sender.in_flight();
            assert!(in_flight <= self.sender.window_size());
            assert_eq!(self.sender.timers().armed(), in_flight);
            self.trace.max_in_flight = self.trace.max_in_flight.max(in_flight);

            now += STEP;
        }

        assert_eq!(self.trace.delivered, expected_frames);
        (self.receiver.message(), self.trace)
    }
}

fn lossy(seed: u64, data_loss: f64, ack_loss: f64, corruption: f64) -> Box<dyn FaultInjector> {
    Box::new(RandomFaults::new(FaultConfig {
        data_loss,
        ack_loss,
        corruption,
        seed: Some(seed),
    }))
}

// ---------------------------------------------------------------------------
// Loss-free transfer
// ---------------------------------------------------------------------------

#[test]
fn clean_channel_delivers_without_retransmission() {
    let message: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let harness = Harness::new(7, 4, Box::new(NoFaults), Box::new(NoFaults));
    let (received, trace) = harness.run(&message, 100);

    assert_eq!(received, message);
    assert!(trace.retransmitted.is_empty());
    assert_eq!(trace.max_in_flight, 4);
    assert!(trace.verdicts.iter().all(|(_, v, _)| *v == Verdict::Accepted));
}

// ---------------------------------------------------------------------------
// One lost DATA frame
// ---------------------------------------------------------------------------

#[test]
fn single_loss_goes_back_to_the_lost_frame() {
    let harness = Harness::new(
        7,
        4,
        Box::new(DropFirst {
            seq: 2,
            ack: false,
            fired: false,
        }),
        Box::new(NoFaults),
    );
    let (received, trace) = harness.run(b"012345", 1);

    assert_eq!(received, b"012345");
    assert_eq!(trace.retransmitted, vec![2, 3, 4, 5]);

    use Verdict::*;
    assert_eq!(
        trace.verdicts,
        vec![
            (0, Accepted, 1),
            (1, Accepted, 2),
            (3, OutOfOrder, 2),
            (4, OutOfOrder, 2),
            (5, OutOfOrder, 2),
            (2, Accepted, 3),
            (3, Accepted, 4),
            (4, Accepted, 5),
            (5, Accepted, 6),
        ]
    );
}

// ---------------------------------------------------------------------------
// Lost ACKs are covered by later cumulative ACKs
// ---------------------------------------------------------------------------

#[test]
fn lost_ack_is_covered_by_the_next_one() {
    let harness = Harness::new(
        7,
        4,
        Box::new(NoFaults),
        Box::new(DropFirst {
            seq: 1,
            ack: true,
            fired: false,
        }),
    );
    let (received, trace) = harness.run(b"abcd", 1);

    assert_eq!(received, b"abcd");
    assert!(trace.retransmitted.is_empty());
}

// ---------------------------------------------------------------------------
// Random loss and corruption with wrap-around
// ---------------------------------------------------------------------------

#[test]
fn lossy_channel_eventually_delivers_everything() {
    let message: Vec<u8> = (0..200u32).map(|i| (i * 7 % 251) as u8).collect();

    for seed in 0..20u64 {
        let harness = Harness::new(
            7,
            4,
            lossy(seed, 0.2, 0.0, 0.1),
            lossy(seed + 1000, 0.0, 0.2, 0.0),
        );
        let (received, trace) = harness.run(&message, 8);
        assert_eq!(received, message, "seed {seed}");
        assert!(trace.max_in_flight <= 4);
    }
}

#[test]
fn corrupted_frames_are_never_delivered() {
    let message = b"every single byte must survive intact".to_vec();
    let harness = Harness::new(
        15,
        8,
        lossy(42, 0.0, 0.0, 0.5),
        Box::new(NoFaults),
    );
    let (received, trace) = harness.run(&message, 3);

    assert_eq!(received, message);
    assert!(trace.verdicts.iter().any(|(_, v, _)| *v == Verdict::Corrupt));
    assert!(!trace.retransmitted.is_empty());
}

#[test]
fn alternating_bit_still_delivers() {
    // Stop-and-wait: a one-bit sequence space and a window of one.
    let message = b"alternating bit".to_vec();
    let harness = Harness::new(1, 1, lossy(3, 0.3, 0.0, 0.0), lossy(4, 0.0, 0.3, 0.0));
    let (received, trace) = harness.run(&message, 2);

    assert_eq!(received, message);
    assert_eq!(trace.max_in_flight, 1);
}
