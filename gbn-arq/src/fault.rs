//! Fault injection for exercising the recovery paths.
//!
//! Real links drop and corrupt frames.  To exercise retransmission and
//! checksum handling without depending on actual network conditions, every
//! outbound frame passes through a [`FaultInjector`] before it is written:
//!
//! | Fault       | Description                                                  |
//! |-------------|--------------------------------------------------------------|
//! | DATA loss   | Drop a DATA frame with probability `data_loss`.              |
//! | ACK loss    | Drop an ACK frame with probability `ack_loss`.               |
//! | Corruption  | Flip one bit of a DATA payload with probability `corruption`.|
//!
//! Corruption is applied to the copy handed to the wire, never to the frame
//! kept in the send window, and the crc is left untouched, so a corrupted
//! frame is always caught by the receiver's checksum.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FaultConfig;
use crate::frame::Frame;

/// Strategy deciding the fate of each outbound frame.
pub trait FaultInjector: Send {
    /// `true` if `frame` should vanish instead of being written.
    fn should_drop(&mut self, frame: &Frame, is_ack: bool) -> bool;

    /// Return the payload to put on the wire, possibly with one bit flipped.
    fn maybe_corrupt(&mut self, payload: Vec<u8>) -> Vec<u8>;
}

/// Pass-through injector used when fault injection is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn should_drop(&mut self, _frame: &Frame, _is_ack: bool) -> bool {
        false
    }

    fn maybe_corrupt(&mut self, payload: Vec<u8>) -> Vec<u8> {
        payload
    }
}

/// Probability-driven injector backed by a seedable RNG.
#[derive(Debug)]
pub struct RandomFaults {
    config: FaultConfig,
    rng: StdRng,
}

impl RandomFaults {
    /// Seeded from `config.seed`, or from the OS when no seed is set.
    pub fn new(config: FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }
}

impl FaultInjector for RandomFaults {
    fn should_drop(&mut self, frame: &Frame, is_ack: bool) -> bool {
        let p = if is_ack {
            self.config.ack_loss
        } else {
            self.config.data_loss
        };
        let drop = self.rng.random_bool(p);
        if drop {
            log::warn!(
                "[fault] simulating loss of {} {}",
                if is_ack { "ACK" } else { "DATA" },
                frame.seq_num
            );
        }
        drop
    }

    fn maybe_corrupt(&mut self, mut payload: Vec<u8>) -> Vec<u8> {
        if payload.is_empty() || !self.rng.random_bool(self.config.corruption) {
            return payload;
        }
        let byte = self.rng.random_range(0..payload.len());
        let bit = self.rng.random_range(0..8u32);
        payload[byte] ^= 1 << bit;
        log::warn!("[fault] flipped bit {bit} of payload byte {byte}");
        payload
    }
}

/// Build the injector described by `config`.
pub fn injector_for(config: &FaultConfig) -> Box<dyn FaultInjector> {
    if config.is_disabled() {
        Box::new(NoFaults)
    } else {
        Box::new(RandomFaults::new(config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::verify_crc8;

    fn seeded(data_loss: f64, ack_loss: f64, corruption: f64) -> RandomFaults {
        RandomFaults::new(FaultConfig {
            data_loss,
            ack_loss,
            corruption,
            seed: Some(7),
        })
    }

    #[test]
    fn no_faults_is_transparent() {
        let mut f = NoFaults;
        let frame = Frame::data(0, b"abc".to_vec());
        assert!(!f.should_drop(&frame, false));
        assert_eq!(f.maybe_corrupt(b"abc".to_vec()), b"abc");
    }

    #[test]
    fn certain_loss_drops_only_the_configured_kind() {
        let mut f = seeded(1.0, 0.0, 0.0);
        assert!(f.should_drop(&Frame::data(0, vec![1]), false));
        assert!(!f.should_drop(&Frame::ack(1), true));

        let mut f = seeded(0.0, 1.0, 0.0);
        assert!(!f.should_drop(&Frame::data(0, vec![1]), false));
        assert!(f.should_drop(&Frame::ack(1), true));
    }

    #[test]
    fn corruption_flips_exactly_one_bit() {
        let mut f = seeded(0.0, 0.0, 1.0);
        let original = b"payload under test".to_vec();
        let crc = crate::frame::calculate_crc8(&original);

        for _ in 0..50 {
            let corrupted = f.maybe_corrupt(original.clone());
            let flipped: u32 = original
                .iter()
                .zip(&corrupted)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum();
            assert_eq!(flipped, 1);
            assert!(!verify_crc8(&corrupted, crc));
        }
    }

    #[test]
    fn empty_payload_is_never_corrupted() {
        let mut f = seeded(0.0, 0.0, 1.0);
        assert!(f.maybe_corrupt(Vec::new()).is_empty());
    }

    #[test]
    fn same_seed_same_decisions() {
        let frame = Frame::data(0, vec![0]);
        let mut a = seeded(0.5, 0.5, 0.0);
        let mut b = seeded(0.5, 0.5, 0.0);
        let da: Vec<bool> = (0..64).map(|i| a.should_drop(&frame, i % 2 == 0)).collect();
        let db: Vec<bool> = (0..64).map(|i| b.should_drop(&frame, i % 2 == 0)).collect();
        assert_eq!(da, db);
        assert!(da.iter().any(|d| *d) && da.iter().any(|d| !*d));
    }
}
