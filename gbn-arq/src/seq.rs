//! Modular sequence-number arithmetic.
//!
//! Sequence numbers live in `0..=max_seq` and wrap around to zero.  Ordering
//! between two numbers is decided by the half-range rule: two numbers that
//! are at most `max_seq / 2` apart compare as plain integers; a larger gap
//! means one of them has wrapped, so the order is inverted.
//!
//! The rule is unambiguous only while every pair being compared is closer
//! than half the space, which holds when the window covers at most half of
//! the sequence numbers.

/// A sequence space `0..=max_seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    max_seq: u32,
}

impl SeqSpace {
    /// # Panics
    ///
    /// Panics if `max_seq` is zero or `u32::MAX` (the modulus must fit a u32).
    pub fn new(max_seq: u32) -> Self {
        assert!(
            max_seq >= 1 && max_seq < u32::MAX,
            "max_seq must be in 1..u32::MAX"
        );
        Self { max_seq }
    }

    /// Largest valid sequence number.
    pub fn max_seq(&self) -> u32 {
        self.max_seq
    }

    /// Number of distinct sequence numbers (`max_seq + 1`).
    pub fn modulus(&self) -> u32 {
        self.max_seq + 1
    }

    /// `true` if `seq` is a valid member of the space.
    pub fn contains(&self, seq: u32) -> bool {
        seq <= self.max_seq
    }

    /// `seq + n` with wrap-around.
    pub fn add(&self, seq: u32, n: u32) -> u32 {
        ((u64::from(seq) + u64::from(n)) % u64::from(self.modulus())) as u32
    }

    /// The successor of `seq`.
    pub fn next(&self, seq: u32) -> u32 {
        self.add(seq, 1)
    }

    /// Forward distance from `from` to `to`, in `0..modulus`.
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        let m = u64::from(self.modulus());
        ((u64::from(to) + m - u64::from(from) % m) % m) as u32
    }

    /// `a ≥ b` under the half-range wrap-around rule.
    pub fn seq_ge(&self, a: u32, b: u32) -> bool {
        if a == b {
            return true;
        }
        // |a - b| <= max_seq / 2, kept in integers: 2·|a - b| <= max_seq.
        if 2 * u64::from(a.abs_diff(b)) <= u64::from(self.max_seq) {
            a > b
        } else {
            a < b
        }
    }
}
