//! Per-frame retransmission timers.
//!
//! Every in-flight DATA frame owns one deadline.  Instead of one sleeping
//! task per frame, the deadlines live in a single [`RetransmitTimers`] set
//! that the session event loop polls: it sleeps until
//! [`RetransmitTimers::next_deadline`] and then asks the sender which
//! in-flight frames have expired.
//!
//! Cancelling a timer removes its deadline, so an expiry for a frame that
//! has already been acknowledged can never be observed.
//!
//! All instants are `tokio::time::Instant`, which lets tests drive the set
//! with a virtual clock.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

/// Deadlines keyed by sequence number.
#[derive(Debug, Clone)]
pub struct RetransmitTimers {
    timeout: Duration,
    deadlines: BTreeMap<u32, Instant>,
}

impl RetransmitTimers {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadlines: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start (or restart) the timer for `seq`, expiring `timeout` after `now`.
    pub fn arm(&mut self, seq: u32, now: Instant) {
        self.deadlines.insert(seq, now + self.timeout);
    }

    /// Stop the timer for `seq`.  Returns `false` if none was running.
    pub fn cancel(&mut self, seq: u32) -> bool {
        self.deadlines.remove(&seq).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_armed(&self, seq: u32) -> bool {
        self.deadlines.contains_key(&seq)
    }

    pub fn armed(&self) -> usize {
        self.deadlines.len()
    }

    /// Earliest pending deadline, or `None` when no timer is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// `true` if `seq`'s timer is running and its deadline is not after `now`.
    pub fn is_expired(&self, seq: u32, now: Instant) -> bool {
        self.deadlines.get(&seq).is_some_and(|deadline| *deadline <= now)
    }
}
