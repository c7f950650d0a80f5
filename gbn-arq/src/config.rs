//! Session configuration.
//!
//! [`ArqConfig`] collects every tunable of a sender or receiver session:
//! addressing, window and sequence-space sizes, the retransmission timeout,
//! framing limits and the fault-injection model ([`FaultConfig`]).
//!
//! Defaults describe a small, easily observable protocol instance: an 8-slot
//! sequence space (`0..=7`) with a window of 4 and a two-second timeout.

use std::time::Duration;

use thiserror::Error;

/// Fault-injection probabilities.
///
/// All probabilities are in the range `[0.0, 1.0]`.  The default is a
/// transparent pass-through (no faults).
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Probability that an outbound DATA frame is silently dropped.
    pub data_loss: f64,
    /// Probability that an outbound ACK frame is silently dropped.
    pub ack_loss: f64,
    /// Probability that one bit of an outbound DATA payload is flipped.
    pub corruption: f64,
    /// Seed for the fault RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl FaultConfig {
    /// `true` when no fault can ever fire.
    pub fn is_disabled(&self) -> bool {
        self.data_loss == 0.0 && self.ack_loss == 0.0 && self.corruption == 0.0
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            data_loss: 0.0,
            ack_loss: 0.0,
            corruption: 0.0,
            seed: None,
        }
    }
}

/// Complete configuration of one protocol session.
#[derive(Debug, Clone, PartialEq)]
pub struct ArqConfig {
    /// Host the receiver binds to and the sender connects to.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Go-Back-N window size (N).
    pub window_size: usize,
    /// Per-frame retransmission timeout.
    pub timeout: Duration,
    /// Largest sequence number; arithmetic is modulo `max_seq_num + 1`.
    pub max_seq_num: u32,
    /// Payload bytes per DATA frame when splitting an outbound message.
    pub chunk_size: usize,
    /// Width of the ASCII decimal length prefix.
    pub prefix_width: usize,
    /// Largest serialised frame accepted from the stream.
    pub max_frame_len: usize,
    /// Retransmissions allowed per frame before the sender gives up.
    /// `None` retries forever.
    pub max_retransmissions: Option<u32>,
    /// Fault-injection model.
    pub faults: FaultConfig,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12345,
            window_size: 4,
            timeout: Duration::from_secs(2),
            max_seq_num: 7,
            chunk_size: 512,
            prefix_width: 10,
            max_frame_len: 1024 * 1024,
            max_retransmissions: None,
            faults: FaultConfig::default(),
        }
    }
}

impl ArqConfig {
    /// `host:port`, suitable for `TcpStream::connect` / `TcpListener::bind`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check every cross-field constraint.
    ///
    /// A window wider than half the sequence space is legal but makes the
    /// half-range ordering of sequence numbers ambiguous, so it is reported
    /// with a warning rather than rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seq_num == 0 {
            return Err(ConfigError::SequenceSpaceTooSmall);
        }
        if self.window_size == 0 || self.window_size as u64 > u64::from(self.max_seq_num) {
            return Err(ConfigError::WindowSize {
                window_size: self.window_size,
                max_seq_num: self.max_seq_num,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(1..=20).contains(&self.prefix_width) {
            return Err(ConfigError::PrefixWidth(self.prefix_width));
        }
        for (name, p) in [
            ("data_loss", self.faults.data_loss),
            ("ack_loss", self.faults.ack_loss),
            ("corruption", self.faults.corruption),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Probability { name, value: p });
            }
        }

        if 2 * self.window_size as u64 > u64::from(self.max_seq_num) + 1 {
            log::warn!(
                "window size {} exceeds half of the sequence space (0..={}); \
                 wrap-around comparisons may be ambiguous",
                self.window_size,
                self.max_seq_num
            );
        }
        Ok(())
    }
}

/// A configuration value that cannot be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max_seq_num must be at least 1")]
    SequenceSpaceTooSmall,
    #[error("window size {window_size} must be in 1..={max_seq_num}")]
    WindowSize { window_size: usize, max_seq_num: u32 },
    #[error("chunk size must be at least 1 byte")]
    ZeroChunkSize,
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("length prefix width {0} must be in 1..=20")]
    PrefixWidth(usize),
    #[error("{name} probability {value} is outside [0, 1]")]
    Probability { name: &'static str, value: f64 },
}
