//! Pieces shared by the sender and receiver sessions.

use std::io;

use thiserror::Error;

use crate::config::{ArqConfig, ConfigError};
use crate::framing::{FramingError, StreamFraming};
use crate::sender::RetriesExhausted;

/// Connection-level failures.  Frame-level anomalies (bad crc, ordering,
/// stale ACKs) are handled inside the engines and never show up here.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("accepting a peer failed: {0}")]
    Accept(#[source] io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("stream failure: {0}")]
    Framing(#[source] FramingError),
    #[error(transparent)]
    RetriesExhausted(#[from] RetriesExhausted),
    #[error("session cancelled")]
    Cancelled,
}

impl From<FramingError> for SessionError {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::ConnectionClosed => Self::ConnectionClosed,
            other => Self::Framing(other),
        }
    }
}

/// Framing limits described by `config`.
pub(crate) fn framing_for(config: &ArqConfig) -> StreamFraming {
    StreamFraming::new(config.prefix_width, config.max_frame_len)
}
