//! `gbn-arq`: Go-Back-N automatic repeat request over a reliable byte stream.
//!
//! The sender splits a message into DATA frames, keeps up to N of them in
//! flight and retransmits the whole outstanding window when a frame's timer
//! expires.  The receiver accepts frames strictly in order and answers every
//! DATA frame with a cumulative ACK.  Loss and corruption are simulated on
//! the sending side of each link, so the protocol has something to recover
//! from even though the underlying TCP stream is itself reliable.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────┐   DATA (length-prefixed)   ┌────────────────────┐
//!  │  SenderSession   │───────────────────────────▶│  ReceiverSession   │
//!  │   └ GbnSender    │                            │   └ GbnReceiver    │
//!  │   └ timers       │◀───────────────────────────│                    │
//!  └────────┬─────────┘        cumulative ACK      └─────────┬──────────┘
//!           │                                                │
//!      ┌────▼─────┐  fault injection on every write     ┌────▼─────┐
//!      │   Link   │                                     │   Link   │
//!      └────┬─────┘                                     └────┬─────┘
//!           │  StreamFraming: ASCII length prefix + frame    │
//!           └────────────────────── TCP ─────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`config`]: session configuration and validation
//! - [`seq`]: modular sequence-number arithmetic
//! - [`frame`]: frame type, CRC-8 and binary encoding
//! - [`framing`]: length-prefixed frames over a byte stream
//! - [`fault`]: loss and corruption injection
//! - [`timer`]: per-frame retransmission deadlines
//! - [`sender`]: Go-Back-N send window state machine
//! - [`receiver`]: in-order receive state machine
//! - [`link`]: fault-injecting writer and frame reader task
//! - [`session`]: errors shared by both session drivers
//! - [`sender_session`]: async sender driver
//! - [`receiver_session`]: async receiver driver

pub mod config;
pub mod fault;
pub mod frame;
pub mod framing;
pub mod link;
pub mod receiver;
pub mod receiver_session;
pub mod sender;
pub mod sender_session;
pub mod seq;
pub mod session;
pub mod timer;

pub use config::{ArqConfig, ConfigError, FaultConfig};
pub use frame::{Frame, FrameKind};
pub use receiver_session::{CloseReason, ReceiveReport, ReceiverSession};
pub use sender_session::{SendReport, SenderSession};
pub use session::SessionError;
