//! Entry point for `gbn-arq`.
//!
//! Parses CLI arguments and dispatches into either **receive** or **send**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, signal handling, argument parsing).

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use gbn_arq::{ArqConfig, FaultConfig, ReceiverSession, SenderSession};

/// Go-Back-N ARQ over TCP with simulated loss and corruption.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for one sender, print what it delivered, then exit.
    Receive {
        #[command(flatten)]
        opts: SessionOpts,
        /// Write the received message here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Connect to a receiver and deliver a message.
    Send {
        #[command(flatten)]
        opts: SessionOpts,
        /// Message text to send.
        #[arg(short, long, conflicts_with = "file")]
        message: Option<String>,
        /// Send the contents of this file.  Without --message or --file the
        /// message is read from stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Options shared by both modes.
#[derive(Args)]
struct SessionOpts {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(short, long, default_value_t = 12345)]
    port: u16,
    /// Go-Back-N window size.
    #[arg(short, long, default_value_t = 4)]
    window: usize,
    /// Retransmission timeout in milliseconds.
    #[arg(short, long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Largest sequence number (sequence space is 0..=MAX_SEQ).
    #[arg(long, default_value_t = 7)]
    max_seq: u32,
    /// Payload bytes per DATA frame.
    #[arg(long, default_value_t = 512)]
    chunk_size: usize,
    /// Digits in the ASCII length prefix; both ends must agree.
    #[arg(long, default_value_t = 10)]
    prefix_width: usize,
    /// Largest frame, in bytes, accepted from the stream.
    #[arg(long, default_value_t = 1024 * 1024)]
    max_frame_len: usize,
    /// Give up after this many retransmissions of one frame.
    #[arg(long)]
    max_retransmissions: Option<u32>,
    /// Probability of dropping an outbound DATA frame.
    #[arg(long, default_value_t = 0.0)]
    data_loss: f64,
    /// Probability of dropping an outbound ACK.
    #[arg(long, default_value_t = 0.0)]
    ack_loss: f64,
    /// Probability of flipping one payload bit of an outbound DATA frame.
    #[arg(long, default_value_t = 0.0)]
    corruption: f64,
    /// Seed for the fault RNG, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
}

impl SessionOpts {
    fn into_config(self) -> ArqConfig {
        ArqConfig {
            host: self.host,
            port: self.port,
            window_size: self.window,
            timeout: Duration::from_millis(self.timeout_ms),
            max_seq_num: self.max_seq,
            chunk_size: self.chunk_size,
            prefix_width: self.prefix_width,
            max_frame_len: self.max_frame_len,
            max_retransmissions: self.max_retransmissions,
            faults: FaultConfig {
                data_loss: self.data_loss,
                ack_loss: self.ack_loss,
                corruption: self.corruption,
                seed: self.seed,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    match cli.mode {
        Mode::Receive { opts, output } => {
            let config = opts.into_config();
            let report = ReceiverSession::listen(&config, cancel).await?;
            log::info!(
                "received {} frame(s), {} byte(s); {}",
                report.payloads.len(),
                report.message().len(),
                report.close_reason
            );
            let message = report.message();
            match output {
                Some(path) => std::fs::write(&path, &message)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout()
                    .write_all(&message)
                    .context("writing to stdout")?,
            }
        }
        Mode::Send {
            opts,
            message,
            file,
        } => {
            let config = opts.into_config();
            let message = read_message(message, file)?;
            let mut session = SenderSession::connect(&config, cancel).await?;
            let report = session.send_message(&message).await?;
            session.close().await;
            log::info!(
                "delivered {} frame(s) with {} retransmission(s)",
                report.frames_delivered,
                report.retransmissions
            );
        }
    }
    Ok(())
}

fn read_message(message: Option<String>, file: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    if let Some(text) = message {
        return Ok(text.into_bytes());
    }
    if let Some(path) = file {
        return std::fs::read(&path).with_context(|| format!("reading {}", path.display()));
    }
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("reading message from stdin")?;
    Ok(buf)
}
