//! Entry point for `ctcp`.
//!
//! Parses CLI arguments and launches the UDP driver in either listen or
//! connect mode.  All protocol work lives in the library; this file owns
//! process setup (logging, argument parsing) only.

mod driver;
mod socket;

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ctcp::Config;

/// A TCP-like reliable byte stream over unreliable datagrams.
///
/// Bytes read from stdin are delivered, in order and exactly once, to the
/// peer's stdout, and vice versa.  Closing stdin closes the connection's
/// send direction.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Send and receive window size in segments.
    #[arg(short, long, default_value_t = 1)]
    window: u32,

    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    rt_timeout: i64,

    /// Timer tick granularity in milliseconds.
    #[arg(long, default_value_t = 40)]
    timer: i64,

    /// Retransmission attempts before the connection is dropped.
    #[arg(long, default_value_t = 5)]
    max_retransmits: u32,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for a peer; the first inbound datagram pins its address.
    Listen {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: String,
    },
    /// Talk to a remote peer immediately.
    Connect {
        /// Remote peer address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: String,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let cfg = Config {
        send_window: cli.window,
        recv_window: cli.window,
        rt_timeout_ms: cli.rt_timeout,
        timer_ms: cli.timer,
        max_retransmits: cli.max_retransmits,
    };
    cfg.validate()?;

    let (bind, peer) = match cli.mode {
        Mode::Listen { bind } => (bind, None),
        Mode::Connect { peer, bind } => (bind, Some(peer)),
    };
    let bind: SocketAddr = bind.parse().context("invalid bind address")?;
    let peer: Option<SocketAddr> = peer
        .map(|p| p.parse().context("invalid peer address"))
        .transpose()?;

    driver::run(bind, peer, cfg).await
}
