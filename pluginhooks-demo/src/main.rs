//! Example plugin: appends a suffix to matching packets and blocks others.
//!
//! Launched by the host with the handshake environment set. Stdout belongs
//! to the handshake, so logs go to stderr (`RUST_LOG`, default `info`).

mod tagger;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::tagger::{Defaults, Tagger};

/// Payload tagger plugin.
#[derive(Debug, Parser)]
#[command(name = "payload-tagger", version, about)]
struct Args {
    /// Suffix appended to matching received packets.
    #[arg(long, default_value = "-tagged")]
    suffix: String,

    /// Packet type whose received payloads get the suffix.
    #[arg(long, default_value = "http")]
    packet_type: String,

    /// Packet types stopped in both directions (repeatable).
    #[arg(long = "block", value_name = "TYPE")]
    blocked: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    pluginhooks::serve(Tagger::new(Defaults {
        suffix: args.suffix,
        packet_type: args.packet_type,
        blocked: args.blocked,
    }));
}
