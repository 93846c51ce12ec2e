//! This module implements the CLI interface.
//!
//! The harness is started by the host-side tooling with the transport
//! descriptor and the synchronization quantum as positional arguments.
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
pub struct Cli {
    /// Enable verbose logging. Can be specified multiple times to
    /// increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Where the host simulator connects to: `unix:<path>` or a plain
    /// path for a Unix domain socket.
    ///
    /// Without it, the harness only checks that the topology can be
    /// assembled and exits with an error.
    #[arg(value_name = "SOCKET_DESCRIPTOR")]
    pub socket_descriptor: Option<String>,

    /// How far the harness may simulate ahead of the host before
    /// synchronizing, in nanoseconds.
    #[arg(value_name = "SYNC_QUANTUM_NS", default_value_t = 10_000)]
    pub sync_quantum_ns: u64,
}
