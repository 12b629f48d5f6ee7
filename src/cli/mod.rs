use clap::{Parser, Subcommand};

/// Default port, matching what peers expect to dial.
pub const DEFAULT_PORT: u16 = 12345;

#[derive(Parser)]
#[command(name = "partyline")]
#[command(about = "Tiny TCP rendezvous chat — one host relays text and files between peers", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host a room: accept peers and relay their messages
    Host {
        /// Address to bind
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Display name (blank falls back to "Host")
        #[arg(short, long, default_value = "")]
        name: String,

        /// Directory where received files are written
        #[arg(short, long, default_value = ".")]
        downloads: String,
    },

    /// Connect to a host as a peer
    Connect {
        /// Host address or name
        addr: String,

        /// Port the host listens on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Display name (blank falls back to "Peer")
        #[arg(short, long, default_value = "")]
        name: String,

        /// Directory where received files are written
        #[arg(short, long, default_value = ".")]
        downloads: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
