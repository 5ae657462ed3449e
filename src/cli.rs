//! CLI definitions for devbridge.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use devbridge_config::TransportKind;

/// devbridge CLI.
#[derive(Parser)]
#[command(name = "devbridge")]
#[command(about = "Message bridge and AI request coordinator for developer tools")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/devbridge.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the bridge in the foreground (default)
    Serve {
        /// Transport to use instead of the configured one
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,

        /// WebSocket listen host
        #[arg(long)]
        host: Option<String>,

        /// WebSocket listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum TransportArg {
    Native,
    Websocket,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Native => TransportKind::Native,
            TransportArg::Websocket => TransportKind::Websocket,
        }
    }
}
