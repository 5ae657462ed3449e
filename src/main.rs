//! devbridge - message bridge and AI request coordinator
//!
//! Main entry point for the devbridge CLI.

mod cli;
mod handlers;
mod register;
mod server;

use clap::Parser;

use devbridge_config::ConfigLoader;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::CheckConfig) => server::check_config(&cli.config),
        Some(Commands::Serve {
            transport,
            host,
            port,
        }) => {
            let mut config = ConfigLoader::load_or_default(&cli.config)?;
            if let Some(kind) = transport {
                config.transport.kind = kind.into();
            }
            if let Some(host) = host {
                config.transport.host = host;
            }
            if let Some(port) = port {
                config.transport.port = port;
            }
            server::run_serve(config).await
        }
        None => {
            let config = ConfigLoader::load_or_default(&cli.config)?;
            server::run_serve(config).await
        }
    }
}
