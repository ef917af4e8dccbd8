//! Gantt-Sync CLI
//!
//! Command-line tools for the Gantt-Sync relay.
//!
//! # Commands
//!
//! - `serve` - Run the WebSocket relay
//! - `validate` - Check one operation the way `/validate-op` does
//! - `hlc parse` / `hlc compare` - Inspect HLC timestamps

mod commands;

use clap::{Parser, Subcommand};
use ganttsync_server::ServerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Gantt-Sync relay and protocol tools.
#[derive(Parser)]
#[command(name = "ganttsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Do not echo broadcasts back to their sender
        #[arg(long)]
        no_echo: bool,

        /// Per-connection outbound queue length
        #[arg(long, default_value = "256")]
        outbound_buffer: usize,
    },

    /// Validate a single operation (use `-` for stdin)
    Validate {
        /// JSON file holding one operation envelope
        input: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Inspect HLC timestamps
    Hlc {
        #[command(subcommand)]
        action: HlcCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum HlcCommands {
    /// Parse a timestamp and print its components
    Parse {
        /// Timestamp text
        text: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compare two timestamps
    Compare {
        /// Left timestamp
        left: String,

        /// Right timestamp
        right: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            no_echo,
            outbound_buffer,
        } => {
            let config = ServerConfig::new(bind)
                .with_echo_to_sender(!no_echo)
                .with_outbound_buffer(outbound_buffer);
            commands::serve::run(config)?;
        }
        Commands::Validate { input, format } => {
            commands::validate::run(&input, &format)?;
        }
        Commands::Hlc { action } => match action {
            HlcCommands::Parse { text, format } => commands::hlc::parse(&text, &format)?,
            HlcCommands::Compare { left, right } => commands::hlc::compare(&left, &right)?,
        },
        Commands::Version => {
            println!("Gantt-Sync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
