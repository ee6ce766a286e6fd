//! canlink - Command-line tool for CAN bus sessions
//!
//! Lists interface candidates, sends and receives frames, monitors traffic
//! and shows the message log of a project.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use canlink_core::parse_arbitration_id;
use canlink_session::CanSession;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "canlink")]
#[command(author, version, about = "CAN bus session tool")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CANLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Interface name to connect to (otherwise the first available candidate)
    #[arg(short, long, env = "CANLINK_INTERFACE")]
    interface: Option<String>,

    /// Project that traffic is logged under
    #[arg(short, long, env = "CANLINK_PROJECT")]
    project: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List interface candidates
    Interfaces,

    /// Send one frame
    Send {
        /// Payload: text, or hex bytes with --hex (e.g. "01 02 FF")
        payload: String,

        /// Arbitration ID
        #[arg(long, default_value = "0x123", value_parser = parse_id)]
        id: u32,

        /// Use a 29-bit extended ID
        #[arg(long)]
        extended: bool,

        /// Treat the payload as hex bytes
        #[arg(long)]
        hex: bool,
    },

    /// Receive frames
    Receive {
        /// Wait per frame in milliseconds (default from config)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Stop after this many frames
        #[arg(long, default_value = "1")]
        count: usize,
    },

    /// Print bus traffic until Ctrl+C
    Monitor,

    /// Show stored messages of a project
    Log {
        /// Project name (default: the active project)
        project: Option<String>,
    },
}

fn parse_id(s: &str) -> Result<u32, String> {
    parse_arbitration_id(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.interface.as_deref(),
        cli.project.as_deref(),
        cli.output,
        cli.no_color,
    )?;

    // Create output context
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    let receive_timeout = merged.session.session.receive_timeout();
    let session = CanSession::from_config(merged.session).context("Failed to set up session")?;
    let interface = merged.interface.as_deref();

    // Execute command
    match &cli.command {
        Commands::Interfaces => commands::interfaces(&session, &ctx).await,

        Commands::Send {
            payload,
            id,
            extended,
            hex,
        } => commands::send(&session, interface, payload, *id, *extended, *hex, &ctx).await,

        Commands::Receive { timeout_ms, count } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(receive_timeout);
            commands::receive(&session, interface, timeout, *count, &ctx).await
        }

        Commands::Monitor => commands::monitor(&session, interface, &ctx).await,

        Commands::Log { project } => {
            let project = project
                .clone()
                .or_else(|| session.project())
                .unwrap_or_else(|| session.config().project.clone());
            commands::log(&session, &project, &ctx)
        }
    }
}
