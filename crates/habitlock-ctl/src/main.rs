use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use habitlock_common::config::default_config_path;
use habitlock_proto::IpcRequest;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "habitlock-ctl")]
#[command(about = "Control the habitlock blocking daemon", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Daemon configuration file to take paths from")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Path of the daemon's control socket")]
    socket: Option<PathBuf>,

    #[arg(long, global = true, help = "Path of the daemon's status file")]
    status_file: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = 2000, help = "Request timeout in milliseconds")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon is alive
    Ping,

    /// Run an evaluation cycle now
    Refresh,

    /// Remove blocking immediately, bypassing the schedule
    Reset,

    /// Show the last published daemon status
    Status {
        #[arg(long, help = "Print the raw JSON snapshot")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let paths = config::load_ipc_config(&config_path)?;
    let socket = cli.socket.unwrap_or(paths.socket_path);
    let status_file = cli.status_file.unwrap_or(paths.status_path);
    let timeout = Duration::from_millis(cli.timeout_ms);

    match cli.command {
        Commands::Ping => commands::control::send(&socket, IpcRequest::Ping, timeout).await?,
        Commands::Refresh => commands::control::send(&socket, IpcRequest::Refresh, timeout).await?,
        Commands::Reset => commands::control::send(&socket, IpcRequest::Reset, timeout).await?,
        Commands::Status { json } => commands::status::show(&status_file, json)?,
    }

    Ok(())
}
