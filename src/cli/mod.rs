pub mod capture;
pub mod history;
pub mod process;
pub mod server_path;

use std::{env, path::PathBuf};

use anyhow::Result;
use capture::process_capture_command;
use clap::{Parser, Subcommand};
use history::{process_history_command, HistoryCommand};
use process::{kill_previous_servers, restart_server};
use tracing::level_filters::LevelFilter;

use crate::{
    client::ApiClient,
    server::{resolve_port, start_server},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Clickspan", version, long_about = None)]
#[command(about = "Application for measuring and tracking double-click speed", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the measurement server in the background")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Measure your double-click speed from the terminal")]
    Capture {},
    #[command(about = "Display recorded measurements with date filtering and sorting")]
    History {
        #[command(flatten)]
        command: HistoryCommand,
    },
    #[command(
        about = "Run the measurement server directly in current console. Used for creating the background server internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[arg(long, help = "Port to listen on. Falls back to CLICKSPAN_PORT, then 3000")]
        port: Option<u16>,
    },
    #[command(about = "Stop currently running server.")]
    Stop {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { dir } => {
            restart_server(dir.as_deref())?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe().expect("Can't operate without an executable");
            kill_previous_servers(&server_path::to_server_path(process_name));
            Ok(())
        }
        Commands::Serve { dir, port } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            start_server(dir, resolve_port(port)).await?;
            Ok(())
        }
        Commands::Capture {} => process_capture_command(ApiClient::from_env()?).await,
        Commands::History { command } => {
            process_history_command(command, ApiClient::from_env()?).await
        }
    }
}
