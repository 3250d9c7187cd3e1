mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::{UiEvent, UiManager};
use clap::Parser;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (ui, ui_sender, shutdown) = UiManager::new();
    let ui_task = tokio::spawn(ui.run());

    let outcome = match prepare(&cli, ui_sender.clone()) {
        Ok(()) => dispatch(cli.command, ui_sender).await,
        Err(e) => Err(e),
    };

    // The UI flushes its queue before the final verdict is printed.
    if shutdown.send(true).is_err() {
        debug!("UI task ended before the shutdown signal.");
    }
    if let Err(e) = ui_task.await {
        eprintln!("UI task failed: {e}");
    }

    match outcome {
        Ok(()) => {
            info!("Command completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn prepare(cli: &Cli, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_file, ui_sender)?;
    install_panic_report()?;
    info!("OSRW CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Parsed arguments: {:?}", cli);
    configure_threads(cli.threads)
}

/// Panics are logged as colour-eyre reports so they reach the log file as well.
fn install_panic_report() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |info| {
        error!("{}", panic_hook.panic_report(info));
    }));
    Ok(())
}

/// Sizes the Rayon pool used for free-energy row evaluation.
fn configure_threads(threads: Option<usize>) -> Result<()> {
    let Some(threads) = threads else {
        return Ok(());
    };
    info!("Using {} worker threads for free-energy evaluation.", threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to build thread pool: {e}")))
}

async fn dispatch(command: Commands, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    match command {
        Commands::Walk(args) => {
            debug!("Running 'walk'.");
            commands::walk::run(args, ui_sender).await
        }
        Commands::Profile(args) => {
            debug!("Running 'profile'.");
            commands::profile::run(args).await
        }
    }
}
