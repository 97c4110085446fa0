use std::{process::ExitCode, sync::Arc};

use clap::CommandFactory;
use log::{error, info};

use sw_watchdog::cli::{self, Command};
use sw_watchdog::config::DaemonConfig;
use sw_watchdog::daemon::Daemon;
use sw_watchdog::watchdog::Watchdog;
use sw_watchdog::{control, signals};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();

    let args = cli::get_cli_args();

    if let Some(Command::Transition { transition, addr }) = &args.command {
        return control::send_transition((*transition).into(), *addr).await;
    }

    let Some(lease) = args.lease else {
        let _ = cli::Args::command().print_help();
        return ExitCode::FAILURE;
    };

    let config = match DaemonConfig::try_init(args, lease) {
        Ok(config) => config,
        Err(err) => {
            error!("Unable to read config: {err}");
            return ExitCode::FAILURE;
        }
    };

    let watchdog = match Watchdog::new(config.watchdog.clone(), config.failure_output.clone()) {
        Ok(watchdog) => Arc::new(watchdog),
        Err(err) => {
            error!("Unable to start the watchdog: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("Watchdog created in state {}", watchdog.state());

    let daemon = match Daemon::bind(Arc::clone(&watchdog), config.listen).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!("Unable to listen on {}: {err}", config.listen);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
    if let Err(err) = signals::handle_shutdown(shutdown_tx) {
        error!("Unable to install signal handlers: {err}");
        return ExitCode::FAILURE;
    }

    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);

    match daemon.run(shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Watchdog failed: {err}");
            ExitCode::FAILURE
        }
    }
}
