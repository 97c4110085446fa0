use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::mpsc::Sender;

/// What should we do when the user stops this program?
/// Ask the daemon loop to shut the watchdog down.
pub fn handle_shutdown(shutdown_tx: Sender<()>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        for signal in signals.forever() {
            log::warn!("Received signal {signal}, shutting down");
            let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]);
            if shutdown_tx.blocking_send(()).is_err() {
                // The daemon loop is already gone
                std::process::exit(0);
            }
        }
    });

    Ok(())
}
