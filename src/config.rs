use std::{net::SocketAddr, num::NonZeroU64, time::Duration};

use crate::cli::Args;
use crate::config_file::{ConfigFileError, WatchdogConfigFile};
use crate::watchdog::{FailureOutput, WatchdogConfig};

/// Everything the daemon needs, merged from the command line and the
/// optional config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub watchdog: WatchdogConfig,
    pub listen: SocketAddr,
    pub failure_output: FailureOutput,
}

impl DaemonConfig {
    pub fn try_init(args: &Args, lease: NonZeroU64) -> Result<Self, ConfigFileError> {
        let file = match &args.config {
            Some(path) => WatchdogConfigFile::try_init(path)?,
            None => WatchdogConfigFile::default(),
        };
        Ok(Self::merge(args, lease, file))
    }

    fn merge(args: &Args, lease: NonZeroU64, file: WatchdogConfigFile) -> Self {
        let mut watchdog = WatchdogConfig::new(Duration::from_millis(lease.get()));
        watchdog.autostart = args.activate || file.activate;
        watchdog.publish_failures = args.publish || file.publish;
        if let Some(topic) = args.topic.clone().or(file.topic) {
            watchdog.topic_name = topic;
        }
        if let Some(capacity) = args.history_capacity.or(file.history_capacity) {
            watchdog.history_capacity = capacity;
        }

        let listen = args
            .listen
            .or(file.listen)
            .unwrap_or_else(default_listen_addr);

        let failure_output = match args.failure_output.clone().or(file.failure_output) {
            Some(path) => FailureOutput::File(path),
            None => FailureOutput::Stdout,
        };

        Self {
            watchdog,
            listen,
            failure_output,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7400))
}
