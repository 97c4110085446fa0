use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Optional settings file. Every value here can be overridden on the
/// command line.
#[derive(Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfigFile {
    /// Start the watchdog on creation.
    #[serde(default)]
    pub activate: bool,
    /// Publish failure notifications.
    #[serde(default)]
    pub publish: bool,
    pub topic: Option<String>,
    pub history_capacity: Option<NonZeroUsize>,
    pub listen: Option<SocketAddr>,
    pub failure_output: Option<PathBuf>,
}

impl WatchdogConfigFile {
    fn try_init_from_string(config: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(config)?)
    }

    pub fn try_init(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let config = std::fs::read_to_string(path)?;
        Self::try_init_from_string(&config)
    }
}
