use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    sync::OnceLock,
};

use clap::{Parser, Subcommand, ValueEnum};

use crate::watchdog::Transition;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7400";

/// Liveliness based watchdog naming the entity behind every lost heartbeat.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    subcommand_negates_reqs = true,
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    /// Lease in positive integer milliseconds granted to the watched entity.
    #[arg(required = true)]
    pub lease: Option<NonZeroU64>,

    /// Start the watchdog on creation.
    #[arg(long)]
    pub activate: bool,

    /// Publish lease expiration of the watched entity.
    #[arg(long)]
    pub publish: bool,

    /// Topic carrying the heartbeat signal [default: heartbeat]
    #[arg(long)]
    pub topic: Option<String>,

    /// Number of heartbeats kept as evidence [default: 25]
    #[arg(long)]
    pub history_capacity: Option<NonZeroUsize>,

    /// Address receiving heartbeats, liveliness events and transitions
    /// [default: 127.0.0.1:7400]
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Append failure notifications to this file instead of stdout.
    #[arg(long)]
    pub failure_output: Option<PathBuf>,

    /// Path to an optional config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Request a lifecycle transition from a running watchdog.
    Transition {
        #[arg(value_enum)]
        transition: TransitionArg,
        /// Address the watchdog listens on.
        #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
        addr: SocketAddr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransitionArg {
    Configure,
    Activate,
    Deactivate,
    Cleanup,
    Shutdown,
}

impl From<TransitionArg> for Transition {
    fn from(value: TransitionArg) -> Self {
        match value {
            TransitionArg::Configure => Transition::Configure,
            TransitionArg::Activate => Transition::Activate,
            TransitionArg::Deactivate => Transition::Deactivate,
            TransitionArg::Cleanup => Transition::Cleanup,
            TransitionArg::Shutdown => Transition::Shutdown,
        }
    }
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
