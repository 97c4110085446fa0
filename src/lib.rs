pub mod cli;
pub mod config;
pub mod config_file;
pub mod control;
pub mod daemon;
pub mod signals;
pub mod watchdog;
