pub mod diagnosis;
pub mod events;
pub mod history;
pub mod lifecycle;
pub mod notifier;
pub mod stamp;

pub use events::{FailureNotification, HeartbeatRecord, LivelinessEvent};
pub use lifecycle::{Transition, Watchdog, WatchdogConfig, WatchdogState};
pub use notifier::FailureOutput;
pub use stamp::Stamp;
