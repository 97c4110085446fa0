use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use log::info;
use tokio::sync::mpsc::{Sender, error::TrySendError};
use uuid::Uuid;

use super::diagnosis::DiagnosedLoss;
use super::events::FailureNotification;
use super::stamp::Stamp;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unable to open failure output {0:?}: {1}")]
    Open(PathBuf, std::io::Error),
    #[error("Failure channel is full")]
    ChannelFull,
    #[error("Failure channel is closed")]
    ChannelClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failure publisher is not activated")]
    Inactive,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Outbound destination of failure notifications.
pub trait FailureSink: Send + Sync {
    fn publish(&self, notification: &FailureNotification) -> Result<(), SinkError>;
}

/// Allocates a sink when the watchdog is configured.
pub trait SinkFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn FailureSink>, SinkError>;
}

impl<F> SinkFactory for F
where
    F: Fn() -> Result<Box<dyn FailureSink>, SinkError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FailureSink>, SinkError> {
        self()
    }
}

/// Writes each notification as a single JSON line.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn append_to(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::Open(path.to_path_buf(), e))?;
        Ok(Self::new(file))
    }
}

impl FailureSink for JsonLinesSink {
    fn publish(&self, notification: &FailureNotification) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(notification)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Hands notifications to an in-process consumer without ever blocking.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<FailureNotification>,
}

impl ChannelSink {
    pub fn new(tx: Sender<FailureNotification>) -> Self {
        Self { tx }
    }
}

impl FailureSink for ChannelSink {
    fn publish(&self, notification: &FailureNotification) -> Result<(), SinkError> {
        self.tx
            .try_send(notification.clone())
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::ChannelFull,
                TrySendError::Closed(_) => SinkError::ChannelClosed,
            })
    }
}

/// Where the daemon writes failure notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutput {
    Stdout,
    File(PathBuf),
}

impl SinkFactory for FailureOutput {
    fn open(&self) -> Result<Box<dyn FailureSink>, SinkError> {
        match self {
            FailureOutput::Stdout => Ok(Box::new(JsonLinesSink::stdout())),
            FailureOutput::File(path) => Ok(Box::new(JsonLinesSink::append_to(path)?)),
        }
    }
}

/// Publishes failure notifications to a sink.
///
/// Like a lifecycle publisher the notifier is created inactive and only
/// forwards notifications to its sink between `on_activate` and
/// `on_deactivate`.
pub struct FailureNotifier {
    sink: Box<dyn FailureSink>,
    activated: AtomicBool,
}

impl FailureNotifier {
    pub fn new(sink: Box<dyn FailureSink>) -> Self {
        Self {
            sink,
            activated: AtomicBool::new(false),
        }
    }

    pub fn on_activate(&self) {
        self.activated.store(true, Ordering::SeqCst);
    }

    pub fn on_deactivate(&self) {
        self.activated.store(false, Ordering::SeqCst);
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    pub fn notify(
        &self,
        loss: &DiagnosedLoss,
        now: Stamp,
    ) -> Result<FailureNotification, NotifyError> {
        if !self.is_activated() {
            return Err(NotifyError::Inactive);
        }

        let notification = FailureNotification {
            event_id: Uuid::now_v7(),
            reported_at: now,
            entity_id: loss.entity_id,
            last_seen: loss.last_seen,
        };
        info!(
            "Publishing failure message. Faulty node was with ID {} at [{}]",
            notification.entity_id, notification.reported_at
        );
        self.sink.publish(&notification)?;
        Ok(notification)
    }
}
