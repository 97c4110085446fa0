use std::{net::SocketAddr, sync::Arc};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    net::UdpSocket,
    sync::mpsc::{self, Receiver, Sender, error::TrySendError},
};

use crate::watchdog::{
    HeartbeatRecord, LivelinessEvent, Stamp, Transition, Watchdog, WatchdogState,
};

const MAX_DATAGRAM_SIZE: usize = 64 * 1024;
const LIVELINESS_QUEUE_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Datagrams understood by the daemon, one JSON object each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Heartbeat {
        entity_id: i32,
        timestamp: Stamp,
        /// Heartbeats on other topics are ignored.
        #[serde(default)]
        topic: Option<String>,
    },
    Liveliness(LivelinessEvent),
    Transition {
        transition: Transition,
    },
}

/// Answer to a transition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionReply {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Daemon {
    watchdog: Arc<Watchdog>,
    socket: UdpSocket,
}

impl Daemon {
    pub async fn bind(watchdog: Arc<Watchdog>, addr: SocketAddr) -> Result<Self, DaemonError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening for heartbeats on {}", socket.local_addr()?);
        Ok(Self { watchdog, socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams until the watchdog is finalized or a shutdown is
    /// requested.
    ///
    /// Liveliness events are handed to a separate routing task so that
    /// diagnosis never holds up heartbeat ingestion.
    pub async fn run(self, mut shutdown_rx: Receiver<()>) -> Result<(), DaemonError> {
        let (liveliness_tx, liveliness_rx) = mpsc::channel(LIVELINESS_QUEUE_SIZE);
        let router = tokio::spawn(route_liveliness(
            Arc::clone(&self.watchdog),
            liveliness_rx,
        ));

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let res = loop {
            if self.watchdog.state() == WatchdogState::Finalized {
                break Ok(());
            }
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => break Err(DaemonError::Io(e)),
                    };
                    match serde_json::from_slice::<InboundMessage>(&buf[..len]) {
                        Ok(message) => self.dispatch(message, peer, &liveliness_tx).await,
                        Err(e) => warn!("Ignoring malformed datagram from {peer}: {e}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    if let Err(e) = self.watchdog.shutdown() {
                        warn!("{e}");
                    }
                    break Ok(());
                }
            }
        };

        drop(liveliness_tx);
        if let Err(e) = router.await {
            error!("Liveliness router failed: {e}");
        }
        info!("Watchdog stopped");
        res
    }

    async fn dispatch(
        &self,
        message: InboundMessage,
        peer: SocketAddr,
        liveliness_tx: &Sender<(LivelinessEvent, Stamp)>,
    ) {
        match message {
            InboundMessage::Heartbeat {
                entity_id,
                timestamp,
                topic,
            } => {
                let expected = &self.watchdog.config().topic_name;
                match topic {
                    Some(topic) if &topic != expected => {
                        debug!("Ignoring heartbeat from {entity_id} on topic {topic:?}");
                    }
                    _ => {
                        self.watchdog
                            .record_heartbeat(HeartbeatRecord::new(entity_id, timestamp));
                    }
                }
            }
            InboundMessage::Liveliness(event) => {
                // Detection time is the time the event reached us
                match liveliness_tx.try_send((event, Stamp::now())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        error!("Liveliness queue is full, dropping event {event:?}")
                    }
                    Err(TrySendError::Closed(_)) => {
                        error!("Liveliness router is gone, dropping event {event:?}")
                    }
                }
            }
            InboundMessage::Transition { transition } => {
                let reply = self.transition(transition);
                match serde_json::to_vec(&reply) {
                    Ok(reply) => {
                        if let Err(e) = self.socket.send_to(&reply, peer).await {
                            warn!("Unable to answer transition request from {peer}: {e}");
                        }
                    }
                    Err(e) => error!("Unable to encode transition reply: {e}"),
                }
            }
        }
    }

    fn transition(&self, transition: Transition) -> TransitionReply {
        info!("Received {transition} request");
        let error = self.watchdog.trigger(transition).err().map(|e| e.to_string());
        let state = self.watchdog.state();
        if error.is_none() {
            let status = format!("state={state}");
            let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Status(&status)]);
        }
        TransitionReply {
            state: state.to_string(),
            error,
        }
    }
}

async fn route_liveliness(watchdog: Arc<Watchdog>, mut rx: Receiver<(LivelinessEvent, Stamp)>) {
    while let Some((event, now)) = rx.recv().await {
        watchdog.on_liveliness_changed(event, now);
    }
}
