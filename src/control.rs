use std::{net::SocketAddr, process::ExitCode, time::Duration};

use tokio::net::UdpSocket;

use crate::daemon::{InboundMessage, TransitionReply};
use crate::watchdog::Transition;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No reply from the watchdog at {0}")]
    Timeout(SocketAddr),
}

/// Sends a transition request to a running watchdog and waits for its answer.
pub async fn request_transition(
    transition: Transition,
    addr: SocketAddr,
) -> Result<TransitionReply, ControlError> {
    let bind_addr: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    let request = serde_json::to_vec(&InboundMessage::Transition { transition })?;
    socket.send_to(&request, addr).await?;

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(REPLY_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .map_err(|_| ControlError::Timeout(addr))??;
    Ok(serde_json::from_slice(&buf[..len])?)
}

pub async fn send_transition(transition: Transition, addr: SocketAddr) -> ExitCode {
    match request_transition(transition, addr).await {
        Ok(TransitionReply { state, error: None }) => {
            println!("Transition {transition} succeeded, watchdog is {state}");
            ExitCode::SUCCESS
        }
        Ok(TransitionReply {
            state,
            error: Some(error),
        }) => {
            eprintln!("Transition {transition} failed: {error} (watchdog is {state})");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Unable to request transition {transition}: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_roundtrip_with_fake_watchdog() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let fake = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let request: InboundMessage = serde_json::from_slice(&buf[..len]).unwrap();
            assert_eq!(
                request,
                InboundMessage::Transition {
                    transition: Transition::Deactivate
                }
            );
            let reply = TransitionReply {
                state: "inactive".to_string(),
                error: None,
            };
            server
                .send_to(&serde_json::to_vec(&reply).unwrap(), peer)
                .await
                .unwrap();
        });

        let reply = request_transition(Transition::Deactivate, addr)
            .await
            .unwrap();
        assert_eq!(reply.state, "inactive");
        assert!(reply.error.is_none());
        fake.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_watchdog_times_out() {
        // Bound but never answers
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let res = request_transition(Transition::Activate, addr).await;
        assert!(matches!(res, Err(ControlError::Timeout(_))), "{:?}", res);
        drop(server);
    }
}
