//! Read/write loop of one broker connection.
//!
//! Every text frame that parses as an envelope header is forwarded unchanged
//! to every other peer; anything else is dropped with a warning. Frames
//! queued for this peer by other connections are written in queue order.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::{Peer, PeerRegistry};
use crate::cancel::CancelSignal;
use crate::protocol::{FrameHeader, PeerRole};

/// Registers a peer for `socket` and relays until either side closes.
pub async fn run_connection(
    socket: WebSocket,
    role: PeerRole,
    registry: Arc<PeerRegistry>,
    shutdown: CancelSignal,
) {
    let (peer, mut outbound) = Peer::new(role);
    let peer_id = peer.id;
    registry.register(peer).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Incoming frame from this peer
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        relay(&registry, peer_id, text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%peer_id, error = %e, "peer socket error");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(%peer_id, "binary frame dropped");
                    }
                    _ => {}
                }
            }
            // Frame forwarded from another peer
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            () = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    registry.remove(peer_id).await;
    tracing::debug!(%peer_id, %role, "peer connection closed");
}

async fn relay(registry: &PeerRegistry, from: super::PeerId, text: Utf8Bytes) {
    match serde_json::from_str::<FrameHeader>(text.as_str()) {
        Ok(header) => {
            let delivered = registry.fan_out(from, &text).await;
            tracing::debug!(peer_id = %from, method = %header.method, delivered, "frame relayed");
        }
        Err(e) => {
            tracing::warn!(peer_id = %from, error = %e, "malformed frame dropped");
        }
    }
}
