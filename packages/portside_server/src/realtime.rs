//! Live channel hub. Every connected panel gets a broadcast subscription;
//! the server pushes heartbeat ticks and change notifications through it
//! and answers client search notifications with a refresh broadcast.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use portside_protocol::{Envelope, kind};

const HUB_CAPACITY: usize = 64;

/// Fan-out point for channel frames. Cheap to clone; all clones share one
/// broadcast queue.
#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<String>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Send an envelope to every connected panel. Having no connections is
    /// not an error.
    pub fn broadcast(&self, envelope: &Envelope) {
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "failed to serialize broadcast frame");
                return;
            }
        };
        let receivers = self.tx.send(frame).unwrap_or(0);
        debug!(kind = %envelope.kind, receivers, "broadcast frame");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Connected panel count.
    pub fn connections(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Reply the hub broadcasts in response to an inbound envelope, if any. A
/// search notification from one panel becomes a refresh for all of them.
pub fn reply_for(envelope: &Envelope) -> Option<Envelope> {
    if envelope.kind == kind::HISTORY_SEARCH {
        Some(Envelope::new(kind::REFRESH, json!(null)))
    } else {
        None
    }
}

/// Drive one panel's socket: forward hub broadcasts out, feed inbound
/// envelopes to [`reply_for`]. Frames that are not envelopes (such as the
/// client greeting) are dropped.
pub async fn handle_socket(socket: WebSocket, hub: RealtimeHub) {
    let mut rx = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!(connections = hub.connections(), "channel connection opened");

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "channel connection lagged behind the hub");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => match Envelope::from_json(&text) {
                    Ok(envelope) => {
                        if let Some(reply) = reply_for(&envelope) {
                            hub.broadcast(&reply);
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "dropping non-envelope frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "channel connection errored");
                    break;
                }
            },
        }
    }
    debug!("channel connection closed");
}

/// Start the heartbeat: a time envelope to every panel on a fixed period.
/// The payload carries the server's unix timestamp as a string.
pub fn spawn_ticker(hub: RealtimeHub, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let envelope = Envelope::new(kind::TIME, json!(Utc::now().timestamp().to_string()));
            hub.broadcast(&envelope);
        }
    })
}
