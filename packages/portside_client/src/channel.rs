//! Live channel client.
//!
//! Owns the single long-lived WebSocket connection of a panel. Every
//! inbound frame is parsed as an [`Envelope`] and handed to all registered
//! listeners, awaited sequentially in registration order; a frame's
//! dispatch completes before the next frame is read. A malformed frame
//! aborts dispatch for that frame only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use portside_protocol::{Envelope, ProtocolError};

/// Fixed payload sent after every successful open. An implementation
/// detail of the handshake, not part of the envelope protocol.
const GREETING: &str = "Hello Server!";

const OUTBOUND_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type ListenerFuture = BoxFuture<'static, ()>;
type Listener = Arc<dyn Fn(Envelope) -> ListenerFuture + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to open live channel: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("live channel is closed")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Observable connection lifecycle of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Reconnect behavior after the channel drops: exponential backoff between
/// attempts, capped at `max_delay`. `max_attempts` counts consecutive
/// failed attempts; `None` retries forever.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects: once closed, the channel stays
    /// inert for the rest of the page's life.
    pub fn none() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    async fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().await.push((id, listener));
        id
    }

    async fn remove(&self, id: u64) {
        self.listeners.lock().await.retain(|(lid, _)| *lid != id);
    }

    /// Invoke every listener with the envelope, in registration order.
    /// A listener registered twice runs twice. The list is snapshotted
    /// before any listener runs, so a listener may register or remove
    /// listeners on this same set; changes take effect from the next
    /// frame.
    pub(crate) async fn dispatch(&self, envelope: &Envelope) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .await
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(envelope.clone()).await;
        }
    }
}

/// Removal handle for a registered listener. Registration is the only way
/// in; call [`remove`](Self::remove) to take the listener out again.
/// Dropping the handle leaves the listener registered for the channel's
/// lifetime.
pub struct ListenerHandle {
    id: u64,
    set: Arc<ListenerSet>,
}

impl ListenerHandle {
    pub async fn remove(self) {
        self.set.remove(self.id).await;
    }
}

/// The live channel client. One instance per page load; components receive
/// it by reference and register themselves as listeners.
pub struct ChannelClient {
    outbound: mpsc::Sender<Message>,
    listeners: Arc<ListenerSet>,
    state_rx: watch::Receiver<ConnectionState>,
    task: tokio::task::JoinHandle<()>,
}

impl ChannelClient {
    /// Open the channel. The first connection is established eagerly so a
    /// bad URL fails here; later drops are handled by `policy`.
    pub async fn connect(
        url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> Result<Self, ChannelError> {
        let url = url.into();
        let (stream, _) = connect_async(url.as_str()).await?;
        debug!(%url, "live channel connected");

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let listeners = Arc::new(ListenerSet::default());

        let task = tokio::spawn(run_channel(
            Some(stream),
            url,
            policy,
            outbound_rx,
            listeners.clone(),
            state_tx,
        ));

        Ok(Self {
            outbound,
            listeners,
            state_rx,
            task,
        })
    }

    /// Send a raw payload unmodified.
    pub async fn write(&self, raw: impl Into<String>) -> Result<(), ChannelError> {
        self.outbound
            .send(Message::Text(raw.into().into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Wrap `{version: 1, type, data}` and send the serialized form.
    pub async fn write_message(
        &self,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<(), ChannelError> {
        let envelope = Envelope::new(kind, data);
        self.write(envelope.to_json()?).await
    }

    /// Register a listener for inbound envelopes. Listeners run in
    /// registration order; the same closure registered twice runs twice.
    pub async fn add_message_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(Envelope) -> ListenerFuture + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener)).await;
        ListenerHandle {
            id,
            set: self.listeners.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_channel(
    mut initial: Option<WsStream>,
    url: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::Receiver<Message>,
    listeners: Arc<ListenerSet>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut attempt = 0u32;
    loop {
        let stream = match initial.take() {
            Some(stream) => stream,
            None => {
                if !policy.allows(attempt) {
                    info!("live channel closed; reconnect policy exhausted");
                    state_tx.send_replace(ConnectionState::Disconnected);
                    return;
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, "reconnecting live channel");
                tokio::time::sleep(delay).await;
                state_tx.send_replace(ConnectionState::Connecting);
                match connect_async(url.as_str()).await {
                    Ok((stream, _)) => {
                        info!(%url, "live channel reconnected");
                        attempt = 0;
                        stream
                    }
                    Err(e) => {
                        warn!(attempt, "live channel reconnect failed: {e}");
                        state_tx.send_replace(ConnectionState::Disconnected);
                        attempt += 1;
                        continue;
                    }
                }
            }
        };

        state_tx.send_replace(ConnectionState::Connected);
        let (mut sink, mut source) = stream.split();

        if let Err(e) = sink.send(Message::Text(GREETING.into())).await {
            warn!("failed to send channel greeting: {e}");
        }

        loop {
            tokio::select! {
                outbound = outbound_rx.recv() => match outbound {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            warn!("live channel write failed: {e}");
                            break;
                        }
                    }
                    // Client handle dropped; no reconnect will revive it.
                    None => {
                        let _ = sink.close().await;
                        state_tx.send_replace(ConnectionState::Disconnected);
                        return;
                    }
                },
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => match Envelope::from_json(text.as_str()) {
                        Ok(envelope) => listeners.dispatch(&envelope).await,
                        // A malformed frame aborts dispatch of that frame
                        // for every listener; the channel itself survives.
                        Err(e) => warn!("dropping malformed channel frame: {e}"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("live channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("live channel read error: {e}");
                        break;
                    }
                },
            }
        }

        state_tx.send_replace(ConnectionState::Disconnected);
    }
}
