//! History panel synchronization. Searches the server for matching
//! commands, renders the returned fragment into the panel, performs
//! connect/disconnect operations, and mirrors the search text into the
//! address bar. Channel `connections-changed` and `refresh` frames re-run
//! the current search so every open panel converges.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use portside_protocol::kind;

use crate::actions::HistoryAction;
use crate::channel::{ChannelClient, ListenerHandle};
use crate::query::AddressBar;
use crate::surface::PanelSurface;

/// Query parameter the search text is mirrored into.
pub const QUERY_PARAM: &str = "query";

const LIST_PATH: &str = "/history-commands-list";
const CONNECT_PATH: &str = "/connect-history-item";
const DISCONNECT_PATH: &str = "/disconnect-history-item";

/// Orders list renders against issued searches so a slow response can
/// never overwrite the result of a later one.
#[derive(Default)]
struct SequenceGate {
    issued: AtomicU64,
    rendered: AtomicU64,
}

impl SequenceGate {
    /// Take the next sequence number for an outgoing search.
    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether a response with this sequence number may render. Admission
    /// is permanent: once a number is admitted, everything below it is
    /// stale forever. A newer request that is merely in flight does not
    /// block an older response; only a newer rendered one does.
    fn admit(&self, seq: u64) -> bool {
        self.rendered.fetch_max(seq, Ordering::SeqCst) <= seq
    }
}

/// Keeps one panel's history list in sync with the server.
pub struct HistorySync<S> {
    http: reqwest::Client,
    base: Url,
    surface: Arc<S>,
    bar: Arc<AddressBar>,
    gate: SequenceGate,
}

impl<S: PanelSurface> HistorySync<S> {
    pub fn new(base: Url, surface: Arc<S>, bar: Arc<AddressBar>) -> Arc<Self> {
        Arc::new(Self {
            http: reqwest::Client::new(),
            base,
            surface,
            bar,
            gate: SequenceGate::default(),
        })
    }

    /// Seed the panel from the address bar: a `query` parameter present at
    /// load becomes the search text and runs a first search.
    pub async fn hydrate(&self) {
        if let Some(query) = self.bar.query_param(QUERY_PARAM) {
            self.surface.set_search_value(&query);
        }
        self.search().await;
    }

    /// Search with the panel's current search text, mirror the text into
    /// the address bar, and render the result. Failures are logged and
    /// leave the list as it was.
    pub async fn search(&self) {
        let query = self.surface.search_value();
        if let Err(err) = self.try_search(&query).await {
            warn!(error = %err, "history search failed");
        }
    }

    async fn try_search(&self, query: &str) -> Result<()> {
        let seq = self.gate.issue();
        let url = self.base.join(LIST_PATH).context("list url")?;
        let fragment = self
            .http
            .get(url)
            .query(&[(QUERY_PARAM, query)])
            .send()
            .await
            .context("list request")?
            .error_for_status()
            .context("list response")?
            .text()
            .await
            .context("list body")?;

        if !self.gate.admit(seq) {
            debug!(seq, "discarding stale search response");
            return Ok(());
        }
        if self.surface.history_list_present() {
            self.surface.replace_history_list(&fragment);
        }
        // The bar follows the rendered result: a failed or stale search
        // leaves the URL as it was.
        if self.bar.query_param(QUERY_PARAM).unwrap_or_default() != query {
            self.bar.set_query_param(QUERY_PARAM, query);
        }
        Ok(())
    }

    /// Carry out a resolved history action against the server.
    pub async fn perform(&self, action: HistoryAction) {
        let result = match action {
            HistoryAction::Connect { raw } => self.try_post(CONNECT_PATH, &raw).await,
            HistoryAction::Disconnect { raw } => self.try_post(DISCONNECT_PATH, &raw).await,
        };
        if let Err(err) = result {
            warn!(error = %err, "history action failed");
        }
    }

    async fn try_post(&self, path: &str, raw: &str) -> Result<()> {
        let query = self.bar.query_param(QUERY_PARAM);
        let seq = self.gate.issue();
        let url = self.base.join(path).context("action url")?;
        let fragment = self
            .http
            .post(url)
            .json(&json!({ "raw": raw, "query": query }))
            .send()
            .await
            .context("action request")?
            .error_for_status()
            .context("action response")?
            .text()
            .await
            .context("action body")?;

        if !self.gate.admit(seq) {
            debug!(seq, "discarding stale action response");
            return Ok(());
        }
        if self.surface.history_list_present() {
            self.surface.replace_history_list(&fragment);
        }
        Ok(())
    }

    /// Re-run the search with the query currently held in the address bar.
    /// Driven by channel `connections-changed` and `refresh` frames, which
    /// carry no query of their own.
    pub async fn refresh(&self) {
        let query = self.bar.query_param(QUERY_PARAM).unwrap_or_default();
        if let Err(err) = self.try_search(&query).await {
            warn!(error = %err, "history refresh failed");
        }
    }

    /// Subscribe to the channel so server-initiated refreshes re-run the
    /// search on this panel.
    pub async fn attach(self: &Arc<Self>, channel: &ChannelClient) -> ListenerHandle {
        let sync = Arc::clone(self);
        channel
            .add_message_listener(move |envelope| {
                let sync = Arc::clone(&sync);
                Box::pin(async move {
                    if envelope.kind == kind::CONNECTIONS_CHANGED || envelope.kind == kind::REFRESH
                    {
                        sync.refresh().await;
                    }
                })
            })
            .await
    }

    /// A printable key was pressed anywhere on the page. Unless the search
    /// field has native focus, the character is appended to the search
    /// text; either way the search re-runs.
    pub async fn handle_keypress(&self, ch: char) {
        if !self.surface.search_present() {
            return;
        }
        if !self.surface.search_focused() {
            let mut value = self.surface.search_value();
            value.push(ch);
            self.surface.set_search_value(&value);
        }
        self.search().await;
    }

    /// Backspace or delete: drop the last character of the search text and
    /// re-run the search.
    pub async fn handle_backspace(&self) {
        if !self.surface.search_present() {
            return;
        }
        if !self.surface.search_focused() {
            let mut value = self.surface.search_value();
            value.pop();
            self.surface.set_search_value(&value);
        }
        self.search().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_while_a_newer_search_is_still_in_flight() {
        let gate = SequenceGate::default();
        let first = gate.issue();
        let _second = gate.issue();
        // The newer search has not rendered (it may yet fail); the older
        // response is still the best available view.
        assert!(gate.admit(first));
    }

    #[test]
    fn gate_rejects_below_a_rendered_response() {
        let gate = SequenceGate::default();
        let first = gate.issue();
        let second = gate.issue();
        let third = gate.issue();
        assert!(gate.admit(second));
        assert!(!gate.admit(first));
        assert!(gate.admit(third));
    }

    #[test]
    fn gate_admits_the_only_outstanding_search() {
        let gate = SequenceGate::default();
        let seq = gate.issue();
        assert!(gate.admit(seq));
    }
}
