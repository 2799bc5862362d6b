//! Portside control panel server: serves the panel page and its fragments,
//! records and filters command history, launches connected items, and runs
//! the live channel hub.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod handlers;
pub mod realtime;
pub mod state;
pub mod store;
pub mod views;

use crate::realtime::RealtimeHub;
use crate::state::{ItemLauncher, PanelState};
use crate::store::HistoryStore;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<HistoryStore>,
    pub panel: Arc<PanelState>,
    pub hub: RealtimeHub,
}

impl AppState {
    pub fn new(store: HistoryStore, launcher: Box<dyn ItemLauncher>) -> Self {
        let hub = RealtimeHub::new();
        let panel = Arc::new(PanelState::new(launcher, hub.clone()));
        Self {
            store: Arc::new(store),
            panel,
            hub,
        }
    }
}

/// The full panel router: page, fragments, item actions, live channel.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/history-commands-list", get(handlers::history_commands_list))
        .route("/connect-history-item", post(handlers::connect_history_item))
        .route(
            "/disconnect-history-item",
            post(handlers::disconnect_history_item),
        )
        .route("/rt", get(handlers::realtime_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
