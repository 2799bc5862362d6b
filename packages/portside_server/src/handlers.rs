use axum::{
    Json,
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use maud::Markup;
use serde::Deserialize;

use crate::store::HistoryItem;
use crate::views::{self, ListEntry};
use crate::{AppState, realtime};

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub query: String,
}

/// Request body for connect/disconnect. `query` is the caller's active
/// search so the returned fragment matches what it was looking at.
#[derive(Deserialize)]
pub struct ItemAction {
    pub raw: String,
    #[serde(default)]
    pub query: Option<String>,
}

pub async fn index(State(state): State<AppState>, Query(params): Query<ListParams>) -> Markup {
    views::index_page(&params.query, list_fragment(&state, &params.query))
}

pub async fn history_commands_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Markup {
    list_fragment(&state, &params.query)
}

pub async fn connect_history_item(
    State(state): State<AppState>,
    Json(body): Json<ItemAction>,
) -> Markup {
    state.panel.connect(&body.raw);
    list_fragment(&state, body.query.as_deref().unwrap_or_default())
}

pub async fn disconnect_history_item(
    State(state): State<AppState>,
    Json(body): Json<ItemAction>,
) -> Markup {
    state.panel.disconnect(&body.raw);
    list_fragment(&state, body.query.as_deref().unwrap_or_default())
}

pub async fn realtime_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| realtime::handle_socket(socket, hub))
}

fn list_fragment(state: &AppState, query: &str) -> Markup {
    let entries: Vec<ListEntry> = state
        .store
        .filter(query)
        .into_iter()
        .map(|raw| {
            let active = state.panel.is_active(&raw);
            ListEntry {
                item: HistoryItem::parse(&raw),
                active,
            }
        })
        .collect();
    views::history_list(&entries)
}
