//! HTML fragments for the panel. The client replaces the list container's
//! content with [`history_list`] output verbatim, so the element ids and
//! `data-action` attributes here are a contract, not styling.

use maud::{DOCTYPE, Markup, html};

use portside_protocol::action;

use crate::store::HistoryItem;

/// One row of the history list.
pub struct ListEntry {
    pub item: HistoryItem,
    pub active: bool,
}

/// The history list fragment: every matching command with its connect or
/// disconnect control.
pub fn history_list(entries: &[ListEntry]) -> Markup {
    html! {
        @if entries.is_empty() {
            p class="history-empty" { "No matching commands" }
        }
        ul class="history-items" {
            @for entry in entries {
                li class=(if entry.active { "history-item active" } else { "history-item" }) {
                    code { (entry.item.raw) }
                    @if let Some(kind) = entry.item.proxy_type() {
                        span class="history-item-kind" { (kind) }
                    }
                    @if let Some(port) = entry.item.local_port() {
                        span class="history-item-port" { "localhost:" (port) }
                    }
                    @if entry.active {
                        button data-action=(action::DISCONNECT)
                               data-action-payload=(entry.item.raw) {
                            "Disconnect"
                        }
                    } @else {
                        button data-action=(action::CONNECT)
                               data-action-payload=(entry.item.raw) {
                            "Connect"
                        }
                    }
                }
            }
        }
    }
}

/// The search field fragment, pre-filled with the active query.
pub fn history_search(query: &str) -> Markup {
    html! {
        input id="history-search" type="text" placeholder="Search history" value=(query);
    }
}

/// The full panel page.
pub fn index_page(query: &str, list: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "Portside" }
            }
            body {
                header {
                    h1 { "⚓ Portside" }
                    span id="heart" { "❤️" }
                }
                (history_search(query))
                div id="history-commands-list" {
                    (list)
                }
            }
        }
    }
}
