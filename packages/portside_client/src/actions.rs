//! Click-to-action resolution. Panel fragments tag interactive elements
//! with a `data-action` id plus optional payload and parameter attributes;
//! a click resolves those once into a typed action before anything runs.

use tracing::debug;

use portside_protocol::action;

/// A click on a panel element, carrying the action-related attributes the
/// element was rendered with. Absent attributes are `None`.
#[derive(Debug, Clone, Default)]
pub struct DomClick {
    /// `data-action` attribute.
    pub action: Option<String>,
    /// `data-action-payload` attribute.
    pub payload: Option<String>,
    /// `data-action-params` attribute, comma-separated.
    pub params: Option<String>,
    /// The element's own value, used as payload fallback.
    pub value: Option<String>,
}

/// An action id resolved from a click, with its payload and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub id: String,
    pub payload: Option<String>,
    pub params: Vec<String>,
}

/// The history operations a panel click can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryAction {
    Connect { raw: String },
    Disconnect { raw: String },
}

/// Resolve a click into a descriptor. Clicks on elements without a
/// `data-action` id are ignored.
pub fn extract_action(click: &DomClick) -> Option<ActionDescriptor> {
    let id = click.action.as_deref()?.to_string();
    let payload = click
        .payload
        .clone()
        .or_else(|| click.value.clone())
        .filter(|p| !p.is_empty());
    let params = click
        .params
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(ActionDescriptor {
        id,
        payload,
        params,
    })
}

impl ActionDescriptor {
    /// Interpret this descriptor as a history operation, if its id matches
    /// one. Descriptors with a matching id but no payload carry nothing to
    /// act on and resolve to `None`.
    pub fn history_action(&self) -> Option<HistoryAction> {
        let matches_disconnect = self.id.ends_with(action::DISCONNECT);
        let matches_connect = !matches_disconnect && self.id.ends_with(action::CONNECT);
        if !matches_disconnect && !matches_connect {
            return None;
        }
        let raw = match self.payload.clone() {
            Some(raw) => raw,
            None => {
                debug!(id = %self.id, "history action click without payload");
                return None;
            }
        };
        if matches_disconnect {
            Some(HistoryAction::Disconnect { raw })
        } else {
            Some(HistoryAction::Connect { raw })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(action: &str, payload: Option<&str>) -> DomClick {
        DomClick {
            action: Some(action.to_string()),
            payload: payload.map(str::to_string),
            params: None,
            value: None,
        }
    }

    #[test]
    fn click_without_action_id_is_ignored() {
        let resolved = extract_action(&DomClick {
            value: Some("ls -la".to_string()),
            ..DomClick::default()
        });
        assert!(resolved.is_none());
    }

    #[test]
    fn payload_falls_back_to_element_value() {
        let resolved = extract_action(&DomClick {
            action: Some(action::CONNECT.to_string()),
            value: Some("ls -la".to_string()),
            ..DomClick::default()
        })
        .unwrap();
        assert_eq!(resolved.payload.as_deref(), Some("ls -la"));
    }

    #[test]
    fn params_are_comma_split_and_trimmed() {
        let resolved = extract_action(&DomClick {
            action: Some("refresh".to_string()),
            params: Some(" a, b ,,c".to_string()),
            ..DomClick::default()
        })
        .unwrap();
        assert_eq!(resolved.params, vec!["a", "b", "c"]);
    }

    #[test]
    fn connect_and_disconnect_resolve_to_typed_actions() {
        let connect = extract_action(&click(action::CONNECT, Some("ls -la")))
            .unwrap()
            .history_action();
        assert_eq!(
            connect,
            Some(HistoryAction::Connect {
                raw: "ls -la".to_string()
            })
        );

        let disconnect = extract_action(&click(action::DISCONNECT, Some("ls -la")))
            .unwrap()
            .history_action();
        assert_eq!(
            disconnect,
            Some(HistoryAction::Disconnect {
                raw: "ls -la".to_string()
            })
        );
    }

    #[test]
    fn payload_less_history_click_resolves_to_nothing() {
        let resolved = extract_action(&click(action::CONNECT, None))
            .unwrap()
            .history_action();
        assert!(resolved.is_none());
    }

    #[test]
    fn unrelated_action_ids_are_not_history_actions() {
        let resolved = extract_action(&click("open-settings", Some("x")))
            .unwrap()
            .history_action();
        assert!(resolved.is_none());
    }
}
