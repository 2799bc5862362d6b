//! Real-time synchronization core of the Portside history panel.
//!
//! One [`ChannelClient`] per panel lifetime carries server push; the
//! [`HeartbeatIndicator`] and [`HistorySync`] controller subscribe to it,
//! write through a [`PanelSurface`], and keep the [`AddressBar`] query
//! parameter consistent with the last issued search.

pub mod actions;
pub mod channel;
pub mod heartbeat;
pub mod history;
pub mod query;
pub mod surface;

pub use actions::{ActionDescriptor, DomClick, HistoryAction, extract_action};
pub use channel::{ChannelClient, ChannelError, ConnectionState, ListenerHandle, ReconnectPolicy};
pub use heartbeat::{DecayStage, FadeColor, HeartbeatIndicator};
pub use history::{HistorySync, QUERY_PARAM};
pub use query::AddressBar;
pub use surface::{PageModel, PanelSurface};
