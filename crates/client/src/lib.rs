//! Client core for the hubline real-time chat layer.
//!
//! This crate owns everything between the UI and the chat backend's
//! WebSocket hub: credential storage, reactive token refresh, the framed
//! socket transport with auto-reconnect, and the hub chat manager that
//! multiplexes server pushes into typed state and callbacks. Screens are
//! expected to subscribe to [`HubChat`] state and call its operations;
//! rendering stays out of this crate.

pub mod auth;
pub mod hub;
pub mod storage;
pub mod ws;

pub use auth::{CredentialStore, TokenRefresher};
pub use hub::{HubCallbacks, HubChannel, HubChat, HubOptions, HubState};
pub use hubline_shared::{HubError, PushEvent};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use ws::{ConnectionState, ReconnectConfig, WsConnection};
