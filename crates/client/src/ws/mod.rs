//! WebSocket transport for the chat hub.
//!
//! This module provides:
//! - A single-socket connection with RPC semantics ([`WsConnection`]):
//!   correlated `invoke` calls, named push-event handlers, graceful close.
//! - The reconnect/token-refresh coordination expressed as data
//!   ([`SessionPhase`], [`RetryState`], [`ReconnectConfig`]) so the retry
//!   interactions are enumerable and testable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  HubChat                     │
//! │  (owns exactly one WsConnection at a time)   │
//! └──────────────────────────────────────────────┘
//!          │  invoke / on / close    ▲ closed(reason)
//!          ▼                         │
//! ┌──────────────────────────────────────────────┐
//! │                WsConnection                  │
//! │   writer task ──► socket ──► reader task     │
//! │   pending invokes (by id)   push handlers    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The connection itself never reconnects: the manager observes closure
//! through [`WsConnection::closed`] and drives the session state machine.

mod connection;
mod reconnect;

pub use connection::{CloseReason, WsConnection, DEFAULT_INVOKE_TIMEOUT};
pub use reconnect::{
    ConnectionState, ReconnectConfig, RetryState, SessionEvent, SessionPhase,
    MAX_TOKEN_REFRESHES,
};
