//! Error taxonomy for the hub chat client.

use thiserror::Error;

/// Errors surfaced by the hub transport and manager.
///
/// Transport-level failures (`Connection`, `Authentication`) are funneled
/// through the manager's error callback and recorded in hub state; invoke
/// failures reject only the specific call that made them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The socket failed to open or closed unexpectedly. Recoverable via
    /// reconnect.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the handshake with a 401-equivalent marker.
    /// Recoverable once via token refresh, terminal after the retry cap.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The server answered a specific invoke with an error payload.
    #[error("invoke '{method}' failed: {message}")]
    Invoke { method: String, message: String },

    /// An operation was attempted with no live transport. A call-site
    /// timing error, never retried automatically.
    #[error("hub connection not established")]
    NotConnected,

    /// An invoke waited longer than the configured timeout for its
    /// correlated response.
    #[error("invoke '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// A frame could not be serialized or deserialized.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl HubError {
    /// True when the error is a 401-equivalent authorization rejection.
    pub fn is_auth(&self) -> bool {
        matches!(self, HubError::Authentication(_))
    }
}

/// Detect a 401-equivalent marker embedded in a handshake rejection message.
///
/// The backend embeds the HTTP status of a failed negotiation in the error
/// text (e.g. `Status code '401'`), so the check is textual.
pub fn is_auth_rejection(message: &str) -> bool {
    message.contains("401")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_detects_embedded_status() {
        assert!(is_auth_rejection(
            "Failed to complete negotiation with the server: Status code '401'"
        ));
        assert!(is_auth_rejection("HTTP error: 401 Unauthorized"));
        assert!(!is_auth_rejection("connection reset by peer"));
    }

    #[test]
    fn invoke_error_display_names_the_method() {
        let err = HubError::Invoke {
            method: "SendMessage".into(),
            message: "chat not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "invoke 'SendMessage' failed: chat not found"
        );
    }
}
