//! Single-socket hub connection with RPC semantics.
//!
//! One `WsConnection` wraps exactly one WebSocket. Invokes are correlated
//! by a locally unique id and each suspends its caller until the matching
//! response frame arrives; pushes are dispatched to at most one handler per
//! event name. The connection never reconnects by itself; closure is
//! reported through [`WsConnection::closed`] and the owner decides.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};

use hubline_shared::{
    is_auth_rejection, HubError, InvokeFrame, PushEvent, PushFrame, ServerFrame,
};

/// Default per-invoke timeout. The backend occasionally drops a request
/// without closing the socket; this keeps callers from suspending forever.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Why the socket closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed via an explicit [`WsConnection::close`]. No reconnect.
    Clean,
    /// The socket dropped without an explicit close.
    Unexpected(String),
}

type PushHandler = Box<dyn Fn(PushFrame) + Send + Sync>;

struct PendingInvoke {
    method: String,
    tx: oneshot::Sender<Result<Value, HubError>>,
}

struct ConnShared {
    pending: Mutex<HashMap<u64, PendingInvoke>>,
    handlers: Mutex<HashMap<PushEvent, PushHandler>>,
    open: AtomicBool,
    intentional: AtomicBool,
    closed_tx: watch::Sender<Option<CloseReason>>,
}

impl ConnShared {
    /// Tear down once: reject every pending invoke, then report the reason.
    fn finish(&self, reason: CloseReason) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let pending: Vec<PendingInvoke> = {
            let mut map = self.pending.lock().expect("pending lock poisoned");
            map.drain().map(|(_, p)| p).collect()
        };
        for invoke in pending {
            tracing::debug!(method = %invoke.method, "rejecting invoke pending at close");
            let _ = invoke.tx.send(Err(HubError::Connection(
                "socket closed while awaiting reply".to_string(),
            )));
        }
        let _ = self.closed_tx.send(Some(reason));
    }

    fn dispatch(&self, text: &str) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("failed to parse hub frame: {e}");
                return;
            }
        };

        match frame {
            ServerFrame::Response(response) => {
                let waiter = self
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&response.id);
                let Some(invoke) = waiter else {
                    tracing::warn!(id = response.id, "response for unknown invoke id");
                    return;
                };
                let result = match response.error {
                    Some(err) => Err(HubError::Invoke {
                        method: invoke.method,
                        message: err.message,
                    }),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = invoke.tx.send(result);
            }
            ServerFrame::Push(push) => {
                let Some(event) = PushEvent::from_wire(&push.method) else {
                    tracing::warn!(method = %push.method, "unknown push event from server");
                    debug_assert!(false, "unknown push event: {}", push.method);
                    return;
                };
                // Handlers run on the reader task and must not register or
                // remove handlers themselves.
                let handlers = self.handlers.lock().expect("handlers lock poisoned");
                match handlers.get(&event) {
                    Some(handler) => handler(push),
                    None => tracing::trace!(method = %push.method, "push without handler"),
                }
            }
        }
    }
}

/// A live, framed socket to one hub endpoint.
pub struct WsConnection {
    shared: Arc<ConnShared>,
    writer: mpsc::UnboundedSender<Message>,
    next_id: AtomicU64,
    invoke_timeout: Duration,
    closed_rx: watch::Receiver<Option<CloseReason>>,
}

impl WsConnection {
    /// Open the socket and resolve once the handshake completes.
    ///
    /// The access token, when present, rides on the handshake as a bearer
    /// `Authorization` header. A missing token still attempts the connect;
    /// the server is the authority on rejecting it.
    pub async fn open(
        url: &str,
        bearer_token: Option<&str>,
        invoke_timeout: Duration,
    ) -> Result<Self, HubError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| HubError::Connection(format!("invalid hub url: {e}")))?;
        if let Some(token) = bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| HubError::Connection(format!("invalid access token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(classify_handshake_error)?;
        tracing::info!(url, "hub socket connected");

        let (mut write, mut read) = stream.split();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed_rx) = watch::channel(None);

        let shared = Arc::new(ConnShared {
            pending: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
            intentional: AtomicBool::new(false),
            closed_tx,
        });

        // Writer task: serialize all outbound traffic through one sink.
        let shared_for_write = shared.clone();
        tokio::spawn(async move {
            while let Some(msg) = writer_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    tracing::error!("hub socket send failed: {e}");
                    shared_for_write.finish(close_reason(&shared_for_write, e.to_string()));
                    break;
                }
                if is_close {
                    let _ = write.flush().await;
                    break;
                }
            }
        });

        // Reader task: correlate responses, dispatch pushes.
        let shared_for_read = shared.clone();
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => shared_for_read.dispatch(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        let reason =
                            close_reason(&shared_for_read, "socket closed".to_string());
                        shared_for_read.finish(reason);
                        break;
                    }
                    // Pong replies are queued by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("hub socket read failed: {e}");
                        let reason = close_reason(&shared_for_read, e.to_string());
                        shared_for_read.finish(reason);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            shared,
            writer: writer_tx,
            next_id: AtomicU64::new(1),
            invoke_timeout,
            closed_rx,
        })
    }

    /// Send a correlated RPC and suspend until its response arrives.
    ///
    /// Concurrent invokes are distinguished by id. Fails immediately with
    /// [`HubError::NotConnected`] when the socket is not open, and with
    /// [`HubError::Timeout`] when no response arrives in time.
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value, HubError> {
        if !self.is_open() {
            return Err(HubError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .insert(
                id,
                PendingInvoke {
                    method: method.to_string(),
                    tx,
                },
            );

        let frame = InvokeFrame::new(id, method, params);
        let text =
            serde_json::to_string(&frame).map_err(|e| HubError::Protocol(e.to_string()))?;
        tracing::debug!(method, id, "invoke");
        if self.writer.send(Message::Text(text.into())).is_err() {
            self.shared
                .pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            return Err(HubError::NotConnected);
        }

        match tokio::time::timeout(self.invoke_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::Connection(
                "socket closed while awaiting reply".to_string(),
            )),
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&id);
                Err(HubError::Timeout {
                    method: method.to_string(),
                    timeout_ms: self.invoke_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Register the handler for a push event. Last registration wins.
    pub fn on(&self, event: PushEvent, handler: impl Fn(PushFrame) + Send + Sync + 'static) {
        self.shared
            .handlers
            .lock()
            .expect("handlers lock poisoned")
            .insert(event, Box::new(handler));
    }

    /// Remove the handler for a push event.
    pub fn off(&self, event: PushEvent) {
        self.shared
            .handlers
            .lock()
            .expect("handlers lock poisoned")
            .remove(&event);
    }

    /// Close gracefully. The closure is reported as [`CloseReason::Clean`]
    /// and the owner will not reconnect.
    pub fn close(&self) {
        self.shared.intentional.store(true, Ordering::SeqCst);
        let _ = self.writer.send(Message::Close(None));
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Watch for closure. Yields `Some(reason)` exactly once.
    pub fn closed(&self) -> watch::Receiver<Option<CloseReason>> {
        self.closed_rx.clone()
    }
}

fn close_reason(shared: &ConnShared, message: String) -> CloseReason {
    if shared.intentional.load(Ordering::SeqCst) {
        CloseReason::Clean
    } else {
        CloseReason::Unexpected(message)
    }
}

/// Map a handshake failure onto the error taxonomy. Authorization
/// rejections are recognized by HTTP status or by the 401 marker the
/// backend embeds in the rejection text.
fn classify_handshake_error(err: tungstenite::Error) -> HubError {
    match &err {
        tungstenite::Error::Http(response) if response.status().as_u16() == 401 => {
            HubError::Authentication("handshake rejected: Status code '401'".to_string())
        }
        _ => {
            let message = err.to_string();
            if is_auth_rejection(&message) {
                HubError::Authentication(message)
            } else {
                HubError::Connection(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_401_maps_to_authentication_error() {
        let response = tungstenite::http::Response::builder()
            .status(401)
            .body(None)
            .expect("response");
        let err = classify_handshake_error(tungstenite::Error::Http(response));
        assert!(err.is_auth());
    }

    #[test]
    fn http_500_maps_to_connection_error() {
        let response = tungstenite::http::Response::builder()
            .status(500)
            .body(None)
            .expect("response");
        let err = classify_handshake_error(tungstenite::Error::Http(response));
        assert!(matches!(err, HubError::Connection(_)));
    }

    #[test]
    fn non_http_errors_map_to_connection_error() {
        let err = classify_handshake_error(tungstenite::Error::Url(
            tungstenite::error::UrlError::UnsupportedUrlScheme,
        ));
        assert!(matches!(err, HubError::Connection(_)));
    }
}
