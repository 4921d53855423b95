//! Hub chat manager.
//!
//! [`HubChat`] is the single entry point screens talk to. It owns at most
//! one live [`WsConnection`], multiplexes server pushes into typed state
//! and callbacks, and coordinates the reconnect/token-refresh cycle through
//! the session state machine in [`crate::ws`]. For every push the state is
//! mutated first and the matching callback (if registered) fires after, so
//! a callback always observes the post-event state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use hubline_shared::{
    methods, AgentAssigned, AgentMessageHistory, AgentPageRequest, ChatInitialized,
    ChatListItem, ChatMessage, ChatMessageHistory, GroupedMessages, HubError,
    LiveChatMessage, MessageDraft, MessageOrText, NewAssignment, PageRequest, Paged,
    PushEvent, PushFrame,
};

use crate::auth::{CredentialStore, TokenRefresher};
use crate::storage::KeyValueStorage;
use crate::ws::{
    CloseReason, ConnectionState, ReconnectConfig, RetryState, SessionEvent, SessionPhase,
    WsConnection,
};

/// Minimum gap between two typing invokes for the same hub.
const TYPING_DEBOUNCE: Duration = Duration::from_secs(3);

/// Which hub endpoint to connect to. Each maps to a path segment that
/// replaces the REST base's `/api/` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubChannel {
    /// Direct user-to-user chat.
    Chats,
    /// Live support chat (user or agent side).
    LiveChat,
    /// AI chatbot.
    Chatbot,
}

impl HubChannel {
    pub fn path(self) -> &'static str {
        match self {
            HubChannel::Chats => "chats",
            HubChannel::LiveChat => "livechat",
            HubChannel::Chatbot => "chatbot",
        }
    }
}

/// Per-hub configuration.
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// REST base URL, e.g. `https://api.example.com/api/`.
    pub base_url: String,
    pub channel: HubChannel,
    /// Chat scope for the room-bound operations.
    pub chat_id: Option<String>,
    /// Peer user for `initialize_chat`.
    pub member_id: Option<String>,
    pub reconnect: ReconnectConfig,
    pub invoke_timeout: Duration,
}

impl HubOptions {
    pub fn new(base_url: impl Into<String>, channel: HubChannel) -> Self {
        Self {
            base_url: base_url.into(),
            channel,
            chat_id: None,
            member_id: None,
            reconnect: ReconnectConfig::default(),
            invoke_timeout: crate::ws::DEFAULT_INVOKE_TIMEOUT,
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    /// Hub endpoint derived from the REST base: the `/api/` segment is
    /// replaced by the channel path and the scheme drops to WebSocket.
    pub fn hub_url(&self) -> String {
        let with_path = self
            .base_url
            .replacen("/api/", &format!("/{}", self.channel.path()), 1);
        if let Some(rest) = with_path.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = with_path.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            with_path
        }
    }
}

/// Everything a screen needs to render one hub conversation.
#[derive(Debug, Clone, Default)]
pub struct HubState {
    pub connection: ConnectionState,
    /// Most recent first.
    pub messages: Vec<ChatMessage>,
    /// User ids currently typing, no duplicates.
    pub typing_users: Vec<String>,
    pub last_error: Option<String>,
}

impl HubState {
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.connection.is_connecting()
    }
}

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Optional typed callbacks, one per push-event family. All are invoked
/// after the corresponding state mutation.
#[derive(Default)]
pub struct HubCallbacks {
    pub on_message_received: Option<Callback<ChatMessage>>,
    pub on_message_read: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_user_typing: Option<Callback<str>>,
    pub on_user_stopped_typing: Option<Callback<str>>,
    pub on_connection_state_change: Option<Callback<ConnectionState>>,
    pub on_chat_initialized: Option<Callback<str>>,
    pub on_message_history: Option<Callback<[ChatMessageHistory]>>,
    pub on_chat_messages: Option<Callback<[ChatMessage]>>,
    pub on_support_message_received: Option<Callback<str>>,
    pub on_support_message_history: Option<Callback<Paged<AgentMessageHistory>>>,
    pub on_new_assignment: Option<Callback<NewAssignment>>,
    pub on_agent_assigned: Option<Callback<AgentAssigned>>,
    pub on_agent_message_history: Option<Callback<[ChatMessageHistory]>>,
    pub on_agent_chat_messages: Option<Callback<Paged<AgentMessageHistory>>>,
    pub on_ai_chat_list: Option<Callback<[ChatListItem]>>,
    pub on_ai_question_responses: Option<Callback<Value>>,
    pub on_error: Option<Callback<HubError>>,
}

struct HubInner {
    options: HubOptions,
    creds: CredentialStore,
    refresher: TokenRefresher,
    callbacks: HubCallbacks,
    conn: Mutex<Option<Arc<WsConnection>>>,
    state: watch::Sender<HubState>,
    state_rx: watch::Receiver<HubState>,
    /// Bumped by every `connect`/`disconnect`; a supervisor whose
    /// generation no longer matches is stale and must stand down.
    generation: AtomicU64,
    typing_gate: Mutex<Option<Instant>>,
}

/// The hub chat manager. Cloning shares the same session.
#[derive(Clone)]
pub struct HubChat {
    inner: Arc<HubInner>,
}

impl HubChat {
    pub fn new(
        options: HubOptions,
        storage: Arc<dyn KeyValueStorage>,
        callbacks: HubCallbacks,
    ) -> Self {
        let creds = CredentialStore::new(storage);
        let refresher = TokenRefresher::new(options.base_url.clone(), creds.clone());
        let (state, state_rx) = watch::channel(HubState::default());
        Self {
            inner: Arc::new(HubInner {
                options,
                creds,
                refresher,
                callbacks,
                conn: Mutex::new(None),
                state,
                state_rx,
                generation: AtomicU64::new(0),
                typing_gate: Mutex::new(None),
            }),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> HubState {
        self.inner.state_rx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<HubState> {
        self.inner.state_rx.clone()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.creds
    }

    /// Establish the hub connection.
    ///
    /// Any previous transport is torn down first, so repeated calls never
    /// leak sockets. A 401-equivalent handshake rejection triggers a token
    /// refresh and one more attempt, at most twice per call; when the cap
    /// is hit or the refresh itself fails, the stored credentials are wiped
    /// and the terminal error is both returned and published.
    pub async fn connect(&self) -> Result<(), HubError> {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = inner.lock_conn().take() {
            old.close();
        }
        inner.set_connection(ConnectionState::Connecting);

        let config = inner.options.reconnect.clone();
        let mut retry = RetryState::new();
        let mut phase = SessionPhase::Connecting;

        let conn = loop {
            match self.try_open().await {
                Ok(conn) => {
                    phase = phase.apply(SessionEvent::ConnectOk, &mut retry, &config);
                    debug_assert_eq!(phase, SessionPhase::Connected);
                    break conn;
                }
                Err(err) => {
                    let auth = err.is_auth();
                    phase = phase.apply(
                        SessionEvent::ConnectRejected { auth },
                        &mut retry,
                        &config,
                    );
                    match phase {
                        SessionPhase::RefreshingToken => match inner.refresher.refresh().await {
                            Ok(_) => {
                                phase = phase.apply(
                                    SessionEvent::RefreshSucceeded,
                                    &mut retry,
                                    &config,
                                );
                            }
                            Err(refresh_err) => {
                                // The refresher already wiped the credentials.
                                inner.fail(&refresh_err);
                                return Err(refresh_err);
                            }
                        },
                        _ => {
                            if auth {
                                inner.creds.clear();
                            }
                            inner.fail(&err);
                            return Err(err);
                        }
                    }
                }
            }
        };

        *inner.lock_conn() = Some(conn.clone());
        self.wire_events(&conn);
        inner.set_connection(ConnectionState::Connected);
        self.spawn_supervisor(conn, generation, retry);
        Ok(())
    }

    /// Close intentionally. The supervisor stands down and no reconnect is
    /// attempted.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(conn) = self.inner.lock_conn().take() {
            conn.close();
        }
        self.inner.set_connection(ConnectionState::Disconnected);
    }

    /// Prepend an optimistic local message (not yet confirmed by the
    /// server). It is marked delivered by the next `receivemessage` sweep.
    pub fn add_local_message(&self, message: ChatMessage) {
        self.inner
            .state
            .send_modify(|s| s.messages.insert(0, message));
    }

    // --- direct chat operations ---------------------------------------

    pub async fn send_message(&self, draft: &MessageDraft) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::SEND_MESSAGE, vec![encode(draft)?]).await?;
        Ok(())
    }

    /// Start a private chat with the configured member.
    pub async fn initialize_chat(&self) -> Result<(), HubError> {
        let member_id = self.inner.options.member_id.clone().ok_or_else(|| {
            HubError::Protocol("initialize_chat requires a member id".to_string())
        })?;
        let conn = self.live_conn()?;
        conn.invoke(
            methods::INITIALIZE_CHAT,
            vec![json!({ "chatType": "Private", "memberIds": [member_id] })],
        )
        .await?;
        Ok(())
    }

    pub async fn join_chat(&self) -> Result<(), HubError> {
        let chat_id = self.chat_id()?;
        let conn = self.live_conn()?;
        conn.invoke(methods::JOIN_CHAT, vec![json!({ "chatId": chat_id })])
            .await?;
        Ok(())
    }

    pub async fn leave_chat(&self) -> Result<(), HubError> {
        let chat_id = self.chat_id()?;
        let conn = self.live_conn()?;
        conn.invoke(methods::LEAVE_CHAT, vec![json!({ "chatId": chat_id })])
            .await?;
        Ok(())
    }

    /// Keep-alive rejoin used by the direct-chat screen after a resume.
    pub async fn join_chat_room(&self) -> Result<(), HubError> {
        let chat_id = self.chat_id()?;
        let conn = self.live_conn()?;
        conn.invoke(methods::RECEIVE_MESSAGE, vec![json!({ "chatId": chat_id })])
            .await?;
        Ok(())
    }

    pub async fn mark_message_as_read(&self, message_id: &str) -> Result<(), HubError> {
        let chat_id = self.chat_id()?;
        let conn = self.live_conn()?;
        conn.invoke(
            methods::MARK_MESSAGE_AS_READ,
            vec![json!({ "chatId": chat_id, "messageId": message_id })],
        )
        .await?;
        Ok(())
    }

    /// Tell the room this user is typing, at most once per debounce window.
    pub async fn send_typing_indicator(&self) -> Result<(), HubError> {
        let chat_id = self.chat_id()?;
        let conn = self.live_conn()?;
        {
            let mut gate = self
                .inner
                .typing_gate
                .lock()
                .expect("typing gate poisoned");
            if let Some(last) = *gate {
                if last.elapsed() < TYPING_DEBOUNCE {
                    return Ok(());
                }
            }
            *gate = Some(Instant::now());
        }
        conn.invoke(methods::TYPING, vec![json!(chat_id)]).await?;
        Ok(())
    }

    /// Request the user's chat history; the data arrives as a
    /// `receivechathistory` push. Takes no arguments on the wire.
    pub async fn get_user_chat_history(&self) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::GET_USER_CHAT_HISTORY, vec![]).await?;
        Ok(())
    }

    /// Request this chat's messages; the data arrives as a `loadmessages`
    /// push.
    pub async fn get_chat_messages(&self) -> Result<(), HubError> {
        let chat_id = self.chat_id()?;
        let conn = self.live_conn()?;
        conn.invoke(methods::GET_CHAT_MESSAGES, vec![json!({ "chatId": chat_id })])
            .await?;
        Ok(())
    }

    // --- live support operations --------------------------------------

    pub async fn send_live_chat_message(&self, message: &LiveChatMessage) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::SEND_MESSAGE, vec![encode(message)?])
            .await?;
        Ok(())
    }

    /// Agent-side join; the live chat id goes as a bare string.
    pub async fn agent_join_chat_room(&self, live_chat_id: &str) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::JOIN_CHAT, vec![json!(live_chat_id)])
            .await?;
        Ok(())
    }

    pub async fn close_chat_session(&self, live_chat_id: &str) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::CLOSE_CHAT_SESSION, vec![json!(live_chat_id)])
            .await?;
        Ok(())
    }

    /// Claim a waiting support request as the handling agent.
    pub async fn join_agent(&self, live_chat_id: &str) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::PROCESS_AGENT_SELECTION, vec![json!(live_chat_id)])
            .await?;
        Ok(())
    }

    /// Agent → user direct send. The backend expects one positional
    /// argument holding the `[senderId, message]` pair.
    pub async fn send_message_to_user(
        &self,
        sender_id: &str,
        message: &str,
    ) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(
            methods::SEND_MESSAGE_TO_USER,
            vec![json!([sender_id, message])],
        )
        .await?;
        Ok(())
    }

    /// User-side support history; arrives as a `loadusermessages` push.
    pub async fn load_user_support_messages(&self, page: &PageRequest) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::LOAD_USER_MESSAGES, vec![encode(page)?])
            .await?;
        Ok(())
    }

    /// Agent-side support history; arrives as a `loadagentchats` push.
    pub async fn load_agent_support_messages(&self, page: &PageRequest) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::LOAD_AGENT_CHATS, vec![encode(page)?])
            .await?;
        Ok(())
    }

    /// One live chat's messages, agent side; arrives as a
    /// `loadagentchatmessages` push.
    pub async fn load_agent_chat_messages(
        &self,
        request: &AgentPageRequest,
    ) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::LOAD_AGENT_CHAT_MESSAGES, vec![encode(request)?])
            .await?;
        Ok(())
    }

    // --- chatbot operations -------------------------------------------

    /// Open a fresh AI conversation; its id arrives as a `ChatInitialized`
    /// push.
    pub async fn new_ai_chat(&self) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::CREATE_NEW_CHAT, vec![]).await?;
        Ok(())
    }

    /// Send a prompt into an AI conversation. The conversation id is a
    /// parameter so one hub can drive several conversations.
    pub async fn prompt_ai(&self, message: &str, chat_id: &str) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::PROMPT, vec![json!(message), json!(chat_id)])
            .await?;
        Ok(())
    }

    pub async fn get_ai_question_responses(&self, chat_id: &str) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::GET_AI_QUESTION_RESPONSES, vec![json!(chat_id)])
            .await?;
        Ok(())
    }

    /// Previous AI conversations; arrive as a `ReceiveAIChatList` push.
    pub async fn previous_ai_chat_history(&self) -> Result<(), HubError> {
        let conn = self.live_conn()?;
        conn.invoke(methods::GET_CHAT_LIST, vec![]).await?;
        Ok(())
    }

    // --- internals -----------------------------------------------------

    fn chat_id(&self) -> Result<String, HubError> {
        self.inner
            .options
            .chat_id
            .clone()
            .ok_or_else(|| HubError::Protocol("no chat id configured".to_string()))
    }

    fn live_conn(&self) -> Result<Arc<WsConnection>, HubError> {
        self.inner
            .lock_conn()
            .clone()
            .filter(|c| c.is_open())
            .ok_or(HubError::NotConnected)
    }

    async fn try_open(&self) -> Result<Arc<WsConnection>, HubError> {
        let token = self.inner.creds.access_token();
        let url = self.inner.options.hub_url();
        let conn =
            WsConnection::open(&url, token.as_deref(), self.inner.options.invoke_timeout).await?;
        Ok(Arc::new(conn))
    }

    /// Route every known push into `HubInner::handle_push`. Handlers hold a
    /// weak reference so the connection's handler map never keeps the hub
    /// alive.
    fn wire_events(&self, conn: &WsConnection) {
        for event in PushEvent::ALL {
            let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
            conn.on(event, move |push| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_push(event, push);
                }
            });
        }
    }

    fn spawn_supervisor(&self, conn: Arc<WsConnection>, generation: u64, retry: RetryState) {
        let hub = self.clone();
        tokio::spawn(async move {
            hub.supervise(conn, generation, retry).await;
        });
    }

    /// Watch the live transport and drive reconnects until the session
    /// ends or a newer generation takes over.
    async fn supervise(self, mut conn: Arc<WsConnection>, generation: u64, mut retry: RetryState) {
        let inner = &self.inner;
        let config = inner.options.reconnect.clone();
        let mut phase = SessionPhase::Connected;

        loop {
            let reason = wait_closed(&conn).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let clean = reason == CloseReason::Clean;
            phase = phase.apply(SessionEvent::SocketClosed { clean }, &mut retry, &config);
            match phase {
                SessionPhase::Idle => {
                    inner.lock_conn().take();
                    inner.set_connection(ConnectionState::Disconnected);
                    return;
                }
                SessionPhase::Reconnecting => {}
                _ => {
                    inner.lock_conn().take();
                    inner.fail(&HubError::Connection(
                        "reconnect attempts exhausted".to_string(),
                    ));
                    return;
                }
            }

            loop {
                let attempt = retry.attempts();
                inner.set_connection(ConnectionState::Reconnecting { attempt });
                let delay = config.delay_for_attempt(attempt.saturating_sub(1));
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting to hub"
                );
                tokio::time::sleep(delay).await;
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }

                match self.try_open().await {
                    Ok(new_conn) => {
                        phase = phase.apply(SessionEvent::ConnectOk, &mut retry, &config);
                        *inner.lock_conn() = Some(new_conn.clone());
                        self.wire_events(&new_conn);
                        inner.set_connection(ConnectionState::Connected);
                        conn = new_conn;
                        break;
                    }
                    Err(err) => {
                        let auth = err.is_auth();
                        phase = phase.apply(
                            SessionEvent::ConnectRejected { auth },
                            &mut retry,
                            &config,
                        );
                        match phase {
                            SessionPhase::RefreshingToken => {
                                match inner.refresher.refresh().await {
                                    Ok(_) => {
                                        phase = phase.apply(
                                            SessionEvent::RefreshSucceeded,
                                            &mut retry,
                                            &config,
                                        );
                                    }
                                    Err(refresh_err) => {
                                        inner.lock_conn().take();
                                        inner.fail(&refresh_err);
                                        return;
                                    }
                                }
                            }
                            SessionPhase::Reconnecting => {}
                            _ => {
                                if auth {
                                    inner.creds.clear();
                                }
                                inner.lock_conn().take();
                                inner.fail(&err);
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn wait_closed(conn: &WsConnection) -> CloseReason {
    let mut rx = conn.closed();
    loop {
        if let Some(reason) = rx.borrow_and_update().clone() {
            return reason;
        }
        if rx.changed().await.is_err() {
            return CloseReason::Unexpected("connection dropped".to_string());
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, HubError> {
    serde_json::to_value(value).map_err(|e| HubError::Protocol(e.to_string()))
}

impl HubInner {
    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Option<Arc<WsConnection>>> {
        self.conn.lock().expect("conn lock poisoned")
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.state
            .send_modify(|s| s.connection = connection.clone());
        if let Some(cb) = &self.callbacks.on_connection_state_change {
            cb(&connection);
        }
    }

    fn fail(&self, err: &HubError) {
        let reason = err.to_string();
        tracing::error!("hub session failed: {reason}");
        self.state.send_modify(|s| {
            s.connection = ConnectionState::Failed {
                reason: reason.clone(),
            };
            s.last_error = Some(reason.clone());
        });
        if let Some(cb) = &self.callbacks.on_connection_state_change {
            cb(&ConnectionState::Failed { reason });
        }
        if let Some(cb) = &self.callbacks.on_error {
            cb(err);
        }
    }

    fn decode<T: DeserializeOwned>(&self, event: PushEvent, payload: Value) -> Option<T> {
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(event = event.wire_name(), "malformed push payload: {e}");
                None
            }
        }
    }

    /// One push in, exactly one state mutation out, then at most one
    /// callback.
    fn handle_push(&self, event: PushEvent, push: PushFrame) {
        let payload = push.payload();
        match event {
            PushEvent::ReceiveMessage => {
                let mut incoming = if self.options.channel == HubChannel::Chatbot {
                    // The chatbot sometimes pushes a bare string.
                    let Some(raw) = self.decode::<MessageOrText>(event, payload) else {
                        return;
                    };
                    raw.into_message()
                } else {
                    let Some(msg) = self.decode::<ChatMessage>(event, payload) else {
                        return;
                    };
                    msg
                };
                incoming.delivered = true;
                let sweep = self.options.channel != HubChannel::Chatbot;
                self.state.send_modify(|s| {
                    if sweep {
                        // Everything held so far is implicitly confirmed by
                        // the newer server echo.
                        for m in &mut s.messages {
                            m.delivered = true;
                        }
                    }
                    s.messages.insert(0, incoming.clone());
                });
                if let Some(cb) = &self.callbacks.on_message_received {
                    cb(&incoming);
                }
            }
            PushEvent::MessageRead => {
                self.state.send_modify(|s| {
                    for m in &mut s.messages {
                        m.delivered = true;
                        m.is_read = true;
                    }
                });
                if let Some(cb) = &self.callbacks.on_message_read {
                    cb();
                }
            }
            PushEvent::UserTyping => {
                let Some(user) = self.decode::<String>(event, payload) else {
                    return;
                };
                self.state.send_modify(|s| {
                    if !s.typing_users.contains(&user) {
                        s.typing_users.push(user.clone());
                    }
                });
                if let Some(cb) = &self.callbacks.on_user_typing {
                    cb(&user);
                }
            }
            PushEvent::UserStoppedTyping => {
                let Some(user) = self.decode::<String>(event, payload) else {
                    return;
                };
                self.state
                    .send_modify(|s| s.typing_users.retain(|u| u != &user));
                if let Some(cb) = &self.callbacks.on_user_stopped_typing {
                    cb(&user);
                }
            }
            PushEvent::ReceiveChatHistory => {
                let Some(history) = self.decode::<Vec<ChatMessageHistory>>(event, payload)
                else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_message_history {
                    cb(&history);
                }
            }
            PushEvent::ChatInitialized => {
                let Some(init) = self.decode::<ChatInitialized>(event, payload) else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_chat_initialized {
                    cb(&init.chat_id);
                }
            }
            PushEvent::ReceiveAiChatList => {
                let Some(list) = self.decode::<Vec<ChatListItem>>(event, payload) else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_ai_chat_list {
                    cb(&list);
                }
            }
            PushEvent::ReceiveAiChatQuestionResponseList => {
                if let Some(cb) = &self.callbacks.on_ai_question_responses {
                    cb(&payload);
                }
            }
            PushEvent::LoadMessages => {
                let Some(groups) = self.decode::<Vec<GroupedMessages>>(event, payload) else {
                    return;
                };
                let mut flattened: Vec<ChatMessage> = groups
                    .into_iter()
                    .flat_map(|g| g.messages)
                    .collect();
                // History is settled: everything in it is delivered and read.
                for m in &mut flattened {
                    m.delivered = true;
                    m.is_read = true;
                }
                self.state
                    .send_modify(|s| s.messages = flattened.clone());
                if let Some(cb) = &self.callbacks.on_chat_messages {
                    cb(&flattened);
                }
            }
            PushEvent::LoadUserMessages => {
                let Some(page) = self.decode::<Paged<AgentMessageHistory>>(event, payload)
                else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_support_message_history {
                    cb(&page);
                }
            }
            PushEvent::LoadAgentChats => {
                // Plain array, no paging envelope.
                let Some(history) = self.decode::<Vec<ChatMessageHistory>>(event, payload)
                else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_agent_message_history {
                    cb(&history);
                }
            }
            PushEvent::LoadAgentChatMessages => {
                let Some(page) = self.decode::<Paged<AgentMessageHistory>>(event, payload)
                else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_agent_chat_messages {
                    cb(&page);
                }
            }
            PushEvent::ReceiveRequestMessage => {
                let Some(assignment) = self.decode::<NewAssignment>(event, payload) else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_new_assignment {
                    cb(&assignment);
                }
            }
            PushEvent::ReceiveNewAssignment => {
                let Some(message) = self.decode::<String>(event, payload) else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_support_message_received {
                    cb(&message);
                }
            }
            PushEvent::AgentAssigned => {
                let Some(assigned) = self.decode::<AgentAssigned>(event, payload) else {
                    return;
                };
                if let Some(cb) = &self.callbacks.on_agent_assigned {
                    cb(&assigned);
                }
            }
            PushEvent::MessageDelivered | PushEvent::UserConnected | PushEvent::ResponseMessage => {
                tracing::debug!(event = event.wire_name(), "diagnostic hub push");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use hubline_shared::MessageType;

    fn hub(channel: HubChannel) -> HubChat {
        let options = HubOptions::new("https://api.example.com/api/", channel)
            .with_chat_id("room-1")
            .with_member_id("peer-1");
        HubChat::new(options, Arc::new(MemoryStorage::new()), HubCallbacks::default())
    }

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            parent_message_id: None,
            chat_id: Some("room-1".to_string()),
            sender_id: "u-1".to_string(),
            content: "hello".to_string(),
            r#type: MessageType::Text,
            file_url: None,
            timestamp: Utc::now(),
            is_read: false,
            delivered: false,
        }
    }

    fn push(event: PushEvent, payload: Value) -> PushFrame {
        PushFrame {
            method: event.wire_name().to_string(),
            params: vec![payload],
        }
    }

    #[test]
    fn hub_url_swaps_api_segment_and_scheme() {
        let https = HubOptions::new("https://api.example.com/api/", HubChannel::Chats);
        assert_eq!(https.hub_url(), "wss://api.example.com/chats");

        let http = HubOptions::new("http://10.0.0.5:8080/api/", HubChannel::LiveChat);
        assert_eq!(http.hub_url(), "ws://10.0.0.5:8080/livechat");

        let bot = HubOptions::new("https://api.example.com/api/", HubChannel::Chatbot);
        assert_eq!(bot.hub_url(), "wss://api.example.com/chatbot");
    }

    #[test]
    fn receive_message_marks_held_messages_delivered_and_prepends() {
        let hub = hub(HubChannel::Chats);
        hub.add_local_message(message("local-1"));

        let mut confirmed = message("srv-1");
        confirmed.sender_id = "u-2".to_string();
        hub.inner.handle_push(
            PushEvent::ReceiveMessage,
            push(PushEvent::ReceiveMessage, serde_json::to_value(&confirmed).unwrap()),
        );

        let state = hub.state();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].id, "srv-1");
        assert!(state.messages[0].delivered);
        // The optimistic local entry is confirmed by the sweep.
        assert_eq!(state.messages[1].id, "local-1");
        assert!(state.messages[1].delivered);
    }

    #[test]
    fn chatbot_prepends_without_the_delivered_sweep() {
        let hub = hub(HubChannel::Chatbot);
        hub.add_local_message(message("local-1"));

        hub.inner.handle_push(
            PushEvent::ReceiveMessage,
            push(PushEvent::ReceiveMessage, json!("How can I help?")),
        );

        let state = hub.state();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "How can I help?");
        assert_eq!(state.messages[0].r#type, MessageType::System);
        assert!(!state.messages[1].delivered);
    }

    #[test]
    fn message_read_marks_everything_read() {
        let hub = hub(HubChannel::Chats);
        hub.add_local_message(message("m-1"));
        hub.add_local_message(message("m-2"));

        hub.inner
            .handle_push(PushEvent::MessageRead, push(PushEvent::MessageRead, Value::Null));

        let state = hub.state();
        assert!(state.messages.iter().all(|m| m.delivered && m.is_read));
    }

    #[test]
    fn typing_set_stays_unique_and_removal_is_exact() {
        let hub = hub(HubChannel::Chats);

        for _ in 0..2 {
            hub.inner
                .handle_push(PushEvent::UserTyping, push(PushEvent::UserTyping, json!("u-7")));
        }
        hub.inner
            .handle_push(PushEvent::UserTyping, push(PushEvent::UserTyping, json!("u-8")));
        assert_eq!(hub.state().typing_users, vec!["u-7", "u-8"]);

        hub.inner.handle_push(
            PushEvent::UserStoppedTyping,
            push(PushEvent::UserStoppedTyping, json!("u-7")),
        );
        assert_eq!(hub.state().typing_users, vec!["u-8"]);
    }

    #[test]
    fn load_messages_replaces_the_list_settled() {
        let hub = hub(HubChannel::Chats);
        hub.add_local_message(message("stale"));

        let groups = json!([
            {
                "dateTime": "2025-01-02",
                "displayDate": "Yesterday",
                "messages": [serde_json::to_value(message("h-1")).unwrap()]
            },
            {
                "dateTime": "2025-01-03",
                "displayDate": "Today",
                "messages": [serde_json::to_value(message("h-2")).unwrap()]
            }
        ]);
        hub.inner
            .handle_push(PushEvent::LoadMessages, push(PushEvent::LoadMessages, groups));

        let state = hub.state();
        assert_eq!(
            state.messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["h-1", "h-2"]
        );
        assert!(state.messages.iter().all(|m| m.delivered && m.is_read));
    }

    #[test]
    fn support_history_pushes_decode_the_observed_shapes() {
        let seen = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let mut callbacks = HubCallbacks::default();
        let s = seen.clone();
        callbacks.on_support_message_history = Some(Box::new(move |page| {
            assert_eq!(page.data[0].live_chat_id, "lc-1");
            s.lock().unwrap().push("user-history");
        }));
        let s = seen.clone();
        callbacks.on_agent_message_history = Some(Box::new(move |history| {
            assert_eq!(history[0].id, "chat-1");
            s.lock().unwrap().push("agent-chats");
        }));
        let s = seen.clone();
        callbacks.on_agent_chat_messages = Some(Box::new(move |page| {
            assert_eq!(page.data[0].sender_name, "Ada");
            s.lock().unwrap().push("agent-messages");
        }));
        let options = HubOptions::new("https://api.example.com/api/", HubChannel::LiveChat);
        let hub = HubChat::new(options, Arc::new(MemoryStorage::new()), callbacks);

        // Both paged pushes carry support-chat entries.
        let paged = json!({
            "totalItems": 1,
            "totalPages": 1,
            "currentPage": 1,
            "pageSize": 10,
            "data": [{ "liveChatId": "lc-1", "senderName": "Ada", "content": "hi" }]
        });
        hub.inner.handle_push(
            PushEvent::LoadUserMessages,
            push(PushEvent::LoadUserMessages, paged.clone()),
        );
        // The agent chat list is a plain array without a paging envelope.
        hub.inner.handle_push(
            PushEvent::LoadAgentChats,
            push(
                PushEvent::LoadAgentChats,
                json!([{
                    "id": "chat-1",
                    "chatType": "Live",
                    "participants": [],
                    "lastMessage": "hello"
                }]),
            ),
        );
        hub.inner.handle_push(
            PushEvent::LoadAgentChatMessages,
            push(PushEvent::LoadAgentChatMessages, paged),
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["user-history", "agent-chats", "agent-messages"]
        );
    }

    #[test]
    fn malformed_push_payload_leaves_state_untouched() {
        let hub = hub(HubChannel::Chats);
        hub.inner.handle_push(
            PushEvent::ReceiveMessage,
            push(PushEvent::ReceiveMessage, json!({ "not": "a message" })),
        );
        assert!(hub.state().messages.is_empty());
    }

    #[tokio::test]
    async fn operations_without_a_connection_fail_fast() {
        let hub = hub(HubChannel::Chats);
        let draft = MessageDraft {
            parent_message_id: None,
            chat_id: Some("room-1".to_string()),
            content: "hi".to_string(),
            r#type: MessageType::Text,
            file_url: None,
        };

        assert!(matches!(
            hub.send_message(&draft).await,
            Err(HubError::NotConnected)
        ));
        assert!(matches!(hub.join_chat().await, Err(HubError::NotConnected)));
        assert!(matches!(
            hub.send_typing_indicator().await,
            Err(HubError::NotConnected)
        ));
    }
}
