//! Wire protocol for the hub socket.
//!
//! The hub speaks JSON-RPC-shaped frames over a WebSocket: client-initiated
//! invokes carry an `id` and await a correlated response, server pushes are
//! notifications dispatched by method name. The set of push names is closed:
//! [`PushEvent`] enumerates every event the client understands, so an
//! unknown name from the server fails loudly instead of being silently
//! dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invoke method names understood by the hub backends.
pub mod methods {
    pub const INITIALIZE_CHAT: &str = "InitializeChat";
    pub const JOIN_CHAT: &str = "JoinChat";
    pub const LEAVE_CHAT: &str = "LeaveChat";
    pub const SEND_MESSAGE: &str = "SendMessage";
    /// Keep-alive/rejoin invoke used by the direct-chat screen.
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    pub const MARK_MESSAGE_AS_READ: &str = "MarkMessageAsRead";
    pub const TYPING: &str = "Typing";
    pub const GET_USER_CHAT_HISTORY: &str = "GetUserChatHistory";
    pub const GET_CHAT_MESSAGES: &str = "GetChatMessages";
    pub const CREATE_NEW_CHAT: &str = "CreateNewChat";
    pub const PROMPT: &str = "Prompt";
    pub const GET_AI_QUESTION_RESPONSES: &str = "GetAIQuestionResponses";
    pub const GET_CHAT_LIST: &str = "GetChatList";
    pub const LOAD_USER_MESSAGES: &str = "LoadUserMessages";
    pub const LOAD_AGENT_CHATS: &str = "LoadAgentChats";
    pub const LOAD_AGENT_CHAT_MESSAGES: &str = "LoadAgentChatMessages";
    pub const PROCESS_AGENT_SELECTION: &str = "ProcessAgentSelection";
    pub const CLOSE_CHAT_SESSION: &str = "CloseChatSession";
    pub const SEND_MESSAGE_TO_USER: &str = "SendMessageToUser";
}

/// Client → server RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeFrame {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl InvokeFrame {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Error payload of a failed invoke.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

/// Server → client reply correlated to an [`InvokeFrame`] by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Server → client unsolicited push, dispatched by method name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushFrame {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl PushFrame {
    /// The first push argument, or `Null` when the push carried none.
    pub fn payload(&self) -> Value {
        self.params.first().cloned().unwrap_or(Value::Null)
    }
}

/// Any inbound frame: a correlated invoke response or a named push.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Response(ResponseFrame),
    Push(PushFrame),
}

/// Every server push the client understands, keyed by its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEvent {
    ReceiveMessage,
    MessageRead,
    UserTyping,
    UserStoppedTyping,
    ReceiveChatHistory,
    ChatInitialized,
    ReceiveAiChatList,
    ReceiveAiChatQuestionResponseList,
    LoadMessages,
    LoadUserMessages,
    LoadAgentChats,
    LoadAgentChatMessages,
    ReceiveRequestMessage,
    ReceiveNewAssignment,
    AgentAssigned,
    MessageDelivered,
    UserConnected,
    ResponseMessage,
}

impl PushEvent {
    /// Every known push event, in wire order.
    pub const ALL: [PushEvent; 18] = [
        PushEvent::ReceiveMessage,
        PushEvent::MessageRead,
        PushEvent::UserTyping,
        PushEvent::UserStoppedTyping,
        PushEvent::ReceiveChatHistory,
        PushEvent::ChatInitialized,
        PushEvent::ReceiveAiChatList,
        PushEvent::ReceiveAiChatQuestionResponseList,
        PushEvent::LoadMessages,
        PushEvent::LoadUserMessages,
        PushEvent::LoadAgentChats,
        PushEvent::LoadAgentChatMessages,
        PushEvent::ReceiveRequestMessage,
        PushEvent::ReceiveNewAssignment,
        PushEvent::AgentAssigned,
        PushEvent::MessageDelivered,
        PushEvent::UserConnected,
        PushEvent::ResponseMessage,
    ];

    /// The event name as the server sends it. Casing is inconsistent on the
    /// backend; these strings match it byte for byte.
    pub fn wire_name(self) -> &'static str {
        match self {
            PushEvent::ReceiveMessage => "receivemessage",
            PushEvent::MessageRead => "MessageRead",
            PushEvent::UserTyping => "usertyping",
            PushEvent::UserStoppedTyping => "userstoppedtyping",
            PushEvent::ReceiveChatHistory => "receivechathistory",
            PushEvent::ChatInitialized => "ChatInitialized",
            PushEvent::ReceiveAiChatList => "ReceiveAIChatList",
            PushEvent::ReceiveAiChatQuestionResponseList => {
                "ReceiveAIChatQuestionResponseList"
            }
            PushEvent::LoadMessages => "loadmessages",
            PushEvent::LoadUserMessages => "loadusermessages",
            PushEvent::LoadAgentChats => "loadagentchats",
            PushEvent::LoadAgentChatMessages => "loadagentchatmessages",
            PushEvent::ReceiveRequestMessage => "receiverequestmessage",
            PushEvent::ReceiveNewAssignment => "receivenewassignment",
            PushEvent::AgentAssigned => "agentassigned",
            PushEvent::MessageDelivered => "messagedelivered",
            PushEvent::UserConnected => "userconnected",
            PushEvent::ResponseMessage => "responsemessage",
        }
    }

    /// Look up a wire name. `None` means the server sent an event this
    /// client version does not know.
    pub fn from_wire(name: &str) -> Option<Self> {
        PushEvent::ALL.iter().copied().find(|e| e.wire_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_round_trip_for_every_event() {
        for event in PushEvent::ALL {
            assert_eq!(PushEvent::from_wire(event.wire_name()), Some(event));
        }
    }

    #[test]
    fn unknown_wire_name_is_rejected() {
        assert_eq!(PushEvent::from_wire("totallynewevent"), None);
        // Dispatch is byte-exact: the backend's casing is part of the contract.
        assert_eq!(PushEvent::from_wire("messageread"), None);
    }

    #[test]
    fn invoke_frame_serializes_jsonrpc_shape() {
        let frame = InvokeFrame::new(7, methods::TYPING, vec![json!("room1")]);
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 7);
        assert_eq!(v["method"], "Typing");
        assert_eq!(v["params"], json!(["room1"]));
    }

    #[test]
    fn server_frame_distinguishes_response_from_push() {
        let response = r#"{"id":3,"result":{"ok":true}}"#;
        match serde_json::from_str::<ServerFrame>(response).unwrap() {
            ServerFrame::Response(r) => {
                assert_eq!(r.id, 3);
                assert!(r.error.is_none());
            }
            ServerFrame::Push(_) => panic!("parsed correlated reply as push"),
        }

        let push = r#"{"method":"usertyping","params":["user-4"]}"#;
        match serde_json::from_str::<ServerFrame>(push).unwrap() {
            ServerFrame::Push(p) => {
                assert_eq!(p.method, "usertyping");
                assert_eq!(p.payload(), json!("user-4"));
            }
            ServerFrame::Response(_) => panic!("parsed push as correlated reply"),
        }
    }

    #[test]
    fn response_frame_carries_error_payload() {
        let raw = r#"{"id":9,"error":{"code":-32000,"message":"chat not found"}}"#;
        let frame: ResponseFrame = serde_json::from_str(raw).unwrap();
        let err = frame.error.unwrap();
        assert_eq!(err.code, Some(-32000));
        assert_eq!(err.message, "chat not found");
    }

    #[test]
    fn push_frame_payload_defaults_to_null() {
        let raw = r#"{"method":"userconnected"}"#;
        let frame: PushFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.payload(), Value::Null);
    }
}
