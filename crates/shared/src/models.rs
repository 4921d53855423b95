//! Domain models exchanged with the chat backend.
//!
//! Everything here mirrors the backend's JSON contract, which is camelCase
//! throughout. `delivered` never goes over the wire from the client; it is
//! the local flag that marks a message as confirmed by a server push.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Media,
    System,
}

/// A unit of conversation content.
///
/// Server-assigned `id` once confirmed; optimistic local entries carry a
/// client-generated temporary id until the server echo arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub sender_id: String,
    pub content: String,
    pub r#type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    /// Client-only: true once a server echo or ack confirmed this message.
    #[serde(default)]
    pub delivered: bool,
}

/// Chatbot pushes sometimes carry a bare string instead of a message object.
/// This normalises either shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageOrText {
    Message(ChatMessage),
    Text(String),
}

impl MessageOrText {
    /// Normalise into a [`ChatMessage`]; bare text becomes a `system`
    /// message with a fresh local id.
    pub fn into_message(self) -> ChatMessage {
        match self {
            MessageOrText::Message(m) => m,
            MessageOrText::Text(content) => ChatMessage {
                id: Uuid::new_v4().to_string(),
                parent_message_id: None,
                chat_id: None,
                sender_id: String::new(),
                content,
                r#type: MessageType::System,
                file_url: None,
                timestamp: Utc::now(),
                is_read: false,
                delivered: false,
            },
        }
    }
}

/// Outgoing `SendMessage` payload. The server fills in id, sender and
/// timestamp and echoes the full message back as a `receivemessage` push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub content: String,
    pub r#type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Outgoing live-chat message payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessage {
    pub live_chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    pub content: String,
}

/// One entry in the user's chat history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageHistory {
    pub id: String,
    pub chat_type: String,
    pub participants: Vec<ChatParticipant>,
    pub last_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

/// One entry in the agent-side support history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessageHistory {
    pub live_chat_id: String,
    pub sender_name: String,
    pub content: String,
}

/// One entry in the AI chat list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListItem {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Paginated server push payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub page_size: u64,
    pub data: Vec<T>,
}

/// Paginated history request payload. Page fields are strings on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub search_term: String,
    pub page_number: String,
    pub page_size: String,
}

/// Paginated history request scoped to one live chat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPageRequest {
    pub live_chat_id: String,
    pub search_term: String,
    pub page_number: String,
    pub page_size: String,
}

/// Messages grouped by day, as delivered by the `loadmessages` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedMessages {
    pub date_time: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub display_date: String,
}

/// Payload of the `receiverequestmessage` push: a support request waiting
/// for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub function: String,
}

/// Payload of the `agentassigned` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAssigned {
    pub live_chat_id: String,
    pub participant: NewAssignment,
}

/// Payload of the `ChatInitialized` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInitialized {
    pub chat_id: String,
}

/// Access/refresh token pair as stored and as returned by the refresh
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Envelope of the `Users/refresh-token` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub data: TokenPair,
}

/// Cached user object persisted next to the tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_round_trips_camel_case() {
        let json = r#"{
            "id": "srv-1",
            "chatId": "room1",
            "senderId": "u-9",
            "content": "hi",
            "type": "text",
            "timestamp": "2025-01-02T03:04:05Z",
            "isRead": false
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "srv-1");
        assert_eq!(msg.chat_id.as_deref(), Some("room1"));
        assert_eq!(msg.r#type, MessageType::Text);
        assert!(!msg.delivered);

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["chatId"], "room1");
        assert_eq!(back["type"], "text");
    }

    #[test]
    fn message_or_text_normalises_bare_string() {
        let raw = serde_json::json!("How can I help you today?");
        let parsed: MessageOrText = serde_json::from_value(raw).unwrap();
        let msg = parsed.into_message();
        assert_eq!(msg.content, "How can I help you today?");
        assert_eq!(msg.r#type, MessageType::System);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn message_or_text_keeps_full_objects() {
        let raw = serde_json::json!({
            "id": "srv-2",
            "senderId": "u-1",
            "content": "hello",
            "type": "media",
            "fileUrl": "https://cdn.example/x.png",
            "timestamp": "2025-01-02T03:04:05Z",
            "isRead": true
        });
        let parsed: MessageOrText = serde_json::from_value(raw).unwrap();
        let msg = parsed.into_message();
        assert_eq!(msg.id, "srv-2");
        assert_eq!(msg.file_url.as_deref(), Some("https://cdn.example/x.png"));
        assert!(msg.is_read);
    }

    #[test]
    fn draft_omits_absent_optionals() {
        let draft = MessageDraft {
            parent_message_id: None,
            chat_id: Some("room1".into()),
            content: "hi".into(),
            r#type: MessageType::Text,
            file_url: None,
        };
        let v = serde_json::to_value(&draft).unwrap();
        assert!(v.get("parentMessageId").is_none());
        assert!(v.get("fileUrl").is_none());
        assert_eq!(v["chatId"], "room1");
    }

    #[test]
    fn refresh_response_unwraps_data_envelope() {
        let json = r#"{"data":{"accessToken":"new-a","refreshToken":"new-r"}}"#;
        let resp: RefreshTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data.access_token, "new-a");
        assert_eq!(resp.data.refresh_token, "new-r");
    }
}
