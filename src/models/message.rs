//! Message-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Attachment, AttachmentPayload};

/// Delivery status of a chat message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

/// Chat message between the session user and one contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Body of `POST /messages`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    pub receiver_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentPayload>,
}

/// Sort messages by `created_at`, keeping arrival order for equal timestamps.
pub fn sort_chronological(messages: &mut [Message]) {
    // sort_by is stable
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// Insert a message after every message with an equal or earlier timestamp.
///
/// A message whose id is already present replaces the existing entry.
pub fn insert_chronological(messages: &mut Vec<Message>, message: Message) {
    if let Some(existing) = messages.iter_mut().find(|m| m.id == message.id) {
        *existing = message;
        return;
    }
    let pos = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(pos, message);
}
