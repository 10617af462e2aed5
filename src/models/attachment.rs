//! Attachment models

use serde::{Deserialize, Serialize};

/// File attached to a message or posting.
///
/// `url` is either a remote URL or an embedded `data:` URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posting_id: Option<String>,
}

/// Attachment as sent to the backend alongside a message or posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    /// `data:{mime};base64,{payload}`
    pub url: String,
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
}
