//! Feed posting and comment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Attachment;

/// Organization a posting was published under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Author summary embedded in a posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Aggregate counts attached by the backend (`_count`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingCounts {
    #[serde(default)]
    pub comments: Option<usize>,
}

/// Feed post / announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub post_type: String,
    #[serde(default)]
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub organization: Option<OrganizationRef>,
    #[serde(default)]
    pub created_by: Option<PostAuthor>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub comments: Option<Vec<PostingComment>>,
    #[serde(rename = "_count", default)]
    pub counts: Option<PostingCounts>,
}

impl Posting {
    /// Authoritative comment count reported by the backend, if any.
    pub fn comment_count(&self) -> Option<usize> {
        self.counts.as_ref().and_then(|c| c.comments)
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.created_by.as_ref().map(|a| a.id.as_str())
    }
}

/// Name and email of a comment author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CommentAuthor {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or("?")
    }
}

/// Comment on a posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingComment {
    pub id: String,
    pub posting_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user: CommentAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
