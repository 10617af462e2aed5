//! API client module for the portal backend
//!
//! The stores talk to the backend through [`ChatService`] and [`FeedService`];
//! [`PortalClient`] implements both over REST.

mod chat;
pub mod client;
mod feed;
mod me;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Contact, Message, Posting, PostingComment, SendMessageRequest};

pub use client::{HttpError, PortalClient};
pub use me::{current_user, whoami};

/// Chat endpoints consumed by the conversation store.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Users the session user has conversations with.
    async fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Messages between the session user and one contact.
    async fn list_messages(&self, current_user_id: &str, contact_id: &str)
        -> Result<Vec<Message>>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message>;

    async fn delete_message(&self, message_id: &str) -> Result<()>;

    async fn search_users(&self, query: &str) -> Result<Vec<Contact>>;
}

/// Feed endpoints consumed by the comment cache and the feed commands.
#[async_trait]
pub trait FeedService: Send + Sync {
    /// One page of postings (1-based page).
    async fn list_postings(&self, page: u32, limit: u32) -> Result<Vec<Posting>>;

    async fn get_posting(&self, posting_id: &str) -> Result<Posting>;

    async fn list_comments(&self, posting_id: &str) -> Result<Vec<PostingComment>>;

    async fn create_comment(&self, posting_id: &str, content: &str) -> Result<PostingComment>;

    async fn delete_comment(&self, posting_id: &str, comment_id: &str) -> Result<()>;
}
