//! Chat endpoints (`/messages`, `/users/search`)

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::client::{encode_segment, PortalClient};
use super::ChatService;
use crate::models::{contact_from_user, BackendUser, Contact, Message, SendMessageRequest};

#[async_trait]
impl ChatService for PortalClient {
    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let users: Vec<BackendUser> = self.get_list("/messages/contacts", &[], "contacts").await?;
        Ok(users.into_iter().map(contact_from_user).collect())
    }

    async fn list_messages(
        &self,
        current_user_id: &str,
        contact_id: &str,
    ) -> Result<Vec<Message>> {
        let path = format!(
            "/messages/conversation/{}/{}",
            encode_segment(current_user_id),
            encode_segment(contact_id)
        );
        self.get_list(&path, &[], "messages").await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
        tracing::debug!(
            "Sending message to {} ({} attachments)",
            request.receiver_id,
            request.attachments.len()
        );
        self.post("/messages", request)
            .await?
            .json()
            .await
            .context("Failed to parse sent message")
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        let path = format!("/messages/{}", encode_segment(message_id));
        self.delete(&path).await?;
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<Contact>> {
        let users: Vec<BackendUser> = self
            .get_list("/users/search", &[("q", query)], "user search")
            .await?;
        Ok(users.into_iter().map(contact_from_user).collect())
    }
}
