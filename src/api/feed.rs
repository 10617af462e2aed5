//! Feed endpoints (`/postings`, `/postings/{id}/comments`)

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::client::{encode_segment, PortalClient};
use super::FeedService;
use crate::models::{Posting, PostingComment};

#[async_trait]
impl FeedService for PortalClient {
    async fn list_postings(&self, page: u32, limit: u32) -> Result<Vec<Posting>> {
        let page = page.to_string();
        let limit = limit.to_string();
        self.get_list(
            "/postings",
            &[("page", page.as_str()), ("limit", limit.as_str())],
            "postings",
        )
        .await
    }

    async fn get_posting(&self, posting_id: &str) -> Result<Posting> {
        let path = format!("/postings/{}", encode_segment(posting_id));
        self.get_json(&path, "posting").await
    }

    async fn list_comments(&self, posting_id: &str) -> Result<Vec<PostingComment>> {
        let path = format!("/postings/{}/comments", encode_segment(posting_id));
        self.get_list(&path, &[], "comments").await
    }

    async fn create_comment(&self, posting_id: &str, content: &str) -> Result<PostingComment> {
        let path = format!("/postings/{}/comments", encode_segment(posting_id));
        let body = serde_json::json!({ "content": content });
        self.post(&path, &body)
            .await?
            .json()
            .await
            .context("Failed to parse created comment")
    }

    async fn delete_comment(&self, posting_id: &str, comment_id: &str) -> Result<()> {
        let path = format!(
            "/postings/{}/comments/{}",
            encode_segment(posting_id),
            encode_segment(comment_id)
        );
        self.delete(&path).await?;
        Ok(())
    }
}
