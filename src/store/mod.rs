//! Client-side state for the chat and feed features.
//!
//! Stores own their state behind a mutex that is never held across an await,
//! so several operations can be in flight on one store at a time. Every state
//! change bumps a revision published on a `watch` channel.

pub mod comments;
pub mod conversation;

#[cfg(test)]
mod fakes;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::api::HttpError;

pub use comments::CommentCache;
pub use conversation::{ConversationStore, ConversationView, Phase};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message is empty and has no attachment")]
    EmptyMessage,
    #[error("no contact selected")]
    NoContactSelected,
    #[error("a message is already being sent")]
    SendInFlight,
    #[error("comment is empty")]
    EmptyComment,
    #[error("not allowed to delete comment {0}")]
    NotPermitted(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("{0}")]
    Network(String),
}

impl StoreError {
    /// Classify an API failure.
    pub fn from_api(err: anyhow::Error) -> Self {
        match err.downcast_ref::<HttpError>() {
            Some(HttpError::Forbidden { body, .. }) => StoreError::Forbidden(body.clone()),
            Some(http) => {
                tracing::debug!("Portal answered HTTP {}", http.status());
                StoreError::Network(format!("{:#}", err))
            }
            None => StoreError::Network(format!("{:#}", err)),
        }
    }

    /// Input was rejected before any request was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::EmptyMessage
                | StoreError::NoContactSelected
                | StoreError::SendInFlight
                | StoreError::EmptyComment
                | StoreError::NotPermitted(_)
                | StoreError::NotFound(_)
        )
    }
}

/// Run an API call under the client-side timeout.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StoreError::from_api(e)),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
