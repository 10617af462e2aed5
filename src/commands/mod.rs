//! Command implementations: wire the stores to the REST client and print results.

pub mod chat;
pub mod feed;

use std::sync::Arc;

use anyhow::Result;

use crate::api::PortalClient;
use crate::config::Config;
use crate::session::Session;
use crate::store::{CommentCache, ConversationStore};

/// Everything a command needs for one signed-in session.
pub struct App {
    pub config: Config,
    pub client: Arc<PortalClient>,
    pub session: Arc<Session>,
}

impl App {
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        let client = Arc::new(PortalClient::from_config(&config)?);
        let session = Session::from_config(&config)?;
        Ok(Self {
            config,
            client,
            session,
        })
    }

    pub fn conversations(&self) -> ConversationStore {
        ConversationStore::new(
            self.client.clone(),
            Arc::clone(&self.session),
            self.config.request_timeout(),
        )
    }

    pub fn comments(&self) -> CommentCache {
        CommentCache::new(
            self.client.clone(),
            Arc::clone(&self.session),
            self.config.request_timeout(),
        )
    }
}

/// Shorten `text` to at most `max` characters, adding "..." when cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
