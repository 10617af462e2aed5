//! Session user passed explicitly to the stores

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::Contact;

/// The authenticated user, as persisted in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<Contact> for SessionUser {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            name: contact.name,
            email: contact.email,
        }
    }
}

/// Application state for one signed-in session.
///
/// Shared by reference with every store; dropped when the session ends.
#[derive(Debug)]
pub struct Session {
    user: SessionUser,
}

impl Session {
    pub fn start(user: SessionUser) -> Arc<Self> {
        tracing::debug!("Session started for {}", user.id);
        Arc::new(Self { user })
    }

    /// Start a session for the user recorded at login.
    pub fn from_config(config: &Config) -> Result<Arc<Self>> {
        let user = config
            .user
            .clone()
            .context("No session user. Run 'portal login' first.")?;
        Ok(Self::start(user))
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}
