//! Authentication for the portal backend
//!
//! The portal issues bearer tokens through its web login; this module stores
//! one, resolves the user it belongs to and keeps both in the config file.

pub mod tokens;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};

use crate::api::{self, PortalClient};
use crate::config::Config;

pub use tokens::{StoredToken, TokenStore};

/// Store `token`, verify it against `/auth/me` and remember the user.
pub async fn login(url: Option<&str>, token: &str, expires_in: Option<u64>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = url {
        config.set_base_url(url)?;
    }
    config.set_access_token(token.trim().to_string(), expires_in);

    let client = PortalClient::from_config(&config)?;
    let me = api::current_user(&client)
        .await
        .context("Login failed: token was not accepted")?;
    tracing::info!("Authenticated as {} ({})", me.name, me.id);

    println!("Logged in as {} <{}>", me.name, me.email);
    config.set_user(me.into());
    config.save()?;
    Ok(())
}

/// Forget the stored token and session user.
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Show what is stored locally, without contacting the backend.
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("\nPortal: {}", config.base_url.as_deref().unwrap_or("(not set)"));
    match config.user {
        Some(ref user) => println!("User:   {} <{}> ({})", user.name, user.email, user.id),
        None => println!("User:   (not logged in)"),
    }
    match config.get_access_token() {
        None => println!("Token:  (none)"),
        Some(token) if token.is_expired() => println!("Token:  expired"),
        Some(token) => match token.expires_at.and_then(|t| Utc.timestamp_opt(t, 0).single()) {
            Some(at) => println!("Token:  valid until {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => println!("Token:  valid (no expiry)"),
        },
    }
    println!("Request timeout: {}s", config.request_timeout().as_secs());

    Ok(())
}
