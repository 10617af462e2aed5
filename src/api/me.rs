//! Current user endpoint (/auth/me)

use anyhow::{Context, Result};

use super::client::PortalClient;
use crate::models::{contact_from_user, BackendUser, Contact};

/// Fetch the user the token belongs to.
pub async fn current_user(client: &PortalClient) -> Result<Contact> {
    let user: BackendUser = client
        .get_json("/auth/me", "/auth/me")
        .await
        .context("Could not resolve the current user")?;
    Ok(contact_from_user(user))
}

/// Fetch and display current user info.
pub async fn whoami() -> Result<()> {
    let client = PortalClient::new()?;
    let me = current_user(&client).await?;

    println!();
    println!("Name:  {}", me.name);
    println!(
        "Email: {}",
        if me.email.is_empty() { "(none)" } else { &me.email }
    );
    println!("Role:  {}", me.role);
    if let Some(ref user_type) = me.user_type {
        println!("Type:  {}", user_type);
    }
    println!("ID:    {}", me.id);

    Ok(())
}
