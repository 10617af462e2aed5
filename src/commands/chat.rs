//! Chat commands: contacts, reading, sending and deleting messages.

use std::path::PathBuf;

use anyhow::{bail, Result};

use super::{truncate, App};
use crate::attachment::{self, AttachmentError};
use crate::models::{Contact, Message};
use crate::session::Session;
use crate::store::{ConversationStore, ConversationView, Phase};

/// Resolve a contact id from the contact list, falling back to user search.
async fn find_contact(store: &ConversationStore, contact_id: &str) -> Result<Contact> {
    let contacts = store.refresh_contacts().await?;
    if let Some(contact) = contacts.into_iter().find(|c| c.id == contact_id) {
        return Ok(contact);
    }
    let found = store.search_users_for_new_chat(contact_id).await?;
    match found.into_iter().find(|c| c.id == contact_id) {
        Some(contact) => Ok(contact),
        None => bail!("Unknown contact: {}", contact_id),
    }
}

fn sender_name<'a>(message: &Message, view: &'a ConversationView, session: &'a Session) -> &'a str {
    if message.sender_id == session.user_id() {
        return "you";
    }
    match view.selected {
        Some(ref c) if c.id == message.sender_id => &c.name,
        _ => "?",
    }
}

fn print_conversation(view: &ConversationView, session: &Session) {
    let Some(ref contact) = view.selected else {
        return;
    };
    println!("\nConversation with {} <{}>", contact.name, contact.email);
    println!("{:-<60}", "");

    if let Some(ref err) = view.error {
        println!("  Could not load messages: {}", err);
        return;
    }
    if view.messages.is_empty() {
        println!("  (no messages)");
        return;
    }

    for msg in &view.messages {
        println!(
            "[{}] {}: {}  ({}, {})",
            msg.created_at.format("%Y-%m-%d %H:%M"),
            sender_name(msg, view, session),
            msg.content,
            msg.status.as_str(),
            msg.id
        );
        for att in &msg.attachments {
            let location = match attachment::parse_data_uri(&att.url) {
                Ok((mime, _)) => format!("embedded {}", mime),
                Err(_) => truncate(&att.url, 50),
            };
            println!(
                "    [file] {} ({}, {})",
                att.file_name,
                attachment::human_size(att.size),
                location
            );
        }
    }
}

/// List contacts.
pub async fn list_contacts() -> Result<()> {
    let app = App::load()?;
    let store = app.conversations();
    let contacts = store.refresh_contacts().await?;

    println!("\nContacts:");
    println!("{:-<60}", "");

    if contacts.is_empty() {
        println!("  (no contacts)");
        return Ok(());
    }

    for contact in &contacts {
        let user_type = contact.user_type.as_deref().unwrap_or("-");
        println!("{}  <{}>", contact.name, contact.email);
        println!("  ID: {}  Role: {}  Type: {}", contact.id, contact.role, user_type);
    }

    Ok(())
}

/// Print the conversation with one contact.
pub async fn read_messages(contact_id: &str) -> Result<()> {
    let app = App::load()?;
    let store = app.conversations();
    let contact = find_contact(&store, contact_id).await?;
    let updates = store.subscribe();

    let mut result = store.select_contact(contact).await;
    if store.phase() == Phase::Error {
        tracing::info!("Loading messages failed, retrying once...");
        result = store.refresh_messages().await;
    }
    tracing::debug!(
        "Conversation {} after {} update(s)",
        store.phase().as_str(),
        *updates.borrow()
    );
    print_conversation(&store.snapshot(), &app.session);
    result?;

    let unread = store.unread_count();
    if unread > 0 {
        println!("\n{} unread", unread);
    }
    Ok(())
}

/// Send a message with optional attachments.
///
/// Attachments that fail to encode are reported and left out; the rest are sent.
pub async fn send_message(to: &str, message: &str, attachments: &[PathBuf]) -> Result<()> {
    let app = App::load()?;
    let store = app.conversations();
    let contact = find_contact(&store, to).await?;
    store.select_contact(contact).await?;

    if !attachments.is_empty() {
        let outcome = attachment::encode_batch(attachments, app.config.attachment_limit()).await;
        if outcome.is_partial() {
            for failure in &outcome.failures {
                eprintln!("Skipped attachment: {}", failure);
            }
            let skipped: Vec<&str> = outcome
                .failures
                .iter()
                .filter_map(AttachmentError::file_name)
                .collect();
            tracing::warn!("Sending without {}", skipped.join(", "));
        }
        for encoded in outcome.encoded {
            store.attach(encoded);
        }
    }

    // The same file given twice is sent once
    let draft = store.draft();
    for (i, att) in draft.attachments.iter().enumerate().rev() {
        if draft.attachments[..i].contains(att) {
            store.remove_attachment(i);
            eprintln!("Skipped duplicate attachment: {}", att.file_name);
        }
    }

    store.set_draft(message);
    let sent = match store.send_draft().await {
        Ok(sent) => sent,
        Err(e) if e.is_validation() => bail!("Nothing sent: {}", e),
        Err(e) => return Err(e.into()),
    };
    println!(
        "Message sent ({}, {} attachment(s)).",
        sent.id,
        sent.attachments.len()
    );
    Ok(())
}

/// Delete one of the messages in a conversation.
pub async fn delete_message(contact_id: &str, message_id: &str) -> Result<()> {
    let app = App::load()?;
    let store = app.conversations();
    let contact = find_contact(&store, contact_id).await?;
    store.select_contact(contact).await?;

    store.delete_message(message_id).await?;
    println!("Message deleted.");
    Ok(())
}

/// Search users to start a conversation with.
pub async fn search_users(query: &str) -> Result<()> {
    let app = App::load()?;
    let store = app.conversations();
    let users = store.search_users_for_new_chat(query).await?;

    if users.is_empty() {
        println!("(no users match '{}')", query.trim());
        return Ok(());
    }
    for user in &users {
        println!("{:<30} {:<30} {}", user.name, user.email, user.id);
    }
    Ok(())
}

/// Start a conversation with the first user matching `query`.
pub async fn start_conversation(query: &str) -> Result<()> {
    let app = App::load()?;
    let store = app.conversations();
    store.refresh_contacts().await?;

    let Some(user) = store.search_users_for_new_chat(query).await?.into_iter().next() else {
        bail!("No user matches '{}'", query.trim());
    };
    tracing::info!("Opening conversation with {}", user.name);

    let result = store.start_new_conversation(user).await;
    print_conversation(&store.snapshot(), &app.session);
    result?;
    Ok(())
}
