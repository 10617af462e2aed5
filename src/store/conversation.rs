//! Conversation store: contacts, the active conversation and its messages.
//!
//! Message lists are fetched per selection. Each selection or refresh takes a
//! new token; a response is applied only while its token is still current, so
//! the last selection wins regardless of arrival order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use super::{with_timeout, StoreError};
use crate::api::ChatService;
use crate::attachment::EncodedAttachment;
use crate::models::{
    insert_chronological, sort_chronological, Contact, Message, MessageStatus,
    SendMessageRequest,
};
use crate::session::Session;

/// Load state of the active conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Error => "error",
        }
    }
}

/// Whether a fetch result made it into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer selection or refresh was issued while this one was in flight.
    Superseded,
}

/// Compose box contents: text plus attachments waiting to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachments: Vec<EncodedAttachment>,
}

impl Draft {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    /// Drop the parts of `sent` that are still in the draft.
    fn clear_sent(&mut self, sent: &Draft) {
        if self.text == sent.text {
            self.text.clear();
        }
        for attachment in &sent.attachments {
            if let Some(i) = self.attachments.iter().position(|a| a == attachment) {
                self.attachments.remove(i);
            }
        }
    }
}

/// Read-only copy of the store for rendering.
#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    pub contacts: Vec<Contact>,
    pub selected: Option<Contact>,
    pub messages: Vec<Message>,
    pub phase: Phase,
    /// Fetch/refresh failure; replaces the message list in the UI.
    pub error: Option<String>,
    /// Last send/delete failure; the thread stays usable.
    pub action_error: Option<String>,
    pub sending: bool,
    pub draft: Draft,
}

#[derive(Default)]
struct State {
    view: ConversationView,
    selection: u64,
}

pub struct ConversationStore {
    service: Arc<dyn ChatService>,
    session: Arc<Session>,
    timeout: Duration,
    state: Mutex<State>,
    revision: watch::Sender<u64>,
}

impl ConversationStore {
    pub fn new(service: Arc<dyn ChatService>, session: Arc<Session>, timeout: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            service,
            session,
            timeout,
            state: Mutex::new(State::default()),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn changed(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Revision counter, bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> ConversationView {
        self.lock().view.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().view.phase
    }

    /// Fetch the contact list, replacing the current one.
    pub async fn refresh_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        let contacts = with_timeout(self.timeout, self.service.list_contacts()).await?;
        tracing::debug!("Fetched {} contacts", contacts.len());
        self.lock().view.contacts = contacts.clone();
        self.changed();
        Ok(contacts)
    }

    /// Make `contact` the active conversation and load its messages.
    pub async fn select_contact(&self, contact: Contact) -> Result<FetchOutcome, StoreError> {
        let contact_id = contact.id.clone();
        let token = {
            let mut s = self.lock();
            s.selection += 1;
            s.view.selected = Some(contact);
            s.view.messages.clear();
            s.view.phase = Phase::Loading;
            s.view.error = None;
            s.view.action_error = None;
            s.selection
        };
        self.changed();
        self.load_messages(token, &contact_id).await
    }

    /// Re-fetch the active conversation. This is the retry path after an error.
    pub async fn refresh_messages(&self) -> Result<FetchOutcome, StoreError> {
        let (token, contact_id) = {
            let mut s = self.lock();
            let contact_id = s
                .view
                .selected
                .as_ref()
                .map(|c| c.id.clone())
                .ok_or(StoreError::NoContactSelected)?;
            s.selection += 1;
            s.view.phase = Phase::Loading;
            s.view.error = None;
            s.view.action_error = None;
            (s.selection, contact_id)
        };
        self.changed();
        self.load_messages(token, &contact_id).await
    }

    async fn load_messages(&self, token: u64, contact_id: &str) -> Result<FetchOutcome, StoreError> {
        let result = with_timeout(
            self.timeout,
            self.service
                .list_messages(self.session.user_id(), contact_id),
        )
        .await;

        let outcome = {
            let mut s = self.lock();
            if s.selection != token {
                tracing::debug!("Discarding stale messages for {}", contact_id);
                return Ok(FetchOutcome::Superseded);
            }
            match result {
                Ok(mut messages) => {
                    sort_chronological(&mut messages);
                    tracing::debug!("Loaded {} messages with {}", messages.len(), contact_id);
                    s.view.messages = messages;
                    s.view.phase = Phase::Ready;
                    Ok(FetchOutcome::Applied)
                }
                Err(e) => {
                    tracing::warn!("Failed to load messages with {}: {}", contact_id, e);
                    s.view.phase = Phase::Error;
                    s.view.error = Some(e.to_string());
                    Err(e)
                }
            }
        };
        self.changed();
        outcome
    }

    pub fn draft(&self) -> Draft {
        self.lock().view.draft.clone()
    }

    pub fn set_draft(&self, text: &str) {
        self.lock().view.draft.text = text.to_string();
        self.changed();
    }

    pub fn attach(&self, attachment: EncodedAttachment) {
        self.lock().view.draft.attachments.push(attachment);
        self.changed();
    }

    pub fn remove_attachment(&self, index: usize) -> Option<EncodedAttachment> {
        let removed = {
            let mut s = self.lock();
            let attachments = &mut s.view.draft.attachments;
            (index < attachments.len()).then(|| attachments.remove(index))
        };
        if removed.is_some() {
            self.changed();
        }
        removed
    }

    /// Send the draft to the active contact.
    pub async fn send_draft(&self) -> Result<Message, StoreError> {
        let (text, receiver_id) = {
            let s = self.lock();
            if s.view.draft.is_blank() {
                return Err(StoreError::EmptyMessage);
            }
            let receiver_id = s
                .view
                .selected
                .as_ref()
                .map(|c| c.id.clone())
                .ok_or(StoreError::NoContactSelected)?;
            (s.view.draft.text.clone(), receiver_id)
        };
        self.send_message(&text, &receiver_id).await
    }

    /// Send `content` plus the draft's attachments.
    ///
    /// The message is appended once the server confirms it, and what was sent
    /// is cleared from the draft; edits made while the send was in flight stay.
    /// On failure the draft is kept so the send can be retried.
    pub async fn send_message(
        &self,
        content: &str,
        receiver_id: &str,
    ) -> Result<Message, StoreError> {
        let (request, sent) = {
            let mut s = self.lock();
            if content.trim().is_empty() && s.view.draft.attachments.is_empty() {
                return Err(StoreError::EmptyMessage);
            }
            if s.view.selected.is_none() {
                return Err(StoreError::NoContactSelected);
            }
            if s.view.sending {
                return Err(StoreError::SendInFlight);
            }
            s.view.sending = true;
            s.view.action_error = None;
            let sent = s.view.draft.clone();
            let request = SendMessageRequest {
                content: content.trim().to_string(),
                receiver_id: receiver_id.to_string(),
                attachments: s
                    .view
                    .draft
                    .attachments
                    .iter()
                    .map(EncodedAttachment::to_payload)
                    .collect(),
            };
            (request, sent)
        };
        self.changed();

        let result = with_timeout(self.timeout, self.service.send_message(&request)).await;

        {
            let mut s = self.lock();
            s.view.sending = false;
            match result {
                Ok(ref message) => {
                    let active = s
                        .view
                        .selected
                        .as_ref()
                        .is_some_and(|c| c.id == receiver_id);
                    if active {
                        insert_chronological(&mut s.view.messages, message.clone());
                    }
                    s.view.draft.clear_sent(&sent);
                }
                Err(ref e) => {
                    tracing::warn!("Send to {} failed: {}", receiver_id, e);
                    s.view.action_error = Some(e.to_string());
                }
            }
        }
        self.changed();
        result
    }

    /// Delete a message once the server confirms.
    pub async fn delete_message(&self, message_id: &str) -> Result<(), StoreError> {
        let known = self
            .lock()
            .view
            .messages
            .iter()
            .any(|m| m.id == message_id);
        if !known {
            return Err(StoreError::NotFound(format!("message {}", message_id)));
        }

        let result = with_timeout(self.timeout, self.service.delete_message(message_id)).await;

        {
            let mut s = self.lock();
            match result {
                Ok(()) => {
                    s.view.messages.retain(|m| m.id != message_id);
                    s.view.action_error = None;
                }
                Err(ref e) => {
                    tracing::warn!("Delete of message {} failed: {}", message_id, e);
                    s.view.action_error = Some(e.to_string());
                }
            }
        }
        self.changed();
        result
    }

    /// Users matching `query`, excluding the session user. Blank queries match nobody.
    pub async fn search_users_for_new_chat(&self, query: &str) -> Result<Vec<Contact>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let users = with_timeout(self.timeout, self.service.search_users(query)).await?;
        Ok(users
            .into_iter()
            .filter(|u| u.id != self.session.user_id())
            .collect())
    }

    /// Add `user` to the contacts if needed and switch to that conversation.
    pub async fn start_new_conversation(&self, user: Contact) -> Result<FetchOutcome, StoreError> {
        {
            let mut s = self.lock();
            if !s.view.contacts.iter().any(|c| c.id == user.id) {
                tracing::debug!("Starting new conversation with {}", user.id);
                s.view.contacts.insert(0, user.clone());
            }
        }
        self.select_contact(user).await
    }

    /// Messages from the active contact that have not been read.
    pub fn unread_count(&self) -> usize {
        let s = self.lock();
        let Some(ref contact) = s.view.selected else {
            return 0;
        };
        s.view
            .messages
            .iter()
            .filter(|m| m.sender_id == contact.id && m.status != MessageStatus::Read)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::attachment::encode_bytes;
    use crate::store::fakes::{contact, message, session, FakeChat, ME};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn store(chat: FakeChat) -> (ConversationStore, Arc<FakeChat>) {
        let chat = Arc::new(chat);
        let store = ConversationStore::new(chat.clone(), session(), TIMEOUT);
        (store, chat)
    }

    #[tokio::test]
    async fn test_select_loads_sorted_messages() {
        let (store, _) = store(FakeChat::default().with_conversation(
            "a",
            vec![message("2", "a", 20), message("1", ME, 10)],
        ));
        assert_eq!(store.phase(), Phase::Idle);

        let outcome = store.select_contact(contact("a")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied);

        let view = store.snapshot();
        assert_eq!(view.phase, Phase::Ready);
        let ids: Vec<&str> = view.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[tokio::test]
    async fn test_late_response_for_old_selection_is_discarded() {
        let (store, chat) = store(
            FakeChat::default()
                .with_conversation("a", vec![message("a1", "a", 1)])
                .with_conversation("b", vec![message("b1", "b", 1)]),
        );
        let gate_a = chat.hold_fetch("a");

        let (first, second) = tokio::join!(store.select_contact(contact("a")), async {
            let outcome = store.select_contact(contact("b")).await;
            gate_a.notify_one();
            outcome
        });

        assert_eq!(first.unwrap(), FetchOutcome::Superseded);
        assert_eq!(second.unwrap(), FetchOutcome::Applied);

        let view = store.snapshot();
        assert_eq!(view.selected.unwrap().id, "b");
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].id, "b1");
        assert_eq!(view.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_conversation_error_and_refresh_retries() {
        let (store, chat) = store(
            FakeChat::default().with_conversation("a", vec![message("a1", "a", 1)]),
        );
        chat.fail_fetch.store(true, Ordering::SeqCst);

        let err = store.select_contact(contact("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
        let view = store.snapshot();
        assert_eq!(view.phase, Phase::Error);
        assert!(view.error.is_some());

        chat.fail_fetch.store(false, Ordering::SeqCst);
        store.refresh_messages().await.unwrap();
        let view = store.snapshot();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
        assert_eq!(view.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_selection() {
        let (store, chat) = store(FakeChat::default());
        assert_eq!(
            store.refresh_messages().await,
            Err(StoreError::NoContactSelected)
        );
        assert_eq!(chat.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_send_is_a_no_op() {
        let (store, chat) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();

        assert_eq!(store.send_message("", "a").await, Err(StoreError::EmptyMessage));
        assert_eq!(
            store.send_message("   \n", "a").await,
            Err(StoreError::EmptyMessage)
        );
        assert_eq!(chat.send_calls.load(Ordering::SeqCst), 0);
        assert!(store.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_selection() {
        let (store, chat) = store(FakeChat::default());
        assert_eq!(
            store.send_message("hi", "a").await,
            Err(StoreError::NoContactSelected)
        );
        assert_eq!(chat.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_appends_and_clears_draft() {
        let (store, chat) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();
        store.set_draft("  hello there ");
        store.attach(encode_bytes("notes.txt", b"abc", 1024).unwrap());

        let sent = store.send_draft().await.unwrap();
        assert_eq!(sent.content, "hello there");
        assert_eq!(sent.attachments.len(), 1);
        assert_eq!(sent.attachments[0].url, "data:text/plain;base64,YWJj");

        let view = store.snapshot();
        assert_eq!(view.messages, vec![sent]);
        assert_eq!(view.draft, Draft::default());
        assert!(!view.sending);

        let requests = chat.sent.lock().unwrap();
        assert_eq!(requests[0].receiver_id, "a");
        assert_eq!(requests[0].attachments[0].file_name, "notes.txt");
    }

    #[tokio::test]
    async fn test_attachment_only_send_is_allowed() {
        let (store, _) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();
        store.attach(encode_bytes("logo.png", &[1, 2], 1024).unwrap());

        let sent = store.send_message("", "a").await.unwrap();
        assert_eq!(sent.content, "");
        assert_eq!(store.snapshot().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_draft_and_thread() {
        let (store, chat) = store(
            FakeChat::default().with_conversation("a", vec![message("a1", "a", 1)]),
        );
        store.select_contact(contact("a")).await.unwrap();
        store.set_draft("keep me");
        store.attach(encode_bytes("a.txt", b"x", 1024).unwrap());
        chat.fail_send.store(true, Ordering::SeqCst);

        assert!(store.send_draft().await.is_err());

        let view = store.snapshot();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
        assert!(view.action_error.is_some());
        assert_eq!(view.draft.text, "keep me");
        assert_eq!(view.draft.attachments.len(), 1);
        assert_eq!(view.messages.len(), 1);

        chat.fail_send.store(false, Ordering::SeqCst);
        store.send_draft().await.unwrap();
        let view = store.snapshot();
        assert_eq!(view.action_error, None);
        assert_eq!(view.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_send_is_rejected() {
        let (store, chat) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();
        let gate = chat.hold_send();

        let (first, second) = tokio::join!(store.send_message("one", "a"), async {
            let second = store.send_message("two", "a").await;
            gate.notify_one();
            second
        });

        assert!(first.is_ok());
        assert_eq!(second, Err(StoreError::SendInFlight));
        assert_eq!(chat.send_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_edits_during_send_stay_in_draft() {
        let (store, chat) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();
        store.set_draft("first");
        let gate = chat.hold_send();

        let (sent, ()) = tokio::join!(store.send_draft(), async {
            tokio::task::yield_now().await;
            assert!(store.snapshot().sending);
            store.set_draft("second, typed while sending");
            store.attach(encode_bytes("later.pdf", b"%PDF", 1024).unwrap());
            gate.notify_one();
        });

        let sent = sent.unwrap();
        assert_eq!(sent.content, "first");
        assert!(sent.attachments.is_empty());
        let draft = store.draft();
        assert_eq!(draft.text, "second, typed while sending");
        assert_eq!(draft.attachments.len(), 1);
        assert_eq!(draft.attachments[0].file_name, "later.pdf");
    }

    #[tokio::test]
    async fn test_only_sent_attachments_leave_draft() {
        let (store, chat) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();
        store.attach(encode_bytes("one.txt", b"1", 1024).unwrap());
        let gate = chat.hold_send();

        let (sent, ()) = tokio::join!(store.send_message("", "a"), async {
            tokio::task::yield_now().await;
            store.attach(encode_bytes("two.txt", b"2", 1024).unwrap());
            gate.notify_one();
        });

        assert_eq!(sent.unwrap().attachments[0].file_name, "one.txt");
        let names: Vec<String> = store
            .draft()
            .attachments
            .into_iter()
            .map(|a| a.file_name)
            .collect();
        assert_eq!(names, ["two.txt"]);
    }

    #[tokio::test]
    async fn test_refresh_clears_stale_action_error() {
        let (store, chat) = store(
            FakeChat::default().with_conversation("a", vec![message("a1", "a", 1)]),
        );
        store.select_contact(contact("a")).await.unwrap();
        chat.fail_delete.store(true, Ordering::SeqCst);
        assert!(store.delete_message("a1").await.is_err());
        assert!(store.snapshot().action_error.is_some());

        store.refresh_messages().await.unwrap();
        let view = store.snapshot();
        assert_eq!(view.action_error, None);
        assert_eq!(view.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_delete_after_confirmation_only() {
        let (store, chat) = store(FakeChat::default().with_conversation(
            "a",
            vec![message("a1", "a", 1), message("a2", ME, 2)],
        ));
        store.select_contact(contact("a")).await.unwrap();

        chat.fail_delete.store(true, Ordering::SeqCst);
        assert!(store.delete_message("a2").await.is_err());
        let view = store.snapshot();
        assert_eq!(view.messages.len(), 2);
        assert!(view.action_error.is_some());
        assert_eq!(view.phase, Phase::Ready);

        chat.fail_delete.store(false, Ordering::SeqCst);
        store.delete_message("a2").await.unwrap();
        let ids: Vec<String> = store.snapshot().messages.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["a1"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_message() {
        let (store, chat) = store(FakeChat::default());
        store.select_contact(contact("a")).await.unwrap();
        assert!(matches!(
            store.delete_message("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(chat.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_and_start_new_conversation() {
        let chat = FakeChat::default()
            .with_conversation("z", vec![message("z1", "z", 1)]);
        {
            let mut directory = chat.directory.lock().unwrap();
            directory.push(contact("z"));
            directory.push(contact(ME));
        }
        chat.contacts.lock().unwrap().push(contact("a"));
        let (store, chat) = store(chat);
        store.refresh_contacts().await.unwrap();

        assert!(store.search_users_for_new_chat("  ").await.unwrap().is_empty());
        assert_eq!(chat.search_calls.load(Ordering::SeqCst), 0);

        let found = store.search_users_for_new_chat("contact").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "z");

        store
            .start_new_conversation(found[0].clone())
            .await
            .unwrap();
        let view = store.snapshot();
        let ids: Vec<&str> = view.contacts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["z", "a"]);
        assert_eq!(view.selected.unwrap().id, "z");
        assert_eq!(view.messages[0].id, "z1");

        // Starting again does not duplicate the contact
        store.start_new_conversation(contact("z")).await.unwrap();
        assert_eq!(store.snapshot().contacts.len(), 2);
    }

    #[tokio::test]
    async fn test_unread_count() {
        let mut read = message("a2", "a", 2);
        read.status = MessageStatus::Read;
        let (store, _) = store(FakeChat::default().with_conversation(
            "a",
            vec![message("a1", "a", 1), read, message("a3", ME, 3)],
        ));
        assert_eq!(store.unread_count(), 0);
        store.select_contact(contact("a")).await.unwrap();
        assert_eq!(store.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_revision_bumps_on_change() {
        let (store, _) = store(FakeChat::default());
        let mut rx = store.subscribe();
        let before = *rx.borrow_and_update();
        store.set_draft("x");
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow() > before);
    }

    #[tokio::test]
    async fn test_remove_attachment() {
        let (store, _) = store(FakeChat::default());
        store.attach(encode_bytes("a.txt", b"a", 10).unwrap());
        assert!(store.remove_attachment(3).is_none());
        assert_eq!(store.remove_attachment(0).unwrap().file_name, "a.txt");
        assert!(store.draft().attachments.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_reported() {
        let chat = FakeChat::default();
        let _gate = chat.hold_fetch("a");
        let chat = Arc::new(chat);
        let limit = Duration::from_millis(20);
        let store = ConversationStore::new(chat, session(), limit);

        let err = store.select_contact(contact("a")).await.unwrap_err();
        assert_eq!(err, StoreError::Timeout(limit));
        assert_eq!(store.phase(), Phase::Error);
    }
}
