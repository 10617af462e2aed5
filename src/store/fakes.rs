//! In-memory services for store tests.
//!
//! Calls can be held on a gate (`tokio::sync::Notify`) so tests decide the
//! order in which responses arrive.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use crate::api::{ChatService, FeedService, HttpError};
use crate::models::{
    Attachment, CommentAuthor, Contact, Message, MessageStatus, PostAuthor, Posting,
    PostingComment, PostingCounts, SendMessageRequest,
};
use crate::session::{Session, SessionUser};

pub const ME: &str = "me";

pub fn session() -> Arc<Session> {
    Session::start(SessionUser {
        id: ME.to_string(),
        name: "Me".to_string(),
        email: "me@example.com".to_string(),
    })
}

pub fn contact(id: &str) -> Contact {
    Contact {
        id: id.to_string(),
        name: format!("Contact {}", id),
        email: format!("{}@example.com", id),
        role: "USER".to_string(),
        user_type: None,
    }
}

pub fn message(id: &str, sender: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        content: format!("message {}", id),
        sender_id: sender.to_string(),
        receiver_id: None,
        created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        status: MessageStatus::Delivered,
        attachments: vec![],
    }
}

pub fn comment(id: &str, posting_id: &str, user_id: &str) -> PostingComment {
    PostingComment {
        id: id.to_string(),
        posting_id: posting_id.to_string(),
        user_id: user_id.to_string(),
        user: CommentAuthor {
            name: Some(format!("User {}", user_id)),
            email: None,
        },
        content: format!("comment {}", id),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

pub fn posting(id: &str, owner: &str, count: Option<usize>) -> Posting {
    let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    Posting {
        id: id.to_string(),
        title: format!("Posting {}", id),
        content: String::new(),
        post_type: "ANNOUNCEMENT".to_string(),
        is_published: true,
        created_at: at,
        updated_at: at,
        organization: None,
        created_by: Some(PostAuthor {
            id: owner.to_string(),
            name: None,
            email: None,
        }),
        attachments: vec![],
        comments: None,
        counts: count.map(|n| PostingCounts { comments: Some(n) }),
    }
}

#[derive(Default)]
struct Gates(Mutex<HashMap<String, Arc<Notify>>>);

impl Gates {
    fn hold(&self, key: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.0
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::clone(&notify));
        notify
    }

    async fn pass(&self, key: &str) {
        let gate = self.0.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[derive(Default)]
pub struct FakeChat {
    pub contacts: Mutex<Vec<Contact>>,
    pub conversations: Mutex<HashMap<String, Vec<Message>>>,
    pub directory: Mutex<Vec<Contact>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub fail_fetch: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    gates: Gates,
    next_id: AtomicUsize,
}

impl FakeChat {
    pub fn with_conversation(self, contact_id: &str, messages: Vec<Message>) -> Self {
        self.conversations
            .lock()
            .unwrap()
            .insert(contact_id.to_string(), messages);
        self
    }

    /// Hold `list_messages` for this contact until the returned gate is notified.
    pub fn hold_fetch(&self, contact_id: &str) -> Arc<Notify> {
        self.gates.hold(&format!("fetch:{}", contact_id))
    }

    pub fn hold_send(&self) -> Arc<Notify> {
        self.gates.hold("send")
    }
}

#[async_trait]
impl ChatService for FakeChat {
    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn list_messages(&self, current_user_id: &str, contact_id: &str) -> Result<Vec<Message>> {
        assert_eq!(current_user_id, ME);
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.gates.pass(&format!("fetch:{}", contact_id)).await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(contact_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(request.clone());
        self.gates.pass("send").await;
        if self.fail_send.load(Ordering::SeqCst) {
            bail!("send rejected");
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("sent-{}", n);
        Ok(Message {
            attachments: request
                .attachments
                .iter()
                .enumerate()
                .map(|(i, a)| Attachment {
                    id: format!("{}-a{}", id, i),
                    url: a.url.clone(),
                    file_name: a.file_name.clone(),
                    file_type: a.file_type.clone(),
                    size: a.size,
                    message_id: Some(id.clone()),
                    posting_id: None,
                })
                .collect(),
            id,
            content: request.content.clone(),
            sender_id: ME.to_string(),
            receiver_id: Some(request.receiver_id.clone()),
            created_at: Utc::now(),
            status: MessageStatus::Sent,
        })
    }

    async fn delete_message(&self, _message_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            bail!("delete rejected");
        }
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<Contact>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let query = query.to_lowercase();
        Ok(self
            .directory
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeFeed {
    pub postings: Mutex<Vec<Posting>>,
    pub comments: Mutex<HashMap<String, Vec<PostingComment>>>,
    pub failing_posts: Mutex<HashSet<String>>,
    pub fail_create: AtomicBool,
    pub forbid_delete: AtomicBool,
    pub list_calls: Mutex<HashMap<String, usize>>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    gates: Gates,
    next_id: AtomicUsize,
}

impl FakeFeed {
    pub fn with_comments(self, posting_id: &str, comments: Vec<PostingComment>) -> Self {
        self.comments
            .lock()
            .unwrap()
            .insert(posting_id.to_string(), comments);
        self
    }

    pub fn fail_list(&self, posting_id: &str) {
        self.failing_posts
            .lock()
            .unwrap()
            .insert(posting_id.to_string());
    }

    pub fn hold_list(&self, posting_id: &str) -> Arc<Notify> {
        self.gates.hold(&format!("list:{}", posting_id))
    }

    pub fn list_calls(&self, posting_id: &str) -> usize {
        self.list_calls
            .lock()
            .unwrap()
            .get(posting_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl FeedService for FakeFeed {
    async fn list_postings(&self, page: u32, limit: u32) -> Result<Vec<Posting>> {
        let skip = (page.saturating_sub(1) * limit) as usize;
        Ok(self
            .postings
            .lock()
            .unwrap()
            .iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_posting(&self, posting_id: &str) -> Result<Posting> {
        match self
            .postings
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == posting_id)
        {
            Some(p) => Ok(p.clone()),
            None => bail!("HTTP 404 for /postings/{}", posting_id),
        }
    }

    async fn list_comments(&self, posting_id: &str) -> Result<Vec<PostingComment>> {
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(posting_id.to_string())
            .or_default() += 1;
        // The response reflects the list as it was when the request arrived
        let snapshot = self
            .comments
            .lock()
            .unwrap()
            .get(posting_id)
            .cloned()
            .unwrap_or_default();
        self.gates.pass(&format!("list:{}", posting_id)).await;
        if self.failing_posts.lock().unwrap().contains(posting_id) {
            bail!("comments unavailable");
        }
        Ok(snapshot)
    }

    async fn create_comment(&self, posting_id: &str, content: &str) -> Result<PostingComment> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("create rejected");
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut created = comment(&format!("new-{}", n), posting_id, ME);
        created.content = content.to_string();
        self.comments
            .lock()
            .unwrap()
            .entry(posting_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_comment(&self, posting_id: &str, comment_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.forbid_delete.load(Ordering::SeqCst) {
            return Err(HttpError::Forbidden {
                url: format!("/postings/{}/comments/{}", posting_id, comment_id),
                body: "only the author or post owner may delete".to_string(),
            }
            .into());
        }
        if let Some(list) = self.comments.lock().unwrap().get_mut(posting_id) {
            list.retain(|c| c.id != comment_id);
        }
        Ok(())
    }
}
