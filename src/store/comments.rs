//! Comment cache: per-posting comment lists, counts and expand state.
//!
//! All posting-keyed state lives in one map owned by the cache and changes
//! only through its operations. For a posting whose list has been fetched the
//! count always equals the list length; before that it is the backend's
//! `_count.comments`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::watch;

use super::{with_timeout, StoreError};
use crate::api::FeedService;
use crate::models::{Posting, PostingComment};
use crate::session::Session;

type CommentFetch = Shared<BoxFuture<'static, Result<Vec<PostingComment>, StoreError>>>;

#[derive(Debug, Default)]
struct PostEntry {
    comments: Option<Vec<PostingComment>>,
    /// `comments` holds the server's full list, not just local additions.
    fetched: bool,
    count: Option<usize>,
    loading: bool,
    error: Option<String>,
    expanded: bool,
    owner_id: Option<String>,
    /// Creates and deletes confirmed while a fetch was in flight. The fetched
    /// list may predate them, so they are replayed on top of it.
    created_during_fetch: Vec<PostingComment>,
    deleted_during_fetch: HashSet<String>,
}

impl PostEntry {
    fn displayed_count(&self) -> usize {
        self.count
            .or_else(|| self.comments.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    /// Replace the list with a fetched one, keeping local changes the
    /// response may not include yet.
    fn apply_fetched(&mut self, mut comments: Vec<PostingComment>) {
        let deleted = std::mem::take(&mut self.deleted_during_fetch);
        comments.retain(|c| !deleted.contains(&c.id));
        for created in std::mem::take(&mut self.created_during_fetch) {
            if !deleted.contains(&created.id) && !comments.iter().any(|c| c.id == created.id) {
                comments.push(created);
            }
        }
        self.count = Some(comments.len());
        self.comments = Some(comments);
        self.fetched = true;
        self.error = None;
    }
}

/// Read-only copy of one posting's comment state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostCommentsView {
    pub comments: Vec<PostingComment>,
    pub count: usize,
    pub loading: bool,
    pub error: Option<String>,
    pub expanded: bool,
    pub fetched: bool,
}

#[derive(Default)]
struct CacheState {
    posts: HashMap<String, PostEntry>,
    in_flight: HashMap<String, CommentFetch>,
}

pub struct CommentCache {
    service: Arc<dyn FeedService>,
    session: Arc<Session>,
    timeout: Duration,
    state: Mutex<CacheState>,
    revision: watch::Sender<u64>,
}

impl CommentCache {
    pub fn new(service: Arc<dyn FeedService>, session: Arc<Session>, timeout: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            service,
            session,
            timeout,
            state: Mutex::new(CacheState::default()),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn changed(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Record a posting's owner and backend comment count.
    pub fn register_posting(&self, posting: &Posting) {
        {
            let mut s = self.lock();
            let entry = s.posts.entry(posting.id.clone()).or_default();
            entry.owner_id = posting.owner_id().map(String::from);
            if !entry.fetched {
                if let Some(n) = posting.comment_count() {
                    entry.count = Some(n);
                }
            }
        }
        self.changed();
    }

    /// Register a loaded page of postings and prefetch their comments.
    ///
    /// Failures are logged and otherwise ignored; they never set a posting's
    /// error. Returns how many postings were fetched successfully.
    pub async fn warm_up(&self, postings: &[Posting]) -> usize {
        for posting in postings {
            self.register_posting(posting);
        }

        let pending: Vec<&str> = {
            let s = self.lock();
            postings
                .iter()
                .filter(|p| !s.posts.get(&p.id).is_some_and(|e| e.fetched))
                .map(|p| p.id.as_str())
                .collect()
        };

        let results = join_all(pending.iter().map(|id| self.fetch(id, false))).await;
        let loaded = results.iter().filter(|r| r.is_ok()).count();
        tracing::debug!(
            "Comment warm-up: {}/{} postings loaded",
            loaded,
            pending.len()
        );
        loaded
    }

    /// Fetch a posting's comments, joining a request already in flight.
    ///
    /// `explicit` fetches drive the loading flag and record failures;
    /// background ones do neither.
    async fn fetch(&self, posting_id: &str, explicit: bool) -> Result<(), StoreError> {
        let fetch = {
            let mut guard = self.lock();
            let s = &mut *guard;
            let entry = s.posts.entry(posting_id.to_string()).or_default();
            if explicit {
                entry.loading = true;
                entry.error = None;
            }
            match s.in_flight.get(posting_id) {
                Some(fetch) => {
                    tracing::debug!("Joining in-flight comment fetch for {}", posting_id);
                    fetch.clone()
                }
                None => {
                    let fetch = self.start_fetch(posting_id);
                    s.in_flight.insert(posting_id.to_string(), fetch.clone());
                    fetch
                }
            }
        };
        if explicit {
            self.changed();
        }

        let result = fetch.clone().await;

        {
            let mut guard = self.lock();
            let s = &mut *guard;
            // Every caller joined on `fetch` gets the same result; only the
            // first to finish applies it.
            let first = s
                .in_flight
                .get(posting_id)
                .is_some_and(|f| f.ptr_eq(&fetch));
            if first {
                s.in_flight.remove(posting_id);
            }
            let entry = s.posts.entry(posting_id.to_string()).or_default();
            if explicit {
                entry.loading = false;
            }
            match result {
                Ok(ref comments) if first => entry.apply_fetched(comments.clone()),
                Ok(_) => {}
                Err(ref e) => {
                    if first {
                        entry.created_during_fetch.clear();
                        entry.deleted_during_fetch.clear();
                    }
                    if explicit {
                        tracing::warn!("Failed to load comments for {}: {}", posting_id, e);
                        entry.error = Some(e.to_string());
                        // Collapse so that expanding again retries
                        entry.expanded = false;
                    } else {
                        tracing::debug!("Background comment fetch for {} failed: {}", posting_id, e);
                    }
                }
            }
        }
        self.changed();
        result.map(|_| ())
    }

    fn start_fetch(&self, posting_id: &str) -> CommentFetch {
        let service = Arc::clone(&self.service);
        let posting_id = posting_id.to_string();
        let limit = self.timeout;
        async move { with_timeout(limit, service.list_comments(&posting_id)).await }
            .boxed()
            .shared()
    }

    /// Flip a posting's thread open or closed; returns the new expanded state.
    ///
    /// Opening a thread whose list has not been fetched loads it. Closing never
    /// touches the network.
    pub async fn toggle_comments(&self, posting_id: &str) -> Result<bool, StoreError> {
        let (expanded, needs_fetch) = {
            let mut s = self.lock();
            let entry = s.posts.entry(posting_id.to_string()).or_default();
            entry.expanded = !entry.expanded;
            (entry.expanded, entry.expanded && !entry.fetched)
        };
        self.changed();

        if needs_fetch {
            self.fetch(posting_id, true).await?;
        }
        Ok(expanded)
    }

    /// Post a comment; on success it is appended and the count goes up by one.
    pub async fn create_comment(
        &self,
        posting_id: &str,
        content: &str,
    ) -> Result<PostingComment, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyComment);
        }

        let result = with_timeout(
            self.timeout,
            self.service.create_comment(posting_id, content),
        )
        .await;

        {
            let mut guard = self.lock();
            let s = &mut *guard;
            let fetching = s.in_flight.contains_key(posting_id);
            let entry = s.posts.entry(posting_id.to_string()).or_default();
            match result {
                Ok(ref comment) => {
                    if fetching {
                        entry.created_during_fetch.push(comment.clone());
                    }
                    let list = entry.comments.get_or_insert_with(Vec::new);
                    let before = list.len();
                    list.push(comment.clone());
                    entry.count = Some(entry.count.unwrap_or(before) + 1);
                    entry.error = None;
                }
                Err(ref e) => {
                    tracing::warn!("Failed to comment on {}: {}", posting_id, e);
                    entry.error = Some(e.to_string());
                }
            }
        }
        self.changed();
        result
    }

    /// Whether the session user may delete `comment` on `posting_id`:
    /// they wrote it, or they own the posting.
    pub fn can_delete(&self, posting_id: &str, comment: &PostingComment) -> bool {
        let user_id = self.session.user_id();
        if comment.user_id == user_id {
            return true;
        }
        self.lock()
            .posts
            .get(posting_id)
            .and_then(|e| e.owner_id.as_deref())
            .is_some_and(|owner| owner == user_id)
    }

    /// Delete a comment once the server confirms; the count never drops below zero.
    pub async fn delete_comment(&self, posting_id: &str, comment_id: &str) -> Result<(), StoreError> {
        let comment = self
            .lock()
            .posts
            .get(posting_id)
            .and_then(|e| e.comments.as_ref())
            .and_then(|list| list.iter().find(|c| c.id == comment_id).cloned())
            .ok_or_else(|| StoreError::NotFound(format!("comment {}", comment_id)))?;
        if !self.can_delete(posting_id, &comment) {
            return Err(StoreError::NotPermitted(comment_id.to_string()));
        }

        let result = with_timeout(
            self.timeout,
            self.service.delete_comment(posting_id, comment_id),
        )
        .await;

        {
            let mut guard = self.lock();
            let s = &mut *guard;
            let fetching = s.in_flight.contains_key(posting_id);
            let entry = s.posts.entry(posting_id.to_string()).or_default();
            match result {
                Ok(()) => {
                    if fetching {
                        entry.deleted_during_fetch.insert(comment_id.to_string());
                    }
                    if let Some(list) = entry.comments.as_mut() {
                        let before = list.len();
                        list.retain(|c| c.id != comment_id);
                        if list.len() < before {
                            entry.count = Some(entry.count.unwrap_or(before).saturating_sub(1));
                        }
                    }
                    entry.error = None;
                }
                Err(ref e) => {
                    tracing::warn!("Failed to delete comment {}: {}", comment_id, e);
                    entry.error = Some(e.to_string());
                }
            }
        }
        self.changed();
        result
    }

    /// `count ?? list.len() ?? 0`
    pub fn displayed_count(&self, posting_id: &str) -> usize {
        self.lock()
            .posts
            .get(posting_id)
            .map_or(0, PostEntry::displayed_count)
    }

    pub fn view(&self, posting_id: &str) -> PostCommentsView {
        let s = self.lock();
        let Some(entry) = s.posts.get(posting_id) else {
            return PostCommentsView::default();
        };
        PostCommentsView {
            comments: entry.comments.clone().unwrap_or_default(),
            count: entry.displayed_count(),
            loading: entry.loading,
            error: entry.error.clone(),
            expanded: entry.expanded,
            fetched: entry.fetched,
        }
    }
}
