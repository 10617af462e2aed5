//! Feed commands: postings with comment counts, comment threads.

use anyhow::Result;

use super::{truncate, App};
use crate::api::FeedService;
use crate::models::Posting;
use crate::store::CommentCache;

fn print_thread(cache: &CommentCache, posting: &Posting) {
    let view = cache.view(&posting.id);
    println!("\n{}", posting.title);
    println!("{:-<60}", "");

    if let Some(ref err) = view.error {
        println!("  Could not load comments: {}", err);
        return;
    }
    if view.comments.is_empty() {
        println!("  (no comments)");
    }
    for comment in &view.comments {
        // Only offer deletion where it would be accepted
        let marker = if cache.can_delete(&posting.id, comment) {
            "*"
        } else {
            " "
        };
        println!(
            "{} [{}] {}: {}  ({})",
            marker,
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.user.display_name(),
            comment.content,
            comment.id
        );
    }
    println!("\n{} comment(s); * = you can delete", view.count);
}

/// One page of the feed with comment counts.
pub async fn show_feed(page: u32, limit: u32) -> Result<()> {
    let app = App::load()?;
    let postings = app.client.list_postings(page, limit).await?;

    let cache = app.comments();
    let updates = cache.subscribe();
    let loaded = cache.warm_up(&postings).await;
    tracing::debug!(
        "Prefetched comments for {}/{} postings ({} cache update(s))",
        loaded,
        postings.len(),
        *updates.borrow()
    );

    println!("\nFeed (page {}):", page);
    println!("{:-<60}", "");

    if postings.is_empty() {
        println!("  (no postings)");
        return Ok(());
    }

    for posting in &postings {
        let org = posting
            .organization
            .as_ref()
            .and_then(|o| o.name.as_deref())
            .unwrap_or("-");
        println!("{}  [{}]", posting.title, posting.post_type);
        println!("  ID: {}  Org: {}", posting.id, org);
        if !posting.content.trim().is_empty() {
            println!("  {}", truncate(posting.content.trim(), 80));
        }
        if !posting.attachments.is_empty() {
            println!("  {} attachment(s)", posting.attachments.len());
        }
        println!("  {} comment(s)", cache.displayed_count(&posting.id));
        println!();
    }

    Ok(())
}

/// Print a posting's comment thread.
pub async fn show_comments(posting_id: &str) -> Result<()> {
    let app = App::load()?;
    let posting = app.client.get_posting(posting_id).await?;
    let cache = app.comments();
    cache.register_posting(&posting);

    let result = cache.toggle_comments(posting_id).await;
    print_thread(&cache, &posting);
    result?;
    Ok(())
}

/// Comment on a posting.
pub async fn add_comment(posting_id: &str, content: &str) -> Result<()> {
    let app = App::load()?;
    let posting = app.client.get_posting(posting_id).await?;
    let cache = app.comments();
    cache.register_posting(&posting);

    let comment = cache.create_comment(posting_id, content).await?;
    println!(
        "Comment posted ({}). {} comment(s) on '{}'.",
        comment.id,
        cache.displayed_count(posting_id),
        posting.title
    );
    Ok(())
}

/// Delete a comment the session user wrote, or any comment on their posting.
pub async fn remove_comment(posting_id: &str, comment_id: &str) -> Result<()> {
    let app = App::load()?;
    let posting = app.client.get_posting(posting_id).await?;
    let cache = app.comments();
    cache.register_posting(&posting);
    cache.toggle_comments(posting_id).await?;

    cache.delete_comment(posting_id, comment_id).await?;
    println!(
        "Comment deleted. {} comment(s) left.",
        cache.displayed_count(posting_id)
    );
    Ok(())
}
