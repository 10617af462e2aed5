//! Portal client - chat and feed for the business directory portal
//!
//! A command-line front end over the conversation store and comment cache.

mod api;
mod attachment;
mod auth;
mod commands;
mod config;
mod models;
mod session;
mod store;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{chat, feed};

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Chat and feed client for the business directory portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an access token and verify it
    Login {
        /// Portal API root, e.g. https://portal.example.com/api
        #[arg(short, long)]
        url: Option<String>,

        /// Bearer token issued by the portal
        #[arg(short, long)]
        token: String,

        /// Token lifetime in seconds, if known
        #[arg(long)]
        expires_in: Option<u64>,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show current user info (verify auth works)
    Whoami,

    /// List chat contacts
    Contacts,

    /// Read the conversation with a contact
    Read {
        /// Contact ID (from `contacts` output)
        contact_id: String,
    },

    /// Send a message
    Send {
        /// Contact ID (from `contacts` output)
        #[arg(short, long)]
        to: String,

        /// File to attach (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,

        /// Message content
        #[arg(default_value = "")]
        message: String,
    },

    /// Delete a message from a conversation
    DeleteMessage {
        /// Contact ID of the conversation
        contact_id: String,

        /// Message ID (from `read` output)
        message_id: String,
    },

    /// Search users to chat with
    Search {
        query: String,
    },

    /// Start a conversation with the first user matching a query
    Start {
        query: String,
    },

    /// Show a page of the feed with comment counts
    Feed {
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Postings per page
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Show the comments on a posting
    Comments {
        /// Posting ID (from `feed` output)
        posting_id: String,
    },

    /// Comment on a posting
    Comment {
        /// Posting ID (from `feed` output)
        #[arg(short, long)]
        posting: String,

        /// Comment content
        content: String,
    },

    /// Delete a comment
    DeleteComment {
        /// Posting ID (from `feed` output)
        #[arg(short, long)]
        posting: String,

        /// Comment ID (from `comments` output)
        comment_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            url,
            token,
            expires_in,
        } => {
            tracing::info!("Verifying token...");
            auth::login(url.as_deref(), &token, expires_in).await?;
        }
        Commands::Logout => {
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Whoami => {
            api::whoami().await?;
        }
        Commands::Contacts => {
            chat::list_contacts().await?;
        }
        Commands::Read { contact_id } => {
            chat::read_messages(&contact_id).await?;
        }
        Commands::Send {
            to,
            attachments,
            message,
        } => {
            tracing::info!("Sending message...");
            chat::send_message(&to, &message, &attachments).await?;
        }
        Commands::DeleteMessage {
            contact_id,
            message_id,
        } => {
            chat::delete_message(&contact_id, &message_id).await?;
        }
        Commands::Search { query } => {
            chat::search_users(&query).await?;
        }
        Commands::Start { query } => {
            chat::start_conversation(&query).await?;
        }
        Commands::Feed { page, limit } => {
            tracing::info!("Fetching feed...");
            feed::show_feed(page, limit).await?;
        }
        Commands::Comments { posting_id } => {
            feed::show_comments(&posting_id).await?;
        }
        Commands::Comment { posting, content } => {
            feed::add_comment(&posting, &content).await?;
        }
        Commands::DeleteComment {
            posting,
            comment_id,
        } => {
            feed::remove_comment(&posting, &comment_id).await?;
        }
    }

    Ok(())
}
