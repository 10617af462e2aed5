//! Data models for portal entities

mod attachment;
mod message;
mod posting;
mod user;

pub use attachment::*;
pub use message::*;
pub use posting::*;
pub use user::*;
