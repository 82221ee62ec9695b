//! Live support chat for the storefront.
//!
//! [`sync::session::ChatSession`] is the shared core of the customer widget and the admin
//! console: it bootstraps a conversation over REST, keeps a deduplicated timeline, and
//! follows the conversation's broker topic through an owned [`sync::live::LiveLink`].

pub mod api;
pub mod app;
pub mod error;
pub mod sync;
pub mod ui;
pub mod utils;

pub use error::{ChatError, Result};
