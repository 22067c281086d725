//! The persistent queue of outbound mail.
//!
//! Upstream producers write messages, header rows and blobs; the dispatcher
//! only ever reads them and moves a message through its two timestamps:
//!
//! ```text
//! eligible (picked_up_at = NULL, sent_at = NULL)
//!    -> in flight (picked_up_at set)
//!    -> sent (picked_up_at and sent_at set)
//! ```
//!
//! Access goes through the [`QueueStore`] and [`BlobStore`] traits so that the
//! dispatcher never depends on a concrete database.

pub mod backends;
pub mod error;
pub mod r#trait;
pub mod types;

#[cfg(feature = "sqlite")]
pub use backends::SqliteQueue;
pub use backends::MemoryQueue;
pub use error::{QueueError, Result};
pub use r#trait::{BlobStore, QueueStore};
pub use types::{Blob, BlobId, Header, HeaderKind, HeaderRow, Message, MessageKey, RecipientCounts};
