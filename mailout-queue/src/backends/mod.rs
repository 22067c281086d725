//! Queue backends
//!
//! - `memory`: In-memory storage for tests and dry runs
//! - `sqlite`: SQLite storage through sqlx (feature `sqlite`)

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryQueue;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQueue;
