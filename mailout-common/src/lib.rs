//! Types and logging shared by every mailout crate.

pub mod address;
pub mod domain;
pub mod logging;

pub use address::Mailbox;
pub use domain::Domain;
pub use tracing;
