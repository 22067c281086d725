pub mod controller;
pub mod lock;
pub mod shutdown;

pub use controller::{Mailout, QueueConfig, find_config_file};
pub use lock::{LockError, PidLock};
