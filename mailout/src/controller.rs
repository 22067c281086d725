//! Configuration root and the single dispatch run

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use mailout_common::internal;
use mailout_dispatch::{Capabilities, Dispatcher, RunSummary, SingleTenant, SmtpConfig, SmtpMailer};
use mailout_queue::SqliteQueue;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::lock::PidLock;

pub const CONFIG_ENV: &str = "MAILOUT_CONFIG";

/// Where the queue lives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// sqlx SQLite connection URL, e.g. `sqlite:///var/lib/mailout/queue.db`
    pub url: String,
}

/// Top-level configuration, and the entry point for one dispatch run
#[derive(Debug, Deserialize)]
pub struct Mailout {
    pub queue: QueueConfig,
    #[serde(default)]
    pub dispatch: Dispatcher,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub lock_file: Option<PathBuf>,
}

impl Mailout {
    /// Read a RON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        Self::from_ron(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {}", path.display(), e))
    }

    /// Parse RON configuration. Optional fields may be written without
    /// `Some(..)`.
    ///
    /// # Errors
    ///
    /// Fails if `content` is not a valid configuration.
    pub fn from_ron(content: &str) -> Result<Self, ron::error::SpannedError> {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(content)
    }

    /// Drain the queue once.
    ///
    /// # Errors
    ///
    /// Fails if the lock is held, the queue or relay cannot be set up, or the
    /// dispatch run aborts.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<RunSummary> {
        let _lock = self.lock_file.as_deref().map(PidLock::acquire).transpose()?;

        internal!(level = INFO, url = %self.queue.url, "Connecting to queue");
        let queue = Arc::new(SqliteQueue::connect(&self.queue.url).await?);
        let mailer = Arc::new(SmtpMailer::new(&self.smtp)?);

        self.dispatch.init(Capabilities {
            store: queue.clone(),
            blobs: queue,
            mailer,
            tenant: Arc::new(SingleTenant::new()),
        })?;

        let summary = self.dispatch.run(&cancel).await?;
        Ok(summary)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `MAILOUT_CONFIG` environment variable
/// 2. ./mailout.config.ron (current working directory)
/// 3. /etc/mailout/mailout.config.ron (system-wide config)
///
/// # Errors
///
/// Fails if `MAILOUT_CONFIG` names a missing file, or no candidate exists.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    locate_config(
        std::env::var(CONFIG_ENV).ok(),
        &[
            PathBuf::from("./mailout.config.ron"),
            PathBuf::from("/etc/mailout/mailout.config.ron"),
        ],
    )
}

fn locate_config(env_path: Option<String>, default_paths: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
