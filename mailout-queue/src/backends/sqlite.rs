use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailout_common::{Domain, Mailbox};
use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};

use crate::{
    Blob, BlobId, Header, HeaderRow, Message, MessageKey, QueueError, RecipientCounts, Result,
    r#trait::{BlobStore, QueueStore},
};

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS mail_messages (
        company_id INTEGER NOT NULL,
        message_id INTEGER NOT NULL,
        from_address TEXT NOT NULL,
        from_name TEXT,
        subject TEXT NOT NULL DEFAULT '',
        to_count INTEGER NOT NULL DEFAULT 0,
        cc_count INTEGER NOT NULL DEFAULT 0,
        bcc_count INTEGER NOT NULL DEFAULT 0,
        from_count INTEGER NOT NULL DEFAULT 1,
        body_blob_id INTEGER NOT NULL,
        picked_up_at TEXT,
        sent_at TEXT,
        PRIMARY KEY (company_id, message_id)
    )",
    "CREATE INDEX IF NOT EXISTS mail_messages_unsent
        ON mail_messages (message_id, company_id)
        WHERE picked_up_at IS NULL AND sent_at IS NULL",
    "CREATE TABLE IF NOT EXISTS mail_headers (
        header_id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL,
        message_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        address TEXT,
        display_name TEXT,
        value TEXT,
        blob_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS mail_blobs (
        blob_id INTEGER PRIMARY KEY AUTOINCREMENT,
        mime_type TEXT NOT NULL,
        data BLOB NOT NULL,
        filename TEXT
    )",
    "CREATE TABLE IF NOT EXISTS authorized_domains (
        domain TEXT PRIMARY KEY
    )",
];

/// SQLite-backed queue and blob store
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    /// Wrap an existing pool. The schema is assumed to exist.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`, creating the file and the schema if
    /// they do not exist yet.
    #[tracing::instrument(skip_all)]
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let queue = Self::from_pool(pool);
        queue.migrate().await?;
        Ok(queue)
    }

    /// A private database that lives as long as the returned queue.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let queue = Self::from_pool(pool);
        queue.migrate().await?;
        Ok(queue)
    }

    /// Create the queue tables if absent.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        key: MessageKey::new(row.try_get("company_id")?, row.try_get("message_id")?),
        from: Mailbox::new(
            row.try_get::<String, _>("from_address")?,
            row.try_get("from_name")?,
        ),
        subject: row.try_get("subject")?,
        recipients: RecipientCounts {
            to: row.try_get("to_count")?,
            cc: row.try_get("cc_count")?,
            bcc: row.try_get("bcc_count")?,
            from: row.try_get("from_count")?,
        },
        body: BlobId(row.try_get("body_blob_id")?),
        picked_up_at: row.try_get::<Option<DateTime<Utc>>, _>("picked_up_at")?,
        sent_at: row.try_get::<Option<DateTime<Utc>>, _>("sent_at")?,
    })
}

fn header_row_from_row(row: &SqliteRow) -> Result<HeaderRow> {
    Ok(HeaderRow {
        id: row.try_get("header_id")?,
        kind: row.try_get("kind")?,
        address: row.try_get("address")?,
        display_name: row.try_get("display_name")?,
        value: row.try_get("value")?,
        blob_id: row.try_get("blob_id")?,
    })
}

#[async_trait]
impl QueueStore for SqliteQueue {
    async fn authorized_domains(&self) -> Result<Vec<Domain>> {
        let domains: Vec<String> = sqlx::query_scalar("SELECT domain FROM authorized_domains")
            .fetch_all(&self.pool)
            .await?;
        Ok(domains.iter().map(Domain::new).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_unsent(&self, limit: usize) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT company_id, message_id, from_address, from_name, subject,
                    to_count, cc_count, bcc_count, from_count, body_blob_id,
                    picked_up_at, sent_at
             FROM mail_messages
             WHERE picked_up_at IS NULL AND sent_at IS NULL
             ORDER BY message_id, company_id
             LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn fetch_headers(&self, key: MessageKey) -> Result<Vec<Header>> {
        let rows = sqlx::query(
            "SELECT header_id, kind, address, display_name, value, blob_id
             FROM mail_headers
             WHERE company_id = ? AND message_id = ?
             ORDER BY header_id",
        )
        .bind(key.company_id)
        .bind(key.message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| header_row_from_row(row).and_then(Header::try_from))
            .collect()
    }

    async fn mark_picked_up(&self, key: MessageKey) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE mail_messages SET picked_up_at = ?
             WHERE company_id = ? AND message_id = ? AND picked_up_at IS NULL",
        )
        .bind(Utc::now())
        .bind(key.company_id)
        .bind(key.message_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists = sqlx::query("SELECT 1 FROM mail_messages WHERE company_id = ? AND message_id = ?")
                .bind(key.company_id)
                .bind(key.message_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.rollback().await?;

            return Err(if exists {
                QueueError::AlreadyPickedUp(key)
            } else {
                QueueError::MessageNotFound(key)
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_sent(&self, key: MessageKey) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE mail_messages SET sent_at = ?
             WHERE company_id = ? AND message_id = ?
               AND picked_up_at IS NOT NULL AND sent_at IS NULL",
        )
        .bind(Utc::now())
        .bind(key.company_id)
        .bind(key.message_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(QueueError::NotPickedUp(key));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SqliteQueue {
    async fn blob(&self, id: BlobId) -> Result<Blob> {
        let row = sqlx::query("SELECT mime_type, data, filename FROM mail_blobs WHERE blob_id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QueueError::BlobNotFound(id))?;

        Ok(Blob {
            mime_type: row.try_get("mime_type")?,
            data: row.try_get("data")?,
            filename: row.try_get("filename")?,
        })
    }
}
