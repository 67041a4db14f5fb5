//! libSQL storage backend — async `Storage` trait implementation.
//!
//! Supports local file and in-memory databases. Thread and conversation
//! writes are upserts restricted to the fields this service owns
//! (`ev_score`, `flag`); every other column belongs to upstream producers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StorageError;
use crate::model::{
    AccountRecord, EmailMessage, InvocationRecord, QuotaKind, RateLimitCounter, SessionRecord,
};
use crate::store::traits::Storage;

/// libSQL database backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStorage {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStorage {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!("failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Connection(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("failed to create connection: {e}")))?;

        let storage = Self {
            db: Arc::new(db),
            conn,
        };
        storage.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(storage)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Connection(format!("failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("failed to create connection: {e}")))?;

        let storage = Self {
            db: Arc::new(db),
            conn,
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        const SCHEMA: &[&str] = &[
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                general_limit INTEGER NOT NULL DEFAULT 0,
                ai_limit INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                conversation_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL,
                ev_score INTEGER,
                PRIMARY KEY (conversation_id, message_id)
            )",
            "CREATE TABLE IF NOT EXISTS threads (
                conversation_id TEXT PRIMARY KEY,
                ev_score INTEGER,
                flag INTEGER,
                updated_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS invocations (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                model_name TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS rate_counters (
                account_id TEXT NOT NULL,
                quota TEXT NOT NULL,
                invocations INTEGER NOT NULL,
                window_expiry TEXT NOT NULL,
                PRIMARY KEY (account_id, quota)
            )",
        ];

        for stmt in SCHEMA {
            self.conn
                .execute(stmt, params![])
                .await
                .map_err(|e| StorageError::Query(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    // ── Seeding (upstream producers own these writes in production) ──

    pub async fn insert_account(&self, account: &AccountRecord) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO accounts (id, email, general_limit, ai_limit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    account.id.as_str(),
                    account.email.as_str(),
                    account.general_limit as i64,
                    account.ai_limit as i64
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sessions (session_id, account_id) VALUES (?1, ?2)",
                params![session.session_id.as_str(), session.account_id.as_str()],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_email(
        &self,
        conversation_id: &str,
        message: &EmailMessage,
    ) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO messages
                 (conversation_id, message_id, sender, subject, body, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    conversation_id,
                    message.message_id.as_str(),
                    message.sender.as_str(),
                    message.subject.as_str(),
                    message.body.as_str(),
                    message.timestamp.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}

/// Parse an RFC 3339 datetime column, falling back to the epoch on
/// malformed data rather than failing the whole read.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait]
impl Storage for LibSqlStorage {
    async fn get_email_chain(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<EmailMessage>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT message_id, sender, subject, body, timestamp
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY timestamp ASC",
                params![conversation_id],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut chain = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            let timestamp: String = row
                .get(4)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            chain.push(EmailMessage {
                message_id: row
                    .get(0)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                sender: row
                    .get(1)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                subject: row
                    .get(2)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                body: row
                    .get(3)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                timestamp: parse_datetime(&timestamp),
            });
        }
        Ok(chain)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<AccountRecord>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, email, general_limit, ai_limit FROM accounts WHERE id = ?1",
                params![account_id],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            None => Ok(None),
            Some(row) => {
                let general_limit: i64 = row
                    .get(2)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let ai_limit: i64 = row
                    .get(3)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(AccountRecord {
                    id: row
                        .get(0)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    email: row
                        .get(1)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    general_limit: general_limit.max(0) as u32,
                    ai_limit: ai_limit.max(0) as u32,
                }))
            }
        }
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, account_id FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            None => Ok(None),
            Some(row) => Ok(Some(SessionRecord {
                session_id: row
                    .get(0)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                account_id: row
                    .get(1)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            })),
        }
    }

    async fn update_thread_score(
        &self,
        conversation_id: &str,
        ev_score: u8,
        flagged: bool,
    ) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO threads (conversation_id, ev_score, flag, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (conversation_id)
                 DO UPDATE SET ev_score = ?2, flag = ?3, updated_at = ?4",
                params![
                    conversation_id,
                    ev_score as i64,
                    flagged as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn update_conversation_score(
        &self,
        conversation_id: &str,
        message_id: &str,
        ev_score: u8,
    ) -> Result<(), StorageError> {
        self.conn
            .execute(
                "UPDATE messages SET ev_score = ?3
                 WHERE conversation_id = ?1 AND message_id = ?2",
                params![conversation_id, message_id, ev_score as i64],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn put_invocation(&self, record: &InvocationRecord) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO invocations
                 (id, account_id, conversation_id, kind, model_name,
                  input_tokens, output_tokens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.to_string(),
                    record.account_id.as_str(),
                    record.conversation_id.as_str(),
                    record.kind.as_str(),
                    record.model_name.as_str(),
                    record.input_tokens as i64,
                    record.output_tokens as i64,
                    record.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_rate_counter(
        &self,
        account_id: &str,
        kind: QuotaKind,
    ) -> Result<Option<RateLimitCounter>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT invocations, window_expiry FROM rate_counters
                 WHERE account_id = ?1 AND quota = ?2",
                params![account_id, kind.as_str()],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            None => Ok(None),
            Some(row) => {
                let invocations: i64 = row
                    .get(0)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let expiry: String = row
                    .get(1)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(RateLimitCounter {
                    account_id: account_id.to_string(),
                    invocations: invocations.max(0) as u32,
                    window_expiry: parse_datetime(&expiry),
                }))
            }
        }
    }

    async fn put_rate_counter(
        &self,
        kind: QuotaKind,
        counter: &RateLimitCounter,
    ) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO rate_counters (account_id, quota, invocations, window_expiry)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (account_id, quota)
                 DO UPDATE SET invocations = ?3, window_expiry = ?4",
                params![
                    counter.account_id.as_str(),
                    kind.as_str(),
                    counter.invocations as i64,
                    counter.window_expiry.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InvocationKind;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn message(id: &str, sender: &str, ts: i64) -> EmailMessage {
        EmailMessage {
            message_id: id.to_string(),
            sender: sender.to_string(),
            subject: "Re: 12 Oak St".to_string(),
            body: "body".to_string(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn chain_comes_back_sorted_by_timestamp() {
        let store = LibSqlStorage::new_memory().await.unwrap();
        store.insert_email("c1", &message("m2", "b@y.com", 200)).await.unwrap();
        store.insert_email("c1", &message("m1", "a@x.com", 100)).await.unwrap();

        let chain = store.get_email_chain("c1").await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].message_id, "m1");
        assert_eq!(chain[1].message_id, "m2");

        let empty = store.get_email_chain("missing").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn thread_upsert_and_conversation_update() {
        let store = LibSqlStorage::new_memory().await.unwrap();
        store.insert_email("c1", &message("m1", "a@x.com", 100)).await.unwrap();

        store.update_thread_score("c1", 42, false).await.unwrap();
        store.update_thread_score("c1", 77, true).await.unwrap();
        store.update_conversation_score("c1", "m1", 77).await.unwrap();

        let mut rows = store
            .conn
            .query("SELECT ev_score, flag FROM threads WHERE conversation_id = 'c1'", params![])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 77);
        assert_eq!(row.get::<i64>(1).unwrap(), 1);

        let mut rows = store
            .conn
            .query(
                "SELECT ev_score FROM messages WHERE conversation_id = 'c1' AND message_id = 'm1'",
                params![],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 77);
    }

    #[tokio::test]
    async fn account_session_and_counter_round_trip() {
        let store = LibSqlStorage::new_memory().await.unwrap();
        store
            .insert_account(&AccountRecord {
                id: "acct-1".to_string(),
                email: "a@x.com".to_string(),
                general_limit: 10,
                ai_limit: 5,
            })
            .await
            .unwrap();
        store
            .insert_session(&SessionRecord {
                session_id: "sess-1".to_string(),
                account_id: "acct-1".to_string(),
            })
            .await
            .unwrap();

        let account = store.get_account("acct-1").await.unwrap().unwrap();
        assert_eq!(account.email, "a@x.com");
        assert_eq!(account.ai_limit, 5);
        assert!(store.get_account("acct-2").await.unwrap().is_none());

        let session = store.get_session("sess-1").await.unwrap().unwrap();
        assert_eq!(session.account_id, "acct-1");

        let counter = RateLimitCounter {
            account_id: "acct-1".to_string(),
            invocations: 3,
            window_expiry: Utc.timestamp_opt(2_000_000_000, 0).unwrap(),
        };
        store.put_rate_counter(QuotaKind::Ai, &counter).await.unwrap();
        let read = store
            .get_rate_counter("acct-1", QuotaKind::Ai)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.invocations, 3);
        // Quota kinds are independent buckets.
        assert!(store
            .get_rate_counter("acct-1", QuotaKind::General)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn invocation_records_are_appended() {
        let store = LibSqlStorage::new_memory().await.unwrap();
        let record = InvocationRecord {
            id: Uuid::new_v4(),
            account_id: "acct-1".to_string(),
            conversation_id: "c1".to_string(),
            kind: InvocationKind::EvCalculation,
            model_name: "m".to_string(),
            input_tokens: 12,
            output_tokens: 1,
            created_at: Utc::now(),
        };
        store.put_invocation(&record).await.unwrap();

        let mut rows = store
            .conn
            .query("SELECT kind, input_tokens FROM invocations", params![])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "ev_calculation");
        assert_eq!(row.get::<i64>(1).unwrap(), 12);
    }
}
