//! In-memory storage backend for tests and dev mode.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::model::{
    AccountRecord, EmailMessage, InvocationRecord, QuotaKind, RateLimitCounter, SessionRecord,
};
use crate::store::traits::Storage;

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    sessions: HashMap<String, SessionRecord>,
    /// conversation_id → messages (kept sorted on read).
    chains: HashMap<String, Vec<EmailMessage>>,
    /// conversation_id → (ev_score, flagged).
    threads: HashMap<String, (u8, bool)>,
    /// (conversation_id, message_id) → ev_score.
    conversation_scores: HashMap<(String, String), u8>,
    invocations: Vec<InvocationRecord>,
    /// (account_id, quota) → counter.
    counters: HashMap<(String, QuotaKind), RateLimitCounter>,
}

/// In-memory `Storage` implementation.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding (upstream producers own these writes in production) ──

    pub async fn insert_account(&self, account: AccountRecord) {
        let mut inner = self.inner.write().await;
        inner.accounts.insert(account.id.clone(), account);
    }

    pub async fn insert_session(&self, session: SessionRecord) {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.session_id.clone(), session);
    }

    pub async fn insert_email(&self, conversation_id: &str, message: EmailMessage) {
        let mut inner = self.inner.write().await;
        inner
            .chains
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    // ── Inspection helpers for tests ─────────────────────────────────

    pub async fn thread_score(&self, conversation_id: &str) -> Option<(u8, bool)> {
        self.inner.read().await.threads.get(conversation_id).copied()
    }

    pub async fn conversation_score(&self, conversation_id: &str, message_id: &str) -> Option<u8> {
        self.inner
            .read()
            .await
            .conversation_scores
            .get(&(conversation_id.to_string(), message_id.to_string()))
            .copied()
    }

    pub async fn invocations(&self) -> Vec<InvocationRecord> {
        self.inner.read().await.invocations.clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_email_chain(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<EmailMessage>, StorageError> {
        let inner = self.inner.read().await;
        let mut chain = inner
            .chains
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        chain.sort_by_key(|m| m.timestamp);
        Ok(chain)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<AccountRecord>, StorageError> {
        Ok(self.inner.read().await.accounts.get(account_id).cloned())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.inner.read().await.sessions.get(session_id).cloned())
    }

    async fn update_thread_score(
        &self,
        conversation_id: &str,
        ev_score: u8,
        flagged: bool,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .threads
            .insert(conversation_id.to_string(), (ev_score, flagged));
        Ok(())
    }

    async fn update_conversation_score(
        &self,
        conversation_id: &str,
        message_id: &str,
        ev_score: u8,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.conversation_scores.insert(
            (conversation_id.to_string(), message_id.to_string()),
            ev_score,
        );
        Ok(())
    }

    async fn put_invocation(&self, record: &InvocationRecord) -> Result<(), StorageError> {
        self.inner.write().await.invocations.push(record.clone());
        Ok(())
    }

    async fn get_rate_counter(
        &self,
        account_id: &str,
        kind: QuotaKind,
    ) -> Result<Option<RateLimitCounter>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .counters
            .get(&(account_id.to_string(), kind))
            .cloned())
    }

    async fn put_rate_counter(
        &self,
        kind: QuotaKind,
        counter: &RateLimitCounter,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .counters
            .insert((counter.account_id.clone(), kind), counter.clone());
        Ok(())
    }
}
