//! Storage trait — the narrow persistence contract the pipeline consumes.
//!
//! The pipeline owns exactly two fields on the external records it touches
//! (`ev_score` on threads and conversations, `flag` on threads); everything
//! else belongs to upstream producers and is never written here.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{
    AccountRecord, EmailMessage, InvocationRecord, QuotaKind, RateLimitCounter, SessionRecord,
};

/// Backend-agnostic storage trait.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch a conversation's email chain, sorted by timestamp ascending.
    /// Returns an empty vec for an unknown conversation.
    async fn get_email_chain(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<EmailMessage>, StorageError>;

    /// Fetch an account row (registered email + quota limits).
    async fn get_account(&self, account_id: &str) -> Result<Option<AccountRecord>, StorageError>;

    /// Fetch a session row for authorization.
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError>;

    /// Write the EV score and flag onto a thread record.
    async fn update_thread_score(
        &self,
        conversation_id: &str,
        ev_score: u8,
        flagged: bool,
    ) -> Result<(), StorageError>;

    /// Write the EV score onto a conversation record, keyed by
    /// (conversation id, message id).
    async fn update_conversation_score(
        &self,
        conversation_id: &str,
        message_id: &str,
        ev_score: u8,
    ) -> Result<(), StorageError>;

    /// Append an invocation audit record. Records are write-once.
    async fn put_invocation(&self, record: &InvocationRecord) -> Result<(), StorageError>;

    /// Read the admission counter for one (account, quota) pair.
    async fn get_rate_counter(
        &self,
        account_id: &str,
        kind: QuotaKind,
    ) -> Result<Option<RateLimitCounter>, StorageError>;

    /// Create or replace the admission counter for one (account, quota) pair.
    async fn put_rate_counter(
        &self,
        kind: QuotaKind,
        counter: &RateLimitCounter,
    ) -> Result<(), StorageError>;
}
