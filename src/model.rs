//! Domain types shared across the scoring pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Conversation ────────────────────────────────────────────────────

/// A single email in a conversation chain.
///
/// Chains are fetched from storage already sorted by timestamp ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// ID of this message within the conversation.
    pub message_id: String,
    /// Sender address as it appeared on the wire.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
}

/// Who authored a message, relative to the scored account.
///
/// Derived per scoring call by comparing the sender against the account's
/// registered email. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleType {
    Realtor,
    Buyer,
}

impl RoleType {
    /// Classify a sender. Exact, case-sensitive match against the
    /// account's registered email means the realtor wrote it.
    pub fn derive(account_email: &str, sender: &str) -> Self {
        if sender == account_email {
            RoleType::Realtor
        } else {
            RoleType::Buyer
        }
    }

    /// Prompt prefix for this role.
    pub fn prefix(&self) -> &'static str {
        match self {
            RoleType::Realtor => "REALTOR: ",
            RoleType::Buyer => "BUYER: ",
        }
    }
}

// ── Token accounting ────────────────────────────────────────────────

/// Token usage reported by the LLM provider for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Sum two usages (e.g. the score call plus the flag call).
    pub fn combined(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

// ── Rate limiting ───────────────────────────────────────────────────

/// A named rate-limit bucket, tracked independently per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKind {
    /// General invocation quota — checked at the front door.
    General,
    /// AI invocation quota — checked before any paid LLM call.
    Ai,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::General => "general",
            QuotaKind::Ai => "ai",
        }
    }
}

/// Fixed-window admission counter for one (account, quota) pair.
///
/// Owned by the rate limiter; mutated only through its admission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitCounter {
    pub account_id: String,
    pub invocations: u32,
    pub window_expiry: DateTime<Utc>,
}

// ── Audit ───────────────────────────────────────────────────────────

/// Which LLM call produced an invocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    EvCalculation,
    Flag,
}

impl InvocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationKind::EvCalculation => "ev_calculation",
            InvocationKind::Flag => "flag",
        }
    }
}

/// Append-only audit entry for one LLM invocation. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: Uuid,
    pub account_id: String,
    pub conversation_id: String,
    pub kind: InvocationKind,
    pub model_name: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub created_at: DateTime<Utc>,
}

// ── Accounts and sessions ───────────────────────────────────────────

/// Account-level configuration read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    /// The realtor's registered email, used for role tagging.
    pub email: String,
    /// Per-minute limit for the general quota.
    pub general_limit: u32,
    /// Per-minute limit for the AI quota.
    pub ai_limit: u32,
}

/// A session row, used by the storage-backed authorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub account_id: String,
}
