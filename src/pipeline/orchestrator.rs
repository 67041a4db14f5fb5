//! Pipeline orchestrator — the end-to-end "score a conversation" use case.
//!
//! Steps run in a fixed order:
//! fetch context → admit AI quota → score + flag → persist → record usage.
//! State is only written after both LLM calls have completed, and no paid
//! call happens before the rate-limit admission.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::model::{InvocationKind, QuotaKind, TokenUsage};
use crate::pipeline::flag::FlagClient;
use crate::pipeline::normalize::{format_for_review, normalize};
use crate::pipeline::scoring::ScoringClient;
use crate::ratelimit::{Admission, RateLimiter};
use crate::store::Storage;
use crate::usage::UsageRecorder;

/// A request to score one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub conversation_id: String,
    pub account_id: String,
    /// Message the conversation-record write keys on. When absent, the
    /// last message in the chain is used.
    pub message_id: Option<String>,
}

/// The result of a successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub ev_score: u8,
    pub conversation_id: String,
    pub flagged: bool,
    /// Combined usage across the score and flag calls.
    pub token_usage: TokenUsage,
}

/// Composes the scoring pipeline from its injected collaborators.
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    limiter: Arc<dyn RateLimiter>,
    scoring: ScoringClient,
    flag: FlagClient,
    usage: UsageRecorder,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        limiter: Arc<dyn RateLimiter>,
        scoring: ScoringClient,
        flag: FlagClient,
    ) -> Self {
        let usage = UsageRecorder::new(Arc::clone(&storage));
        Self {
            storage,
            limiter,
            scoring,
            flag,
            usage,
        }
    }

    /// Run the full pipeline for one conversation.
    pub async fn score_conversation(
        &self,
        request: &ScoreRequest,
    ) -> Result<ScoreOutcome, PipelineError> {
        let conversation_id = request.conversation_id.as_str();
        let account_id = request.account_id.as_str();

        // ── FETCH_CONTEXT ────────────────────────────────────────────
        let chain = self.storage.get_email_chain(conversation_id).await?;
        if chain.is_empty() {
            return Err(PipelineError::NotFound(format!(
                "no messages for conversation {conversation_id}"
            )));
        }

        let account = self
            .storage
            .get_account(account_id)
            .await?
            .filter(|a| !a.email.is_empty())
            .ok_or_else(|| {
                PipelineError::NotFound(format!("no registered email for account {account_id}"))
            })?;

        // ── ADMIT_RATE_LIMIT ─────────────────────────────────────────
        if let Admission::Denied(reason) = self.limiter.admit(account_id, QuotaKind::Ai).await {
            info!(account = %account_id, conversation = %conversation_id, %reason,
                  "AI quota denied");
            return Err(PipelineError::RateLimited(reason));
        }

        // ── SCORE + FLAG ─────────────────────────────────────────────
        // The flag prompt doesn't depend on the score, so both calls run
        // concurrently. Persisting waits for both.
        let turns = normalize(&account.email, &chain);
        let transcript = format_for_review(&chain);
        let ((ev_score, score_usage), (flagged, flag_usage)) = tokio::join!(
            self.scoring.score(account_id, conversation_id, turns),
            self.flag.decide(account_id, conversation_id, &transcript),
        );

        if ev_score < 0 {
            return Err(PipelineError::ScoringFailed { code: ev_score });
        }
        let ev_score = ev_score as u8;

        // ── PERSIST ──────────────────────────────────────────────────
        // Two writes against different keys; not atomic. A failure after
        // the thread write leaves the conversation record stale, which is
        // logged and surfaced as a storage failure.
        self.storage
            .update_thread_score(conversation_id, ev_score, flagged)
            .await?;

        let message_id = match &request.message_id {
            Some(id) => id.clone(),
            None => chain
                .last()
                .map(|m| m.message_id.clone())
                .unwrap_or_default(),
        };
        if let Err(e) = self
            .storage
            .update_conversation_score(conversation_id, &message_id, ev_score)
            .await
        {
            error!(
                account = %account_id,
                conversation = %conversation_id,
                error = %e,
                "Conversation write failed after thread write; records are inconsistent"
            );
            return Err(e.into());
        }

        // ── RECORD_USAGE ─────────────────────────────────────────────
        self.usage
            .record(
                account_id,
                conversation_id,
                InvocationKind::EvCalculation,
                self.scoring.model_name(),
                score_usage,
            )
            .await;
        self.usage
            .record(
                account_id,
                conversation_id,
                InvocationKind::Flag,
                self.flag.model_name(),
                flag_usage,
            )
            .await;

        info!(
            account = %account_id,
            conversation = %conversation_id,
            ev_score,
            flagged,
            "Conversation scored"
        );

        Ok(ScoreOutcome {
            ev_score,
            conversation_id: conversation_id.to_string(),
            flagged,
            token_usage: score_usage.combined(&flag_usage),
        })
    }
}
