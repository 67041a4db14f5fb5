//! Best-effort audit trail of LLM invocations.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::model::{InvocationKind, InvocationRecord, TokenUsage};
use crate::store::Storage;

/// Records token usage per LLM invocation for billing and audit.
///
/// Recording is a side channel: a write failure is logged with enough
/// context to reconcile later and never propagates into the pipeline
/// result.
pub struct UsageRecorder {
    storage: Arc<dyn Storage>,
}

impl UsageRecorder {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Append one invocation record.
    pub async fn record(
        &self,
        account_id: &str,
        conversation_id: &str,
        kind: InvocationKind,
        model_name: &str,
        usage: TokenUsage,
    ) {
        let record = InvocationRecord {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            conversation_id: conversation_id.to_string(),
            kind,
            model_name: model_name.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            created_at: Utc::now(),
        };

        match self.storage.put_invocation(&record).await {
            Ok(()) => debug!(
                account = %account_id,
                conversation = %conversation_id,
                kind = kind.as_str(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Invocation recorded"
            ),
            Err(e) => error!(
                account = %account_id,
                conversation = %conversation_id,
                kind = kind.as_str(),
                error = %e,
                "Failed to record invocation"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    #[tokio::test]
    async fn records_carry_kind_and_token_counts() {
        let storage = Arc::new(MemoryStorage::new());
        let recorder = UsageRecorder::new(storage.clone());

        recorder
            .record(
                "acct-1",
                "c1",
                InvocationKind::Flag,
                "test-model",
                TokenUsage {
                    input_tokens: 120,
                    output_tokens: 1,
                },
            )
            .await;

        let records = storage.invocations().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, InvocationKind::Flag);
        assert_eq!(records[0].model_name, "test-model");
        assert_eq!(records[0].input_tokens, 120);
        assert_eq!(records[0].output_tokens, 1);
    }
}
