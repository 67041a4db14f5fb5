//! Scoring client — asks the LLM for a 0–100 conversion-likelihood score.

use std::sync::Arc;

use tracing::{error, info};

use crate::llm::retry::{RetryOutcome, retry_validated};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::model::TokenUsage;

/// The model returned no parseable integer after exhausting retries.
pub const SCORE_NOT_AN_INTEGER: i32 = -2;

/// Transport or provider failure (bad status, malformed body, timeout).
pub const SCORE_PROVIDER_FAILURE: i32 = -3;

/// Two attempts total: one retry covers transient formatting slips without
/// opening the door to retry storms.
const SCORE_ATTEMPTS: u32 = 2;

/// Only a number is expected back.
const SCORE_MAX_TOKENS: u32 = 3;
const SCORE_TEMPERATURE: f32 = 0.2;
const SCORE_TOP_P: f32 = 0.9;
const SCORE_TOP_K: u32 = 50;
const SCORE_REPETITION_PENALTY: f32 = 1.0;
const SCORE_STOP: &[&str] = &["<|im_end|>", "<|endoftext|>"];

const SCORING_RUBRIC: &str = "\
You are an assistant that assesses how likely a prospective buyer is to convert based on \
a series of emails exchanged with a realtor. Your job is to produce a single integer \
from 0 to 100 (representing 0%-100% chance of conversion) with no additional text or formatting.
When you evaluate, consider:
- Buyer urgency (e.g., asking to schedule a viewing immediately).
- Specific questions about financing, timelines, or next steps.
- Positive signals (e.g., \"I'd like to move forward,\" \"This looks perfect\").
- Hesitations or vague interest (e.g., \"Maybe later,\" \"Just browsing\").
- The number of back-and-forths and overall engagement level.
- Any explicit mention of being pre-approved, ready to tour, or ready to make an offer.
Even if you have very little information, make a reasonable speculative guess based on \
whatever context is available.
Always return a single integer between 0 and 100 inclusive - no explanations or extra text.";

/// Asks the LLM to score a normalized conversation.
///
/// Failure contract: returns a sentinel negative score instead of an error,
/// so callers must check `ev_score >= 0` before trusting the result.
pub struct ScoringClient {
    llm: Arc<dyn LlmProvider>,
}

impl ScoringClient {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Model identifier for audit records.
    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Score a conversation. Returns the clamped score (or a negative
    /// sentinel) plus provider-reported token usage.
    pub async fn score(
        &self,
        account_id: &str,
        conversation_id: &str,
        turns: Vec<ChatMessage>,
    ) -> (i32, TokenUsage) {
        info!(
            account = %account_id,
            conversation = %conversation_id,
            turns = turns.len(),
            "Calculating EV score"
        );

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(SCORING_RUBRIC));
        messages.extend(turns);

        let request = CompletionRequest::new(messages)
            .with_max_tokens(SCORE_MAX_TOKENS)
            .with_temperature(SCORE_TEMPERATURE)
            .with_top_p(SCORE_TOP_P)
            .with_top_k(SCORE_TOP_K)
            .with_repetition_penalty(SCORE_REPETITION_PENALTY)
            .with_stop(SCORE_STOP);

        // The retry covers formatting noise only; transport failures
        // short-circuit to the provider-failure sentinel.
        let outcome = retry_validated(
            SCORE_ATTEMPTS,
            || self.llm.complete(request.clone()),
            |response| is_score_text(&response.content),
        )
        .await;

        match outcome {
            Ok(RetryOutcome::Accepted(response)) => {
                let score = parse_score(&response.content);
                info!(
                    account = %account_id,
                    conversation = %conversation_id,
                    ev_score = score,
                    "EV score calculated"
                );
                (score, response.usage)
            }
            Ok(RetryOutcome::Exhausted(response)) => {
                error!(
                    account = %account_id,
                    conversation = %conversation_id,
                    raw = %response.content,
                    "Model did not return a valid integer"
                );
                (SCORE_NOT_AN_INTEGER, response.usage)
            }
            Err(e) => {
                error!(
                    account = %account_id,
                    conversation = %conversation_id,
                    error = %e,
                    "EV scoring call failed"
                );
                (SCORE_PROVIDER_FAILURE, TokenUsage::default())
            }
        }
    }
}

/// A valid completion is a run of 1–3 ASCII digits (after trimming).
fn is_score_text(content: &str) -> bool {
    let trimmed = content.trim();
    !trimmed.is_empty() && trimmed.len() <= 3 && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a validated completion, clamping into [0, 100] as a defense
/// against the model exceeding the requested range.
fn parse_score(content: &str) -> i32 {
    content
        .trim()
        .parse::<i32>()
        .map(|score| score.clamp(0, 100))
        .unwrap_or(SCORE_NOT_AN_INTEGER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    /// Stub provider that replays a fixed sequence of results.
    struct SequenceLlm {
        responses: Vec<Result<&'static str, ()>>,
        calls: AtomicU32,
    }

    impl SequenceLlm {
        fn new(responses: Vec<Result<&'static str, ()>>) -> Self {
            Self {
                responses,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for SequenceLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.responses.get(n).copied().unwrap_or(Ok("0")) {
                Ok(content) => Ok(CompletionResponse {
                    content: content.to_string(),
                    usage: TokenUsage {
                        input_tokens: 10,
                        output_tokens: 1,
                    },
                }),
                Err(()) => Err(LlmError::BadStatus {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    async fn score_with(responses: Vec<Result<&'static str, ()>>) -> (i32, u32) {
        let llm = Arc::new(SequenceLlm::new(responses));
        let client = ScoringClient::new(llm.clone());
        let (score, _) = client.score("acct-1", "c1", vec![ChatMessage::user("BUYER: hi")]).await;
        (score, llm.call_count())
    }

    #[tokio::test]
    async fn valid_scores_parse_and_clamp() {
        assert_eq!(score_with(vec![Ok("0")]).await, (0, 1));
        assert_eq!(score_with(vec![Ok("100")]).await, (100, 1));
        assert_eq!(score_with(vec![Ok("150")]).await, (100, 1));
        assert_eq!(score_with(vec![Ok("42")]).await, (42, 1));
        assert_eq!(score_with(vec![Ok(" 87\n")]).await, (87, 1));
    }

    #[tokio::test]
    async fn non_integer_on_both_attempts_yields_minus_two() {
        let (score, calls) = score_with(vec![Ok("N/A"), Ok("N/A")]).await;
        assert_eq!(score, SCORE_NOT_AN_INTEGER);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn retry_recovers_from_one_formatting_slip() {
        let (score, calls) = score_with(vec![Ok("score: 9"), Ok("9")]).await;
        assert_eq!(score, 9);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn provider_failure_yields_minus_three_without_retry() {
        let (score, calls) = score_with(vec![Err(()), Ok("42")]).await;
        assert_eq!(score, SCORE_PROVIDER_FAILURE);
        assert_eq!(calls, 1);
    }

    #[test]
    fn score_text_validation() {
        assert!(is_score_text("7"));
        assert!(is_score_text("100"));
        assert!(is_score_text("  42 "));
        assert!(!is_score_text("1000"));
        assert!(!is_score_text("-5"));
        assert!(!is_score_text("4.2"));
        assert!(!is_score_text(""));
        assert!(!is_score_text("N/A"));
    }
}
