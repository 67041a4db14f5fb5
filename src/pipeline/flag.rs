//! Flag client — asks the LLM whether a human realtor should step in.

use std::sync::Arc;

use tracing::{error, info};

use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::model::TokenUsage;

const FLAG_MAX_TOKENS: u32 = 5;
const FLAG_TEMPERATURE: f32 = 0.0;
const FLAG_TOP_P: f32 = 0.1;
const FLAG_STOP: &[&str] = &["\n", ".", " ", ","];

/// The one completion that means "escalate".
const FLAG_TOKEN: &str = "flag";

const FLAG_INSTRUCTIONS: &str = "\
You are a specialized real estate deal progression analyzer. Your task is to identify \
when a conversation needs human intervention to close a deal or handle tasks that AI \
cannot perform.

IMPORTANT: You can ONLY respond with either \"flag\" or \"false\". No other text or explanation.

Flag the email if ANY of these conditions indicate the conversation is ready for human intervention:
1. The client shows clear buying/selling intent and is ready to move forward
2. There are specific requests for property viewings or showings
3. The client wants to discuss or negotiate specific terms of a deal
4. There are requests for in-person meetings or calls
5. The client is ready to make an offer or discuss pricing
6. There are questions about contracts, legal documents, or signing processes
7. The client needs help with mortgage pre-approval or financing options
8. There are specific scheduling requests for property tours or inspections
9. The client wants to discuss property-specific details that require human expertise
10. There are requests for market analysis or property comparisons

Do NOT flag if:
1. The conversation is still in early stages of general inquiry
2. The client is just gathering initial information
3. The email is purely informational or confirmatory
4. The conversation can be handled by AI responses
5. There are no specific actions or decisions needed from a human

Remember: The goal is to identify when a human realtor needs to step in to close a deal \
or handle tasks that AI cannot perform.";

/// Decides whether a conversation should be escalated to a human.
///
/// Fail-open: any provider failure or unrecognized output is a confident
/// "do not flag". A missed escalation is judged lower risk than failing the
/// whole pipeline, so there is no retry and no error path.
pub struct FlagClient {
    llm: Arc<dyn LlmProvider>,
}

impl FlagClient {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Model identifier for audit records.
    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Decide whether to flag. `formatted` is the transcript rendering
    /// from [`crate::pipeline::normalize::format_for_review`].
    pub async fn decide(
        &self,
        account_id: &str,
        conversation_id: &str,
        formatted: &str,
    ) -> (bool, TokenUsage) {
        let user_prompt = format!(
            "Here is the email conversation:\n{formatted}\n\nBased on the conversation above, \
             should this email be flagged for human realtor intervention? \
             Respond with ONLY \"flag\" or \"false\":"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(FLAG_INSTRUCTIONS),
            ChatMessage::user(user_prompt),
        ])
        .with_max_tokens(FLAG_MAX_TOKENS)
        .with_temperature(FLAG_TEMPERATURE)
        .with_top_p(FLAG_TOP_P)
        .with_stop(FLAG_STOP);

        match self.llm.complete(request).await {
            Ok(response) => {
                let decision = response.content.trim().to_lowercase() == FLAG_TOKEN;
                info!(
                    account = %account_id,
                    conversation = %conversation_id,
                    flagged = decision,
                    raw = %response.content.trim(),
                    "Flag decision"
                );
                (decision, response.usage)
            }
            Err(e) => {
                error!(
                    account = %account_id,
                    conversation = %conversation_id,
                    error = %e,
                    "Flag call failed, defaulting to not-flag"
                );
                (false, TokenUsage::default())
            }
        }
    }
}
