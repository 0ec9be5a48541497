use crate::models::Role;
use crate::traits::ChatModel;
use crate::{ChatMessage, LlmError};
use std::sync::Arc;
use tracing::info;

pub const REWRITE_INSTRUCTION: &str = "You are a query rewriting assistant. \
Rewrite the user's question to be fully self-contained. \
Resolve pronouns using the conversation history. \
If no rewrite is needed, return the original question.";

/// Turns a follow-up question into one that stands on its own.
#[derive(Clone)]
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn build_messages(latest_question: &str, prior_turns: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(prior_turns.len() + 2);
        messages.push(ChatMessage::system(REWRITE_INSTRUCTION));
        messages.extend(
            prior_turns
                .iter()
                .filter(|message| message.role != Role::System)
                .cloned(),
        );
        messages.push(ChatMessage::user(latest_question));
        messages
    }

    /// One model call, no retry. A blank rewrite keeps the original question.
    pub async fn rewrite(
        &self,
        latest_question: &str,
        prior_turns: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let messages = Self::build_messages(latest_question, prior_turns);
        let rewritten = self.model.complete(&messages).await?;
        let rewritten = rewritten.trim();

        let rewritten = if rewritten.is_empty() {
            latest_question.to_string()
        } else {
            rewritten.to_string()
        };
        info!(original = %latest_question, rewritten = %rewritten, "query rewritten");
        Ok(rewritten)
    }
}
