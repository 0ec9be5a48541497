use crate::models::Role;
use crate::traits::ChatModel;
use crate::{ChatMessage, LlmError, Passage};
use std::sync::Arc;
use tracing::{info, warn};

/// Context shorter than this (ignoring whitespace) is logged as suspicious.
pub const MIN_CONTEXT_CHARS: usize = 10;

/// Joins passage texts in retrieval order, separated by a blank line.
pub fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|passage| passage.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn context_is_thin(context: &str) -> bool {
    context.chars().filter(|c| !c.is_whitespace()).count() < MIN_CONTEXT_CHARS
}

pub fn system_instruction(context: &str, rewritten_question: &str) -> String {
    format!(
        "You are a helpful assistant.
Always refer to yourself as 'assistant' and address the user as 'Sir'.

You have been provided with the following context from the knowledge base:
{context}

The latest question, rewritten to stand on its own, is: {rewritten_question}

When answering questions:
1. Use the provided context above to answer the question
2. Analyze the retrieved documents carefully
3. Provide accurate answers based on the retrieved context
4. If the retrieved documents don't contain the answer, say so clearly
5. Cite specific information from the documents when possible

Think step by step and provide a clear, helpful answer."
    )
}

/// Grounded answer step: persona and rules in the system turn, then the
/// whole conversation.
#[derive(Clone)]
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn build_messages(
        rewritten_question: &str,
        context: &str,
        conversation: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::system(system_instruction(
            context,
            rewritten_question,
        )));
        messages.extend(
            conversation
                .iter()
                .filter(|message| message.role != Role::System)
                .cloned(),
        );
        messages
    }

    pub async fn generate(
        &self,
        rewritten_question: &str,
        context: &str,
        conversation: &[ChatMessage],
    ) -> Result<String, LlmError> {
        if context_is_thin(context) {
            warn!(
                context_chars = context.len(),
                "context is empty or very short; retrieval may have found nothing"
            );
        }

        let messages = Self::build_messages(rewritten_question, context, conversation);
        let answer = self.model.complete(&messages).await?;
        info!(model = self.model.model(), answer_chars = answer.len(), "answer generated");
        Ok(answer.trim().to_string())
    }
}
