//! Per-turn question answering: `QUERY_REWRITE -> RETRIEVE_DOCS -> AGENT`.
//!
//! Stages run strictly in order. A stage error aborts the turn, leaves the
//! stored session untouched, and is returned tagged with the failing stage.

use crate::generation::{format_context, AnswerGenerator};
use crate::rewrite::QueryRewriter;
use crate::session::SessionStore;
use crate::traits::{ChatModel, PassageRetriever};
use crate::{ChatMessage, ConversationState, PipelineError};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    QueryRewrite,
    RetrieveDocs,
    Agent,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryRewrite => "QUERY_REWRITE",
            Self::RetrieveDocs => "RETRIEVE_DOCS",
            Self::Agent => "AGENT",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::QueryRewrite(_) => Some(Stage::QueryRewrite),
            Self::RetrieveDocs(_) => Some(Stage::RetrieveDocs),
            Self::Agent(_) => Some(Stage::Agent),
            Self::MissingQuestion => None,
        }
    }
}

/// Long-lived service context: built once, shared by every turn.
pub struct RagPipeline {
    rewriter: QueryRewriter,
    retriever: Arc<dyn PassageRetriever>,
    generator: AnswerGenerator,
    sessions: Arc<dyn SessionStore>,
}

impl RagPipeline {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn PassageRetriever>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            rewriter: QueryRewriter::new(model.clone()),
            retriever,
            generator: AnswerGenerator::new(model),
            sessions,
        }
    }

    /// Extends the session's history with `input.messages` and runs one turn.
    pub async fn invoke(
        &self,
        input: ConversationState,
        session_id: &str,
    ) -> Result<ConversationState, PipelineError> {
        let mut state = self.sessions.load(session_id).await.unwrap_or_default();
        let prior_turns = state.messages.clone();

        let asked = input.latest_question().map(str::to_string);
        let question = asked
            .clone()
            .or_else(|| Some(input.original_query.clone()).filter(|query| !query.is_empty()))
            .ok_or(PipelineError::MissingQuestion)?;

        state.messages.extend(input.messages);
        if asked.is_none() {
            state.messages.push(ChatMessage::user(question.clone()));
        }
        state.original_query = question;

        info!(session_id, stage = %Stage::QueryRewrite, "turn started");
        state.rewritten_query = self
            .rewriter
            .rewrite(&state.original_query, &prior_turns)
            .await
            .map_err(PipelineError::QueryRewrite)?;

        info!(stage = %Stage::RetrieveDocs, query = %state.rewritten_query, "retrieving");
        let query = if state.rewritten_query.is_empty() {
            state.original_query.as_str()
        } else {
            state.rewritten_query.as_str()
        };
        state.retrieved_passages = self
            .retriever
            .retrieve(query)
            .await
            .map_err(PipelineError::RetrieveDocs)?;
        state.context = format_context(&state.retrieved_passages);
        info!(
            passages = state.retrieved_passages.len(),
            context_chars = state.context.len(),
            "context assembled"
        );
        if state.retrieved_passages.is_empty() {
            warn!(query, "no passages retrieved");
        }

        info!(stage = %Stage::Agent, "generating answer");
        let answer = self
            .generator
            .generate(&state.rewritten_query, &state.context, &state.messages)
            .await
            .map_err(PipelineError::Agent)?;
        state.messages.push(ChatMessage::assistant(answer.clone()));
        state.output = answer;

        self.sessions.save(session_id, state.clone()).await;
        Ok(state)
    }

    pub async fn ask(&self, question: &str, session_id: &str) -> Result<String, PipelineError> {
        let state = self
            .invoke(ConversationState::from_question(question), session_id)
            .await?;
        Ok(state.output)
    }

    pub async fn reset(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id).await
    }
}
