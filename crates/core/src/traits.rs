use crate::{ChatMessage, LlmError, Passage, SearchCandidate, SearchError};
use async_trait::async_trait;

/// Lexical search over the indexed passages.
pub trait KeywordIndex {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search_keyword(&self, query: &str, top_k: usize) -> Vec<SearchCandidate>;
}

/// Similarity search over passage embeddings.
pub trait VectorIndex {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchCandidate>, SearchError>;
}

#[async_trait]
pub trait PassageRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, SearchError>;
}

/// Text completion over a role-tagged message list.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
