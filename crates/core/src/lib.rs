pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fallback;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod rewrite;
pub mod session;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{build_passages, split_text, ChunkingConfig};
pub use config::{load_dotenv, OpenAiSettings, Settings};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OpenAiEmbedder};
pub use error::{ConfigError, IngestError, LlmError, PipelineError, SearchError};
pub use extractor::{LopdfExtractor, PageOcr, PageText, PdfExtractExtractor, PdfExtractor, TesseractOcr};
pub use fallback::{is_likely_garbled, ExtractedPage, ExtractionChain};
pub use generation::{format_context, AnswerGenerator};
pub use index::{setup_index, IndexLocation, KnowledgeBase};
pub use ingest::{discover_pdf_files, ingest_best_effort, IngestionReport, PdfSource, SkippedPdf};
pub use llm::OpenAiChatModel;
pub use models::{
    ChatMessage, ConversationState, ExtractionMethod, IngestionOptions, Passage, PassageMetadata,
    Role, SearchCandidate, SearchMode,
};
pub use pipeline::{RagPipeline, Stage};
pub use retriever::{fuse_ranked_lists, FusedPassage, HybridRetriever};
pub use rewrite::QueryRewriter;
pub use session::{new_session_id, InMemorySessionStore, SessionStore};
pub use stores::{Bm25Index, LocalVectorStore, RebuildPolicy};
pub use traits::{ChatModel, KeywordIndex, PassageRetriever, VectorIndex};
