use crate::embeddings::Embedder;
use crate::retriever::HybridRetriever;
use crate::stores::{Bm25Index, LocalVectorStore, RebuildPolicy};
use crate::{Passage, SearchError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub type KnowledgeBase = HybridRetriever<Bm25Index, LocalVectorStore>;

#[derive(Debug, Clone)]
pub struct IndexLocation {
    pub directory: PathBuf,
    pub collection: String,
}

/// Builds the hybrid retriever over the persisted index.
///
/// With new passages the index directory is rebuilt from scratch; without
/// them the persisted collection is loaded as-is (or an empty one created),
/// and must have been embedded by the same model at the same dimension.
/// The lexical side is always built from the passages the vector side holds.
pub async fn setup_index(
    passages: Vec<Passage>,
    location: &IndexLocation,
    embedder: Arc<dyn Embedder>,
    policy: RebuildPolicy,
    top_k: usize,
) -> Result<KnowledgeBase, SearchError> {
    let store = if passages.is_empty() {
        info!(directory = %location.directory.display(), "no new documents; loading existing index");
        let store = LocalVectorStore::open(&location.directory, &location.collection).await?;
        store.ensure_compatible(embedder.as_ref()).await?;
        store
    } else {
        info!(passages = passages.len(), "creating index with new documents");
        LocalVectorStore::rebuild(
            &location.directory,
            &location.collection,
            passages,
            embedder.as_ref(),
            policy,
        )
        .await?
    };

    let stored = store.passages();
    if stored.is_empty() {
        warn!("index is empty; answers will have no supporting context");
    }
    let keyword = Bm25Index::new(stored);

    info!(top_k, "hybrid retriever ready (0.5 semantic, 0.5 lexical)");
    Ok(HybridRetriever::new(keyword, store, embedder, top_k))
}
