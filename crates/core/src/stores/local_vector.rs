use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{Passage, SearchCandidate, SearchError, SearchMode};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Delays applied around deleting an index directory before a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct RebuildPolicy {
    /// Wait before the single retry after a permission error.
    pub retry_delay: Duration,
    /// Wait after a successful delete so the filesystem can flush.
    pub settle_delay: Duration,
}

impl Default for RebuildPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl RebuildPolicy {
    pub fn immediate() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorRecord {
    passage: Passage,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCollection {
    collection: String,
    embedder: String,
    records: Vec<VectorRecord>,
}

/// Directory-backed similarity index, one JSON file per collection.
#[derive(Debug, Clone)]
pub struct LocalVectorStore {
    directory: PathBuf,
    collection: String,
    embedder: String,
    records: Vec<VectorRecord>,
}

impl LocalVectorStore {
    fn collection_path(directory: &Path, collection: &str) -> PathBuf {
        directory.join(format!("{collection}.json"))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Name of the embedder the stored vectors came from; empty for a new index.
    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    fn dimensions(&self) -> Option<usize> {
        self.records.first().map(|record| record.embedding.len())
    }

    /// Fails when `embedder` cannot produce vectors comparable to the stored
    /// ones. An empty index accepts any embedder.
    pub async fn ensure_compatible(&self, embedder: &dyn Embedder) -> Result<(), SearchError> {
        let Some(stored_dims) = self.dimensions() else {
            return Ok(());
        };

        if self.embedder != embedder.name() {
            return Err(SearchError::IncompatibleIndex {
                stored: self.embedder.clone(),
                current: embedder.name().to_string(),
            });
        }

        let current_dims = embedder.embed_query("dimension check").await?.len();
        if current_dims != stored_dims {
            return Err(SearchError::IncompatibleIndex {
                stored: format!("{} ({stored_dims} dimensions)", self.embedder),
                current: format!("{} ({current_dims} dimensions)", embedder.name()),
            });
        }
        Ok(())
    }

    pub fn passages(&self) -> Vec<Passage> {
        self.records
            .iter()
            .map(|record| record.passage.clone())
            .collect()
    }

    /// Loads a persisted collection, or starts an empty one when none exists.
    pub async fn open(directory: &Path, collection: &str) -> Result<Self, SearchError> {
        let path = Self::collection_path(directory, collection);

        let (embedder, records) = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedCollection = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    records = persisted.records.len(),
                    embedder = %persisted.embedder,
                    "loaded existing index"
                );
                (persisted.embedder, persisted.records)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "no documents supplied and no existing index; creating an empty index"
                );
                (String::new(), Vec::new())
            }
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            directory: directory.to_path_buf(),
            collection: collection.to_string(),
            embedder,
            records,
        })
    }

    /// Replaces the whole index directory with freshly embedded passages.
    pub async fn rebuild(
        directory: &Path,
        collection: &str,
        passages: Vec<Passage>,
        embedder: &dyn Embedder,
        policy: RebuildPolicy,
    ) -> Result<Self, SearchError> {
        remove_index_directory(directory, policy).await?;

        info!(passages = passages.len(), embedder = embedder.name(), "embedding passages");
        let texts = passages
            .iter()
            .map(|passage| passage.text.clone())
            .collect::<Vec<_>>();
        let embeddings = embedder.embed_documents(&texts).await?;
        if embeddings.len() != passages.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match passage count {}",
                embeddings.len(),
                passages.len()
            )));
        }

        let records = passages
            .into_iter()
            .zip(embeddings)
            .map(|(passage, embedding)| VectorRecord { passage, embedding })
            .collect::<Vec<_>>();

        tokio::fs::create_dir_all(directory).await?;
        let persisted = PersistedCollection {
            collection: collection.to_string(),
            embedder: embedder.name().to_string(),
            records,
        };
        let path = Self::collection_path(directory, collection);
        tokio::fs::write(&path, serde_json::to_vec(&persisted)?).await?;
        info!(path = %path.display(), records = persisted.records.len(), "index created");

        Ok(Self {
            directory: directory.to_path_buf(),
            collection: collection.to_string(),
            embedder: persisted.embedder,
            records: persisted.records,
        })
    }
}

async fn remove_index_directory(directory: &Path, policy: RebuildPolicy) -> Result<(), SearchError> {
    if !tokio::fs::try_exists(directory).await? {
        return Ok(());
    }

    info!(directory = %directory.display(), "removing existing index to rebuild with new documents");
    match tokio::fs::remove_dir_all(directory).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::PermissionDenied => {
            warn!(%error, "permission error removing index; retrying after delay");
            tokio::time::sleep(policy.retry_delay).await;
            tokio::fs::remove_dir_all(directory).await?;
        }
        Err(error) => return Err(error.into()),
    }

    tokio::time::sleep(policy.settle_delay).await;
    Ok(())
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut left_norm = 0.0f64;
    let mut right_norm = 0.0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm.sqrt() * right_norm.sqrt())
    }
}

impl VectorIndex for LocalVectorStore {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        let mut scored = Vec::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            if record.embedding.len() != query_vector.len() {
                return Err(SearchError::Request(format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    record.embedding.len()
                )));
            }
            scored.push((index, cosine_similarity(query_vector, &record.embedding)));
        }

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(index, score)| SearchCandidate {
                passage: self.records[index].passage.clone(),
                score,
                mode: SearchMode::Semantic,
            })
            .collect())
    }
}
