use crate::config::OpenAiSettings;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const OPENAI_BATCH_SIZE: usize = 256;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| SearchError::BackendResponse {
            backend: self.name().to_string(),
            details: "no embedding returned for query".to_string(),
        })
    }
}

/// Hashed character-trigram embedding. Deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "character-ngram"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for the `/embeddings` endpoint of an OpenAI-compatible API.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(settings: &OpenAiSettings) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            endpoint: settings.base_url.join("embeddings")?,
            api_key: settings.api_key.clone(),
            model: settings.embedding_model.clone(),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: format!("openai embeddings ({})", self.model),
                details: format!("{status}: {body}"),
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        order_embeddings(payload, batch.len())
    }
}

fn order_embeddings(
    mut payload: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, SearchError> {
    if payload.data.len() != expected {
        return Err(SearchError::BackendResponse {
            backend: "openai embeddings".to_string(),
            details: format!(
                "expected {expected} embeddings, received {}",
                payload.data.len()
            ),
        });
    }

    payload.data.sort_by_key(|datum| datum.index);
    Ok(payload
        .data
        .into_iter()
        .map(|datum| datum.embedding)
        .collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(OPENAI_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}
