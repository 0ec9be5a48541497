use crate::embeddings::Embedder;
use crate::traits::{KeywordIndex, PassageRetriever, VectorIndex};
use crate::{Passage, SearchCandidate, SearchError, SearchMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Rank offset of reciprocal rank fusion.
pub const RRF_CONSTANT: f64 = 60.0;
pub const SEMANTIC_WEIGHT: f64 = 0.5;
pub const LEXICAL_WEIGHT: f64 = 0.5;
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone)]
pub struct FusedPassage {
    pub passage: Passage,
    pub score: f64,
    pub modes: Vec<SearchMode>,
}

/// Weighted reciprocal rank fusion.
///
/// A passage at 1-based rank `r` of a list with weight `w` earns
/// `w / (r + RRF_CONSTANT)`; a passage found by several lists is kept once
/// with its contributions summed. The result is ordered by combined score,
/// ties keeping the order in which passages were first seen across the lists.
pub fn fuse_ranked_lists(lists: &[(&[SearchCandidate], f64)]) -> Vec<FusedPassage> {
    let mut fused: Vec<FusedPassage> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (hits, weight) in lists {
        for (rank, hit) in hits.iter().enumerate() {
            let contribution = weight / (rank as f64 + 1.0 + RRF_CONSTANT);
            match positions.get(&hit.passage.passage_id) {
                Some(&position) => {
                    let entry = &mut fused[position];
                    entry.score += contribution;
                    if !entry.modes.contains(&hit.mode) {
                        entry.modes.push(hit.mode);
                    }
                }
                None => {
                    positions.insert(hit.passage.passage_id.clone(), fused.len());
                    fused.push(FusedPassage {
                        passage: hit.passage.clone(),
                        score: contribution,
                        modes: vec![hit.mode],
                    });
                }
            }
        }
    }

    fused.sort_by(|left, right| right.score.total_cmp(&left.score));
    fused
}

/// Semantic and lexical search over one passage set, fused 0.5 / 0.5.
pub struct HybridRetriever<K, V>
where
    K: KeywordIndex,
    V: VectorIndex,
{
    keyword: K,
    vector: V,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl<K, V> HybridRetriever<K, V>
where
    K: KeywordIndex + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(keyword: K, vector: V, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            keyword,
            vector,
            embedder,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn is_empty(&self) -> bool {
        self.keyword.is_empty() && self.vector.is_empty()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<FusedPassage>, SearchError> {
        let semantic_hits = if self.vector.is_empty() {
            Vec::new()
        } else {
            let query_vector = self.embedder.embed_query(query).await?;
            self.vector.search_vector(&query_vector, self.top_k)?
        };
        let lexical_hits = self.keyword.search_keyword(query, self.top_k);

        debug!(
            semantic = semantic_hits.len(),
            lexical = lexical_hits.len(),
            "fusing retriever results"
        );

        Ok(fuse_ranked_lists(&[
            (semantic_hits.as_slice(), SEMANTIC_WEIGHT),
            (lexical_hits.as_slice(), LEXICAL_WEIGHT),
        ]))
    }
}

#[async_trait]
impl<K, V> PassageRetriever for HybridRetriever<K, V>
where
    K: KeywordIndex + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, SearchError> {
        Ok(self
            .search(query)
            .await?
            .into_iter()
            .map(|fused| fused.passage)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::Bm25Index;
    use crate::{CharacterNgramEmbedder, PassageMetadata};

    fn passage(id: &str, text: &str) -> Passage {
        Passage {
            passage_id: id.to_string(),
            text: text.to_string(),
            metadata: PassageMetadata {
                source: "doc.pdf".to_string(),
                page: 1,
            },
        }
    }

    fn candidate(id: &str, mode: SearchMode) -> SearchCandidate {
        SearchCandidate {
            passage: passage(id, id),
            score: 1.0,
            mode,
        }
    }

    #[derive(Default)]
    struct FakeVectorIndex {
        hits: Vec<SearchCandidate>,
    }

    impl VectorIndex for FakeVectorIndex {
        fn len(&self) -> usize {
            self.hits.len()
        }

        fn search_vector(
            &self,
            _query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<SearchCandidate>, SearchError> {
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    #[test]
    fn shared_passages_are_merged_not_duplicated() {
        let semantic = vec![
            candidate("a", SearchMode::Semantic),
            candidate("b", SearchMode::Semantic),
        ];
        let lexical = vec![
            candidate("b", SearchMode::Lexical),
            candidate("c", SearchMode::Lexical),
        ];

        let fused = fuse_ranked_lists(&[(semantic.as_slice(), 0.5), (lexical.as_slice(), 0.5)]);

        let ids = fused
            .iter()
            .map(|hit| hit.passage.passage_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(fused[0].modes, vec![SearchMode::Semantic, SearchMode::Lexical]);
        let expected = 0.5 / 62.0 + 0.5 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let semantic = vec![candidate("s1", SearchMode::Semantic)];
        let lexical = vec![candidate("l1", SearchMode::Lexical)];

        let fused = fuse_ranked_lists(&[(semantic.as_slice(), 0.5), (lexical.as_slice(), 0.5)]);

        assert_eq!(fused[0].passage.passage_id, "s1");
        assert_eq!(fused[1].passage.passage_id, "l1");
    }

    #[test]
    fn fusion_of_nothing_is_empty() {
        let none: Vec<SearchCandidate> = Vec::new();
        assert!(fuse_ranked_lists(&[(none.as_slice(), 0.5), (none.as_slice(), 0.5)]).is_empty());
    }

    #[tokio::test]
    async fn empty_index_retrieves_nothing() -> Result<(), SearchError> {
        let retriever = HybridRetriever::new(
            Bm25Index::new(Vec::new()),
            FakeVectorIndex::default(),
            Arc::new(CharacterNgramEmbedder::default()),
            DEFAULT_TOP_K,
        );

        assert!(retriever.is_empty());
        assert!(retriever.retrieve("What color is the sky?").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn retrieval_is_deterministic() -> Result<(), SearchError> {
        let passages = vec![
            passage("p1", "pump pressure valve"),
            passage("p2", "pump flow rate"),
            passage("p3", "valve maintenance"),
        ];
        let retriever = HybridRetriever::new(
            Bm25Index::new(passages.clone()),
            FakeVectorIndex {
                hits: vec![
                    SearchCandidate {
                        passage: passages[2].clone(),
                        score: 0.9,
                        mode: SearchMode::Semantic,
                    },
                    SearchCandidate {
                        passage: passages[0].clone(),
                        score: 0.8,
                        mode: SearchMode::Semantic,
                    },
                ],
            },
            Arc::new(CharacterNgramEmbedder::default()),
            DEFAULT_TOP_K,
        );

        let first = retriever.retrieve("valve pump").await?;
        let second = retriever.retrieve("valve pump").await?;

        assert_eq!(first, second);
        let ids = first
            .iter()
            .map(|passage| passage.passage_id.as_str())
            .collect::<Vec<_>>();
        // p1 and p3 tie on fused score; p3 was seen first (semantic rank 1).
        assert_eq!(ids, vec!["p3", "p1", "p2"]);
        Ok(())
    }
}
