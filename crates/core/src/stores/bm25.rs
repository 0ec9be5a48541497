use crate::traits::KeywordIndex;
use crate::{Passage, SearchCandidate, SearchMode};
use std::collections::{BTreeMap, HashMap, HashSet};

const K1: f64 = 1.5;
const B: f64 = 0.75;
/// Floor for negative idf values, as a fraction of the mean idf.
const EPSILON: f64 = 0.25;

/// In-memory Okapi BM25 index.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    passages: Vec<Passage>,
    term_frequencies: Vec<HashMap<String, u32>>,
    lengths: Vec<usize>,
    average_length: f64,
    idf: HashMap<String, f64>,
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl Bm25Index {
    pub fn new(passages: Vec<Passage>) -> Self {
        let mut term_frequencies = Vec::with_capacity(passages.len());
        let mut lengths = Vec::with_capacity(passages.len());
        // Ordered so the idf sum is identical across rebuilds.
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();

        for passage in &passages {
            let tokens = tokenize(&passage.text);
            lengths.push(tokens.len());

            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token).or_insert(0) += 1;
            }
            for term in frequencies.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            term_frequencies.push(frequencies);
        }

        let corpus_size = passages.len() as f64;
        let average_length = if passages.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f64 / corpus_size
        };

        let mut idf = HashMap::with_capacity(document_frequency.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, frequency) in document_frequency {
            let frequency = frequency as f64;
            let value = ((corpus_size - frequency + 0.5) / (frequency + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }

        if !idf.is_empty() {
            let floor = EPSILON * idf_sum / idf.len() as f64;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            passages,
            term_frequencies,
            lengths,
            average_length,
            idf,
        }
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    fn score(&self, index: usize, query_terms: &[String]) -> f64 {
        let frequencies = &self.term_frequencies[index];
        let length_norm = if self.average_length > 0.0 {
            1.0 - B + B * self.lengths[index] as f64 / self.average_length
        } else {
            1.0
        };

        query_terms
            .iter()
            .filter_map(|term| {
                let frequency = f64::from(*frequencies.get(term)?);
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                Some(idf * frequency * (K1 + 1.0) / (frequency + K1 * length_norm))
            })
            .sum()
    }
}

impl KeywordIndex for Bm25Index {
    fn len(&self) -> usize {
        self.passages.len()
    }

    /// Passages sharing at least one term with the query, best first. Ties
    /// keep index order.
    fn search_keyword(&self, query: &str, top_k: usize) -> Vec<SearchCandidate> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let distinct: HashSet<&String> = query_terms.iter().collect();

        let mut scored = self
            .term_frequencies
            .iter()
            .enumerate()
            .filter(|(_, frequencies)| distinct.iter().any(|term| frequencies.contains_key(*term)))
            .map(|(index, _)| (index, self.score(index, &query_terms)))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(index, score)| SearchCandidate {
                passage: self.passages[index].clone(),
                score,
                mode: SearchMode::Lexical,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PassageMetadata;

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

    #[test]
    fn tokens_are_lowercased_words() {
        assert_eq!(tokenize("The Sky, is BLUE!"), vec!["the", "sky", "is", "blue"]);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = Bm25Index::new(Vec::new());
        assert!(index.is_empty());
        assert!(index.search_keyword("anything", 10).is_empty());
    }

    #[test]
    fn rarer_terms_rank_higher() {
        let index = Bm25Index::new(vec![
            passage("a", "pump pressure valve"),
            passage("b", "pump flow rate"),
            passage("c", "pump maintenance schedule"),
            passage("d", "electrical wiring diagram"),
        ]);

        let hits = index.search_keyword("valve pump", 10);

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].passage.passage_id, "a");
        assert!(hits.iter().all(|hit| hit.mode == SearchMode::Lexical));
    }

    #[test]
    fn non_matching_passages_are_excluded() {
        let index = Bm25Index::new(vec![passage("a", "red apples"), passage("b", "green pears")]);

        let hits = index.search_keyword("apples", 10);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.passage_id, "a");
    }

    #[test]
    fn single_passage_corpus_still_matches() {
        let index = Bm25Index::new(vec![passage("only", "The sky is blue.")]);

        let hits = index.search_keyword("What color is the sky?", 10);

        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn results_are_truncated_to_top_k() {
        let passages = (0..20)
            .map(|index| passage(&index.to_string(), "shared term"))
            .collect();
        let index = Bm25Index::new(passages);

        let hits = index.search_keyword("shared", 5);

        assert_eq!(hits.len(), 5);
        let ids = hits
            .iter()
            .map(|hit| hit.passage.passage_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }
}
