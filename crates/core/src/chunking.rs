use crate::error::IngestError;
use crate::models::{IngestionOptions, Passage, PassageMetadata};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::debug;

/// Separators tried in order; the empty separator splits into characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits text into chunks of at most `chunk_size` characters where the
/// separators allow it, with neighbouring chunks sharing up to
/// `chunk_overlap` characters.
///
/// The coarsest separator present in the text is used first; pieces that are
/// still too long are split again with the next separator. Separators stay
/// attached to the start of the piece that follows them, and every chunk is
/// trimmed. Whitespace-only chunks are dropped.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut separator = separators.last().copied().unwrap_or("");
    let mut finer: &[&str] = &[];
    for (index, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = candidate;
            break;
        }
        if text.contains(candidate) {
            separator = candidate;
            finer = &separators[index + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, config));
            pending.clear();
        }

        if finer.is_empty() {
            chunks.push(piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, finer, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, config));
    }

    chunks
}

fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn merge_pieces(pieces: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut merged = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let length = char_len(piece);

        if total + length > config.chunk_size {
            if total > config.chunk_size {
                debug!(
                    total,
                    chunk_size = config.chunk_size,
                    "created a chunk longer than the configured size"
                );
            }

            if !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    merged.push(chunk);
                }

                while total > config.chunk_overlap
                    || (total + length > config.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
        }

        window.push_back(piece);
        total += length;
    }

    if let Some(chunk) = join_trimmed(&window) {
        merged.push(chunk);
    }

    merged
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits one page into passages carrying the page's source metadata.
pub fn build_passages(
    source: &str,
    page: u32,
    page_text: &str,
    config: ChunkingConfig,
) -> Vec<Passage> {
    split_text(page_text, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Passage {
            passage_id: make_passage_id(source, page, index as u64, &text),
            metadata: PassageMetadata {
                source: source.to_string(),
                page,
            },
            text,
        })
        .collect()
}

fn make_passage_id(source: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
