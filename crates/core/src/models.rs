use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassageMetadata {
    /// File name of the source document.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub passage_id: String,
    pub text: String,
    pub metadata: PassageMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExtractionMethod {
    Primary,
    Secondary,
    Ocr,
    /// Secondary output kept after OCR failed.
    GarbledFallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Running state of one conversation. `messages` accumulates across turns,
/// the other fields describe the most recent turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub original_query: String,
    pub rewritten_query: String,
    pub retrieved_passages: Vec<Passage>,
    pub context: String,
    pub output: String,
}

impl ConversationState {
    /// Fresh input for one turn: a single user message.
    pub fn from_question(question: impl Into<String>) -> Self {
        let question = question.into();
        Self {
            messages: vec![ChatMessage::user(question.clone())],
            original_query: question,
            ..Self::default()
        }
    }

    pub fn latest_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }

    /// Final answer of the turn, falling back to the last non-empty message.
    pub fn answer(&self) -> &str {
        if !self.output.is_empty() {
            return &self.output;
        }
        self.messages
            .iter()
            .rev()
            .map(|message| message.content.as_str())
            .find(|content| !content.is_empty())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SearchMode {
    Lexical,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub passage: Passage,
    pub score: f64,
    pub mode: SearchMode,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 200,
        }
    }
}
