use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("secondary extraction failed: {0}")]
    SecondaryExtraction(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("page {page} is out of range for {path}")]
    PageOutOfRange { path: String, page: u32 },

    #[error("OCR failed: {0}")]
    OcrFailed(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("index was built with {stored} but the current embedder is {current}; rebuild it by ingesting again")]
    IncompatibleIndex { stored: String, current: String },
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{model} returned {status}: {details}")]
    Status {
        model: String,
        status: u16,
        details: String,
    },

    #[error("{0} returned no completion choices")]
    EmptyCompletion(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "{name} not found. Set it in the environment, e.g. `export {name}=your-api-key-here`"
    )]
    Missing { name: &'static str },

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("could not load {path}: {reason}")]
    Dotenv { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query rewrite failed: {0}")]
    QueryRewrite(#[source] LlmError),

    #[error("document retrieval failed: {0}")]
    RetrieveDocs(#[source] SearchError),

    #[error("answer generation failed: {0}")]
    Agent(#[source] LlmError),

    #[error("turn has no user message")]
    MissingQuestion,
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
