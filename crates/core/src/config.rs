use crate::error::ConfigError;
use crate::ingest::{parse_path_list, PdfSource};
use crate::IngestionOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";

/// `.env` locations under the project root, in load order.
const DOTENV_FILES: [&str; 2] = [".env", "config/.env"];

/// Loads the `.env` files found under `root` into the process environment
/// and returns the ones that were read. Variables that are already set are
/// never overwritten, so the root file wins over `config/.env`.
pub fn load_dotenv(root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut loaded = Vec::new();
    for relative in DOTENV_FILES {
        let path = root.join(relative);
        if !path.is_file() {
            continue;
        }
        dotenvy::from_path(&path).map_err(|error| ConfigError::Dotenv {
            path: path.display().to_string(),
            reason: error.to_string(),
        })?;
        loaded.push(path);
    }
    Ok(loaded)
}

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: Url,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai: OpenAiSettings,
    pub ingestion: IngestionOptions,
    pub pdf_file_paths: Option<Vec<PathBuf>>,
    pub data_dir: PathBuf,
    pub collection_name: String,
    pub persist_directory: PathBuf,
    pub retrieval_k: usize,
    pub session_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing {
            name: "OPENAI_API_KEY",
        })?;
        let base_url = normalize_base_url(
            get("OPENAI_BASE_URL")
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL),
        )?;

        let openai = OpenAiSettings {
            api_key,
            base_url,
            chat_model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            temperature: parse_or("OPENAI_TEMPERATURE", get("OPENAI_TEMPERATURE"), 0.0)?,
            embedding_model: get("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                120,
            )?),
        };

        let ingestion = IngestionOptions {
            chunk_size: parse_or("CHUNK_SIZE", get("CHUNK_SIZE"), 800)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", get("CHUNK_OVERLAP"), 200)?,
        };

        let pdf_file_paths = get("PDF_FILE_PATHS")
            .map(|raw| parse_path_list(&raw))
            .filter(|paths| !paths.is_empty());

        Ok(Self {
            openai,
            ingestion,
            pdf_file_paths,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            collection_name: get("COLLECTION_NAME").unwrap_or_else(|| "RAG5".to_string()),
            persist_directory: PathBuf::from(
                get("PERSIST_DIRECTORY").unwrap_or_else(|| "RAG5".to_string()),
            ),
            retrieval_k: parse_or("RETRIEVAL_K", get("RETRIEVAL_K"), 10)?,
            session_ttl: Duration::from_secs(parse_or(
                "SESSION_TTL_SECS",
                get("SESSION_TTL_SECS"),
                3_600,
            )?),
        })
    }

    /// Explicit paths win over the data directory.
    pub fn pdf_source(&self) -> PdfSource {
        match &self.pdf_file_paths {
            Some(paths) => PdfSource::Files(paths.clone()),
            None => PdfSource::Directory(self.data_dir.clone()),
        }
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|error| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: error.to_string(),
        }),
    }
}

/// `Url::join` drops the last path segment unless it ends with a slash.
fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{raw}/"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let result = settings(&[]);
        assert!(matches!(
            result,
            Err(ConfigError::Missing {
                name: "OPENAI_API_KEY"
            })
        ));

        let blank = settings(&[("OPENAI_API_KEY", "   ")]);
        assert!(blank.is_err());
    }

    #[test]
    fn defaults_match_documented_values() -> Result<(), ConfigError> {
        let settings = settings(&[("OPENAI_API_KEY", "sk-test")])?;

        assert_eq!(settings.openai.chat_model, "gpt-4o");
        assert_eq!(settings.openai.temperature, 0.0);
        assert_eq!(settings.openai.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(settings.ingestion.chunk_size, 800);
        assert_eq!(settings.ingestion.chunk_overlap, 200);
        assert_eq!(settings.collection_name, "RAG5");
        assert_eq!(settings.retrieval_k, 10);
        assert!(settings.pdf_file_paths.is_none());
        assert_eq!(settings.pdf_source(), PdfSource::Directory(PathBuf::from("data")));
        Ok(())
    }

    #[test]
    fn explicit_pdf_paths_take_precedence() -> Result<(), ConfigError> {
        let settings = settings(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PDF_FILE_PATHS", "one.pdf, two.pdf"),
        ])?;

        assert_eq!(
            settings.pdf_source(),
            PdfSource::Files(vec![PathBuf::from("one.pdf"), PathBuf::from("two.pdf")])
        );
        Ok(())
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let result = settings(&[("OPENAI_API_KEY", "sk-test"), ("RETRIEVAL_K", "ten")]);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "RETRIEVAL_K",
                ..
            })
        ));
    }

    #[test]
    fn dotenv_files_fill_unset_variables_only() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        std::fs::create_dir(root.path().join("config"))?;
        std::fs::write(
            root.path().join(".env"),
            "PDF_QA_DOTENV_SHARED=root\nPDF_QA_DOTENV_PRESET=file\n",
        )?;
        std::fs::write(
            root.path().join("config/.env"),
            "PDF_QA_DOTENV_SHARED=config\nPDF_QA_DOTENV_NESTED=config\n",
        )?;
        std::env::set_var("PDF_QA_DOTENV_PRESET", "process");

        let loaded = load_dotenv(root.path())?;

        assert_eq!(loaded.len(), 2);
        assert_eq!(std::env::var("PDF_QA_DOTENV_SHARED")?, "root");
        assert_eq!(std::env::var("PDF_QA_DOTENV_NESTED")?, "config");
        assert_eq!(std::env::var("PDF_QA_DOTENV_PRESET")?, "process");
        Ok(())
    }

    #[test]
    fn missing_dotenv_files_are_fine() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;

        assert!(load_dotenv(root.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn base_url_gets_trailing_slash() -> Result<(), ConfigError> {
        let settings = settings(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1"),
        ])?;

        let joined = settings.openai.base_url.join("chat/completions")?;
        assert_eq!(joined.as_str(), "http://localhost:11434/v1/chat/completions");
        Ok(())
    }
}
