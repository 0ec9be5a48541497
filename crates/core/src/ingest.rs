use crate::chunking::{build_passages, ChunkingConfig};
use crate::fallback::ExtractionChain;
use crate::{ExtractionMethod, IngestError, IngestionOptions, Passage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Where ingestion reads its PDFs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
    /// Every `*.pdf` directly inside the directory.
    Directory(PathBuf),
    /// Explicit file list; entries that do not exist are skipped.
    Files(Vec<PathBuf>),
}

/// Top-level PDFs of `folder`, sorted. A missing folder yields nothing.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Keeps the paths that point at existing files.
pub fn resolve_pdf_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| {
            let exists = path.is_file();
            if !exists {
                warn!(path = %path.display(), "file not found");
            }
            exists
        })
        .cloned()
        .collect()
}

/// Splits a comma-separated path list, trimming entries and dropping blanks.
pub fn parse_path_list(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub passages: Vec<Passage>,
    pub skipped_files: Vec<SkippedPdf>,
    pub processed_files: usize,
    pub pages_by_method: HashMap<ExtractionMethod, usize>,
}

impl IngestionReport {
    pub fn pages_extracted_with(&self, method: ExtractionMethod) -> usize {
        self.pages_by_method.get(&method).copied().unwrap_or(0)
    }
}

/// Extracts and chunks every PDF of `source`. Files that fail are skipped
/// and recorded; only an invalid chunking configuration is an error.
pub fn ingest_best_effort(
    source: &PdfSource,
    chain: &ExtractionChain,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;

    let files = match source {
        PdfSource::Directory(folder) => {
            let files = discover_pdf_files(folder);
            info!(folder = %folder.display(), count = files.len(), "looking for pdfs");
            files
        }
        PdfSource::Files(paths) => {
            let files = resolve_pdf_paths(paths);
            info!(requested = paths.len(), count = files.len(), "using explicit pdf paths");
            files
        }
    };

    let mut report = IngestionReport::default();
    if files.is_empty() {
        warn!("no pdf files found; nothing to ingest");
        return Ok(report);
    }

    for path in files {
        info!(path = %path.display(), "processing pdf");
        match ingest_file(&path, chain, config) {
            Ok((passages, methods)) => {
                report.processed_files += 1;
                report.passages.extend(passages);
                for method in methods {
                    *report.pages_by_method.entry(method).or_insert(0) += 1;
                }
            }
            Err(failure) => {
                error!(path = %path.display(), error = %failure, "failed to process pdf; skipping");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: failure.to_string(),
                });
            }
        }
    }

    info!(passages = report.passages.len(), "ingestion finished");
    Ok(report)
}

fn ingest_file(
    path: &Path,
    chain: &ExtractionChain,
    config: ChunkingConfig,
) -> Result<(Vec<Passage>, Vec<ExtractionMethod>), IngestError> {
    let source = source_name(path)?;
    let pages = chain.extract_document(path)?;

    let mut passages = Vec::new();
    let mut methods = Vec::with_capacity(pages.len());
    for page in pages {
        passages.extend(build_passages(&source, page.number, &page.text, config));
        methods.push(page.method);
    }

    Ok((passages, methods))
}

fn source_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}
