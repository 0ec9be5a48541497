//! Per-page extraction fallback chain.
//!
//! Each page goes through the primary extractor first. Output that looks
//! garbled is retried with the secondary extractor and then with OCR. When
//! OCR itself fails the secondary output is kept as a last resort, so a page
//! never aborts the document.

use crate::error::IngestError;
use crate::extractor::{
    LopdfExtractor, PageOcr, PageText, PdfExtractExtractor, PdfExtractor, TesseractOcr,
};
use crate::models::ExtractionMethod;
use std::path::Path;
use tracing::{debug, info, warn};

const MIN_READABLE_CHARS: usize = 100;
const MIN_ALNUM_RATIO: f64 = 0.1;
const MAX_CONTROL_CHARS: usize = 10;

/// Heuristic for extraction output that is too noisy to index.
///
/// Text is garbled when it has fewer than 100 characters, when the ratio of
/// alphanumeric to other characters is below 0.1 (no other characters counts
/// as a ratio of 1.0), or when it holds more than 10 ASCII control characters.
pub fn is_likely_garbled(text: &str) -> bool {
    let total = text.chars().count();
    if total < MIN_READABLE_CHARS {
        return true;
    }

    let alphanumeric = text.chars().filter(|c| c.is_alphanumeric()).count();
    let other = total - alphanumeric;
    let ratio = if other == 0 {
        1.0
    } else {
        alphanumeric as f64 / other as f64
    };
    if ratio < MIN_ALNUM_RATIO {
        return true;
    }

    control_char_count(text) > MAX_CONTROL_CHARS
}

fn control_char_count(text: &str) -> usize {
    text.chars()
        .filter(|c| matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}'))
        .count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub number: u32,
    pub text: String,
    pub method: ExtractionMethod,
}

type BoxedExtractor = Box<dyn PdfExtractor + Send + Sync>;
type BoxedOcr = Box<dyn PageOcr + Send + Sync>;

pub struct ExtractionChain {
    primary: BoxedExtractor,
    secondary: BoxedExtractor,
    ocr: BoxedOcr,
}

impl Default for ExtractionChain {
    fn default() -> Self {
        Self::new(
            Box::new(LopdfExtractor),
            Box::new(PdfExtractExtractor),
            Box::new(TesseractOcr::default()),
        )
    }
}

/// Secondary output for one document, produced on first use only.
#[derive(Default)]
pub struct SecondaryPages {
    pages: Option<Vec<PageText>>,
}

impl SecondaryPages {
    fn page(&mut self, extractor: &dyn PdfExtractor, path: &Path, number: u32) -> String {
        let pages = self.pages.get_or_insert_with(|| {
            extractor.extract_pages(path).unwrap_or_else(|error| {
                warn!(
                    path = %path.display(),
                    extractor = extractor.name(),
                    %error,
                    "secondary extraction failed; treating its output as empty"
                );
                Vec::new()
            })
        });

        pages
            .iter()
            .find(|page| page.number == number)
            .map(|page| page.text.clone())
            .unwrap_or_default()
    }
}

impl ExtractionChain {
    pub fn new(primary: BoxedExtractor, secondary: BoxedExtractor, ocr: BoxedOcr) -> Self {
        Self {
            primary,
            secondary,
            ocr,
        }
    }

    /// Extracts every page of `path`. Only a primary failure to open the
    /// document is an error.
    pub fn extract_document(&self, path: &Path) -> Result<Vec<ExtractedPage>, IngestError> {
        let primary_pages = self.primary.extract_pages(path)?;
        let mut secondary = SecondaryPages::default();

        Ok(primary_pages
            .into_iter()
            .map(|page| self.extract_page_text(path, page, &mut secondary))
            .collect())
    }

    pub fn extract_page_text(
        &self,
        path: &Path,
        primary: PageText,
        secondary: &mut SecondaryPages,
    ) -> ExtractedPage {
        debug!(path = %path.display(), page = primary.number, "extracting page");

        if !is_likely_garbled(&primary.text) {
            return ExtractedPage {
                number: primary.number,
                text: primary.text,
                method: ExtractionMethod::Primary,
            };
        }

        info!(
            page = primary.number,
            extractor = self.secondary.name(),
            "primary text looks garbled; switching extractor"
        );
        let secondary_text = secondary.page(self.secondary.as_ref(), path, primary.number);
        if !is_likely_garbled(&secondary_text) {
            return ExtractedPage {
                number: primary.number,
                text: secondary_text,
                method: ExtractionMethod::Secondary,
            };
        }

        info!(page = primary.number, "secondary text looks garbled; switching to OCR");
        match self.ocr.ocr_page(path, primary.number) {
            Ok(text) => ExtractedPage {
                number: primary.number,
                text,
                method: ExtractionMethod::Ocr,
            },
            Err(error) => {
                warn!(
                    path = %path.display(),
                    page = primary.number,
                    %error,
                    "OCR failed; keeping garbled secondary text as fallback"
                );
                ExtractedPage {
                    number: primary.number,
                    text: secondary_text,
                    method: ExtractionMethod::GarbledFallback,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) struct FixedExtractor {
        pub pages: Vec<String>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedExtractor {
        pub(crate) fn new(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|page| page.to_string()).collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl PdfExtractor for FixedExtractor {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .pages
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.clone(),
                })
                .collect())
        }
    }

    pub(crate) struct FixedOcr {
        pub result: Option<String>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedOcr {
        pub(crate) fn succeeding(text: &str) -> Self {
            Self {
                result: Some(text.to_string()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                result: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl PageOcr for FixedOcr {
        fn ocr_page(&self, _path: &Path, _page: u32) -> Result<String, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or_else(|| IngestError::OcrFailed("tesseract not installed".to_string()))
        }
    }
}
