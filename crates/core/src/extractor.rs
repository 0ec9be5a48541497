use crate::error::IngestError;
use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// Whole-document text extraction. Returns every page in page order, empty
/// pages included, so callers can judge each page on its own.
pub trait PdfExtractor {
    fn name(&self) -> &'static str;
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Renders a single page to an image and reads it back with OCR.
pub trait PageOcr {
    fn ocr_page(&self, path: &Path, page: u32) -> Result<String, IngestError>;
}

/// Structured extraction from the content streams via lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // undecodable pages come back empty and go down the fallback chain
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(path = %path.display(), page = page_no, %error, "lopdf page extraction failed");
                    String::new()
                }
            };
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Alternate extraction through pdf-extract's layout-aware text output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractExtractor;

impl PdfExtractor for PdfExtractExtractor {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    /// pdf-extract panics on some malformed documents (unknown fonts, broken
    /// encodings), so it runs on its own thread and a panic becomes an error.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let bytes = fs::read(path)?;
        let worker = thread::Builder::new()
            .name("pdf-extract".to_string())
            .spawn(move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
                    .map_err(|error| error.to_string())
            })?;

        let pages = match worker.join() {
            Ok(result) => result.map_err(IngestError::SecondaryExtraction)?,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!(path = %path.display(), %reason, "pdf-extract panicked");
                return Err(IngestError::SecondaryExtraction(format!(
                    "pdf-extract panicked: {reason}"
                )));
            }
        };

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| PageText {
                number: (index + 1) as u32,
                text,
            })
            .collect())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// OCR through the poppler `pdftoppm` renderer and the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub dpi: u32,
    pub language: Option<String>,
    pub pdftoppm_bin: PathBuf,
    pub tesseract_bin: PathBuf,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            dpi: 300,
            language: None,
            pdftoppm_bin: PathBuf::from("pdftoppm"),
            tesseract_bin: PathBuf::from("tesseract"),
        }
    }
}

impl TesseractOcr {
    fn render_page(&self, path: &Path, page: u32, workdir: &Path) -> Result<PathBuf, IngestError> {
        let prefix = workdir.join("page");
        let page_arg = page.to_string();
        let output = Command::new(&self.pdftoppm_bin)
            .arg("-r")
            .arg(self.dpi.to_string())
            .args(["-f", page_arg.as_str(), "-l", page_arg.as_str(), "-png"])
            .arg(path)
            .arg(&prefix)
            .output()
            .map_err(|error| {
                IngestError::OcrFailed(format!(
                    "could not run {}: {error}",
                    self.pdftoppm_bin.display()
                ))
            })?;

        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // pdftoppm zero-pads the page suffix depending on the page count, so
        // pick up whatever single image it produced.
        let mut images = fs::read_dir(workdir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|candidate| {
                candidate
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
            .collect::<Vec<_>>();
        images.sort_unstable();

        images.into_iter().next().ok_or(IngestError::PageOutOfRange {
            path: path.display().to_string(),
            page,
        })
    }
}

impl PageOcr for TesseractOcr {
    fn ocr_page(&self, path: &Path, page: u32) -> Result<String, IngestError> {
        let workdir = tempfile::tempdir()?;
        let image = self.render_page(path, page, workdir.path())?;

        let mut command = Command::new(&self.tesseract_bin);
        command.arg(&image).arg("stdout");
        if let Some(language) = &self.language {
            command.args(["-l", language.as_str()]);
        }

        let output = command.output().map_err(|error| {
            IngestError::OcrFailed(format!(
                "could not run {}: {error}",
                self.tesseract_bin.display()
            ))
        })?;

        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_text_pdf, write_undefined_font_pdf};
    use tempfile::tempdir;

    #[test]
    fn lopdf_reads_every_page_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("two.pdf");
        write_text_pdf(&path, &["First page text", "Second page text"])?;

        let pages = LopdfExtractor.extract_pages(&path)?;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert!(pages[0].text.contains("First page text"));
        assert!(pages[1].text.contains("Second page text"));
        Ok(())
    }

    #[test]
    fn lopdf_rejects_broken_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfExtractor.extract_pages(&path);

        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn pdf_extract_reads_every_page_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("two.pdf");
        write_text_pdf(&path, &["First page text", "Second page text"])?;

        let pages = PdfExtractExtractor.extract_pages(&path)?;
        let compact = |text: &str| text.split_whitespace().collect::<String>();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert!(compact(&pages[0].text).contains("Firstpagetext"));
        assert!(compact(&pages[1].text).contains("Secondpagetext"));
        Ok(())
    }

    #[test]
    fn pdf_extract_rejects_broken_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = PdfExtractExtractor.extract_pages(&path);

        assert!(matches!(result, Err(IngestError::SecondaryExtraction(_))));
        Ok(())
    }

    #[test]
    fn pdf_extract_panic_on_undefined_font_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("undefined-font.pdf");
        write_undefined_font_pdf(&path, "Text set in a font the page never declares")?;

        let result = PdfExtractExtractor.extract_pages(&path);

        assert!(matches!(result, Err(IngestError::SecondaryExtraction(_))));
        Ok(())
    }

    #[test]
    fn panic_payloads_become_messages() {
        let text: Box<dyn std::any::Any + Send> = Box::new("missing font");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("bad encoding"));
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(text.as_ref()), "missing font");
        assert_eq!(panic_message(owned.as_ref()), "bad encoding");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn missing_ocr_binary_is_an_ocr_failure() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("one.pdf");
        write_text_pdf(&path, &["Scanned"])?;

        let ocr = TesseractOcr {
            pdftoppm_bin: PathBuf::from("definitely-not-a-real-pdftoppm"),
            ..TesseractOcr::default()
        };

        let result = ocr.ocr_page(&path, 1);

        assert!(matches!(result, Err(IngestError::OcrFailed(_))));
        Ok(())
    }
}
