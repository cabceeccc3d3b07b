//! Tesseract OCR backend.
//!
//! PDFs are rasterised with `pdftoppm` at 300 DPI and each page image is
//! passed to `tesseract`. Image inputs are recognised directly.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::process::{check_binary, run_abortable};
use super::{Backend, BackendError, ExtractContext, ExtractOptions};

const TESSERACT_HINT: &str = "Tesseract not installed. Install with: apt install tesseract-ocr";
const PDFTOPPM_HINT: &str = "pdftoppm not installed. Install with: apt install poppler-utils";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

/// Tesseract OCR backend.
#[derive(Debug, Default)]
pub struct TesseractBackend;

impl TesseractBackend {
    pub fn new() -> Self {
        Self
    }

    /// Run Tesseract on an image file.
    fn run_tesseract(
        &self,
        image_path: &Path,
        language: &str,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image_path)
            .arg("stdout")
            .args(["-l", tesseract_language(language)]);
        Ok(run_abortable(cmd, &ctx.abort, TESSERACT_HINT)?.stdout)
    }

    /// Rasterise every page of a PDF into `output_dir`, returning images in page order.
    fn rasterise(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        ctx: &ExtractContext,
    ) -> Result<Vec<PathBuf>, BackendError> {
        let mut cmd = Command::new("pdftoppm");
        cmd.args(["-png", "-r", "300"])
            .arg(pdf_path)
            .arg(output_dir.join("page"));
        run_abortable(cmd, &ctx.abort, PDFTOPPM_HINT)?;

        // pdftoppm names files page-1.png or page-01.png depending on page count
        let mut pages: Vec<PathBuf> = std::fs::read_dir(output_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
            .collect();
        pages.sort_by_key(|p| page_number(p));
        Ok(pages)
    }
}

/// Map document language codes to Tesseract traineddata names.
fn tesseract_language(language: &str) -> &str {
    match language {
        "ch" | "zh" | "chinese" => "chi_sim",
        "chinese_cht" => "chi_tra",
        "en" | "english" => "eng",
        "ja" | "japan" => "jpn",
        "ko" | "korean" => "kor",
        other => other,
    }
}

fn page_number(path: &Path) -> u32 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('-').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl Backend for TesseractBackend {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract") && check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            TESSERACT_HINT.to_string()
        } else if !check_binary("pdftoppm") {
            PDFTOPPM_HINT.to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    fn supports_abort(&self) -> bool {
        true
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        if is_image(path) {
            return self.run_tesseract(path, &options.language, ctx);
        }

        let temp_dir = TempDir::new()?;
        let pages = self.rasterise(path, temp_dir.path(), ctx)?;
        if pages.is_empty() {
            return Err(BackendError::Failed(format!(
                "pdftoppm produced no pages for {}",
                path.display()
            )));
        }

        let mut sections = Vec::with_capacity(pages.len());
        for (i, image) in pages.iter().enumerate() {
            if ctx.abort.is_aborted() {
                return Err(BackendError::Aborted);
            }
            let text = self.run_tesseract(image, &options.language, ctx)?;
            sections.push(format!("# Page {}\n\n{}", i + 1, text.trim()));
        }

        Ok(sections.join("\n\n"))
    }
}
