//! Poppler `pdftotext` backend.
//!
//! Reads the embedded text layer only. Fast and CPU-only, but yields nothing
//! for scanned documents, which then fall through to an OCR backend.

use std::path::Path;
use std::process::Command;

use super::process::{check_binary, run_abortable};
use super::{Backend, BackendError, ExtractContext, ExtractOptions};

const INSTALL_HINT: &str = "pdftotext not installed. Install with: apt install poppler-utils";

/// Text layer extraction via `pdftotext -layout`.
#[derive(Debug, Default)]
pub struct PdftotextBackend;

impl PdftotextBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for PdftotextBackend {
    fn name(&self) -> &str {
        "pdftotext"
    }

    fn is_available(&self) -> bool {
        check_binary("pdftotext")
    }

    fn availability_hint(&self) -> String {
        if check_binary("pdftotext") {
            "pdftotext is available".to_string()
        } else {
            INSTALL_HINT.to_string()
        }
    }

    fn supports_abort(&self) -> bool {
        true
    }

    fn extract(
        &self,
        path: &Path,
        _options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        let mut cmd = Command::new("pdftotext");
        cmd.arg("-layout").arg(path).arg("-");
        let output = run_abortable(cmd, &ctx.abort, INSTALL_HINT)?;
        Ok(output.stdout)
    }
}
