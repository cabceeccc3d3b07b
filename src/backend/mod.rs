//! Extraction backend abstraction.
//!
//! Every supported extraction library is wrapped in a [`Backend`]
//! implementation and registered into an ordered [`BackendChain`]:
//! - MinerU: layout-aware PDF to Markdown (CPU/GPU)
//! - pdftotext: Poppler text layer extraction (CPU)
//! - Tesseract: OCR over rasterised pages (CPU)
//! - Custom commands configured by the user

mod chain;
mod command;
mod mineru;
mod pdftotext;
mod process;
mod tesseract;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::AbortSignal;
use crate::config::{Config, ConfigError};
use crate::device::Device;

pub use chain::{AttemptFailure, BackendChain, BackendResult, ChainObserver, Unobserved, EXHAUSTED};
pub use command::{CommandBackend, CommandConfig};
pub use mineru::MineruBackend;
pub use pdftotext::PdftotextBackend;
pub use process::check_binary;
pub use tesseract::TesseractBackend;

/// Errors from extraction backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend not available: {0}")]
    NotAvailable(String),

    #[error("Extraction failed: {0}")]
    Failed(String),

    #[error("Backend returned empty output")]
    EmptyOutput,

    #[error("Extraction aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options passed through to backends for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Document language (e.g. "ch", "en").
    pub language: String,
    /// Whether formula recognition is enabled (backends that support it).
    pub enable_formula: bool,
    /// Whether table recognition is enabled (backends that support it).
    pub enable_table: bool,
    /// Parse method hint: "auto", "txt" or "ocr".
    pub parse_method: String,
    /// Free-form values available to custom command backends as `{key}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            language: "ch".to_string(),
            enable_formula: true,
            enable_table: true,
            parse_method: "auto".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// Per-invocation context: where to run and how to be told to stop.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub device: Device,
    pub abort: AbortSignal,
}

impl ExtractContext {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_abort(device: Device, abort: AbortSignal) -> Self {
        Self { device, abort }
    }
}

/// Trait for extraction backends.
pub trait Backend: Send + Sync {
    /// Name used in chains, logs and results.
    fn name(&self) -> &str;

    /// Check if this backend can run (binaries installed, models present).
    fn is_available(&self) -> bool {
        true
    }

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String {
        format!("{} is available", self.name())
    }

    /// Whether `extract` polls `ExtractContext::abort` and returns early.
    fn supports_abort(&self) -> bool {
        false
    }

    /// Extract text from a document.
    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError>;
}

/// Names of the built-in backends, in default priority order.
pub const BUILTIN_BACKENDS: &[&str] = &["mineru", "pdftotext", "tesseract"];

/// Construct a backend by name, consulting `config` for custom commands.
pub fn from_name(name: &str, config: &Config) -> Result<Box<dyn Backend>, ConfigError> {
    match name.to_lowercase().as_str() {
        "mineru" => Ok(Box::new(MineruBackend::new(&config.mineru_backend))),
        "pdftotext" | "poppler" => Ok(Box::new(PdftotextBackend::new())),
        "tesseract" => Ok(Box::new(TesseractBackend::new())),
        _ => config
            .commands
            .get(name)
            .map(|cmd| Box::new(CommandBackend::new(name, cmd.clone())) as Box<dyn Backend>)
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_builtins() {
        let config = Config::default();
        for name in BUILTIN_BACKENDS {
            let backend = from_name(name, &config).unwrap();
            assert_eq!(backend.name(), *name);
        }
        assert_eq!(from_name("poppler", &config).unwrap().name(), "pdftotext");
    }

    #[test]
    fn test_from_name_custom_command() {
        let mut config = Config::default();
        config.commands.insert(
            "marker".to_string(),
            CommandConfig {
                command: "marker_single".to_string(),
                args: vec!["{file}".to_string()],
            },
        );
        let backend = from_name("marker", &config).unwrap();
        assert_eq!(backend.name(), "marker");
        assert!(backend.supports_abort());
    }

    #[test]
    fn test_from_name_unknown() {
        let err = from_name("nonexistent", &Config::default()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownBackend(name) if name == "nonexistent"));
    }
}
