//! Configuration management for docbatch using the prefer crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::backend::{self, BackendChain, CommandConfig, ExtractOptions};
use crate::device::DevicePreference;
use crate::estimate::Estimator;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("Unknown backend '{0}' (not built in and no [commands.{0}] entry)")]
    UnknownBackend(String),
}

/// A backend list given either as one name or an ordered chain.
///
/// Examples:
/// - `backends = "pdftotext"`
/// - `backends = ["mineru", "pdftotext", "tesseract"]`
#[derive(Deserialize)]
#[serde(untagged)]
enum BackendEntry {
    Single(String),
    Chain(Vec<String>),
}

fn deserialize_backends<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match BackendEntry::deserialize(deserializer)? {
        BackendEntry::Single(name) => vec![name],
        BackendEntry::Chain(names) => names,
    })
}

fn default_workers() -> usize {
    2
}

fn default_language() -> String {
    "ch".to_string()
}

fn default_parse_method() -> String {
    "auto".to_string()
}

fn default_mineru_backend() -> String {
    "pipeline".to_string()
}

fn default_backends() -> Vec<String> {
    backend::BUILTIN_BACKENDS.iter().map(|s| s.to_string()).collect()
}

fn default_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Device preference (`gpu_first`, `cpu_first`, `auto`).
    #[serde(default)]
    pub device: DevicePreference,
    /// Output directory; relative paths resolve against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Document language passed to backends.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub enable_formula: bool,
    #[serde(default = "default_true")]
    pub enable_table: bool,
    /// Parse method hint (`auto`, `txt`, `ocr`).
    #[serde(default = "default_parse_method")]
    pub parse_method: String,
    /// MinerU's internal backend.
    #[serde(default = "default_mineru_backend")]
    pub mineru_backend: String,
    /// Fallback chain, highest priority first.
    #[serde(default = "default_backends", deserialize_with = "deserialize_backends")]
    pub backends: Vec<String>,
    /// Named custom command backends.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub commands: HashMap<String, CommandConfig>,
    /// Extensions picked up when an input is a directory.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Walk input directories recursively.
    #[serde(default)]
    pub recursive: bool,
    /// Time estimation model.
    #[serde(default)]
    pub estimation: Estimator,
    /// Append finished conversions to the history log.
    #[serde(default = "default_true")]
    pub log_conversions: bool,
    /// Directory holding `conversions.json`; relative paths resolve against the config file.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            device: DevicePreference::default(),
            output_dir: None,
            language: default_language(),
            enable_formula: true,
            enable_table: true,
            parse_method: default_parse_method(),
            mineru_backend: default_mineru_backend(),
            backends: default_backends(),
            commands: HashMap::new(),
            extensions: default_extensions(),
            recursive: false,
            estimation: Estimator::default(),
            log_conversions: true,
            log_dir: default_log_dir(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no config file is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load("docbatch").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(e) => {
                tracing::debug!("No config file found: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    /// The format is chosen from the file extension (TOML, YAML, otherwise JSON).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Configured output directory, resolved against the config file location.
    pub fn output_dir(&self) -> Option<PathBuf> {
        let base = self.base_dir().unwrap_or_else(|| PathBuf::from("."));
        self.output_dir
            .as_deref()
            .map(|dir| self.resolve_path(dir, &base))
    }

    /// Directory of the conversion history, resolved against the config file location.
    pub fn log_dir(&self) -> PathBuf {
        let base = self.base_dir().unwrap_or_else(|| PathBuf::from("."));
        self.resolve_path(&self.log_dir, &base)
    }

    /// Backend options derived from this config.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            language: self.language.clone(),
            enable_formula: self.enable_formula,
            enable_table: self.enable_table,
            parse_method: self.parse_method.clone(),
            ..Default::default()
        }
    }

    /// Build the configured fallback chain.
    pub fn build_chain(&self) -> Result<BackendChain, ConfigError> {
        self.build_chain_from(&self.backends)
    }

    /// Build a chain from an explicit list of backend names.
    pub fn build_chain_from(&self, names: &[String]) -> Result<BackendChain, ConfigError> {
        let mut chain = BackendChain::new();
        for name in names {
            chain.register(backend::from_name(name, self)?);
        }
        Ok(chain)
    }

    pub fn estimator(&self) -> Estimator {
        self.estimation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DevicePreference;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.device, DevicePreference::GpuFirst);
        assert_eq!(config.backends, vec!["mineru", "pdftotext", "tesseract"]);
        assert_eq!(config.extract_options(), ExtractOptions::default());
        assert!(config.output_dir().is_none());
        assert!(config.log_conversions);
        assert_eq!(config.log_dir(), PathBuf::from("./logs"));
    }

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docbatch.toml");
        std::fs::write(
            &path,
            r#"
workers = 4
device = "cpu-first"
language = "en"
output_dir = "converted"
backends = ["pdftotext", "marker"]
log_conversions = false
log_dir = "history"

[commands.marker]
command = "marker_single"
args = ["{file}"]

[estimation]
secs_per_mb = 3.5
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.device, DevicePreference::CpuFirst);
        assert_eq!(config.language, "en");
        assert_eq!(config.output_dir(), Some(dir.path().join("converted")));
        assert_eq!(config.estimation.secs_per_mb, 3.5);
        assert_eq!(config.estimation.max_secs_per_file, 60.0);
        assert!(!config.log_conversions);
        assert_eq!(config.log_dir(), dir.path().join("history"));

        let chain = config.build_chain().unwrap();
        assert_eq!(chain.names(), vec!["pdftotext", "marker"]);
    }

    #[tokio::test]
    async fn test_load_yaml_single_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docbatch.yaml");
        std::fs::write(&path, "backends: pdftotext\nrecursive: true\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.backends, vec!["pdftotext"]);
        assert!(config.recursive);
        assert_eq!(config.workers, 2);
    }

    #[tokio::test]
    async fn test_load_json_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docbatch.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "JSON", .. }));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config = Config {
            backends: vec!["pdftotext".to_string(), "nope".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.build_chain(),
            Err(ConfigError::UnknownBackend(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::default();
        let base = Path::new("/base");
        assert_eq!(config.resolve_path("/abs", base), PathBuf::from("/abs"));
        assert_eq!(config.resolve_path("rel", base), PathBuf::from("/base/rel"));
    }
}
