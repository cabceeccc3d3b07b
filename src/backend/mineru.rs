//! MinerU backend.
//!
//! Runs the `mineru` CLI into a scratch directory and reads back the
//! Markdown file it produces. MinerU honours the selected device, so this is
//! the only built-in backend that benefits from a GPU.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::process::{check_binary, run_abortable};
use super::{Backend, BackendError, ExtractContext, ExtractOptions};

const INSTALL_HINT: &str = "MinerU not installed. Install with: pip install -U 'mineru[core]'";

/// MinerU document parser.
pub struct MineruBackend {
    /// MinerU's own internal backend (`pipeline`, `vlm-transformers`, ...).
    engine: String,
}

impl MineruBackend {
    pub fn new(engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
        }
    }

    fn build_command(
        &self,
        path: &Path,
        out_dir: &Path,
        options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Command {
        let mut cmd = Command::new("mineru");
        cmd.arg("-p")
            .arg(path)
            .arg("-o")
            .arg(out_dir)
            .args(["-b", &self.engine])
            .args(["-m", &options.parse_method])
            .args(["-l", &options.language])
            .args(["-d", ctx.device.torch_name()])
            .args(["-f", bool_flag(options.enable_formula)])
            .args(["-t", bool_flag(options.enable_table)]);
        cmd
    }
}

impl Default for MineruBackend {
    fn default() -> Self {
        Self::new("pipeline")
    }
}

fn bool_flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Find `<stem>.md` anywhere below `dir`, falling back to the first `.md`.
fn find_markdown(dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut stack = vec![dir.to_path_buf()];
    let mut fallback = None;
    let wanted = format!("{}.md", stem);

    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some(wanted.as_str()) {
                return Some(path);
            } else if fallback.is_none() && path.extension().and_then(|e| e.to_str()) == Some("md") {
                fallback = Some(path);
            }
        }
    }

    fallback
}

impl Backend for MineruBackend {
    fn name(&self) -> &str {
        "mineru"
    }

    fn is_available(&self) -> bool {
        check_binary("mineru")
    }

    fn availability_hint(&self) -> String {
        if check_binary("mineru") {
            format!("MinerU is available (engine: {})", self.engine)
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
        options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        let out_dir = TempDir::new()?;
        let cmd = self.build_command(path, out_dir.path(), options, ctx);
        let output = run_abortable(cmd, &ctx.abort, INSTALL_HINT)?;
        if !output.stderr.trim().is_empty() {
            tracing::debug!("mineru stderr: {}", output.stderr.trim());
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let markdown = find_markdown(out_dir.path(), &stem).ok_or_else(|| {
            BackendError::Failed(format!("mineru produced no Markdown for {}", path.display()))
        })?;

        Ok(std::fs::read_to_string(markdown)?)
    }
}
