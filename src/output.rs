//! Markdown output files.

use std::path::{Component, Path, PathBuf};

/// Output location for an input at `relative` (relative to its discovery
/// root): `<output_dir>/<relative>` with the extension replaced by `.md`.
///
/// Only normal components of `relative` are kept, so the result always
/// stays inside `output_dir`.
pub fn output_path(relative: &Path, output_dir: &Path) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    let mut named = false;
    for component in relative.components() {
        if let Component::Normal(part) = component {
            path.push(part);
            named = true;
        }
    }
    if !named {
        path.push("document");
    }
    path.set_extension("md");
    path
}

fn stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

/// Write extracted text to `path` as Markdown, titled with the input's stem.
pub async fn write_markdown(input: &Path, path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = format!("# {}\n\n{}", stem(input), text);
    tokio::fs::write(path, content).await?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}
