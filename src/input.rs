//! Input discovery and pre-flight validation.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Files below this size are almost certainly truncated.
pub const MIN_PDF_SIZE: u64 = 1024;

/// A discovered input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Path below the directory argument it was found in; the bare file
    /// name for explicit file arguments.
    pub relative: PathBuf,
}

/// Expand `paths` into the list of documents to convert.
///
/// Directories contribute their files whose extension matches one of
/// `extensions` (case-insensitive), sorted; subdirectories are walked only
/// when `recursive` is set. Explicit file arguments are kept as given.
/// Paths naming the same file are dropped after the first occurrence.
pub fn discover_inputs(
    paths: &[PathBuf],
    extensions: &[String],
    recursive: bool,
) -> std::io::Result<Vec<InputFile>> {
    let extensions: Vec<String> = extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut files = Vec::new();
            collect_dir(path, &extensions, recursive, &mut files)?;
            files.sort();
            for file in files {
                if seen.insert(identity(&file)) {
                    let relative = file.strip_prefix(path).map(Path::to_path_buf).unwrap_or_else(|_| file.clone());
                    found.push(InputFile { path: file, relative });
                }
            }
        } else if seen.insert(identity(path)) {
            let relative = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
            found.push(InputFile {
                path: path.clone(),
                relative,
            });
        }
    }

    Ok(found)
}

/// Paths of [`discover_inputs`].
pub fn discover(paths: &[PathBuf], extensions: &[String], recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    Ok(discover_inputs(paths, extensions, recursive)?
        .into_iter()
        .map(|file| file.path)
        .collect())
}

/// Canonical form used for duplicate detection; missing files keep their
/// path as given.
fn identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn collect_dir(dir: &Path, extensions: &[String], recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_dir(&path, extensions, recursive, out)?;
            }
        } else if has_extension(&path, extensions) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Outcome of validating one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    NotFound,
    Empty,
    TooSmall { size: u64 },
    /// Content is not a PDF; carries the detected MIME type if any.
    InvalidHeader { detected: Option<String> },
    Valid { size: u64 },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Validation::NotFound => "file not found".to_string(),
            Validation::Empty => "file is empty".to_string(),
            Validation::TooSmall { size } => format!("file too small ({} bytes)", size),
            Validation::InvalidHeader { detected: Some(mime) } => {
                format!("not a PDF (detected {})", mime)
            }
            Validation::InvalidHeader { detected: None } => "not a PDF".to_string(),
            Validation::Valid { size } => format!("valid ({} bytes)", size),
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Validation::NotFound => Some("check that the path is correct"),
            Validation::Empty => Some("the file may be corrupted; download it again"),
            Validation::TooSmall { .. } => Some("the file may be incomplete or corrupted"),
            Validation::InvalidHeader { .. } => Some("the file may not be in PDF format"),
            Validation::Valid { .. } => None,
        }
    }
}

/// Classify an input file before conversion.
pub fn validate(path: &Path) -> Validation {
    let size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Validation::NotFound,
    };

    if size == 0 {
        return Validation::Empty;
    }
    if size < MIN_PDF_SIZE {
        return Validation::TooSmall { size };
    }

    // Read first 8KB for magic byte detection
    let mut buffer = [0u8; 8192];
    let read = match File::open(path).and_then(|mut f| f.read(&mut buffer)) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!("Failed to read {}: {}", path.display(), e);
            return Validation::NotFound;
        }
    };

    match infer::get(&buffer[..read]) {
        Some(kind) if kind.mime_type() == "application/pdf" => Validation::Valid { size },
        Some(kind) => Validation::InvalidHeader {
            detected: Some(kind.mime_type().to_string()),
        },
        None => Validation::InvalidHeader { detected: None },
    }
}
