//! Conversion time estimates from file sizes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Linear size-based time model, clamped per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Estimator {
    pub secs_per_mb: f64,
    pub min_secs_per_file: f64,
    pub max_secs_per_file: f64,
}

impl Default for Estimator {
    fn default() -> Self {
        Self {
            secs_per_mb: 2.0,
            min_secs_per_file: 1.0,
            max_secs_per_file: 60.0,
        }
    }
}

/// Estimate for a batch of files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub files: usize,
    pub workers: usize,
    pub total_size_mb: f64,
    pub total_secs: f64,
}

impl Estimate {
    pub fn avg_secs_per_file(&self) -> f64 {
        if self.files == 0 {
            0.0
        } else {
            self.total_secs / self.files as f64
        }
    }
}

impl Estimator {
    fn clamp(&self, secs: f64) -> f64 {
        secs.max(self.min_secs_per_file).min(self.max_secs_per_file)
    }

    /// Seconds for a file of `size` bytes.
    pub fn for_size(&self, size: u64) -> f64 {
        self.clamp(size as f64 / BYTES_PER_MB * self.secs_per_mb)
    }

    /// Seconds for one file; the minimum when it cannot be stat'ed.
    pub fn for_file(&self, path: &Path) -> f64 {
        std::fs::metadata(path)
            .map(|m| self.for_size(m.len()))
            .unwrap_or(self.min_secs_per_file)
    }

    pub fn estimate(&self, files: &[PathBuf], workers: usize) -> Estimate {
        let mut total_secs = 0.0;
        let mut total_bytes = 0u64;
        for file in files {
            total_secs += self.for_file(file);
            total_bytes += std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        }
        if workers > 1 {
            total_secs /= workers as f64;
        }
        Estimate {
            files: files.len(),
            workers,
            total_size_mb: total_bytes as f64 / BYTES_PER_MB,
            total_secs,
        }
    }
}

/// Format seconds as `42s`, `3m 5s` or `2h 10m`.
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_file_clamping() {
        let est = Estimator::default();
        assert_eq!(est.for_size(0), 1.0);
        assert_eq!(est.for_size(5 * 1024 * 1024), 10.0);
        assert_eq!(est.for_size(500 * 1024 * 1024), 60.0);
        assert_eq!(est.for_file(Path::new("/definitely/missing.pdf")), 1.0);
    }

    #[test]
    fn test_batch_divides_by_workers() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..4)
            .map(|i| {
                let path = dir.path().join(format!("{i}.pdf"));
                std::fs::write(&path, vec![0u8; 10 * 1024 * 1024]).unwrap();
                path
            })
            .collect();

        let single = Estimator::default().estimate(&files, 1);
        assert_eq!(single.total_secs, 80.0);
        assert_eq!(single.avg_secs_per_file(), 20.0);

        let parallel = Estimator::default().estimate(&files, 4);
        assert_eq!(parallel.total_secs, 20.0);
        assert_eq!(parallel.total_size_mb, 40.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.3), "42s");
        assert_eq!(format_duration(185.0), "3m 5s");
        assert_eq!(format_duration(7800.0), "2h 10m");
    }
}
