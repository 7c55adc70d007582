use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::retention::RetentionPolicy;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid file name: {0:?}")]
    InvalidFilename(String),
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: usize, limit: usize },
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Extensions an upload may be stored and served under.
pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "AUX", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1",
    "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9", "PRN", "NUL",
];

/// Reduces a client-supplied file name to a flat ASCII name that is safe to join
/// onto a storage directory. Returns an empty string when nothing usable is left.
pub fn secure_filename(name: &str) -> String {
    let flattened = name.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = trimmed.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        format!("_{}", trimmed)
    } else {
        trimmed
    }
}

pub fn is_image_filename(name: &Path) -> bool {
    name.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Filename token for a patient name: alphanumerics, `_` and `-`, or `patient`.
pub fn patient_file_token(patient_name: &str) -> String {
    let token: String = patient_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if token.is_empty() {
        "patient".to_string()
    } else {
        token
    }
}

/// Local directories for uploaded images and generated reports.
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    report_dir: PathBuf,
    max_upload_bytes: usize,
    retention: RetentionPolicy,
}

impl FileStore {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        report_dir: impl Into<PathBuf>,
        max_upload_bytes: usize,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            report_dir: report_dir.into(),
            max_upload_bytes,
            retention,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.report_dir)?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn validate_size(&self, size: usize) -> Result<(), StorageError> {
        if size > self.max_upload_bytes {
            return Err(StorageError::FileTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Location of an upload by client-supplied name, after sanitizing.
    pub fn upload_path(&self, filename: &str) -> Result<(String, PathBuf), StorageError> {
        let safe = secure_filename(filename);
        if safe.is_empty() {
            return Err(StorageError::InvalidFilename(filename.to_string()));
        }
        let path = self.upload_dir.join(&safe);
        Ok((safe, path))
    }

    /// Writes an upload under its sanitized name, replacing any earlier file of that name.
    pub fn save_upload(&self, filename: &str, data: &[u8]) -> Result<(String, PathBuf), StorageError> {
        self.validate_size(data.len())?;
        let (safe, path) = self.upload_path(filename)?;
        if !is_image_filename(Path::new(&safe)) {
            return Err(StorageError::InvalidFilename(filename.to_string()));
        }
        let mut file = File::create(&path)?;
        file.write_all(data)?;
        log::info!("Saved upload {} ({} bytes)", path.display(), data.len());
        Ok((safe, path))
    }

    /// Creates a new, empty file in the report directory named `{stem}.{ext}`,
    /// or `{stem}_{n}.{ext}` if that name is already taken.
    pub fn create_report_file(&self, stem: &str, ext: &str) -> Result<(File, PathBuf), StorageError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.{}", stem, ext)
            } else {
                format!("{}_{}.{}", stem, attempt, ext)
            };
            let path = self.report_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free report name for {}", stem),
        )))
    }

    pub fn chart_path(&self, image_filename: &str) -> PathBuf {
        let stem = Path::new(image_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("chart");
        self.report_dir.join(format!("chart_{}.png", stem))
    }

    /// Applies the retention policy to both directories.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        for dir in [&self.upload_dir, &self.report_dir] {
            match self.retention.sweep(dir) {
                Ok(n) => removed += n,
                Err(e) => log::warn!("Retention sweep of {} failed: {}", dir.display(), e),
            }
        }
        if removed > 0 {
            log::info!("Retention sweep removed {} file(s)", removed);
        }
        removed
    }
}
