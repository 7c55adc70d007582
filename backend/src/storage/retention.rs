use std::path::Path;
use std::time::{Duration, SystemTime};

/// How long uploads, reports and charts are kept on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    KeepAll,
    MaxAge(Duration),
}

impl RetentionPolicy {
    pub fn from_hours(hours: Option<u64>) -> Self {
        match hours {
            Some(h) => RetentionPolicy::MaxAge(Duration::from_secs(h.saturating_mul(3600))),
            None => RetentionPolicy::KeepAll,
        }
    }

    pub fn sweep(&self, dir: &Path) -> std::io::Result<usize> {
        self.sweep_at(dir, SystemTime::now())
    }

    /// Deletes regular files in `dir` last modified more than the max age before `now`.
    pub fn sweep_at(&self, dir: &Path, now: SystemTime) -> std::io::Result<usize> {
        let RetentionPolicy::MaxAge(max_age) = *self else {
            return Ok(0);
        };
        let mut removed = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let age = now
                .duration_since(metadata.modified()?)
                .unwrap_or(Duration::ZERO);
            if age > max_age {
                std::fs::remove_file(entry.path())?;
                log::debug!("Removed expired file {}", entry.path().display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}
