use std::env;
use std::path::PathBuf;

use crate::storage::{FileStore, RetentionPolicy};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_MAX_SESSIONS: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub model_config_path: PathBuf,
    pub upload_dir: PathBuf,
    pub report_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub retention_hours: Option<u64>,
    pub max_sessions: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            host: string("HOST", "127.0.0.1"),
            port: parse(&lookup, "PORT")?.unwrap_or(5000),
            model_path: string("MODEL_PATH", "our_model.pt").into(),
            model_config_path: string("MODEL_CONFIG", "config/model.yaml").into(),
            upload_dir: string("UPLOAD_DIR", "uploads").into(),
            report_dir: string("REPORT_DIR", "reports").into(),
            static_dir: string("STATIC_DIR", "static").into(),
            max_upload_bytes: parse(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            retention_hours: retention_hours(&lookup)?,
            max_sessions: parse(&lookup, "MAX_SESSIONS")?.unwrap_or(DEFAULT_MAX_SESSIONS),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from_hours(self.retention_hours)
    }

    pub fn file_store(&self) -> FileStore {
        FileStore::new(
            self.upload_dir.clone(),
            self.report_dir.clone(),
            self.max_upload_bytes,
            self.retention(),
        )
    }
}

/// `RETENTION_HOURS` must be at least one hour and representable in seconds.
/// Zero would sweep an upload before its result page can show it.
fn retention_hours<F>(lookup: &F) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEY: &str = "RETENTION_HOURS";
    let Some(hours) = parse::<u64, F>(lookup, KEY)? else {
        return Ok(None);
    };
    let reason = if hours == 0 {
        "must be at least 1"
    } else if hours.checked_mul(3600).is_none() {
        "too large"
    } else {
        return Ok(Some(hours));
    };
    Err(ConfigError::Invalid {
        key: KEY,
        value: hours.to_string(),
        reason: reason.to_string(),
    })
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.report_dir, PathBuf::from("reports"));
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.retention(), RetentionPolicy::KeepAll);
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            ("PORT", "8081"),
            ("RETENTION_HOURS", "24"),
            ("UPLOAD_DIR", "/tmp/up"),
            ("MAX_SESSIONS", " 16 "),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.max_sessions, 16);
        assert_eq!(
            config.retention(),
            RetentionPolicy::MaxAge(std::time::Duration::from_secs(24 * 3600))
        );
    }

    #[test]
    fn retention_hours_must_be_positive_and_fit_in_seconds() {
        let zero = config(&[("RETENTION_HOURS", "0")]).unwrap_err();
        assert!(zero.to_string().contains("at least 1"));

        let huge = (u64::MAX / 1000).to_string();
        let err = config(&[("RETENTION_HOURS", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("too large"));

        let max_ok = u64::MAX / 3600;
        let value = max_ok.to_string();
        let config = config(&[("RETENTION_HOURS", value.as_str())]).unwrap();
        assert_eq!(config.retention_hours, Some(max_ok));
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
