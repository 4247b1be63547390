use log::warn;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::TrackerError;

const DEFAULT_STORAGE_DIR: &str = "./storage";
const DEFAULT_CHANGES_DIR: &str = "changes";
const DEFAULT_MAX_VERSION_HISTORY: usize = 50;
const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:9090";
const ARCHIVE_DIR: &str = "archive";

// Line comparison used when computing change details and rendering diffs
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    // Index-aligned comparison; inserted lines cascade into modifications
    #[default]
    Positional,
    // Myers longest-common-subsequence alignment
    Lcs,
}

impl FromStr for DiffAlgorithm {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positional" => Ok(DiffAlgorithm::Positional),
            "lcs" | "myers" => Ok(DiffAlgorithm::Lcs),
            other => Err(TrackerError::Unsupported(format!("Unknown diff algorithm: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub base_dir: PathBuf,
    pub changes_dir: String,
    pub max_version_history: usize,
    pub enable_diff: bool,
    // Advisory only: change logs are always plain JSON
    pub enable_compression: bool,
    pub diff_algorithm: DiffAlgorithm,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            base_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            changes_dir: DEFAULT_CHANGES_DIR.to_string(),
            max_version_history: DEFAULT_MAX_VERSION_HISTORY,
            enable_diff: true,
            enable_compression: false,
            diff_algorithm: DiffAlgorithm::default(),
        }
    }
}

impl TrackerConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        TrackerConfig {
            base_dir: base_dir.into(),
            ..TrackerConfig::default()
        }
    }

    // Reads PRP_* environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = TrackerConfig::default();

        TrackerConfig {
            base_dir: env::var("PRP_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_dir),
            changes_dir: env::var("PRP_CHANGES_DIR").unwrap_or(defaults.changes_dir),
            max_version_history: env_or("PRP_MAX_VERSION_HISTORY", defaults.max_version_history),
            enable_diff: env_or("PRP_ENABLE_DIFF", defaults.enable_diff),
            enable_compression: env_or("PRP_ENABLE_COMPRESSION", defaults.enable_compression),
            diff_algorithm: env_or("PRP_DIFF_ALGORITHM", defaults.diff_algorithm),
        }
    }

    pub fn changes_path(&self) -> PathBuf {
        self.base_dir.join(&self.changes_dir)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.changes_path().join(ARCHIVE_DIR)
    }

    // Per-file history cap, never below one record
    pub fn retention_cap(&self) -> usize {
        self.max_version_history.max(1)
    }
}

// Address the HTTP layer binds to
pub fn server_address() -> String {
    env::var("PRP_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_version_history, 50);
        assert!(config.enable_diff);
        assert!(!config.enable_compression);
        assert_eq!(config.diff_algorithm, DiffAlgorithm::Positional);
        assert_eq!(config.changes_path(), PathBuf::from("./storage/changes"));
        assert_eq!(config.archive_path(), PathBuf::from("./storage/changes/archive"));
    }

    #[test]
    fn retention_cap_is_at_least_one() {
        let config = TrackerConfig {
            max_version_history: 0,
            ..TrackerConfig::default()
        };
        assert_eq!(config.retention_cap(), 1);
    }

    #[test]
    fn diff_algorithm_parses_aliases() {
        assert_eq!("LCS".parse::<DiffAlgorithm>(), Ok(DiffAlgorithm::Lcs));
        assert_eq!("myers".parse::<DiffAlgorithm>(), Ok(DiffAlgorithm::Lcs));
        assert!("patience".parse::<DiffAlgorithm>().is_err());
    }
}
