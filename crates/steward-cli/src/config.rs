//! steward.toml の読み込み。
//!
//! 探索順: `--config` → `STEWARD_CONFIG` → `./steward.toml`。どれも無ければ既定値。

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use steward_core::{ConfigError, SchedulerConfig};
use thiserror::Error;

pub const CONFIG_ENV: &str = "STEWARD_CONFIG";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// sqlx 形式の URL。`sqlite::memory:` ならプロセス内だけの store。
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://steward.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, LoadError> {
        let config: Self = toml::from_str(content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_search_paths(vec![PathBuf::from("./steward.toml")])
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Resolve the config file and load it. Falls back to defaults when nothing is found.
    pub fn load(&self, explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>), LoadError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(|| self.find_config_file()),
        };

        match path {
            Some(path) => {
                let config = self.load_file(&path)?;
                Ok((config, Some(path)))
            }
            None => Ok((AppConfig::default(), None)),
        }
    }

    pub fn load_file(&self, path: &Path) -> Result<AppConfig, LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        AppConfig::from_toml(path, &content)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.is_file()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("steward.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
            [scheduler]
            max_attempts = 3
            backoff_base = 1
            backoff_cap = 8
            retention = 86400

            [store]
            database_url = "sqlite://custom.db"
            "#,
        );

        let config = ConfigLoader::new().load_file(&path).unwrap();
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.scheduler.backoff_base, Duration::from_secs(1));
        assert_eq!(config.scheduler.backoff_cap, Duration::from_secs(8));
        assert_eq!(config.scheduler.retention, Duration::from_secs(86_400));
        assert_eq!(config.scheduler.workers, SchedulerConfig::default().workers);
        assert_eq!(config.store.database_url, "sqlite://custom.db");
    }

    #[test]
    fn explicit_path_wins_over_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[scheduler]\nworkers = 4\n");
        let loader = ConfigLoader::with_search_paths(vec![dir.path().join("missing.toml")]);

        let (config, used) = loader.load(Some(&path)).unwrap();
        assert_eq!(config.scheduler.workers, 4);
        assert_eq!(used, Some(path));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[scheduler]\nmax_attempt = 3\n");

        let err = ConfigLoader::new().load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }), "{err}");
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[scheduler]\nbackoff_base = 10\nbackoff_cap = 5\n");

        let err = ConfigLoader::new().load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(_)), "{err}");
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .load(Some(&dir.path().join("nope.toml")))
            .unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
