use facet_core::config::InvalidConfig;
use facet_core::ClusteringConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid clustering parameters: {0}")]
    Invalid(#[from] InvalidConfig),
}

/// Service configuration: an optional TOML file overridden by `FACET_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Upper bound on a single clustering run. Unset means unbounded.
    pub run_timeout: Option<Duration>,
    pub clustering: ClusteringConfig,
}

/// On-disk layout of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    run_timeout_secs: Option<u64>,
    clustering: ClusteringConfig,
}

impl Config {
    /// Load configuration from the file named by `FACET_CONFIG` (if any) and
    /// `FACET_*` environment variables, with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("FACET_CONFIG") {
            Ok(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                tracing::info!(path = %path.display(), "loaded config file");
                toml::from_str(&text)?
            }
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Parse a TOML document, still honouring environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::resolve(toml::from_str(text)?, |key| std::env::var(key).ok())
    }

    fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let db_path = env("FACET_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| default_data_dir(&env).join("faces.db"));

        let run_timeout = env_parse::<u64>(&env, "FACET_RUN_TIMEOUT_SECS")
            .or(file.run_timeout_secs)
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        let mut clustering = file.clustering;
        clustering.base_threshold =
            env_parse(&env, "FACET_BASE_THRESHOLD").unwrap_or(clustering.base_threshold);
        clustering.high_confidence_threshold = env_parse(&env, "FACET_HIGH_CONFIDENCE_THRESHOLD")
            .unwrap_or(clustering.high_confidence_threshold);
        clustering.sample_size =
            env_parse(&env, "FACET_SAMPLE_SIZE").unwrap_or(clustering.sample_size);
        clustering.validate()?;

        Ok(Self {
            db_path,
            run_timeout,
            clustering,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facet")
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}
