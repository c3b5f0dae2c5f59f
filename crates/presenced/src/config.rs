use chrono::{NaiveTime, Timelike};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Built-in cosine similarity over JSON embeddings.
    Cosine,
    /// Remote comparison service at `scorer_url`.
    Http,
}

/// Daemon configuration: defaults, then an optional TOML file named by
/// `PRESENCE_CONFIG`, then `PRESENCE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address for HTTP and WebSocket ingress.
    pub bind_addr: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// A match needs a score strictly above this.
    pub similarity_threshold: f32,
    /// Local time (HH:MM) before which a submission is a check-in.
    pub check_in_before: String,
    /// Maximum concurrent scorer calls per submission.
    pub scorer_parallelism: usize,
    /// Events buffered per live subscriber before it starts lagging.
    pub broadcast_capacity: usize,
    pub scorer: ScorerKind,
    pub scorer_url: Option<String>,
    pub scorer_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            db_path: default_data_dir().join("attendance.db"),
            similarity_threshold: presence_core::matcher::DEFAULT_THRESHOLD,
            check_in_before: "07:30".to_string(),
            scorer_parallelism: presence_core::matcher::DEFAULT_PARALLELISM,
            broadcast_capacity: 100,
            scorer: ScorerKind::Cosine,
            scorer_url: None,
            scorer_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load and validate the full configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("PRESENCE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `PRESENCE_*` variables. Unparseable numbers
    /// keep the current setting; an unknown scorer kind is an error.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("PRESENCE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("PRESENCE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRESENCE_CHECK_IN_BEFORE") {
            self.check_in_before = v;
        }
        if let Some(v) = lookup("PRESENCE_SCORER_URL") {
            self.scorer_url = Some(v);
        }
        if let Some(v) = lookup("PRESENCE_SCORER") {
            self.scorer = match v.trim() {
                "cosine" => ScorerKind::Cosine,
                "http" => ScorerKind::Http,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "PRESENCE_SCORER must be \"cosine\" or \"http\", got {other:?}"
                    )))
                }
            };
        }
        self.similarity_threshold = env_or(
            &lookup,
            "PRESENCE_SIMILARITY_THRESHOLD",
            self.similarity_threshold,
        );
        self.scorer_parallelism =
            env_or(&lookup, "PRESENCE_SCORER_PARALLELISM", self.scorer_parallelism);
        self.broadcast_capacity =
            env_or(&lookup, "PRESENCE_BROADCAST_CAPACITY", self.broadcast_capacity);
        self.scorer_timeout_secs =
            env_or(&lookup, "PRESENCE_SCORER_TIMEOUT_SECS", self.scorer_timeout_secs);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.scorer_parallelism == 0 {
            return Err(ConfigError::Invalid("scorer_parallelism must be at least 1".into()));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid("broadcast_capacity must be at least 1".into()));
        }
        if self.scorer == ScorerKind::Http && self.scorer_url.is_none() {
            return Err(ConfigError::Invalid("scorer = \"http\" requires scorer_url".into()));
        }
        self.check_in_before()?;
        Ok(())
    }

    /// Parsed classification boundary. The classifier works in whole
    /// minutes, so `HH:MM:SS` is accepted only with zero seconds.
    pub fn check_in_before(&self) -> Result<NaiveTime, ConfigError> {
        let raw = self.check_in_before.trim();
        let invalid =
            || ConfigError::Invalid(format!("check_in_before must be HH:MM, got {raw:?}"));
        let time = NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| invalid())?;
        if time.second() != 0 || time.nanosecond() != 0 {
            return Err(invalid());
        }
        Ok(time)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("presence")
}

fn env_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
