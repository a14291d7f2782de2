use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::telegram::UserId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {0} (copy config.example.json there and fill it in)")]
    NotFound(PathBuf),
    #[error("io error reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Downloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompletionAction {
    Remove,
    #[default]
    Pause,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: String,
    pub telegram_api_url: String,
    pub allowed_user_ids: Vec<UserId>,
    pub disks: Vec<String>,
    pub default_disk_idx: usize,
    pub categories: Vec<Category>,
    pub qb_url: String,
    pub qb_user: String,
    pub qb_pass: String,
    pub poll_timeout: u64,
    pub check_interval: i64,
    pub state_save_interval: i64,
    pub max_file_size: u64,
    pub status_filter: StatusFilter,
    pub status_show_limit: usize,
    pub action_on_complete: CompletionAction,
    pub notification_cleanup_time: i64,
    pub state_file: PathBuf,
    pub staging_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            bot_token: String::new(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            allowed_user_ids: Vec::new(),
            disks: Vec::new(),
            default_disk_idx: 0,
            categories: Vec::new(),
            qb_url: String::new(),
            qb_user: "admin".to_string(),
            qb_pass: String::new(),
            poll_timeout: 30,
            check_interval: 60,
            state_save_interval: 300,
            max_file_size: 20 * 1024 * 1024,
            status_filter: StatusFilter::All,
            status_show_limit: 10,
            action_on_complete: CompletionAction::Pause,
            notification_cleanup_time: 60,
            state_file: data_dir.join("state.json"),
            staging_dir: data_dir.join("staging"),
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = path
            .or_else(|| env::var("QBIT_BRIDGE_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| data_dir().join("config.json"));
        let mut config = Self::from_file(&path)?;

        if let Ok(token) = env::var("QBIT_BRIDGE_BOT_TOKEN") {
            if !token.trim().is_empty() {
                config.bot_token = token;
            }
        }
        if let Ok(pass) = env::var("QBIT_BRIDGE_QB_PASS") {
            config.qb_pass = pass;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(contents)?;
        config.telegram_api_url = config.telegram_api_url.trim_end_matches('/').to_string();
        config.qb_url = config.qb_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(invalid("bot_token is required"));
        }
        if self.qb_url.trim().is_empty() {
            return Err(invalid("qb_url is required"));
        }
        if self.allowed_user_ids.is_empty() {
            return Err(invalid("allowed_user_ids must list at least one user"));
        }
        if self.disks.is_empty() {
            return Err(invalid("disks must list at least one path"));
        }
        if self.default_disk_idx >= self.disks.len() {
            return Err(invalid(&format!(
                "default_disk_idx {} is out of range ({} disks)",
                self.default_disk_idx,
                self.disks.len()
            )));
        }
        if self.categories.is_empty() {
            return Err(invalid("categories must list at least one entry"));
        }
        for (idx, category) in self.categories.iter().enumerate() {
            let key = category.key.as_str();
            if key.is_empty() || key.contains('/') || key.contains("..") {
                return Err(invalid(&format!("category key {key:?} is not a plain directory name")));
            }
            if self.categories[..idx].iter().any(|other| other.key == key) {
                return Err(invalid(&format!("category key {key:?} is listed twice")));
            }
        }
        Ok(())
    }

    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.key == key)
    }

    /// Destination directory for a disk/category pair, `None` if either is unknown.
    pub fn destination(&self, disk_idx: usize, category_key: &str) -> Option<String> {
        let disk = self.disks.get(disk_idx)?;
        let category = self.category(category_key)?;
        Some(format!("{}/{}", disk.trim_end_matches('/'), category.key))
    }

    pub fn is_allowed(&self, user_id: UserId) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }
}

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

fn data_dir() -> PathBuf {
    if let Ok(dir) = env::var("QBIT_BRIDGE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let base = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    base.join(".local").join("share").join("qbit-bridge")
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        bot_token: "123:abc".to_string(),
        allowed_user_ids: vec![42],
        disks: vec!["/mnt/disk1".to_string(), "/mnt/disk2".to_string()],
        categories: vec![
            Category {
                key: "movies".to_string(),
                label: "Movies".to_string(),
            },
            Category {
                key: "series".to_string(),
                label: "Series".to_string(),
            },
        ],
        qb_url: "http://localhost:8080".to_string(),
        ..Config::default()
    }
}
