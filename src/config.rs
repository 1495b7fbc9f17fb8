use crate::catalog::QuestCatalog;
use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".questlog";
const CONFIG_FILE: &str = "config.json";
const QUESTS_FILE: &str = "quests.json";
const REMOTE_SESSION_FILE: &str = "remote_session.json";
pub const REMOTE_API_KEY_ENV: &str = "QUESTLOG_REMOTE_API_KEY";
const MIN_REMOTE_TIMEOUT_SECONDS: u64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub quests_path: PathBuf,
    pub export_dir: PathBuf,
    pub api_port: u16,
    pub default_daily_goal: u32,
    pub remote_api_key: Option<String>,
    pub remote_project_id: Option<String>,
    pub remote_collection: String,
    pub remote_auth_base_url: String,
    pub remote_firestore_base_url: String,
    pub remote_token_base_url: String,
    pub remote_session_path: PathBuf,
    pub remote_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("profiles.db"),
            quests_path: root.join(QUESTS_FILE),
            export_dir: default_export_dir(),
            api_port: 7891,
            default_daily_goal: 100,
            remote_api_key: None,
            remote_project_id: None,
            remote_collection: "activities".to_string(),
            remote_auth_base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            remote_firestore_base_url: "https://firestore.googleapis.com/v1".to_string(),
            remote_token_base_url: "https://securetoken.googleapis.com/v1".to_string(),
            remote_session_path: root.join(REMOTE_SESSION_FILE),
            remote_timeout_seconds: 10,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        fs::create_dir_all(&self.export_dir).with_context(|| {
            format!(
                "Failed to create export directory: {}",
                self.export_dir.display()
            )
        })?;

        if !self.quests_path.exists() {
            QuestCatalog::default().save(&self.quests_path)?;
            set_mode_600(&self.quests_path)?;
        }

        Ok(())
    }

    /// API key for the remote activity log. The environment wins over the file.
    pub fn resolve_remote_api_key(&self) -> Option<String> {
        std::env::var(REMOTE_API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                self.remote_api_key
                    .clone()
                    .filter(|value| !value.trim().is_empty())
            })
    }

    pub fn remote_configured(&self) -> bool {
        self.resolve_remote_api_key().is_some()
            && self
                .remote_project_id
                .as_deref()
                .is_some_and(|project| !project.trim().is_empty())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = normalize_config_key(key);

        match normalized {
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "quests_path" => {
                self.quests_path = expand_home(value);
            }
            "export_dir" => {
                self.export_dir = expand_home(value);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "default_daily_goal" => {
                let parsed = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("default_daily_goal must be a number"))?;
                self.default_daily_goal = crate::progress::clamp_daily_goal(parsed);
            }
            "remote_api_key" => {
                self.remote_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "remote_project_id" => {
                self.remote_project_id =
                    (!value.trim().is_empty()).then_some(value.trim().to_string());
            }
            "remote_collection" => {
                let collection = value.trim();
                if collection.is_empty() || collection.contains('/') {
                    bail!("remote_collection must be a single collection id");
                }
                self.remote_collection = collection.to_string();
            }
            "remote_auth_base_url" => {
                self.remote_auth_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "remote_firestore_base_url" => {
                self.remote_firestore_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "remote_token_base_url" => {
                self.remote_token_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "remote_session_path" => {
                self.remote_session_path = expand_home(value);
            }
            "remote_timeout_seconds" => {
                self.remote_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("remote_timeout_seconds must be a number"))?
                    .max(MIN_REMOTE_TIMEOUT_SECONDS);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, quests_path|quests.path, export_dir|export.dir, api_port|api.port, default_daily_goal|goal.default, remote_api_key|remote.api_key, remote_project_id|remote.project_id, remote_collection|remote.collection, remote_auth_base_url|remote.auth_url, remote_firestore_base_url|remote.firestore_url, remote_token_base_url|remote.token_url, remote_session_path|remote.session_path, remote_timeout_seconds|remote.timeout_seconds"
                );
            }
        }

        if normalized == "export_dir" {
            fs::create_dir_all(&self.export_dir).with_context(|| {
                format!(
                    "Failed to create export directory: {}",
                    self.export_dir.display()
                )
            })?;
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "quests_path" => Some(self.quests_path.display().to_string()),
            "export_dir" => Some(self.export_dir.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "default_daily_goal" => Some(self.default_daily_goal.to_string()),
            "remote_api_key" => Some(
                self.remote_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "remote_project_id" => Some(
                self.remote_project_id
                    .clone()
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "remote_collection" => Some(self.remote_collection.clone()),
            "remote_auth_base_url" => Some(self.remote_auth_base_url.clone()),
            "remote_firestore_base_url" => Some(self.remote_firestore_base_url.clone()),
            "remote_token_base_url" => Some(self.remote_token_base_url.clone()),
            "remote_session_path" => Some(self.remote_session_path.display().to_string()),
            "remote_timeout_seconds" => Some(self.remote_timeout_seconds.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "quests_path" | "quests.path" => "quests_path",
        "export_dir" | "export.dir" => "export_dir",
        "api_port" | "api.port" => "api_port",
        "default_daily_goal" | "goal.default" => "default_daily_goal",
        "remote_api_key" | "remote.api_key" => "remote_api_key",
        "remote_project_id" | "remote.project_id" => "remote_project_id",
        "remote_collection" | "remote.collection" => "remote_collection",
        "remote_auth_base_url" | "remote.auth_url" => "remote_auth_base_url",
        "remote_firestore_base_url" | "remote.firestore_url" => "remote_firestore_base_url",
        "remote_token_base_url" | "remote.token_url" => "remote_token_base_url",
        "remote_session_path" | "remote.session_path" => "remote_session_path",
        "remote_timeout_seconds" | "remote.timeout_seconds" => "remote_timeout_seconds",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

pub fn default_export_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("QuestLog")
        .join("exports")
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub(crate) fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn dotted_aliases_resolve_to_the_same_key() {
        let mut config = Config::default();
        config.set_value("api.port", "8123").expect("port set");
        assert_eq!(config.get_value("api_port").as_deref(), Some("8123"));

        config
            .set_value("remote.project_id", " demo-project ")
            .expect("project set");
        assert_eq!(
            config.get_value("remote_project_id").as_deref(),
            Some("demo-project")
        );
    }

    #[test]
    fn default_goal_is_clamped_not_rejected() {
        let mut config = Config::default();
        config.set_value("goal.default", "3").expect("goal set");
        assert_eq!(config.default_daily_goal, 10);

        config.set_value("goal.default", "999999").expect("goal set");
        assert_eq!(config.default_daily_goal, 10_000);
    }

    #[test]
    fn api_key_is_masked_on_read() {
        let mut config = Config::default();
        assert_eq!(config.get_value("remote.api_key").as_deref(), Some("not_set"));

        config
            .set_value("remote.api_key", "secret-value")
            .expect("key set");
        assert_eq!(config.get_value("remote.api_key").as_deref(), Some("***set***"));
    }

    #[test]
    fn remote_requires_project_id() {
        let mut config = Config::default();
        config.remote_api_key = Some("key".to_string());
        config.remote_project_id = None;
        assert!(!config.remote_configured());

        config.remote_project_id = Some("demo".to_string());
        assert!(config.remote_configured());
    }

    #[test]
    fn rejects_unknown_keys_and_nested_collections() {
        let mut config = Config::default();
        assert!(config.set_value("polling_seconds", "300").is_err());
        assert!(config.set_value("remote.collection", "a/b").is_err());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.api_port = 9001;
        config.save_to(&path).expect("saved");

        let loaded = Config::load_from(&path).expect("loaded");
        assert_eq!(loaded.api_port, 9001);
        assert_eq!(loaded.remote_collection, "activities");
    }
}
