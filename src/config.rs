use crate::validation::ValidationError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const API_URL_ENV: &str = "RECYCLO_API_URL";
pub const CLASSIFIER_URL_ENV: &str = "RECYCLO_CLASSIFIER_URL";

const CONFIG_DIR: &str = ".recyclo";

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_classifier_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_site_id() -> i64 {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// `~/.recyclo`, or `.recyclo` when there is no home directory
fn state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
}

/// One config file as written on disk; every key is optional so that
/// layers only override what they set
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    api_url: Option<String>,
    classifier_url: Option<String>,
    site_id: Option<i64>,
    timeout_ms: Option<u64>,
    session_file: Option<PathBuf>,
    pending_file: Option<PathBuf>,
    journal_dir: Option<PathBuf>,
}

/// Resolved client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub classifier_url: String,
    /// Drop-off site sent with every recycling submission
    pub site_id: i64,
    pub timeout_ms: u64,
    pub session_file: PathBuf,
    pub pending_file: PathBuf,
    /// `None` disables the command journal
    pub journal_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let dir = state_dir();
        Self {
            api_url: default_api_url(),
            classifier_url: default_classifier_url(),
            site_id: default_site_id(),
            timeout_ms: default_timeout_ms(),
            session_file: dir.join("session.json"),
            pending_file: dir.join("pending.json"),
            journal_dir: Some(dir.join("journal")),
        }
    }
}

impl Config {
    /// Load configuration from default paths.
    /// Priority: local (.recyclo/config.local.toml) > project (.recyclo/config.toml)
    /// > user (~/.recyclo/config.toml) > built-in defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                config.merge_file(&user_config)?;
            }
        }

        let project_config = Path::new(CONFIG_DIR).join("config.toml");
        if project_config.exists() {
            config.merge_file(&project_config)?;
        }

        // Should be gitignored
        let local_config = Path::new(CONFIG_DIR).join("config.local.toml");
        if local_config.exists() {
            config.merge_file(&local_config)?;
        }

        Ok(config)
    }

    /// Defaults overlaid with a single file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: ConfigFile =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        self.merge(file);
        Ok(())
    }

    /// Keys set in `other` override ours
    fn merge(&mut self, other: ConfigFile) {
        if let Some(v) = other.api_url {
            self.api_url = v;
        }
        if let Some(v) = other.classifier_url {
            self.classifier_url = v;
        }
        if let Some(v) = other.site_id {
            self.site_id = v;
        }
        if let Some(v) = other.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = other.session_file {
            self.session_file = v;
        }
        if let Some(v) = other.pending_file {
            self.pending_file = v;
        }
        if let Some(v) = other.journal_dir {
            self.journal_dir = Some(v);
        }
    }

    /// Apply environment overrides (`RECYCLO_API_URL`, `RECYCLO_CLASSIFIER_URL`)
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(url) = lookup(CLASSIFIER_URL_ENV).filter(|v| !v.is_empty()) {
            self.classifier_url = url;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, url) in [
            ("api_url", &self.api_url),
            ("classifier_url", &self.classifier_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("Invalid URL '{}', expected http:// or https://", url),
                });
            }
        }

        if self.site_id <= 0 {
            errors.push(ValidationError {
                field: "site_id".to_string(),
                message: format!("Must be greater than 0, got {}", self.site_id),
            });
        }

        if self.timeout_ms == 0 {
            errors.push(ValidationError {
                field: "timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:3000");
        assert_eq!(config.classifier_url, "http://localhost:8000");
        assert_eq!(config.site_id, 2);
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.session_file.ends_with("session.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_overrides_only_set_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "api_url = \"https://api.example.cl\"\nsite_id = 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url, "https://api.example.cl");
        assert_eq!(config.site_id, 5);
        assert_eq!(config.classifier_url, "http://localhost:8000");
    }

    #[test]
    fn test_later_layer_wins() {
        let mut config = Config::default();
        config.merge(ConfigFile {
            timeout_ms: Some(1_000),
            site_id: Some(3),
            ..Default::default()
        });
        config.merge(ConfigFile {
            site_id: Some(7),
            ..Default::default()
        });
        assert_eq!(config.timeout_ms, 1_000);
        assert_eq!(config.site_id, 7);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "site_id = \"two\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_with(|key| match key {
            API_URL_ENV => Some("https://prod.example.cl".to_string()),
            CLASSIFIER_URL_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_url, "https://prod.example.cl");
        assert_eq!(config.classifier_url, "http://localhost:8000");
    }

    #[test]
    fn test_validate_errors() {
        let config = Config {
            api_url: "localhost:3000".to_string(),
            site_id: 0,
            timeout_ms: 0,
            ..Config::default()
        };
        let errors = config.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["api_url", "site_id", "timeout_ms"]);
        assert!(errors[0].message.contains("http://"));
    }
}
