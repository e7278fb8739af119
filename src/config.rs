use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pass::DEFAULT_VALIDITY_SECS;

pub const DEFAULT_BASE_URL: &str =
    "https://campusaccessbackend-default-rtdb.asia-southeast1.firebasedatabase.app";

const CONFIG_DIR: &str = ".campus-pass";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Remote document store settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the env var holding a database auth token
    #[serde(default)]
    pub auth_token_env: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl StoreConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(10_000))
    }

    /// Resolve the auth token from the configured environment variable
    pub fn resolve_auth_token(&self) -> Option<String> {
        self.auth_token_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|token| !token.is_empty())
    }
}

/// Access pass settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PassConfig {
    #[serde(default)]
    pub validity_secs: Option<u32>,
    /// Endpoint embedded in the payload for the gate scanner
    #[serde(default)]
    pub attendance_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ActivityConfig {
    /// Unset means enabled
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pass: PassConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.campus-pass/config.local.toml) > project (.campus-pass/config.toml)
    /// > user (~/.campus-pass/config.toml) > built-in defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(CONFIG_DIR).join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }

        // should be gitignored
        let local_config = Path::new(CONFIG_DIR).join("config.local.toml");
        if local_config.exists() {
            config.merge(Self::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority where set)
    pub fn merge(&mut self, other: Config) {
        if other.store.base_url.is_some() {
            self.store.base_url = other.store.base_url;
        }
        if other.store.auth_token_env.is_some() {
            self.store.auth_token_env = other.store.auth_token_env;
        }
        if other.store.timeout_ms.is_some() {
            self.store.timeout_ms = other.store.timeout_ms;
        }

        if other.pass.validity_secs.is_some() {
            self.pass.validity_secs = other.pass.validity_secs;
        }
        if other.pass.attendance_endpoint.is_some() {
            self.pass.attendance_endpoint = other.pass.attendance_endpoint;
        }

        if other.session.path.is_some() {
            self.session.path = other.session.path;
        }

        if other.activity.enabled.is_some() {
            self.activity.enabled = other.activity.enabled;
        }
        if other.activity.dir.is_some() {
            self.activity.dir = other.activity.dir;
        }
    }

    pub fn validity_secs(&self) -> u32 {
        self.pass.validity_secs.unwrap_or(DEFAULT_VALIDITY_SECS)
    }

    /// Endpoint for the pass payload, `<base>/attendance.json` unless overridden
    pub fn attendance_endpoint(&self) -> String {
        self.pass.attendance_endpoint.clone().unwrap_or_else(|| {
            format!("{}/attendance.json", self.store.base_url().trim_end_matches('/'))
        })
    }

    pub fn session_path(&self) -> PathBuf {
        self.session
            .path
            .clone()
            .unwrap_or_else(crate::session::FileStorage::default_path)
    }

    pub fn activity_enabled(&self) -> bool {
        self.activity.enabled.unwrap_or(true)
    }

    pub fn activity_dir(&self) -> PathBuf {
        self.activity.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("campus-pass")
                .join("activity")
        })
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let base_url = self.store.base_url();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            errors.push(ValidationError {
                field: "store.base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", base_url),
            });
        }

        if self.store.timeout_ms == Some(0) {
            errors.push(ValidationError {
                field: "store.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.validity_secs() == 0 {
            errors.push(ValidationError {
                field: "pass.validity_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(endpoint) = &self.pass.attendance_endpoint {
            if endpoint.trim().is_empty() {
                errors.push(ValidationError {
                    field: "pass.attendance_endpoint".to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
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
        assert_eq!(config.store.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.validity_secs(), 120);
        assert_eq!(
            config.attendance_endpoint(),
            format!("{}/attendance.json", DEFAULT_BASE_URL)
        );
        assert!(config.activity_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[store]
base_url = "http://localhost:9000/"
timeout_ms = 500

[pass]
validity_secs = 30

[activity]
enabled = false
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store.base_url(), "http://localhost:9000/");
        assert_eq!(config.store.timeout(), Duration::from_millis(500));
        assert_eq!(config.validity_secs(), 30);
        assert_eq!(
            config.attendance_endpoint(),
            "http://localhost:9000/attendance.json"
        );
        assert!(!config.activity_enabled());
    }

    #[test]
    fn test_merge_overrides_set_fields_only() {
        let mut base = Config::default();
        base.store.base_url = Some("https://a.example.com".to_string());
        base.pass.validity_secs = Some(60);

        let mut other = Config::default();
        other.store.timeout_ms = Some(1000);
        other.pass.attendance_endpoint = Some("https://scan.example.com".to_string());

        base.merge(other);
        assert_eq!(base.store.base_url(), "https://a.example.com");
        assert_eq!(base.store.timeout_ms, Some(1000));
        assert_eq!(base.validity_secs(), 60);
        assert_eq!(base.attendance_endpoint(), "https://scan.example.com");
    }

    #[test]
    fn test_later_layer_without_activity_keeps_it_disabled() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(&user, "[activity]\nenabled = false\n").unwrap();
        std::fs::write(&project, "[store]\ntimeout_ms = 500\n").unwrap();

        let mut config = Config::default();
        config.merge(Config::load_from(&user).unwrap());
        config.merge(Config::load_from(&project).unwrap());
        assert!(!config.activity_enabled());
        assert_eq!(config.store.timeout_ms, Some(500));

        let local = dir.path().join("local.toml");
        std::fs::write(&local, "[activity]\nenabled = true\n").unwrap();
        config.merge(Config::load_from(&local).unwrap());
        assert!(config.activity_enabled());
    }

    #[test]
    fn test_validate_bad_values() {
        let mut config = Config::default();
        config.store.base_url = Some("ftp://nope".to_string());
        config.pass.validity_secs = Some(0);
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].field.contains("base_url"));
        assert!(errors[1].field.contains("validity_secs"));
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/config.example.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.validity_secs(), 120);
        assert_eq!(config.store.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store\nbase_url = 1").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_auth_token_from_env() {
        let config = Config {
            store: StoreConfig {
                auth_token_env: Some("CAMPUS_PASS_TEST_TOKEN_UNSET".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.store.resolve_auth_token(), None);
    }
}
