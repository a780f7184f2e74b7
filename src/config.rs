use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 300;
const FONT_SIZE_RANGE: std::ops::RangeInclusive<f32> = 4.0..=72.0;
const MARGIN_RANGE: std::ops::RangeInclusive<f32> = 0.0..=50.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub policy: PolicyConfig,
    pub timeout_secs: u64,
    pub export: ExportConfig,
    pub log_filter: String,
}

/// Where a submitted image goes. Chosen at deploy time; the session
/// controller never looks at which one is active.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    Webhook {
        url: String,
        #[serde(default = "default_field_name")]
        field_name: String,
        #[serde(default)]
        require_markup: bool,
    },
    ObjectStorage {
        base_url: String,
        #[serde(default = "default_bucket")]
        bucket: String,
        #[serde(default)]
        api_key: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub file_name: String,
    pub margin_mm: f32,
    pub font_size: f32,
    pub open_after_save: bool,
}

fn default_field_name() -> String {
    "image".to_string()
}

fn default_bucket() -> String {
    "photos".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::Webhook {
                url: "http://localhost:5678/webhook/image-analysis".to_string(),
                field_name: default_field_name(),
                require_markup: false,
            },
            timeout_secs: 45,
            export: ExportConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: "analyse-image.pdf".to_string(),
            margin_mm: 10.0,
            font_size: 11.0,
            open_after_save: false,
        }
    }
}

impl Config {
    /// Loads the config from `explicit` if given, otherwise from the default
    /// location. Only the default location is allowed to be missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Config::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn with_webhook_url(mut self, url: String) -> Self {
        self.policy = match self.policy {
            PolicyConfig::Webhook {
                field_name,
                require_markup,
                ..
            } => PolicyConfig::Webhook {
                url,
                field_name,
                require_markup,
            },
            PolicyConfig::ObjectStorage { .. } => PolicyConfig::Webhook {
                url,
                field_name: default_field_name(),
                require_markup: false,
            },
        };
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.policy {
            PolicyConfig::Webhook {
                url, field_name, ..
            } => {
                check_url(url)?;
                if field_name.trim().is_empty() {
                    return Err(ConfigError::Invalid("webhook field_name is empty".into()));
                }
            }
            PolicyConfig::ObjectStorage {
                base_url, bucket, ..
            } => {
                check_url(base_url)?;
                if bucket.trim().is_empty() {
                    return Err(ConfigError::Invalid("storage bucket is empty".into()));
                }
            }
        }
        if self.export.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("export file_name is empty".into()));
        }
        // Range checks are false for NaN, so non-finite values fail too.
        if !MARGIN_RANGE.contains(&self.export.margin_mm) {
            return Err(ConfigError::Invalid(format!(
                "export margin_mm must be within 0..=50, got {}",
                self.export.margin_mm
            )));
        }
        if !FONT_SIZE_RANGE.contains(&self.export.font_size) {
            return Err(ConfigError::Invalid(format!(
                "export font_size must be within 4..=72, got {}",
                self.export.font_size
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
        )
    }
}

fn check_url(url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::Invalid("endpoint URL is empty".into()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "endpoint URL must be http(s): {url}"
        )));
    }
    Ok(())
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("image-analyzer").join("config.yaml"))
}
