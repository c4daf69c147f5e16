use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::platform::DEFAULT_API_BASE;
use crate::transcript::parse_timezone;

pub const DEFAULT_OUTPUT_DIR: &str = "/var/www/html/transcripts";
pub const DEFAULT_VIEWER_URL: &str = "https://mahto.id/chat-exporter";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Bot token; `CHATEXPORT_TOKEN` or `DISCORD_TOKEN` take precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Directory archived ticket transcripts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Public viewer that renders a transcript from its attachment URL
    #[serde(default = "default_viewer_url")]
    pub viewer_url: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// History cap for ticket archives
    #[serde(default = "default_archive_limit")]
    pub archive_limit: usize,

    #[serde(default = "default_support_dev")]
    pub support_dev: bool,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_viewer_url() -> String {
    DEFAULT_VIEWER_URL.to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_archive_limit() -> usize {
    10_000
}

fn default_support_dev() -> bool {
    true
}

pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHATEXPORT_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home).join(".chatexport").join("config.toml"))
}

/// Where archives go and how transcript links are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub viewer_base_url: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            viewer_base_url: default_viewer_url(),
        }
    }
}

impl Config {
    /// Load config, returning defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "token" => {
                self.token = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "api_base" => self.api_base = value.trim_end_matches('/').to_string(),
            "output_dir" | "dir" => self.output_dir = PathBuf::from(value),
            "viewer_url" | "viewer" => self.viewer_url = value.to_string(),
            "timezone" | "tz" => {
                parse_timezone(value).map_err(|err| anyhow::anyhow!("{err}"))?;
                self.timezone = value.to_string();
            }
            "archive_limit" | "limit" => {
                let limit: usize = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid archive_limit: must be a number"))?;
                if limit == 0 {
                    bail!("invalid archive_limit: must be greater than 0");
                }
                self.archive_limit = limit;
            }
            "support_dev" => {
                self.support_dev = match value.trim().to_lowercase().as_str() {
                    "true" | "yes" | "1" | "on" => true,
                    "false" | "no" | "0" | "off" => false,
                    _ => bail!("invalid support_dev: must be true or false"),
                };
            }
            _ => bail!("unknown config key: {key}"),
        }
        Ok(())
    }

    /// Environment token first, then the configured one.
    pub fn resolve_token(&self) -> Option<String> {
        ["CHATEXPORT_TOKEN", "DISCORD_TOKEN"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .map(|token| token.trim().to_string())
            .find(|token| !token.is_empty())
            .or_else(|| self.token.clone())
    }

    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            output_dir: self.output_dir.clone(),
            viewer_base_url: self.viewer_url.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            output_dir: default_output_dir(),
            viewer_url: default_viewer_url(),
            timezone: default_timezone(),
            archive_limit: default_archive_limit(),
            support_dev: default_support_dev(),
        }
    }
}
