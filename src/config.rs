//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// One EPG source: a playlist naming the channels to keep plus the guide to
/// take them from, shifted by a whole number of hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Free text, only used in log lines
    pub name: String,
    pub playlist_url: String,
    /// May end in `.gz`. Left empty, the playlist's `x-tvg-url` header is used.
    #[serde(default)]
    pub epg_url: String,
    #[serde(default)]
    pub offset_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Whole-request timeout
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 { 30 }
fn default_read_timeout() -> u64 { 60 }
fn default_user_agent() -> String { format!("epg_slim/{}", env!("CARGO_PKG_VERSION")) }

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_generator_name")]
    pub generator_name: String,
    #[serde(default = "default_generator_url")]
    pub generator_url: String,
    #[serde(default)]
    pub download: DownloadConfig,
    /// Processed strictly in this order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_output_path() -> PathBuf { PathBuf::from("slim_fixed_epg.xml") }
fn default_generator_name() -> String { "epg_slim".to_string() }
fn default_generator_url() -> String { "https://github.com/XMLTV/xmltv".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            generator_name: default_generator_name(),
            generator_url: default_generator_url(),
            download: DownloadConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/epg_slim/config.json`, falling back to the working directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("epg_slim");
        path.push("config.json");
        path
    }

    /// Read a config file. A missing file is not an error: it yields `None`
    /// so the caller can fall back to defaults.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
