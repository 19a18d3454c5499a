//! Configuration for wavlink.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags and their environment variables (see `cli`)
//! 2. Config file (.wavlink/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .wavlink/config.yaml
//! - Falls back to the user config directory (e.g. ~/.config/wavlink/config.yaml)
//! - A relative transcoder path is resolved against the project root

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::EncodingProfile;
use crate::core::DEFAULT_CHUNK_SIZE;
use crate::domain::SheetTarget;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Resumable upload chunks must be a multiple of this
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub sheet: SheetConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscoderConfig {
    /// Binary name on PATH, or a path (relative to the project root)
    pub binary: Option<String>,
    pub codec: Option<String>,
    pub vbr_quality: Option<u8>,
    /// Output extension without the dot
    pub extension: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadConfig {
    pub chunk_size_bytes: Option<usize>,
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetConfig {
    pub spreadsheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub start_row: Option<u32>,
}

/// Transcoder settings after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscoderSettings {
    pub binary: PathBuf,
    pub profile: EncodingProfile,
    pub timeout_seconds: u64,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            profile: EncodingProfile::default(),
            timeout_seconds: 600,
        }
    }
}

impl TranscoderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Document settings; the spreadsheet has no default
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSettings {
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub start_row: u32,
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            sheet_name: "Sheet1".to_string(),
            start_row: 4,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub transcoder: TranscoderSettings,
    /// Extension searched for when a directory is given as input
    pub source_extension: String,
    pub chunk_size: usize,
    /// Default destination folder
    pub folder_id: Option<String>,
    pub sheet: SheetSettings,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            transcoder: TranscoderSettings::default(),
            source_extension: "wav".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            folder_id: None,
            sheet: SheetSettings::default(),
        }
    }
}

impl ResolvedConfig {
    /// Apply a parsed config file on top of the defaults
    fn from_file(config: ConfigFile, config_path: &Path) -> Self {
        let defaults = Self::default();
        let profile = defaults.transcoder.profile.clone();

        // Project root is the parent of .wavlink/
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        let transcoder = TranscoderSettings {
            binary: config
                .transcoder
                .binary
                .map(|b| resolve_binary(base_dir, &b))
                .unwrap_or(defaults.transcoder.binary),
            profile: EncodingProfile {
                codec: config.transcoder.codec.unwrap_or(profile.codec),
                vbr_quality: config.transcoder.vbr_quality.unwrap_or(profile.vbr_quality),
                extension: config
                    .transcoder
                    .extension
                    .map(|e| e.trim_start_matches('.').to_string())
                    .unwrap_or(profile.extension),
            },
            timeout_seconds: config
                .transcoder
                .timeout_seconds
                .unwrap_or(defaults.transcoder.timeout_seconds),
        };

        Self {
            config_file: Some(config_path.to_path_buf()),
            transcoder,
            source_extension: config
                .sources
                .extension
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or(defaults.source_extension),
            chunk_size: config
                .upload
                .chunk_size_bytes
                .unwrap_or(defaults.chunk_size),
            folder_id: config.upload.folder_id.filter(|f| !f.is_empty()),
            sheet: SheetSettings {
                spreadsheet_id: config.sheet.spreadsheet_id.filter(|s| !s.is_empty()),
                sheet_name: config
                    .sheet
                    .sheet_name
                    .unwrap_or(defaults.sheet.sheet_name),
                start_row: config.sheet.start_row.unwrap_or(defaults.sheet.start_row),
            },
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size % CHUNK_ALIGNMENT != 0 {
            return Err(ConfigError::Invalid(format!(
                "upload.chunk_size_bytes must be a positive multiple of {} (got {})",
                CHUNK_ALIGNMENT, self.chunk_size
            )));
        }
        if self.sheet.start_row == 0 {
            return Err(ConfigError::Invalid(
                "sheet.start_row must be 1 or greater".to_string(),
            ));
        }
        if self.transcoder.profile.vbr_quality > 9 {
            return Err(ConfigError::Invalid(format!(
                "transcoder.vbr_quality must be between 0 and 9 (got {})",
                self.transcoder.profile.vbr_quality
            )));
        }
        if self.transcoder.profile.extension.is_empty() {
            return Err(ConfigError::Invalid(
                "transcoder.extension must not be empty".to_string(),
            ));
        }
        if self.source_extension.is_empty() {
            return Err(ConfigError::Invalid(
                "sources.extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Document target, with any of the parts overridden by the caller
    pub fn sheet_target(
        &self,
        spreadsheet_id: Option<&str>,
        sheet_name: Option<&str>,
        start_row: Option<u32>,
    ) -> SheetTarget {
        SheetTarget::new(
            spreadsheet_id
                .or(self.sheet.spreadsheet_id.as_deref())
                .unwrap_or_default(),
            sheet_name.unwrap_or(&self.sheet.sheet_name),
            start_row.unwrap_or(self.sheet.start_row),
        )
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".wavlink").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let user_config = dirs::config_dir()?.join("wavlink").join("config.yaml");
    user_config.exists().then_some(user_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// A bare name is looked up on PATH; anything with a separator is a path
fn resolve_binary(base: &Path, binary: &str) -> PathBuf {
    let path = PathBuf::from(binary);
    if path.is_absolute() || path.components().count() == 1 {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from a specific file, or defaults when `None`
pub fn load_config_from(path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let config = match path {
        Some(path) => ResolvedConfig::from_file(load_config_file(path)?, path),
        None => ResolvedConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig, ConfigError> {
    load_config_from(find_config_file().as_deref())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> anyhow::Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig, ConfigError> {
    load_config()
}
