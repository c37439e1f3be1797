//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `vault.toml`. Stock defaults are
//! the base layer; a user file overrides whatever keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [compression.post]
//! threshold_bytes = 1572864   # Files above this are re-encoded (1.5 MB)
//! max_dimension = 1920        # Longest edge after compression
//! quality = 90                # JPEG quality (1-100)
//!
//! [compression.avatar]
//! threshold_bytes = 1048576   # 1 MB
//! max_dimension = 800
//! quality = 85
//!
//! [crop]
//! quality = 92                # JPEG quality of the cropped artifact
//! max_zoom = 3.0              # Zoom ceiling
//! debounce_ms = 100           # Quiet time before a live crop renders
//! mask_background = "#ffffff" # Fill outside the circular profile mask
//!
//! [upload]
//! caption_min_len = 1         # Characters, after trimming
//! progress_step = 10          # Synthetic progress increment (percent)
//! progress_interval_ms = 200
//! progress_cap = 90           # Progress holds here until the upload resolves
//!
//! [session]
//! idle_prompt_secs = 300      # 0 disables the inactivity prompt
//!
//! [storage]
//! root = "vault-data"         # LocalDataService root (storage/, records.json)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [crop]
//! max_zoom = 4.0
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{CompressionProfile, CropOptions, Quality};
use crate::upload::UploadSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "vault.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `vault.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Compression profiles per call site.
    pub compression: CompressionConfig,
    /// Crop rendering and editor limits.
    pub crop: CropConfig,
    /// Submit validation and synthetic progress.
    pub upload: UploadConfig,
    /// Session-level timers.
    pub session: SessionConfig,
    /// Local data service location.
    pub storage: StorageConfig,
}

impl VaultConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compression.post.validate("compression.post")?;
        self.compression.avatar.validate("compression.avatar")?;

        if !(1..=100).contains(&self.crop.quality) {
            return Err(ConfigError::Validation("crop.quality must be 1-100".into()));
        }
        if !self.crop.max_zoom.is_finite() || self.crop.max_zoom < 1.0 {
            return Err(ConfigError::Validation(
                "crop.max_zoom must be a number >= 1.0".into(),
            ));
        }
        parse_hex_color(&self.crop.mask_background).ok_or_else(|| {
            ConfigError::Validation(format!(
                "crop.mask_background must be #rgb or #rrggbb, got {:?}",
                self.crop.mask_background
            ))
        })?;

        if self.upload.progress_step == 0 {
            return Err(ConfigError::Validation(
                "upload.progress_step must be non-zero".into(),
            ));
        }
        if self.upload.progress_cap >= 100 {
            return Err(ConfigError::Validation(
                "upload.progress_cap must be below 100".into(),
            ));
        }
        if self.upload.progress_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "upload.progress_interval_ms must be non-zero".into(),
            ));
        }
        if self.storage.root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.root must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Compression profiles: feed posts and profile pictures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub post: ProfileConfig,
    pub avatar: ProfileConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            post: CompressionProfile::post().into(),
            avatar: CompressionProfile::avatar().into(),
        }
    }
}

/// One compression profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Files at or below this size are used as-is.
    pub threshold_bytes: u64,
    /// Longest edge after compression, in pixels.
    pub max_dimension: u32,
    /// JPEG quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl ProfileConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::Validation(format!(
                "{section}.quality must be 1-100"
            )));
        }
        if self.max_dimension == 0 {
            return Err(ConfigError::Validation(format!(
                "{section}.max_dimension must be non-zero"
            )));
        }
        Ok(())
    }

    pub fn profile(&self) -> CompressionProfile {
        CompressionProfile {
            threshold_bytes: self.threshold_bytes,
            max_dimension: self.max_dimension,
            quality: Quality::new(self.quality),
        }
    }
}

impl From<CompressionProfile> for ProfileConfig {
    fn from(p: CompressionProfile) -> Self {
        Self {
            threshold_bytes: p.threshold_bytes,
            max_dimension: p.max_dimension,
            quality: p.quality.value(),
        }
    }
}

/// Crop rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    /// JPEG quality of rendered crops (1-100).
    pub quality: u32,
    /// Zoom ceiling; raised to the cover-fit floor when that is higher.
    pub max_zoom: f64,
    /// Quiet time after the last gesture before a crop renders.
    pub debounce_ms: u64,
    /// Colour outside the circular profile mask (JPEG has no alpha).
    pub mask_background: String,
}

impl Default for CropConfig {
    fn default() -> Self {
        let options = CropOptions::default();
        Self {
            quality: options.quality.value(),
            max_zoom: crate::imaging::calculations::DEFAULT_MAX_ZOOM,
            debounce_ms: 100,
            mask_background: "#ffffff".to_string(),
        }
    }
}

impl CropConfig {
    pub fn options(&self) -> CropOptions {
        CropOptions {
            quality: Quality::new(self.quality),
            background: parse_hex_color(&self.mask_background).unwrap_or([255, 255, 255]),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Submit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Minimum caption length in characters, after trimming.
    pub caption_min_len: usize,
    /// Synthetic progress increment, in percent.
    pub progress_step: u8,
    /// Time between progress increments.
    pub progress_interval_ms: u64,
    /// Progress never passes this until the upload resolves.
    pub progress_cap: u8,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let settings = UploadSettings::default();
        Self {
            caption_min_len: settings.caption_min_len,
            progress_step: settings.progress_step,
            progress_interval_ms: settings.progress_interval.as_millis() as u64,
            progress_cap: settings.progress_cap,
        }
    }
}

impl UploadConfig {
    pub fn settings(&self) -> UploadSettings {
        UploadSettings {
            caption_min_len: self.caption_min_len,
            progress_step: self.progress_step,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            progress_cap: self.progress_cap,
        }
    }
}

/// Session timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds without activity before the user is prompted. 0 disables.
    pub idle_prompt_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_prompt_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_prompt_secs > 0).then(|| Duration::from_secs(self.idle_prompt_secs))
    }
}

/// Where the local data service keeps its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory; holds `storage/`, `records.json` and `drafts/`.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "vault-data".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }

    pub fn drafts_path(&self) -> PathBuf {
        self.root_path().join("drafts")
    }
}

/// Parse `#rgb` or `#rrggbb` into an RGB triple.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 16 + v;
            }
            Some(out)
        }
        6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some([channel(0)?, channel(2)?, channel(4)?])
        }
        _ => None,
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(VaultConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<VaultConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: VaultConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// A missing file yields the stock defaults. User values are merged on top
/// of stock defaults, unknown keys are rejected, and the result is validated.
pub fn load_config(path: &Path) -> Result<VaultConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    if overlay.is_some() {
        log::debug!("loaded config overrides from {}", path.display());
    }
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `vault.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Memory Vault Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Compression
# ---------------------------------------------------------------------------
# Files larger than threshold_bytes are resized so their longest edge fits
# max_dimension and re-encoded as JPEG. If that fails, or does not make the
# file smaller, the original is used.

[compression.post]
threshold_bytes = 1572864
max_dimension = 1920
quality = 90

[compression.avatar]
threshold_bytes = 1048576
max_dimension = 800
quality = 85

# ---------------------------------------------------------------------------
# Cropping
# ---------------------------------------------------------------------------
[crop]
# JPEG quality of the rendered crop (1 = worst, 100 = best).
quality = 92

# Zoom ceiling. Never lower than the zoom needed to cover the frame.
max_zoom = 3.0

# Quiet time after the last drag/zoom before a crop renders.
debounce_ms = 100

# Colour outside the circular profile-picture mask.
mask_background = "#ffffff"

# ---------------------------------------------------------------------------
# Upload
# ---------------------------------------------------------------------------
[upload]
# Minimum caption length, in characters after trimming.
caption_min_len = 1

# Synthetic progress: +progress_step percent every progress_interval_ms,
# holding at progress_cap until the upload resolves, then 100.
progress_step = 10
progress_interval_ms = 200
progress_cap = 90

# ---------------------------------------------------------------------------
# Session
# ---------------------------------------------------------------------------
[session]
# Seconds without activity before prompting the user. 0 disables.
idle_prompt_secs = 300

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Local data service root: storage/, records.json and drafts/ live here.
root = "vault-data"
"##
}
