//! Application configuration for Tenderfold.
//!
//! User config lives at `~/.tenderfold/tenderfold.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! The defaults encode the bid-evaluation packet layout: a project root is
//! any directory owning a subfolder named `12`, the evaluation material
//! lives under `12/开评标资料`, and the canonical output directory is `1`
//! directly under the project root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderfoldError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderfold.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderfold";

// ---------------------------------------------------------------------------
// Config structs (matching tenderfold.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Packet layout names and thresholds.
    #[serde(default)]
    pub layout: LayoutSection,

    /// Remote store settings.
    #[serde(default)]
    pub remote: RemoteSection,
}

/// `[layout]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSection {
    /// Marker subdirectory whose presence identifies a project root.
    #[serde(default = "default_marker_dir")]
    pub marker_dir: String,

    /// Data subdirectory under the marker holding the numbered folders.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Output directory name under the project root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of numbered source folders expected under the data area.
    /// Output is staged under the data area only when all of them exist.
    #[serde(default = "default_complete_threshold")]
    pub complete_threshold: u32,

    /// How many ranked candidate folders contribute to a merge.
    #[serde(default = "default_top_candidates")]
    pub top_candidates: usize,
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            marker_dir: default_marker_dir(),
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            complete_threshold: default_complete_threshold(),
            top_candidates: default_top_candidates(),
        }
    }
}

fn default_marker_dir() -> String {
    "12".into()
}
fn default_data_dir() -> String {
    "开评标资料".into()
}
fn default_output_dir() -> String {
    "1".into()
}
fn default_complete_threshold() -> u32 {
    12
}
fn default_top_candidates() -> usize {
    3
}

/// `[remote]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Suffix appended to a bundle's stem to mark it as already processed.
    #[serde(default = "default_processed_suffix")]
    pub processed_suffix: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            processed_suffix: default_processed_suffix(),
        }
    }
}

fn default_processed_suffix() -> String {
    "_已处理".into()
}

// ---------------------------------------------------------------------------
// Layout config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime layout configuration consumed by the pipeline crates.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Marker subdirectory name (e.g. `12`).
    pub marker_dir: String,
    /// Data subdirectory name under the marker (e.g. `开评标资料`).
    pub data_dir: String,
    /// Output directory name under the project root (e.g. `1`).
    pub output_dir: String,
    /// Numbered folders expected: `1..=complete_threshold`.
    pub complete_threshold: u32,
    /// Ranked candidates taken per merge.
    pub top_candidates: usize,
    /// Processed-bundle suffix marker.
    pub processed_suffix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for LayoutConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            marker_dir: config.layout.marker_dir.clone(),
            data_dir: config.layout.data_dir.clone(),
            output_dir: config.layout.output_dir.clone(),
            complete_threshold: config.layout.complete_threshold,
            top_candidates: config.layout.top_candidates,
            processed_suffix: config.remote.processed_suffix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderfold/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderfoldError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderfold/tenderfold.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderfoldError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TenderfoldError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderfoldError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderfoldError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderfoldError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
