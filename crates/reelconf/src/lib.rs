//! Minimal configuration loading for nightreel.
//!
//! Engine tuning lives here so the engine crate and the driver binary agree
//! on defaults without either one owning the file format.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/nightreel/config.toml` (system)
//! 2. `~/.config/nightreel/config.toml` (user)
//! 3. `./nightreel.toml`, or the path passed to [`ReelConfig::load`]
//! 4. Environment variables (`NIGHTREEL_*`, `RUST_LOG`)
//!
//! Files are merged table-by-table, so a local file that only sets
//! `[narration] rate` keeps every other value from the files before it.
//!
//! # Example Config
//!
//! ```toml
//! [engine]
//! frame_rate_hz = 60
//! begin_delay_ms = 50
//! sequence_path = "~/reels/midnight.toml"
//!
//! [narration]
//! language = "hi-IN"
//! pacing_ms = 250
//!
//! [ambient]
//! master_gain = 0.28
//! heartbeat_period_ms = 820
//!
//! [telemetry]
//! log_level = "info,nightreel=debug"
//! ```

pub mod audio;
pub mod engine;
pub mod loader;

pub use audio::{AmbientConfig, NarrationConfig};
pub use engine::{EngineConfig, TelemetryConfig};
pub use loader::ConfigSources;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Complete nightreel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReelConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub narration: NarrationConfig,

    #[serde(default)]
    pub ambient: AmbientConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ReelConfig {
    /// Load configuration from all sources and report where values came
    /// from. `config_path` replaces the local `./nightreel.toml`.
    pub fn load(config_path: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::parse_table(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Parse a single TOML document, defaults filling anything unset.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let path = Path::new("<string>");
        let table = loader::parse_document(contents, path)?;
        loader::parse_table(table, path)
    }

    /// Serialize the effective config to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("# nightreel configuration\n\n{}", body))
    }
}
