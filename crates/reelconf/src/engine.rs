//! Engine configuration - frame pacing, sequence source, telemetry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Frame loop and session entry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sampling rate of the elapsed-time clock.
    /// Default: 60
    #[serde(default = "EngineConfig::default_frame_rate_hz")]
    pub frame_rate_hz: u32,

    /// Delay between resetting the clock and starting it in `begin()`.
    /// Default: 50
    #[serde(default = "EngineConfig::default_begin_delay_ms")]
    pub begin_delay_ms: u64,

    /// Custom sequence table. When unset the built-in table is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_path: Option<PathBuf>,
}

impl EngineConfig {
    fn default_frame_rate_hz() -> u32 {
        60
    }

    fn default_begin_delay_ms() -> u64 {
        50
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: Self::default_frame_rate_hz(),
            begin_delay_ms: Self::default_begin_delay_ms(),
            sequence_path: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
