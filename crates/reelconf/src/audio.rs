//! Narration voice and ambient synthesis parameters.
//!
//! These seed the per-activation sessions. They are read once when the
//! orchestrator is built; a running session never re-reads them.

use serde::{Deserialize, Serialize};

/// Fixed voice settings applied to every narration utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// BCP 47 language tag handed to the speech capability.
    /// Default: hi-IN
    #[serde(default = "NarrationConfig::default_language")]
    pub language: String,

    /// Human-readable language name for the status line.
    /// Default: Hindi
    #[serde(default = "NarrationConfig::default_language_label")]
    pub language_label: String,

    #[serde(default = "NarrationConfig::default_pitch")]
    pub pitch: f64,

    #[serde(default = "NarrationConfig::default_rate")]
    pub rate: f64,

    #[serde(default = "NarrationConfig::default_volume")]
    pub volume: f64,

    /// Gap between one segment finishing and the next one starting.
    /// Default: 250
    #[serde(default = "NarrationConfig::default_pacing_ms")]
    pub pacing_ms: u64,
}

impl NarrationConfig {
    fn default_language() -> String {
        "hi-IN".to_string()
    }

    fn default_language_label() -> String {
        "Hindi".to_string()
    }

    fn default_pitch() -> f64 {
        0.75
    }

    fn default_rate() -> f64 {
        0.92
    }

    fn default_volume() -> f64 {
        0.85
    }

    fn default_pacing_ms() -> u64 {
        250
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            language: Self::default_language(),
            language_label: Self::default_language_label(),
            pitch: Self::default_pitch(),
            rate: Self::default_rate(),
            volume: Self::default_volume(),
            pacing_ms: Self::default_pacing_ms(),
        }
    }
}

/// Procedural ambience: rumble, scraping noise, heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientConfig {
    /// Sample rate requested from the audio backend.
    /// Default: 48000
    #[serde(default = "AmbientConfig::default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "AmbientConfig::default_master_gain")]
    pub master_gain: f64,

    #[serde(default = "AmbientConfig::default_rumble_hz")]
    pub rumble_hz: f64,
    #[serde(default = "AmbientConfig::default_rumble_gain")]
    pub rumble_gain: f64,
    #[serde(default = "AmbientConfig::default_rumble_cutoff_hz")]
    pub rumble_cutoff_hz: f64,

    /// Length of the looping noise buffer.
    #[serde(default = "AmbientConfig::default_noise_seconds")]
    pub noise_seconds: f64,
    #[serde(default = "AmbientConfig::default_noise_gain")]
    pub noise_gain: f64,
    #[serde(default = "AmbientConfig::default_noise_cutoff_hz")]
    pub noise_cutoff_hz: f64,

    #[serde(default = "AmbientConfig::default_heartbeat_hz")]
    pub heartbeat_hz: f64,
    #[serde(default = "AmbientConfig::default_heartbeat_center_hz")]
    pub heartbeat_center_hz: f64,
    /// Re-trigger period of the heartbeat envelope.
    /// Default: 820
    #[serde(default = "AmbientConfig::default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
    #[serde(default = "AmbientConfig::default_heartbeat_peak")]
    pub heartbeat_peak: f64,
    #[serde(default = "AmbientConfig::default_heartbeat_attack_ms")]
    pub heartbeat_attack_ms: u64,
    /// Offset at which the exponential decay reaches `heartbeat_floor`.
    #[serde(default = "AmbientConfig::default_heartbeat_decay_ms")]
    pub heartbeat_decay_ms: u64,
    #[serde(default = "AmbientConfig::default_heartbeat_floor")]
    pub heartbeat_floor: f64,
}

impl AmbientConfig {
    fn default_sample_rate() -> u32 {
        48_000
    }

    fn default_master_gain() -> f64 {
        0.28
    }

    fn default_rumble_hz() -> f64 {
        32.0
    }

    fn default_rumble_gain() -> f64 {
        0.08
    }

    fn default_rumble_cutoff_hz() -> f64 {
        90.0
    }

    fn default_noise_seconds() -> f64 {
        2.0
    }

    fn default_noise_gain() -> f64 {
        0.06
    }

    fn default_noise_cutoff_hz() -> f64 {
        2800.0
    }

    fn default_heartbeat_hz() -> f64 {
        60.0
    }

    fn default_heartbeat_center_hz() -> f64 {
        90.0
    }

    fn default_heartbeat_period_ms() -> u64 {
        820
    }

    fn default_heartbeat_peak() -> f64 {
        0.55
    }

    fn default_heartbeat_attack_ms() -> u64 {
        40
    }

    fn default_heartbeat_decay_ms() -> u64 {
        550
    }

    fn default_heartbeat_floor() -> f64 {
        0.001
    }
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            sample_rate: Self::default_sample_rate(),
            master_gain: Self::default_master_gain(),
            rumble_hz: Self::default_rumble_hz(),
            rumble_gain: Self::default_rumble_gain(),
            rumble_cutoff_hz: Self::default_rumble_cutoff_hz(),
            noise_seconds: Self::default_noise_seconds(),
            noise_gain: Self::default_noise_gain(),
            noise_cutoff_hz: Self::default_noise_cutoff_hz(),
            heartbeat_hz: Self::default_heartbeat_hz(),
            heartbeat_center_hz: Self::default_heartbeat_center_hz(),
            heartbeat_period_ms: Self::default_heartbeat_period_ms(),
            heartbeat_peak: Self::default_heartbeat_peak(),
            heartbeat_attack_ms: Self::default_heartbeat_attack_ms(),
            heartbeat_decay_ms: Self::default_heartbeat_decay_ms(),
            heartbeat_floor: Self::default_heartbeat_floor(),
        }
    }
}
