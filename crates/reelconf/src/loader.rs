//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ReelConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

const SYSTEM_CONFIG: &str = "/etc/nightreel/config.toml";
const USER_CONFIG: &str = "nightreel/config.toml";
const LOCAL_CONFIG: &str = "nightreel.toml";

/// Config files to load, in order: system, user, then local.
///
/// Standard locations are skipped when absent. An explicit `local` path
/// replaces `./nightreel.toml` and is always returned, so a mistyped path
/// fails at read time instead of being ignored.
pub fn discover_config_files(local: Option<&Path>) -> Vec<PathBuf> {
    let user = directories::BaseDirs::new().map(|dirs| dirs.config_dir().join(USER_CONFIG));
    let mut files: Vec<PathBuf> = [Some(PathBuf::from(SYSTEM_CONFIG)), user]
        .into_iter()
        .flatten()
        .filter(|path| path.is_file())
        .collect();

    match local {
        Some(path) => files.push(path.to_path_buf()),
        None => {
            let path = PathBuf::from(LOCAL_CONFIG);
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files
}

/// Read and parse one file into a raw table, validating it on the way.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let table = parse_document(&contents, path)?;
    // Deserialize once on its own so a type error names the file it came from.
    parse_table(table.clone(), path)?;
    Ok(table)
}

pub(crate) fn parse_document(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

pub(crate) fn parse_table(table: toml::Table, path: &Path) -> Result<ReelConfig, ConfigError> {
    let mut config: ReelConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    if let Some(sequence) = config.engine.sequence_path.take() {
        config.engine.sequence_path = Some(expand_path(&sequence.to_string_lossy()));
    }

    Ok(config)
}

/// Merge `overlay` into `base`. Nested tables merge key by key, anything
/// else in `overlay` replaces the value in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ReelConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Overlay values from `lookup`, which stands in for the process environment.
pub fn apply_overrides_from(
    config: &mut ReelConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("NIGHTREEL_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("NIGHTREEL_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Some(v) = lookup("NIGHTREEL_SEQUENCE") {
        config.engine.sequence_path = Some(expand_path(&v));
        sources.env_overrides.push("NIGHTREEL_SEQUENCE".to_string());
    }

    if let Some(v) = lookup("NIGHTREEL_FRAME_RATE") {
        match v.parse::<u32>() {
            Ok(rate) if rate > 0 => {
                config.engine.frame_rate_hz = rate;
                sources.env_overrides.push("NIGHTREEL_FRAME_RATE".to_string());
            }
            _ => {}
        }
    }

    if let Some(v) = lookup("NIGHTREEL_LANGUAGE") {
        config.narration.language = v;
        sources.env_overrides.push("NIGHTREEL_LANGUAGE".to_string());
    }
}

/// Resolve a leading `~` or `$VAR` component. Anything unresolvable is
/// returned as written.
pub(crate) fn expand_path(raw: &str) -> PathBuf {
    let (head, rest) = match raw.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (raw, None),
    };

    let base = match head {
        "~" => directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()),
        _ => head
            .strip_prefix('$')
            .filter(|name| !name.is_empty())
            .and_then(env::var_os)
            .map(PathBuf::from),
    };

    match (base, rest) {
        (Some(base), Some(rest)) => base.join(rest),
        (Some(base), None) => base,
        (None, _) => PathBuf::from(raw),
    }
}
