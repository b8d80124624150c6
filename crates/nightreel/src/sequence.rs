//! The immutable sequence table: scenes, caption segments, session length.
//!
//! Loaded once, validated once, never mutated. Captions are stored sorted by
//! start time so every consumer (subtitle lookup, narration order) reads
//! the same canonical order without re-sorting.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN: &str = include_str!("../assets/midnight_static.toml");

/// Stable identifier of a scene layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One visual scene, active over `[start, end)` seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub id: SceneId,
    pub start: f64,
    pub end: f64,
    pub title: String,
    #[serde(default)]
    pub logline: String,
    #[serde(default)]
    pub visual_class: String,
}

impl SceneDescriptor {
    pub fn new(id: impl Into<String>, start: f64, end: f64) -> Self {
        let id = SceneId::new(id);
        Self {
            title: id.0.clone(),
            id,
            start,
            end,
            logline: String::new(),
            visual_class: String::new(),
        }
    }

    /// Half-open containment: `start` is inside, `end` is not.
    pub fn contains(&self, elapsed: f64) -> bool {
        elapsed >= self.start && elapsed < self.end
    }
}

/// One narration line with its subtitle, active over `[start, end)` seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub start: f64,
    pub end: f64,
    /// Spoken by the narrator in the configured language
    pub native: String,
    /// Shown as the subtitle
    pub translated: String,
}

impl CaptionSegment {
    pub fn new(start: f64, end: f64, native: impl Into<String>, translated: impl Into<String>) -> Self {
        Self {
            start,
            end,
            native: native.into(),
            translated: translated.into(),
        }
    }

    pub fn contains(&self, elapsed: f64) -> bool {
        elapsed >= self.start && elapsed < self.end
    }
}

/// The designated jump-cut window on one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpCut {
    pub scene: SceneId,
    pub start: f64,
    pub end: f64,
}

/// Errors found while loading a sequence table
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("failed to read sequence {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse sequence: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("session duration must be positive and finite, got {0}")]
    InvalidDuration(f64),

    #[error("{what}: start {start} must be finite, non-negative and before end {end}")]
    InvalidRange { what: String, start: f64, end: f64 },

    #[error("{what}: end {end} is past the session duration {duration}")]
    OutOfBounds { what: String, end: f64, duration: f64 },

    #[error("scene #{0} has an empty id")]
    EmptySceneId(usize),

    #[error("duplicate scene id {0}")]
    DuplicateSceneId(SceneId),

    #[error("jump cut refers to unknown scene {0}")]
    UnknownJumpCutScene(SceneId),
}

/// Unvalidated table contents, as written in a sequence file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceParts {
    #[serde(default)]
    pub title: Option<String>,
    /// Derived from the latest `end` when unset
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub scenes: Vec<SceneDescriptor>,
    #[serde(default)]
    pub captions: Vec<CaptionSegment>,
    #[serde(default)]
    pub jump_cut: Option<JumpCut>,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub outro: Option<String>,
}

impl SequenceParts {
    /// Validate and freeze into a table.
    pub fn build(self) -> Result<SequenceTable, SequenceError> {
        SequenceTable::from_parts(self)
    }
}

/// Validated, immutable sequence configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTable {
    title: String,
    duration: f64,
    scenes: Vec<SceneDescriptor>,
    captions: Vec<CaptionSegment>,
    jump_cut: Option<JumpCut>,
    intro: String,
    outro: String,
}

impl SequenceTable {
    /// The compiled-in "Midnight Static" table
    pub fn builtin() -> Result<Self, SequenceError> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SequenceError> {
        let parts: SequenceParts = toml::from_str(contents)?;
        Self::from_parts(parts)
    }

    pub fn load(path: &Path) -> Result<Self, SequenceError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SequenceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_parts(parts: SequenceParts) -> Result<Self, SequenceError> {
        let SequenceParts {
            title,
            duration,
            scenes,
            mut captions,
            jump_cut,
            intro,
            outro,
        } = parts;

        let duration = duration.unwrap_or_else(|| {
            scenes
                .iter()
                .map(|s| s.end)
                .chain(captions.iter().map(|c| c.end))
                .fold(0.0, f64::max)
        });
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SequenceError::InvalidDuration(duration));
        }

        let mut seen = HashSet::new();
        for (index, scene) in scenes.iter().enumerate() {
            if scene.id.0.is_empty() {
                return Err(SequenceError::EmptySceneId(index));
            }
            if !seen.insert(&scene.id) {
                return Err(SequenceError::DuplicateSceneId(scene.id.clone()));
            }
            check_range(format!("scene {}", scene.id), scene.start, scene.end, duration)?;
        }

        for (index, caption) in captions.iter().enumerate() {
            check_range(format!("caption #{}", index), caption.start, caption.end, duration)?;
        }

        if let Some(cut) = &jump_cut {
            if !seen.contains(&cut.scene) {
                return Err(SequenceError::UnknownJumpCutScene(cut.scene.clone()));
            }
            check_range(format!("jump cut on {}", cut.scene), cut.start, cut.end, duration)?;
        }

        // Stable, so captions sharing a start keep their file order.
        captions.sort_by(|a, b| a.start.total_cmp(&b.start));

        Ok(Self {
            title: title.unwrap_or_default(),
            duration,
            scenes,
            captions,
            jump_cut,
            intro: intro.unwrap_or_default(),
            outro: outro.unwrap_or_default(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Total session length in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Scenes in layer order
    pub fn scenes(&self) -> &[SceneDescriptor] {
        &self.scenes
    }

    /// Caption segments sorted by start
    pub fn captions(&self) -> &[CaptionSegment] {
        &self.captions
    }

    pub fn jump_cut(&self) -> Option<&JumpCut> {
        self.jump_cut.as_ref()
    }

    pub fn intro(&self) -> &str {
        &self.intro
    }

    pub fn outro(&self) -> &str {
        &self.outro
    }

    pub fn scene(&self, id: &SceneId) -> Option<&SceneDescriptor> {
        self.scenes.iter().find(|s| &s.id == id)
    }
}

fn check_range(what: String, start: f64, end: f64, duration: f64) -> Result<(), SequenceError> {
    if !start.is_finite() || !end.is_finite() || start < 0.0 || start >= end {
        return Err(SequenceError::InvalidRange { what, start, end });
    }
    if end > duration {
        return Err(SequenceError::OutOfBounds { what, end, duration });
    }
    Ok(())
}
