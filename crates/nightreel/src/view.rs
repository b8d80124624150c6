//! What the presentation layer renders each frame

use crate::ambient::AmbientState;
use crate::clock::ClockSnapshot;
use crate::narration::NarrationState;
use crate::orchestrator::SessionStatus;
use crate::sampler::{active_scene, caption_at, sample_scenes, SceneFrame};
use crate::sequence::{SceneId, SequenceTable};

/// The progress bar never renders fully empty
pub const PROGRESS_FILL_FLOOR: f64 = 0.01;

/// Capability chips, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub narration: bool,
    pub ambient: bool,
    /// Shown on the narration chip, e.g. "Hindi"
    pub voice_label: String,
}

/// Title card overlaying the scenes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Card {
    Intro { title: String, text: String },
    Outro { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub status: SessionStatus,
    pub elapsed: f64,
    pub duration: f64,
    pub progress: f64,
    pub progress_fill: f64,
    pub scenes: Vec<SceneFrame>,
    pub active_scene: Option<SceneId>,
    pub caption: Option<String>,
    pub capabilities: Capabilities,
    pub narration: NarrationState,
    pub ambient: AmbientState,
    pub card: Option<Card>,
}

impl FrameView {
    pub fn compose(
        table: &SequenceTable,
        snapshot: &ClockSnapshot,
        status: SessionStatus,
        started: bool,
        capabilities: &Capabilities,
        narration: NarrationState,
        ambient: AmbientState,
    ) -> Self {
        let elapsed = snapshot.elapsed;
        let progress = snapshot.progress();

        // Nothing is captioned before the first begin
        let caption = if started {
            caption_at(table.captions(), elapsed).map(|segment| segment.translated.clone())
        } else {
            None
        };

        let card = match status {
            SessionStatus::Ready => Some(Card::Intro {
                title: table.title().to_string(),
                text: table.intro().to_string(),
            }),
            SessionStatus::Finished => Some(Card::Outro {
                text: table.outro().to_string(),
            }),
            SessionStatus::Playing | SessionStatus::Paused => None,
        };

        Self {
            status,
            elapsed,
            duration: snapshot.duration,
            progress,
            progress_fill: progress.max(PROGRESS_FILL_FLOOR),
            scenes: sample_scenes(table, elapsed),
            active_scene: active_scene(table, elapsed).cloned(),
            caption,
            capabilities: capabilities.clone(),
            narration,
            ambient,
            card,
        }
    }

    /// Footer line: status, scene, capability chips, time
    pub fn status_line(&self) -> String {
        let scene = self
            .active_scene
            .as_ref()
            .map(SceneId::as_str)
            .unwrap_or("—");
        let voice = if self.capabilities.narration {
            self.capabilities.voice_label.as_str()
        } else {
            "Unavailable"
        };
        let atmos = if self.capabilities.ambient {
            "Active"
        } else {
            "Unavailable"
        };
        format!(
            "{} | scene: {} | VO: {} | Atmos: {} | {:.1}s / {:.0}s",
            self.status, scene, voice, atmos, self.elapsed, self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(elapsed: f64, running: bool) -> ClockSnapshot {
        ClockSnapshot {
            elapsed,
            running,
            run: 1,
            duration: 60.0,
        }
    }

    fn chips(narration: bool, ambient: bool) -> Capabilities {
        Capabilities {
            narration,
            ambient,
            voice_label: "Hindi".to_string(),
        }
    }

    fn compose(elapsed: f64, status: SessionStatus, started: bool) -> FrameView {
        let table = SequenceTable::builtin().unwrap();
        FrameView::compose(
            &table,
            &snapshot(elapsed, status == SessionStatus::Playing),
            status,
            started,
            &chips(true, false),
            NarrationState::Idle,
            AmbientState::Unsupported,
        )
    }

    #[test]
    fn test_ready_frame_shows_intro_and_no_caption() {
        let frame = compose(0.0, SessionStatus::Ready, false);
        assert!(matches!(frame.card, Some(Card::Intro { .. })));
        assert_eq!(frame.caption, None);
        assert_eq!(frame.progress_fill, PROGRESS_FILL_FLOOR);
        assert_eq!(frame.scenes.len(), 5);
    }

    #[test]
    fn test_playing_frame_has_caption() {
        let frame = compose(2.0, SessionStatus::Playing, true);
        assert_eq!(frame.card, None);
        assert!(frame.caption.is_some());
        assert_eq!(frame.active_scene.as_ref().map(SceneId::as_str), Some("scene1"));
    }

    #[test]
    fn test_gap_between_captions_is_empty() {
        let frame = compose(9.5, SessionStatus::Playing, true);
        assert_eq!(frame.caption, None);
    }

    #[test]
    fn test_finished_frame_shows_outro() {
        let frame = compose(60.0, SessionStatus::Finished, true);
        assert!(matches!(frame.card, Some(Card::Outro { .. })));
        assert_eq!(frame.progress, 1.0);
        assert_eq!(frame.active_scene, None);
        assert!(frame.scenes.iter().all(|scene| scene.opacity == 0.0));
    }

    #[test]
    fn test_status_line() {
        let frame = compose(12.34, SessionStatus::Playing, true);
        assert_eq!(
            frame.status_line(),
            "playing | scene: scene2 | VO: Hindi | Atmos: Unavailable | 12.3s / 60s"
        );

        let ended = compose(60.0, SessionStatus::Finished, true);
        assert_eq!(
            ended.status_line(),
            "finished | scene: — | VO: Hindi | Atmos: Unavailable | 60.0s / 60s"
        );
    }
}
