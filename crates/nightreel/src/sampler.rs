//! Scene and subtitle sampling
//!
//! Pure functions of elapsed time over the sequence table. No state is kept
//! between calls; every frame re-evaluates from scratch, so sampling the
//! same instant twice always yields the same result.

use serde::Serialize;

use crate::sequence::{CaptionSegment, JumpCut, SceneDescriptor, SceneId, SequenceTable};

/// Seconds over which a scene fades in at `start` and out at `end`
pub const FADE_SECONDS: f64 = 2.0;

/// Opacity never drops below this while a scene is active
pub const OPACITY_FLOOR: f64 = 0.05;

/// Per-frame render state of one scene layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneFrame {
    pub id: SceneId,
    pub active: bool,
    pub opacity: f64,
    pub jump_cut: bool,
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Triangular fade: ramps up over the first two seconds, down over the last
/// two, floored at [`OPACITY_FLOOR`] while active and zero outside.
pub fn opacity(scene: &SceneDescriptor, elapsed: f64) -> f64 {
    if !scene.contains(elapsed) {
        return 0.0;
    }
    let fade_in = clamp01((elapsed - scene.start) / FADE_SECONDS);
    let fade_out = clamp01((scene.end - elapsed) / FADE_SECONDS);
    fade_in.min(fade_out).min(1.0).max(OPACITY_FLOOR)
}

/// True inside the jump-cut window, and only for the designated scene.
pub fn is_jump_cut(cut: Option<&JumpCut>, scene: &SceneId, elapsed: f64) -> bool {
    cut.is_some_and(|cut| &cut.scene == scene && elapsed >= cut.start && elapsed < cut.end)
}

pub fn scene_frame(scene: &SceneDescriptor, cut: Option<&JumpCut>, elapsed: f64) -> SceneFrame {
    SceneFrame {
        id: scene.id.clone(),
        active: scene.contains(elapsed),
        opacity: opacity(scene, elapsed),
        jump_cut: is_jump_cut(cut, &scene.id, elapsed),
    }
}

/// One frame per configured scene, in layer order.
pub fn sample_scenes(table: &SequenceTable, elapsed: f64) -> Vec<SceneFrame> {
    table
        .scenes()
        .iter()
        .map(|scene| scene_frame(scene, table.jump_cut(), elapsed))
        .collect()
}

/// First scene in layer order whose range contains `elapsed`.
pub fn active_scene(table: &SequenceTable, elapsed: f64) -> Option<&SceneId> {
    table
        .scenes()
        .iter()
        .find(|scene| scene.contains(elapsed))
        .map(|scene| &scene.id)
}

/// Caption whose range contains `elapsed`.
///
/// Captions are stored sorted by start, so when ranges overlap the one that
/// started earliest wins.
pub fn caption_at(captions: &[CaptionSegment], elapsed: f64) -> Option<&CaptionSegment> {
    captions.iter().find(|segment| segment.contains(elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceParts;

    fn scene(start: f64, end: f64) -> SceneDescriptor {
        SceneDescriptor::new("s", start, end)
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let s = scene(10.0, 20.0);
        assert!(opacity(&s, 10.0) > 0.0);
        assert!(opacity(&s, 19.999) > 0.0);
        assert_eq!(opacity(&s, 20.0), 0.0);
        assert_eq!(opacity(&s, 9.999), 0.0);
    }

    #[test]
    fn test_floor_on_entry_and_exit() {
        let s = scene(10.0, 20.0);
        assert_eq!(opacity(&s, 10.0), OPACITY_FLOOR);
        assert_eq!(opacity(&s, 19.99999), OPACITY_FLOOR);
    }

    #[test]
    fn test_triangular_fade_is_symmetric() {
        let s = scene(10.0, 20.0);
        for offset in [0.2, 0.5, 1.0, 1.5, 1.9] {
            let rising = opacity(&s, 10.0 + offset);
            let falling = opacity(&s, 20.0 - offset);
            assert!((rising - falling).abs() < 1e-9, "offset {}", offset);
            assert!((rising - (offset / FADE_SECONDS).max(OPACITY_FLOOR)).abs() < 1e-9);
        }
        assert_eq!(opacity(&s, 15.0), 1.0);
    }

    #[test]
    fn test_short_scene_never_reaches_full() {
        let s = scene(0.0, 2.0);
        assert!((opacity(&s, 1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_opacity_is_continuous_inside() {
        let s = scene(10.0, 20.0);
        let mut t = 10.0;
        let mut last = opacity(&s, t);
        while t < 19.99 {
            t += 0.01;
            let next = opacity(&s, t);
            assert!((next - last).abs() <= 0.0051, "jump at {}", t);
            last = next;
        }
    }

    #[test]
    fn test_jump_cut_only_for_designated_scene() {
        let cut = JumpCut {
            scene: SceneId::new("scene3"),
            start: 42.5,
            end: 43.5,
        };
        let scene3 = SceneId::new("scene3");
        let scene4 = SceneId::new("scene4");

        assert!(is_jump_cut(Some(&cut), &scene3, 42.5));
        assert!(is_jump_cut(Some(&cut), &scene3, 43.0));
        assert!(!is_jump_cut(Some(&cut), &scene3, 43.5));
        assert!(!is_jump_cut(Some(&cut), &scene3, 42.4));
        assert!(!is_jump_cut(Some(&cut), &scene4, 43.0));
        assert!(!is_jump_cut(None, &scene3, 43.0));
    }

    #[test]
    fn test_only_containing_scenes_active() {
        let table = SequenceParts {
            duration: Some(60.0),
            scenes: vec![
                SceneDescriptor::new("a", 0.0, 10.0),
                SceneDescriptor::new("b", 50.0, 60.0),
            ],
            ..Default::default()
        }
        .build()
        .unwrap();

        let mut t = 0.0;
        while t < 60.0 {
            for frame in sample_scenes(&table, t) {
                let range = table.scene(&frame.id).unwrap();
                assert_eq!(frame.active, range.contains(t));
                assert_eq!(frame.opacity > 0.0, frame.active);
            }
            t += 0.25;
        }

        let frames = sample_scenes(&table, 55.0);
        assert!(!frames[0].active);
        assert_eq!(frames[0].opacity, 0.0);
        assert!(frames[1].active);
        assert_eq!(active_scene(&table, 55.0).map(SceneId::as_str), Some("b"));
        assert_eq!(active_scene(&table, 30.0), None);
    }

    #[test]
    fn test_caption_lookup() {
        let captions = vec![
            CaptionSegment::new(1.0, 4.0, "ek", "one"),
            CaptionSegment::new(5.0, 8.0, "do", "two"),
        ];
        assert_eq!(caption_at(&captions, 0.5), None);
        assert_eq!(caption_at(&captions, 1.0).map(|c| c.translated.as_str()), Some("one"));
        assert_eq!(caption_at(&captions, 4.0), None);
        assert_eq!(caption_at(&captions, 7.9).map(|c| c.translated.as_str()), Some("two"));
        assert_eq!(caption_at(&captions, 8.0), None);
    }

    #[test]
    fn test_overlapping_captions_prefer_earliest_start() {
        let table = SequenceParts {
            duration: Some(20.0),
            captions: vec![
                CaptionSegment::new(6.0, 12.0, "baad", "later"),
                CaptionSegment::new(2.0, 10.0, "pehle", "earlier"),
            ],
            ..Default::default()
        }
        .build()
        .unwrap();

        let hit = caption_at(table.captions(), 8.0).unwrap();
        assert_eq!(hit.translated, "earlier");
        let hit = caption_at(table.captions(), 11.0).unwrap();
        assert_eq!(hit.translated, "later");
    }

    #[test]
    fn test_sampling_is_idempotent() {
        let table = SequenceTable::builtin().unwrap();
        for t in [0.0, 9.99, 22.0, 42.7, 59.9] {
            assert_eq!(sample_scenes(&table, t), sample_scenes(&table, t));
            assert_eq!(caption_at(table.captions(), t), caption_at(table.captions(), t));
        }
    }
}
