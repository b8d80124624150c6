//! Nightreel: clock-driven audiovisual sequence engine
//!
//! Plays a fixed-length sequence of scenes and captions against one
//! elapsed-time clock, with two subsystems that keep their own time:
//!
//! - **Narration**: speaks caption segments one after another, advancing on
//!   speech completion
//! - **Ambience**: a procedural signal graph with a periodic heartbeat
//!   envelope running on the audio context's clock
//!
//! Both are activated and torn down on edges of the clock's running flag.
//! Host speech and audio synthesis are injected through [`Host`] and probed
//! once; a host without them still gets a time-correct silent sequence.

pub mod ambient;
pub mod audio;
pub mod clock;
pub mod graph;
pub mod narration;
pub mod orchestrator;
pub mod sampler;
pub mod sequence;
pub mod software;
pub mod speech;
pub mod view;

pub use ambient::{AmbientEngine, AmbientNodes, AmbientState, AudioSession, Envelope};
pub use audio::{
    AudioBackend, AudioContext, AudioError, FilterKind, GainEvent, NodeId, NodeKind, NullAudio,
    Waveform,
};
pub use clock::{ClockSnapshot, ElapsedClock};
pub use graph::{GraphError, SignalGraph};
pub use narration::{NarrationQueue, NarrationState};
pub use orchestrator::{status_of, Host, Orchestrator, SessionStatus};
pub use sampler::{caption_at, opacity, sample_scenes, SceneFrame};
pub use sequence::{CaptionSegment, JumpCut, SceneDescriptor, SceneId, SequenceError, SequenceTable};
pub use software::{LevelMeter, SampleSink, SoftwareAudio, SoftwareContext};
pub use speech::{NullSpeech, SpeechError, SpeechSynth, TranscriptSpeech, Utterance};
pub use view::{Capabilities, Card, FrameView};

pub use reelconf::ReelConfig;
