//! Audio synthesis capability
//!
//! A small Web-Audio-shaped interface: build generator, filter and gain
//! nodes inside a context, connect them into a graph ending at the
//! context's destination, start and stop sources, and schedule gain
//! automation against the context's own audio clock.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::GraphError;

/// Handle to a node inside one audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

/// What to build
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Gain {
        gain: f64,
    },
    Oscillator {
        waveform: Waveform,
        frequency: f64,
    },
    /// Plays a mono buffer at the context's sample rate
    Buffer {
        samples: Arc<[f32]>,
        looping: bool,
    },
    Filter {
        kind: FilterKind,
        frequency: f64,
        q: f64,
    },
}

impl NodeKind {
    /// Sources produce signal on their own once started
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Oscillator { .. } | NodeKind::Buffer { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Gain { .. } => "gain",
            NodeKind::Oscillator { .. } => "oscillator",
            NodeKind::Buffer { .. } => "buffer",
            NodeKind::Filter { .. } => "filter",
        }
    }
}

/// Gain automation, times in seconds on the context's audio clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainEvent {
    /// Drop every event scheduled at or after `from`
    CancelScheduled { from: f64 },
    SetValueAt { value: f64, time: f64 },
    LinearRampTo { value: f64, time: f64 },
    /// Values must be positive; the ramp is geometric
    ExponentialRampTo { value: f64, time: f64 },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioError {
    #[error("audio context is closed")]
    Closed,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("{0} is not a source and cannot be started or stopped")]
    NotASource(NodeId),

    #[error("{0} has no gain to automate")]
    NotAGain(NodeId),

    #[error("signal graph: {0}")]
    Graph(#[from] GraphError),

    #[error("audio backend: {0}")]
    Backend(String),
}

/// One live audio context (the host's output device plus its node graph)
pub trait AudioContext: Send {
    fn sample_rate(&self) -> u32;

    /// Seconds of audio rendered since the context was resumed
    fn current_time(&self) -> f64;

    /// The sink every graph ultimately feeds
    fn destination(&self) -> NodeId;

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, AudioError>;

    fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), AudioError>;

    fn start(&mut self, node: NodeId) -> Result<(), AudioError>;

    fn stop(&mut self, node: NodeId) -> Result<(), AudioError>;

    fn automate(&mut self, node: NodeId, event: GainEvent) -> Result<(), AudioError>;

    /// Contexts may be created suspended by host autoplay policy
    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> Result<(), AudioError>;

    /// Release the context and every node in it
    fn close(&mut self) -> Result<(), AudioError>;
}

/// Host audio synthesis
pub trait AudioBackend: Send + Sync {
    /// Whether the host can synthesize audio at all. Checked once.
    fn probe(&self) -> bool;

    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioContext>, AudioError>;
}

/// Host without audio synthesis
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioBackend for NullAudio {
    fn probe(&self) -> bool {
        false
    }

    fn open(&self, _sample_rate: u32) -> Result<Box<dyn AudioContext>, AudioError> {
        Err(AudioError::Backend("no audio synthesis on this host".to_string()))
    }
}
