//! Software audio backend
//!
//! Renders the node graph block by block on the CPU. Time on a context
//! only advances as blocks are rendered, and a fresh context starts
//! suspended the way browser contexts do under autoplay policy. With a
//! [`SampleSink`] attached, resuming spawns a pump task that renders one
//! block per block-duration tick and hands it to the sink.

mod automation;
mod dsp;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use portable_atomic::AtomicF32;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::audio::{AudioBackend, AudioContext, AudioError, GainEvent, NodeId, NodeKind};
use crate::graph::SignalGraph;

pub use automation::GainTimeline;
pub use dsp::{rms, Biquad, BufferPlayer, Oscillator};

pub const DEFAULT_BLOCK_FRAMES: usize = 512;

/// Receives rendered blocks from a resumed context
pub trait SampleSink: Send + Sync {
    fn consume(&self, block: &[f32], sample_rate: u32);
}

/// Sink that only measures: per-block RMS, the loudest block so far, and
/// a block count
#[derive(Debug, Default)]
pub struct LevelMeter {
    last_rms: AtomicF32,
    peak_rms: AtomicF32,
    blocks: AtomicU64,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_rms(&self) -> f32 {
        self.last_rms.load(Ordering::Relaxed)
    }

    pub fn peak_rms(&self) -> f32 {
        self.peak_rms.load(Ordering::Relaxed)
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }
}

impl SampleSink for LevelMeter {
    fn consume(&self, block: &[f32], sample_rate: u32) {
        let level = rms(block);
        self.last_rms.store(level, Ordering::Relaxed);
        self.peak_rms.fetch_max(level, Ordering::Relaxed);
        let blocks = self.blocks.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(rms = level, frames = block.len(), sample_rate, blocks, "ambient block");
    }
}

enum Voice {
    Destination,
    Gain(GainTimeline),
    Oscillator(Oscillator),
    Buffer(BufferPlayer),
    Filter(Biquad),
}

struct RenderNode {
    voice: Voice,
    playing: bool,
    output: Vec<f32>,
}

impl RenderNode {
    fn new(voice: Voice) -> Self {
        Self {
            voice,
            playing: false,
            output: Vec::new(),
        }
    }

    fn is_source(&self) -> bool {
        matches!(self.voice, Voice::Oscillator(_) | Voice::Buffer(_))
    }

    fn process(&mut self, input: &[f32], start: f64, sample_rate: f64) {
        let frames = input.len();
        self.output.clear();
        self.output.resize(frames, 0.0);

        match &mut self.voice {
            Voice::Destination => self.output.copy_from_slice(input),
            Voice::Gain(timeline) => {
                for (i, (out, sample)) in self.output.iter_mut().zip(input).enumerate() {
                    let t = start + i as f64 / sample_rate;
                    *out = sample * timeline.value_at(t) as f32;
                }
                timeline.compact(start + frames as f64 / sample_rate);
            }
            Voice::Filter(filter) => {
                for (out, sample) in self.output.iter_mut().zip(input) {
                    *out = filter.process(*sample);
                }
            }
            Voice::Oscillator(osc) => {
                if self.playing {
                    for out in self.output.iter_mut() {
                        *out = osc.next_sample(sample_rate);
                    }
                }
            }
            Voice::Buffer(player) => {
                if self.playing {
                    for out in self.output.iter_mut() {
                        *out = player.next_sample();
                    }
                    if player.finished() {
                        self.playing = false;
                    }
                }
            }
        }
    }
}

struct Renderer {
    sample_rate: u32,
    graph: SignalGraph<RenderNode>,
    destination: NodeId,
    frames_rendered: u64,
    suspended: bool,
    closed: bool,
}

impl Renderer {
    fn new(sample_rate: u32) -> Self {
        let mut graph = SignalGraph::new();
        let destination = graph.add_node(RenderNode::new(Voice::Destination));
        Self {
            sample_rate,
            graph,
            destination,
            frames_rendered: 0,
            suspended: true,
            closed: false,
        }
    }

    fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn check_open(&self) -> Result<(), AudioError> {
        if self.closed {
            Err(AudioError::Closed)
        } else {
            Ok(())
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut RenderNode, AudioError> {
        self.check_open()?;
        self.graph.node_mut(id).ok_or(AudioError::UnknownNode(id))
    }

    fn render(&mut self, frames: usize) -> Result<Vec<f32>, AudioError> {
        self.check_open()?;
        if self.suspended {
            return Ok(vec![0.0; frames]);
        }

        let start = self.now();
        let sample_rate = self.sample_rate as f64;
        let order = self.graph.processing_order()?.to_vec();

        for id in order {
            let mut mix = vec![0.0f32; frames];
            for input in self.graph.inputs(id) {
                if let Some(node) = self.graph.node(input) {
                    for (acc, sample) in mix.iter_mut().zip(&node.output) {
                        *acc += sample;
                    }
                }
            }
            if let Some(node) = self.graph.node_mut(id) {
                node.process(&mix, start, sample_rate);
            }
        }

        self.frames_rendered += frames as u64;
        let block = self
            .graph
            .node(self.destination)
            .map(|node| node.output.clone())
            .unwrap_or_else(|| vec![0.0; frames]);
        Ok(block)
    }

    fn live_sources(&self) -> usize {
        self.graph
            .node_ids()
            .into_iter()
            .filter_map(|id| self.graph.node(id))
            .filter(|node| node.is_source() && node.playing)
            .count()
    }
}

/// One software context
pub struct SoftwareContext {
    renderer: Arc<Mutex<Renderer>>,
    sample_rate: u32,
    destination: NodeId,
    sink: Option<Arc<dyn SampleSink>>,
    block_frames: usize,
    pump: Option<JoinHandle<()>>,
}

impl SoftwareContext {
    pub fn new(sample_rate: u32) -> Self {
        let renderer = Renderer::new(sample_rate);
        let destination = renderer.destination;
        Self {
            renderer: Arc::new(Mutex::new(renderer)),
            sample_rate,
            destination,
            sink: None,
            block_frames: DEFAULT_BLOCK_FRAMES,
            pump: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>, block_frames: usize) -> Self {
        self.sink = Some(sink);
        self.block_frames = block_frames.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Renderer> {
        self.renderer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Render `frames` samples of the destination mix. A suspended context
    /// yields silence without advancing its clock.
    pub fn render(&mut self, frames: usize) -> Result<Vec<f32>, AudioError> {
        self.lock().render(frames)
    }

    /// Sources started and not yet stopped
    pub fn live_sources(&self) -> usize {
        self.lock().live_sources()
    }

    /// Nodes in the graph, destination included
    pub fn node_count(&self) -> usize {
        self.lock().graph.node_count()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_pump(&self) -> bool {
        self.pump.as_ref().is_some_and(|pump| !pump.is_finished())
    }

    fn spawn_pump(&mut self) -> Result<(), AudioError> {
        let Some(sink) = self.sink.clone() else {
            return Ok(());
        };
        if self.has_pump() {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| AudioError::Backend(format!("no runtime for render pump: {e}")))?;

        let renderer = Arc::clone(&self.renderer);
        let frames = self.block_frames;
        let sample_rate = self.sample_rate;
        let period = Duration::from_secs_f64(frames as f64 / sample_rate as f64);

        self.pump = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let block = {
                    let mut renderer = renderer.lock().unwrap_or_else(PoisonError::into_inner);
                    match renderer.render(frames) {
                        Ok(block) => block,
                        Err(_) => break,
                    }
                };
                sink.consume(&block, sample_rate);
            }
            debug!("render pump stopped");
        }));
        Ok(())
    }

    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl AudioContext for SoftwareContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.lock().now()
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, AudioError> {
        let mut renderer = self.lock();
        renderer.check_open()?;
        let sample_rate = renderer.sample_rate as f64;
        let voice = match kind {
            NodeKind::Gain { gain } => Voice::Gain(GainTimeline::new(gain)),
            NodeKind::Oscillator {
                waveform,
                frequency,
            } => Voice::Oscillator(Oscillator::new(waveform, frequency)),
            NodeKind::Buffer { samples, looping } => Voice::Buffer(BufferPlayer::new(samples, looping)),
            NodeKind::Filter { kind, frequency, q } => {
                Voice::Filter(Biquad::new(kind, frequency, q, sample_rate))
            }
        };
        Ok(renderer.graph.add_node(RenderNode::new(voice)))
    }

    fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), AudioError> {
        let mut renderer = self.lock();
        renderer.check_open()?;
        for id in [source, dest] {
            if renderer.graph.node(id).is_none() {
                return Err(AudioError::UnknownNode(id));
            }
        }
        renderer.graph.connect(source, dest)?;
        Ok(())
    }

    fn start(&mut self, node: NodeId) -> Result<(), AudioError> {
        let mut renderer = self.lock();
        let target = renderer.node_mut(node)?;
        if !target.is_source() {
            return Err(AudioError::NotASource(node));
        }
        target.playing = true;
        Ok(())
    }

    fn stop(&mut self, node: NodeId) -> Result<(), AudioError> {
        let mut renderer = self.lock();
        let target = renderer.node_mut(node)?;
        if !target.is_source() {
            return Err(AudioError::NotASource(node));
        }
        target.playing = false;
        Ok(())
    }

    fn automate(&mut self, node: NodeId, event: GainEvent) -> Result<(), AudioError> {
        let mut renderer = self.lock();
        match &mut renderer.node_mut(node)?.voice {
            Voice::Gain(timeline) => {
                timeline.apply(event);
                Ok(())
            }
            _ => Err(AudioError::NotAGain(node)),
        }
    }

    fn is_suspended(&self) -> bool {
        self.lock().suspended
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        {
            let mut renderer = self.lock();
            renderer.check_open()?;
            renderer.suspended = false;
        }
        self.spawn_pump()
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.stop_pump();
        let mut renderer = self.lock();
        if renderer.closed {
            return Ok(());
        }
        renderer.closed = true;
        renderer.suspended = true;
        renderer.graph = SignalGraph::new();
        debug!(rendered_seconds = renderer.now(), "software context closed");
        Ok(())
    }
}

impl Drop for SoftwareContext {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// CPU renderer standing in for the host's audio device
#[derive(Clone)]
pub struct SoftwareAudio {
    sink: Option<Arc<dyn SampleSink>>,
    block_frames: usize,
}

impl SoftwareAudio {
    pub fn new() -> Self {
        Self {
            sink: None,
            block_frames: DEFAULT_BLOCK_FRAMES,
        }
    }

    /// Every context opened from this backend streams into `sink` once resumed
    pub fn with_sink(sink: Arc<dyn SampleSink>) -> Self {
        Self {
            sink: Some(sink),
            block_frames: DEFAULT_BLOCK_FRAMES,
        }
    }

    pub fn block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    pub fn open_context(&self, sample_rate: u32) -> SoftwareContext {
        let context = SoftwareContext::new(sample_rate);
        match &self.sink {
            Some(sink) => context.with_sink(Arc::clone(sink), self.block_frames.max(1)),
            None => context,
        }
    }
}

impl Default for SoftwareAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for SoftwareAudio {
    fn probe(&self) -> bool {
        true
    }

    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioContext>, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::Backend("sample rate must be positive".to_string()));
        }
        Ok(Box::new(self.open_context(sample_rate)))
    }
}
