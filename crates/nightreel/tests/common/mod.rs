//! Fake host capabilities for integration tests
//!
//! `FakeSpeech` holds every utterance until the test completes it.
//! `FakeAudio` records every context and everything done inside it.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use nightreel::{
    AudioBackend, AudioContext, AudioError, CaptionSegment, GainEvent, NodeId, NodeKind,
    SpeechError, SpeechSynth, Utterance,
};

// ============================================================================
// Speech
// ============================================================================

type Completion = oneshot::Sender<Result<(), SpeechError>>;

#[derive(Default)]
struct SpeechLog {
    spoken: Vec<Utterance>,
    pending: VecDeque<Completion>,
    cancels: usize,
}

/// Speech that only finishes when told to
pub struct FakeSpeech {
    supported: bool,
    /// When false, `cancel_all` leaves in-flight utterances pending, like a
    /// host that delivers the end event late
    resolve_on_cancel: bool,
    log: Mutex<SpeechLog>,
}

impl FakeSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            supported: true,
            resolve_on_cancel: true,
            log: Mutex::new(SpeechLog::default()),
        })
    }

    pub fn unsupported() -> Arc<Self> {
        Arc::new(Self {
            supported: false,
            resolve_on_cancel: true,
            log: Mutex::new(SpeechLog::default()),
        })
    }

    pub fn late_completions() -> Arc<Self> {
        Arc::new(Self {
            supported: true,
            resolve_on_cancel: false,
            log: Mutex::new(SpeechLog::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SpeechLog> {
        self.log.lock().unwrap()
    }

    /// Resolve the oldest in-flight utterance. False if none was listening.
    pub fn complete(&self, outcome: Result<(), SpeechError>) -> bool {
        let next = self.lock().pending.pop_front();
        match next {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.lock().spoken.iter().map(|u| u.text.clone()).collect()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.lock().spoken.clone()
    }

    pub fn spoken_count(&self) -> usize {
        self.lock().spoken.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().pending.iter().filter(|tx| !tx.is_closed()).count()
    }

    pub fn cancels(&self) -> usize {
        self.lock().cancels
    }
}

#[async_trait]
impl SpeechSynth for FakeSpeech {
    fn probe(&self) -> bool {
        self.supported
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut log = self.lock();
            log.spoken.push(utterance);
            log.pending.push_back(tx);
        }
        rx.await.unwrap_or(Err(SpeechError::Interrupted))
    }

    fn cancel_all(&self) {
        let mut log = self.lock();
        log.cancels += 1;
        if self.resolve_on_cancel {
            for tx in log.pending.drain(..) {
                let _ = tx.send(Err(SpeechError::Interrupted));
            }
        }
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Everything that happened inside one context
#[derive(Debug, Clone)]
pub struct ContextLog {
    pub sample_rate: u32,
    pub suspended: bool,
    pub resumed: usize,
    pub closed: bool,
    pub nodes: Vec<NodeKind>,
    pub connections: Vec<(NodeId, NodeId)>,
    pub started: Vec<NodeId>,
    pub stopped: Vec<NodeId>,
    pub playing: HashSet<NodeId>,
    pub automation: Vec<(NodeId, GainEvent)>,
    /// Operations attempted after close
    pub after_close: usize,
}

impl ContextLog {
    fn new(sample_rate: u32, suspended: bool) -> Self {
        Self {
            sample_rate,
            suspended,
            resumed: 0,
            closed: false,
            nodes: Vec::new(),
            connections: Vec::new(),
            started: Vec::new(),
            stopped: Vec::new(),
            playing: HashSet::new(),
            automation: Vec::new(),
            after_close: 0,
        }
    }

    pub fn count(&self, label: &str) -> usize {
        self.nodes.iter().filter(|kind| kind.label() == label).count()
    }

    pub fn gains_of(&self, node: NodeId) -> Vec<GainEvent> {
        self.automation
            .iter()
            .filter(|(id, _)| *id == node)
            .map(|(_, event)| *event)
            .collect()
    }
}

/// Node 0 of every fake context is its destination
const DESTINATION: NodeId = NodeId(0);

#[derive(Default)]
struct AudioState {
    contexts: Vec<ContextLog>,
}

pub struct FakeAudio {
    supported: bool,
    start_suspended: bool,
    /// Fail `create_node` once a context already holds this many nodes
    fail_at_node: Option<usize>,
    state: Arc<Mutex<AudioState>>,
}

impl FakeAudio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(true, true, None))
    }

    pub fn unsupported() -> Arc<Self> {
        Arc::new(Self::build(false, true, None))
    }

    pub fn failing_at_node(count: usize) -> Arc<Self> {
        Arc::new(Self::build(true, true, Some(count)))
    }

    pub fn running() -> Arc<Self> {
        Arc::new(Self::build(true, false, None))
    }

    fn build(supported: bool, start_suspended: bool, fail_at_node: Option<usize>) -> Self {
        Self {
            supported,
            start_suspended,
            fail_at_node,
            state: Arc::new(Mutex::new(AudioState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap()
    }

    pub fn contexts_opened(&self) -> usize {
        self.lock().contexts.len()
    }

    pub fn contexts_closed(&self) -> usize {
        self.lock().contexts.iter().filter(|c| c.closed).count()
    }

    pub fn context(&self, index: usize) -> ContextLog {
        self.lock().contexts[index].clone()
    }

    pub fn last_context(&self) -> ContextLog {
        self.lock().contexts.last().cloned().expect("no context opened")
    }

    /// Nodes in contexts that are still open
    pub fn live_nodes(&self) -> usize {
        self.lock()
            .contexts
            .iter()
            .filter(|c| !c.closed)
            .map(|c| c.nodes.len())
            .sum()
    }

    /// Started and not stopped, across every context
    pub fn live_sources(&self) -> usize {
        self.lock().contexts.iter().map(|c| c.playing.len()).sum()
    }

    pub fn operations_after_close(&self) -> usize {
        self.lock().contexts.iter().map(|c| c.after_close).sum()
    }
}

impl AudioBackend for FakeAudio {
    fn probe(&self) -> bool {
        self.supported
    }

    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioContext>, AudioError> {
        let mut state = self.lock();
        state
            .contexts
            .push(ContextLog::new(sample_rate, self.start_suspended));
        Ok(Box::new(FakeContext {
            index: state.contexts.len() - 1,
            sample_rate,
            opened: Instant::now(),
            fail_at_node: self.fail_at_node,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeContext {
    index: usize,
    sample_rate: u32,
    opened: Instant,
    fail_at_node: Option<usize>,
    state: Arc<Mutex<AudioState>>,
}

impl FakeContext {
    fn with<T>(
        &self,
        f: impl FnOnce(&mut ContextLog) -> Result<T, AudioError>,
    ) -> Result<T, AudioError> {
        let mut state = self.state.lock().unwrap();
        let log = &mut state.contexts[self.index];
        if log.closed {
            log.after_close += 1;
            return Err(AudioError::Closed);
        }
        f(log)
    }

    fn known(log: &ContextLog, node: NodeId) -> Result<(), AudioError> {
        if node == DESTINATION || (node.0 as usize) <= log.nodes.len() {
            Ok(())
        } else {
            Err(AudioError::UnknownNode(node))
        }
    }

    fn kind(log: &ContextLog, node: NodeId) -> Option<&NodeKind> {
        (node.0 as usize)
            .checked_sub(1)
            .and_then(|index| log.nodes.get(index))
    }
}

impl AudioContext for FakeContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.opened.elapsed().as_secs_f64()
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }

    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, AudioError> {
        let fail_at = self.fail_at_node;
        self.with(|log| {
            if fail_at.is_some_and(|limit| log.nodes.len() >= limit) {
                return Err(AudioError::Backend("out of voices".to_string()));
            }
            log.nodes.push(kind);
            Ok(NodeId(log.nodes.len() as u32))
        })
    }

    fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), AudioError> {
        self.with(|log| {
            Self::known(log, source)?;
            Self::known(log, dest)?;
            log.connections.push((source, dest));
            Ok(())
        })
    }

    fn start(&mut self, node: NodeId) -> Result<(), AudioError> {
        self.with(|log| match Self::kind(log, node) {
            Some(kind) if kind.is_source() => {
                log.started.push(node);
                log.playing.insert(node);
                Ok(())
            }
            Some(_) => Err(AudioError::NotASource(node)),
            None => Err(AudioError::UnknownNode(node)),
        })
    }

    fn stop(&mut self, node: NodeId) -> Result<(), AudioError> {
        self.with(|log| {
            log.stopped.push(node);
            log.playing.remove(&node);
            Ok(())
        })
    }

    fn automate(&mut self, node: NodeId, event: GainEvent) -> Result<(), AudioError> {
        self.with(|log| match Self::kind(log, node) {
            Some(NodeKind::Gain { .. }) => {
                log.automation.push((node, event));
                Ok(())
            }
            Some(_) => Err(AudioError::NotAGain(node)),
            None => Err(AudioError::UnknownNode(node)),
        })
    }

    fn is_suspended(&self) -> bool {
        self.state.lock().unwrap().contexts[self.index].suspended
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.with(|log| {
            log.suspended = false;
            log.resumed += 1;
            Ok(())
        })
    }

    fn close(&mut self) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        let log = &mut state.contexts[self.index];
        log.closed = true;
        log.playing.clear();
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn three_segments() -> Vec<CaptionSegment> {
    vec![
        CaptionSegment::new(0.0, 5.0, "ek", "one"),
        CaptionSegment::new(10.0, 15.0, "do", "two"),
        CaptionSegment::new(20.0, 25.0, "teen", "three"),
    ]
}
