//! Sequential narration playback
//!
//! Speaks the caption segments one after another, in start order. Advancing
//! is driven by the speech capability's completion, never by the clock.
//!
//! Each activation mints a session token. The session task compares its
//! token with the current one before every utterance and after every
//! completion, so a completion that arrives after deactivation is dropped
//! instead of starting the next segment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reelconf::NarrationConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::sequence::CaptionSegment;
use crate::speech::{SpeechSynth, Utterance};

/// Observable narration progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationState {
    /// The host has no speech capability
    Unsupported,
    Idle,
    Speaking { session: u64, index: usize },
}

/// Transient per-activation playback state
#[derive(Debug)]
struct NarrationSession {
    segments: Arc<[CaptionSegment]>,
    cursor: usize,
    token: u64,
}

/// What the session task needs besides its own cursor
#[derive(Clone)]
struct SessionContext {
    synth: Arc<dyn SpeechSynth>,
    voice: Arc<NarrationConfig>,
    current: Arc<AtomicU64>,
    state: Arc<watch::Sender<NarrationState>>,
}

impl SessionContext {
    fn is_current(&self, token: u64) -> bool {
        self.current.load(Ordering::SeqCst) == token
    }

    fn utterance(&self, segment: &CaptionSegment) -> Utterance {
        Utterance {
            text: segment.native.clone(),
            language: self.voice.language.clone(),
            pitch: self.voice.pitch,
            rate: self.voice.rate,
            volume: self.voice.volume,
        }
    }
}

/// Capability-gated sequential speech queue
pub struct NarrationQueue {
    ctx: SessionContext,
    segments: Arc<[CaptionSegment]>,
    supported: bool,
    active: bool,
    task: Option<JoinHandle<()>>,
}

impl NarrationQueue {
    /// Probe the capability and fix the speaking order.
    pub fn new(
        synth: Arc<dyn SpeechSynth>,
        segments: &[CaptionSegment],
        voice: NarrationConfig,
    ) -> Self {
        let supported = synth.probe();
        let mut ordered = segments.to_vec();
        ordered.sort_by(|a, b| a.start.total_cmp(&b.start));

        let initial = if supported {
            NarrationState::Idle
        } else {
            info!("speech synthesis unavailable, narration disabled");
            NarrationState::Unsupported
        };

        Self {
            ctx: SessionContext {
                synth,
                voice: Arc::new(voice),
                current: Arc::new(AtomicU64::new(0)),
                state: Arc::new(watch::Sender::new(initial)),
            },
            segments: ordered.into(),
            supported,
            active: false,
            task: None,
        }
    }

    pub fn supported(&self) -> bool {
        self.supported
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> NarrationState {
        self.ctx.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationState> {
        self.ctx.state.subscribe()
    }

    /// Feed the activation flag. Only edges do anything.
    pub fn set_active(&mut self, active: bool) {
        if active == self.active {
            return;
        }
        self.active = active;
        if !self.supported {
            return;
        }
        if active {
            self.activate();
        } else {
            self.deactivate();
        }
    }

    fn activate(&mut self) {
        self.ctx.synth.cancel_all();
        self.abort_task();

        let token = self.ctx.current.fetch_add(1, Ordering::SeqCst) + 1;
        let session = NarrationSession {
            segments: Arc::clone(&self.segments),
            cursor: 0,
            token,
        };
        debug!("narration session {} with {} segments", token, self.segments.len());
        self.task = Some(tokio::spawn(run_session(self.ctx.clone(), session)));
    }

    fn deactivate(&mut self) {
        // Invalidate first so nothing in flight can act on a completion.
        self.ctx.current.fetch_add(1, Ordering::SeqCst);
        self.abort_task();
        self.ctx.synth.cancel_all();
        self.ctx.state.send_replace(NarrationState::Idle);
        debug!("narration cancelled");
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for NarrationQueue {
    fn drop(&mut self) {
        if self.supported {
            self.ctx.current.fetch_add(1, Ordering::SeqCst);
            self.abort_task();
            self.ctx.synth.cancel_all();
        }
    }
}

async fn run_session(ctx: SessionContext, mut session: NarrationSession) {
    let pacing = Duration::from_millis(ctx.voice.pacing_ms);

    while let Some(segment) = session.segments.get(session.cursor) {
        if !ctx.is_current(session.token) {
            return;
        }
        ctx.state.send_replace(NarrationState::Speaking {
            session: session.token,
            index: session.cursor,
        });
        debug!(index = session.cursor, start = segment.start, "narrating segment");

        let outcome = ctx.synth.speak(ctx.utterance(segment)).await;
        if !ctx.is_current(session.token) {
            trace!("late completion for narration session {} dropped", session.token);
            return;
        }
        if let Err(e) = outcome {
            warn!(index = session.cursor, "narration segment failed: {}", e);
        }

        session.cursor += 1;
        if session.cursor < session.segments.len() {
            tokio::time::sleep(pacing).await;
        }
    }

    if ctx.is_current(session.token) {
        ctx.state.send_replace(NarrationState::Idle);
        debug!("narration session {} complete", session.token);
    }
}
