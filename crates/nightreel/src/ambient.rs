//! Procedural ambience
//!
//! One activation builds one [`AudioSession`]: a master gain into the
//! destination and three chains feeding it (sawtooth rumble, looping
//! filtered noise, enveloped heartbeat), plus a periodic task that
//! re-triggers the heartbeat envelope on the context's audio clock.
//!
//! Teardown order is fixed: cancel the heartbeat task, stop the
//! generators, close the context. The heartbeat checks its cancellation
//! token while holding the context lock, so it can never touch a context
//! that teardown has already closed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use reelconf::AmbientConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{
    AudioBackend, AudioContext, AudioError, FilterKind, GainEvent, NodeId, NodeKind, Waveform,
};

/// Q for every filter in the ambience
const FILTER_Q: f64 = 1.0;

type SharedContext = Arc<Mutex<Box<dyn AudioContext>>>;

fn lock(context: &SharedContext) -> MutexGuard<'_, Box<dyn AudioContext>> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbientState {
    /// The host has no audio synthesis
    Unsupported,
    Idle,
    Running { session: Uuid, nodes: usize },
}

/// Every node of one session, by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientNodes {
    pub master: NodeId,
    pub rumble: NodeId,
    pub rumble_gain: NodeId,
    pub rumble_filter: NodeId,
    pub noise: NodeId,
    pub noise_filter: NodeId,
    pub noise_gain: NodeId,
    pub heartbeat: NodeId,
    pub heartbeat_filter: NodeId,
    pub heartbeat_gain: NodeId,
}

impl AmbientNodes {
    pub const COUNT: usize = 10;

    pub fn sources(&self) -> [NodeId; 3] {
        [self.rumble, self.noise, self.heartbeat]
    }
}

/// Heartbeat gain envelope, offsets in seconds from the trigger instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub peak: f64,
    pub attack: f64,
    pub decay: f64,
    pub floor: f64,
}

impl Envelope {
    pub fn from_config(config: &AmbientConfig) -> Self {
        Self {
            peak: config.heartbeat_peak,
            attack: config.heartbeat_attack_ms as f64 / 1000.0,
            decay: config.heartbeat_decay_ms as f64 / 1000.0,
            floor: config.heartbeat_floor,
        }
    }

    /// The automation for a trigger at audio time `now`
    pub fn events(&self, now: f64) -> [GainEvent; 4] {
        [
            GainEvent::CancelScheduled { from: now },
            GainEvent::SetValueAt { value: 0.0, time: now },
            GainEvent::LinearRampTo {
                value: self.peak,
                time: now + self.attack,
            },
            GainEvent::ExponentialRampTo {
                value: self.floor,
                time: now + self.decay,
            },
        ]
    }

    pub fn trigger(&self, context: &mut dyn AudioContext, gain: NodeId) -> Result<(), AudioError> {
        let now = context.current_time();
        for event in self.events(now) {
            context.automate(gain, event)?;
        }
        Ok(())
    }
}

/// Uniform white noise in [-1, 1]
pub fn noise_buffer(sample_rate: u32, seconds: f64) -> Arc<[f32]> {
    let len = ((sample_rate as f64 * seconds).round() as usize).max(1);
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(-1.0f32..=1.0)).collect()
}

/// A context under construction. Dropping it before [`finish`] stops
/// whatever was started and closes the context.
///
/// [`finish`]: PartialSession::finish
struct PartialSession {
    context: Option<Box<dyn AudioContext>>,
    started: Vec<NodeId>,
}

impl PartialSession {
    fn new(context: Box<dyn AudioContext>) -> Self {
        Self {
            context: Some(context),
            started: Vec::new(),
        }
    }

    fn ctx(&mut self) -> Result<&mut (dyn AudioContext + 'static), AudioError> {
        match self.context.as_deref_mut() {
            Some(context) => Ok(context),
            None => Err(AudioError::Closed),
        }
    }

    fn node(&mut self, kind: NodeKind) -> Result<NodeId, AudioError> {
        self.ctx()?.create_node(kind)
    }

    fn chain(&mut self, nodes: &[NodeId]) -> Result<(), AudioError> {
        for pair in nodes.windows(2) {
            self.ctx()?.connect(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn start(&mut self, node: NodeId) -> Result<(), AudioError> {
        self.ctx()?.start(node)?;
        self.started.push(node);
        Ok(())
    }

    fn wire(&mut self, config: &AmbientConfig) -> Result<AmbientNodes, AudioError> {
        let destination = self.ctx()?.destination();
        let sample_rate = self.ctx()?.sample_rate();

        let master = self.node(NodeKind::Gain {
            gain: config.master_gain,
        })?;
        self.chain(&[master, destination])?;

        let rumble = self.node(NodeKind::Oscillator {
            waveform: Waveform::Sawtooth,
            frequency: config.rumble_hz,
        })?;
        let rumble_gain = self.node(NodeKind::Gain {
            gain: config.rumble_gain,
        })?;
        let rumble_filter = self.node(NodeKind::Filter {
            kind: FilterKind::Lowpass,
            frequency: config.rumble_cutoff_hz,
            q: FILTER_Q,
        })?;
        self.chain(&[rumble, rumble_gain, rumble_filter, master])?;

        let noise = self.node(NodeKind::Buffer {
            samples: noise_buffer(sample_rate, config.noise_seconds),
            looping: true,
        })?;
        let noise_filter = self.node(NodeKind::Filter {
            kind: FilterKind::Highpass,
            frequency: config.noise_cutoff_hz,
            q: FILTER_Q,
        })?;
        let noise_gain = self.node(NodeKind::Gain {
            gain: config.noise_gain,
        })?;
        self.chain(&[noise, noise_filter, noise_gain, master])?;

        let heartbeat = self.node(NodeKind::Oscillator {
            waveform: Waveform::Sine,
            frequency: config.heartbeat_hz,
        })?;
        let heartbeat_filter = self.node(NodeKind::Filter {
            kind: FilterKind::Bandpass,
            frequency: config.heartbeat_center_hz,
            q: FILTER_Q,
        })?;
        let heartbeat_gain = self.node(NodeKind::Gain { gain: 0.0 })?;
        self.chain(&[heartbeat, heartbeat_filter, heartbeat_gain, master])?;

        Ok(AmbientNodes {
            master,
            rumble,
            rumble_gain,
            rumble_filter,
            noise,
            noise_filter,
            noise_gain,
            heartbeat,
            heartbeat_filter,
            heartbeat_gain,
        })
    }

    fn finish(mut self) -> Result<(Box<dyn AudioContext>, Vec<NodeId>), AudioError> {
        let context = self.context.take().ok_or(AudioError::Closed)?;
        Ok((context, std::mem::take(&mut self.started)))
    }
}

impl Drop for PartialSession {
    fn drop(&mut self) {
        let Some(context) = self.context.as_deref_mut() else {
            return;
        };
        for node in self.started.drain(..) {
            if let Err(e) = context.stop(node) {
                debug!("stopping {} failed: {}", node, e);
            }
        }
        if let Err(e) = context.close() {
            debug!("closing partial audio context failed: {}", e);
        }
        debug!("released partially built audio session");
    }
}

/// The live resources of one ambient activation
pub struct AudioSession {
    id: Uuid,
    context: SharedContext,
    nodes: AmbientNodes,
    started: Vec<NodeId>,
    cancel: CancellationToken,
    heartbeat: Option<JoinHandle<()>>,
    released: bool,
}

impl AudioSession {
    /// Open a context, wire every chain, start the generators, resume the
    /// context and arm the heartbeat. On any failure everything already
    /// built is released before the error is returned.
    pub fn build(backend: &dyn AudioBackend, config: &AmbientConfig) -> Result<Self, AudioError> {
        let mut partial = PartialSession::new(backend.open(config.sample_rate)?);
        let nodes = partial.wire(config)?;
        for source in nodes.sources() {
            partial.start(source)?;
        }
        if partial.ctx()?.is_suspended() {
            partial.ctx()?.resume()?;
        }
        let (context, started) = partial.finish()?;

        let context: SharedContext = Arc::new(Mutex::new(context));
        let cancel = CancellationToken::new();
        let period = Duration::from_millis(config.heartbeat_period_ms.max(1));
        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&context),
            nodes.heartbeat_gain,
            Envelope::from_config(config),
            period,
            cancel.clone(),
        ));

        let id = Uuid::new_v4();
        info!(session = %id, "ambient session started");
        Ok(Self {
            id,
            context,
            nodes,
            started,
            cancel,
            heartbeat: Some(heartbeat),
            released: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn nodes(&self) -> &AmbientNodes {
        &self.nodes
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Tear everything down. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.cancel.cancel();
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }

        let mut context = lock(&self.context);
        for node in self.started.drain(..) {
            if let Err(e) = context.stop(node) {
                debug!("stopping {} failed: {}", node, e);
            }
        }
        if let Err(e) = context.close() {
            warn!(session = %self.id, "closing audio context failed: {}", e);
        }
        info!(session = %self.id, "ambient session released");
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.release();
    }
}

async fn run_heartbeat(
    context: SharedContext,
    gain: NodeId,
    envelope: Envelope,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut ctx = lock(&context);
        if cancel.is_cancelled() {
            break;
        }
        match envelope.trigger(&mut **ctx, gain) {
            Ok(()) => debug!(at = ctx.current_time(), "heartbeat"),
            Err(e) => {
                warn!("heartbeat trigger failed, stopping: {}", e);
                break;
            }
        }
    }
}

/// Capability-gated ambience driven by the activation flag
pub struct AmbientEngine {
    backend: Arc<dyn AudioBackend>,
    config: AmbientConfig,
    supported: bool,
    active: bool,
    session: Option<AudioSession>,
    state: watch::Sender<AmbientState>,
}

impl AmbientEngine {
    /// Probe the backend once.
    pub fn new(backend: Arc<dyn AudioBackend>, config: AmbientConfig) -> Self {
        let supported = backend.probe();
        let initial = if supported {
            AmbientState::Idle
        } else {
            info!("audio synthesis unavailable, ambience disabled");
            AmbientState::Unsupported
        };
        Self {
            backend,
            config,
            supported,
            active: false,
            session: None,
            state: watch::Sender::new(initial),
        }
    }

    pub fn supported(&self) -> bool {
        self.supported
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> AmbientState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AmbientState> {
        self.state.subscribe()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(AudioSession::id)
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
        self.deactivate();
        match AudioSession::build(self.backend.as_ref(), &self.config) {
            Ok(session) => {
                self.state.send_replace(AmbientState::Running {
                    session: session.id(),
                    nodes: AmbientNodes::COUNT,
                });
                self.session = Some(session);
            }
            Err(e) => {
                warn!("ambient session build failed, staying silent: {}", e);
            }
        }
    }

    fn deactivate(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release();
        }
        self.state.send_replace(AmbientState::Idle);
    }
}

impl Drop for AmbientEngine {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release();
        }
    }
}
