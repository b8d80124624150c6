//! Session lifecycle
//!
//! The orchestrator owns the clock and hands the narration queue and the
//! ambient engine to a conductor task. The conductor watches clock
//! snapshots and turns them into activation edges: a running clock means
//! active, anything else means inactive. A snapshot from a new run while
//! still active counts as deactivate then activate, so a replay always
//! rebuilds both sessions even if the watch channel coalesced the reset.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reelconf::ReelConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ambient::{AmbientEngine, AmbientState};
use crate::audio::{AudioBackend, NullAudio};
use crate::clock::{ClockSnapshot, ElapsedClock};
use crate::narration::{NarrationQueue, NarrationState};
use crate::sequence::SequenceTable;
use crate::speech::{NullSpeech, SpeechSynth};
use crate::view::{Capabilities, FrameView};

/// Host capabilities injected at construction
#[derive(Clone)]
pub struct Host {
    pub speech: Arc<dyn SpeechSynth>,
    pub audio: Arc<dyn AudioBackend>,
}

impl Host {
    pub fn new(speech: Arc<dyn SpeechSynth>, audio: Arc<dyn AudioBackend>) -> Self {
        Self { speech, audio }
    }

    /// No speech, no audio
    pub fn headless() -> Self {
        Self::new(Arc::new(NullSpeech), Arc::new(NullAudio))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ready,
    Playing,
    Paused,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ready => "ready",
            SessionStatus::Playing => "playing",
            SessionStatus::Paused => "paused",
            SessionStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn status_of(started: bool, finished: bool, running: bool) -> SessionStatus {
    if !started {
        SessionStatus::Ready
    } else if finished {
        SessionStatus::Finished
    } else if running {
        SessionStatus::Playing
    } else {
        SessionStatus::Paused
    }
}

/// A finish mark only counts for the run that set it. Runs are numbered
/// from 1, so a zero mark never matches a started session.
fn finished_in(finished_run: u64, started: bool, snapshot: &ClockSnapshot) -> bool {
    started && (finished_run == snapshot.run || snapshot.reached_end())
}

pub struct Orchestrator {
    table: Arc<SequenceTable>,
    clock: ElapsedClock,
    begin_delay: Duration,
    started: bool,
    finished_run: Arc<AtomicU64>,
    capabilities: Capabilities,
    narration: watch::Receiver<NarrationState>,
    ambient: watch::Receiver<AmbientState>,
    cancel: CancellationToken,
    conductor: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Probe the host once and spawn the conductor. Must be called inside
    /// a tokio runtime.
    pub fn new(table: SequenceTable, config: &ReelConfig, host: Host) -> Self {
        let table = Arc::new(table);
        let frame_period = ElapsedClock::frame_period_for(config.engine.frame_rate_hz);
        let clock = ElapsedClock::new(table.duration(), frame_period);

        let narration = NarrationQueue::new(host.speech, table.captions(), config.narration.clone());
        let ambient = AmbientEngine::new(host.audio, config.ambient.clone());

        let capabilities = Capabilities {
            narration: narration.supported(),
            ambient: ambient.supported(),
            voice_label: config.narration.language_label.clone(),
        };
        info!(
            title = table.title(),
            narration = capabilities.narration,
            ambient = capabilities.ambient,
            "orchestrator ready"
        );

        let finished_run = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        let narration_rx = narration.subscribe();
        let ambient_rx = ambient.subscribe();

        let conductor = Conductor {
            narration,
            ambient,
            live_run: None,
            finished_run: Arc::clone(&finished_run),
        };
        let task = tokio::spawn(conductor.run(clock.subscribe(), cancel.clone()));

        Self {
            table,
            clock,
            begin_delay: Duration::from_millis(config.engine.begin_delay_ms),
            started: false,
            finished_run,
            capabilities,
            narration: narration_rx,
            ambient: ambient_rx,
            cancel,
            conductor: Some(task),
        }
    }

    /// Start, or restart from zero. The clock starts after the begin delay
    /// so every observer sees the zeroed state first.
    pub fn begin(&mut self) {
        self.started = true;
        self.clock.reset();
        self.clock.start_after(self.begin_delay);
        info!("session begin");
    }

    pub fn table(&self) -> &SequenceTable {
        &self.table
    }

    pub fn clock(&self) -> &ElapsedClock {
        &self.clock
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn is_finished(&self, snapshot: &ClockSnapshot) -> bool {
        finished_in(self.finished_run.load(Ordering::SeqCst), self.started, snapshot)
    }

    pub fn status(&self) -> SessionStatus {
        let snapshot = self.clock.snapshot();
        status_of(self.started, self.is_finished(&snapshot), snapshot.running)
    }

    pub fn narration_state(&self) -> NarrationState {
        self.narration.borrow().clone()
    }

    pub fn ambient_state(&self) -> AmbientState {
        self.ambient.borrow().clone()
    }

    /// Everything the presentation layer needs for one frame
    pub fn frame(&self) -> FrameView {
        let snapshot = self.clock.snapshot();
        let status = status_of(self.started, self.is_finished(&snapshot), snapshot.running);
        FrameView::compose(
            &self.table,
            &snapshot,
            status,
            self.started,
            &self.capabilities,
            self.narration_state(),
            self.ambient_state(),
        )
    }

    /// Stop the clock and wait until both sessions are torn down.
    pub async fn shutdown(mut self) {
        self.clock.reset();
        self.cancel.cancel();
        if let Some(task) = self.conductor.take() {
            let _ = task.await;
        }
        info!("orchestrator shut down");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns the two clock-independent subsystems
struct Conductor {
    narration: NarrationQueue,
    ambient: AmbientEngine,
    /// Run generation the current sessions were built for
    live_run: Option<u64>,
    /// Run generation that last reached the end
    finished_run: Arc<AtomicU64>,
}

impl Conductor {
    async fn run(mut self, mut clock: watch::Receiver<ClockSnapshot>, cancel: CancellationToken) {
        loop {
            let snapshot = *clock.borrow_and_update();
            self.apply(&snapshot);

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = clock.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.set_active(false);
        debug!("conductor stopped");
    }

    fn apply(&mut self, snapshot: &ClockSnapshot) {
        if snapshot.running {
            if self.live_run != Some(snapshot.run) {
                if self.live_run.is_some() {
                    self.set_active(false);
                }
                self.live_run = Some(snapshot.run);
                self.set_active(true);
            }
            return;
        }

        if self.live_run.take().is_some() {
            self.set_active(false);
        }
        if snapshot.reached_end()
            && self.finished_run.swap(snapshot.run, Ordering::SeqCst) != snapshot.run
        {
            info!("session finished at {:.1}s", snapshot.elapsed);
        }
    }

    fn set_active(&mut self, active: bool) {
        self.narration.set_active(active);
        self.ambient.set_active(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derivation() {
        assert_eq!(status_of(false, false, false), SessionStatus::Ready);
        assert_eq!(status_of(false, true, true), SessionStatus::Ready);
        assert_eq!(status_of(true, true, false), SessionStatus::Finished);
        assert_eq!(status_of(true, true, true), SessionStatus::Finished);
        assert_eq!(status_of(true, false, true), SessionStatus::Playing);
        assert_eq!(status_of(true, false, false), SessionStatus::Paused);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Playing.to_string(), "playing");
        assert_eq!(SessionStatus::Finished.as_str(), "finished");
    }

    #[tokio::test(start_paused = true)]
    async fn test_headless_session_runs_silently() {
        let table = SequenceTable::builtin().unwrap();
        let mut orchestrator = Orchestrator::new(table, &ReelConfig::default(), Host::headless());
        assert_eq!(orchestrator.status(), SessionStatus::Ready);
        assert!(!orchestrator.capabilities().narration);
        assert!(!orchestrator.capabilities().ambient);

        orchestrator.begin();
        assert_eq!(orchestrator.status(), SessionStatus::Paused);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(orchestrator.status(), SessionStatus::Playing);
        assert_eq!(orchestrator.narration_state(), NarrationState::Unsupported);
        assert_eq!(orchestrator.ambient_state(), AmbientState::Unsupported);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(orchestrator.status(), SessionStatus::Finished);
        orchestrator.shutdown().await;
    }

    #[test]
    fn test_finish_mark_keyed_to_run() {
        let end = ClockSnapshot {
            elapsed: 60.0,
            running: false,
            run: 2,
            duration: 60.0,
        };
        assert!(finished_in(2, true, &end));
        assert!(!finished_in(2, false, &end));

        let replay = ClockSnapshot {
            elapsed: 0.0,
            run: 3,
            ..end
        };
        assert!(!finished_in(2, true, &replay));
        assert!(finished_in(3, true, &replay));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_finish_does_not_leak_into_replay() {
        let table = SequenceTable::builtin().unwrap();
        let duration = table.duration();
        let mut orchestrator = Orchestrator::new(table, &ReelConfig::default(), Host::headless());
        orchestrator.begin();
        tokio::time::sleep(Duration::from_secs_f64(duration + 5.0)).await;
        assert_eq!(orchestrator.status(), SessionStatus::Finished);
        let ended = orchestrator.clock().snapshot();

        orchestrator.begin();
        assert_eq!(orchestrator.status(), SessionStatus::Paused);

        // a conductor still handling the previous run's final snapshot
        let mut late = Conductor {
            narration: NarrationQueue::new(
                Arc::new(NullSpeech),
                orchestrator.table().captions(),
                ReelConfig::default().narration,
            ),
            ambient: AmbientEngine::new(Arc::new(NullAudio), ReelConfig::default().ambient),
            live_run: None,
            finished_run: Arc::clone(&orchestrator.finished_run),
        };
        late.apply(&ended);
        assert_eq!(orchestrator.finished_run.load(Ordering::SeqCst), ended.run);

        assert_eq!(orchestrator.status(), SessionStatus::Paused);
        assert!(orchestrator.frame().card.is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(orchestrator.status(), SessionStatus::Playing);
        orchestrator.shutdown().await;
    }
}
