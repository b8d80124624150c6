//! Monotonic elapsed-time clock for the session
//!
//! A frame task samples `tokio::time::Instant` once per frame and publishes
//! the result on a watch channel. The first sampled frame becomes the
//! origin, so elapsed time starts at exactly zero on every run.
//!
//! Every run carries a generation number. `reset()` and `start()` both bump
//! it and abort the previous frame task; a frame that was already in flight
//! sees a different generation and exits without writing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// What every observer of the clock sees after each frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    pub elapsed: f64,
    pub running: bool,
    /// Generation of the run that produced this snapshot
    pub run: u64,
    pub duration: f64,
}

impl ClockSnapshot {
    /// `elapsed / duration`, clamped to `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }

    pub fn reached_end(&self) -> bool {
        self.elapsed >= self.duration
    }
}

#[derive(Debug, Default)]
struct ClockState {
    origin: Option<Instant>,
    elapsed: f64,
    running: bool,
    run: u64,
}

impl ClockState {
    /// Record one frame. Returns true when this frame reached the end.
    fn sample(&mut self, now: Instant, duration: f64) -> bool {
        let origin = *self.origin.get_or_insert(now);
        let elapsed = now.saturating_duration_since(origin).as_secs_f64().min(duration);
        self.elapsed = self.elapsed.max(elapsed);

        if self.elapsed >= duration {
            self.running = false;
            return true;
        }
        false
    }

    fn snapshot(&self, duration: f64) -> ClockSnapshot {
        ClockSnapshot {
            elapsed: self.elapsed,
            running: self.running,
            run: self.run,
            duration,
        }
    }
}

/// State shared with the frame task
struct ClockShared {
    duration: f64,
    state: Mutex<ClockState>,
    tx: watch::Sender<ClockSnapshot>,
}

impl ClockShared {
    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ClockState) {
        self.tx.send_replace(state.snapshot(self.duration));
    }

    /// Flip to running with a zeroed origin. `None` if already running.
    fn begin_run(&self) -> Option<u64> {
        let mut state = self.lock();
        if state.running {
            return None;
        }
        state.origin = None;
        state.elapsed = 0.0;
        state.running = true;
        state.run += 1;
        self.publish(&state);
        Some(state.run)
    }
}

/// The session's single source of elapsed time
pub struct ElapsedClock {
    shared: Arc<ClockShared>,
    frame_period: Duration,
    frames: Option<JoinHandle<()>>,
}

impl ElapsedClock {
    /// Create a stopped clock at zero. No task runs until `start()`.
    pub fn new(duration: f64, frame_period: Duration) -> Self {
        let state = ClockState::default();
        let (tx, _rx) = watch::channel(state.snapshot(duration));
        Self {
            shared: Arc::new(ClockShared {
                duration,
                state: Mutex::new(state),
                tx,
            }),
            frame_period,
            frames: None,
        }
    }

    /// Period for a display refresh rate in Hz
    pub fn frame_period_for(rate_hz: u32) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)))
    }

    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.shared.tx.subscribe()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        *self.shared.tx.borrow()
    }

    pub fn duration(&self) -> f64 {
        self.shared.duration
    }

    pub fn elapsed(&self) -> f64 {
        self.snapshot().elapsed
    }

    pub fn progress(&self) -> f64 {
        self.snapshot().progress()
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().running
    }

    /// Start sampling from zero. No-op while already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.cancel_frames();
        let Some(run) = self.shared.begin_run() else {
            return;
        };
        debug!("clock run {} started", run);
        let shared = Arc::clone(&self.shared);
        self.frames = Some(tokio::spawn(run_frames(shared, run, self.frame_period)));
    }

    /// Start after `delay`. A `reset()` or `start()` before the delay
    /// elapses cancels the pending start.
    pub fn start_after(&mut self, delay: Duration) {
        if self.is_running() {
            return;
        }
        self.cancel_frames();
        let shared = Arc::clone(&self.shared);
        let period = self.frame_period;
        self.frames = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(run) = shared.begin_run() {
                debug!("clock run {} started after {:?}", run, delay);
                run_frames(shared, run, period).await;
            }
        }));
    }

    /// Stop any run and return to zero. Safe to call at any time.
    pub fn reset(&mut self) {
        self.cancel_frames();
        let mut state = self.shared.lock();
        state.running = false;
        state.elapsed = 0.0;
        state.origin = None;
        state.run += 1;
        self.shared.publish(&state);
    }

    /// True while a frame task (or a pending delayed start) exists.
    pub fn has_pending_frames(&self) -> bool {
        self.frames.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn cancel_frames(&mut self) {
        if let Some(task) = self.frames.take() {
            task.abort();
        }
    }
}

impl Drop for ElapsedClock {
    fn drop(&mut self) {
        self.cancel_frames();
    }
}

async fn run_frames(shared: Arc<ClockShared>, run: u64, period: Duration) {
    let mut frames = time::interval(period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let now = frames.tick().await;

        let mut state = shared.lock();
        if state.run != run || !state.running {
            trace!("stale frame for run {} dropped", run);
            return;
        }
        let finished = state.sample(now, shared.duration);
        shared.publish(&state);

        if finished {
            info!("clock run {} reached {:.1}s", run, state.elapsed);
            return;
        }
    }
}
