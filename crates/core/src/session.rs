//! Per-player synced caption session.
//!
//! A [`SyncSession`] owns the clock state, the loaded cues and the repeating
//! tick timer of one player view. Every change to the clock republishes the
//! active cue on a watch channel that the overlay renders from.

use crate::clock::{SyncPhase, SyncState};
use crate::config::SyncConfig;
use crate::cue::Cue;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Identity of the title or episode a session is showing captions for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaKey {
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl MediaKey {
    pub fn movie(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            season: None,
            episode: None,
        }
    }

    pub fn episode(title: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            title: title.into(),
            season: Some(season),
            episode: Some(episode),
        }
    }
}

/// Fixed-size offset adjustments offered by the player controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    DecreaseLarge,
    DecreaseSmall,
    IncreaseSmall,
    IncreaseLarge,
}

impl Nudge {
    /// Signed offset change for this nudge under `config`.
    pub fn delta(self, config: &SyncConfig) -> f64 {
        match self {
            Nudge::DecreaseLarge => -config.large_nudge,
            Nudge::DecreaseSmall => -config.small_nudge,
            Nudge::IncreaseSmall => config.small_nudge,
            Nudge::IncreaseLarge => config.large_nudge,
        }
    }
}

/// One user action on the synced caption controls.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Toggle,
    Start,
    Pause,
    Reset,
    Nudge(Nudge),
    /// Arbitrary offset change in seconds.
    Offset(f64),
    /// Replace the cue list.
    Load(Vec<Cue>),
    Clear,
}

/// Point-in-time view of a session's clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub elapsed: f64,
    pub offset: f64,
    pub effective_time: f64,
    pub cue_count: usize,
}

struct Shared {
    state: SyncState,
    cues: Arc<[Cue]>,
}

/// Synced captions for one player. Dropping the session stops its timer.
///
/// [`start`](Self::start) spawns the tick task on the current tokio runtime,
/// so it must be called from within one.
pub struct SyncSession {
    config: SyncConfig,
    shared: Arc<Mutex<Shared>>,
    active: Arc<watch::Sender<Option<Cue>>>,
    timer: Option<JoinHandle<()>>,
    media: Option<MediaKey>,
}

impl SyncSession {
    pub fn new(config: SyncConfig) -> Self {
        let (active, _) = watch::channel(None);
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: SyncState::new(),
                cues: Arc::from(Vec::new()),
            })),
            active: Arc::new(active),
            timer: None,
            media: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn media(&self) -> Option<&MediaKey> {
        self.media.as_ref()
    }

    /// The loaded cue list.
    pub fn cues(&self) -> Arc<[Cue]> {
        lock(&self.shared).cues.clone()
    }

    /// Receiver that sees the active cue every time it changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Cue>> {
        self.active.subscribe()
    }

    /// Recompute the active cue from the current clock.
    pub fn active_cue(&self) -> Option<Cue> {
        let shared = lock(&self.shared);
        shared.state.active_cue(&shared.cues).cloned()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let shared = lock(&self.shared);
        SyncSnapshot {
            phase: shared.state.phase(),
            elapsed: shared.state.elapsed(),
            offset: shared.state.offset(),
            effective_time: shared.state.effective_time(),
            cue_count: shared.cues.len(),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared).state.is_running()
    }

    /// Whether a tick task is currently scheduled.
    pub fn is_ticking(&self) -> bool {
        self.timer.is_some()
    }

    /// Start the clock and its timer. Does nothing when already running.
    pub fn start(&mut self) {
        {
            let mut shared = lock(&self.shared);
            if shared.state.is_running() {
                return;
            }
            shared.state.start(Instant::now());
        }
        let period = self.config.tick_interval();
        debug!("starting sync timer every {:?}", period);
        self.timer = Some(tokio::spawn(tick_loop(
            self.shared.clone(),
            self.active.clone(),
            period,
        )));
    }

    /// Stop the clock and cancel its timer. Does nothing when stopped.
    pub fn pause(&mut self) {
        {
            let mut shared = lock(&self.shared);
            shared.state.pause(Instant::now());
            publish(&self.active, &shared);
        }
        self.cancel_timer();
    }

    pub fn toggle(&mut self) {
        if self.is_running() {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Zero elapsed time, keeping the offset and the running state.
    pub fn reset(&mut self) {
        let mut shared = lock(&self.shared);
        shared.state.reset(Instant::now());
        publish(&self.active, &shared);
    }

    pub fn adjust_offset(&mut self, delta: f64) {
        let mut shared = lock(&self.shared);
        shared.state.adjust_offset(delta);
        trace!("offset now {:.3}s", shared.state.offset());
        publish(&self.active, &shared);
    }

    pub fn nudge(&mut self, nudge: Nudge) {
        let delta = nudge.delta(&self.config);
        self.adjust_offset(delta);
    }

    /// Replace the cue list wholesale and start over from a fresh clock.
    pub fn load_cues(&mut self, cues: Vec<Cue>) {
        info!("loaded {} cues", cues.len());
        self.cancel_timer();
        let mut shared = lock(&self.shared);
        shared.cues = Arc::from(cues);
        shared.state.clear();
        publish(&self.active, &shared);
    }

    /// Drop all cues. The clock keeps going.
    pub fn clear_cues(&mut self) {
        info!("cleared cues");
        let mut shared = lock(&self.shared);
        shared.cues = Arc::from(Vec::new());
        publish(&self.active, &shared);
    }

    /// Attach the session to `media`. Switching to a different title or
    /// episode stops the clock and clears elapsed time and offset.
    /// Returns whether the clock was reset.
    pub fn set_media(&mut self, media: MediaKey) -> bool {
        if self.media.as_ref() == Some(&media) {
            return false;
        }
        info!("switching captions to {:?}", media);
        self.media = Some(media);
        self.cancel_timer();
        let mut shared = lock(&self.shared);
        shared.state.clear();
        publish(&self.active, &shared);
        true
    }

    pub fn apply(&mut self, control: Control) {
        trace!("apply({:?})", control);
        match control {
            Control::Toggle => self.toggle(),
            Control::Start => self.start(),
            Control::Pause => self.pause(),
            Control::Reset => self.reset(),
            Control::Nudge(nudge) => self.nudge(nudge),
            Control::Offset(delta) => self.adjust_offset(delta),
            Control::Load(cues) => self.load_cues(cues),
            Control::Clear => self.clear_cues(),
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!("stopping sync timer");
            timer.abort();
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("snapshot", &self.snapshot())
            .field("media", &self.media)
            .field("ticking", &self.is_ticking())
            .finish()
    }
}

/// Repeating tick task. Runs until aborted by the owning session.
async fn tick_loop(
    shared: Arc<Mutex<Shared>>,
    active: Arc<watch::Sender<Option<Cue>>>,
    period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let mut guard = lock(&shared);
        guard.state.tick(Instant::now());
        publish(&active, &guard);
    }
}

/// Send the active cue, notifying receivers only when it changed.
fn publish(active: &watch::Sender<Option<Cue>>, shared: &Shared) {
    let next = shared.state.active_cue(&shared.cues).cloned();
    active.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// The guarded data stays consistent across a panic, so poisoning is ignored.
fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    fn three_cues() -> Vec<Cue> {
        vec![
            Cue::new(0, 0.0, 2.0, "one"),
            Cue::new(1, 2.0, 4.0, "two"),
            Cue::new(2, 5.0, 7.0, "three"),
        ]
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[tokio::test(start_paused = true)]
    async fn timer_drives_the_active_cue() {
        // Quarter-second ticks add up to exactly 3.0, the cue boundary below
        // is inclusive.
        let config = SyncConfig {
            tick_interval_ms: 250,
            ..SyncConfig::default()
        };
        let mut session = SyncSession::new(config);
        let rx = session.subscribe();
        session.load_cues(three_cues());
        session.start();
        sleep(Duration::from_millis(3100)).await;

        let snap = session.snapshot();
        assert_eq!(snap.elapsed, 3.0);
        assert_eq!(snap.phase, SyncPhase::Running);
        assert_eq!(rx.borrow().as_ref().map(|c| c.id), Some(1));

        session.adjust_offset(-1.0);
        assert_eq!(session.snapshot().effective_time, 4.0);
        assert_eq!(rx.borrow().as_ref().map(|c| c.id), Some(1));

        session.adjust_offset(-1.1);
        assert_eq!(rx.borrow().as_ref().map(|c| c.id), Some(2));
        assert_eq!(session.active_cue().map(|c| c.id), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_pause_are_idempotent() {
        let mut session = SyncSession::new(SyncConfig::default());
        session.start();
        session.start();
        assert!(session.is_running());
        assert!(session.is_ticking());
        sleep(Duration::from_millis(1050)).await;

        session.pause();
        session.pause();
        assert!(!session.is_ticking());
        let frozen = session.snapshot().elapsed;
        assert!(close(frozen, 1.05), "elapsed {frozen}");
        assert_eq!(session.snapshot().phase, SyncPhase::Paused);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(session.snapshot().elapsed, frozen);

        session.toggle();
        assert!(session.is_running());
        session.toggle();
        assert!(!session.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_keeps_offset_and_running() {
        let mut session = SyncSession::new(SyncConfig::default());
        session.adjust_offset(1.5);
        session.start();
        sleep(Duration::from_millis(2050)).await;
        session.reset();

        let snap = session.snapshot();
        assert_eq!(snap.elapsed, 0.0);
        assert_eq!(snap.offset, 1.5);
        assert_eq!(snap.phase, SyncPhase::Running);

        sleep(Duration::from_millis(1000)).await;
        assert!(session.snapshot().elapsed > 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn nudges_use_configured_steps() {
        let config = SyncConfig {
            small_nudge: 0.25,
            large_nudge: 2.0,
            ..SyncConfig::default()
        };
        let mut session = SyncSession::new(config);
        session.apply(Control::Nudge(Nudge::IncreaseLarge));
        session.apply(Control::Nudge(Nudge::DecreaseSmall));
        session.apply(Control::Nudge(Nudge::DecreaseSmall));
        session.apply(Control::Offset(-4.0));
        assert_eq!(session.snapshot().offset, -2.5);
        assert_eq!(session.snapshot().phase, SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn media_change_resets_the_clock() {
        let mut session = SyncSession::new(SyncConfig::default());
        assert!(session.set_media(MediaKey::episode("Show", 1, 1)));
        session.load_cues(three_cues());
        session.adjust_offset(0.5);
        session.start();
        sleep(Duration::from_millis(550)).await;

        assert!(!session.set_media(MediaKey::episode("Show", 1, 1)));
        assert!(session.is_running());

        assert!(session.set_media(MediaKey::episode("Show", 1, 2)));
        let snap = session.snapshot();
        assert_eq!(snap.phase, SyncPhase::Idle);
        assert_eq!(snap.offset, 0.0);
        assert_eq!(snap.cue_count, 3);
        assert!(!session.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn loading_and_clearing_cues() {
        let mut session = SyncSession::new(SyncConfig::default());
        let rx = session.subscribe();
        session.adjust_offset(-3.0);
        session.apply(Control::Load(three_cues()));
        assert_eq!(session.snapshot().offset, 0.0);
        assert_eq!(rx.borrow().as_ref().map(|c| c.id), Some(0));

        session.adjust_offset(-3.0);
        assert_eq!(session.active_cue().map(|c| c.id), Some(1));
        session.apply(Control::Clear);
        assert!(session.active_cue().is_none());
        assert!(rx.borrow().is_none());
        assert_eq!(session.snapshot().offset, -3.0);
        assert!(session.cues().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_do_not_share_timers() {
        let mut a = SyncSession::new(SyncConfig::default());
        let mut b = SyncSession::new(SyncConfig::default());
        a.start();
        b.start();
        b.pause();
        sleep(Duration::from_millis(500)).await;
        assert!(a.snapshot().elapsed > 0.0);
        assert_eq!(b.snapshot().elapsed, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_stops_the_timer() {
        let mut session = SyncSession::new(SyncConfig::default());
        session.load_cues(three_cues());
        let mut rx = session.subscribe();
        session.start();
        sleep(Duration::from_millis(250)).await;
        rx.borrow_and_update();

        drop(session);
        let closed = timeout(Duration::from_secs(5), rx.changed()).await;
        assert!(matches!(closed, Ok(Err(_))));
    }
}
