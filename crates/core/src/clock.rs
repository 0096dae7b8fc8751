//! Manually driven playback clock used to pick the caption on screen.
//!
//! The embedded players never report their position, so captions follow a
//! local elapsed-time counter instead. The user corrects drift with an
//! offset and the lookup time is always `elapsed - offset`.

use crate::cue::Cue;
use serde::Serialize;
use tokio::time::Instant;

/// Coarse state of a [`SyncState`], derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    /// Stopped with nothing elapsed.
    Idle,
    /// Stopped part way through.
    Paused,
    Running,
}

/// Elapsed time, offset and running flag of one player.
/// These are always read and written together.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    elapsed: f64,
    offset: f64,
    is_running: bool,
    last_tick: Option<Instant>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds accumulated since the last reset.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Manual correction in seconds. Positive values delay the captions.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Time used for cue lookup.
    pub fn effective_time(&self) -> f64 {
        self.elapsed - self.offset
    }

    pub fn phase(&self) -> SyncPhase {
        if self.is_running {
            SyncPhase::Running
        } else if self.elapsed == 0.0 {
            SyncPhase::Idle
        } else {
            SyncPhase::Paused
        }
    }

    /// Begin accumulating from `now`. Does nothing when already running.
    pub fn start(&mut self, now: Instant) {
        if self.is_running {
            return;
        }
        self.is_running = true;
        self.last_tick = Some(now);
    }

    /// Stop accumulating, keeping the time up to `now`. Does nothing when
    /// already stopped.
    pub fn pause(&mut self, now: Instant) {
        if !self.is_running {
            return;
        }
        self.tick(now);
        self.is_running = false;
        self.last_tick = None;
    }

    /// Add the measured time since the previous tick to `elapsed`.
    /// Late or skipped ticks are caught up here since only the delta counts.
    pub fn tick(&mut self, now: Instant) {
        if !self.is_running {
            return;
        }
        if let Some(last) = self.last_tick {
            self.elapsed += now.saturating_duration_since(last).as_secs_f64();
        }
        self.last_tick = Some(now);
    }

    /// Zero the elapsed time. Offset and running flag are kept.
    pub fn reset(&mut self, now: Instant) {
        self.elapsed = 0.0;
        if self.is_running {
            self.last_tick = Some(now);
        }
    }

    pub fn adjust_offset(&mut self, delta: f64) {
        self.offset += delta;
    }

    /// Back to a fresh state: stopped, nothing elapsed, no offset.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The cue to show right now, see [`active_cue`].
    pub fn active_cue<'a>(&self, cues: &'a [Cue]) -> Option<&'a Cue> {
        active_cue(cues, self.effective_time())
    }
}

/// First cue in list order whose range contains `time`, bounds included.
/// Overlapping cues are not sorted out; the earlier one in the list wins.
pub fn active_cue(cues: &[Cue], time: f64) -> Option<&Cue> {
    cues.iter().find(|cue| cue.contains(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn three_cues() -> Vec<Cue> {
        vec![
            Cue::new(0, 0.0, 2.0, "one"),
            Cue::new(1, 2.0, 4.0, "two"),
            Cue::new(2, 5.0, 7.0, "three"),
        ]
    }

    #[test]
    fn first_overlapping_cue_wins() {
        let cues = vec![Cue::new(0, 0.0, 5.0, "a"), Cue::new(1, 2.0, 8.0, "b")];
        assert_eq!(active_cue(&cues, 3.0).map(|c| c.text.as_str()), Some("a"));
        assert_eq!(active_cue(&cues, 6.0).map(|c| c.text.as_str()), Some("b"));
        assert!(active_cue(&cues, 9.0).is_none());
        assert!(active_cue(&[], 1.0).is_none());
    }

    #[test]
    fn only_elapsed_minus_offset_matters() {
        let cues = three_cues();
        let base = Instant::now();
        for &(e, o, k) in &[(3.0, 0.0, 1.5), (1.0, -4.5, 10.0), (6.2, 0.7, 0.3)] {
            let mut a = SyncState::new();
            a.start(base);
            a.tick(base + secs(e));
            a.adjust_offset(o);

            let mut b = SyncState::new();
            b.start(base);
            b.tick(base + secs(e + k));
            b.adjust_offset(o + k);

            assert_eq!(
                a.active_cue(&cues).map(|c| c.id),
                b.active_cue(&cues).map(|c| c.id)
            );
        }
    }

    #[test]
    fn start_and_pause_are_idempotent() {
        let base = Instant::now();
        let mut state = SyncState::new();
        state.start(base);
        state.start(base + secs(1.0));
        state.tick(base + secs(2.0));
        assert_eq!(state.elapsed(), 2.0);
        assert!(state.is_running());

        state.pause(base + secs(3.0));
        state.pause(base + secs(5.0));
        assert_eq!(state.elapsed(), 3.0);
        assert_eq!(state.phase(), SyncPhase::Paused);

        // Paused time never counts.
        state.tick(base + secs(9.0));
        state.start(base + secs(10.0));
        state.tick(base + secs(11.0));
        assert_eq!(state.elapsed(), 4.0);
    }

    #[test]
    fn reset_only_zeroes_elapsed() {
        let base = Instant::now();
        let mut state = SyncState::new();
        state.adjust_offset(1.5);
        state.start(base);
        state.tick(base + secs(2.0));
        state.reset(base + secs(2.5));
        assert_eq!(state.elapsed(), 0.0);
        assert_eq!(state.offset(), 1.5);
        assert!(state.is_running());

        state.tick(base + secs(3.0));
        assert_eq!(state.elapsed(), 0.5);

        state.pause(base + secs(3.0));
        state.reset(base + secs(4.0));
        assert_eq!(state.phase(), SyncPhase::Idle);
        assert_eq!(state.offset(), 1.5);
    }

    #[test]
    fn late_ticks_catch_up() {
        let base = Instant::now();
        let mut state = SyncState::new();
        state.start(base);
        state.tick(base + secs(0.1));
        state.tick(base + secs(2.6));
        assert!((state.elapsed() - 2.6).abs() < 1e-9);
    }

    #[test]
    fn offset_moves_the_active_cue() {
        let cues = three_cues();
        let base = Instant::now();
        let mut state = SyncState::new();
        assert_eq!(state.phase(), SyncPhase::Idle);
        state.start(base);
        state.tick(base + secs(1.5));
        state.tick(base + secs(3.0));
        assert_eq!(state.active_cue(&cues).map(|c| c.id), Some(1));

        state.adjust_offset(-1.0);
        assert_eq!(state.effective_time(), 4.0);
        assert_eq!(state.active_cue(&cues).map(|c| c.id), Some(1));

        state.adjust_offset(-1.1);
        assert_eq!(state.active_cue(&cues).map(|c| c.id), Some(2));
        assert_eq!(state.phase(), SyncPhase::Running);
    }

    #[test]
    fn degenerate_ranges() {
        let cues = vec![Cue::new(0, 3.0, 1.0, "inverted"), Cue::new(1, 2.0, 2.0, "point")];
        assert!(active_cue(&cues, 1.5).is_none());
        assert_eq!(active_cue(&cues, 2.0).map(|c| c.id), Some(1));
        assert!(active_cue(&cues, 2.0001).is_none());
    }
}
