//! Beat clock: the tempo authority every scheduler reads.
//!
//! The clock never keeps its own notion of "now"; it always asks the
//! [`AudioClock`] the render task advances, so control-side timestamps and
//! render-side frame times agree exactly.

use pb_ir::tempo::{clamp_bpm, clamp_interval, glide_coefficient, sanitize_offset, seconds_per_beat};
use pb_ir::BeatEvent;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::atomic::AtomicF64;
use crate::audio_clock::AudioClock;
use crate::observer::{ObserverRegistry, Subscription};

/// Tunables for the beat clock.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockConfig {
    pub bpm: f64,
    pub beats_per_bar: u32,
    /// Time constant of the one-pole tempo glide, in seconds
    pub glide_seconds: f64,
    /// How far ahead schedulers commit events, in seconds
    pub lookahead_seconds: f64,
    /// Gap between activation and the first beat
    pub start_delay_seconds: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            bpm: 128.0,
            beats_per_bar: 4,
            glide_seconds: 0.15,
            lookahead_seconds: 0.08,
            start_delay_seconds: 0.1,
        }
    }
}

/// Tempo and position published for the render side and for pollers.
#[derive(Debug, Default)]
pub struct TempoShared {
    sec_per_beat: AtomicF64,
    target_bpm: AtomicF64,
    beat_index: AtomicU64,
    bar: AtomicU64,
    beat_in_bar: AtomicU32,
    active: AtomicBool,
}

impl TempoShared {
    fn new(sec_per_beat: f64) -> Self {
        let shared = Self::default();
        shared.sec_per_beat.store(sec_per_beat);
        shared.target_bpm.store(60.0 / sec_per_beat);
        shared
    }

    /// Smoothed seconds per beat.
    #[inline]
    pub fn sec_per_beat(&self) -> f64 {
        self.sec_per_beat.load()
    }

    /// Smoothed tempo.
    pub fn bpm(&self) -> f64 {
        60.0 / self.sec_per_beat()
    }

    pub fn target_bpm(&self) -> f64 {
        self.target_bpm.load()
    }

    /// `(bar, beat_in_bar)` of the most recent beat.
    pub fn position(&self) -> (u64, u32) {
        (self.bar.load(Ordering::Relaxed), self.beat_in_bar.load(Ordering::Relaxed))
    }

    /// Beats emitted since activation.
    pub fn beats_elapsed(&self) -> u64 {
        self.beat_index.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// Converts beats to seconds, glides tempo changes, emits beat events and
/// answers grid-alignment queries.
pub struct BeatClock {
    source: Arc<dyn AudioClock>,
    config: ClockConfig,
    target_sec_per_beat: f64,
    sec_per_beat: f64,
    origin: Option<f64>,
    next_beat: f64,
    beat_index: u64,
    bar: u64,
    beat_in_bar: u32,
    listeners: ObserverRegistry<BeatEvent>,
    shared: Arc<TempoShared>,
}

impl BeatClock {
    pub fn new(source: Arc<dyn AudioClock>, mut config: ClockConfig) -> Self {
        config.bpm = clamp_bpm(config.bpm);
        config.beats_per_bar = config.beats_per_bar.max(1);
        config.lookahead_seconds = config.lookahead_seconds.max(0.0);
        let spb = seconds_per_beat(config.bpm);
        Self {
            source,
            config,
            target_sec_per_beat: spb,
            sec_per_beat: spb,
            origin: None,
            next_beat: 0.0,
            beat_index: 0,
            bar: 0,
            beat_in_bar: 0,
            listeners: ObserverRegistry::new(),
            shared: Arc::new(TempoShared::new(spb)),
        }
    }

    /// Start the beat grid `start_delay_seconds` from now.
    pub fn activate(&mut self) {
        let origin = self.now() + self.config.start_delay_seconds.max(0.0);
        self.origin = Some(origin);
        self.next_beat = origin;
        self.beat_index = 0;
        self.bar = 0;
        self.beat_in_bar = 0;
        self.shared.active.store(true, Ordering::Relaxed);
        log::info!("beat clock active at {:.1} BPM, origin {:.3}s", self.bpm(), origin);
    }

    pub fn deactivate(&mut self) {
        self.origin = None;
        self.shared.active.store(false, Ordering::Relaxed);
        log::info!("beat clock stopped");
    }

    pub fn is_active(&self) -> bool {
        self.origin.is_some()
    }

    /// Clock time the beat grid is anchored to.
    pub fn origin(&self) -> Option<f64> {
        self.origin
    }

    /// Set the tempo the clock glides toward.
    pub fn set_tempo(&mut self, bpm: f64) {
        let bpm = clamp_bpm(bpm);
        self.target_sec_per_beat = seconds_per_beat(bpm);
        self.shared.target_bpm.store(bpm);
        log::debug!("tempo target {:.2} BPM", bpm);
    }

    pub fn set_glide(&mut self, seconds: f64) {
        self.config.glide_seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    }

    pub fn set_lookahead(&mut self, seconds: f64) {
        self.config.lookahead_seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    }

    /// Advance the control side by `dt` seconds: glide the tempo, then emit
    /// every beat boundary the audio clock has crossed, in order.
    pub fn tick(&mut self, dt: f64) {
        let coeff = glide_coefficient(dt, self.config.glide_seconds);
        self.sec_per_beat += (self.target_sec_per_beat - self.sec_per_beat) * coeff;
        self.shared.sec_per_beat.store(self.sec_per_beat);

        if self.origin.is_none() {
            return;
        }
        let now = self.now();
        while now >= self.next_beat {
            let event = BeatEvent {
                bar: self.bar,
                beat_in_bar: self.beat_in_bar,
                beat_index: self.beat_index,
                time: self.next_beat,
            };
            self.shared.bar.store(self.bar, Ordering::Relaxed);
            self.shared.beat_in_bar.store(self.beat_in_bar, Ordering::Relaxed);
            self.shared.beat_index.store(self.beat_index + 1, Ordering::Relaxed);
            self.listeners.notify(&event);

            self.beat_index += 1;
            self.beat_in_bar += 1;
            if self.beat_in_bar >= self.config.beats_per_bar {
                self.beat_in_bar = 0;
                self.bar += 1;
            }
            self.next_beat += self.sec_per_beat;
        }
    }

    /// Current audio clock time.
    #[inline]
    pub fn now(&self) -> f64 {
        self.source.now()
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.sec_per_beat
    }

    /// Smallest `origin + (offset + k * interval) * sec_per_beat`, `k >= 0`,
    /// that is not earlier than `now()`. Before activation the grid is
    /// anchored at `now()`.
    pub fn align_to_grid(&self, offset_beats: f64, interval_beats: f64) -> f64 {
        let now = self.now();
        let origin = self.origin.unwrap_or(now);
        let interval = clamp_interval(interval_beats);
        let offset = sanitize_offset(offset_beats);
        let spb = self.sec_per_beat;

        let beats_elapsed = (now - origin) / spb;
        let k = libm::ceil((beats_elapsed - offset) / interval).max(0.0);
        let t = origin + (offset + k * interval) * spb;
        if t < now {
            // rounding put us a hair behind
            t + interval * spb
        } else {
            t
        }
    }

    /// Receive `(bar, beat_in_bar, time)` for every beat boundary.
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&BeatEvent) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, key: pb_ir::ListenerKey) -> bool {
        self.listeners.unsubscribe(key)
    }

    pub fn lookahead(&self) -> f64 {
        self.config.lookahead_seconds
    }

    #[inline]
    pub fn sec_per_beat(&self) -> f64 {
        self.sec_per_beat
    }

    pub fn bpm(&self) -> f64 {
        60.0 / self.sec_per_beat
    }

    pub fn target_bpm(&self) -> f64 {
        60.0 / self.target_sec_per_beat
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.config.beats_per_bar
    }

    /// Timestamp of the next beat boundary (meaningful once active).
    pub fn next_beat_time(&self) -> f64 {
        self.next_beat
    }

    pub fn shared(&self) -> Arc<TempoShared> {
        self.shared.clone()
    }

    pub fn source(&self) -> Arc<dyn AudioClock> {
        self.source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_clock::ManualClock;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    fn clock_at(bpm: f64) -> (Arc<ManualClock>, BeatClock) {
        let source = Arc::new(ManualClock::new(0.0));
        let config = ClockConfig { bpm, start_delay_seconds: 0.0, ..ClockConfig::default() };
        let clock = BeatClock::new(source.clone(), config);
        (source, clock)
    }

    fn collect_beats(clock: &mut BeatClock) -> (Arc<Mutex<Vec<BeatEvent>>>, Subscription) {
        let beats = Arc::new(Mutex::new(Vec::new()));
        let sink = beats.clone();
        let sub = clock.subscribe(move |b| sink.lock().unwrap().push(*b));
        (beats, sub)
    }

    #[test]
    fn glide_converges_without_overshoot() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let (_src, mut clock) = clock_at(rng.random_range(40.0..200.0));
            let target_bpm = rng.random_range(40.0..200.0);
            clock.set_tempo(target_bpm);
            let target = 60.0 / target_bpm;
            let mut prev_gap = (clock.sec_per_beat() - target).abs();
            for _ in 0..2000 {
                let dt = if rng.random_bool(0.1) { 0.0 } else { rng.random_range(0.0..0.05) };
                let before = clock.sec_per_beat();
                clock.tick(dt);
                let after = clock.sec_per_beat();
                let gap = (after - target).abs();
                assert!(gap <= prev_gap + 1e-15, "moved away from target");
                // never crosses the target
                assert!((before - target) * (after - target) >= -1e-18);
                prev_gap = gap;
            }
            assert!(prev_gap < 1e-6);
        }
    }

    #[test]
    fn zero_glide_is_instant() {
        let (_src, mut clock) = clock_at(120.0);
        clock.set_glide(0.0);
        clock.set_tempo(60.0);
        clock.tick(0.016);
        assert!((clock.sec_per_beat() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tempo_is_clamped() {
        let (_src, mut clock) = clock_at(120.0);
        clock.set_tempo(0.0);
        assert!(clock.target_bpm() >= pb_ir::tempo::MIN_BPM - 1e-9);
        clock.set_tempo(f64::NAN);
        assert!(clock.target_bpm().is_finite());
    }

    #[test]
    fn emits_every_beat_after_stall() {
        let (src, mut clock) = clock_at(120.0);
        let (beats, _sub) = collect_beats(&mut clock);
        clock.activate();
        src.set(3.6); // one long stall covering beats at 0.0 .. 3.5
        clock.tick(0.0);
        let beats = beats.lock().unwrap();
        assert_eq!(beats.len(), 8);
        for (i, b) in beats.iter().enumerate() {
            assert_eq!(b.beat_index, i as u64);
            assert_eq!(b.bar, i as u64 / 4);
            assert_eq!(b.beat_in_bar, i as u32 % 4);
            assert!((b.time - i as f64 * 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn beats_are_gapless_under_glide() {
        let mut rng = SmallRng::seed_from_u64(42);
        let (src, mut clock) = clock_at(90.0);
        let (beats, _sub) = collect_beats(&mut clock);
        clock.activate();
        let mut t = 0.0;
        for i in 0..3000 {
            if i % 200 == 0 {
                clock.set_tempo(rng.random_range(60.0..180.0));
            }
            t += rng.random_range(0.001..0.04);
            src.set(t);
            clock.tick(0.02);
        }
        let beats = beats.lock().unwrap();
        assert!(beats.len() > 50);
        for pair in beats.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert_eq!(b.beat_index, a.beat_index + 1);
            assert!((b.bar, b.beat_in_bar) > (a.bar, a.beat_in_bar));
            assert!(b.time > a.time);
        }
    }

    #[test]
    fn no_beats_before_activation() {
        let (src, mut clock) = clock_at(120.0);
        let (beats, _sub) = collect_beats(&mut clock);
        src.set(10.0);
        clock.tick(0.016);
        assert!(beats.lock().unwrap().is_empty());
    }

    #[test]
    fn align_to_grid_is_future_and_idempotent() {
        let mut rng = SmallRng::seed_from_u64(3);
        let (src, mut clock) = clock_at(128.0);
        clock.activate();
        for _ in 0..500 {
            src.set(rng.random_range(0.0..100.0));
            let offset = rng.random_range(-2.0..4.0);
            let interval = rng.random_range(0.0..8.0);
            let a = clock.align_to_grid(offset, interval);
            let b = clock.align_to_grid(offset, interval);
            assert!(a >= clock.now());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn align_to_grid_lands_on_grid() {
        let (src, mut clock) = clock_at(120.0);
        clock.activate();
        src.set(1.1);
        // grid of whole beats offset by half a beat: 0.25, 0.75, 1.25 ...
        let t = clock.align_to_grid(0.5, 1.0);
        assert!((t - 1.25).abs() < 1e-9);
        // exactly on a boundary returns that boundary
        src.set(2.0);
        assert!((clock.align_to_grid(0.0, 1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn shared_state_tracks_clock() {
        let (src, mut clock) = clock_at(120.0);
        let shared = clock.shared();
        clock.activate();
        assert!(shared.is_active());
        src.set(2.1);
        clock.tick(0.0);
        assert_eq!(shared.position(), (1, 0));
        assert_eq!(shared.beats_elapsed(), 5);
        assert!((shared.bpm() - 120.0).abs() < 1e-9);
    }
}
