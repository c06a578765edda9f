//! Loop and one-shot lookahead schedulers.
//!
//! Each control tick a scheduler commits every trigger that falls within
//! the clock's lookahead window, stepping its cursor by the *current*
//! smoothed beat length so tempo glides carry through without resync.

use pb_ir::tempo::{clamp_interval, sanitize_offset};
use pb_ir::{EventPayload, EventTarget, ScheduledEvent};

use crate::clock::BeatClock;
use crate::event_queue::EventSink;

/// Whether a scheduler keeps triggering after the first hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    Loop,
    OneShot,
}

/// Schedules one payload on a beat grid.
#[derive(Clone, Debug)]
pub struct LoopScheduler {
    target: EventTarget,
    payload: EventPayload,
    interval_beats: f64,
    offset_beats: f64,
    mode: LoopMode,
    active: bool,
    next_trigger: Option<f64>,
}

impl LoopScheduler {
    pub fn new(
        target: EventTarget,
        payload: EventPayload,
        interval_beats: f64,
        offset_beats: f64,
        mode: LoopMode,
    ) -> Self {
        Self {
            target,
            payload,
            interval_beats: clamp_interval(interval_beats),
            offset_beats: sanitize_offset(offset_beats),
            mode,
            active: false,
            next_trigger: None,
        }
    }

    /// Begin scheduling on the next grid point. A payload the target cannot
    /// act on leaves the scheduler stopped.
    pub fn start(&mut self, clock: &BeatClock) {
        if !self.target.accepts(&self.payload) {
            log::warn!("{:?} does not accept {:?}; scheduler not started", self.target, self.payload);
            return;
        }
        self.active = true;
        self.resync(clock);
    }

    /// Stop issuing triggers. Already queued events still play.
    pub fn stop(&mut self) {
        self.active = false;
        self.next_trigger = None;
    }

    /// Realign the cursor to the grid instead of stepping a stale one.
    pub fn resync(&mut self, clock: &BeatClock) {
        self.next_trigger = if clock.is_active() {
            Some(clock.align_to_grid(self.offset_beats, self.interval_beats))
        } else {
            None
        };
    }

    pub fn set_interval(&mut self, beats: f64, clock: &BeatClock) {
        let beats = clamp_interval(beats);
        if beats != self.interval_beats {
            self.interval_beats = beats;
            if self.active {
                self.resync(clock);
            }
        }
    }

    pub fn set_offset(&mut self, beats: f64, clock: &BeatClock) {
        let beats = sanitize_offset(beats);
        if beats != self.offset_beats {
            self.offset_beats = beats;
            if self.active {
                self.resync(clock);
            }
        }
    }

    /// Payload for triggers issued from now on. Ignored if the target cannot
    /// act on it.
    pub fn set_payload(&mut self, payload: EventPayload) {
        if !self.target.accepts(&payload) {
            log::warn!("{:?} does not accept {:?}; payload unchanged", self.target, payload);
            return;
        }
        self.payload = payload;
    }

    /// Commit every trigger inside the lookahead window. Returns how many
    /// events were issued.
    pub fn tick(&mut self, clock: &BeatClock, sink: &mut impl EventSink) -> usize {
        if !self.active || !clock.is_active() {
            return 0;
        }
        let now = clock.now();
        let lookahead = clock.lookahead();
        let mut next = match self.next_trigger {
            Some(t) if t + lookahead >= now => t,
            Some(t) => {
                log::debug!("scheduler fell {:.3}s behind, realigning", now - t);
                clock.align_to_grid(self.offset_beats, self.interval_beats)
            }
            None => clock.align_to_grid(self.offset_beats, self.interval_beats),
        };

        let mut issued = 0;
        while next - now <= lookahead {
            if !sink.submit(ScheduledEvent::new(next, self.target, self.payload)) {
                break;
            }
            issued += 1;
            if self.mode == LoopMode::OneShot {
                self.stop();
                return issued;
            }
            next += clock.sec_per_beat() * self.interval_beats;
        }
        self.next_trigger = Some(next);
        issued
    }

    pub fn next_trigger(&self) -> Option<f64> {
        self.next_trigger
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn interval_beats(&self) -> f64 {
        self.interval_beats
    }

    pub fn offset_beats(&self) -> f64 {
        self.offset_beats
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_clock::{AudioClock, ManualClock};
    use crate::clock::ClockConfig;
    use pb_ir::Region;
    use std::sync::Arc;

    fn setup(bpm: f64) -> (Arc<ManualClock>, BeatClock) {
        let src = Arc::new(ManualClock::new(0.0));
        let config = ClockConfig {
            bpm,
            start_delay_seconds: 0.0,
            lookahead_seconds: 0.1,
            ..ClockConfig::default()
        };
        let mut clock = BeatClock::new(src.clone(), config);
        clock.activate();
        (src, clock)
    }

    fn region_loop(interval: f64, offset: f64, mode: LoopMode) -> LoopScheduler {
        LoopScheduler::new(
            EventTarget::Clips,
            EventPayload::PlayRegion(Region::whole(0)),
            interval,
            offset,
            mode,
        )
    }

    fn times(events: &[ScheduledEvent]) -> Vec<f64> {
        events.iter().map(|e| e.time).collect()
    }

    /// Step the manual clock in control-frame increments.
    fn run(src: &ManualClock, clock: &mut BeatClock, sched: &mut LoopScheduler, until: f64) -> Vec<ScheduledEvent> {
        let mut out = Vec::new();
        let dt = 1.0 / 60.0;
        while src.now() < until {
            clock.tick(dt);
            sched.tick(clock, &mut out);
            src.advance(dt);
        }
        out
    }

    #[test]
    fn loop_triggers_on_grid() {
        let (src, mut clock) = setup(120.0);
        let mut sched = region_loop(1.0, 0.0, LoopMode::Loop);
        sched.start(&clock);
        let events = run(&src, &mut clock, &mut sched, 2.0);
        let t = times(&events);
        // beats every 0.5 s; committed up to lookahead past 2.0
        assert_eq!(t.len(), 5);
        for (i, time) in t.iter().enumerate() {
            assert!((time - i as f64 * 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn stale_cursor_realigns_instead_of_flushing() {
        let (src, clock) = setup(120.0);
        let mut sched = region_loop(1.0, 0.0, LoopMode::Loop);
        sched.start(&clock);
        assert_eq!(sched.next_trigger(), Some(0.0));
        // control loop stalled past the first trigger and its lookahead
        src.set(0.45);
        let mut out = Vec::new();
        sched.tick(&clock, &mut out);
        assert_eq!(times(&out), vec![0.5]);
        for e in &out {
            assert!(e.time - src.now() <= clock.lookahead() + 1e-12);
        }
    }

    #[test]
    fn mismatched_payload_never_schedules() {
        let (src, mut clock) = setup(120.0);
        let mut sched = LoopScheduler::new(
            EventTarget::Chopper,
            EventPayload::NoteOn { note: 60, sustain_beats: 0.5 },
            1.0,
            0.0,
            LoopMode::Loop,
        );
        sched.start(&clock);
        assert!(!sched.is_active());
        assert!(run(&src, &mut clock, &mut sched, 1.0).is_empty());

        let (_src, clock) = setup(120.0);
        let mut sched = region_loop(1.0, 0.0, LoopMode::Loop);
        sched.set_payload(EventPayload::Retrigger);
        sched.start(&clock);
        let mut out = Vec::new();
        sched.tick(&clock, &mut out);
        assert!(out.iter().all(|e| matches!(e.payload, EventPayload::PlayRegion(_))));
        assert!(!out.is_empty());
    }

    #[test]
    fn one_shot_fires_once() {
        let (src, mut clock) = setup(120.0);
        let mut sched = region_loop(1.0, 0.0, LoopMode::OneShot);
        sched.start(&clock);
        let events = run(&src, &mut clock, &mut sched, 3.0);
        assert_eq!(events.len(), 1);
        assert!(!sched.is_active());
    }

    #[test]
    fn interval_change_realigns() {
        let (src, mut clock) = setup(120.0);
        let mut sched = region_loop(4.0, 0.0, LoopMode::Loop);
        sched.start(&clock);
        let _ = run(&src, &mut clock, &mut sched, 0.6);
        // stale cursor would sit at 2.0; new grid of half-beats gives 0.75
        sched.set_interval(0.5, &clock);
        let next = sched.next_trigger().unwrap();
        assert!(next >= src.now());
        assert!((next - 0.75).abs() < 1e-9, "got {}", next);
    }

    #[test]
    fn offset_shifts_grid() {
        let (src, mut clock) = setup(120.0);
        let mut sched = region_loop(1.0, 0.5, LoopMode::Loop);
        sched.start(&clock);
        let events = run(&src, &mut clock, &mut sched, 1.0);
        let t = times(&events);
        assert!((t[0] - 0.25).abs() < 1e-9);
        assert!((t[1] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn full_sink_retries_without_skipping() {
        struct Stingy(Vec<ScheduledEvent>, usize);
        impl EventSink for Stingy {
            fn submit(&mut self, event: ScheduledEvent) -> bool {
                if self.1 == 0 {
                    return false;
                }
                self.1 -= 1;
                self.0.push(event);
                true
            }
        }
        let (src, clock) = setup(120.0);
        let mut sched = region_loop(0.125, 0.0, LoopMode::Loop);
        sched.start(&clock);
        let mut sink = Stingy(Vec::new(), 1);
        src.set(0.05);
        sched.tick(&clock, &mut sink);
        assert_eq!(sink.0.len(), 1);
        sink.1 = 10;
        sched.tick(&clock, &mut sink);
        let t = times(&sink.0);
        assert_eq!(t.len(), 3);
        assert_eq!(t[0], 0.0);
        assert!((t[1] - 0.0625).abs() < 1e-9);
        assert!((t[2] - 0.125).abs() < 1e-9);
    }

    #[test]
    fn tempo_glide_stretches_intervals() {
        let (src, mut clock) = setup(120.0);
        let mut sched = region_loop(1.0, 0.0, LoopMode::Loop);
        sched.start(&clock);
        clock.set_tempo(60.0);
        let events = run(&src, &mut clock, &mut sched, 4.0);
        let t = times(&events);
        let gaps: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();
        for g in gaps.windows(2) {
            assert!(g[1] >= g[0] - 1e-9);
        }
        assert!(*gaps.last().unwrap() > 0.5);
    }

    #[test]
    fn inactive_clock_schedules_nothing() {
        let src = Arc::new(ManualClock::new(0.0));
        let clock = BeatClock::new(src, ClockConfig::default());
        let mut sched = region_loop(1.0, 0.0, LoopMode::Loop);
        sched.start(&clock);
        let mut out = Vec::new();
        assert_eq!(sched.tick(&clock, &mut out), 0);
        assert!(out.is_empty());
    }
}
