//! Step sequencer: walks a pattern on the beat grid, rolling gate and
//! probability fresh for every step occurrence.

use pb_ir::tempo::clamp_interval;
use pb_ir::{AutomationCurve, AutomationTarget, NoteEvent, ScheduledEvent, StepNote, StepPattern};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::clock::BeatClock;
use crate::event_queue::EventSink;
use crate::observer::{ObserverRegistry, Subscription};
use crate::voice::VoiceParams;

/// Tunables for the step sequencer.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencerConfig {
    /// Length of one step in beats (0.25 = sixteenth notes)
    pub step_beats: f64,
    /// How long a fired note holds before releasing, in beats
    pub sustain_beats: f32,
    /// Steps per bar, used to place automation
    pub steps_per_bar: u32,
    /// Bars before the automation position wraps
    pub cycle_bars: u32,
    /// Seed for the probability draws
    pub seed: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self { step_beats: 0.25, sustain_beats: 0.5, steps_per_bar: 16, cycle_bars: 8, seed: 0x5eed }
    }
}

struct Automation {
    curve: AutomationCurve,
    target: AutomationTarget,
}

/// Pattern-driven note trigger generator.
pub struct StepSequencer {
    config: SequencerConfig,
    pattern: Option<StepPattern>,
    params: Arc<VoiceParams>,
    automation: Option<Automation>,
    rng: SmallRng,
    /// Steps issued since start; pattern and automation positions derive from it
    step_counter: u64,
    next_step_time: Option<f64>,
    active: bool,
    warned: bool,
    listeners: ObserverRegistry<NoteEvent>,
}

impl StepSequencer {
    pub fn new(mut config: SequencerConfig, params: Arc<VoiceParams>) -> Self {
        config.step_beats = clamp_interval(config.step_beats);
        config.steps_per_bar = config.steps_per_bar.max(1);
        config.cycle_bars = config.cycle_bars.max(1);
        Self {
            rng: SmallRng::seed_from_u64(config.seed),
            config,
            pattern: None,
            params,
            automation: None,
            step_counter: 0,
            next_step_time: None,
            active: false,
            warned: false,
            listeners: ObserverRegistry::new(),
        }
    }

    /// Replace the pattern. The step counter keeps running so a live swap
    /// stays on the grid.
    pub fn set_pattern(&mut self, pattern: StepPattern) {
        log::debug!("step pattern set ({} steps)", pattern.len());
        self.pattern = Some(pattern);
        self.warned = false;
    }

    pub fn clear_pattern(&mut self) {
        self.pattern = None;
    }

    pub fn pattern(&self) -> Option<&StepPattern> {
        self.pattern.as_ref()
    }

    /// Sample `curve` every step (position in bars) into `target`.
    pub fn set_automation(&mut self, curve: AutomationCurve, target: AutomationTarget) {
        self.automation = Some(Automation { curve, target });
    }

    pub fn clear_automation(&mut self) {
        self.automation = None;
    }

    pub fn set_sustain_beats(&mut self, beats: f32) {
        self.config.sustain_beats = if beats.is_finite() { beats.max(0.0) } else { 0.0 };
    }

    /// Change the step length, realigning to the new grid.
    pub fn set_step_beats(&mut self, beats: f64, clock: &BeatClock) {
        let beats = clamp_interval(beats);
        if beats != self.config.step_beats {
            self.config.step_beats = beats;
            if self.active && clock.is_active() {
                self.next_step_time = Some(clock.align_to_grid(0.0, beats));
            }
        }
    }

    /// Receive `(note, time, step)` for every note-on issued.
    pub fn subscribe_notes<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&NoteEvent) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Start from step 0 on the next step boundary.
    pub fn start(&mut self, clock: &BeatClock) {
        self.active = true;
        self.step_counter = 0;
        self.next_step_time = None;
        self.warned = false;
        self.check_config(clock);
    }

    /// Stop: release the voice now and rewind to step 0.
    pub fn stop(&mut self, clock: &BeatClock, sink: &mut impl EventSink) {
        if self.active && !sink.submit(ScheduledEvent::note_off(clock.now())) {
            log::warn!("event queue full; stop note-off dropped");
        }
        self.active = false;
        self.step_counter = 0;
        self.next_step_time = None;
    }

    fn check_config(&mut self, clock: &BeatClock) {
        if self.warned {
            return;
        }
        if self.pattern.is_none() {
            log::warn!("step sequencer has no pattern; output stays silent");
            self.warned = true;
        } else if !clock.is_active() {
            log::warn!("step sequencer started before the beat clock; waiting");
            self.warned = true;
        }
    }

    /// Issue every step inside the lookahead window. Returns the number of
    /// events issued.
    pub fn tick(&mut self, clock: &BeatClock, sink: &mut impl EventSink) -> usize {
        if !self.active {
            return 0;
        }
        if self.pattern.is_none() || !clock.is_active() {
            self.check_config(clock);
            return 0;
        }
        let Some(pattern) = self.pattern.as_ref() else { return 0 };

        let step_beats = self.config.step_beats;
        let now = clock.now();
        let lookahead = clock.lookahead();
        let mut next = match self.next_step_time {
            Some(t) if t + lookahead >= now => t,
            Some(t) => {
                log::debug!("sequencer fell {:.3}s behind, realigning", now - t);
                clock.align_to_grid(0.0, step_beats)
            }
            None => clock.align_to_grid(0.0, step_beats),
        };

        let steps_per_bar = self.config.steps_per_bar as u64;
        let cycle_steps = steps_per_bar * self.config.cycle_bars as u64;
        let mut issued = 0;
        while next - now <= lookahead {
            let index = (self.step_counter % pattern.len() as u64) as usize;
            let step = pattern.get(index);
            let draw: f32 = self.rng.random();
            let fires = step.gate && draw < step.probability;

            if fires {
                let event = match step.note {
                    StepNote::On(note) => ScheduledEvent::note_on(next, note, self.config.sustain_beats),
                    StepNote::Rest => ScheduledEvent::note_off(next),
                };
                if !sink.submit(event) {
                    break;
                }
                issued += 1;
                if let StepNote::On(note) = step.note {
                    self.listeners.notify(&NoteEvent { note, time: next, step: index });
                }
            }

            if let Some(auto) = &self.automation {
                let bar = (self.step_counter % cycle_steps) as f32 / steps_per_bar as f32;
                self.params.store(auto.target, auto.curve.evaluate(bar));
            }

            self.step_counter += 1;
            next += step_beats * clock.sec_per_beat();
        }
        self.next_step_time = Some(next);
        issued
    }

    /// Pattern index of the next step to be issued.
    pub fn current_step(&self) -> usize {
        match &self.pattern {
            Some(p) => (self.step_counter % p.len() as u64) as usize,
            None => 0,
        }
    }

    pub fn next_step_time(&self) -> Option<f64> {
        self.next_step_time
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
