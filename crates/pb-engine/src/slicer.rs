//! Slice-grain sequencer: the scheduled counterpart of the chopper.
//!
//! Walks a slice sequence, repeating each entry a few times, and issues a
//! short region of the clip per chop through the clip voice pool.

use pb_ir::tempo::clamp_interval;
use pb_ir::{semitones_to_ratio, ClipId, Region, ScheduledEvent};

use crate::clock::BeatClock;
use crate::event_queue::EventSink;

/// Tail added to every grain so consecutive grains overlap slightly.
const GRAIN_TAIL_SECONDS: f64 = 0.0005;

#[derive(Clone, Debug, PartialEq)]
pub struct SliceSequencerConfig {
    pub clip: ClipId,
    pub slices: u32,
    /// Slice indices to walk
    pub sequence: Vec<u16>,
    /// Grains per sequence entry
    pub slice_repeat: u32,
    pub chops_per_bar: u32,
    /// Stretches every grain by this many bars' worth
    pub bars_stretch: f64,
    pub transpose: f32,
    pub gain: f32,
}

impl Default for SliceSequencerConfig {
    fn default() -> Self {
        Self {
            clip: 0,
            slices: 8,
            sequence: vec![5, 6, 5, 6],
            slice_repeat: 4,
            chops_per_bar: 32,
            bars_stretch: 2.0,
            transpose: 0.0,
            gain: 1.0,
        }
    }
}

pub struct SliceSequencer {
    config: SliceSequencerConfig,
    clip_frames: u32,
    next_time: Option<f64>,
    seq_index: usize,
    repeat_left: u32,
    active: bool,
}

impl SliceSequencer {
    /// `clip_frames` is the length of the clip the grains are cut from.
    pub fn new(mut config: SliceSequencerConfig, clip_frames: usize) -> Self {
        config.slices = config.slices.max(1);
        config.slice_repeat = config.slice_repeat.max(1);
        config.chops_per_bar = config.chops_per_bar.max(1);
        if !(config.bars_stretch.is_finite() && config.bars_stretch > 0.0) {
            config.bars_stretch = 1.0;
        }
        if clip_frames == 0 {
            log::warn!("slice sequencer clip {} is empty; grains will be silent", config.clip);
        }
        Self {
            repeat_left: config.slice_repeat,
            config,
            clip_frames: clip_frames.min(u32::MAX as usize) as u32,
            next_time: None,
            seq_index: 0,
            active: false,
        }
    }

    /// Grain length in beats.
    pub fn chop_beats(&self, clock: &BeatClock) -> f64 {
        clamp_interval(clock.beats_per_bar() as f64 / self.config.chops_per_bar as f64 * self.config.bars_stretch)
    }

    /// Start from the head of the sequence on the next grain boundary.
    pub fn start(&mut self) {
        self.active = true;
        self.seq_index = 0;
        self.repeat_left = self.config.slice_repeat;
        self.next_time = None;
        if self.config.sequence.is_empty() {
            log::warn!("slice sequence is empty; playing slice 0");
        }
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.next_time = None;
    }

    pub fn set_sequence(&mut self, sequence: &[u16]) {
        self.config.sequence = sequence.to_vec();
        self.seq_index = 0;
        self.repeat_left = self.config.slice_repeat;
    }

    pub fn set_slice_repeat(&mut self, repeat: u32) {
        self.config.slice_repeat = repeat.max(1);
        self.repeat_left = self.repeat_left.min(self.config.slice_repeat);
    }

    pub fn set_transpose(&mut self, semitones: f32) {
        self.config.transpose = if semitones.is_finite() { semitones.clamp(-24.0, 24.0) } else { 0.0 };
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.config.gain = if gain.is_finite() { gain.clamp(0.0, 2.0) } else { 0.0 };
    }

    /// Change grain density; realigns to the new grid.
    pub fn set_chops_per_bar(&mut self, chops: u32, clock: &BeatClock) {
        self.config.chops_per_bar = chops.max(1);
        self.realign(clock);
    }

    pub fn set_bars_stretch(&mut self, bars: f64, clock: &BeatClock) {
        if bars.is_finite() && bars > 0.0 {
            self.config.bars_stretch = bars;
            self.realign(clock);
        }
    }

    fn realign(&mut self, clock: &BeatClock) {
        if self.active && clock.is_active() {
            self.next_time = Some(clock.align_to_grid(0.0, self.chop_beats(clock)));
        }
    }

    /// Slice index the next grain will play.
    pub fn current_slice(&self) -> u16 {
        let seq = &self.config.sequence;
        let idx = if seq.is_empty() { 0 } else { seq[self.seq_index % seq.len()] };
        idx.min(self.config.slices.saturating_sub(1).min(u16::MAX as u32) as u16)
    }

    fn region(&self, grain_seconds: f64) -> Region {
        let slice_len = self.clip_frames / self.config.slices;
        Region {
            clip: self.config.clip,
            start_frame: slice_len * self.current_slice() as u32,
            duration: (grain_seconds + GRAIN_TAIL_SECONDS) as f32,
            rate: semitones_to_ratio(self.config.transpose),
            gain: self.config.gain,
        }
    }

    /// Issue every grain inside the lookahead window.
    pub fn tick(&mut self, clock: &BeatClock, sink: &mut impl EventSink) -> usize {
        if !self.active || !clock.is_active() {
            return 0;
        }
        let chop_beats = self.chop_beats(clock);
        let now = clock.now();
        let lookahead = clock.lookahead();
        let mut next = match self.next_time {
            Some(t) if t + lookahead >= now => t,
            _ => clock.align_to_grid(0.0, chop_beats),
        };

        let mut issued = 0;
        while next - now <= lookahead {
            let grain = chop_beats * clock.sec_per_beat();
            if !sink.submit(ScheduledEvent::play_region(next, self.region(grain))) {
                break;
            }
            issued += 1;
            self.repeat_left -= 1;
            if self.repeat_left == 0 {
                self.repeat_left = self.config.slice_repeat;
                self.seq_index = (self.seq_index + 1) % self.config.sequence.len().max(1);
            }
            next += grain;
        }
        self.next_time = Some(next);
        issued
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
