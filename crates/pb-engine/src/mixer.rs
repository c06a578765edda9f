//! Render task: drains the event queue at frame accuracy and mixes the synth
//! voice, the chopper and the clip pool into the output buffer.

use pb_ir::{EventPayload, EventTarget, ScheduledEvent, MAX_CHANNELS};
use std::sync::Arc;

use crate::atomic::AtomicF32;
use crate::audio_clock::FrameClock;
use crate::chopper::Chopper;
use crate::clip_pool::ClipPool;
use crate::clock::TempoShared;
use crate::event_queue::EventConsumer;
use crate::voice::SynthVoice;

/// Per-source and master output levels.
#[derive(Debug)]
pub struct MixParams {
    voice: AtomicF32,
    chopper: AtomicF32,
    clips: AtomicF32,
    master: AtomicF32,
}

impl Default for MixParams {
    fn default() -> Self {
        Self {
            voice: AtomicF32::new(1.0),
            chopper: AtomicF32::new(1.0),
            clips: AtomicF32::new(1.0),
            master: AtomicF32::new(0.8),
        }
    }
}

fn level(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 4.0)
    } else {
        0.0
    }
}

impl MixParams {
    pub fn set_voice(&self, v: f32) {
        self.voice.store(level(v));
    }

    pub fn set_chopper(&self, v: f32) {
        self.chopper.store(level(v));
    }

    pub fn set_clips(&self, v: f32) {
        self.clips.store(level(v));
    }

    pub fn set_master(&self, v: f32) {
        self.master.store(level(v));
    }

    fn snapshot(&self) -> Levels {
        Levels {
            voice: self.voice.load(),
            chopper: self.chopper.load(),
            clips: self.clips.load(),
            master: self.master.load(),
        }
    }
}

#[derive(Clone, Copy)]
struct Levels {
    voice: f32,
    chopper: f32,
    clips: f32,
    master: f32,
}

/// Everything the render task owns.
pub struct EngineParts {
    pub clock: FrameClock,
    pub events: EventConsumer,
    pub tempo: Arc<TempoShared>,
    pub voice: SynthVoice,
    pub chopper: Chopper,
    pub clips: ClipPool,
    pub mix: Arc<MixParams>,
    pub channels: usize,
}

/// The real-time render engine. Everything it needs is allocated up front;
/// [`render`](Engine::render) never allocates, locks or blocks.
pub struct Engine {
    clock: FrameClock,
    events: EventConsumer,
    tempo: Arc<TempoShared>,
    voice: SynthVoice,
    chopper: Chopper,
    clips: ClipPool,
    mix: Arc<MixParams>,
    channels: usize,
    chop_frame: [f32; MAX_CHANNELS],
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        let channels = parts.channels.max(1);
        log::debug!(
            "engine: {} Hz, {} channel(s), {} clip(s)",
            parts.clock.sample_rate(),
            channels,
            parts.clips.bank().len()
        );
        Self {
            clock: parts.clock,
            events: parts.events,
            tempo: parts.tempo,
            voice: parts.voice,
            chopper: parts.chopper,
            clips: parts.clips,
            mix: parts.mix,
            channels,
            chop_frame: [0.0; MAX_CHANNELS],
        }
    }

    /// Fill an interleaved buffer and advance the frame clock by the number
    /// of whole frames written. A trailing partial frame is zeroed.
    pub fn render(&mut self, out: &mut [f32]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_block(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_block(out);
    }

    fn render_block(&mut self, out: &mut [f32]) {
        let channels = self.channels;
        let frames = out.len() / channels;

        self.events.poll();
        let sec_per_beat = self.tempo.sec_per_beat();
        self.voice.begin_block();
        self.chopper.begin_block(sec_per_beat);
        // the chopper runs on the transport; stopped means parked at step 0
        let transport = self.tempo.is_active();
        if !transport {
            self.chopper.park();
        }
        let levels = self.mix.snapshot();
        let chop_channels = channels.min(MAX_CHANNELS);
        let start = self.clock.frames();

        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let now = self.clock.frame_time(start + i as u64);
            while let Some(event) = self.events.pop_due(now) {
                self.dispatch(event, sec_per_beat, now);
            }

            let voice = self.voice.next_sample(now) * levels.voice;
            if transport {
                self.chopper.next_frame(&mut self.chop_frame[..chop_channels]);
            } else {
                self.chop_frame.fill(0.0);
            }
            frame.fill(0.0);
            self.clips.mix_frame(frame);

            for (ch, sample) in frame.iter_mut().enumerate() {
                let chop = self.chop_frame.get(ch).copied().unwrap_or(0.0);
                *sample = (voice + chop * levels.chopper + *sample * levels.clips) * levels.master;
            }
        }

        out[frames * channels..].fill(0.0);
        self.clock.advance(frames as u64);
    }

    fn dispatch(&mut self, event: ScheduledEvent, sec_per_beat: f64, now: f64) {
        match (event.target, event.payload) {
            (EventTarget::Voice, EventPayload::NoteOn { note, sustain_beats }) => {
                self.voice.note_on(note, sustain_beats, sec_per_beat, now);
            }
            (EventTarget::Voice, EventPayload::NoteOff) => self.voice.note_off(),
            (EventTarget::Chopper, EventPayload::Retrigger) => self.chopper.retrigger(),
            (EventTarget::Clips, EventPayload::PlayRegion(region)) => self.clips.play(region),
            (EventTarget::Clips, EventPayload::NoteOff) => self.clips.stop_all(),
            // LoopScheduler refuses mismatched pairs before they are queued
            _ => {}
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    /// The frame clock this engine advances.
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn voice(&self) -> &SynthVoice {
        &self.voice
    }

    pub fn chopper(&self) -> &Chopper {
        &self.chopper
    }

    pub fn clips(&self) -> &ClipPool {
        &self.clips
    }

    /// Events still waiting to be dispatched.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}
