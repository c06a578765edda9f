//! Scheduled events and the notifications the control side emits.

/// Index into the render-side clip bank.
pub type ClipId = u16;

slotmap::new_key_type! {
    /// Key for a listener registered with an observer registry.
    pub struct ListenerKey;
}

/// A playback or note request, consumed exactly once when the audio clock
/// reaches `time`. Never mutated after creation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    /// Audio clock timestamp in seconds
    pub time: f64,
    /// Which render-side component receives it
    pub target: EventTarget,
    /// What the event does
    pub payload: EventPayload,
}

impl ScheduledEvent {
    pub fn new(time: f64, target: EventTarget, payload: EventPayload) -> Self {
        Self { time, target, payload }
    }

    pub fn note_on(time: f64, note: u8, sustain_beats: f32) -> Self {
        Self::new(time, EventTarget::Voice, EventPayload::NoteOn { note, sustain_beats })
    }

    pub fn note_off(time: f64) -> Self {
        Self::new(time, EventTarget::Voice, EventPayload::NoteOff)
    }

    pub fn play_region(time: f64, region: Region) -> Self {
        Self::new(time, EventTarget::Clips, EventPayload::PlayRegion(region))
    }
}

/// Where an event is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// The monophonic synthesizer voice
    Voice,
    /// The sample chopper
    Chopper,
    /// The clip voice pool
    Clips,
}

impl EventTarget {
    /// Whether the component behind this target acts on `payload`.
    pub fn accepts(self, payload: &EventPayload) -> bool {
        matches!(
            (self, payload),
            (EventTarget::Voice, EventPayload::NoteOn { .. } | EventPayload::NoteOff)
                | (EventTarget::Chopper, EventPayload::Retrigger)
                | (EventTarget::Clips, EventPayload::PlayRegion(_) | EventPayload::NoteOff)
        )
    }
}

/// What an event does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventPayload {
    /// Start a note; the voice releases it `sustain_beats` later
    NoteOn { note: u8, sustain_beats: f32 },
    /// Force the voice into release
    NoteOff,
    /// Play a region of a clip
    PlayRegion(Region),
    /// Reset the chopper to step 0
    Retrigger,
}

/// A region of a clip to play back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub clip: ClipId,
    /// First frame of the region
    pub start_frame: u32,
    /// Length in seconds; 0 plays to the end of the clip
    pub duration: f32,
    /// Playback rate (1.0 = original pitch)
    pub rate: f32,
    pub gain: f32,
}

impl Region {
    /// The whole clip at original pitch and unity gain.
    pub fn whole(clip: ClipId) -> Self {
        Self { clip, start_frame: 0, duration: 0.0, rate: 1.0, gain: 1.0 }
    }
}

/// A beat boundary crossed by the beat clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatEvent {
    pub bar: u64,
    pub beat_in_bar: u32,
    /// Beats since activation
    pub beat_index: u64,
    /// Audio clock timestamp of the boundary
    pub time: f64,
}

/// A note fired by the step sequencer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub note: u8,
    pub time: f64,
    /// Step index within the pattern
    pub step: usize,
}
