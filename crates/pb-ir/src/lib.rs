//! Core data types for the pulsebox rhythm engine.
//!
//! Everything that crosses a layer boundary lives here: scheduled events,
//! step patterns, automation curves, sample buffers and the tempo/pitch
//! math shared by the control side and the render side.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod automation;
mod event;
mod note;
mod pattern;
mod sample;
pub mod tempo;

pub use automation::{AutomationCurve, AutomationTarget, CurveShape};
pub use event::{
    BeatEvent, ClipId, EventPayload, EventTarget, ListenerKey, NoteEvent, Region, ScheduledEvent,
};
pub use note::{midi_to_hz, note_name, parse_note, semitones_to_ratio};
pub use pattern::{PatternError, Step, StepNote, StepPattern, MAX_STEPS};
pub use sample::{SampleBuffer, SampleError, MAX_CHANNELS};
pub use tempo::{clamp_bpm, clamp_interval, glide_coefficient, seconds_per_beat};
