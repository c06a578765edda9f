//! Headless session and playback controller for pulsebox.
//!
//! Wires the beat clock, the schedulers and the render engine together so
//! the CLI (or any other front end) only deals with one [`Session`].

mod controller;
mod session;

pub use controller::{Controller, CONTROL_RATE_HZ};
pub use session::{Session, SessionConfig, SessionError};

// Re-export common types so callers don't need the lower crates directly.
pub use pb_audio::AudioError;
pub use pb_engine::{
    ChopParams, ClockConfig, LoopMode, LoopScheduler, MixParams, SequencerConfig, SliceSequencer,
    SliceSequencerConfig, VoiceParams,
};
pub use pb_formats::{load_wav, samples_to_wav, write_wav, FormatError};

#[cfg(feature = "alloc_check")]
#[global_allocator]
static ALLOC: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;
