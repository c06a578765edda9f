//! Real-time engine for pulsebox.
//!
//! Control side: the [`BeatClock`], the lookahead schedulers and sequencers,
//! all of which push timestamped events through an [`EventProducer`].
//! Render side: the [`Engine`], which drains those events at frame accuracy
//! and renders the synth voice, the chopper and the clip pool.

mod atomic;
pub mod audio_clock;
pub mod chopper;
mod clip_pool;
pub mod clock;
mod envelope;
pub mod event_queue;
pub mod filter;
mod mixer;
mod observer;
pub mod scheduler;
pub mod sequencer;
pub mod slicer;
pub mod voice;

pub use atomic::{AtomicF32, AtomicF64};
pub use audio_clock::{AudioClock, FrameClock, ManualClock};
pub use chopper::{ChopControl, ChopParams, Chopper};
pub use clip_pool::{ClipBank, ClipPool, MAX_CLIP_VOICES};
pub use clock::{BeatClock, ClockConfig, TempoShared};
pub use envelope::{AdsrCoefficients, Envelope, EnvelopeStage};
pub use event_queue::{event_channel, EventConsumer, EventProducer, EventSink};
pub use mixer::{Engine, EngineParts, MixParams};
pub use observer::{Canceller, ObserverRegistry, Subscription};
pub use scheduler::{LoopMode, LoopScheduler};
pub use sequencer::{SequencerConfig, StepSequencer};
pub use slicer::{SliceSequencer, SliceSequencerConfig};
pub use voice::{SynthVoice, VoiceParams};
