//! Time sources. Every timestamp in the engine is seconds on one of these.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::atomic::AtomicF64;

/// A monotonically increasing time source, read-only to consumers.
pub trait AudioClock: Send + Sync {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Clock driven by the render task: counts frames written to the device.
///
/// Cloning shares the counter, so the control side reads exactly the time
/// the render side last published.
#[derive(Clone, Debug)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self { frames: Arc::new(AtomicU64::new(0)), sample_rate: sample_rate.max(1) }
    }

    /// Frames rendered so far.
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Called by the render task after a block has been written.
    #[inline]
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Timestamp of a frame index.
    #[inline]
    pub fn frame_time(&self, frame: u64) -> f64 {
        frame as f64 / self.sample_rate as f64
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frame_time(self.frames())
    }
}

/// Externally driven clock for tests and offline tools.
#[derive(Debug, Default)]
pub struct ManualClock {
    time: AtomicF64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { time: AtomicF64::new(start) }
    }

    pub fn set(&self, seconds: f64) {
        self.time.store(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.time.store(self.time.load() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.time.load()
    }
}
