//! ClipPool: fixed set of region voices playing scheduled clip regions.

use pb_ir::{ClipId, Region, SampleBuffer, MAX_CHANNELS};
use std::sync::Arc;

/// Maximum number of simultaneous region voices.
pub const MAX_CLIP_VOICES: usize = 16;

const MIN_RATE: f32 = 1.0 / 16.0;
const MAX_RATE: f32 = 16.0;

/// Immutable clips registered before playback starts.
#[derive(Clone, Debug, Default)]
pub struct ClipBank {
    clips: Vec<Arc<SampleBuffer>>,
}

impl ClipBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip, returning its id.
    pub fn add(&mut self, clip: Arc<SampleBuffer>) -> ClipId {
        if clip.is_empty() {
            log::warn!("clip {} is empty; regions from it are silent", self.clips.len());
        }
        self.clips.push(clip);
        (self.clips.len() - 1) as ClipId
    }

    pub fn get(&self, id: ClipId) -> Option<&Arc<SampleBuffer>> {
        self.clips.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct ClipVoice {
    clip: ClipId,
    /// Read position in source frames
    position: f64,
    /// Source frame at which the voice stops
    end: f64,
    /// Source frames advanced per output frame
    increment: f64,
    gain: f32,
    /// Allocation order, for stealing the oldest voice
    serial: u64,
}

/// Region voices plus the bank they read from.
pub struct ClipPool {
    bank: ClipBank,
    voices: [Option<ClipVoice>; MAX_CLIP_VOICES],
    output_rate: f64,
    serial: u64,
}

impl ClipPool {
    pub fn new(bank: ClipBank, output_rate: u32) -> Self {
        Self { bank, voices: [None; MAX_CLIP_VOICES], output_rate: output_rate.max(1) as f64, serial: 0 }
    }

    /// Start playing `region`. Unknown or empty clips are ignored.
    /// Steals the oldest voice when every slot is busy.
    pub fn play(&mut self, region: Region) {
        let Some(clip) = self.bank.get(region.clip) else { return };
        let frames = clip.frames() as f64;
        let start = region.start_frame as f64;
        if start >= frames {
            return;
        }
        let rate = if region.rate.is_finite() { region.rate.clamp(MIN_RATE, MAX_RATE) } else { 1.0 };
        let increment = rate as f64 * clip.sample_rate() as f64 / self.output_rate;
        let end = if region.duration > 0.0 {
            (start + region.duration as f64 * self.output_rate * increment).min(frames)
        } else {
            frames
        };
        let gain = if region.gain.is_finite() { region.gain.max(0.0) } else { 0.0 };

        let voice = ClipVoice { clip: region.clip, position: start, end, increment, gain, serial: self.serial };
        self.serial += 1;
        let slot = self.allocate();
        self.voices[slot] = Some(voice);
    }

    fn allocate(&self) -> usize {
        if let Some(free) = self.voices.iter().position(|v| v.is_none()) {
            return free;
        }
        self.voices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v.serial)))
            .min_by_key(|&(_, serial)| serial)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Mix one frame of every playing voice into `out` (one entry per
    /// output channel). Channels past [`MAX_CHANNELS`] are left untouched.
    #[inline]
    pub fn mix_frame(&mut self, out: &mut [f32]) {
        let bank = &self.bank;
        for slot in &mut self.voices {
            let Some(voice) = slot else { continue };
            let Some(clip) = bank.get(voice.clip) else {
                *slot = None;
                continue;
            };
            let index = voice.position as usize;
            let frac = (voice.position - index as f64) as f32;
            for (ch, o) in out.iter_mut().enumerate().take(MAX_CHANNELS) {
                let a = clip.sample(index, ch);
                let b = clip.sample(index + 1, ch);
                *o += (a + (b - a) * frac) * voice.gain;
            }
            voice.position += voice.increment;
            if voice.position >= voice.end {
                *slot = None;
            }
        }
    }

    /// Cut every voice immediately.
    pub fn stop_all(&mut self) {
        self.voices = [None; MAX_CLIP_VOICES];
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }

    pub fn bank(&self) -> &ClipBank {
        &self.bank
    }
}
