//! Monophonic synth voice: square/saw oscillator, ADSR, HP -> LP filters.

use pb_ir::tempo::glide_coefficient;
use pb_ir::{midi_to_hz, AutomationTarget};
use std::sync::Arc;

use crate::atomic::AtomicF32;
use crate::envelope::{AdsrCoefficients, Envelope, EnvelopeStage};
use crate::filter::{OnePoleHighPass, OnePoleLowPass};

/// Hot-reloadable voice parameters. Written by the control side, read once
/// per block by the render side.
#[derive(Debug)]
pub struct VoiceParams {
    /// Square (0) to saw (1) blend
    mix: AtomicF32,
    gain: AtomicF32,
    attack: AtomicF32,
    decay: AtomicF32,
    sustain: AtomicF32,
    release: AtomicF32,
    lpf_hz: AtomicF32,
    hpf_hz: AtomicF32,
    /// Portamento time constant in seconds; 0 snaps
    glide: AtomicF32,
    /// Semitones added to every note
    transpose: AtomicF32,
    /// Second semitone offset, stacked on transpose
    coarse: AtomicF32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            mix: AtomicF32::new(0.5),
            gain: AtomicF32::new(0.75),
            attack: AtomicF32::new(0.001),
            decay: AtomicF32::new(0.075),
            sustain: AtomicF32::new(0.5),
            release: AtomicF32::new(0.08),
            lpf_hz: AtomicF32::new(350.0),
            hpf_hz: AtomicF32::new(150.0),
            glide: AtomicF32::new(0.0),
            transpose: AtomicF32::new(-12.0),
            coarse: AtomicF32::new(2.0),
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

impl VoiceParams {
    pub fn set_mix(&self, v: f32) {
        self.mix.store(finite_or(v, 0.5).clamp(0.0, 1.0));
    }

    pub fn set_gain(&self, v: f32) {
        self.gain.store(finite_or(v, 0.0).clamp(0.0, 2.0));
    }

    pub fn set_attack(&self, seconds: f32) {
        self.attack.store(finite_or(seconds, 0.001).max(0.0));
    }

    pub fn set_decay(&self, seconds: f32) {
        self.decay.store(finite_or(seconds, 0.075).max(0.0));
    }

    pub fn set_sustain(&self, level: f32) {
        self.sustain.store(finite_or(level, 0.5).clamp(0.0, 1.0));
    }

    pub fn set_release(&self, seconds: f32) {
        self.release.store(finite_or(seconds, 0.08).max(0.0));
    }

    pub fn set_lpf(&self, hz: f32) {
        self.lpf_hz.store(finite_or(hz, 350.0).clamp(10.0, 24_000.0));
    }

    pub fn set_hpf(&self, hz: f32) {
        self.hpf_hz.store(finite_or(hz, 150.0).clamp(10.0, 24_000.0));
    }

    pub fn set_glide(&self, seconds: f32) {
        self.glide.store(finite_or(seconds, 0.0).max(0.0));
    }

    pub fn set_transpose(&self, semitones: f32) {
        self.transpose.store(finite_or(semitones, 0.0).clamp(-48.0, 48.0));
    }

    pub fn set_coarse(&self, semitones: f32) {
        self.coarse.store(finite_or(semitones, 0.0).clamp(-24.0, 24.0));
    }

    /// Write an automation value to its parameter.
    pub fn store(&self, target: AutomationTarget, value: f32) {
        match target {
            AutomationTarget::LowPassCutoff => self.set_lpf(value),
            AutomationTarget::HighPassCutoff => self.set_hpf(value),
            AutomationTarget::OscMix => self.set_mix(value),
            AutomationTarget::Gain => self.set_gain(value),
        }
    }

    pub fn lpf(&self) -> f32 {
        self.lpf_hz.load()
    }

    pub fn hpf(&self) -> f32 {
        self.hpf_hz.load()
    }

    pub fn mix(&self) -> f32 {
        self.mix.load()
    }

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn glide(&self) -> f32 {
        self.glide.load()
    }

    /// Total pitch offset applied at note-on.
    pub fn pitch_offset(&self) -> f32 {
        self.transpose.load() + self.coarse.load()
    }
}

/// Render-side voice state.
pub struct SynthVoice {
    sample_rate: f32,
    params: Arc<VoiceParams>,
    envelope: Envelope,
    adsr: AdsrCoefficients,
    phase: f32,
    current_freq: f32,
    target_freq: f32,
    note_off_time: f64,
    mix: f32,
    gain: f32,
    glide_seconds: f32,
    glide_coeff: f32,
    hp: OnePoleHighPass,
    lp: OnePoleLowPass,
}

impl SynthVoice {
    pub fn new(sample_rate: u32, params: Arc<VoiceParams>) -> Self {
        let sr = sample_rate.max(1) as f32;
        let hp = OnePoleHighPass::new(sr, params.hpf());
        let lp = OnePoleLowPass::new(sr, params.lpf());
        let mut voice = Self {
            sample_rate: sr,
            params,
            envelope: Envelope::new(),
            adsr: AdsrCoefficients::new(0.001, 0.075, 0.5, 0.08, sr),
            phase: 0.0,
            current_freq: 0.0,
            target_freq: 0.0,
            note_off_time: f64::INFINITY,
            mix: 0.5,
            gain: 0.75,
            glide_seconds: 0.0,
            glide_coeff: 1.0,
            hp,
            lp,
        };
        voice.begin_block();
        voice
    }

    /// Snapshot the published parameters for the coming block.
    pub fn begin_block(&mut self) {
        let p = &self.params;
        let sr = self.sample_rate;
        self.adsr = AdsrCoefficients::new(
            p.attack.load(),
            p.decay.load(),
            p.sustain.load(),
            p.release.load(),
            sr,
        );
        self.mix = p.mix();
        self.gain = p.gain();
        self.glide_seconds = p.glide();
        self.glide_coeff = glide_coefficient(1.0 / sr as f64, self.glide_seconds as f64) as f32;
        self.hp.set_cutoff(sr, p.hpf());
        self.lp.set_cutoff(sr, p.lpf());
    }

    /// Start a note. Releases automatically `sustain_beats` later.
    pub fn note_on(&mut self, note: u8, sustain_beats: f32, sec_per_beat: f64, now: f64) {
        let pitch = note as f32 + self.params.pitch_offset();
        let hz = midi_to_hz(pitch).clamp(1.0, self.sample_rate * 0.45);
        self.target_freq = hz;
        let legato = self.envelope.stage() == EnvelopeStage::Sustain && self.glide_seconds > 0.0;
        if !legato {
            self.current_freq = hz;
        }
        self.envelope.trigger();
        self.note_off_time = now + sustain_beats.max(0.0) as f64 * sec_per_beat;
    }

    pub fn note_off(&mut self) {
        self.envelope.release();
    }

    /// Render one mono sample at clock time `now`.
    #[inline]
    pub fn next_sample(&mut self, now: f64) -> f32 {
        let stage = self.envelope.stage();
        if stage != EnvelopeStage::Release && stage != EnvelopeStage::Idle && now >= self.note_off_time {
            self.envelope.release();
        }

        self.current_freq += (self.target_freq - self.current_freq) * self.glide_coeff;
        self.phase += self.current_freq / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        let square = if self.phase < 0.5 { 1.0 } else { -1.0 };
        let saw = 2.0 * self.phase - 1.0;
        let osc = square + (saw - square) * self.mix;

        let env = self.envelope.advance(&self.adsr);
        let x = osc * env * self.gain;
        self.lp.process(self.hp.process(x))
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    pub fn envelope_level(&self) -> f32 {
        self.envelope.level()
    }

    pub fn current_freq(&self) -> f32 {
        self.current_freq
    }

    pub fn target_freq(&self) -> f32 {
        self.target_freq
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}
