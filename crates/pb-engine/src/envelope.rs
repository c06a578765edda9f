//! ADSR amplitude envelope, advanced one sample at a time.

/// Envelope stage. `Idle -> Attack -> Decay -> Sustain -> Release -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Attack leaves when the level is this close to 1.
const ATTACK_DONE: f32 = 0.999;
/// Decay leaves when the level is this close to the sustain level.
const DECAY_DONE: f32 = 1e-4;
/// Release ends below this level.
const RELEASE_DONE: f32 = 1e-4;
/// Shortest stage time, in seconds.
const MIN_STAGE_SECONDS: f32 = 1e-5;

/// Per-sample ramp coefficients derived from stage times.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdsrCoefficients {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
}

impl AdsrCoefficients {
    /// Each coefficient is `1 / (seconds * sample_rate)`, capped at 1 so a
    /// single step can reach but never pass its target.
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32, sample_rate: f32) -> Self {
        let coeff = |seconds: f32| {
            let samples = seconds.max(MIN_STAGE_SECONDS) * sample_rate;
            (1.0 / samples).min(1.0)
        };
        Self {
            attack: coeff(attack),
            decay: coeff(decay),
            sustain: if sustain.is_nan() { 0.0 } else { sustain.clamp(0.0, 1.0) },
            release: coeff(release),
        }
    }
}

/// Runtime state for the amplitude envelope.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current level, always in `[0, 1]`.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// Restart from zero in the attack stage.
    pub fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.level = 0.0;
    }

    /// Gate-off: move to release from whatever stage is sounding.
    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Advance one sample and return the new level.
    #[inline]
    pub fn advance(&mut self, c: &AdsrCoefficients) -> f32 {
        match self.stage {
            EnvelopeStage::Attack => {
                self.level += (1.0 - self.level) * c.attack;
                if self.level >= ATTACK_DONE {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level += (c.sustain - self.level) * c.decay;
                if (self.level - c.sustain).abs() < DECAY_DONE {
                    self.level = c.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.level = c.sustain,
            EnvelopeStage::Release => {
                self.level -= self.level * c.release;
                if self.level < RELEASE_DONE {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
            EnvelopeStage::Idle => self.level = 0.0,
        }
        self.level
    }
}
