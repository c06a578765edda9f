//! Step patterns: fixed-length, power-of-two grids of notes and rests.

use arrayvec::ArrayVec;
use core::fmt;

use crate::note::parse_note;

/// Longest pattern accepted.
pub const MAX_STEPS: usize = 128;

/// What a step plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepNote {
    /// MIDI note number
    On(u8),
    /// Silence; firing a rest releases the voice
    Rest,
}

/// One cell of a step pattern.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub note: StepNote,
    /// Disabled steps never fire
    pub gate: bool,
    /// Chance in `[0, 1]` that the step fires, re-rolled every occurrence
    pub probability: f32,
}

impl Step {
    pub fn note(note: u8) -> Self {
        Self { note: StepNote::On(note), gate: true, probability: 1.0 }
    }

    pub fn rest() -> Self {
        Self { note: StepNote::Rest, gate: true, probability: 1.0 }
    }
}

/// Error type for pattern construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternError {
    /// No steps supplied
    Empty,
    /// Length is not a power of two
    NotPowerOfTwo(usize),
    /// More than [`MAX_STEPS`] steps
    TooLong(usize),
    /// MIDI value above 127
    InvalidNote(i16),
    /// Unparseable token in a text pattern (index of the token)
    InvalidToken(usize),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Empty => write!(f, "pattern has no steps"),
            PatternError::NotPowerOfTwo(n) => write!(f, "pattern length {} is not a power of two", n),
            PatternError::TooLong(n) => write!(f, "pattern length {} exceeds {}", n, MAX_STEPS),
            PatternError::InvalidNote(n) => write!(f, "invalid MIDI note {}", n),
            PatternError::InvalidToken(i) => write!(f, "cannot parse step {}", i),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PatternError {}

/// An ordered, read-only grid of steps.
#[derive(Clone, Debug, PartialEq)]
pub struct StepPattern {
    steps: ArrayVec<Step, MAX_STEPS>,
}

impl StepPattern {
    /// Build a pattern from explicit steps.
    pub fn new(steps: &[Step]) -> Result<Self, PatternError> {
        check_length(steps.len())?;
        let mut out = ArrayVec::new();
        for step in steps {
            out.push(Step { probability: clamp_probability(step.probability), ..*step });
        }
        Ok(Self { steps: out })
    }

    /// Build from MIDI numbers; negative entries are rests.
    pub fn from_midi(notes: &[i16]) -> Result<Self, PatternError> {
        check_length(notes.len())?;
        let mut steps = ArrayVec::new();
        for &n in notes {
            let step = match n {
                n if n < 0 => Step::rest(),
                n if n <= 127 => Step::note(n as u8),
                n => return Err(PatternError::InvalidNote(n)),
            };
            steps.push(step);
        }
        Ok(Self { steps })
    }

    /// Parse whitespace-separated note names; `-` or `.` marks a rest.
    ///
    /// ```
    /// let p = pb_ir::StepPattern::parse("C3 - C3 -").unwrap();
    /// assert_eq!(p.len(), 4);
    /// ```
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let mut steps: ArrayVec<Step, MAX_STEPS> = ArrayVec::new();
        for (i, token) in text.split_whitespace().enumerate() {
            let step = match token {
                "-" | "." | "--" | "---" => Step::rest(),
                t => Step::note(parse_note(t).ok_or(PatternError::InvalidToken(i))?),
            };
            if steps.try_push(step).is_err() {
                return Err(PatternError::TooLong(text.split_whitespace().count()));
            }
        }
        check_length(steps.len())?;
        Ok(Self { steps })
    }

    /// Enable step `i` when bit `i` of `mask` is set; all others are gated off.
    pub fn with_gate_mask(mut self, mask: u128) -> Self {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.gate = mask & (1u128 << i) != 0;
        }
        self
    }

    /// Set every step's firing probability.
    pub fn with_probability(mut self, probability: f32) -> Self {
        let p = clamp_probability(probability);
        for step in &mut self.steps {
            step.probability = p;
        }
        self
    }

    /// Step at `index`, wrapping around the pattern length.
    pub fn get(&self, index: usize) -> &Step {
        &self.steps[index % self.steps.len()]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; construction rejects empty patterns.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

fn check_length(len: usize) -> Result<(), PatternError> {
    if len == 0 {
        Err(PatternError::Empty)
    } else if len > MAX_STEPS {
        Err(PatternError::TooLong(len))
    } else if !len.is_power_of_two() {
        Err(PatternError::NotPowerOfTwo(len))
    } else {
        Ok(())
    }
}

fn clamp_probability(p: f32) -> f32 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}
