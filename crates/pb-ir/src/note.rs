//! MIDI note helpers. Octave numbering puts C3 at MIDI 48.

use arrayvec::ArrayString;
use core::fmt::Write;

const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Equal-tempered frequency of a (possibly fractional) MIDI note.
pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * libm::powf(2.0, (note - 69.0) / 12.0)
}

/// Playback-rate ratio for a transposition in semitones.
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    libm::powf(2.0, semitones / 12.0)
}

/// Parse a note name like `C3`, `F#2`, `Bb-1` into a MIDI number.
pub fn parse_note(text: &str) -> Option<u8> {
    let mut chars = text.chars();
    let base: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave_text) = match rest.as_bytes().first() {
        Some(b'#') => (1, &rest[1..]),
        Some(b'b') => (-1, &rest[1..]),
        _ => (0, rest),
    };
    let octave: i32 = octave_text.parse().ok()?;
    let midi = (octave + 1) * 12 + base + accidental;
    u8::try_from(midi).ok().filter(|&n| n <= 127)
}

/// Name of a MIDI note, sharps only (`48` -> `C3`).
pub fn note_name(note: u8) -> ArrayString<4> {
    let mut out = ArrayString::new();
    let octave = note as i32 / 12 - 1;
    let _ = write!(out, "{}{}", NAMES[note as usize % 12], octave);
    out
}
