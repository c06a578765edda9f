//! Sample file formats for pulsebox.
//!
//! Decodes WAV files into [`SampleBuffer`](pb_ir::SampleBuffer)s for the
//! chopper and the clip bank, and encodes rendered output back to WAV.

mod wav_format;

pub use wav_format::{load_wav, samples_to_wav, write_wav};

use pb_ir::SampleError;

/// Error type for format parsing.
#[derive(Debug)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    InvalidHeader,
    /// Unexpected end of file
    UnexpectedEof,
    /// Encoding or bit depth not handled
    Unsupported { format: u16, bits: u16 },
    /// Decoded data does not form a valid buffer
    Sample(SampleError),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::InvalidHeader => write!(f, "invalid WAV header"),
            FormatError::UnexpectedEof => write!(f, "unexpected end of file"),
            FormatError::Unsupported { format, bits } => {
                write!(f, "unsupported WAV encoding (format tag {}, {} bits)", format, bits)
            }
            FormatError::Sample(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormatError::Sample(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SampleError> for FormatError {
    fn from(e: SampleError) -> Self {
        FormatError::Sample(e)
    }
}
