//! Audio output trait and error types.

/// Error type for audio operations.
#[derive(Debug)]
pub enum AudioError {
    /// Failed to initialize audio device
    DeviceInit(String),
    /// Failed to create audio stream
    StreamCreate(String),
    /// Playback error
    Playback(String),
    /// No audio device available
    NoDevice,
    /// `start` called before a stream was built
    NoStream,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DeviceInit(msg) => write!(f, "audio device init failed: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "could not build output stream: {}", msg),
            AudioError::Playback(msg) => write!(f, "playback control failed: {}", msg),
            AudioError::NoDevice => write!(f, "no default output device"),
            AudioError::NoStream => write!(f, "output stream not built yet"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Trait for audio output backends.
///
/// The backend owns the render [`Engine`](pb_engine::Engine) once the stream
/// is built and calls it from the device callback.
pub trait AudioOutput {
    /// Device sample rate; build the engine at this rate.
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count the engine must render.
    fn channels(&self) -> usize;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback. The callback keeps running and writes silence.
    fn stop(&mut self) -> Result<(), AudioError>;
}
