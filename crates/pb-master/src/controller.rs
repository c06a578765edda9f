//! Real-time playback: a control thread ticking the session and a device
//! stream rendering the engine.

use pb_audio::{AudioError, AudioOutput, CpalOutput};
use pb_engine::{AtomicF64, TempoShared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::session::{Session, SessionConfig};

/// Control tick rate of the playback thread.
pub const CONTROL_RATE_HZ: f64 = 60.0;

/// Handle to a running session.
pub struct Controller {
    stop_signal: Arc<AtomicBool>,
    tempo_request: Arc<AtomicF64>,
    tempo: Arc<TempoShared>,
    thread: Option<JoinHandle<()>>,
}

impl Controller {
    /// Open the default device, build a session at its sample rate, let
    /// `setup` configure it, then activate and start ticking.
    pub fn play<F>(mut config: SessionConfig, setup: F) -> Result<Self, AudioError>
    where
        F: FnOnce(&mut Session) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let tempo_request = Arc::new(AtomicF64::new(f64::NAN));
        let (ready_tx, ready_rx) = mpsc::channel();

        let stop = stop_signal.clone();
        let request = tempo_request.clone();
        let thread = std::thread::spawn(move || {
            // the stream is not Send, so it lives and dies on this thread
            let mut output = match CpalOutput::new() {
                Ok(output) => output,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            config.sample_rate = output.sample_rate();
            config.channels = output.channels();
            let mut session = Session::new(config);
            setup(&mut session);

            let started = session
                .take_engine()
                .map_err(|e| AudioError::StreamCreate(e.to_string()))
                .and_then(|engine| output.build_stream(engine))
                .and_then(|()| output.start());
            if let Err(e) = started {
                let _ = ready_tx.send(Err(e));
                return;
            }
            session.activate();
            let _ = ready_tx.send(Ok(session.clock().shared()));

            control_loop(&mut session, &stop, &request);

            session.deactivate();
            if let Err(e) = output.stop() {
                log::warn!("stopping output: {}", e);
            }
        });

        let tempo = match ready_rx.recv() {
            Ok(Ok(tempo)) => tempo,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::DeviceInit("playback thread exited".into()));
            }
        };

        Ok(Self { stop_signal, tempo_request, tempo, thread: Some(thread) })
    }

    /// Request a new tempo; the clock glides to it.
    pub fn set_tempo(&self, bpm: f64) {
        self.tempo_request.store(bpm);
    }

    /// Current (bar, beat in bar).
    pub fn position(&self) -> (u64, u32) {
        self.tempo.position()
    }

    /// Smoothed tempo.
    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn is_playing(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The pending tempo request, if any, leaving the slot empty.
fn take_tempo_request(request: &AtomicF64) -> Option<f64> {
    let bpm = request.swap(f64::NAN);
    (!bpm.is_nan()).then_some(bpm)
}

fn control_loop(session: &mut Session, stop: &AtomicBool, tempo_request: &AtomicF64) {
    let period = Duration::from_secs_f64(1.0 / CONTROL_RATE_HZ);
    let mut last = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        if let Some(bpm) = take_tempo_request(tempo_request) {
            session.clock_mut().set_tempo(bpm);
            log::info!("tempo -> {:.1} BPM", session.clock().target_bpm());
        }

        let now = Instant::now();
        session.control_tick(now.duration_since(last).as_secs_f64());
        last = now;
        std::thread::sleep(period);
    }
}
