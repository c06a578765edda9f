//! pulsebox CLI: live playback or offline WAV export.
//!
//! Usage:
//!   pb-cli --pattern "C3 - C3 - D#3 - G2 -"
//!   pb-cli --sample loop.wav --slices 8 --chop 32 --cut 0.1 --wav out.wav

use anyhow::{Context, Result};
use clap::Parser;
use pb_ir::{AutomationCurve, AutomationTarget, SampleBuffer, StepPattern};
use pb_master::{Controller, Session, SessionConfig};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tempo in beats per minute
    #[arg(long, default_value_t = 128.0)]
    bpm: f64,

    /// Step pattern for the synth voice; `-` is a rest, C3 = MIDI 48
    #[arg(long, default_value = "C3 - C3 - D#3 - C3 G2")]
    pattern: String,

    /// Probability applied to every step
    #[arg(long, default_value_t = 1.0)]
    probability: f32,

    /// Sweep the low-pass cutoff 350 Hz -> 2 kHz over the 8-bar cycle
    #[arg(long)]
    sweep: bool,

    /// WAV file fed to the chopper
    #[arg(long)]
    sample: Option<String>,

    /// Number of slices the sample is cut into
    #[arg(long, default_value_t = 8)]
    slices: u32,

    /// Length of the generated slice order
    #[arg(long, default_value_t = 32)]
    chop: u32,

    /// Period of the slice order, in steps
    #[arg(long, default_value_t = 4)]
    loop_at: u32,

    /// Chance per step of cutting back to the first slice
    #[arg(long, default_value_t = 0.0)]
    cut: f32,

    /// Chopper pitch shift
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    semitones: f32,

    /// Seed for step probability and cut draws
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Seconds to play or render (live playback runs until killed if omitted)
    #[arg(long)]
    seconds: Option<f64>,

    /// Render offline to this WAV file instead of playing
    #[arg(long)]
    wav: Option<String>,
}

/// Everything parsed up front so the session setup cannot fail.
struct Setup {
    pattern: StepPattern,
    sweep: bool,
    sample: Option<Arc<SampleBuffer>>,
    slices: u32,
    chop: u32,
    loop_at: u32,
    cut: f32,
    semitones: f32,
}

impl Setup {
    fn from_args(args: &Args) -> Result<Self> {
        let pattern = StepPattern::parse(&args.pattern)
            .with_context(|| format!("invalid pattern {:?}", args.pattern))?
            .with_probability(args.probability);

        let sample = match &args.sample {
            Some(path) => {
                let bytes = fs::read(path).with_context(|| format!("failed to read {}", path))?;
                let buffer = pb_master::load_wav(&bytes).with_context(|| format!("failed to decode {}", path))?;
                Some(Arc::new(buffer))
            }
            None => None,
        };

        Ok(Self {
            pattern,
            sweep: args.sweep,
            sample,
            slices: args.slices,
            chop: args.chop,
            loop_at: args.loop_at,
            cut: args.cut,
            semitones: args.semitones,
        })
    }

    fn apply(self, session: &mut Session) {
        let seq = session.sequencer_mut();
        seq.set_pattern(self.pattern);
        if self.sweep {
            seq.set_automation(
                AutomationCurve::ease_in_out(0.0, 350.0, 8.0, 2000.0),
                AutomationTarget::LowPassCutoff,
            );
        }

        let params = session.chop_params().clone();
        params.set_slices(self.slices);
        params.set_chop_steps(self.chop);
        params.set_loop_period(self.loop_at);
        params.set_cut_probability(self.cut);
        params.set_semitones(self.semitones);
        if let Some(buffer) = self.sample {
            session.chop_control().load(buffer);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!("{:?}", args);
    let setup = Setup::from_args(&args)?;

    let mut config = SessionConfig { seed: args.seed, ..SessionConfig::default() };
    config.clock.bpm = args.bpm;

    match &args.wav {
        Some(path) => render_to_wav(config, setup, path, args.seconds.unwrap_or(16.0)),
        None => play_audio(config, setup, args.seconds),
    }
}

fn play_audio(config: SessionConfig, setup: Setup, seconds: Option<f64>) -> Result<()> {
    let mut ctrl = Controller::play(config, move |session| setup.apply(session))
        .context("failed to start audio output")?;
    println!("Playing...");

    let started = Instant::now();
    while ctrl.is_playing() {
        if seconds.is_some_and(|s| started.elapsed().as_secs_f64() >= s) {
            break;
        }
        let (bar, beat) = ctrl.position();
        print!("\rBar: {:4} | Beat: {} | {:6.2} BPM", bar + 1, beat + 1, ctrl.bpm());
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(20));
    }

    ctrl.stop();
    println!("\rDone.                                ");
    Ok(())
}

fn render_to_wav(config: SessionConfig, setup: Setup, path: &str, seconds: f64) -> Result<()> {
    let sample_rate = config.sample_rate;
    let channels = config.channels as u16;
    println!("Rendering {:.1} s to {} at {} Hz...", seconds, path, sample_rate);

    let mut session = Session::new(config);
    setup.apply(&mut session);
    session.activate();
    let samples = session.render_offline(seconds)?;

    let wav = pb_master::samples_to_wav(&samples, channels, sample_rate);
    fs::write(path, &wav).with_context(|| format!("failed to write {}", path))?;
    println!("Wrote {} bytes", wav.len());
    Ok(())
}
