//! Session: owns the beat clock and every control-side component, and
//! builds the render engine that consumes their events.

use pb_engine::{
    event_channel, BeatClock, ChopControl, ChopParams, Chopper, ClipBank, ClipPool, ClockConfig,
    Engine, EngineParts, EventConsumer, EventProducer, FrameClock, LoopScheduler, MixParams,
    SequencerConfig, SliceSequencer, StepSequencer, SynthVoice, VoiceParams,
};
use pb_ir::{ClipId, SampleBuffer};
use std::sync::Arc;

/// Everything needed to build a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub channels: usize,
    /// Frames per render block in offline rendering
    pub block_frames: usize,
    /// Capacity of the control -> render event ring
    pub event_capacity: usize,
    /// Seeds the sequencer's probability draws and the chopper's cut draws
    pub seed: u64,
    pub clock: ClockConfig,
    pub sequencer: SequencerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            block_frames: 512,
            event_capacity: 1024,
            seed: 0x5eed,
            clock: ClockConfig::default(),
            sequencer: SequencerConfig::default(),
        }
    }
}

/// Error type for session operations.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The render engine was already handed out
    EngineTaken,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::EngineTaken => write!(f, "render engine already taken"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Render-side pieces held until the engine is built.
struct PendingRender {
    events: EventConsumer,
    chopper: Chopper,
    bank: ClipBank,
}

pub struct Session {
    config: SessionConfig,
    frame_clock: FrameClock,
    clock: BeatClock,
    producer: EventProducer,
    sequencer: StepSequencer,
    loops: Vec<LoopScheduler>,
    slicer: Option<SliceSequencer>,
    voice_params: Arc<VoiceParams>,
    chop_control: ChopControl,
    mix: Arc<MixParams>,
    pending: Option<PendingRender>,
}

impl Session {
    pub fn new(mut config: SessionConfig) -> Self {
        config.sample_rate = config.sample_rate.max(1);
        config.channels = config.channels.max(1);
        config.block_frames = config.block_frames.max(1);
        config.sequencer.seed = config.seed;

        let frame_clock = FrameClock::new(config.sample_rate);
        let clock = BeatClock::new(Arc::new(frame_clock.clone()), config.clock.clone());
        let (producer, events) = event_channel(config.event_capacity);
        let voice_params = Arc::new(VoiceParams::default());
        let (chopper, chop_control) =
            Chopper::new(config.sample_rate, Arc::new(ChopParams::default()), config.seed ^ 0xc0ff);
        let sequencer = StepSequencer::new(config.sequencer.clone(), voice_params.clone());

        log::info!(
            "session: {} Hz, {} ch, {:.1} BPM",
            config.sample_rate,
            config.channels,
            clock.bpm()
        );

        Self {
            config,
            frame_clock,
            clock,
            producer,
            sequencer,
            loops: Vec::new(),
            slicer: None,
            voice_params,
            chop_control,
            mix: Arc::new(MixParams::default()),
            pending: Some(PendingRender { events, chopper, bank: ClipBank::new() }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // --- Setup ---

    /// Register a clip for region playback. Clips must be added before the
    /// engine is built.
    pub fn add_clip(&mut self, clip: Arc<SampleBuffer>) -> Result<ClipId, SessionError> {
        let pending = self.pending.as_mut().ok_or(SessionError::EngineTaken)?;
        Ok(pending.bank.add(clip))
    }

    /// Add a loop or one-shot scheduler; returns its index.
    pub fn add_loop(&mut self, scheduler: LoopScheduler) -> usize {
        self.loops.push(scheduler);
        self.loops.len() - 1
    }

    pub fn loop_mut(&mut self, index: usize) -> Option<&mut LoopScheduler> {
        self.loops.get_mut(index)
    }

    pub fn set_slicer(&mut self, slicer: SliceSequencer) {
        self.slicer = Some(slicer);
    }

    pub fn slicer_mut(&mut self) -> Option<&mut SliceSequencer> {
        self.slicer.as_mut()
    }

    /// Build the render engine. Only the first call succeeds.
    pub fn take_engine(&mut self) -> Result<Engine, SessionError> {
        let pending = self.pending.take().ok_or(SessionError::EngineTaken)?;
        Ok(Engine::new(EngineParts {
            clock: self.frame_clock.clone(),
            events: pending.events,
            tempo: self.clock.shared(),
            voice: SynthVoice::new(self.config.sample_rate, self.voice_params.clone()),
            chopper: pending.chopper,
            clips: ClipPool::new(pending.bank, self.config.sample_rate),
            mix: self.mix.clone(),
            channels: self.config.channels,
        }))
    }

    // --- Transport ---

    /// Activate the clock and start every component on the grid.
    pub fn activate(&mut self) {
        if !self.chop_control.has_buffer() {
            log::info!("chopper has no sample buffer; its output stays silent");
        }
        self.clock.activate();
        self.sequencer.start(&self.clock);
        for scheduler in &mut self.loops {
            scheduler.start(&self.clock);
        }
        if let Some(slicer) = &mut self.slicer {
            slicer.start();
        }
    }

    /// Stop every component and deactivate the clock.
    pub fn deactivate(&mut self) {
        self.sequencer.stop(&self.clock, &mut self.producer);
        for scheduler in &mut self.loops {
            scheduler.stop();
        }
        if let Some(slicer) = &mut self.slicer {
            slicer.stop();
        }
        self.clock.deactivate();
    }

    /// One control-thread tick: advance the clock, then let every component
    /// commit the events inside the lookahead window.
    pub fn control_tick(&mut self, dt: f64) -> usize {
        self.clock.tick(dt);
        let mut issued = self.sequencer.tick(&self.clock, &mut self.producer);
        for scheduler in &mut self.loops {
            issued += scheduler.tick(&self.clock, &mut self.producer);
        }
        if let Some(slicer) = &mut self.slicer {
            issued += slicer.tick(&self.clock, &mut self.producer);
        }
        self.chop_control.collect_garbage();
        issued
    }

    /// Render `seconds` of audio without a device, ticking the control side
    /// once per block. Returns interleaved samples.
    pub fn render_offline(&mut self, seconds: f64) -> Result<Vec<f32>, SessionError> {
        let mut engine = self.take_engine()?;
        let channels = self.config.channels;
        let block = self.config.block_frames;
        let total = (seconds.max(0.0) * self.config.sample_rate as f64).round() as usize;
        let dt = block as f64 / self.config.sample_rate as f64;

        let mut out = vec![0.0f32; total * channels];
        for chunk in out.chunks_mut(block * channels) {
            self.control_tick(dt);
            engine.render(chunk);
        }
        log::info!("rendered {} frames offline", total);
        Ok(out)
    }

    // --- Accessors ---

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut BeatClock {
        &mut self.clock
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut StepSequencer {
        &mut self.sequencer
    }

    pub fn voice_params(&self) -> &Arc<VoiceParams> {
        &self.voice_params
    }

    pub fn chop_params(&self) -> &Arc<ChopParams> {
        self.chop_control.params()
    }

    pub fn chop_control(&mut self) -> &mut ChopControl {
        &mut self.chop_control
    }

    pub fn mix(&self) -> &Arc<MixParams> {
        &self.mix
    }

    pub fn frame_clock(&self) -> &FrameClock {
        &self.frame_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb_engine::LoopMode;
    use pb_ir::{EventPayload, EventTarget, Region, StepPattern};

    fn small_config() -> SessionConfig {
        SessionConfig { sample_rate: 8000, block_frames: 80, ..SessionConfig::default() }
    }

    #[test]
    fn engine_can_only_be_taken_once() {
        let mut session = Session::new(small_config());
        assert!(session.take_engine().is_ok());
        assert_eq!(session.take_engine().err(), Some(SessionError::EngineTaken));
        let clip = Arc::new(SampleBuffer::new(vec![0.0; 4], 1, 8000).unwrap());
        assert_eq!(session.add_clip(clip), Err(SessionError::EngineTaken));
    }

    #[test]
    fn offline_render_length_and_silence_before_activation() {
        let mut session = Session::new(small_config());
        session.sequencer_mut().set_pattern(StepPattern::parse("C3 C3").unwrap());
        let out = session.render_offline(0.5).unwrap();
        assert_eq!(out.len(), 4000 * 2);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(session.frame_clock().frames(), 4000);
    }

    fn session_with_chop_buffer() -> Session {
        let mut session = Session::new(small_config());
        let buffer = Arc::new(SampleBuffer::new(vec![0.5; 8000], 1, 8000).unwrap());
        assert!(session.chop_control().load(buffer));
        session
    }

    #[test]
    fn loaded_chopper_is_silent_before_activation() {
        let mut session = session_with_chop_buffer();
        let out = session.render_offline(0.5).unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn chopper_falls_silent_after_deactivate() {
        let mut session = session_with_chop_buffer();
        let mut engine = session.take_engine().unwrap();
        let mut out = vec![0.0f32; 80 * 2];
        session.activate();
        for _ in 0..10 {
            session.control_tick(0.01);
            engine.render(&mut out);
        }
        assert!(out.iter().any(|&s| s.abs() > 0.1));

        session.deactivate();
        session.control_tick(0.01);
        engine.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.chopper().current_step(), 0);
    }

    #[test]
    fn activated_pattern_makes_sound() {
        let mut session = Session::new(small_config());
        session.sequencer_mut().set_pattern(StepPattern::parse("C3 - C3 -").unwrap());
        session.activate();
        let out = session.render_offline(1.0).unwrap();
        assert!(out.iter().any(|&s| s.abs() > 1e-3));
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn loop_scheduler_drives_clip_pool() {
        let mut session = Session::new(small_config());
        let clip = session.add_clip(Arc::new(SampleBuffer::new(vec![0.5; 800], 1, 8000).unwrap())).unwrap();
        session.add_loop(LoopScheduler::new(
            EventTarget::Clips,
            EventPayload::PlayRegion(Region::whole(clip)),
            1.0,
            0.0,
            LoopMode::Loop,
        ));
        session.activate();
        let out = session.render_offline(0.5).unwrap();
        // first beat lands at the 0.1 s start delay
        let first = out.iter().position(|&s| s != 0.0).unwrap();
        assert_eq!(first / 2, 800);
    }

    #[test]
    fn deactivate_stops_scheduling() {
        let mut session = Session::new(small_config());
        session.sequencer_mut().set_pattern(StepPattern::parse("C3").unwrap());
        session.activate();
        session.control_tick(0.01);
        session.deactivate();
        assert!(!session.clock().is_active());
        assert!(!session.sequencer().is_active());
        assert_eq!(session.control_tick(0.01), 0);
    }
}
