//! Sample chopper: slices a loaded buffer and re-sequences the slices on a
//! tempo-synced step grid, with random stutter cuts, nearest-neighbour
//! pitch shifting, a one-tap room smear and a per-channel biquad low-pass.
//!
//! Scalars arrive through [`ChopParams`]; buffer swaps and explicit order
//! tables arrive on a command ring from [`ChopControl`]. Replaced buffers
//! are sent back so they are freed on the control thread.

use heapless::Vec as FixedVec;
use pb_ir::{semitones_to_ratio, SampleBuffer, MAX_CHANNELS};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::atomic::AtomicF32;
use crate::filter::Biquad;

/// Longest order table.
pub const MAX_ORDER: usize = 128;
pub const MAX_SLICES: u32 = 64;
pub const MAX_SEMITONES: f32 = 24.0;

const COMMAND_CAPACITY: usize = 8;

/// Slice indices played step by step.
pub type OrderTable = FixedVec<u16, MAX_ORDER>;

/// Hot-reloadable chopper parameters.
#[derive(Debug)]
pub struct ChopParams {
    slices: AtomicU32,
    chop_steps: AtomicU32,
    loop_period: AtomicU32,
    steps_per_bar: AtomicU32,
    cut_probability: AtomicF32,
    semitones: AtomicF32,
    gain: AtomicF32,
    room: AtomicF32,
    lpf_hz: AtomicF32,
    lpf_q: AtomicF32,
}

impl Default for ChopParams {
    fn default() -> Self {
        Self {
            slices: AtomicU32::new(8),
            chop_steps: AtomicU32::new(32),
            loop_period: AtomicU32::new(4),
            steps_per_bar: AtomicU32::new(8),
            cut_probability: AtomicF32::new(0.0),
            semitones: AtomicF32::new(0.0),
            gain: AtomicF32::new(1.0),
            room: AtomicF32::new(0.2),
            lpf_hz: AtomicF32::new(600.0),
            lpf_q: AtomicF32::new(0.707),
        }
    }
}

fn clamp_finite(v: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        fallback
    }
}

impl ChopParams {
    pub fn set_slices(&self, n: u32) {
        self.slices.store(n.clamp(1, MAX_SLICES), Ordering::Relaxed);
    }

    /// Length of the generated order table.
    pub fn set_chop_steps(&self, n: u32) {
        self.chop_steps.store(n.clamp(1, MAX_ORDER as u32), Ordering::Relaxed);
    }

    /// Period of the generated order pattern, in steps.
    pub fn set_loop_period(&self, n: u32) {
        self.loop_period.store(n.clamp(1, MAX_ORDER as u32), Ordering::Relaxed);
    }

    pub fn set_steps_per_bar(&self, n: u32) {
        self.steps_per_bar.store(n.clamp(1, 64), Ordering::Relaxed);
    }

    pub fn set_cut_probability(&self, p: f32) {
        self.cut_probability.store(clamp_finite(p, 0.0, 1.0, 0.0));
    }

    pub fn set_semitones(&self, s: f32) {
        self.semitones.store(clamp_finite(s, -MAX_SEMITONES, MAX_SEMITONES, 0.0));
    }

    pub fn set_gain(&self, g: f32) {
        self.gain.store(clamp_finite(g, 0.0, 3.0, 0.0));
    }

    pub fn set_room(&self, r: f32) {
        self.room.store(clamp_finite(r, 0.0, 1.0, 0.0));
    }

    pub fn set_lpf(&self, hz: f32) {
        self.lpf_hz.store(clamp_finite(hz, 20.0, 24_000.0, 600.0));
    }

    pub fn set_lpf_q(&self, q: f32) {
        self.lpf_q.store(clamp_finite(q, 0.1, 1.4, 0.707));
    }

    fn layout(&self) -> (u32, u32, u32) {
        (
            self.slices.load(Ordering::Relaxed),
            self.chop_steps.load(Ordering::Relaxed),
            self.loop_period.load(Ordering::Relaxed),
        )
    }
}

/// Structured reconfiguration sent to the render side.
pub enum ChopCommand {
    LoadBuffer(Arc<SampleBuffer>),
    Unload,
    SetOrder(OrderTable),
    ClearOrder,
}

/// Build the default order: `(i mod loop) * (slices / loop)` for each step.
pub fn build_order(slices: u32, chop_steps: u32, loop_period: u32) -> OrderTable {
    let slices = slices.max(1);
    let loop_period = loop_period.clamp(1, chop_steps.max(1));
    let stride = slices / loop_period;
    let mut order = OrderTable::new();
    for i in 0..chop_steps.clamp(1, MAX_ORDER as u32) {
        let slice = ((i % loop_period) * stride).min(slices - 1);
        // capacity checked by the clamp above
        let _ = order.push(slice as u16);
    }
    order
}

/// Control-side handle.
pub struct ChopControl {
    params: Arc<ChopParams>,
    commands: HeapProd<ChopCommand>,
    retired: HeapCons<Arc<SampleBuffer>>,
    loaded: bool,
}

impl ChopControl {
    pub fn params(&self) -> &Arc<ChopParams> {
        &self.params
    }

    /// Hand a buffer to the chopper. Empty buffers are accepted and render
    /// silence. Returns false if the command ring is full.
    pub fn load(&mut self, buffer: Arc<SampleBuffer>) -> bool {
        if buffer.is_empty() {
            log::warn!("chopper buffer is empty; output stays silent");
        } else {
            log::info!(
                "chopper loading {} frames x {} ch @ {} Hz",
                buffer.frames(),
                buffer.channels(),
                buffer.sample_rate()
            );
        }
        let audible = !buffer.is_empty();
        let sent = self.send(ChopCommand::LoadBuffer(buffer));
        if sent {
            self.loaded = audible;
        }
        sent
    }

    pub fn unload(&mut self) -> bool {
        let sent = self.send(ChopCommand::Unload);
        if sent {
            self.loaded = false;
        }
        sent
    }

    /// Whether the last accepted load carried audio.
    pub fn has_buffer(&self) -> bool {
        self.loaded
    }

    /// Use an explicit slice order. An empty slice restores the generated one.
    pub fn set_order(&mut self, order: &[u16]) -> bool {
        if order.is_empty() {
            return self.send(ChopCommand::ClearOrder);
        }
        if order.len() > MAX_ORDER {
            log::warn!("order table truncated to {} steps", MAX_ORDER);
        }
        let table: OrderTable = order.iter().copied().take(MAX_ORDER).collect();
        self.send(ChopCommand::SetOrder(table))
    }

    pub fn clear_order(&mut self) -> bool {
        self.send(ChopCommand::ClearOrder)
    }

    /// Free buffers the render side has let go of. Returns how many.
    pub fn collect_garbage(&mut self) -> usize {
        let mut n = 0;
        while self.retired.try_pop().is_some() {
            n += 1;
        }
        n
    }

    fn send(&mut self, cmd: ChopCommand) -> bool {
        if self.commands.try_push(cmd).is_err() {
            log::warn!("chopper command ring full; retry next tick");
            return false;
        }
        true
    }
}

/// Render-side chopper.
pub struct Chopper {
    sample_rate: f32,
    params: Arc<ChopParams>,
    commands: HeapCons<ChopCommand>,
    retired: HeapProd<Arc<SampleBuffer>>,
    buffer: Option<Arc<SampleBuffer>>,
    custom_order: Option<OrderTable>,
    order: OrderTable,
    layout: (u32, u32, u32),
    slice_frames: usize,
    hop: usize,
    step: usize,
    frames_remaining: usize,
    /// Frames read since the current step began
    offset: usize,
    last_read: usize,
    steps_per_bar: usize,
    cut_probability: f32,
    pitch_ratio: f32,
    smear: f32,
    gain: f32,
    /// Filtered pre-gain sample of the previous frame, keeping the smear loop
    /// below unity at any gain setting
    prev: [f32; MAX_CHANNELS],
    filter: Biquad,
    rng: SmallRng,
}

impl Chopper {
    /// Create a chopper and its control handle.
    pub fn new(sample_rate: u32, params: Arc<ChopParams>, seed: u64) -> (Chopper, ChopControl) {
        let (cmd_tx, cmd_rx) = HeapRb::<ChopCommand>::new(COMMAND_CAPACITY).split();
        // room for every in-flight command to retire a buffer
        let (ret_tx, ret_rx) = HeapRb::<Arc<SampleBuffer>>::new(COMMAND_CAPACITY * 2).split();
        let sr = sample_rate.max(1) as f32;
        let layout = params.layout();
        let filter = Biquad::low_pass(sr, params.lpf_hz.load(), params.lpf_q.load());
        let mut chopper = Chopper {
            sample_rate: sr,
            params: params.clone(),
            commands: cmd_rx,
            retired: ret_tx,
            buffer: None,
            custom_order: None,
            order: build_order(layout.0, layout.1, layout.2),
            layout,
            slice_frames: 1,
            hop: 1,
            step: 0,
            frames_remaining: 1,
            offset: 0,
            last_read: 0,
            steps_per_bar: 8,
            cut_probability: 0.0,
            pitch_ratio: 1.0,
            smear: 0.0,
            gain: 1.0,
            prev: [0.0; MAX_CHANNELS],
            filter,
            rng: SmallRng::seed_from_u64(seed),
        };
        chopper.begin_block(0.5);
        let control = ChopControl { params, commands: cmd_tx, retired: ret_rx, loaded: false };
        (chopper, control)
    }

    /// Apply pending commands and snapshot parameters for the next block.
    pub fn begin_block(&mut self, sec_per_beat: f64) {
        let mut rebuild = false;
        while !self.retired.is_full() {
            let Some(cmd) = self.commands.try_pop() else { break };
            match cmd {
                ChopCommand::LoadBuffer(buffer) => {
                    self.retire(Some(buffer));
                    rebuild = true;
                }
                ChopCommand::Unload => {
                    self.retire(None);
                    rebuild = true;
                }
                ChopCommand::SetOrder(order) => {
                    self.custom_order = Some(order);
                    rebuild = true;
                }
                ChopCommand::ClearOrder => {
                    self.custom_order = None;
                    rebuild = true;
                }
            }
        }

        let p = &self.params;
        let layout = p.layout();
        if layout != self.layout {
            self.layout = layout;
            rebuild = true;
        }
        self.steps_per_bar = p.steps_per_bar.load(Ordering::Relaxed).max(1) as usize;
        self.cut_probability = p.cut_probability.load();
        // source frames per output frame, so material at another rate keeps its pitch
        let rate_ratio = self.buffer.as_ref().map_or(1.0, |b| b.sample_rate() as f32 / self.sample_rate);
        self.pitch_ratio = semitones_to_ratio(p.semitones.load()) * rate_ratio;
        self.smear = p.room.load().clamp(0.0, 1.0) * 0.25;
        self.gain = p.gain.load();
        self.filter.set_low_pass(self.sample_rate, p.lpf_hz.load(), p.lpf_q.load());

        let hop = self.sample_rate as f64 * sec_per_beat / self.steps_per_bar as f64;
        self.hop = if hop.is_finite() { (hop as usize).max(1) } else { 1 };

        if rebuild {
            self.rebuild_order();
        }
    }

    /// Swap the current buffer, sending the old one back to the control side.
    fn retire(&mut self, replacement: Option<Arc<SampleBuffer>>) {
        if let Some(old) = core::mem::replace(&mut self.buffer, replacement) {
            // begin_block only pops a command while the ring has room
            let _ = self.retired.try_push(old);
        }
    }

    fn rebuild_order(&mut self) {
        let (slices, chop_steps, loop_period) = self.layout;
        let slices = slices.max(1);
        self.order = match &self.custom_order {
            Some(custom) => custom.iter().map(|&s| s.min((slices - 1) as u16)).collect(),
            None => build_order(slices, chop_steps, loop_period),
        };
        let frames = self.buffer.as_ref().map_or(0, |b| b.frames());
        self.slice_frames = (frames / slices as usize).max(1);
        self.step = 0;
        self.offset = 0;
        self.frames_remaining = self.hop;
    }

    /// Jump back to step 0.
    pub fn retrigger(&mut self) {
        self.step = 0;
        self.offset = 0;
        self.frames_remaining = self.hop;
    }

    /// Hold at step 0 with the smear and filter state cleared. Used while the
    /// transport is stopped.
    pub fn park(&mut self) {
        self.retrigger();
        self.prev = [0.0; MAX_CHANNELS];
        self.filter.reset();
    }

    /// Render one frame into `out` (one entry per output channel).
    #[inline]
    pub fn next_frame(&mut self, out: &mut [f32]) {
        let buffer = match &self.buffer {
            Some(b) if !b.is_empty() && !self.order.is_empty() => b,
            _ => {
                out.fill(0.0);
                return;
            }
        };

        self.frames_remaining = self.frames_remaining.saturating_sub(1);
        if self.frames_remaining == 0 {
            self.step += 1;
            let cut = self.cut_probability > 0.0 && self.rng.random::<f32>() < self.cut_probability;
            if self.step % self.steps_per_bar == 0 || cut {
                self.step = 0;
            }
            self.offset = 0;
            self.frames_remaining = self.hop;
        }

        let slice = self.order[self.step % self.order.len()] as usize;
        let base = slice * self.slice_frames;
        let shifted = (self.offset as f32 * self.pitch_ratio) as usize;
        let frame = (base + shifted).min(buffer.frames() - 1);
        self.last_read = frame;
        self.offset += 1;

        for (ch, o) in out.iter_mut().enumerate() {
            if ch >= MAX_CHANNELS {
                *o = 0.0;
                continue;
            }
            let x = buffer.sample(frame, ch) + self.smear * self.prev[ch];
            let y = self.filter.process(ch, x);
            self.prev[ch] = y;
            *o = y * self.gain;
        }
        self.filter.smooth();
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    /// Slice the current step reads from.
    pub fn current_slice(&self) -> Option<u16> {
        if self.order.is_empty() {
            None
        } else {
            Some(self.order[self.step % self.order.len()])
        }
    }

    pub fn order(&self) -> &[u16] {
        &self.order
    }

    /// Source frame read by the most recent [`next_frame`](Self::next_frame).
    pub fn last_read_frame(&self) -> usize {
        self.last_read
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn slice_frames(&self) -> usize {
        self.slice_frames
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.as_ref().is_some_and(|b| !b.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 8000;

    /// Buffer whose every sample encodes its slice index.
    fn sliced_buffer(slices: usize, slice_frames: usize, channels: u16) -> Arc<SampleBuffer> {
        let data = (0..slices * slice_frames)
            .flat_map(|f| std::iter::repeat((f / slice_frames) as f32).take(channels as usize))
            .collect();
        Arc::new(SampleBuffer::new(data, channels, SR).unwrap())
    }

    fn chopper() -> (Chopper, ChopControl) {
        Chopper::new(SR, Arc::new(ChopParams::default()), 1)
    }

    #[test]
    fn default_order_formula() {
        let order = build_order(8, 32, 4);
        assert_eq!(order.len(), 32);
        assert_eq!(&order[..8], &[0, 2, 4, 6, 0, 2, 4, 6]);
    }

    #[test]
    fn order_values_in_range_for_any_layout() {
        for slices in 1..=MAX_SLICES {
            for chop in [1, 3, 16, 64, 200] {
                for lp in [1, 2, 5, 16, 100] {
                    let order = build_order(slices, chop, lp);
                    assert!(!order.is_empty());
                    assert!(order.iter().all(|&s| (s as u32) < slices));
                }
            }
        }
    }

    #[test]
    fn custom_order_is_clamped() {
        let (mut ch, mut ctl) = chopper();
        ctl.params().set_slices(4);
        assert!(ctl.load(sliced_buffer(4, 100, 1)));
        assert!(ctl.set_order(&[3, 9, 1]));
        ch.begin_block(0.5);
        assert_eq!(ch.order(), &[3, 3, 1]);
        ctl.clear_order();
        ch.begin_block(0.5);
        assert_eq!(ch.order().len(), 32);
    }

    #[test]
    fn no_buffer_renders_silence() {
        let (mut ch, ctl) = chopper();
        let mut frame = [1.0f32; 2];
        ch.next_frame(&mut frame);
        assert_eq!(frame, [0.0, 0.0]);
        assert!(!ch.has_buffer());
        assert!(!ctl.has_buffer());
    }

    #[test]
    fn empty_buffer_renders_silence() {
        let (mut ch, mut ctl) = chopper();
        ctl.load(Arc::new(SampleBuffer::new(vec![], 2, SR).unwrap()));
        ch.begin_block(0.5);
        let mut frame = [1.0f32; 2];
        ch.next_frame(&mut frame);
        assert_eq!(frame, [0.0, 0.0]);
    }

    #[test]
    fn hop_follows_tempo() {
        let (mut ch, _ctl) = chopper();
        ch.begin_block(0.5);
        // 8000 * 0.5 / 8
        assert_eq!(ch.hop(), 500);
        ch.begin_block(0.25);
        assert_eq!(ch.hop(), 250);
    }

    #[test]
    fn steps_advance_and_reset_on_bar() {
        let (mut ch, mut ctl) = chopper();
        ctl.load(sliced_buffer(8, 1000, 1));
        ch.begin_block(0.5);
        let mut frame = [0.0f32; 1];
        let mut steps = Vec::new();
        for _ in 0..500 * 20 {
            ch.next_frame(&mut frame);
            if steps.last() != Some(&ch.current_step()) {
                steps.push(ch.current_step());
            }
        }
        assert_eq!(&steps[..10], &[0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
    }

    #[test]
    fn cut_probability_one_pins_first_slice() {
        let (mut ch, mut ctl) = chopper();
        ctl.params().set_cut_probability(1.0);
        ctl.params().set_room(0.0);
        ctl.params().set_lpf(24_000.0);
        ctl.load(sliced_buffer(8, 1000, 1));
        ch.begin_block(0.5);
        let first = ch.order()[0];
        let mut frame = [0.0f32; 1];
        for _ in 0..20_000 {
            ch.next_frame(&mut frame);
            assert_eq!(ch.current_step(), 0);
            assert_eq!(ch.current_slice(), Some(first));
            assert_eq!(ch.last_read_frame() / ch.slice_frames(), first as usize);
        }
    }

    #[test]
    fn read_index_in_bounds_for_any_pitch() {
        for semis in [-24.0, -7.0, 0.0, 5.0, 12.0, 24.0] {
            let (mut ch, mut ctl) = chopper();
            ctl.params().set_semitones(semis);
            ctl.params().set_cut_probability(0.3);
            let buf = sliced_buffer(8, 37, 2);
            let frames = buf.frames();
            ctl.load(buf);
            ch.begin_block(0.5);
            let mut frame = [0.0f32; 2];
            for _ in 0..20_000 {
                ch.next_frame(&mut frame);
                assert!(ch.last_read_frame() < frames);
                assert!(frame.iter().all(|s| s.is_finite()));
            }
        }
    }

    #[test]
    fn extra_output_channels_are_zero() {
        let (mut ch, mut ctl) = chopper();
        ctl.load(sliced_buffer(8, 100, 1));
        ch.begin_block(0.5);
        let mut frame = [1.0f32; MAX_CHANNELS + 2];
        for _ in 0..1000 {
            ch.next_frame(&mut frame);
        }
        assert_eq!(frame[MAX_CHANNELS], 0.0);
        assert_eq!(frame[MAX_CHANNELS + 1], 0.0);
        assert!(frame[0] > 0.0);
    }

    #[test]
    fn replaced_buffers_come_back_for_freeing() {
        let (mut ch, mut ctl) = chopper();
        let first = sliced_buffer(8, 10, 1);
        ctl.load(first.clone());
        ch.begin_block(0.5);
        ctl.load(sliced_buffer(8, 20, 1));
        ch.begin_block(0.5);
        assert_eq!(Arc::strong_count(&first), 2);
        assert_eq!(ctl.collect_garbage(), 1);
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[test]
    fn lower_rate_material_reads_slower() {
        let (mut ch, mut ctl) = chopper();
        let data = vec![0.25f32; 8000];
        ctl.load(Arc::new(SampleBuffer::new(data, 1, SR / 2).unwrap()));
        ch.begin_block(0.5);
        let mut frame = [0.0f32; 1];
        ch.next_frame(&mut frame);
        let first = ch.last_read_frame();
        for _ in 0..100 {
            ch.next_frame(&mut frame);
        }
        assert_eq!(ch.last_read_frame() - first, 50);
    }

    #[test]
    fn park_rewinds_and_clears_smear() {
        let (mut ch, mut ctl) = chopper();
        ctl.load(sliced_buffer(8, 1000, 1));
        ch.begin_block(0.5);
        let mut frame = [0.0f32; 1];
        for _ in 0..1200 {
            ch.next_frame(&mut frame);
        }
        ch.park();
        assert_eq!(ch.current_step(), 0);
        assert_eq!(ch.prev, [0.0; MAX_CHANNELS]);
    }

    #[test]
    fn retrigger_rewinds() {
        let (mut ch, mut ctl) = chopper();
        ctl.load(sliced_buffer(8, 1000, 1));
        ch.begin_block(0.5);
        let mut frame = [0.0f32; 1];
        for _ in 0..1200 {
            ch.next_frame(&mut frame);
        }
        assert_eq!(ch.current_step(), 2);
        ch.retrigger();
        assert_eq!(ch.current_step(), 0);
    }
}
