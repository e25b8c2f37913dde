use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Quietest level the envelope can report, in dB.
pub const MIN_LOUDNESS_DB: f64 = -120.0;
/// `MIN_LOUDNESS_DB` as power.
pub const MIN_LOUDNESS_POWER: f64 = 1.0e-12;
const MAX_LOUDNESS_POWER: f64 = 1000.0;

/// Reductions closer to 0 dB than this count as fully open.
pub const SNAP_DB: f64 = 1.0e-6;

/// Trigger settings. Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerParams {
    pub time: f64,
    pub threshold_db: f64,
    pub ratio: f64,
    pub open_time: f64,
    pub hold_time: f64,
    pub close_time: f64,
}

impl Default for TriggerParams {
    fn default() -> Self {
        Self {
            time: 0.05,
            threshold_db: -60.0,
            ratio: 1.5,
            open_time: 0.002,
            hold_time: 0.050,
            close_time: 0.050,
        }
    }
}

impl TriggerParams {
    /// The amp section's gate: fast envelope, gentle knee.
    pub fn noise_gate(threshold_db: f64) -> Self {
        Self {
            time: 0.01,
            threshold_db,
            ratio: 0.1,
            open_time: 0.005,
            hold_time: 0.01,
            close_time: 0.05,
        }
    }

    /// Quadratic knee below threshold, 0 dB above.
    #[inline]
    pub fn gain_reduction(&self, level_db: f64) -> f64 {
        if level_db < self.threshold_db {
            let over = level_db - self.threshold_db;
            -self.ratio * over * over
        } else {
            0.0
        }
    }

    #[inline]
    pub fn max_gain_reduction(&self) -> f64 {
        self.gain_reduction(MIN_LOUDNESS_DB)
    }

    fn sanitized(mut self) -> Self {
        const MIN_TIME: f64 = 1.0e-6;
        self.time = self.time.max(MIN_TIME);
        self.open_time = self.open_time.max(MIN_TIME);
        self.close_time = self.close_time.max(MIN_TIME);
        self.hold_time = self.hold_time.max(0.0);
        self.ratio = self.ratio.max(0.0);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Moving,
    Holding,
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    level: f64,
    mode: GateMode,
    reduction_db: f64,
    time_held: f64,
}

impl ChannelState {
    fn closed(max_reduction: f64) -> Self {
        Self {
            level: MIN_LOUDNESS_POWER,
            mode: GateMode::Moving,
            reduction_db: max_reduction,
            time_held: 0.0,
        }
    }
}

/// Hysteretic noise gate detector.
///
/// Computes a per-sample gain reduction for each channel and leaves the
/// audio untouched; the reduction is read back with `gain_reduction_db`.
pub struct Trigger {
    params: TriggerParams,
    sample_rate: f64,
    channels: Vec<ChannelState>,
    gain_reduction: Vec<Vec<f32>>,
    frames: usize,
    gating: bool,
    gating_flag: Arc<AtomicBool>,
}

impl Trigger {
    pub fn new(params: TriggerParams, sample_rate: f64, num_channels: usize, max_frames: usize) -> Self {
        let mut trigger = Self {
            params: params.sanitized(),
            sample_rate,
            channels: Vec::new(),
            gain_reduction: Vec::new(),
            frames: 0,
            gating: false,
            gating_flag: Arc::new(AtomicBool::new(false)),
        };
        trigger.prepare(sample_rate, num_channels, max_frames);
        trigger
    }

    /// Resize for a session. Channel state resets only when the channel
    /// count changes. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, num_channels: usize, max_frames: usize) {
        self.sample_rate = sample_rate;
        let max_reduction = self.params.max_gain_reduction() as f32;

        if num_channels != self.channels.len() {
            self.channels = vec![ChannelState::closed(f64::from(max_reduction)); num_channels];
            self.gain_reduction = vec![vec![max_reduction; max_frames]; num_channels];
        } else {
            for buffer in &mut self.gain_reduction {
                buffer.clear();
                buffer.resize(max_frames, max_reduction);
            }
        }
        self.frames = 0;
    }

    /// Return every channel to its initial closed state.
    pub fn reset(&mut self) {
        let max_reduction = self.params.max_gain_reduction();
        self.channels.fill(ChannelState::closed(max_reduction));
        for buffer in &mut self.gain_reduction {
            buffer.fill(max_reduction as f32);
        }
        self.set_gating(false);
    }

    pub fn params(&self) -> TriggerParams {
        self.params
    }

    /// Swap in a new parameter set. Takes effect from the next sample.
    #[inline]
    pub fn set_params(&mut self, params: TriggerParams) {
        self.params = params.sanitized();
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn mode(&self, channel: usize) -> GateMode {
        self.channels[channel].mode
    }

    pub fn current_reduction_db(&self, channel: usize) -> f64 {
        self.channels[channel].reduction_db
    }

    /// Whether the gate was closing at the end of the last block.
    pub fn is_gating(&self) -> bool {
        self.gating
    }

    /// Shared flag for readers on other threads.
    pub fn gating_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.gating_flag)
    }

    /// Gain reduction in dB for each sample of the last block on `channel`.
    pub fn gain_reduction_db(&self, channel: usize) -> &[f32] {
        &self.gain_reduction[channel][..self.frames]
    }

    /// Analyse one block of `channel`.
    pub fn process(&mut self, channel: usize, samples: &[f32]) {
        let frames = samples.len();
        let capacity = self.gain_reduction[channel].len();
        assert!(
            frames <= capacity,
            "block of {frames} frames exceeds gate capacity {capacity}"
        );

        let params = self.params;
        let max_reduction = params.max_gain_reduction();
        if frames != self.frames {
            self.gain_reduction[channel].fill(max_reduction as f32);
            self.frames = frames;
        }

        let alpha = 0.5f64.powf(1.0 / (params.time * self.sample_rate));
        let beta = 1.0 - alpha;
        let dt = 1.0 / self.sample_rate;
        // Per-sample movement limits: full travel in open_time / close_time.
        let d_open = -max_reduction / params.open_time * dt;
        let d_close = max_reduction / params.close_time * dt;

        let state = &mut self.channels[channel];
        let output = &mut self.gain_reduction[channel][..frames];
        let mut gating = self.gating;

        for (input, reduction) in samples.iter().zip(output.iter_mut()) {
            let x = f64::from(*input);
            state.level = alpha
                .mul_add(state.level, beta * x * x)
                .clamp(MIN_LOUDNESS_POWER, MAX_LOUDNESS_POWER);
            let level_db = 10.0 * state.level.log10();

            match state.mode {
                GateMode::Holding => {
                    state.reduction_db = 0.0;
                    if level_db < params.threshold_db {
                        state.time_held += dt;
                        if state.time_held >= params.hold_time {
                            state.mode = GateMode::Moving;
                        }
                    } else {
                        state.time_held = 0.0;
                    }
                }
                GateMode::Moving => {
                    let target = params.gain_reduction(level_db);
                    if target > state.reduction_db {
                        let step = (0.5 * (target - state.reduction_db)).clamp(0.0, d_open);
                        state.reduction_db += step;
                        if state.reduction_db >= -SNAP_DB {
                            state.reduction_db = 0.0;
                            state.mode = GateMode::Holding;
                            state.time_held = 0.0;
                            gating = false;
                        }
                        if level_db > params.threshold_db {
                            gating = false;
                        }
                    } else if target < state.reduction_db {
                        let step = (0.5 * (target - state.reduction_db)).clamp(d_close, 0.0);
                        state.reduction_db = (state.reduction_db + step).max(max_reduction);
                        gating = true;
                    }
                }
            }

            *reduction = state.reduction_db as f32;
        }

        self.set_gating(gating);
    }

    #[inline]
    fn set_gating(&mut self, gating: bool) {
        self.gating = gating;
        self.gating_flag.store(gating, Ordering::Relaxed);
    }
}
