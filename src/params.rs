//! Lock-free parameter store shared between the control and audio threads.
//!
//! Every parameter is a single atomic cell. The control thread writes values
//! as they arrive; the audio thread reads each one by value once per block.
//! There is no transactional grouping, so two parameters read within one block
//! may come from different edits.

use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;

/// Cache-line aligned atomic f32.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Threshold values below this disable the noise gate entirely.
pub const GATE_DISABLED_BELOW_DB: f32 = -100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ParamId {
    PluginInputGain,
    PluginOutputGain,
    AmpInputLevel,
    AmpOutputLevel,
    NoiseGateThreshold,
    GateTime,
    GateRatio,
    GateOpenTime,
    GateHoldTime,
    GateCloseTime,
    ToneBass,
    ToneMid,
    ToneTreble,
    ToneStackEnabled,
    OutputNormalize,
    CompEnabled,
    CompVolume,
    CompAttack,
    CompSustain,
    BoostEnabled,
    BoostVolume,
    OverdriveEnabled,
    OverdriveDrive,
    OverdriveTone,
    OverdriveLevel,
    CentaurEnabled,
    CentaurGain,
    CentaurTreble,
    CentaurLevel,
    DoublerSpread,
    ChorusEnabled,
    ChorusRate,
    ChorusDepth,
    ChorusMix,
    DelayEnabled,
    DelayTime,
    DelayFeedback,
    DelayMix,
    ReverbEnabled,
    ReverbMix,
    ReverbTone,
    ReverbSize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub id: ParamId,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamSpec {
    const fn new(id: ParamId, name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            id,
            name,
            min,
            max,
            default,
        }
    }

    const fn toggle(id: ParamId, name: &'static str, default: bool) -> Self {
        Self::new(id, name, 0.0, 1.0, if default { 1.0 } else { 0.0 })
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

pub const PARAM_COUNT: usize = ParamId::ReverbSize as usize + 1;

/// Indexed by `ParamId as usize`.
pub static PARAM_SPECS: [ParamSpec; PARAM_COUNT] = {
    use ParamId::*;
    [
        ParamSpec::new(PluginInputGain, "plugin_input", -20.0, 20.0, 0.0),
        ParamSpec::new(PluginOutputGain, "plugin_output", -20.0, 20.0, 0.0),
        ParamSpec::new(AmpInputLevel, "input", -20.0, 20.0, 0.0),
        ParamSpec::new(AmpOutputLevel, "output", -40.0, 40.0, 0.0),
        ParamSpec::new(NoiseGateThreshold, "gate_threshold", -101.0, 0.0, -80.0),
        ParamSpec::new(GateTime, "gate_time", 0.001, 1.0, 0.01),
        ParamSpec::new(GateRatio, "gate_ratio", 0.01, 10.0, 0.1),
        ParamSpec::new(GateOpenTime, "gate_open", 0.0005, 0.5, 0.005),
        ParamSpec::new(GateHoldTime, "gate_hold", 0.0, 1.0, 0.01),
        ParamSpec::new(GateCloseTime, "gate_close", 0.001, 1.0, 0.05),
        ParamSpec::new(ToneBass, "bass", 0.0, 10.0, 5.0),
        ParamSpec::new(ToneMid, "middle", 0.0, 10.0, 5.0),
        ParamSpec::new(ToneTreble, "treble", 0.0, 10.0, 5.0),
        ParamSpec::toggle(ToneStackEnabled, "tone_stack_on", true),
        ParamSpec::toggle(OutputNormalize, "normalize", true),
        ParamSpec::toggle(CompEnabled, "comp_enabled", false),
        ParamSpec::new(CompVolume, "comp_volume", 0.0, 10.0, 5.0),
        ParamSpec::new(CompAttack, "comp_attack", 5.0, 50.0, 26.38),
        ParamSpec::new(CompSustain, "comp_sustain", 50.0, 500.0, 263.75),
        ParamSpec::toggle(BoostEnabled, "boost_enabled", false),
        ParamSpec::new(BoostVolume, "boost_volume", 0.0, 10.0, 5.0),
        ParamSpec::toggle(OverdriveEnabled, "od_enabled", false),
        ParamSpec::new(OverdriveDrive, "od_drive", 0.0, 10.0, 5.0),
        ParamSpec::new(OverdriveTone, "od_tone", 0.0, 10.0, 5.0),
        ParamSpec::new(OverdriveLevel, "od_level", 0.0, 10.0, 5.0),
        ParamSpec::toggle(CentaurEnabled, "centaur_enabled", false),
        ParamSpec::new(CentaurGain, "centaur_gain", 0.0, 10.0, 5.0),
        ParamSpec::new(CentaurTreble, "centaur_treble", 0.0, 10.0, 5.0),
        ParamSpec::new(CentaurLevel, "centaur_level", 0.0, 10.0, 5.0),
        ParamSpec::new(DoublerSpread, "doubler_spread", 0.0, 20.0, 0.0),
        ParamSpec::toggle(ChorusEnabled, "chorus_enabled", false),
        ParamSpec::new(ChorusRate, "chorus_rate", 0.3, 3.0, 1.6),
        ParamSpec::new(ChorusDepth, "chorus_depth", 0.01, 0.05, 0.03),
        ParamSpec::new(ChorusMix, "chorus_mix", 0.0, 100.0, 50.0),
        ParamSpec::toggle(DelayEnabled, "delay_enabled", false),
        ParamSpec::new(DelayTime, "delay_time", 1.0, 997.0, 499.0),
        ParamSpec::new(DelayFeedback, "delay_feedback", 0.0, 1.0, 0.5),
        ParamSpec::new(DelayMix, "delay_mix", 0.0, 1.0, 0.5),
        ParamSpec::toggle(ReverbEnabled, "reverb_enabled", false),
        ParamSpec::new(ReverbMix, "reverb_mix", 0.0, 10.0, 5.0),
        ParamSpec::new(ReverbTone, "reverb_tone", 0.0, 10.0, 5.0),
        ParamSpec::new(ReverbSize, "reverb_size", 0.0, 10.0, 5.0),
    ]
};

impl ParamId {
    pub fn spec(self) -> &'static ParamSpec {
        &PARAM_SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PARAM_SPECS.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn all() -> impl Iterator<Item = Self> {
        PARAM_SPECS.iter().map(|s| s.id)
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The shared store. Wrap in an `Arc` to share between threads.
pub struct Parameters {
    values: [AtomicFloat; PARAM_COUNT],
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|i| AtomicFloat::new(PARAM_SPECS[i].default)),
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value. Range checks happen on read.
    pub fn set(&self, id: ParamId, value: f32) {
        self.values[id as usize].set(value);
    }

    pub fn set_bool(&self, id: ParamId, value: bool) {
        self.set(id, if value { 1.0 } else { 0.0 });
    }

    /// Read a value clamped to the parameter's range.
    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        id.spec().clamp(self.values[id as usize].get())
    }

    #[inline]
    pub fn get_bool(&self, id: ParamId) -> bool {
        self.get(id) > 0.5
    }

    pub fn reset_to_defaults(&self) {
        for spec in &PARAM_SPECS {
            self.set(spec.id, spec.default);
        }
    }
}
