//! Declarative processing order.
//!
//! A chain is a list of entries built once, off the audio thread. Each entry
//! names a stage and, optionally, the parameter that switches it on. The
//! engine walks the list every block; nothing is inserted or removed while
//! audio runs, only toggles change.

use crate::params::{ParamId, Parameters};
use crate::pedals::{
    BoostPedal, CentaurPedal, ChorusPedal, CompressorPedal, DelayPedal, DoublerPedal,
    OverdrivePedal, Pedal, ReverbPedal,
};

/// Pedal knob names paired with the store parameters that feed them.
pub type Bindings = &'static [(&'static str, ParamId)];

/// How an optional entry decides whether it runs this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Runs while a boolean parameter is set.
    Flag(ParamId),
    /// Runs while a continuous parameter is above zero.
    Positive(ParamId),
}

impl Toggle {
    #[inline]
    pub fn is_on(self, params: &Parameters) -> bool {
        match self {
            Self::Flag(id) => params.get_bool(id),
            Self::Positive(id) => params.get(id) > 0.0,
        }
    }
}

pub enum Stage {
    /// Plugin input gain.
    InputGain,
    InputMeter,
    Pedal {
        pedal: Box<dyn Pedal>,
        bindings: Bindings,
    },
    /// Gate, model, tone stack and amp output level on the mono signal.
    AmpSection,
    /// Copy channel 0 to every output channel. Stages before this one see a
    /// single channel; stages after it see all output channels.
    DualMono,
    /// Plugin output gain.
    OutputGain,
    SafetyLimiter,
    OutputMeter,
}

impl Stage {
    pub fn pedal(pedal: impl Pedal, bindings: Bindings) -> Self {
        Self::Pedal {
            pedal: Box::new(pedal),
            bindings,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InputGain => "input_gain",
            Self::InputMeter => "input_meter",
            Self::Pedal { pedal, .. } => pedal.name(),
            Self::AmpSection => "amp",
            Self::DualMono => "dual_mono",
            Self::OutputGain => "output_gain",
            Self::SafetyLimiter => "limiter",
            Self::OutputMeter => "output_meter",
        }
    }
}

pub struct ChainEntry {
    pub stage: Stage,
    pub enabled: Option<Toggle>,
}

impl ChainEntry {
    #[inline]
    pub fn is_enabled(&self, params: &Parameters) -> bool {
        self.enabled.is_none_or(|toggle| toggle.is_on(params))
    }
}

/// An ordered list of stages.
pub struct Chain {
    entries: Vec<ChainEntry>,
}

impl Chain {
    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ChainEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.stage.name())
    }
}

/// Builds a [`Chain`] in the order stages are added.
#[derive(Default)]
pub struct ChainBuilder {
    entries: Vec<ChainEntry>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the standard order.
    pub fn standard() -> Self {
        Self {
            entries: default_chain().entries,
        }
    }

    /// Append an always-on stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.entries.push(ChainEntry {
            stage,
            enabled: None,
        });
        self
    }

    /// Append a stage that runs only while `toggle` is on.
    pub fn optional(mut self, stage: Stage, toggle: Toggle) -> Self {
        self.entries.push(ChainEntry {
            stage,
            enabled: Some(toggle),
        });
        self
    }

    /// Swap the pedal called `name` for another implementation, keeping its
    /// position, bindings and toggle. Unknown names leave the chain as is.
    pub fn replace_pedal(mut self, name: &str, replacement: Box<dyn Pedal>) -> Self {
        let found = self
            .entries
            .iter_mut()
            .find(|e| matches!(&e.stage, Stage::Pedal { pedal, .. } if pedal.name() == name));
        if let Some(entry) = found
            && let Stage::Pedal { pedal, .. } = &mut entry.stage
        {
            *pedal = replacement;
        }
        self
    }

    /// Drop every stage called `name`.
    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|e| e.stage.name() != name);
        self
    }

    pub fn build(self) -> Chain {
        Chain {
            entries: self.entries,
        }
    }
}

const COMPRESSOR: Bindings = &[
    ("volume", ParamId::CompVolume),
    ("attack", ParamId::CompAttack),
    ("sustain", ParamId::CompSustain),
];
const BOOST: Bindings = &[("volume", ParamId::BoostVolume)];
const OVERDRIVE: Bindings = &[
    ("drive", ParamId::OverdriveDrive),
    ("tone", ParamId::OverdriveTone),
    ("level", ParamId::OverdriveLevel),
];
const CENTAUR: Bindings = &[
    ("gain", ParamId::CentaurGain),
    ("treble", ParamId::CentaurTreble),
    ("level", ParamId::CentaurLevel),
];
const DOUBLER: Bindings = &[("spread", ParamId::DoublerSpread)];
const CHORUS: Bindings = &[
    ("rate", ParamId::ChorusRate),
    ("depth", ParamId::ChorusDepth),
    ("mix", ParamId::ChorusMix),
];
const DELAY: Bindings = &[
    ("time", ParamId::DelayTime),
    ("feedback", ParamId::DelayFeedback),
    ("mix", ParamId::DelayMix),
];
const REVERB: Bindings = &[
    ("mix", ParamId::ReverbMix),
    ("tone", ParamId::ReverbTone),
    ("size", ParamId::ReverbSize),
];

/// The standard signal path.
pub fn default_chain() -> Chain {
    use ParamId::*;
    use Toggle::{Flag, Positive};

    ChainBuilder::new()
        .stage(Stage::InputGain)
        .stage(Stage::InputMeter)
        .optional(Stage::pedal(CompressorPedal::new(), COMPRESSOR), Flag(CompEnabled))
        .optional(Stage::pedal(BoostPedal::new(), BOOST), Flag(BoostEnabled))
        .optional(Stage::pedal(OverdrivePedal::new(), OVERDRIVE), Flag(OverdriveEnabled))
        .optional(Stage::pedal(CentaurPedal::new(), CENTAUR), Flag(CentaurEnabled))
        .stage(Stage::AmpSection)
        .stage(Stage::DualMono)
        .optional(Stage::pedal(DoublerPedal::new(), DOUBLER), Positive(DoublerSpread))
        .optional(Stage::pedal(ChorusPedal::new(), CHORUS), Flag(ChorusEnabled))
        .optional(Stage::pedal(DelayPedal::new(), DELAY), Flag(DelayEnabled))
        .optional(Stage::pedal(ReverbPedal::new(), REVERB), Flag(ReverbEnabled))
        .stage(Stage::OutputGain)
        .stage(Stage::SafetyLimiter)
        .stage(Stage::OutputMeter)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order() {
        let chain = default_chain();
        let names: Vec<_> = chain.names().collect();
        assert_eq!(
            names,
            [
                "input_gain",
                "input_meter",
                "compressor",
                "boost",
                "overdrive",
                "centaur",
                "amp",
                "dual_mono",
                "doubler",
                "chorus",
                "delay",
                "reverb",
                "output_gain",
                "limiter",
                "output_meter",
            ]
        );
    }

    #[test]
    fn pedals_start_disabled() {
        let chain = default_chain();
        let params = Parameters::new();
        for entry in chain.entries() {
            let is_pedal = matches!(entry.stage, Stage::Pedal { .. });
            assert_eq!(
                entry.is_enabled(&params),
                !is_pedal,
                "{} has the wrong default state",
                entry.stage.name()
            );
        }
    }

    #[test]
    fn bindings_match_pedal_parameters() {
        let mut chain = default_chain();
        for entry in chain.entries_mut() {
            if let Stage::Pedal { pedal, bindings } = &mut entry.stage {
                for (name, id) in bindings.iter() {
                    assert!(
                        pedal.set_parameter(name, id.spec().default).is_ok(),
                        "{} does not accept {name}",
                        pedal.name()
                    );
                }
            }
        }
    }

    #[test]
    fn doubler_follows_spread() {
        let params = Parameters::new();
        let toggle = Toggle::Positive(ParamId::DoublerSpread);
        assert!(!toggle.is_on(&params));
        params.set(ParamId::DoublerSpread, 8.0);
        assert!(toggle.is_on(&params));
    }

    #[test]
    fn replace_pedal_keeps_position_and_toggle() {
        let chain = ChainBuilder::standard()
            .replace_pedal("overdrive", Box::new(BoostPedal::new()))
            .build();
        let entry = &chain.entries()[4];
        assert_eq!(entry.stage.name(), "boost");
        assert_eq!(entry.enabled, Some(Toggle::Flag(ParamId::OverdriveEnabled)));
    }

    #[test]
    fn without_removes_a_stage() {
        let chain = ChainBuilder::standard().without("overdrive").build();
        assert_eq!(chain.len(), default_chain().len() - 1);
        assert!(chain.names().all(|n| n != "overdrive"));
    }
}
