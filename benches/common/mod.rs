#![allow(dead_code)]

use neuramp::audio::engine::{Engine, EngineHandle};
use neuramp::model::LinearModel;
use neuramp::params::ParamId;

pub const PEDAL_TOGGLES: [ParamId; 7] = [
    ParamId::CompEnabled,
    ParamId::BoostEnabled,
    ParamId::OverdriveEnabled,
    ParamId::CentaurEnabled,
    ParamId::ChorusEnabled,
    ParamId::DelayEnabled,
    ParamId::ReverbEnabled,
];

/// A short FIR standing in for a neural model, tagged with `model_rate`.
pub fn test_model(taps: usize, model_rate: f64) -> LinearModel {
    let weights = (0..taps)
        .map(|i| 0.6 * (-(i as f32) / taps as f32 * 4.0).exp())
        .collect();
    LinearModel::new(weights, 0.0, Some(model_rate), Some(-18.0)).unwrap()
}

pub fn build_engine(host_rate: f64, block_size: usize) -> (Engine, EngineHandle) {
    Engine::new(host_rate, block_size, 2).unwrap()
}

pub fn enable_all_pedals(handle: &EngineHandle) {
    for id in PEDAL_TOGGLES {
        handle.set_parameter(id, 1.0);
    }
    handle.set_parameter(ParamId::DoublerSpread, 10.0);
}

pub fn guitar_like_input(len: usize, sample_rate: f64) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let t = n as f32 / sample_rate as f32;
            let decay = (-t * 3.0).exp();
            let freq = 110.0 * 2.0 * std::f32::consts::PI;
            0.5 * decay * ((freq * t).sin() + 0.3 * (2.0 * freq * t).sin())
        })
        .collect()
}
