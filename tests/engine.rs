use anyhow::Result;
use std::f32::consts::PI;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use neuramp::audio::buffer::AudioBuffer;
use neuramp::audio::engine::{Engine, EngineHandle};
use neuramp::audio::limiter::SafetyLimiter;
use neuramp::chain::ChainBuilder;
use neuramp::model::TARGET_LOUDNESS_DB;
use neuramp::params::ParamId;
use neuramp::pedals::{Pedal, ProcessSpec};

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK: usize = 480;

fn sine(frames: usize, freq: f32, amplitude: f32, rate: f32) -> Vec<f32> {
    (0..frames)
        .map(|n| amplitude * (2.0 * PI * freq * n as f32 / rate).sin())
        .collect()
}

fn run_block(engine: &mut Engine, input: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
    let mut left = vec![0.0; input.len()];
    let mut right = vec![0.0; input.len()];
    engine.process(input, &mut [&mut left[..], &mut right[..]])?;
    Ok((left, right))
}

fn linear_model_json(weights: &[f32], sample_rate: Option<u32>, loudness: Option<f64>) -> String {
    let weights = weights
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let rate = sample_rate.map_or(String::new(), |r| format!(r#", "sample_rate": {r}"#));
    let metadata = loudness.map_or(String::new(), |l| {
        format!(r#", "metadata": {{ "loudness": {l} }}"#)
    });
    format!(
        r#"{{
            "version": "0.5.4",
            "architecture": "Linear",
            "config": {{ "receptive_field": {}, "bias": false }},
            "weights": [{weights}]{rate}{metadata}
        }}"#,
        weights.split(',').count()
    )
}

fn write_model(json: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".nam").tempfile()?;
    file.write_all(json.as_bytes())?;
    Ok(file)
}

fn quiet_amp(handle: &EngineHandle) {
    handle.set_parameter(ParamId::NoiseGateThreshold, -101.0);
    handle.set_parameter(ParamId::ToneStackEnabled, 0.0);
}

#[test]
fn scenario_a_open_gate_no_model_only_gains_apply() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, BLOCK, 2)?;
    assert_eq!(handle.parameter(ParamId::NoiseGateThreshold), -80.0);
    handle.set_parameter(ParamId::PluginInputGain, 6.0);
    handle.set_parameter(ParamId::PluginOutputGain, -3.0);

    let input = sine(BLOCK, 220.0, 0.2, SAMPLE_RATE as f32);
    // Let the gate open.
    for _ in 0..20 {
        run_block(&mut engine, &input)?;
    }
    let (left, right) = run_block(&mut engine, &input)?;

    let gain = 10f32.powf(6.0 / 20.0) * 10f32.powf(-3.0 / 20.0);
    let limiter = SafetyLimiter::default();
    for (n, (x, y)) in input.iter().zip(&left).enumerate() {
        let expected = limiter.process_sample(x * gain);
        assert!(
            (expected - y).abs() < 1e-4,
            "sample {n}: expected {expected}, got {y}"
        );
    }
    assert_eq!(left, right);
    assert!(!handle.is_gating());
    Ok(())
}

#[test]
fn scenario_b_model_output_is_normalised_to_target() -> Result<()> {
    const LOUDNESS: f64 = -6.0;
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, BLOCK, 2)?;
    quiet_amp(&handle);

    let file = write_model(&linear_model_json(&[1.0], Some(48_000), Some(LOUDNESS)))?;
    assert!(handle.load_model(file.path()));
    assert!(!handle.is_model_loaded(), "promotion happens on the audio thread");

    run_block(&mut engine, &vec![0.0; BLOCK])?;
    assert!(handle.is_model_loaded());
    assert_eq!(handle.latency(), 0);

    let input = sine(BLOCK, 1_000.0, 0.5, SAMPLE_RATE as f32);
    let (left, _) = run_block(&mut engine, &input)?;

    let normalised = 0.5 * 10f32.powf(((TARGET_LOUDNESS_DB - LOUDNESS) / 20.0) as f32);
    let expected = SafetyLimiter::default().process_sample(normalised);
    let peak = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(
        (peak - expected).abs() < 1e-3,
        "peak {peak}, expected {expected}"
    );
    Ok(())
}

#[test]
fn normalisation_can_be_disabled() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, BLOCK, 2)?;
    quiet_amp(&handle);
    handle.set_parameter(ParamId::OutputNormalize, 0.0);
    assert!(handle.load_model_from_bytes(
        linear_model_json(&[1.0], Some(48_000), Some(-6.0)).as_bytes()
    ));

    run_block(&mut engine, &vec![0.0; BLOCK])?;
    let (left, _) = run_block(&mut engine, &vec![0.25; BLOCK])?;
    let expected = SafetyLimiter::default().process_sample(0.25);
    assert!(left.iter().all(|s| (s - expected).abs() < 1e-6));
    Ok(())
}

/// Multiplies by a fixed gain and counts `process` calls.
struct CountingPedal {
    name: &'static str,
    gain: f32,
    calls: Arc<AtomicUsize>,
}

impl CountingPedal {
    fn new(name: &'static str, gain: f32) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                gain,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl Pedal for CountingPedal {
    fn name(&self) -> &'static str {
        self.name
    }

    fn prepare(&mut self, _spec: &ProcessSpec) {}

    fn set_parameter(&mut self, _name: &str, _value: f32) -> Result<(), &'static str> {
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        buffer.apply_gain(self.gain);
    }
}

#[test]
fn scenario_c_disabled_pedal_is_never_invoked() -> Result<()> {
    let (compressor, comp_calls) = CountingPedal::new("stub_compressor", 0.5);
    let (overdrive, od_calls) = CountingPedal::new("stub_overdrive", 3.0);
    let (reverb, reverb_calls) = CountingPedal::new("stub_reverb", 0.8);
    let chain = ChainBuilder::standard()
        .replace_pedal("compressor", Box::new(compressor))
        .replace_pedal("overdrive", Box::new(overdrive))
        .replace_pedal("reverb", Box::new(reverb))
        .build();
    let (mut engine, handle) = Engine::with_chain(SAMPLE_RATE, 64, 2, chain)?;
    quiet_amp(&handle);
    handle.set_parameter(ParamId::CompEnabled, 1.0);
    handle.set_parameter(ParamId::OverdriveEnabled, 1.0);
    handle.set_parameter(ParamId::ReverbEnabled, 1.0);

    let input = vec![0.1; 64];
    let limiter = SafetyLimiter::default();

    let (left, _) = run_block(&mut engine, &input)?;
    let expected = limiter.process_sample(0.1 * 0.5 * 3.0 * 0.8);
    assert!(left.iter().all(|s| (s - expected).abs() < 1e-6));
    assert_eq!(od_calls.load(Ordering::Relaxed), 1);

    handle.set_parameter(ParamId::OverdriveEnabled, 0.0);
    for _ in 0..5 {
        let (left, _) = run_block(&mut engine, &input)?;
        let expected = limiter.process_sample(0.1 * 0.5 * 0.8);
        assert!(left.iter().all(|s| (s - expected).abs() < 1e-6));
    }
    assert_eq!(od_calls.load(Ordering::Relaxed), 1);
    assert_eq!(comp_calls.load(Ordering::Relaxed), 6);
    assert_eq!(reverb_calls.load(Ordering::Relaxed), 6);
    Ok(())
}

#[test]
fn disabled_stage_matches_chain_without_it() -> Result<()> {
    let (overdrive, od_calls) = CountingPedal::new("stub_overdrive", 3.0);
    let with_stub = ChainBuilder::standard()
        .replace_pedal("overdrive", Box::new(overdrive))
        .build();
    let without = ChainBuilder::standard().without("overdrive").build();

    let (mut a, handle_a) = Engine::with_chain(SAMPLE_RATE, BLOCK, 2, with_stub)?;
    let (mut b, handle_b) = Engine::with_chain(SAMPLE_RATE, BLOCK, 2, without)?;
    for handle in [&handle_a, &handle_b] {
        handle.set_parameter(ParamId::CompEnabled, 1.0);
        handle.set_parameter(ParamId::ReverbEnabled, 1.0);
    }

    for block in 0..10 {
        let input = sine(BLOCK, 110.0 * (block + 1) as f32, 0.3, SAMPLE_RATE as f32);
        assert_eq!(run_block(&mut a, &input)?, run_block(&mut b, &input)?);
    }
    assert_eq!(od_calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[test]
fn malformed_model_leaves_state_unchanged() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, 64, 2)?;
    quiet_amp(&handle);

    let bad = write_model(r#"{ "architecture": "Linear", "weights": "nope" }"#)?;
    assert!(!handle.load_model(bad.path()));
    assert!(!handle.load_model("/definitely/not/here.nam"));
    let overflowing = r#"{
        "architecture": "Linear",
        "config": { "receptive_field": 18446744073709551615, "bias": true },
        "weights": [1.0]
    }"#;
    assert!(!handle.load_model_from_bytes(overflowing.as_bytes()));
    run_block(&mut engine, &[0.0; 64])?;
    assert!(!handle.is_model_loaded());

    assert!(handle.load_model_from_bytes(linear_model_json(&[0.5], Some(48_000), None).as_bytes()));
    run_block(&mut engine, &[0.0; 64])?;
    assert!(handle.is_model_loaded());

    assert!(!handle.load_model(bad.path()));
    let (left, _) = run_block(&mut engine, &[0.4; 64])?;
    assert!(handle.is_model_loaded());
    let expected = SafetyLimiter::default().process_sample(0.2);
    assert!(left.iter().all(|s| (s - expected).abs() < 1e-6));
    Ok(())
}

#[test]
fn model_loaded_before_prepare_survives_the_format_change() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, 64, 2)?;
    quiet_amp(&handle);

    assert!(handle.load_model_from_bytes(linear_model_json(&[0.5], Some(48_000), None).as_bytes()));
    engine.prepare(44_100.0, 128)?;
    let input = sine(128, 440.0, 0.3, 44_100.0);
    run_block(&mut engine, &input)?;
    assert!(handle.is_model_loaded());
    assert!(handle.latency() > 0);
    Ok(())
}

#[test]
fn newer_model_replaces_live_model() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, 64, 2)?;
    quiet_amp(&handle);

    assert!(handle.load_model_from_bytes(linear_model_json(&[0.5], Some(48_000), None).as_bytes()));
    run_block(&mut engine, &[0.0; 64])?;
    assert!(handle.load_model_from_bytes(linear_model_json(&[0.25], Some(48_000), None).as_bytes()));

    let (left, _) = run_block(&mut engine, &[0.4; 64])?;
    let expected = SafetyLimiter::default().process_sample(0.1);
    assert!(left.iter().all(|s| (s - expected).abs() < 1e-6));
    Ok(())
}

#[test]
fn clear_model_returns_to_passthrough() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, 64, 2)?;
    quiet_amp(&handle);

    assert!(handle.load_model_from_bytes(linear_model_json(&[0.5], Some(48_000), None).as_bytes()));
    run_block(&mut engine, &[0.0; 64])?;
    assert!(handle.is_model_loaded());

    handle.clear_model();
    assert!(handle.is_model_loaded(), "removal is applied on the next block");
    let (left, _) = run_block(&mut engine, &[0.4; 64])?;
    assert!(!handle.is_model_loaded());
    let expected = SafetyLimiter::default().process_sample(0.4);
    assert!(left.iter().all(|s| (s - expected).abs() < 1e-6));
    Ok(())
}

#[test]
fn gate_reports_gating_on_silence_and_reopens() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, BLOCK, 2)?;
    handle.set_parameter(ParamId::NoiseGateThreshold, -40.0);

    let loud = sine(BLOCK, 220.0, 0.5, SAMPLE_RATE as f32);
    for _ in 0..10 {
        run_block(&mut engine, &loud)?;
    }
    assert!(!handle.is_gating());

    for _ in 0..20 {
        run_block(&mut engine, &vec![0.0; BLOCK])?;
    }
    assert!(handle.is_gating());

    for _ in 0..10 {
        run_block(&mut engine, &loud)?;
    }
    assert!(!handle.is_gating());

    handle.set_parameter(ParamId::NoiseGateThreshold, -101.0);
    for _ in 0..20 {
        run_block(&mut engine, &vec![0.0; BLOCK])?;
    }
    assert!(!handle.is_gating(), "a disabled gate never reports gating");
    Ok(())
}

#[test]
fn resampled_model_keeps_level_and_reports_latency() -> Result<()> {
    const HOST_RATE: f64 = 44_100.0;
    const FRAMES: usize = 256;
    let (mut engine, handle) = Engine::new(HOST_RATE, FRAMES, 2)?;
    quiet_amp(&handle);
    handle.set_parameter(ParamId::OutputNormalize, 0.0);

    assert!(handle.load_model_from_bytes(linear_model_json(&[1.0], Some(48_000), None).as_bytes()));
    run_block(&mut engine, &[0.0; FRAMES])?;
    assert!(handle.is_model_loaded());
    let latency = handle.latency();
    assert!(latency > 0, "resampling must report latency");

    let input = sine(FRAMES * 40, 440.0, 0.5, HOST_RATE as f32);
    let mut output = Vec::with_capacity(input.len());
    for block in input.chunks(FRAMES) {
        let (left, _) = run_block(&mut engine, block)?;
        output.extend(left);
    }

    let settled = &output[latency + 2_048..];
    let peak = settled.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let expected = SafetyLimiter::default().process_sample(0.5);
    assert!(
        (peak - expected).abs() < 0.05,
        "peak {peak}, expected about {expected}"
    );
    Ok(())
}

#[test]
fn meters_follow_signal() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, 64, 2)?;
    quiet_amp(&handle);
    handle.set_parameter(ParamId::PluginOutputGain, -6.0);

    run_block(&mut engine, &[0.5; 64])?;
    let input = handle.input_meter();
    let output = handle.output_meter();
    assert!((input.peak_linear - 0.5).abs() < 1e-6);
    assert!(output.peak_linear < input.peak_linear);
    assert!(!output.is_clipping);
    Ok(())
}

#[test]
fn stereo_pedals_widen_after_dual_mono() -> Result<()> {
    let (mut engine, handle) = Engine::new(SAMPLE_RATE, BLOCK, 2)?;
    quiet_amp(&handle);
    handle.set_parameter(ParamId::DoublerSpread, 10.0);

    let input = sine(BLOCK, 330.0, 0.3, SAMPLE_RATE as f32);
    let (left, right) = run_block(&mut engine, &input)?;
    assert_ne!(left, right);
    Ok(())
}
