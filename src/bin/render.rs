use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use neuramp::audio::engine::Engine;
use neuramp::render::{read_mono_wav, render, write_wav};
use neuramp::settings::Settings;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "neuramp-render")]
#[command(version)]
#[command(about = "Render a WAV file through the neural amp and effect chain.")]
struct Args {
    /// Input WAV file (mixed down to mono)
    input: PathBuf,
    /// Output WAV file (32-bit float)
    output: PathBuf,
    #[arg(long, env = "NEURAMP_MODEL", help = "Model file to load")]
    model: Option<PathBuf>,
    #[arg(long, env = "NEURAMP_BLOCK_SIZE", help = "Processing block size")]
    block_size: Option<usize>,
    #[arg(long, default_value_t = 2, help = "Number of output channels")]
    channels: usize,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Seconds of silence appended for delay and reverb tails"
    )]
    tail: f64,
    #[arg(long, help = "Trim the model's latency from the start of the output")]
    compensate_latency: bool,
    #[arg(
        long = "set",
        value_name = "NAME=VALUE",
        help = "Override a parameter, e.g. --set gate_threshold=-60"
    )]
    overrides: Vec<String>,
    #[arg(long, help = "Ignore the saved settings file")]
    no_settings: bool,
}

fn parse_override(text: &str) -> Result<(&str, f32)> {
    let Some((name, value)) = text.split_once('=') else {
        bail!("expected NAME=VALUE, got '{text}'");
    };
    let value = value
        .trim()
        .parse::<f32>()
        .with_context(|| format!("invalid value for '{name}'"))?;
    Ok((name.trim(), value))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    info!("neuramp-render v{}", env!("CARGO_PKG_VERSION"));
    info!("Args: {args:?}");

    let settings = if args.no_settings {
        Settings::default()
    } else {
        Settings::load().unwrap_or_else(|e| {
            warn!("Failed to load settings, using defaults: {e:#}");
            Settings::default()
        })
    };
    info!("{settings}");

    let (input, sample_rate) = read_mono_wav(&args.input)
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    let block_size = args
        .block_size
        .unwrap_or(settings.audio.block_size as usize);

    let (mut engine, handle) = Engine::new(f64::from(sample_rate), block_size, args.channels)
        .context("failed to create engine")?;

    settings.apply_parameters(handle.parameters());
    for text in &args.overrides {
        let (name, value) = parse_override(text)?;
        handle.set_parameter_by_name(name, value)?;
    }

    if let Some(model) = args.model.clone().or_else(|| settings.last_model_path()) {
        handle
            .try_load_model(&model)
            .with_context(|| format!("failed to load model '{}'", model.display()))?;
        info!("Loaded model {}", model.display());
    } else {
        info!("No model given, rendering the effect chain only");
    }

    let tail = (args.tail.max(0.0) * f64::from(sample_rate)) as usize;
    let rendered = render(
        &mut engine,
        &input,
        tail,
        || handle.latency(),
        args.compensate_latency,
    )?;

    write_wav(&args.output, &rendered, sample_rate)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;

    let meter = handle.output_meter();
    info!(
        "Wrote {} frames to {} (output peak {:.1} dB)",
        rendered.first().map_or(0, Vec::len),
        args.output.display(),
        meter.peak_db
    );
    Ok(())
}
