//! Offline rendering: WAV in, engine, WAV out.

use anyhow::{Context, Result, anyhow, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use std::path::Path;

use crate::audio::engine::Engine;

/// Mono samples and sample rate of a WAV file. Multi-channel files are
/// averaged down to one channel.
pub fn read_mono_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path).context("Failed to open WAV file")?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 {
        bail!("WAV file has no channels");
    }

    let interleaved: Vec<f32> = if spec.sample_format == SampleFormat::Float {
        reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read float samples")?
    } else {
        let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
        reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / max_val))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read int samples")?
    };

    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    debug!(
        "Read {:?}: {} Hz, {} channels, {} frames",
        path,
        spec.sample_rate,
        channels,
        interleaved.len() / channels
    );
    Ok((mono, spec.sample_rate))
}

/// Write planar channels as a 32-bit float WAV.
pub fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> Result<()> {
    let num_channels =
        u16::try_from(channels.len()).map_err(|_| anyhow!("too many output channels"))?;
    if num_channels == 0 {
        bail!("nothing to write");
    }
    let spec = WavSpec {
        channels: num_channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file '{}'", path.display()))?;
    let frames = channels[0].len();
    for n in 0..frames {
        for channel in channels {
            writer
                .write_sample(channel[n])
                .context("Failed to write sample")?;
        }
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Run `input` through `engine` block by block.
///
/// `tail` frames of silence are appended so delay and reverb can ring out.
/// When `compensate_latency` is set, the model's reported latency is trimmed
/// from the start of the result.
pub fn render(
    engine: &mut Engine,
    input: &[f32],
    tail: usize,
    latency: impl Fn() -> usize,
    compensate_latency: bool,
) -> Result<Vec<Vec<f32>>> {
    let block_size = engine.max_block_size();
    let num_channels = engine.num_channels();
    let total = input.len() + tail;

    let mut rendered = vec![Vec::with_capacity(total); num_channels];
    let mut scratch = vec![vec![0.0; block_size]; num_channels];
    let mut block = vec![0.0; block_size];

    let mut pos = 0;
    while pos < total {
        let frames = block_size.min(total - pos);
        for (i, sample) in block[..frames].iter_mut().enumerate() {
            *sample = input.get(pos + i).copied().unwrap_or(0.0);
        }

        let mut outputs: Vec<&mut [f32]> = scratch.iter_mut().map(|c| &mut c[..frames]).collect();
        engine.process(&block[..frames], &mut outputs)?;

        for (dest, src) in rendered.iter_mut().zip(&scratch) {
            dest.extend_from_slice(&src[..frames]);
        }
        pos += frames;
    }

    if compensate_latency {
        let latency = latency().min(total);
        if latency > 0 {
            info!("Trimming {latency} frames of model latency");
            for channel in &mut rendered {
                channel.drain(..latency);
            }
        }
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_round_trip_downmixes_to_mono() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stereo.wav");
        write_wav(&path, &[vec![0.5, 0.25], vec![0.1, -0.25]], 44_100)?;

        let (mono, rate) = read_mono_wav(&path)?;
        assert_eq!(rate, 44_100);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn reads_integer_wavs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec)?;
        writer.write_sample(16_384i16)?;
        writer.write_sample(-32_768i16)?;
        writer.finalize()?;

        let (mono, _) = read_mono_wav(&path)?;
        assert_eq!(mono, vec![0.5, -1.0]);
        Ok(())
    }

    #[test]
    fn render_covers_input_and_tail() -> Result<()> {
        let (mut engine, _handle) = Engine::new(48_000.0, 64, 2)?;
        let input = vec![0.1; 150];
        let out = render(&mut engine, &input, 50, || 0, true)?;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 200);
        assert_eq!(out[0], out[1]);
        Ok(())
    }
}
