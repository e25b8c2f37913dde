use std::sync::Arc;

use crate::audio::buffer::AudioBuffer;
use crate::params::AtomicFloat;

const CLIP_THRESHOLD: f32 = 0.95;
const SILENCE_DB: f32 = -100.0;

/// Block peak meter with a two second hold.
///
/// The audio thread publishes the held peak through a single atomic cell so
/// metering never allocates; the handle derives the dB value on read.
pub struct PeakMeter {
    current_peak: f32,
    samples_since_peak: usize,
    peak_hold_samples: usize,
    peak: Arc<AtomicFloat>,
}

#[derive(Clone)]
pub struct PeakMeterHandle {
    peak: Arc<AtomicFloat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakMeterInfo {
    pub peak_db: f32,
    pub peak_linear: f32,
    pub is_clipping: bool,
}

impl PeakMeter {
    pub fn new(sample_rate: usize) -> (Self, PeakMeterHandle) {
        let peak = Arc::new(AtomicFloat::new(0.0));

        (
            Self {
                current_peak: 0.0,
                samples_since_peak: 0,
                peak_hold_samples: sample_rate * 2,
                peak: Arc::clone(&peak),
            },
            PeakMeterHandle { peak },
        )
    }

    pub fn set_sample_rate(&mut self, sample_rate: usize) {
        self.peak_hold_samples = sample_rate * 2;
    }

    pub fn process(&mut self, buffer: &AudioBuffer) {
        let block_peak = (0..buffer.num_channels())
            .flat_map(|c| buffer.channel(c).iter())
            .map(|s| s.abs())
            .fold(0.0f32, f32::max);

        if block_peak > self.current_peak {
            self.current_peak = block_peak;
            self.samples_since_peak = 0;
        } else {
            self.samples_since_peak += buffer.frames();

            if self.samples_since_peak > self.peak_hold_samples {
                self.current_peak = block_peak;
                self.samples_since_peak = 0;
            }
        }

        self.peak.set(self.current_peak);
    }

    pub fn reset(&mut self) {
        self.current_peak = 0.0;
        self.samples_since_peak = 0;
        self.peak.set(0.0);
    }
}

impl PeakMeterHandle {
    pub fn get_info(&self) -> PeakMeterInfo {
        let peak_linear = self.peak.get();
        let peak_db = if peak_linear > 1e-5 {
            20.0 * peak_linear.log10()
        } else {
            SILENCE_DB
        };

        PeakMeterInfo {
            peak_db,
            peak_linear,
            is_clipping: peak_linear >= CLIP_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const TEST_SAMPLE_RATE: usize = 48_000;

    fn block(value: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(2, 128);
        for channel in buffer.channels_mut() {
            channel.fill(value);
        }
        buffer
    }

    #[test]
    fn test_peak_meter_detects_peaks() {
        let (mut meter, handle) = PeakMeter::new(TEST_SAMPLE_RATE);

        meter.process(&block(0.0));

        let info = handle.get_info();
        assert!(info.peak_linear < 0.01);
        assert_eq!(info.peak_db, SILENCE_DB);
        assert!(!info.is_clipping);

        meter.process(&block(0.8));

        let info = handle.get_info();
        assert!((info.peak_linear - 0.8).abs() < 0.01);
        assert!(!info.is_clipping);

        meter.process(&block(0.99));

        let info = handle.get_info();
        assert!(info.is_clipping);
        assert!(info.peak_linear > 0.95);
    }

    #[test]
    fn test_peak_meter_holds_peak() {
        let (mut meter, handle) = PeakMeter::new(TEST_SAMPLE_RATE);

        meter.process(&block(0.8));
        meter.process(&block(0.2));

        let info = handle.get_info();
        assert!(info.peak_linear > 0.7);
    }

    #[test]
    fn test_peak_meter_releases_after_hold() {
        let (mut meter, handle) = PeakMeter::new(1_000);

        meter.process(&block(0.8));
        // 2 s hold at 1 kHz = 2000 samples; 16 blocks of 128 exceed it.
        for _ in 0..16 {
            meter.process(&block(0.1));
        }

        let info = handle.get_info();
        assert!((info.peak_linear - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_reset_clears_peak() {
        let (mut meter, handle) = PeakMeter::new(TEST_SAMPLE_RATE);
        meter.process(&block(0.5));
        meter.reset();
        assert_eq!(handle.get_info().peak_linear, 0.0);
    }
}
