/// Fixed-channel audio buffer with a preallocated capacity.
///
/// The channel count and capacity are fixed when the buffer is created (at
/// prepare time); each block only changes the active frame count, so the
/// audio thread never reallocates.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    pub fn new(num_channels: usize, max_frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; max_frames]; num_channels],
            frames: max_frames,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Set the number of active frames for the current block.
    pub fn set_frames(&mut self, frames: usize) {
        assert!(
            frames <= self.capacity(),
            "block of {frames} frames exceeds buffer capacity {}",
            self.capacity()
        );
        self.frames = frames;
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index][..self.frames]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index][..self.frames]
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let frames = self.frames;
        self.channels.iter_mut().map(move |c| &mut c[..frames])
    }

    /// Borrow the first two channels mutably at once.
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let frames = self.frames;
        let (left, rest) = self.channels.split_at_mut(1);
        (&mut left[0][..frames], &mut rest[0][..frames])
    }

    pub fn clear(&mut self) {
        for channel in self.channels_mut() {
            channel.fill(0.0);
        }
    }

    pub fn apply_gain(&mut self, gain: f32) {
        if gain == 1.0 {
            return;
        }
        for channel in self.channels_mut() {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Copy channel 0 into every other channel ("dual mono").
    pub fn duplicate_first_channel(&mut self) {
        let frames = self.frames;
        if let Some((first, rest)) = self.channels.split_first_mut() {
            for channel in rest {
                channel[..frames].copy_from_slice(&first[..frames]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_mono_copies_first_channel() {
        let mut buffer = AudioBuffer::new(2, 4);
        buffer.channel_mut(0).copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        buffer.duplicate_first_channel();
        assert_eq!(buffer.channel(1), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn active_frames_limit_views() {
        let mut buffer = AudioBuffer::new(2, 8);
        buffer.set_frames(3);
        assert_eq!(buffer.channel(0).len(), 3);
        let (l, r) = buffer.stereo_mut();
        assert_eq!(l.len(), 3);
        assert_eq!(r.len(), 3);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer capacity")]
    fn oversized_block_is_rejected() {
        let mut buffer = AudioBuffer::new(1, 8);
        buffer.set_frames(9);
    }
}
