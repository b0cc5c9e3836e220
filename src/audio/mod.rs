pub mod capture;
pub mod codec;
pub mod playback;
pub mod resample;
pub mod scheduler;

/// Sample rate of microphone audio on the wire.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of model audio arriving from the live endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Samples per captured frame.
pub const FRAME_SIZE: usize = 4096;

/// A fixed-length block of normalized mono samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Decoded, de-interleaved audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a buffer from per-channel sample vectors of equal length.
    #[must_use]
    pub const fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    #[must_use]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel).
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Average all channels down to one.
    #[must_use]
    pub fn mixdown(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_duration_follows_rate() {
        let buffer = AudioBuffer::mono(OUTPUT_SAMPLE_RATE, vec![0.0; 12000]);
        assert!((buffer.duration() - 0.5).abs() < f64::EPSILON);
        assert_eq!(buffer.frames(), 12000);
    }

    #[test]
    fn mixdown_averages_channels() {
        let buffer = AudioBuffer::new(24000, vec![vec![1.0, 0.0], vec![0.0, -1.0]]);
        assert_eq!(buffer.mixdown(), vec![0.5, -0.5]);
    }

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(vec![0.0; FRAME_SIZE], INPUT_SAMPLE_RATE);
        assert!((frame.duration_secs() - 0.256).abs() < 1e-9);
    }
}
