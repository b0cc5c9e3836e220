use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler as RubatoResampler};

use crate::error::{Result, TutorError};

const CHUNK_SIZE: usize = 1024;

/// Downmixes interleaved device audio and converts it to a fixed mono rate.
///
/// Input arrives in whatever block sizes the device callback produces; samples
/// that do not fill a whole resampler chunk are held until the next call.
pub struct Resampler {
    inner: Option<Fft<f32>>,
    channels: u16,
    pending: Vec<f32>,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(TutorError::Resample("device reported zero channels".to_string()));
        }

        let inner = if source_rate == target_rate {
            None
        } else {
            Some(
                Fft::new(
                    source_rate as usize,
                    target_rate as usize,
                    CHUNK_SIZE,
                    2,
                    1,
                    FixedSync::Input,
                )
                .map_err(|e| TutorError::Resample(format!("failed to create resampler: {e}")))?,
            )
        };

        Ok(Self {
            inner,
            channels,
            pending: Vec::new(),
        })
    }

    /// Convert one block of interleaved samples; may return fewer samples than
    /// the block's duration while the resampler fills.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let mono = downmix(interleaved, self.channels);

        let Some(resampler) = self.inner.as_mut() else {
            return Ok(mono);
        };

        self.pending.extend_from_slice(&mono);

        let mut output = Vec::new();
        let frames_needed = resampler.input_frames_next();

        while self.pending.len() >= frames_needed {
            let chunk: Vec<f32> = self.pending.drain(..frames_needed).collect();
            let input_data = vec![chunk];
            let input = SequentialSliceOfVecs::new(&input_data, 1, frames_needed)
                .map_err(|e| TutorError::Resample(format!("buffer error: {e}")))?;
            let result = resampler
                .process(&input, 0, None)
                .map_err(|e| TutorError::Resample(format!("resample error: {e}")))?;
            for frame in 0..result.frames() {
                output.push(result.read_sample(0, frame).unwrap_or(0.0));
            }
        }

        Ok(output)
    }
}

/// Average interleaved channels into mono.
#[must_use]
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels.max(1));
    if ch == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rate_passes_through() {
        let mut r = Resampler::new(16000, 16000, 1).unwrap_or_else(|e| panic!("{e}"));
        let input: Vec<f32> = (0..1600).map(|i| (i as f32 / 1600.0).sin()).collect();
        let output = r.process(&input).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output, input);
    }

    #[test]
    fn stereo_is_averaged() {
        assert_eq!(downmix(&[1.0, 0.0, -1.0, -0.5], 2), vec![0.5, -0.75]);
    }

    #[test]
    fn stereo_block_yields_mono_frames() {
        let mut r = Resampler::new(16000, 16000, 2).unwrap_or_else(|e| panic!("{e}"));
        let input: Vec<f32> = (0..3200).map(|i| i as f32 / 3200.0).collect();
        let output = r.process(&input).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output.len(), 1600);
    }

    #[test]
    fn downsampling_roughly_preserves_duration() {
        let mut r = Resampler::new(48000, 16000, 1).unwrap_or_else(|e| panic!("{e}"));
        let mut produced = 0;
        for _ in 0..50 {
            produced += r
                .process(&vec![0.0; 960])
                .unwrap_or_else(|e| panic!("{e}"))
                .len();
        }
        // One second of 48 kHz in, about one second of 16 kHz out, less what is still buffered.
        assert!(produced > 14000 && produced <= 16000, "produced {produced}");
    }

    #[test]
    fn zero_channels_rejected() {
        assert!(Resampler::new(48000, 16000, 0).is_err());
    }
}
