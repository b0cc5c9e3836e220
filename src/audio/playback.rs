use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};

use crate::audio::AudioBuffer;
use crate::audio::scheduler::{AudioOutput, UnitId};
use crate::config::AudioConfig;
use crate::error::{Result, TutorError};

/// Slack for float error when turning seconds into whole frames.
const FRAME_EPSILON: f64 = 1e-6;

/// First whole frame at or after `frames`. Starts and lengths both round this
/// way so a unit placed at the previous unit's end never shares a frame with it.
fn whole_frames(frames: f64) -> u64 {
    (frames - FRAME_EPSILON).ceil().max(0.0) as u64
}

struct Voice {
    id: UnitId,
    samples: Vec<f32>,
    /// Source samples advanced per device frame.
    step: f64,
    start_frame: u64,
}

impl Voice {
    /// Linearly interpolated sample at `clock`, or `None` before start / after end.
    fn sample_at(&self, clock: u64) -> Option<f32> {
        if clock < self.start_frame {
            return None;
        }
        let pos = (clock - self.start_frame) as f64 * self.step;
        let index = pos as usize;
        let current = *self.samples.get(index)?;
        let next = self.samples.get(index + 1).copied().unwrap_or(0.0);
        let frac = (pos - index as f64) as f32;
        Some(current + (next - current) * frac)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + whole_frames(self.samples.len() as f64 / self.step)
    }
}

/// Sums scheduled voices into the device buffer, one sample clock for all of them.
pub(crate) struct Mixer {
    rate: u32,
    clock: u64,
    voices: Vec<Voice>,
    finished: Vec<UnitId>,
}

impl Mixer {
    pub(crate) const fn new(rate: u32) -> Self {
        Self {
            rate,
            clock: 0,
            voices: Vec::new(),
            finished: Vec::new(),
        }
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.clock as f64 / f64::from(self.rate)
    }

    /// Schedule a voice at `at`, or at the clock if that has already passed.
    /// Returns the start time actually used.
    pub(crate) fn add(&mut self, id: UnitId, buffer: &AudioBuffer, at: f64) -> f64 {
        let start_frame = whole_frames(at * f64::from(self.rate)).max(self.clock);
        let step = f64::from(buffer.sample_rate()) / f64::from(self.rate);
        self.voices.push(Voice {
            id,
            samples: buffer.mixdown(),
            step,
            start_frame,
        });
        start_frame as f64 / f64::from(self.rate)
    }

    pub(crate) fn remove(&mut self, id: UnitId) {
        self.voices.retain(|v| v.id != id);
    }

    pub(crate) fn take_finished(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.finished)
    }

    /// Fill an interleaved output block and advance the clock by its length.
    pub(crate) fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let value: f32 = self
                .voices
                .iter()
                .filter_map(|v| v.sample_at(self.clock))
                .sum::<f32>()
                .clamp(-1.0, 1.0);
            frame.fill(value);
            self.clock += 1;
        }

        let clock = self.clock;
        let finished = &mut self.finished;
        self.voices.retain(|v| {
            if v.end_frame() <= clock {
                finished.push(v.id);
                false
            } else {
                true
            }
        });
    }
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Speaker output via cpal; the stream runs from open until close.
pub struct CpalOutput {
    stream: Option<Stream>,
    mixer: Arc<Mutex<Mixer>>,
}

impl CpalOutput {
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| TutorError::Audio(format!("failed to enumerate output devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name().to_string())
                        .as_deref()
                        == Some(name.as_str())
                })
                .ok_or_else(|| TutorError::Audio(format!("output device not found: {name}")))?
        } else {
            host.default_output_device().ok_or_else(|| {
                TutorError::Audio("no default output device available".to_string())
            })?
        };

        let supported = device
            .default_output_config()
            .map_err(|e| TutorError::Audio(format!("failed to get default output config: {e}")))?;

        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = usize::from(stream_config.channels);

        let mixer = Arc::new(Mutex::new(Mixer::new(stream_config.sample_rate)));
        let render_mixer = Arc::clone(&mixer);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    lock(&render_mixer).render(data, channels);
                },
                |err: cpal::StreamError| {
                    tracing::error!("output stream error: {err}");
                },
                None,
            )
            .map_err(|e| TutorError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| TutorError::Audio(format!("failed to start output stream: {e}")))?;

        tracing::debug!(
            "speaker: rate={}, channels={channels}",
            stream_config.sample_rate
        );

        Ok(Self {
            stream: Some(stream),
            mixer,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        lock(&self.mixer).current_time()
    }

    fn start(&mut self, id: UnitId, buffer: &AudioBuffer, at: f64) -> Result<f64> {
        if self.stream.is_none() {
            return Err(TutorError::Audio("output is closed".to_string()));
        }
        Ok(lock(&self.mixer).add(id, buffer, at))
    }

    fn stop(&mut self, id: UnitId) {
        lock(&self.mixer).remove(id);
    }

    fn take_finished(&mut self) -> Vec<UnitId> {
        lock(&self.mixer).take_finished()
    }

    fn close(&mut self) -> Result<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| TutorError::Audio("output already closed".to_string()))?;
        stream
            .pause()
            .map_err(|e| TutorError::Audio(format!("failed to pause output stream: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_per_frame() {
        let mut mixer = Mixer::new(48000);
        let mut out = vec![0.0; 960];
        mixer.render(&mut out, 2);
        assert!((mixer.current_time() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn units_play_back_to_back_without_overlap() {
        let mut mixer = Mixer::new(8);
        mixer.add(0, &AudioBuffer::mono(8, vec![0.25; 4]), 0.0);
        mixer.add(1, &AudioBuffer::mono(8, vec![0.5; 4]), 0.5);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);
        assert_eq!(
            out,
            vec![0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]
        );
        assert_eq!(mixer.take_finished(), vec![0, 1]);
    }

    #[test]
    fn clock_moving_before_add_shifts_the_whole_queue() {
        let mut mixer = Mixer::new(8);
        let now = mixer.current_time();
        let mut block = vec![0.0; 2];
        mixer.render(&mut block, 1);

        let first = mixer.add(0, &AudioBuffer::mono(8, vec![0.25; 4]), now);
        assert!((first - 0.25).abs() < 1e-12);
        let second = mixer.add(1, &AudioBuffer::mono(8, vec![0.5; 4]), first + 0.5);
        assert!((second - 0.75).abs() < 1e-12);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn uneven_rates_never_share_a_frame() {
        // 24 kHz material on a 44.1 kHz device: 100 source samples span
        // 183.75 device frames.
        let mut mixer = Mixer::new(44100);
        let chunk = AudioBuffer::mono(24000, vec![0.5; 100]);
        let mut at = 0.0;
        for id in 0..8 {
            at = mixer.add(id, &chunk, at) + chunk.duration();
        }

        let mut out = vec![0.0; 2000];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|&v| v <= 0.5 + 1e-6));
        assert_eq!(mixer.take_finished().len(), 8);
    }

    #[test]
    fn every_channel_gets_the_mono_signal() {
        let mut mixer = Mixer::new(4);
        mixer.add(7, &AudioBuffer::mono(4, vec![0.5, 0.5]), 0.0);
        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn removed_voice_goes_silent_and_never_finishes() {
        let mut mixer = Mixer::new(8);
        mixer.add(3, &AudioBuffer::mono(8, vec![1.0; 8]), 0.0);
        let mut out = vec![0.0; 2];
        mixer.render(&mut out, 1);
        mixer.remove(3);
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0]);
        assert!(mixer.take_finished().is_empty());
    }

    #[test]
    fn lower_rate_material_is_stretched() {
        let mut mixer = Mixer::new(48000);
        mixer.add(0, &AudioBuffer::mono(24000, vec![0.1; 240]), 0.0);
        let mut out = vec![0.0; 600];
        mixer.render(&mut out, 1);
        let audible = out.iter().filter(|s| s.abs() > 0.0).count();
        assert!((479..=480).contains(&audible), "audible {audible}");
        assert_eq!(mixer.take_finished(), vec![0]);
    }
}
