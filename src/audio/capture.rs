use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::bounded;

use crate::audio::resample::Resampler;
use crate::audio::{AudioFrame, INPUT_SAMPLE_RATE};
use crate::config::AudioConfig;
use crate::error::{Result, TutorError};

/// Receives every frame the capture pipeline produces. Runs on the capture thread.
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send>;

/// An exclusively held audio input.
pub trait Microphone {
    /// Begin delivering fixed-size 16 kHz mono frames to `sink`.
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop delivery and release the device. Safe to call more than once.
    fn stop(&mut self);
}

/// Root-mean-square level of `samples`, multiplied by `gain` and clamped to `[0, 1]`.
#[must_use]
pub fn frame_volume(samples: &[f32], gain: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum / samples.len() as f32).sqrt();
    (rms * gain).clamp(0.0, 1.0)
}

/// Splits a continuous sample stream into fixed-length frames.
pub struct FrameChunker {
    buffer: Vec<f32>,
    frame_len: usize,
    sample_rate: u32,
}

impl FrameChunker {
    #[must_use]
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            buffer: Vec::with_capacity(frame_len),
            frame_len,
            sample_rate,
        }
    }

    /// Feed samples and return every complete frame.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.buffer.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_len {
            let samples: Vec<f32> = self.buffer.drain(..self.frame_len).collect();
            frames.push(AudioFrame::new(samples, self.sample_rate));
        }
        frames
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Owns the session's microphone and gates frame delivery on its running flag.
///
/// Frames travel from the capture thread to the session loop through a channel,
/// so some may still be queued when `stop` returns. `deliver` drops those,
/// which is what guarantees no callback fires after `stop`.
pub struct CapturePipeline {
    mic: Option<Box<dyn Microphone>>,
    running: bool,
    gain: f32,
}

impl CapturePipeline {
    #[must_use]
    pub fn new(gain: f32) -> Self {
        Self {
            mic: None,
            running: false,
            gain,
        }
    }

    /// Take ownership of an acquired microphone without starting it.
    pub fn acquire(&mut self, mic: Box<dyn Microphone>) {
        self.stop();
        self.mic = Some(mic);
    }

    pub fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.running {
            return Ok(());
        }
        let mic = self.mic.as_mut().ok_or_else(|| {
            TutorError::DeviceUnavailable("no microphone acquired for this session".to_string())
        })?;
        mic.start(sink)?;
        self.running = true;
        tracing::debug!("capture pipeline started");
        Ok(())
    }

    /// Report the frame's volume, then hand the frame on. Returns `false` and
    /// does nothing once the pipeline is stopped.
    pub fn deliver(
        &self,
        frame: AudioFrame,
        on_volume: impl FnOnce(f32),
        on_frame: impl FnOnce(AudioFrame),
    ) -> bool {
        if !self.running {
            return false;
        }
        on_volume(frame_volume(&frame.samples, self.gain));
        on_frame(frame);
        true
    }

    pub fn stop(&mut self) {
        self.running = false;
        if let Some(mut mic) = self.mic.take() {
            mic.stop();
            tracing::debug!("microphone released");
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Microphone capture via cpal.
///
/// The device callback only copies samples into a bounded channel; a
/// dedicated thread resamples to 16 kHz mono and cuts fixed-size frames.
pub struct CpalMicrophone {
    device: Device,
    config: StreamConfig,
    frame_size: usize,
    stream: Option<Stream>,
}

impl CpalMicrophone {
    /// Locate the configured (or default) input device.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| {
                    TutorError::DeviceUnavailable(format!("failed to enumerate input devices: {e}"))
                })?
                .find(|d| device_name(d).as_deref() == Some(name.as_str()))
                .ok_or_else(|| {
                    TutorError::DeviceUnavailable(format!("input device not found: {name}"))
                })?
        } else {
            host.default_input_device().ok_or_else(|| {
                TutorError::DeviceUnavailable("no default input device available".to_string())
            })?
        };

        let supported = device.default_input_config().map_err(|e| {
            TutorError::DeviceUnavailable(format!("failed to get default input config: {e}"))
        })?;

        let config_out = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::debug!(
            "microphone: rate={}, channels={}",
            config_out.sample_rate,
            config_out.channels
        );

        Ok(Self {
            device,
            config: config_out,
            frame_size: config.frame_size,
            stream: None,
        })
    }
}

impl Microphone for CpalMicrophone {
    fn start(&mut self, mut sink: FrameSink) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let sample_rate = self.config.sample_rate;
        let channels = self.config.channels;
        let mut resampler = Resampler::new(sample_rate, INPUT_SAMPLE_RATE, channels)?;
        let mut chunker = FrameChunker::new(self.frame_size, INPUT_SAMPLE_RATE);

        let (tx, rx) = bounded::<Vec<f32>>(64);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let _ = tx.try_send(data.to_vec());
                },
                |err: cpal::StreamError| {
                    tracing::error!("input stream error: {err}");
                },
                None,
            )
            .map_err(|e| TutorError::DeviceUnavailable(format!("failed to open microphone: {e}")))?;

        // Exits once the stream (and with it the sending half) is dropped.
        std::thread::spawn(move || {
            while let Ok(raw) = rx.recv() {
                let mono = match resampler.process(&raw) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("{e}");
                        continue;
                    }
                };
                for frame in chunker.push(&mono) {
                    sink(frame);
                }
            }
            tracing::debug!("capture thread exiting");
        });

        stream
            .play()
            .map_err(|e| TutorError::DeviceUnavailable(format!("failed to start microphone: {e}")))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!("pausing input stream: {e}");
            }
        }
    }
}

fn device_name(device: &Device) -> Option<String> {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
}

/// Names of every input device the host reports.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| TutorError::Audio(format!("failed to enumerate input devices: {e}")))?;
    Ok(devices.filter_map(|d| device_name(&d)).collect())
}

#[must_use]
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| device_name(&d))
}
