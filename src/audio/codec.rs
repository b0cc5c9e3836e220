//! PCM conversion between normalized float samples and the 16-bit wire format.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::audio::AudioBuffer;
use crate::error::{Result, TutorError};

/// MIME tag attached to every outbound frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Base64 text of little-endian 16-bit mono PCM plus its MIME tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: String,
    pub mime_type: &'static str,
}

/// Clamp to `[-1, 1]` and scale asymmetrically: negatives by 32768, the rest by 32767.
#[must_use]
pub fn float_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let clamped = s.clamp(-1.0, 1.0);
            let scaled = if clamped < 0.0 {
                clamped * 32768.0
            } else {
                clamped * f32::from(i16::MAX)
            };
            scaled.round() as i16
        })
        .collect()
}

/// Encode one captured frame for the wire.
#[must_use]
pub fn encode_frame(samples: &[f32]) -> EncodedFrame {
    let pcm = float_to_i16(samples);
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for sample in &pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    EncodedFrame {
        data: STANDARD.encode(&bytes),
        mime_type: INPUT_MIME_TYPE,
    }
}

/// Decode base64 text into little-endian 16-bit samples.
pub fn decode_frame(data: &str) -> Result<Vec<i16>> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| TutorError::MalformedInput(format!("invalid base64 audio payload: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(TutorError::MalformedInput(format!(
            "PCM payload of {} bytes is not a whole number of 16-bit samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// De-interleave `ints` into `channels` float channels at `sample_rate`.
pub fn to_audio_buffer(ints: &[i16], sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    let ch = usize::from(channels);
    if ch == 0 || ints.len() % ch != 0 {
        return Err(TutorError::InvalidFrameCount {
            samples: ints.len(),
            channels,
        });
    }

    let frame_count = ints.len() / ch;
    let mut data = vec![Vec::with_capacity(frame_count); ch];
    for frame in ints.chunks_exact(ch) {
        for (channel, &sample) in data.iter_mut().zip(frame) {
            channel.push(f32::from(sample) / 32768.0);
        }
    }

    Ok(AudioBuffer::new(sample_rate, data))
}
