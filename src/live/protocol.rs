//! Gemini Live (`BidiGenerateContent`) message shapes.

use serde::{Deserialize, Serialize};

use crate::audio::codec::EncodedFrame;
use crate::config::LiveConfig;
use crate::error::{Result, TutorError};
use crate::genai::{Blob, Content};

/// First message on a new connection.
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

impl SetupMessage {
    /// Audio-only session with a prebuilt voice.
    #[must_use]
    pub fn new(config: &LiveConfig, system_instruction: &str) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: config.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: (!system_instruction.is_empty())
                    .then(|| Content::text(None, system_instruction)),
            },
        }
    }
}

/// One chunk of microphone audio.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

impl RealtimeInputMessage {
    #[must_use]
    pub fn audio(frame: EncodedFrame) -> Self {
        Self {
            realtime_input: RealtimeInput {
                audio: Blob {
                    mime_type: frame.mime_type.to_string(),
                    data: frame.data,
                },
            },
        }
    }
}

/// Anything the server sends after setup. Fields it did not set stay empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,

    #[serde(default)]
    pub server_content: Option<ServerContent>,

    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub interrupted: bool,

    #[serde(default)]
    pub turn_complete: bool,

    #[serde(default)]
    pub model_turn: Option<Content>,
}

/// Server notice that the connection will be dropped soon.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| TutorError::MalformedInput(format!("unreadable server message: {e}")))
    }

    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// The user started speaking over the model.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.interrupted)
    }

    #[must_use]
    pub fn is_turn_complete(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.turn_complete)
    }

    /// Base64 audio payloads of the model turn, in order.
    pub fn audio_payloads(&self) -> impl Iterator<Item = &str> {
        self.model_parts()
            .filter_map(|p| p.inline_data.as_ref())
            .filter(|blob| blob.mime_type.is_empty() || blob.mime_type.starts_with("audio/"))
            .map(|blob| blob.data.as_str())
            .filter(|data| !data.is_empty())
    }

    /// Text parts of the model turn (transcripts or commentary).
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.model_parts().filter_map(|p| p.text.as_deref())
    }

    fn model_parts(&self) -> impl Iterator<Item = &crate::genai::Part> {
        self.server_content
            .iter()
            .filter_map(|c| c.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
    }
}
