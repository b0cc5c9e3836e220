//! Gemini REST calls: streamed tutor replies and diagram generation.

use std::fmt::Display;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::chat::SYSTEM_INSTRUCTION;
use crate::config::ChatConfig;
use crate::error::{Result, TutorError};
use crate::genai::Content;

const IMAGE_STYLE: &str = "diagrama técnico limpio con degradados suaves y bordes definidos, estilo vectorial UI moderno, esquema de colores violeta y blanco similar a la interfaz de Make.com (Integromat). Alta resolución, minimalista y educativo";

const IMAGE_MIME_TYPE: &str = "image/jpeg";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: TextGenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<ImagePrompt>,
    parameters: ImageParameters,
}

#[derive(Serialize)]
struct ImagePrompt {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageParameters {
    sample_count: u32,
    aspect_ratio: String,
    output_options: OutputOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: &'static str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

/// The diagram style instruction followed by what to draw.
#[must_use]
pub fn styled_prompt(prompt: &str) -> String {
    format!("{IMAGE_STYLE}. Visualización de: {prompt}")
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: ChatConfig,
}

impl GeminiClient {
    #[must_use]
    pub fn new(config: &ChatConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config: config.clone(),
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{model}:{method}",
            self.config.api_base.trim_end_matches('/')
        )
    }

    /// Send `message` after `history` and stream the reply through `on_chunk`.
    /// Returns the full reply text.
    pub async fn stream_reply(
        &self,
        history: &[Content],
        message: &str,
        on_chunk: impl FnMut(&str),
    ) -> Result<String> {
        let mut contents = history.to_vec();
        contents.push(Content::text(Some("user"), message));

        let body = GenerateRequest {
            contents,
            system_instruction: Content::text(None, SYSTEM_INSTRUCTION),
            generation_config: TextGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        tracing::debug!(model = %self.config.model, turns = body.contents.len(), "requesting reply");

        let resp = self
            .client
            .post(format!(
                "{}?alt=sse",
                self.url(&self.config.model, "streamGenerateContent")
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Chat(format!("Gemini request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TutorError::Chat(format!("Gemini returned {status}: {body}")));
        }

        consume_stream(resp.bytes_stream(), on_chunk).await
    }

    /// Generate one diagram. Failures are logged and yield `None`.
    pub async fn generate_image(&self, prompt: &str) -> Option<Vec<u8>> {
        match self.request_image(prompt).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("image generation failed for {prompt:?}: {e}");
                None
            }
        }
    }

    async fn request_image(&self, prompt: &str) -> Result<Vec<u8>> {
        let body = PredictRequest {
            instances: vec![ImagePrompt {
                prompt: styled_prompt(prompt),
            }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: self.config.aspect_ratio.clone(),
                output_options: OutputOptions {
                    mime_type: IMAGE_MIME_TYPE,
                },
            },
        };

        let resp = self
            .client
            .post(self.url(&self.config.image_model, "predict"))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Chat(format!("image request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TutorError::Chat(format!("image API returned {status}: {body}")));
        }

        let parsed: PredictResponse = resp
            .json()
            .await
            .map_err(|e| TutorError::Chat(format!("failed to parse image response: {e}")))?;

        decode_prediction(parsed)
    }
}

fn decode_prediction(response: PredictResponse) -> Result<Vec<u8>> {
    let encoded = response
        .predictions
        .into_iter()
        .find_map(|p| p.bytes_base64_encoded)
        .ok_or_else(|| TutorError::Chat("image response carried no image".to_string()))?;
    STANDARD
        .decode(encoded)
        .map_err(|e| TutorError::Chat(format!("image payload is not base64: {e}")))
}

/// Splits a byte stream into SSE `data:` payloads. Bytes are held until a full
/// line arrives, so a multi-byte character split across chunks stays intact.
#[derive(Default)]
struct SseLines {
    pending: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            out.extend(data_payload(&line));
        }
        out
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    (!data.is_empty()).then(|| data.to_string())
}

fn chunk_text(data: &str) -> Result<String> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| TutorError::Chat(format!("unreadable stream chunk: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(TutorError::Chat(format!("Gemini stream error: {}", err.message)));
    }
    Ok(chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.joined_text())
        .unwrap_or_default())
}

/// Drain an SSE body, forwarding each text increment and returning the whole text.
async fn consume_stream<S, B, E>(stream: S, mut on_chunk: impl FnMut(&str)) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut lines = SseLines::default();
    let mut full = String::new();

    let mut forward = |data: &str, full: &mut String| -> Result<()> {
        let text = chunk_text(data)?;
        if !text.is_empty() {
            on_chunk(&text);
            full.push_str(&text);
        }
        Ok(())
    };

    while let Some(bytes) = stream.next().await {
        let bytes = bytes.map_err(|e| TutorError::Chat(format!("reply stream failed: {e}")))?;
        for data in lines.push(bytes.as_ref()) {
            forward(&data, &mut full)?;
        }
    }
    if let Some(data) = lines.finish() {
        forward(&data, &mut full)?;
    }

    Ok(full)
}
