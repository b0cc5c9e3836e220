use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::audio::FRAME_SIZE;
use crate::error::{Result, TutorError};

const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables consulted, in order, when the config has no key.
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const fn default_frame_size() -> usize {
    FRAME_SIZE
}

const fn default_volume_gain() -> f32 {
    5.0
}

fn default_live_endpoint() -> String {
    DEFAULT_LIVE_ENDPOINT.to_string()
}

fn default_live_model() -> String {
    "gemini-2.5-flash-native-audio-preview-09-2025".to_string()
}

fn default_voice() -> String {
    "Kore".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    15
}

const fn default_error_dismiss_secs() -> u64 {
    3
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_chat_model() -> String {
    "gemini-3-pro-preview".to_string()
}

const fn default_temperature() -> f32 {
    0.4
}

const fn default_max_output_tokens() -> u32 {
    2000
}

fn default_image_model() -> String {
    "imagen-4.0-generate-001".to_string()
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_storage_directory() -> String {
    let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
    data_dir.join("flowtutor").to_string_lossy().to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub input_device: Option<String>,

    pub output_device: Option<String>,

    /// Samples per outbound frame at 16 kHz.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// Multiplier applied to frame RMS before clamping for the level meter.
    #[serde(default = "default_volume_gain")]
    pub volume_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            frame_size: default_frame_size(),
            volume_gain: default_volume_gain(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_live_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_live_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long a connection error stays on screen before the voice command exits.
    #[serde(default = "default_error_dismiss_secs")]
    pub error_dismiss_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: default_live_endpoint(),
            model: default_live_model(),
            voice: default_voice(),
            connect_timeout_secs: default_connect_timeout_secs(),
            error_dismiss_secs: default_error_dismiss_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Generate diagrams for image tags in replies.
    #[serde(default = "default_true")]
    pub images: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            image_model: default_image_model(),
            aspect_ratio: default_aspect_ratio(),
            images: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_directory")]
    pub directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TutorError::Config(format!(
                "config file not found: {} (run `flowtutor init` or pass --config)",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            TutorError::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml_ng::from_str(&contents).map_err(|e| {
            TutorError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Self::default_path();
        if default.exists() {
            Self::load(&default)
        } else {
            tracing::debug!("no config at {}, using defaults", default.display());
            Ok(Self::default())
        }
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        config_dir.join("flowtutor/config.yaml")
    }

    /// The API key from the config file or, failing that, the environment.
    pub fn api_key(&self) -> Result<String> {
        Self::resolve_api_key(self.api_key.as_deref(), |var| std::env::var(var).ok())
    }

    fn resolve_api_key(
        configured: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        API_KEY_VARS
            .iter()
            .find_map(|var| env(var).filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| {
                TutorError::Config(
                    "no API key: set api_key in the config file or GEMINI_API_KEY".to_string(),
                )
            })
    }

    /// Write the input device name into the config file, keeping other settings.
    pub fn set_input_device(path: &Path, device: &str) -> Result<()> {
        use serde_yaml_ng::{Mapping, Value};

        let mut root = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            match serde_yaml_ng::from_str::<Value>(&contents) {
                Ok(Value::Mapping(map)) => map,
                Ok(Value::Null) => Mapping::new(),
                Ok(_) => {
                    return Err(TutorError::Config(format!(
                        "{} does not contain a YAML mapping",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(TutorError::Config(format!(
                        "failed to parse config file {}: {e}",
                        path.display()
                    )));
                }
            }
        } else {
            Mapping::new()
        };

        let audio = root
            .entry(Value::String("audio".to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()))
            .as_mapping_mut()
            .ok_or_else(|| TutorError::Config("audio section is not a mapping".to_string()))?;
        audio.insert(
            Value::String("input_device".to_string()),
            Value::String(device.to_string()),
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml_ng::to_string(&Value::Mapping(root))
            .map_err(|e| TutorError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Expand `~` in a path string to the user's home directory.
    #[must_use]
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}
