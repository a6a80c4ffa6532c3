//! Murf text-to-speech client.
//!
//! Each interviewer character maps to a fixed voice with its own speed and
//! pitch. Requests are one-shot; callers decide whether to retry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.murf.ai/v1";
pub const DEFAULT_CHARACTER: &str = "jane";

const FALLBACK_VOICE: &str = "claire";
// Only this many characters of the API key ever reach the logs.
const KEY_PREFIX_LEN: usize = 5;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Murf API key is required")]
    MissingApiKey,
    #[error("request to Murf failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Murf API error: {status}\n{body}")]
    Api { status: u16, body: String },
    #[error("unexpected Murf response: {0}")]
    InvalidResponse(String),
    #[error("failed to write audio to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Voice and delivery settings for one interviewer character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicePreset {
    pub voice_id: &'static str,
    pub speed: f32,
    pub pitch: f32,
}

impl VoicePreset {
    /// Preset for a character id; unknown ids get the fallback voice at
    /// neutral speed and pitch.
    pub fn for_character(character: &str) -> Self {
        let voice_id = match character {
            "jane" => "en-US-julia",
            "mike" => "en-US-terrell",
            "sarah" => "en-US-emma",
            _ => FALLBACK_VOICE,
        };
        let (speed, pitch) = match character {
            "mike" => (0.95, 0.95),
            "sarah" => (1.05, 1.1),
            _ => (1.0, 1.0),
        };
        Self { voice_id, speed, pitch }
    }
}

/// JSON body of a speech generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    pub voice_id: &'a str,
    pub speed: f32,
    pub pitch: f32,
}

impl<'a> SpeechRequest<'a> {
    pub fn new(text: &'a str, character: &str) -> Self {
        let preset = VoicePreset::for_character(character);
        Self {
            text,
            voice_id: preset.voice_id,
            speed: preset.speed,
            pitch: preset.pitch,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechResponse {
    audio_file: Option<String>,
}

/// Credentials and endpoint for the Murf API.
#[derive(Clone)]
pub struct MurfConfig {
    pub api_key: String,
    pub base_url: String,
}

impl MurfConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl fmt::Debug for MurfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MurfConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn redact(key: &str) -> String {
    let prefix: String = key.chars().take(KEY_PREFIX_LEN).collect();
    format!("{prefix}...")
}

/// Murf client; one shared HTTP connection pool per service.
pub struct MurfService {
    config: MurfConfig,
    client: reqwest::Client,
}

impl MurfService {
    pub fn new(config: MurfConfig) -> Result<Self, SpeechError> {
        if config.api_key.trim().is_empty() {
            return Err(SpeechError::MissingApiKey);
        }
        tracing::info!(api_key = %redact(&config.api_key), base_url = %config.base_url, "Murf service initialized");
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/speech/generate", self.config.base_url.trim_end_matches('/'))
    }

    /// Synthesize `text` in the voice of `character` and return the audio URL.
    pub async fn generate_speech(&self, text: &str, character: &str) -> Result<String, SpeechError> {
        let request = SpeechRequest::new(text, character);
        let url = self.endpoint();
        tracing::info!(
            %url,
            character,
            voice_id = request.voice_id,
            speed = request.speed,
            pitch = request.pitch,
            chars = text.chars().count(),
            "requesting speech"
        );

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Murf responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Murf API error");
            return Err(SpeechError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SpeechResponse = response.json().await?;
        let audio_url = parsed
            .audio_file
            .ok_or_else(|| SpeechError::InvalidResponse("missing audioFile".into()))?;
        tracing::info!(%audio_url, "speech generated");
        Ok(audio_url)
    }

    /// Download the audio file a previous [`generate_speech`](Self::generate_speech) returned.
    pub async fn fetch_audio(&self, audio_url: &str) -> Result<Vec<u8>, SpeechError> {
        let response = self.client.get(audio_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        tracing::debug!(bytes = bytes.len(), "audio downloaded");
        Ok(bytes.to_vec())
    }

    /// Write synthesized audio bytes to `path`.
    pub async fn save_audio(&self, audio: &[u8], path: &Path) -> Result<(), SpeechError> {
        tracing::info!(path = %path.display(), bytes = audio.len(), "saving audio");
        tokio::fs::write(path, audio).await.map_err(|source| SpeechError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
