//! # Transcription Adapter Module
//!
//! Wraps the external speech-to-text engine behind a trait and turns the
//! returned text into a step outline. The engine is reached over HTTP
//! (OpenAI-compatible transcription endpoint) so a slow transcription never
//! ties up anything but the session that asked for it.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

/// Errors raised by the transcription adapter.
#[derive(Debug, Clone)]
pub enum TranscribeError {
    /// Audio file could not be read.
    Io(String),
    /// The engine call failed (network, auth, server error).
    Engine(String),
    /// The engine returned no recognizable speech.
    NoSpeech,
}

impl std::fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscribeError::Io(msg) => write!(f, "Audio read error: {msg}"),
            TranscribeError::Engine(msg) => write!(f, "Transcription engine error: {msg}"),
            TranscribeError::NoSpeech => write!(f, "No recognizable speech in audio"),
        }
    }
}

impl std::error::Error for TranscribeError {}

/// External speech-to-text capability.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio file at `audio` to plain text.
    ///
    /// An empty transcription is reported as [`TranscribeError::NoSpeech`],
    /// never as an empty string.
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscribeError>;
}

/// Whisper-style HTTP transcription client.
pub struct WhisperApi {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl WhisperApi {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperApi {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscribeError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| TranscribeError::Io(e.to_string()))?;

        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.ogg".to_string());

        debug!(file = %file_name, bytes = bytes.len(), "Sending audio for transcription");

        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscribeError::Engine(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscribeError::Engine(format!(
                "transcription endpoint returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscribeError::Engine(e.to_string()))?;
        let text = body
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(TranscribeError::NoSpeech);
        }

        info!(chars = text.len(), "Transcription completed");
        Ok(text)
    }
}

/// A transcription split into an optional title and ordered steps.
#[derive(Debug, Clone, Default)]
pub struct TranscriptOutline {
    pub title: Option<String>,
    pub steps: Vec<String>,
}

/// Split a transcription into steps: one per non-empty line, trimmed.
/// Used by the Telegram flow, where the title was prompted for earlier.
pub fn split_steps(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a transcription into title (first non-empty line) and steps (the
/// rest). Used by the WhatsApp flow, which never prompts for a title.
pub fn split_title_and_steps(text: &str) -> TranscriptOutline {
    let mut lines = split_steps(text).into_iter();
    let title = lines.next();
    TranscriptOutline {
        title,
        steps: lines.collect(),
    }
}
