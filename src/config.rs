//! # Configuration Module
//!
//! Runtime configuration for the MIP generator bot. Credentials and
//! tunables are supplied through environment variables (a `.env` file is
//! honoured); missing credentials are fatal at startup so the process is
//! never serving traffic half-configured.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::document::DocumentFormat;

// Session expiry defaults. The two channels intentionally diverge: a
// Telegram procedure is a long guided flow, a WhatsApp exchange is expected
// to be rapid-fire.
pub const DEFAULT_TELEGRAM_SESSION_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_WHATSAPP_SESSION_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

pub const DEFAULT_WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

pub const DEFAULT_PDF_FONT_DIR: &str = "/usr/share/fonts/truetype/liberation";
pub const DEFAULT_PDF_FONT_NAME: &str = "LiberationSans";

// Every external call gets a bound; a timeout is a recoverable failure
// reported to the user, never a crash.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TRANSCRIBE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_OUTPUT_FORMATS: &str = "pdf,docx,html,rtf";

/// Complete runtime configuration for the bot.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot API token.
    pub telegram_token: String,
    /// Twilio account SID for the WhatsApp channel.
    pub twilio_account_sid: String,
    /// Twilio auth token.
    pub twilio_auth_token: String,
    /// WhatsApp-enabled Twilio phone number (without the `whatsapp:` prefix).
    pub twilio_from_number: String,
    /// Speech-to-text endpoint (OpenAI-compatible transcription API).
    pub whisper_api_url: String,
    /// API key for the speech-to-text endpoint.
    pub whisper_api_key: String,
    /// Model name passed to the transcription API.
    pub whisper_model: String,
    /// Bind address for the webhook server.
    pub host: String,
    /// Bind port for the webhook server.
    pub port: u16,
    /// Directory for downloaded media.
    pub upload_dir: PathBuf,
    /// Directory for rendered documents.
    pub output_dir: PathBuf,
    /// Base URL under which `output_dir` is publicly reachable. Twilio can
    /// only deliver media it can fetch over HTTP, so WhatsApp document
    /// dispatch requires this to be set.
    pub public_base_url: Option<String>,
    /// Telegram session inactivity timeout in seconds.
    pub telegram_session_timeout_secs: u64,
    /// WhatsApp session inactivity timeout in seconds.
    pub whatsapp_session_timeout_secs: u64,
    /// Output formats attempted for every generated MIP.
    pub output_formats: Vec<DocumentFormat>,
    /// Directory containing the TTF family used for PDF output.
    pub pdf_font_dir: PathBuf,
    /// Base name of the TTF family used for PDF output.
    pub pdf_font_name: String,
    /// Media download timeout in seconds.
    pub download_timeout_secs: u64,
    /// Transcription call timeout in seconds.
    pub transcribe_timeout_secs: u64,
    /// Per-format render timeout in seconds.
    pub render_timeout_secs: u64,
    /// Outbound send timeout in seconds.
    pub send_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_from_number: String::new(),
            whisper_api_url: DEFAULT_WHISPER_API_URL.to_string(),
            whisper_api_key: String::new(),
            whisper_model: DEFAULT_WHISPER_MODEL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            public_base_url: None,
            telegram_session_timeout_secs: DEFAULT_TELEGRAM_SESSION_TIMEOUT_SECS,
            whatsapp_session_timeout_secs: DEFAULT_WHATSAPP_SESSION_TIMEOUT_SECS,
            output_formats: parse_formats(DEFAULT_OUTPUT_FORMATS).expect("default formats parse"),
            pdf_font_dir: PathBuf::from(DEFAULT_PDF_FONT_DIR),
            pdf_font_name: DEFAULT_PDF_FONT_NAME.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            transcribe_timeout_secs: DEFAULT_TRANSCRIBE_TIMEOUT_SECS,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// Returns an error when any required credential is absent; the caller
    /// is expected to abort startup in that case.
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            telegram_token: required("TELEGRAM_TOKEN")?,
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: required("TWILIO_AUTH_TOKEN")?,
            twilio_from_number: required("TWILIO_PHONE_NUMBER")?,
            whisper_api_key: required("WHISPER_API_KEY")?,
            ..Config::default()
        };

        if let Ok(url) = env::var("WHISPER_API_URL") {
            config.whisper_api_url = url;
        }
        if let Ok(model) = env::var("WHISPER_MODEL") {
            config.whisper_model = model;
        }
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port.parse()?;
        }
        if let Ok(dir) = env::var("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL") {
            config.public_base_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Ok(secs) = env::var("TELEGRAM_SESSION_TIMEOUT") {
            config.telegram_session_timeout_secs = secs.parse()?;
        }
        if let Ok(secs) = env::var("WHATSAPP_SESSION_TIMEOUT") {
            config.whatsapp_session_timeout_secs = secs.parse()?;
        }
        if let Ok(formats) = env::var("OUTPUT_FORMATS") {
            config.output_formats = parse_formats(&formats)?;
        }
        if let Ok(dir) = env::var("PDF_FONT_DIR") {
            config.pdf_font_dir = PathBuf::from(dir);
        }
        if let Ok(name) = env::var("PDF_FONT_NAME") {
            config.pdf_font_name = name;
        }

        Ok(config)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn transcribe_timeout(&self) -> Duration {
        Duration::from_secs(self.transcribe_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{name} must be set"),
    }
}

/// Parse a comma-separated format list, e.g. `"pdf,html,rtf"`.
fn parse_formats(list: &str) -> Result<Vec<DocumentFormat>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<DocumentFormat>()
                .map_err(|e| anyhow::anyhow!("invalid output format {s:?}: {e}"))
        })
        .collect()
}
