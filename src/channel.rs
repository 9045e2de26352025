//! # Channel Adapter Module
//!
//! One trait for the outbound side of both chat transports: send text, send
//! a rendered document, download inbound media. Telegram is backed by
//! teloxide's `Bot`, WhatsApp by the Twilio REST API over reqwest.

use std::path::Path;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, error};

/// Reference to a piece of inbound media, in channel-native terms.
#[derive(Debug, Clone)]
pub enum MediaRef {
    /// Telegram file identifier, resolved through `getFile`.
    Telegram(teloxide::types::FileId),
    /// Direct (possibly authenticated) URL, as Twilio delivers.
    Url(String),
}

/// Errors raised by a channel adapter.
#[derive(Debug, Clone)]
pub enum ChannelError {
    Download(String),
    Send(String),
    /// The operation needs configuration that is absent.
    Unconfigured(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Download(msg) => write!(f, "Media download error: {msg}"),
            ChannelError::Send(msg) => write!(f, "Send error: {msg}"),
            ChannelError::Unconfigured(msg) => write!(f, "Channel not configured: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Outbound operations of a chat transport.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// Send a plain text reply to `recipient`.
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    /// Deliver a rendered document file to `recipient`.
    async fn send_document(
        &self,
        recipient: &str,
        file: &Path,
        caption: &str,
    ) -> Result<(), ChannelError>;

    /// Download inbound media to `dest`.
    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<(), ChannelError>;
}

/// Telegram transport backed by the Bot API.
pub struct TelegramChannel {
    bot: Bot,
    http: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
            http: reqwest::Client::new(),
        }
    }

    fn chat_id(recipient: &str) -> Result<ChatId, ChannelError> {
        recipient
            .parse::<i64>()
            .map(ChatId)
            .map_err(|e| ChannelError::Send(format!("invalid chat id {recipient:?}: {e}")))
    }
}

#[async_trait]
impl ChannelApi for TelegramChannel {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        let chat_id = Self::chat_id(recipient)?;
        self.bot
            .send_message(chat_id, text)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        Ok(())
    }

    async fn send_document(
        &self,
        recipient: &str,
        file: &Path,
        caption: &str,
    ) -> Result<(), ChannelError> {
        let chat_id = Self::chat_id(recipient)?;
        self.bot
            .send_document(chat_id, InputFile::file(file.to_path_buf()))
            .caption(caption)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        Ok(())
    }

    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<(), ChannelError> {
        let file_id = match media {
            MediaRef::Telegram(id) => id.clone(),
            MediaRef::Url(url) => {
                return Err(ChannelError::Download(format!(
                    "Telegram channel cannot fetch raw URLs: {url}"
                )))
            }
        };

        let file = self
            .bot
            .get_file(file_id)
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChannelError::Download(format!(
                "file download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;
        debug!(dest = %dest.display(), bytes = bytes.len(), "Telegram media downloaded");
        Ok(())
    }
}

/// WhatsApp transport backed by the Twilio Messages API.
pub struct WhatsAppChannel {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    /// Public URL under which rendered output files are served; Twilio
    /// fetches document media itself, so sending files requires this.
    public_base_url: Option<String>,
}

impl WhatsAppChannel {
    pub fn new(
        account_sid: &str,
        auth_token: &str,
        from_number: &str,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
            public_base_url,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }

    async fn create_message(&self, params: &[(&str, String)]) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(params)
            .send()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "Twilio message create failed");
            return Err(ChannelError::Send(format!(
                "Twilio returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelApi for WhatsAppChannel {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        self.create_message(&[
            ("From", format!("whatsapp:{}", self.from_number)),
            ("To", format!("whatsapp:{recipient}")),
            ("Body", text.to_string()),
        ])
        .await
    }

    async fn send_document(
        &self,
        recipient: &str,
        file: &Path,
        caption: &str,
    ) -> Result<(), ChannelError> {
        let base = self.public_base_url.as_ref().ok_or_else(|| {
            ChannelError::Unconfigured(
                "PUBLIC_BASE_URL must be set to deliver documents over WhatsApp".to_string(),
            )
        })?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ChannelError::Send(format!("bad output path {}", file.display())))?;

        self.create_message(&[
            ("From", format!("whatsapp:{}", self.from_number)),
            ("To", format!("whatsapp:{recipient}")),
            ("MediaUrl", format!("{base}/{file_name}")),
            ("Body", caption.to_string()),
        ])
        .await
    }

    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<(), ChannelError> {
        let url = match media {
            MediaRef::Url(url) => url,
            MediaRef::Telegram(_) => {
                return Err(ChannelError::Download(
                    "WhatsApp channel cannot resolve Telegram file ids".to_string(),
                ))
            }
        };

        // Twilio media URLs require the account credentials.
        let response = self
            .http
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChannelError::Download(format!(
                "media download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;
        debug!(dest = %dest.display(), bytes = bytes.len(), "WhatsApp media downloaded");
        Ok(())
    }
}
