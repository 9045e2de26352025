//! # Webhook Server Module
//!
//! Shared application state and the axum router wiring the two webhook
//! endpoints plus a health probe.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::bot::{telegram_webhook, whatsapp_webhook};
use crate::channel::{ChannelApi, TelegramChannel, WhatsAppChannel};
use crate::config::Config;
use crate::session::SessionStore;
use crate::telegram_flow::TelegramSession;
use crate::transcriber::{SpeechToText, WhisperApi};
use crate::whatsapp_flow::WhatsAppSession;

/// Everything the webhook handlers need, shared across requests.
pub struct AppState {
    pub config: Config,
    pub telegram: Arc<dyn ChannelApi>,
    pub whatsapp: Arc<dyn ChannelApi>,
    pub transcriber: Arc<dyn SpeechToText>,
    pub telegram_sessions: SessionStore<TelegramSession>,
    pub whatsapp_sessions: SessionStore<WhatsAppSession>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let telegram: Arc<dyn ChannelApi> = Arc::new(TelegramChannel::new(&config.telegram_token));
        let whatsapp: Arc<dyn ChannelApi> = Arc::new(WhatsAppChannel::new(
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from_number,
            config.public_base_url.clone(),
        ));
        let transcriber: Arc<dyn SpeechToText> = Arc::new(WhisperApi::new(
            &config.whisper_api_url,
            &config.whisper_api_key,
            &config.whisper_model,
        ));
        let telegram_sessions = SessionStore::new(config.telegram_session_timeout_secs);
        let whatsapp_sessions = SessionStore::new(config.whatsapp_session_timeout_secs);

        Self {
            config,
            telegram,
            whatsapp,
            transcriber,
            telegram_sessions,
            whatsapp_sessions,
        }
    }
}

/// Build the webhook router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/telegram", post(telegram_webhook))
        .route("/webhook/whatsapp", post(whatsapp_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
