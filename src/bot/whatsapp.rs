//! WhatsApp (Twilio) webhook handler: the dual-mode collection flow.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Local;
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::assembler::assemble_and_dispatch;
use crate::channel::MediaRef;
use crate::server::AppState;
use crate::session::SessionState;
use crate::transcriber::{split_title_and_steps, TranscribeError};
use crate::whatsapp_flow::{self, WhatsAppOutcome, WhatsAppSession};

/// Twilio webhook payload (the subset this flow consumes).
#[derive(Debug, Deserialize)]
pub struct TwilioWebhook {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "NumMedia", default)]
    pub num_media: String,
    #[serde(rename = "MediaContentType0", default)]
    pub media_content_type: String,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url: String,
}

/// `POST /webhook/whatsapp`
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<TwilioWebhook>,
) -> (StatusCode, Json<serde_json::Value>) {
    match handle_payload(&state, payload).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(e) => {
            error!(error = %e, "WhatsApp webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
        }
    }
}

async fn handle_payload(state: &AppState, payload: TwilioWebhook) -> Result<()> {
    let key = payload.from.trim_start_matches("whatsapp:").to_string();
    if key.is_empty() {
        return Ok(());
    }
    let num_media: u32 = payload.num_media.parse().unwrap_or(0);

    let purged = state.whatsapp_sessions.sweep_expired(&key);
    if purged > 0 {
        debug!(purged, "Purged expired WhatsApp sessions");
    }

    let entry = state.whatsapp_sessions.get_or_create(&key);
    let mut session = entry.lock().await;
    session.touch();

    if num_media == 0 {
        if payload.body.trim().is_empty() {
            return Ok(());
        }
        return handle_text(state, &key, &mut session, &payload.body).await;
    }

    if payload.media_content_type.contains("audio") {
        handle_audio(state, &key, &mut session, &payload.media_url).await
    } else if payload.media_content_type.contains("image") {
        handle_image(state, &key, &mut session, &payload.media_url).await
    } else {
        debug!(user_id = %key, content_type = %payload.media_content_type, "Unsupported WhatsApp media type");
        state
            .whatsapp
            .send_text(&key, "❌ This media type is not supported. Send audio or images.")
            .await?;
        Ok(())
    }
}

async fn handle_text(
    state: &AppState,
    key: &str,
    session: &mut WhatsAppSession,
    text: &str,
) -> Result<()> {
    debug!(user_id = %key, length = text.len(), "Received text message");

    match whatsapp_flow::apply_text(session, text) {
        WhatsAppOutcome::Reply(reply) => {
            state.whatsapp.send_text(key, &reply).await?;
            Ok(())
        }
        WhatsAppOutcome::Render => render_and_finish(state, key, session).await,
    }
}

async fn handle_audio(
    state: &AppState,
    key: &str,
    session: &mut WhatsAppSession,
    media_url: &str,
) -> Result<()> {
    if !whatsapp_flow::accepts_audio(session) {
        let reply = whatsapp_flow::unexpected_media_reply(session);
        state.whatsapp.send_text(key, &reply).await?;
        return Ok(());
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let audio_path = state
        .config
        .upload_dir
        .join(format!("audio_{key}_{timestamp}.ogg"));

    match timeout(
        state.config.download_timeout(),
        state
            .whatsapp
            .download_media(&MediaRef::Url(media_url.to_string()), &audio_path),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(user_id = %key, error = %e, "Audio download failed");
            state
                .whatsapp
                .send_text(key, "❌ Audio download failed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            warn!(user_id = %key, "Audio download timed out");
            state
                .whatsapp
                .send_text(key, "❌ Audio download timed out. Please resend it.")
                .await?;
            return Ok(());
        }
    }

    let transcription = match timeout(
        state.config.transcribe_timeout(),
        state.transcriber.transcribe(&audio_path),
    )
    .await
    {
        Ok(Ok(text)) => text,
        Ok(Err(TranscribeError::NoSpeech)) => {
            info!(user_id = %key, "Transcription found no speech");
            state
                .whatsapp
                .send_text(
                    key,
                    "❌ I couldn't transcribe the audio. Try recording again, speaking clearly.",
                )
                .await?;
            return Ok(());
        }
        Ok(Err(e)) => {
            error!(user_id = %key, error = %e, "Transcription failed");
            state
                .whatsapp
                .send_text(key, "❌ Audio processing failed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            warn!(user_id = %key, "Transcription timed out");
            state
                .whatsapp
                .send_text(key, "❌ Transcription timed out. Please resend the audio.")
                .await?;
            return Ok(());
        }
    };

    // First line is the title, remaining lines are the steps.
    let outline = split_title_and_steps(&transcription);
    if outline.steps.is_empty() {
        state
            .whatsapp
            .send_text(
                key,
                "❌ I could only hear a title. Record again with the title first and \
                 then one step per sentence.",
            )
            .await?;
        return Ok(());
    }

    match whatsapp_flow::apply_transcription(session, outline, audio_path) {
        WhatsAppOutcome::Reply(reply) => {
            state.whatsapp.send_text(key, &reply).await?;
            Ok(())
        }
        WhatsAppOutcome::Render => render_and_finish(state, key, session).await,
    }
}

async fn handle_image(
    state: &AppState,
    key: &str,
    session: &mut WhatsAppSession,
    media_url: &str,
) -> Result<()> {
    if !whatsapp_flow::accepts_image(session) {
        let reply = whatsapp_flow::unexpected_media_reply(session);
        state.whatsapp.send_text(key, &reply).await?;
        return Ok(());
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let index = session.images.len();
    let raw_path = state
        .config
        .upload_dir
        .join(format!("image_{key}_{index}_{timestamp}.orig.jpg"));
    let processed_path = state
        .config
        .upload_dir
        .join(format!("image_{key}_{index}_{timestamp}.jpg"));

    match timeout(
        state.config.download_timeout(),
        state
            .whatsapp
            .download_media(&MediaRef::Url(media_url.to_string()), &raw_path),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(user_id = %key, error = %e, "Image download failed");
            state
                .whatsapp
                .send_text(key, "❌ Image download failed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            warn!(user_id = %key, "Image download timed out");
            state
                .whatsapp
                .send_text(key, "❌ Image download timed out. Please resend it.")
                .await?;
            return Ok(());
        }
    }

    let normalize_raw = raw_path.clone();
    let normalize_out = processed_path.clone();
    let normalized = tokio::task::spawn_blocking(move || {
        crate::image_processor::process_image(&normalize_raw, &normalize_out)
    })
    .await;

    if let Err(e) = tokio::fs::remove_file(&raw_path).await {
        warn!(path = %raw_path.display(), error = %e, "Failed to remove raw image");
    }

    let failed = !matches!(normalized, Ok(Ok(())));
    if failed {
        warn!(user_id = %key, "Image normalization failed");
        state
            .whatsapp
            .send_text(key, "❌ That image could not be processed. Please resend it.")
            .await?;
        return Ok(());
    }

    match whatsapp_flow::apply_image(session, processed_path) {
        WhatsAppOutcome::Reply(reply) => {
            state.whatsapp.send_text(key, &reply).await?;
            Ok(())
        }
        WhatsAppOutcome::Render => render_and_finish(state, key, session).await,
    }
}

async fn render_and_finish(
    state: &AppState,
    key: &str,
    session: &mut WhatsAppSession,
) -> Result<()> {
    let Some(doc) = whatsapp_flow::build_document(session) else {
        error!(user_id = %key, "Render triggered without a transcript outline");
        *session = WhatsAppSession::default();
        state.whatsapp_sessions.remove(key);
        state
            .whatsapp
            .send_text(key, "❌ Something went wrong assembling the MIP. Please start over.")
            .await?;
        return Ok(());
    };

    let report = assemble_and_dispatch(state.whatsapp.as_ref(), key, doc, &state.config).await;

    // Dispatch ends the procedure; clear before the summary send so a
    // transport failure there cannot leave a ready-to-render session behind.
    *session = WhatsAppSession::default();
    state.whatsapp_sessions.remove(key);

    state.whatsapp.send_text(key, &report.summary()).await?;
    Ok(())
}
