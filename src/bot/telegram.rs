//! Telegram webhook handler: the single linear collection flow.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Local;
use serde_json::json;
use teloxide::types::{FileId, Update, UpdateKind};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::assembler::assemble_and_dispatch;
use crate::channel::MediaRef;
use crate::server::AppState;
use crate::session::SessionState;
use crate::telegram_flow::{
    self, ImageOutcome, TelegramSession, TextOutcome,
};
use crate::transcriber::TranscribeError;

const UNSUPPORTED_REPLY: &str =
    "❌ This message type is not supported. Send text, audio or photos.";
const DOCUMENT_REPLY: &str =
    "❌ Documents are not supported. Send the step photos as regular photos.";

/// `POST /webhook/telegram`
pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    Json(update): Json<Update>,
) -> (StatusCode, Json<serde_json::Value>) {
    match handle_update(&state, update).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(e) => {
            error!(error = %e, "Telegram webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
        }
    }
}

async fn handle_update(state: &AppState, update: Update) -> Result<()> {
    let UpdateKind::Message(msg) = update.kind else {
        // Edits, channel posts and the like are outside the collection flow.
        return Ok(());
    };

    let key = msg.chat.id.to_string();

    // Passive expiry: purge idle sessions of other users on every event.
    let purged = state.telegram_sessions.sweep_expired(&key);
    if purged > 0 {
        debug!(purged, "Purged expired Telegram sessions");
    }

    let entry = state.telegram_sessions.get_or_create(&key);
    let mut session = entry.lock().await;
    session.touch();

    if let Some(text) = msg.text() {
        handle_text(state, &key, &mut session, text).await
    } else if let Some(voice) = msg.voice() {
        handle_audio(state, &key, &mut session, voice.file.id.clone()).await
    } else if let Some(audio) = msg.audio() {
        handle_audio(state, &key, &mut session, audio.file.id.clone()).await
    } else if let Some(photos) = msg.photo() {
        // Telegram sends several resolutions; the last entry is the largest.
        match photos.last() {
            Some(photo) => handle_photo(state, &key, &mut session, photo.file.id.clone()).await,
            None => Ok(()),
        }
    } else if msg.document().is_some() {
        state.telegram.send_text(&key, DOCUMENT_REPLY).await?;
        Ok(())
    } else {
        debug!(user_id = %key, "Unsupported Telegram message type");
        state.telegram.send_text(&key, UNSUPPORTED_REPLY).await?;
        Ok(())
    }
}

async fn handle_text(
    state: &AppState,
    key: &str,
    session: &mut TelegramSession,
    text: &str,
) -> Result<()> {
    debug!(user_id = %key, length = text.len(), "Received text message");

    let outcome = match telegram_flow::parse_command(text) {
        Some(command) => telegram_flow::apply_command(session, command),
        None => telegram_flow::apply_text(session, text),
    };

    match outcome {
        TextOutcome::Reply(reply) => {
            state.telegram.send_text(key, &reply).await?;
        }
        TextOutcome::ClearSession(reply) => {
            state.telegram.send_text(key, &reply).await?;
            state.telegram_sessions.remove(key);
        }
        TextOutcome::Render => {
            render_and_finish(state, key, session).await?;
        }
    }
    Ok(())
}

async fn handle_audio(
    state: &AppState,
    key: &str,
    session: &mut TelegramSession,
    file_id: FileId,
) -> Result<()> {
    if !telegram_flow::accepts_audio(session) {
        let reply = telegram_flow::unexpected_media_reply(session);
        state.telegram.send_text(key, &reply).await?;
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
            .telegram
            .download_media(&MediaRef::Telegram(file_id), &audio_path),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(user_id = %key, error = %e, "Audio download failed");
            state
                .telegram
                .send_text(key, "❌ Audio download failed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            warn!(user_id = %key, "Audio download timed out");
            state
                .telegram
                .send_text(key, "❌ Audio download timed out. Please resend it.")
                .await?;
            return Ok(());
        }
    }

    state.telegram.send_text(key, "🎵 Processing audio...").await?;

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
                .telegram
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
                .telegram
                .send_text(key, "❌ Audio processing failed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            warn!(user_id = %key, "Transcription timed out");
            state
                .telegram
                .send_text(key, "❌ Transcription timed out. Please resend the audio.")
                .await?;
            return Ok(());
        }
    };

    let reply = telegram_flow::apply_transcription(session, transcription, audio_path);
    state.telegram.send_text(key, &reply).await?;
    Ok(())
}

async fn handle_photo(
    state: &AppState,
    key: &str,
    session: &mut TelegramSession,
    file_id: FileId,
) -> Result<()> {
    if !telegram_flow::accepts_image(session) {
        let reply = telegram_flow::unexpected_media_reply(session);
        state.telegram.send_text(key, &reply).await?;
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
            .telegram
            .download_media(&MediaRef::Telegram(file_id), &raw_path),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(user_id = %key, error = %e, "Image download failed");
            state
                .telegram
                .send_text(key, "❌ Image download failed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            warn!(user_id = %key, "Image download timed out");
            state
                .telegram
                .send_text(key, "❌ Image download timed out. Please resend it.")
                .await?;
            return Ok(());
        }
    }

    // Normalization is CPU-bound; run it off the event loop. A failed image
    // is skipped, not counted, and the user may resend.
    let normalize_raw = raw_path.clone();
    let normalize_out = processed_path.clone();
    let normalized = tokio::task::spawn_blocking(move || {
        crate::image_processor::process_image(&normalize_raw, &normalize_out)
    })
    .await;

    // The raw download is no longer needed either way.
    if let Err(e) = tokio::fs::remove_file(&raw_path).await {
        warn!(path = %raw_path.display(), error = %e, "Failed to remove raw image");
    }

    match normalized {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(user_id = %key, error = %e, "Image normalization failed");
            state
                .telegram
                .send_text(key, "❌ That image could not be processed. Please resend it.")
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(user_id = %key, error = %e, "Image normalization task panicked");
            state
                .telegram
                .send_text(key, "❌ That image could not be processed. Please resend it.")
                .await?;
            return Ok(());
        }
    }

    match telegram_flow::apply_image(session, processed_path) {
        ImageOutcome::Progress {
            received,
            remaining,
        } => {
            state
                .telegram
                .send_text(
                    key,
                    &format!("✅ Photo {received} received! {remaining} photo(s) to go."),
                )
                .await?;
        }
        ImageOutcome::Complete {
            title,
            steps,
            images,
        } => {
            state
                .telegram
                .send_text(
                    key,
                    &format!(
                        "✅ All photos received!\n\n📋 MIP summary:\n\
                         • Title: {title}\n• Steps: {steps}\n• Photos: {images}\n\n\
                         Generate the MIP now? (reply 'yes' or 'no')"
                    ),
                )
                .await?;
        }
    }
    Ok(())
}

async fn render_and_finish(
    state: &AppState,
    key: &str,
    session: &mut TelegramSession,
) -> Result<()> {
    state.telegram.send_text(key, "🔄 Generating MIP...").await?;

    let doc = telegram_flow::build_document(session);
    let report = assemble_and_dispatch(state.telegram.as_ref(), key, doc, &state.config).await;

    // Dispatch ends the procedure regardless of how many formats made it.
    // Clear before the summary send so a transport failure there cannot
    // leave a confirmed session behind to re-render on retry.
    session.reset();
    state.telegram_sessions.remove(key);

    state.telegram.send_text(key, &report.summary()).await?;
    Ok(())
}
