//! # WhatsApp Flow Module
//!
//! The dual-mode state machine for the WhatsApp channel. Unlike the
//! Telegram flow there is no title prompt: the first transcription line
//! becomes the title. Two collection modes exist:
//!
//! - **sequential** (default): the first audio fixes the step list, then
//!   images pair positionally as they arrive; the document renders as soon
//!   as the image count reaches the step count.
//! - **batch**: "start batch" collects images first, "done" closes the set,
//!   a single audio then supplies title and steps and rendering proceeds
//!   immediately by positional pairing.
//!
//! Once a session's mode is chosen it never changes until reset or expiry.
//! "Steps not yet known" is its own stage rather than an optional field a
//! handler might forget to check.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::document::MipDocument;
use crate::session::SessionState;
use crate::transcriber::TranscriptOutline;

/// Collection mode, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhatsAppMode {
    Sequential,
    Batch,
}

/// What the session is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhatsAppStage {
    /// Nothing collected yet; no mode chosen.
    #[default]
    Idle,
    /// Accepting images (batch: unconstrained, sequential: up to step count).
    CollectingImages,
    /// Batch set closed; next audio completes the document.
    WaitingAudio,
}

/// Per-number session for the WhatsApp channel.
#[derive(Debug, Clone, Default)]
pub struct WhatsAppSession {
    pub mode: Option<WhatsAppMode>,
    pub stage: WhatsAppStage,
    pub images: Vec<PathBuf>,
    pub outline: Option<TranscriptOutline>,
    pub audio_path: Option<PathBuf>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl SessionState for WhatsAppSession {
    fn last_update(&self) -> DateTime<Utc> {
        self.last_update_at.unwrap_or_else(Utc::now)
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.created_at.get_or_insert(now);
        self.last_update_at = Some(now);
    }
}

/// Result of feeding one inbound event into the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhatsAppOutcome {
    /// Send this reply; keep collecting.
    Reply(String),
    /// Enough material arrived: assemble and dispatch the document.
    Render,
}

/// Commands understood on the WhatsApp channel (either language).
fn is_start_batch(text: &str) -> bool {
    matches!(text, "iniciar batch" | "start batch")
}

fn is_done(text: &str) -> bool {
    matches!(text, "pronto" | "done")
}

pub fn apply_text(session: &mut WhatsAppSession, text: &str) -> WhatsAppOutcome {
    let text = text.trim().to_lowercase();

    if is_start_batch(&text) {
        return match session.mode {
            None => {
                session.mode = Some(WhatsAppMode::Batch);
                session.stage = WhatsAppStage::CollectingImages;
                WhatsAppOutcome::Reply(
                    "Batch mode on. Send every image (screenshots or photos) in step \
                     order. When finished, send 'done' and then the audio with the \
                     instructions (title first, then one step per sentence)."
                        .to_string(),
                )
            }
            // Mode is fixed once chosen.
            Some(WhatsAppMode::Batch) => {
                WhatsAppOutcome::Reply("Batch mode is already active.".to_string())
            }
            Some(WhatsAppMode::Sequential) => WhatsAppOutcome::Reply(
                "This MIP already started in step-by-step mode; it will finish that way."
                    .to_string(),
            ),
        };
    }

    if is_done(&text) {
        return match (session.mode, session.stage) {
            (Some(WhatsAppMode::Batch), WhatsAppStage::CollectingImages) => {
                session.stage = WhatsAppStage::WaitingAudio;
                WhatsAppOutcome::Reply(format!(
                    "Got {} image(s). Now send the audio explaining the procedure: \
                     title first, then one step per sentence.",
                    session.images.len()
                ))
            }
            _ => WhatsAppOutcome::Reply(
                "'done' closes a batch image set, but there is none open. \
                 Send 'start batch' to begin one."
                    .to_string(),
            ),
        };
    }

    // Free-form text: greet idle sessions, otherwise point at what the
    // current stage is actually waiting for.
    match session.mode {
        None => WhatsAppOutcome::Reply(
            "Hi! I build procedure documents (MIPs).\n\n\
             Send an audio (title first, then one step per sentence) to go \
             step-by-step, or send 'start batch' to upload all images first."
                .to_string(),
        ),
        Some(_) => WhatsAppOutcome::Reply(unexpected_media_reply(session)),
    }
}

/// Whether an inbound audio is usable in the current state.
pub fn accepts_audio(session: &WhatsAppSession) -> bool {
    match (session.mode, session.stage) {
        // First audio of a default-mode session starts sequential collection.
        (None, _) => true,
        (Some(WhatsAppMode::Batch), WhatsAppStage::WaitingAudio) => true,
        _ => false,
    }
}

/// Whether an inbound image is usable in the current state.
pub fn accepts_image(session: &WhatsAppSession) -> bool {
    session.stage == WhatsAppStage::CollectingImages
}

/// Guidance for media that arrived in the wrong state.
pub fn unexpected_media_reply(session: &WhatsAppSession) -> String {
    match (session.mode, session.stage) {
        (None, _) => "Send an audio with the instructions first (title, then one step \
                      per sentence), or 'start batch' to upload images first."
            .to_string(),
        (Some(WhatsAppMode::Batch), WhatsAppStage::CollectingImages) => {
            "Finish the image set first: keep sending images, then 'done'.".to_string()
        }
        (Some(WhatsAppMode::Batch), _) => {
            "I'm waiting for the audio with the instructions now.".to_string()
        }
        (Some(WhatsAppMode::Sequential), _) => {
            "I already have the steps; now I need the step images.".to_string()
        }
    }
}

/// Accept a transcription outline.
///
/// In batch mode with the image set closed this completes the document. With
/// no mode chosen it selects sequential mode and opens image collection.
pub fn apply_transcription(
    session: &mut WhatsAppSession,
    outline: TranscriptOutline,
    audio_path: PathBuf,
) -> WhatsAppOutcome {
    session.audio_path = Some(audio_path);

    match (session.mode, session.stage) {
        (Some(WhatsAppMode::Batch), WhatsAppStage::WaitingAudio) => {
            session.outline = Some(outline);
            WhatsAppOutcome::Render
        }
        (None, _) => {
            let expected = outline.steps.len();
            session.mode = Some(WhatsAppMode::Sequential);
            session.stage = WhatsAppStage::CollectingImages;
            session.outline = Some(outline);
            WhatsAppOutcome::Reply(format!(
                "Audio received and transcribed! Now send the image for each step, \
                 in order ({expected} expected)."
            ))
        }
        // accepts_audio() gates the remaining combinations.
        _ => WhatsAppOutcome::Reply(unexpected_media_reply(session)),
    }
}

/// Accept one normalized image.
pub fn apply_image(session: &mut WhatsAppSession, image: PathBuf) -> WhatsAppOutcome {
    session.images.push(image);

    match session.mode {
        Some(WhatsAppMode::Batch) => WhatsAppOutcome::Reply(format!(
            "Image {} received and processed. Keep sending images, or send 'done' \
             when finished.",
            session.images.len()
        )),
        Some(WhatsAppMode::Sequential) => {
            let steps = session
                .outline
                .as_ref()
                .map(|o| o.steps.len())
                .unwrap_or_default();
            if session.images.len() >= steps {
                WhatsAppOutcome::Render
            } else {
                WhatsAppOutcome::Reply(
                    "Image received and processed. Keep sending the images in step order."
                        .to_string(),
                )
            }
        }
        // accepts_image() keeps this unreachable; answer sensibly anyway.
        None => WhatsAppOutcome::Reply(unexpected_media_reply(session)),
    }
}

/// Build the content model once the session is ready to render.
pub fn build_document(session: &WhatsAppSession) -> Option<MipDocument> {
    let outline = session.outline.as_ref()?;
    let title = outline.title.clone().unwrap_or_else(|| "MIP".to_string());
    Some(MipDocument::from_steps(
        title,
        &outline.steps,
        &session.images,
    ))
}
