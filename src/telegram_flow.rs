//! # Telegram Flow Module
//!
//! The strictly sequential per-user state machine for the Telegram channel:
//! `/new` → title → audio (transcribed into steps) → one photo per step →
//! confirmation → render. All transitions are pure functions over
//! [`TelegramSession`]; the webhook handler performs the surrounding I/O
//! (downloads, transcription, rendering) and feeds the results in.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::document::MipDocument;
use crate::session::SessionState;
use crate::transcriber::split_steps;

/// Replies in either language accepted at the confirmation prompt.
pub const AFFIRMATIVE_TOKENS: [&str; 4] = ["sim", "s", "yes", "y"];
pub const NEGATIVE_TOKENS: [&str; 4] = ["não", "nao", "n", "no"];

/// Collection progress for one Telegram user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelegramState {
    #[default]
    Initial,
    WaitingTitle,
    WaitingAudio,
    WaitingImages,
    WaitingConfirmation,
}

/// Per-chat session for the Telegram channel.
#[derive(Debug, Clone)]
pub struct TelegramSession {
    pub state: TelegramState,
    pub title: String,
    pub transcription: String,
    pub audio_path: Option<PathBuf>,
    pub steps: Vec<String>,
    pub images: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Default for TelegramSession {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            state: TelegramState::Initial,
            title: String::new(),
            transcription: String::new(),
            audio_path: None,
            steps: Vec::new(),
            images: Vec::new(),
            created_at: now,
            last_update: now,
        }
    }
}

impl SessionState for TelegramSession {
    fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}

impl TelegramSession {
    pub fn reset(&mut self) {
        *self = TelegramSession::default();
    }

    /// True once any collection step has started.
    pub fn in_progress(&self) -> bool {
        self.state != TelegramState::Initial
    }
}

/// Recognized bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    New,
    Status,
    Cancel,
    Help,
    Unknown,
}

/// Parse a leading-slash command; `None` for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    Some(match text.to_lowercase().as_str() {
        "/start" => Command::Start,
        "/new" => Command::New,
        "/status" => Command::Status,
        "/cancel" => Command::Cancel,
        "/help" => Command::Help,
        _ => Command::Unknown,
    })
}

/// Result of feeding a text message (or command) into the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// Send this reply; the session stays alive.
    Reply(String),
    /// Send this reply, then destroy the session.
    ClearSession(String),
    /// The user confirmed: assemble and dispatch the document.
    Render,
}

/// Result of accepting one normalized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// More images are still expected.
    Progress { received: usize, remaining: usize },
    /// All images collected; the session moved to confirmation.
    Complete {
        title: String,
        steps: usize,
        images: usize,
    },
}

pub fn apply_command(session: &mut TelegramSession, command: Command) -> TextOutcome {
    match command {
        Command::Start => TextOutcome::Reply(
            "🤖 MIP Generator Bot\n\n\
             I help you build procedure instruction documents (MIPs).\n\n\
             📋 How it works:\n\
             1. Send the procedure title\n\
             2. Record an audio describing the steps (one per sentence line)\n\
             3. Send one photo per step\n\
             4. Receive the finished MIP files\n\n\
             Use /new to begin!"
                .to_string(),
        ),
        Command::Help => TextOutcome::Reply(
            "📚 Available commands:\n\n\
             /start - About this bot\n\
             /new - Start a new MIP\n\
             /status - Current progress\n\
             /cancel - Discard the MIP in progress\n\
             /help - This help"
                .to_string(),
        ),
        Command::New => {
            if session.in_progress() {
                // One outstanding procedure per user; a second /new is
                // rejected rather than silently discarding collected work.
                TextOutcome::Reply(
                    "⚠️ A MIP is already in progress. Use /cancel first if you want to start over."
                        .to_string(),
                )
            } else {
                session.reset();
                session.state = TelegramState::WaitingTitle;
                TextOutcome::Reply(
                    "🆕 New MIP\n\nFirst, send the procedure title.\n\n\
                     Example: 'HP Printer Setup'"
                        .to_string(),
                )
            }
        }
        Command::Status => TextOutcome::Reply(status_message(session)),
        Command::Cancel => {
            session.reset();
            TextOutcome::ClearSession("❌ MIP cancelled. Use /new to start again.".to_string())
        }
        Command::Unknown => TextOutcome::Reply(
            "❓ Unrecognized command. Use /help to see the available commands.".to_string(),
        ),
    }
}

pub fn apply_text(session: &mut TelegramSession, text: &str) -> TextOutcome {
    let text = text.trim();

    match session.state {
        TelegramState::WaitingTitle => {
            session.title = text.to_string();
            session.state = TelegramState::WaitingAudio;
            TextOutcome::Reply(
                "✅ Title set! Now send an audio describing the procedure steps.\n\n\
                 💡 Tip: speak clearly and pause between steps for a better transcription."
                    .to_string(),
            )
        }
        TelegramState::WaitingConfirmation => {
            let answer = text.to_lowercase();
            if AFFIRMATIVE_TOKENS.contains(&answer.as_str()) {
                TextOutcome::Render
            } else if NEGATIVE_TOKENS.contains(&answer.as_str()) {
                session.reset();
                TextOutcome::ClearSession(
                    "❌ MIP discarded. Use /new to start again.".to_string(),
                )
            } else {
                TextOutcome::Reply("Please reply 'yes' or 'no'.".to_string())
            }
        }
        TelegramState::WaitingAudio => TextOutcome::Reply(
            "🎙 I'm waiting for an audio with the procedure steps. \
             Record one, or use /cancel to discard this MIP."
                .to_string(),
        ),
        TelegramState::WaitingImages => TextOutcome::Reply(
            "📸 I'm waiting for the step photos. \
             Send the next one, or use /cancel to discard this MIP."
                .to_string(),
        ),
        TelegramState::Initial => TextOutcome::Reply(
            "Hello! I'm the MIP generator bot.\n\n\
             Use /new to create a MIP or /help to see every command."
                .to_string(),
        ),
    }
}

/// Whether an inbound audio is expected in the current state.
pub fn accepts_audio(session: &TelegramSession) -> bool {
    session.state == TelegramState::WaitingAudio
}

/// Whether an inbound photo is expected in the current state.
pub fn accepts_image(session: &TelegramSession) -> bool {
    session.state == TelegramState::WaitingImages
}

/// Guidance for media that arrived in the wrong state. Not an error and
/// never a transition.
pub fn unexpected_media_reply(session: &TelegramSession) -> String {
    match session.state {
        TelegramState::Initial | TelegramState::WaitingTitle => {
            "❌ Send media only when asked for it. Use /new to start a MIP.".to_string()
        }
        TelegramState::WaitingAudio => {
            "🎙 Right now I need the audio with the steps, nothing else.".to_string()
        }
        TelegramState::WaitingImages => {
            "📸 Right now I need the step photos, nothing else.".to_string()
        }
        TelegramState::WaitingConfirmation => {
            "Please reply 'yes' or 'no' to finish the MIP first.".to_string()
        }
    }
}

/// Accept a successful transcription: derive the step list and start
/// collecting images.
pub fn apply_transcription(
    session: &mut TelegramSession,
    transcription: String,
    audio_path: PathBuf,
) -> String {
    let steps = split_steps(&transcription);
    debug_assert!(!steps.is_empty(), "empty transcriptions are rejected upstream");

    session.transcription = transcription.clone();
    session.audio_path = Some(audio_path);
    session.steps = steps;
    session.state = TelegramState::WaitingImages;

    format!(
        "✅ Audio transcribed!\n\n📝 Transcription:\n{}\n\n\
         📸 Now send the step photos, one at a time.\n\
         You described {} step(s), so send {} photo(s).",
        transcription,
        session.steps.len(),
        session.steps.len()
    )
}

/// Accept one normalized image and report progress or completion.
pub fn apply_image(session: &mut TelegramSession, image: PathBuf) -> ImageOutcome {
    session.images.push(image);

    let received = session.images.len();
    if received < session.steps.len() {
        ImageOutcome::Progress {
            received,
            remaining: session.steps.len() - received,
        }
    } else {
        session.state = TelegramState::WaitingConfirmation;
        ImageOutcome::Complete {
            title: session.title.clone(),
            steps: session.steps.len(),
            images: received,
        }
    }
}

/// Build the content model for rendering from a confirmed session.
pub fn build_document(session: &TelegramSession) -> MipDocument {
    MipDocument::from_steps(session.title.clone(), &session.steps, &session.images)
}

fn status_message(session: &TelegramSession) -> String {
    if !session.in_progress() {
        return "📊 Status: no MIP in progress.\nUse /new to start one.".to_string();
    }

    let stage = match session.state {
        TelegramState::Initial => "idle",
        TelegramState::WaitingTitle => "waiting for title",
        TelegramState::WaitingAudio => "waiting for audio",
        TelegramState::WaitingImages => "waiting for photos",
        TelegramState::WaitingConfirmation => "waiting for confirmation",
    };

    let mut status = format!(
        "📊 MIP status:\n• Stage: {}\n• Title: {}\n• Steps: {}\n• Photos: {}",
        stage,
        if session.title.is_empty() {
            "not set"
        } else {
            &session.title
        },
        session.steps.len(),
        session.images.len()
    );
    if !session.transcription.is_empty() {
        status.push_str("\n• Transcription: ✅");
    }
    status
}
