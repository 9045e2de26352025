//! Webhook handlers for the two chat channels.
//!
//! - `telegram`: Telegram Bot API `Update` payloads (JSON)
//! - `whatsapp`: Twilio webhook payloads (form-encoded)
//!
//! Each handler looks up the per-user session, feeds the event into the
//! channel's state machine and performs the surrounding I/O (media
//! download, transcription, assembly). All failures are converted to a
//! user-facing reply plus a log entry at this boundary.

pub mod telegram;
pub mod whatsapp;

pub use telegram::telegram_webhook;
pub use whatsapp::whatsapp_webhook;
