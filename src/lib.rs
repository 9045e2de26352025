//! # mipgen
//!
//! Webhook-driven chat bot that collects a procedure title, a transcribed
//! voice recording and step photos over Telegram or WhatsApp, then renders
//! the result as a MIP document in several formats and sends the files back.

pub mod assembler;
pub mod bot;
pub mod channel;
pub mod config;
pub mod document;
pub mod image_processor;
pub mod render;
pub mod server;
pub mod session;
pub mod telegram_flow;
pub mod transcriber;
pub mod whatsapp_flow;
