//! End-to-end walks through both collection state machines, exercising the
//! pure transition functions the webhook handlers drive.

use std::path::PathBuf;

use mipgen::telegram_flow::{
    self, Command, ImageOutcome, TelegramSession, TelegramState, TextOutcome,
};
use mipgen::transcriber::split_title_and_steps;
use mipgen::whatsapp_flow::{self, WhatsAppMode, WhatsAppSession, WhatsAppStage, WhatsAppOutcome};

fn image(name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/{name}.jpg"))
}

#[test]
fn test_telegram_happy_path() {
    let mut session = TelegramSession::default();

    // /new opens the flow.
    let outcome = telegram_flow::apply_command(&mut session, Command::New);
    assert!(matches!(outcome, TextOutcome::Reply(_)));
    assert_eq!(session.state, TelegramState::WaitingTitle);

    // Title.
    let outcome = telegram_flow::apply_text(&mut session, "  Printer Setup  ");
    assert!(matches!(outcome, TextOutcome::Reply(_)));
    assert_eq!(session.title, "Printer Setup");
    assert_eq!(session.state, TelegramState::WaitingAudio);
    assert!(telegram_flow::accepts_audio(&session));
    assert!(!telegram_flow::accepts_image(&session));

    // Transcription with three steps.
    let reply = telegram_flow::apply_transcription(
        &mut session,
        "plug it in\nload paper\nprint a test page".to_string(),
        PathBuf::from("/tmp/audio.ogg"),
    );
    assert!(reply.contains("3 step(s)"));
    assert_eq!(session.steps.len(), 3);
    assert_eq!(session.state, TelegramState::WaitingImages);
    assert!(telegram_flow::accepts_image(&session));

    // Two photos report progress, the third completes.
    match telegram_flow::apply_image(&mut session, image("a")) {
        ImageOutcome::Progress {
            received,
            remaining,
        } => {
            assert_eq!(received, 1);
            assert_eq!(remaining, 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    match telegram_flow::apply_image(&mut session, image("b")) {
        ImageOutcome::Progress { remaining, .. } => assert_eq!(remaining, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    match telegram_flow::apply_image(&mut session, image("c")) {
        ImageOutcome::Complete {
            title,
            steps,
            images,
        } => {
            assert_eq!(title, "Printer Setup");
            assert_eq!(steps, 3);
            assert_eq!(images, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.state, TelegramState::WaitingConfirmation);

    // Anything but yes/no re-prompts without moving the state.
    let outcome = telegram_flow::apply_text(&mut session, "maybe");
    assert!(matches!(outcome, TextOutcome::Reply(_)));
    assert_eq!(session.state, TelegramState::WaitingConfirmation);

    // Affirmative triggers rendering.
    let outcome = telegram_flow::apply_text(&mut session, "Sim");
    assert_eq!(outcome, TextOutcome::Render);

    let doc = telegram_flow::build_document(&session);
    assert_eq!(doc.title, "Printer Setup");
    assert_eq!(doc.items.len(), 3);
    assert!(doc.items.iter().all(|item| item.image.is_some()));
}

#[test]
fn test_telegram_negative_confirmation_discards() {
    let mut session = TelegramSession::default();
    telegram_flow::apply_command(&mut session, Command::New);
    telegram_flow::apply_text(&mut session, "Router Reset");
    telegram_flow::apply_transcription(
        &mut session,
        "hold the button".to_string(),
        PathBuf::from("/tmp/audio.ogg"),
    );
    telegram_flow::apply_image(&mut session, image("a"));
    assert_eq!(session.state, TelegramState::WaitingConfirmation);

    let outcome = telegram_flow::apply_text(&mut session, "no");
    assert!(matches!(outcome, TextOutcome::ClearSession(_)));
    assert!(!session.in_progress());
    assert!(session.images.is_empty());
}

#[test]
fn test_telegram_new_rejected_mid_flow() {
    let mut session = TelegramSession::default();
    telegram_flow::apply_command(&mut session, Command::New);
    telegram_flow::apply_text(&mut session, "Router Reset");

    let outcome = telegram_flow::apply_command(&mut session, Command::New);
    match outcome {
        TextOutcome::Reply(text) => assert!(text.contains("already in progress")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    // Collected work survives the rejected restart.
    assert_eq!(session.title, "Router Reset");
    assert_eq!(session.state, TelegramState::WaitingAudio);
}

#[test]
fn test_telegram_cancel_clears_session() {
    let mut session = TelegramSession::default();
    telegram_flow::apply_command(&mut session, Command::New);
    telegram_flow::apply_text(&mut session, "Router Reset");

    let outcome = telegram_flow::apply_command(&mut session, Command::Cancel);
    assert!(matches!(outcome, TextOutcome::ClearSession(_)));
    assert!(!session.in_progress());
}

#[test]
fn test_telegram_media_in_wrong_state_is_guidance_only() {
    let session = TelegramSession::default();
    assert!(!telegram_flow::accepts_audio(&session));
    assert!(!telegram_flow::accepts_image(&session));
    let reply = telegram_flow::unexpected_media_reply(&session);
    assert!(reply.contains("/new"));
}

#[test]
fn test_whatsapp_sequential_flow() {
    let mut session = WhatsAppSession::default();

    // The first audio fixes the outline and opens image collection.
    let outline = split_title_and_steps("Printer Setup\nplug it in\nload paper");
    let outcome = whatsapp_flow::apply_transcription(
        &mut session,
        outline,
        PathBuf::from("/tmp/audio.ogg"),
    );
    match outcome {
        WhatsAppOutcome::Reply(text) => assert!(text.contains("2 expected")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.mode, Some(WhatsAppMode::Sequential));
    assert_eq!(session.stage, WhatsAppStage::CollectingImages);

    // No second audio while collecting.
    assert!(!whatsapp_flow::accepts_audio(&session));

    let outcome = whatsapp_flow::apply_image(&mut session, image("a"));
    assert!(matches!(outcome, WhatsAppOutcome::Reply(_)));
    let outcome = whatsapp_flow::apply_image(&mut session, image("b"));
    assert_eq!(outcome, WhatsAppOutcome::Render);

    let doc = whatsapp_flow::build_document(&session).unwrap();
    assert_eq!(doc.title, "Printer Setup");
    assert_eq!(doc.items.len(), 2);
    assert!(doc.items.iter().all(|item| item.image.is_some()));
}

#[test]
fn test_whatsapp_batch_flow_pairs_positionally() {
    let mut session = WhatsAppSession::default();

    let outcome = whatsapp_flow::apply_text(&mut session, "Start Batch");
    assert!(matches!(outcome, WhatsAppOutcome::Reply(_)));
    assert_eq!(session.mode, Some(WhatsAppMode::Batch));
    assert!(whatsapp_flow::accepts_image(&session));
    assert!(!whatsapp_flow::accepts_audio(&session));

    // Four images, then close the set.
    for name in ["a", "b", "c", "d"] {
        let outcome = whatsapp_flow::apply_image(&mut session, image(name));
        assert!(matches!(outcome, WhatsAppOutcome::Reply(_)));
    }
    let outcome = whatsapp_flow::apply_text(&mut session, "pronto");
    match outcome {
        WhatsAppOutcome::Reply(text) => assert!(text.contains("4 image(s)")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.stage, WhatsAppStage::WaitingAudio);
    assert!(whatsapp_flow::accepts_audio(&session));
    assert!(!whatsapp_flow::accepts_image(&session));

    // Audio outlines only two steps: surplus images are dropped in pairing.
    let outline = split_title_and_steps("Printer Setup\nplug it in\nload paper");
    let outcome = whatsapp_flow::apply_transcription(
        &mut session,
        outline,
        PathBuf::from("/tmp/audio.ogg"),
    );
    assert_eq!(outcome, WhatsAppOutcome::Render);

    let doc = whatsapp_flow::build_document(&session).unwrap();
    assert_eq!(doc.items.len(), 2);
    assert!(doc.items.iter().all(|item| item.image.is_some()));
}

#[test]
fn test_whatsapp_mode_is_fixed_once_chosen() {
    let mut session = WhatsAppSession::default();
    let outline = split_title_and_steps("Title\nstep");
    whatsapp_flow::apply_transcription(&mut session, outline, PathBuf::from("/tmp/a.ogg"));
    assert_eq!(session.mode, Some(WhatsAppMode::Sequential));

    let outcome = whatsapp_flow::apply_text(&mut session, "start batch");
    match outcome {
        WhatsAppOutcome::Reply(text) => assert!(text.contains("step-by-step")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.mode, Some(WhatsAppMode::Sequential));
}

#[test]
fn test_whatsapp_image_before_any_mode_gets_guidance() {
    let session = WhatsAppSession::default();
    assert!(!whatsapp_flow::accepts_image(&session));
    let reply = whatsapp_flow::unexpected_media_reply(&session);
    assert!(reply.contains("audio"));
}

#[test]
fn test_whatsapp_free_text_mid_collection_gets_stage_guidance() {
    let mut idle = WhatsAppSession::default();
    let greeting = match whatsapp_flow::apply_text(&mut idle, "hello") {
        WhatsAppOutcome::Reply(text) => text,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(greeting.contains("start batch"));

    // Mid-sequential collection the bot must ask for images, not audio.
    let mut session = WhatsAppSession::default();
    let outline = split_title_and_steps("Title\nstep one\nstep two");
    whatsapp_flow::apply_transcription(&mut session, outline, PathBuf::from("/tmp/a.ogg"));
    let reply = match whatsapp_flow::apply_text(&mut session, "ok") {
        WhatsAppOutcome::Reply(text) => text,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_ne!(reply, greeting);
    assert!(reply.contains("images"));

    // Mid-batch collection the bot must point at 'done'.
    let mut batch = WhatsAppSession::default();
    whatsapp_flow::apply_text(&mut batch, "start batch");
    let reply = match whatsapp_flow::apply_text(&mut batch, "hello") {
        WhatsAppOutcome::Reply(text) => text,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_ne!(reply, greeting);
    assert!(reply.contains("done"));
}

#[test]
fn test_whatsapp_done_without_open_batch() {
    let mut session = WhatsAppSession::default();
    let outcome = whatsapp_flow::apply_text(&mut session, "done");
    match outcome {
        WhatsAppOutcome::Reply(text) => assert!(text.contains("none open")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.mode, None);
}

#[test]
fn test_whatsapp_title_only_audio_yields_no_steps() {
    let outline = split_title_and_steps("Printer Setup");
    assert!(outline.steps.is_empty());
}
