//! Call orchestration integration tests
//!
//! Drive a widget wired to capability doubles through complete call flows.

use std::sync::Arc;
use std::time::Duration;

use beacon_call::dispatch::{DispatchError, DispatchErrorKind};
use beacon_call::events::RecognitionErrorKind;
use beacon_call::orchestrator::{CALL_ENDED_STATUS, VOICE_UNAVAILABLE_STATUS};
use beacon_call::recognition::{MIC_DENIED_STATUS, RECOGNITION_TROUBLE_STATUS};
use beacon_call::synthesis::speech_deadline;
use beacon_call::{
    CallOrchestrator, CallStatus, Capabilities, Command, Indicator, MicPermission, Role, Turn,
};
use tokio_test::{assert_pending, assert_ready_eq};

mod common;

use common::{MockRemote, RecordingPresenter, Widget};

/// Let the restart delay elapse and handle whatever became due
async fn after_restart_delay(widget: &mut Widget) {
    tokio::time::sleep(Duration::from_millis(250)).await;
    widget.settle();
}

#[tokio::test(start_paused = true)]
async fn test_welcome_message_is_display_only() {
    let widget = Widget::new();

    let log = widget.presenter.log();
    assert_eq!(log.turns.len(), 1);
    assert_eq!(log.turns[0].role, Role::Assistant);
    assert_eq!(log.indicators, vec![Indicator::Idle]);
    drop(log);

    assert!(widget.orchestrator.history().is_empty());
    assert!(widget.orchestrator.session_id().starts_with("web_"));
}

#[tokio::test(start_paused = true)]
async fn test_start_call_listens() {
    let mut widget = Widget::new();

    widget.orchestrator.start_call().await;

    let session = widget.orchestrator.session();
    assert_eq!(session.status, CallStatus::Listening);
    assert!(session.should_keep_listening);
    assert_eq!(session.mic_permission, MicPermission::Granted);
    assert_eq!(widget.mic.requests(), 1);
    assert_eq!(widget.recognition.starts(), 1);
    assert!(widget.orchestrator.is_capturing());

    let indicators = widget.presenter.log().indicators.clone();
    assert_eq!(
        indicators,
        vec![Indicator::Idle, Indicator::Connecting, Indicator::Listening]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transcript_reply_is_spoken() {
    let mut widget = Widget::new();
    widget.remote.reply("hi there");
    widget.orchestrator.start_call().await;

    widget.exchange("hello").await;

    assert_eq!(
        widget.orchestrator.history().turns(),
        &[Turn::user("hello"), Turn::assistant("hi there")]
    );
    assert_eq!(widget.synthesis.spoken(), vec!["hi there".to_string()]);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Speaking);
    assert!(widget.orchestrator.session().suspended_for_tts);
    assert!(!widget.orchestrator.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_transcript_during_speech_never_dispatched() {
    let mut widget = Widget::new();
    widget.remote.reply("hi there");
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    widget.recognition.transcript("ignored");
    widget.settle();
    tokio::task::yield_now().await;

    assert_eq!(widget.remote.calls(), 1);
    assert_eq!(widget.orchestrator.history().len(), 2);
    assert!(!widget.orchestrator.is_dispatching());
}

#[tokio::test(start_paused = true)]
async fn test_echo_from_stopping_handle_is_discarded() {
    let mut widget = Widget::new();
    widget.recognition.set_manual_end();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    // The old handle is still winding down and hears the assistant
    widget.recognition.transcript("reply to hello");
    widget.settle();
    tokio::task::yield_now().await;

    assert_eq!(widget.remote.calls(), 1);
    assert!(!widget.orchestrator.is_dispatching());

    widget.recognition.ended();
    widget.synthesis.finish();
    widget.settle();
    after_restart_delay(&mut widget).await;

    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_listening_resumes_after_speech() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    widget.synthesis.finish();
    widget.settle();
    assert!(!widget.orchestrator.session().suspended_for_tts);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Suspended);

    widget.next().await;
    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Listening);
    assert_eq!(widget.presenter.last_indicator(), Some(Indicator::Listening));
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_failure_resumes_like_completion() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    widget.synthesis.fail("synthesis-failed");
    widget.settle();
    assert!(!widget.orchestrator.session().suspended_for_tts);

    after_restart_delay(&mut widget).await;
    assert_eq!(widget.recognition.starts(), 2);
    assert!(widget.orchestrator.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_silent_synthesizer_cannot_deafen_the_call() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;
    assert!(widget.synthesis.playing());

    // The engine never reports back
    tokio::time::sleep(speech_deadline("reply to hello") + Duration::from_millis(100)).await;
    widget.settle();

    assert!(!widget.orchestrator.session().suspended_for_tts);
    assert!(!widget.orchestrator.is_speaking());
    assert_eq!(widget.synthesis.cancels(), 1);

    after_restart_delay(&mut widget).await;
    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Listening);

    // Listening works again
    widget.exchange("are you there?").await;
    assert_eq!(widget.remote.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_every_speak_clears_suspension() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;

    for (i, outcome) in ["finish", "fail", "end"].iter().enumerate() {
        widget.exchange(&format!("turn {i}")).await;
        assert!(widget.orchestrator.session().suspended_for_tts);

        match *outcome {
            "finish" => widget.synthesis.finish(),
            "fail" => widget.synthesis.fail("device lost"),
            _ => widget.orchestrator.end_call(),
        }
        widget.settle();
        assert!(!widget.orchestrator.session().suspended_for_tts);
        after_restart_delay(&mut widget).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_microphone_requested_once() {
    let mut widget = Widget::new();

    for _ in 0..3 {
        widget.orchestrator.start_call().await;
        widget.orchestrator.end_call();
        widget.settle();
    }

    assert_eq!(widget.mic.requests(), 1);
    assert_eq!(widget.mic.stops(), 0);
    assert_eq!(widget.recognition.starts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_microphone_denial() {
    let mut widget = Widget::new();
    widget.mic.deny();

    widget.orchestrator.start_call().await;

    let session = widget.orchestrator.session();
    assert_eq!(session.status, CallStatus::Idle);
    assert_eq!(session.mic_permission, MicPermission::Denied);
    assert!(!session.should_keep_listening);
    assert_eq!(widget.presenter.last_status().as_deref(), Some(MIC_DENIED_STATUS));
    assert_eq!(widget.recognition.starts(), 0);

    // No second prompt; chat still works
    widget.orchestrator.start_call().await;
    assert_eq!(widget.mic.requests(), 1);

    widget.orchestrator.send_text("typing instead");
    widget.next().await;
    assert_eq!(widget.orchestrator.history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_recognizer_permission_error_stops_restarts() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;

    widget.recognition.error(RecognitionErrorKind::PermissionDenied);
    widget.recognition.ended();
    widget.settle();
    after_restart_delay(&mut widget).await;

    let session = widget.orchestrator.session();
    assert!(!session.should_keep_listening);
    assert_eq!(session.mic_permission, MicPermission::Denied);
    assert_eq!(session.status, CallStatus::Suspended);
    assert_eq!(widget.recognition.starts(), 1);
    assert!(widget
        .presenter
        .log()
        .statuses
        .contains(&MIC_DENIED_STATUS.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_restart_and_surface_when_recurring() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;

    for attempt in 1..=3 {
        widget.recognition.error(RecognitionErrorKind::Network);
        widget.recognition.ended();
        widget.settle();
        after_restart_delay(&mut widget).await;
        assert_eq!(widget.recognition.starts(), attempt + 1);
    }

    assert!(widget.orchestrator.session().should_keep_listening);
    let statuses = widget.presenter.log().statuses.clone();
    assert_eq!(
        statuses
            .iter()
            .filter(|s| s.as_str() == RECOGNITION_TROUBLE_STATUS)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_end_call_twice() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;

    widget.orchestrator.end_call();
    widget.orchestrator.end_call();
    widget.settle();

    assert!(widget.recognition.stops() <= 1);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Ended);
    assert!(!widget.orchestrator.session().should_keep_listening);
    let ended = widget
        .presenter
        .log()
        .statuses
        .iter()
        .filter(|s| s.as_str() == CALL_ENDED_STATUS)
        .count();
    assert_eq!(ended, 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_call_cancels_speech() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    widget.orchestrator.end_call();
    widget.settle();

    assert_eq!(widget.synthesis.cancels(), 1);
    assert!(!widget.orchestrator.is_speaking());
    assert!(!widget.orchestrator.session().suspended_for_tts);

    after_restart_delay(&mut widget).await;
    assert_eq!(widget.recognition.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_restart_does_not_leak_into_new_call() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;

    // Natural end schedules a restart for the first call
    widget.recognition.ended();
    widget.settle();

    widget.orchestrator.end_call();
    widget.orchestrator.start_call().await;
    assert_eq!(widget.orchestrator.session().call_epoch, 2);
    assert_eq!(widget.recognition.starts(), 2);

    // The new handle ends before the first call's restart fires, leaving
    // no handle that would absorb a stray restart
    widget.recognition.ended();
    after_restart_delay(&mut widget).await;
    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Suspended);

    // Only the second call's own restart brings listening back
    after_restart_delay(&mut widget).await;
    assert_eq!(widget.recognition.starts(), 3);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_restart_into_call_while_old_handle_stops() {
    let mut widget = Widget::new();
    widget.recognition.set_manual_end();
    widget.orchestrator.start_call().await;

    widget.orchestrator.end_call();
    widget.orchestrator.start_call().await;
    assert_eq!(widget.recognition.starts(), 1);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Suspended);

    // The old handle's end hands over to the new call
    widget.recognition.ended();
    widget.settle();
    after_restart_delay(&mut widget).await;

    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_recording() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;

    widget.orchestrator.toggle_recording();
    widget.settle();
    assert_eq!(widget.recognition.stops(), 1);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Suspended);
    assert_eq!(widget.presenter.last_indicator(), Some(Indicator::Paused));

    // Paused stays paused
    after_restart_delay(&mut widget).await;
    assert_eq!(widget.recognition.starts(), 1);

    widget.orchestrator.toggle_recording();
    widget.settle();
    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_speech_is_honored() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    widget.orchestrator.toggle_recording();
    widget.synthesis.finish();
    widget.settle();
    after_restart_delay(&mut widget).await;

    assert_eq!(widget.recognition.starts(), 1);
    assert_eq!(widget.orchestrator.session().status, CallStatus::Suspended);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_mode_rearms_listening() {
    let mut widget = Widget::new();
    widget.orchestrator.toggle_persistent_mode();
    widget.orchestrator.start_call().await;

    widget.orchestrator.toggle_recording();
    widget.settle();
    assert!(!widget.orchestrator.session().should_keep_listening);

    // A typed message inside the call is answered out loud
    widget.orchestrator.send_text("typed");
    widget.next().await;
    assert_eq!(widget.synthesis.spoken(), vec!["reply to typed".to_string()]);

    widget.synthesis.finish();
    widget.settle();
    after_restart_delay(&mut widget).await;

    assert!(widget.orchestrator.session().should_keep_listening);
    assert_eq!(widget.recognition.starts(), 2);
    assert_eq!(widget.presenter.log().persistent, vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_mode_survives_end_call() {
    let mut widget = Widget::new();
    widget.orchestrator.toggle_persistent_mode();
    widget.orchestrator.start_call().await;
    widget.orchestrator.end_call();

    assert!(widget.orchestrator.session().persistent_call_mode);
}

#[tokio::test(start_paused = true)]
async fn test_typed_chat_outside_call_is_text_only() {
    let mut widget = Widget::new();

    widget.orchestrator.send_text("  hello  ");
    widget.next().await;

    assert_eq!(
        widget.orchestrator.history().turns(),
        &[Turn::user("hello"), Turn::assistant("reply to hello")]
    );
    assert!(widget.synthesis.spoken().is_empty());
    assert_eq!(widget.presenter.log().loading, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_input_is_ignored() {
    let mut widget = Widget::new();

    widget.orchestrator.send_text("   ");
    tokio::task::yield_now().await;

    assert!(!widget.orchestrator.is_dispatching());
    assert_eq!(widget.remote.calls(), 0);
    assert!(widget.orchestrator.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_is_serialized() {
    let (remote, gate) = MockRemote::gated();
    let mut widget = Widget::with_remote(remote);

    widget.orchestrator.send_text("one");
    widget.orchestrator.send_text("two");
    tokio::task::yield_now().await;

    assert_eq!(widget.remote.calls(), 1);
    assert_eq!(widget.orchestrator.history().len(), 1);
    assert_eq!(
        widget.presenter.last_status().as_deref(),
        Some(DispatchErrorKind::Busy.apology())
    );

    gate.notify_one();
    widget.next().await;
    assert!(!widget.orchestrator.is_dispatching());

    widget.orchestrator.send_text("three");
    gate.notify_one();
    widget.next().await;

    let requests = widget.remote.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].message, "one");
    assert_eq!(requests[0].history, vec![Turn::user("one")]);
    assert_eq!(requests[1].message, "three");
    assert_eq!(
        requests[1].history,
        vec![
            Turn::user("one"),
            Turn::assistant("reply to one"),
            Turn::user("three"),
        ]
    );
    assert_eq!(requests[0].session_id, requests[1].session_id);
}

#[tokio::test]
async fn test_pump_waits_for_pending_reply() {
    let (remote, gate) = MockRemote::gated();
    let mut widget = Widget::with_remote(remote);
    widget.orchestrator.send_text("hello");

    {
        let mut pump = tokio_test::task::spawn(widget.orchestrator.pump());
        assert_pending!(pump.poll());

        gate.notify_one();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(pump.is_woken());
        assert_ready_eq!(pump.poll(), true);
    }

    assert_eq!(widget.orchestrator.history().len(), 2);
    assert!(!widget.orchestrator.is_dispatching());
}

#[tokio::test(start_paused = true)]
async fn test_history_is_append_only() {
    let mut widget = Widget::new();
    widget.remote.fail(DispatchError::from_status(500, None));
    widget.orchestrator.start_call().await;

    let mut seen: Vec<Turn> = Vec::new();
    for text in ["first", "second", "third"] {
        widget.exchange(text).await;

        let turns = widget.orchestrator.history().turns();
        assert!(turns.len() >= seen.len());
        assert_eq!(&turns[..seen.len()], seen.as_slice());
        seen = turns.to_vec();

        widget.synthesis.finish();
        widget.settle();
        after_restart_delay(&mut widget).await;
    }

    // The failed first exchange kept only its user turn
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[0], Turn::user("first"));
    assert_eq!(seen[1], Turn::user("second"));
}

#[tokio::test(start_paused = true)]
async fn test_failure_apology_is_spoken_in_call() {
    let mut widget = Widget::new();
    widget
        .remote
        .fail(DispatchError::from_status(429, Some("quota exceeded".to_string())));
    widget.orchestrator.start_call().await;

    widget.exchange("hello").await;

    let apology = DispatchErrorKind::RateLimited.apology().to_string();
    assert_eq!(widget.presenter.log().apologies, vec![apology.clone()]);
    assert_eq!(widget.synthesis.spoken(), vec![apology]);
    assert_eq!(widget.orchestrator.history().turns(), &[Turn::user("hello")]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_everything_once() {
    let mut widget = Widget::new();
    widget.orchestrator.start_call().await;
    widget.exchange("hello").await;

    assert!(!widget.orchestrator.handle_command(Command::Shutdown).await);
    widget.orchestrator.shutdown();

    assert_eq!(widget.mic.stops(), 1);
    assert_eq!(widget.synthesis.cancels(), 1);
    assert!(widget.orchestrator.is_torn_down());

    widget.orchestrator.start_call().await;
    assert_eq!(widget.mic.requests(), 1);
    assert_eq!(widget.recognition.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_processes_commands_and_events() {
    let mut widget = Widget::new();
    let (tx, rx) = tokio::sync::mpsc::channel(8);

    tx.send(Command::StartCall).await.unwrap();
    tx.send(Command::SendText("hello".to_string())).await.unwrap();
    let recognition = widget.recognition.clone();
    let synthesis = widget.synthesis.clone();
    let driver = async move {
        while synthesis.spoken().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        synthesis.finish();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recognition.starts(), 2);
        tx.send(Command::Shutdown).await.unwrap();
    };

    tokio::join!(widget.orchestrator.run(rx), driver);

    assert!(widget.orchestrator.is_torn_down());
    assert_eq!(widget.orchestrator.history().len(), 2);
    assert_eq!(widget.mic.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_voice_unavailable_keeps_chat() {
    let presenter = RecordingPresenter::default();
    let remote = Arc::new(MockRemote::new());
    let mut orchestrator = CallOrchestrator::new(
        &common::test_config(),
        Capabilities::text_only(remote.clone()),
        Box::new(presenter.clone()),
    );

    orchestrator.start_call().await;
    assert_eq!(orchestrator.session().status, CallStatus::Idle);
    assert_eq!(
        presenter.last_status().as_deref(),
        Some(VOICE_UNAVAILABLE_STATUS)
    );

    orchestrator.send_text("hello");
    assert!(orchestrator.pump().await);
    assert_eq!(orchestrator.history().len(), 2);
    assert_eq!(remote.calls(), 1);
}
