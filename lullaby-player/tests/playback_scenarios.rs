//! End-to-end playback scenarios
//!
//! Exercises the controller surface: start/stop lifecycle, navigation over
//! failing entries, command serialization and session interruptions.

mod helpers;

use helpers::{advance, CommandTrace, PlayerBuilder, TestPlayer};
use lullaby_common::{PlaybackMode, SlotId};
use lullaby_player::engine::{EngineCall, Transport};
use lullaby_player::playback::SessionInterruption;
use lullaby_player::Error;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_start_on_empty_playlist() {
    let player = PlayerBuilder::new(Vec::<String>::new()).build();

    let result = player.controller.start(None).await;

    assert!(matches!(result, Err(Error::NoValidTarget(_))), "got {:?}", result);
    assert_eq!(player.mode(), PlaybackMode::Idle);
    assert_eq!(player.session.activations(), 0);
    assert!(player.engine.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_with_fade_in() {
    let player = PlayerBuilder::new(["a.flac"]).build();

    player
        .controller
        .start(Some(Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(player.mode(), PlaybackMode::Playing);
    assert_eq!(player.engine.gain(SlotId::A), 1.0);
    assert_eq!(player.engine.transport(SlotId::A), Transport::Playing);
    assert!(player.session.is_active());
    assert_eq!(
        player.engine.count_calls(|call| matches!(call, EngineCall::Ramp { to, .. } if *to == 1.0)),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_skips_corrupt_current_entry() {
    let player = PlayerBuilder::new(["corrupt.flac", "b.flac"])
        .failing("corrupt")
        .build();

    player.controller.start(None).await.unwrap();

    assert_eq!(player.active_locator().as_deref(), Some("b.flac"));
    assert_eq!(player.playlist.index(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let player = TestPlayer::playing(["a.flac"]).await;

    let result = player.controller.start(None).await;

    assert!(matches!(result, Err(Error::InvalidState(_))), "got {:?}", result);
    assert_eq!(player.mode(), PlaybackMode::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_pause_twice_is_idempotent() {
    let player = TestPlayer::playing(["a.flac"]).await;

    player.controller.pause().await.unwrap();
    player.controller.pause().await.unwrap();

    assert_eq!(player.mode(), PlaybackMode::Paused);
    assert_eq!(player.engine.transport(SlotId::A), Transport::Paused);
    assert_eq!(player.log.count("ModeChanged"), 3); // idle->preparing->playing->paused

    player.controller.resume().await.unwrap();
    player.controller.resume().await.unwrap();
    assert_eq!(player.mode(), PlaybackMode::Playing);
    assert_eq!(player.engine.transport(SlotId::A), Transport::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_skip_passes_over_corrupt_entry() {
    let player = PlayerBuilder::new(["a.flac", "b-corrupt.flac", "c.flac"])
        .failing("corrupt")
        .build();
    player.controller.start(None).await.unwrap();

    player.controller.skip_to_next().await.unwrap();

    assert_eq!(player.active_locator().as_deref(), Some("c.flac"));
    assert_eq!(player.playlist.index(), 2);
    assert_eq!(player.playlist.history(), vec![2]);
    assert_eq!(player.log.track_changes(), vec!["a.flac", "c.flac"]);
}

#[tokio::test(start_paused = true)]
async fn test_all_candidates_fail() {
    let player = PlayerBuilder::new(["a.flac", "bad-1", "bad-2", "bad-3", "e.flac"])
        .failing("bad")
        .build();
    player.controller.start(None).await.unwrap();

    let result = player.controller.skip_to_next().await;

    assert!(matches!(result, Err(Error::NoValidTarget(_))), "got {:?}", result);
    assert_eq!(player.mode(), PlaybackMode::Playing);
    assert_eq!(player.active_locator().as_deref(), Some("a.flac"));
    assert_eq!(player.playlist.index(), 0);
    assert_eq!(
        player.engine.count_calls(|call| matches!(call, EngineCall::Load { locator, .. } if locator.starts_with("bad"))),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_skip_previous_at_start_of_playlist() {
    let player = TestPlayer::playing(["a.flac", "b.flac"]).await;

    let result = player.controller.skip_to_previous().await;

    assert!(matches!(result, Err(Error::NoValidTarget(_))));
    assert_eq!(player.active_locator().as_deref(), Some("a.flac"));
}

#[tokio::test(start_paused = true)]
async fn test_commands_never_overlap() {
    let player = TestPlayer::playing(["a.flac", "b.flac"]).await;

    let skip = player.spawn_skip();
    advance(100).await;
    let pause = {
        let controller = player.controller.clone();
        tokio::spawn(async move { controller.pause().await })
    };
    advance(10).await;
    let resume = {
        let controller = player.controller.clone();
        tokio::spawn(async move { controller.resume().await })
    };

    skip.await.unwrap().unwrap();
    pause.await.unwrap().unwrap();
    resume.await.unwrap().unwrap();

    let trace = player.log.command_trace();
    let labels: Vec<&str> = trace
        .iter()
        .filter_map(|entry| match entry {
            CommandTrace::Started { label, .. } => Some(label.as_str()),
            CommandTrace::Settled { .. } => None,
        })
        .collect();
    assert_eq!(labels, vec!["start", "skip_to_next", "pause", "resume"]);

    for pair in trace.chunks(2) {
        match pair {
            [CommandTrace::Started { sequence: started, .. }, CommandTrace::Settled { sequence: settled, success, .. }] => {
                assert_eq!(started, settled);
                assert!(*success);
            }
            other => panic!("commands overlapped: {:?}", other),
        }
    }

    assert_eq!(player.active_locator().as_deref(), Some("b.flac"));
    assert_eq!(player.mode(), PlaybackMode::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_skip_while_paused_cuts_over_silently() {
    let player = TestPlayer::playing(["a.flac", "b.flac"]).await;
    player.controller.pause().await.unwrap();

    player.controller.skip_to_next().await.unwrap();

    assert_eq!(player.mode(), PlaybackMode::Paused);
    assert_eq!(player.active_locator().as_deref(), Some("b.flac"));
    assert_eq!(player.engine.transport(SlotId::B), Transport::Stopped);
    assert_eq!(player.log.count("CrossfadeStarted"), 0);

    player.controller.resume().await.unwrap();
    assert_eq!(player.engine.transport(SlotId::B), Transport::Playing);
    assert_eq!(player.engine.gain(SlotId::B), 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_pending_commands() {
    let player = TestPlayer::playing(["a.flac", "b.flac", "c.flac"]).await;
    let skip = player.spawn_skip();
    advance(200).await;

    let (queued, stopped) = tokio::join!(
        player.controller.skip_to_next(),
        player.controller.stop(None)
    );

    assert!(matches!(queued, Err(Error::Cancelled(_))), "got {:?}", queued);
    assert!(matches!(skip.await.unwrap(), Err(Error::Cancelled(_))));
    stopped.unwrap();

    assert_eq!(player.mode(), PlaybackMode::Finished);
    assert_eq!(player.playlist.index(), 0);
    assert_eq!(player.session.deactivations(), 1);
    // The discarded skip never reached the worker
    assert_eq!(
        player
            .log
            .command_trace()
            .iter()
            .filter(|entry| matches!(entry, CommandTrace::Started { label, .. } if label == "skip_to_next"))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_queue_full_rejects_at_admission() {
    let player = TestPlayer::playing(["a.flac", "b.flac"]).await;
    let c = &player.controller;

    // Admitted in one poll, before the worker picks any of them up
    let (first, second, third, fourth) =
        tokio::join!(c.skip_to_next(), c.skip_to_next(), c.skip_to_next(), c.skip_to_next());

    assert!(matches!(fourth, Err(Error::QueueFull(3))), "got {:?}", fourth);
    assert!(matches!(first, Err(Error::Cancelled(_))), "got {:?}", first);
    assert!(matches!(second, Err(Error::Cancelled(_))), "got {:?}", second);
    third.unwrap();

    assert_eq!(player.playlist.index(), 1);
    assert_eq!(player.log.count("CrossfadeCommitted"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_track_ending_crossfades_to_next() {
    let player = TestPlayer::playing(["a.flac", "b.flac"]).await;

    player.controller.track_ending().await.unwrap();

    assert_eq!(player.active_locator().as_deref(), Some("b.flac"));
    assert_eq!(player.mode(), PlaybackMode::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_track_ending_at_end_of_playlist_finishes() {
    let player = TestPlayer::playing(["only.flac"]).await;

    player.controller.track_ending().await.unwrap();

    assert_eq!(player.mode(), PlaybackMode::Finished);
    assert_eq!(player.engine.transport(SlotId::A), Transport::Stopped);
    assert!(player.engine.gain(SlotId::A) < 0.01);
    assert!(!player.session.is_active());
    assert!(player.controller.snapshot().slot(SlotId::A).track.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cuts_final_fade_out_short() {
    let player = PlayerBuilder::new(["only.flac"])
        .configure(|config| config.crossfade.duration_ms = 6000)
        .build();
    player.controller.start(None).await.unwrap();

    let ending = {
        let controller = player.controller.clone();
        tokio::spawn(async move { controller.track_ending().await })
    };
    advance(100).await;
    assert_eq!(player.mode(), PlaybackMode::FadingOut);

    let issued = Instant::now();
    player.controller.stop(None).await.unwrap();

    assert!(issued.elapsed() < Duration::from_millis(500), "stop waited {:?}", issued.elapsed());
    ending.await.unwrap().unwrap();
    assert_eq!(player.mode(), PlaybackMode::Finished);
    assert_eq!(player.engine.transport(SlotId::A), Transport::Stopped);
    assert_eq!(player.session.deactivations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_track_ending_wraps_when_looping() {
    let player = PlayerBuilder::new(["a.flac", "b.flac"]).looping().build();
    player.controller.start(None).await.unwrap();

    player.controller.track_ending().await.unwrap();
    player.controller.track_ending().await.unwrap();

    assert_eq!(player.active_locator().as_deref(), Some("a.flac"));
    assert_eq!(player.playlist.index(), 0);
    assert_eq!(player.playlist.history(), vec![1, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_session_interruption_pauses_and_resumes() {
    let player = TestPlayer::playing(["a.flac"]).await;

    player
        .controller
        .handle_interruption(SessionInterruption::Began)
        .await
        .unwrap();
    assert_eq!(player.mode(), PlaybackMode::Paused);

    player
        .controller
        .handle_interruption(SessionInterruption::Ended { should_resume: false })
        .await
        .unwrap();
    assert_eq!(player.mode(), PlaybackMode::Paused);

    player
        .controller
        .handle_interruption(SessionInterruption::Ended { should_resume: true })
        .await
        .unwrap();
    assert_eq!(player.mode(), PlaybackMode::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_finish() {
    let player = TestPlayer::playing(["a.flac", "b.flac"]).await;
    player.controller.stop(None).await.unwrap();
    assert_eq!(player.mode(), PlaybackMode::Finished);

    player.controller.start(None).await.unwrap();

    assert_eq!(player.mode(), PlaybackMode::Playing);
    assert_eq!(player.session.activations(), 2);
    assert!(player.controller.snapshot().is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_refuses_new_commands() {
    let player = TestPlayer::playing(["a.flac"]).await;

    player.controller.shutdown().await;

    assert!(matches!(player.controller.pause().await, Err(Error::Shutdown)));
}
