//! Playback state machine: transitions, idempotence, errors and end of stream

use ccplayer_core::player::{MediaStoppedAction, PlaybackError, State};
use ccplayer_core::utils::tick_from_ms;
use ccplayer_core::{Capabilities, CoreError, Media};
use ccplayer_integration_tests::{
    is_valid_path, player_with, test_config, test_player, wait_for, wait_for_event,
    wait_for_state, Event,
};
use proptest::prelude::*;
use std::time::Duration;

#[test]
fn test_start_requires_media() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    assert!(matches!(guard.start(), Err(CoreError::NoMedia)));
    assert_eq!(guard.state(), State::Stopped);
    assert!(recorder.states().is_empty());
}

#[test]
fn test_full_lifecycle() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert_eq!(guard.state(), State::Started);

    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();
    assert_eq!(guard.state(), State::Paused);
    guard.resume();
    assert_eq!(guard.state(), State::Playing);

    guard.stop();
    assert_eq!(guard.state(), State::Stopping);
    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));

    assert_eq!(
        recorder.states(),
        vec![
            State::Started,
            State::Playing,
            State::Paused,
            State::Playing,
            State::Stopping,
            State::Stopped
        ]
    );
    assert_eq!(guard.time(), None);
    assert_eq!(guard.length(), None);
    assert!(guard.capabilities().is_empty());
}

#[test]
fn test_pause_and_resume_are_idempotent() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    let before = recorder.states().len();
    guard.resume();
    assert_eq!(recorder.states().len(), before);

    guard.pause();
    let paused = recorder.states().len();
    assert_eq!(paused, before + 1);
    guard.pause();
    guard.pause();
    assert_eq!(recorder.states().len(), paused);

    guard.resume();
    guard.resume();
    assert_eq!(recorder.states().len(), paused + 1);
    assert_eq!(guard.state(), State::Playing);
}

#[test]
fn test_pause_ignored_without_capability() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;can_pause=false")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.pause();
    guard.resume();
    guard.toggle_pause();

    assert!(!guard.capabilities().contains(Capabilities::PAUSE));
    assert!(!guard.can_pause());
    assert!(!recorder.states().contains(&State::Paused));
    assert_eq!(guard.state(), State::Playing);
}

#[test]
fn test_start_while_stopping_restarts() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.stop();
    guard.start().unwrap();
    assert_eq!(guard.state(), State::Stopping);

    assert!(wait_for(&mut guard, &recorder, |_| {
        recorder.states().iter().filter(|s| **s == State::Playing).count() == 2
    }));
    assert!(is_valid_path(&recorder.states()));
}

#[test]
fn test_open_failure_reports_error_and_stops() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://error=open")));
    guard.start().unwrap();

    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
    assert_eq!(guard.error(), PlaybackError::Generic);
    assert_eq!(
        recorder.states(),
        vec![State::Started, State::Stopping, State::Stopped]
    );

    // Starting another media clears the error
    guard.set_current_media(Some(Media::new("mock://length=1s")));
    guard.start().unwrap();
    assert_eq!(guard.error(), PlaybackError::None);
    let errors: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Error(_)))
        .collect();
    assert_eq!(
        errors,
        vec![
            Event::Error(PlaybackError::Generic),
            Event::Error(PlaybackError::None)
        ]
    );
}

#[test]
fn test_demux_error_forces_stop() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;error_at=50ms")));
    guard.start().unwrap();

    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
    assert_eq!(guard.error(), PlaybackError::Generic);
    assert!(is_valid_path(&recorder.states()));
}

#[test]
fn test_set_media_while_playing_is_deferred() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    let first = Media::new("mock://length=10s");
    let second = Media::new("mock://length=10s;audio_tracks=2");
    guard.set_current_media(Some(first.clone()));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.set_current_media(Some(second.clone()));
    assert_eq!(guard.current_media(), Some(&first));
    assert_eq!(guard.state(), State::Stopping);

    assert!(wait_for(&mut guard, &recorder, |p| {
        p.current_media() == Some(&second) && p.state() == State::Playing
    }));
    assert_eq!(
        recorder.states(),
        vec![
            State::Started,
            State::Playing,
            State::Stopping,
            State::Stopped,
            State::Started,
            State::Playing
        ]
    );
}

#[test]
fn test_stopped_action_pause_then_resume_restarts() {
    let config = ccplayer_core::PlayerConfig {
        media_stopped_action: MediaStoppedAction::Pause,
        ..test_config()
    };
    let (player, recorder) = player_with(config, None);
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=60ms")));
    guard.start().unwrap();

    assert!(wait_for_state(&mut guard, &recorder, State::Paused));
    assert_eq!(guard.time(), Some(tick_from_ms(60)));

    guard.resume();
    assert_eq!(guard.state(), State::Playing);
    assert!(wait_for(&mut guard, &recorder, |p| {
        p.time().is_some_and(|t| t < tick_from_ms(60))
    }));
}

#[test]
fn test_stopped_action_pause_stops_without_capability() {
    let config = ccplayer_core::PlayerConfig {
        media_stopped_action: MediaStoppedAction::Pause,
        ..test_config()
    };
    let (player, recorder) = player_with(config, None);
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=60ms;can_pause=false")));
    guard.start().unwrap();

    assert!(wait_for(&mut guard, &recorder, |_| {
        recorder.states().last() == Some(&State::Stopped)
    }));
    assert_eq!(
        recorder.states(),
        vec![State::Started, State::Playing, State::Stopping, State::Stopped]
    );
}

#[test]
fn test_stopped_action_exit_requests_exit() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_media_stopped_action(MediaStoppedAction::Exit);
    guard.set_current_media(Some(Media::new("mock://length=30ms")));
    guard.start().unwrap();

    assert!(wait_for_event(&mut guard, &recorder, |e| *e == Event::Exit));
    assert_eq!(guard.state(), State::Stopped);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Start,
    Pause,
    Resume,
    Stop,
    Wait(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::Pause),
        Just(Op::Resume),
        Just(Op::Stop),
        (0u8..8).prop_map(Op::Wait),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_state_sequence_follows_graph(ops in prop::collection::vec(op_strategy(), 1..16)) {
        let (player, recorder) = test_player();
        player
            .lock()
            .set_current_media(Some(Media::new("mock://length=10s")));

        for op in ops {
            match op {
                Op::Start => {
                    let _ = player.lock().start();
                }
                Op::Pause => player.lock().pause(),
                Op::Resume => player.lock().resume(),
                Op::Stop => player.lock().stop(),
                Op::Wait(ms) => std::thread::sleep(Duration::from_millis(ms as u64)),
            }
        }

        let mut guard = player.lock();
        guard.stop();
        prop_assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
        let states = recorder.states();
        prop_assert!(is_valid_path(&states), "invalid path: {:?}", states);
    }
}
