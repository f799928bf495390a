//! Seeking, rate, A-B loop and delays

use ccplayer_core::player::{AbLoopState, State, TrackCategory};
use ccplayer_core::utils::{tick_from_ms, tick_from_secs};
use ccplayer_core::{Media, SeekSpeed, SeekWhence};
use ccplayer_integration_tests::{test_player, wait_for, wait_for_state, Event};
use std::time::Duration;

#[test]
fn test_seek_before_start_sets_start_point() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.set_time_fast(tick_from_secs(5));
    assert_eq!(guard.time(), None);
    guard.start().unwrap();

    assert!(wait_for(&mut guard, &recorder, |_| !recorder.positions().is_empty()));
    let first = recorder.positions()[0];
    assert!(first >= tick_from_secs(5), "first position {}", first);
    assert!(recorder.positions().iter().all(|t| *t >= tick_from_secs(5)));
}

#[test]
fn test_seek_right_after_start() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    // The input has not opened the media yet
    guard.set_time(tick_from_secs(5));

    assert!(wait_for(&mut guard, &recorder, |_| recorder.positions().len() >= 3));
    let positions = recorder.positions();
    assert!(positions.iter().all(|t| *t >= tick_from_secs(5)), "{:?}", positions);
}

#[test]
fn test_seek_before_open_needs_capability() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;can_seek=false")));
    guard.start().unwrap();
    guard.set_time(tick_from_secs(5));

    assert!(wait_for(&mut guard, &recorder, |_| recorder.positions().len() >= 3));
    assert!(recorder.positions().iter().all(|t| *t < tick_from_secs(5)));
}

#[test]
fn test_seek_after_media_change_applies_to_new_media() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    let next = Media::new("mock://length=10s");
    guard.set_current_media(Some(next.clone()));
    guard.set_time(tick_from_secs(5));
    recorder.clear();

    assert!(wait_for(&mut guard, &recorder, |p| {
        p.current_media() == Some(&next) && !recorder.positions().is_empty()
    }));
    let first = recorder.positions()[0];
    assert!(first >= tick_from_secs(5), "first position {}", first);
}

#[test]
fn test_start_point_dropped_on_media_change() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.set_time(tick_from_secs(5));
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();

    assert!(wait_for(&mut guard, &recorder, |_| !recorder.positions().is_empty()));
    assert!(recorder.positions()[0] < tick_from_secs(1));
}

#[test]
fn test_position_matches_time_over_length() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.set_time(tick_from_secs(4));
    assert!(wait_for(&mut guard, &recorder, |p| {
        p.time().is_some_and(|t| t >= tick_from_secs(4))
    }));

    let time = guard.time().unwrap();
    let length = guard.length().unwrap();
    let position = guard.position().unwrap();
    assert_eq!(length, tick_from_secs(10));
    assert!((position - time as f64 / length as f64).abs() < 1e-9);
}

#[test]
fn test_relative_seek_while_paused() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();

    // A paused input only moves on seeks
    guard.set_time(tick_from_secs(1));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_secs(1))));

    guard.jump_time(tick_from_secs(2));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_secs(3))));

    guard.seek_by_time(-tick_from_ms(500), SeekSpeed::Precise, SeekWhence::Relative);
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_ms(2500))));

    guard.seek_by_pos(0.5, SeekSpeed::Precise, SeekWhence::Absolute);
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_secs(5))));
    assert_eq!(guard.position(), Some(0.5));
}

#[test]
fn test_fast_seek_lands_on_keyframe() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;keyframe_interval=1s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();

    guard.set_time_fast(tick_from_ms(2500));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_secs(2))));

    guard.set_time(tick_from_ms(2500));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_ms(2500))));
}

#[test]
fn test_seek_ignored_without_capability() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;can_seek=false")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    assert!(!guard.can_seek());

    guard.set_time(tick_from_secs(8));
    guard.cond_wait_timeout(&recorder.cond, Duration::from_millis(100));
    guard.cond_wait_timeout(&recorder.cond, Duration::from_millis(100));
    assert!(guard.time().is_some_and(|t| t < tick_from_secs(5)));
}

#[test]
fn test_ab_loop_plays_between_points() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for(&mut guard, &recorder, |p| {
        p.time().is_some_and(|t| t >= tick_from_ms(100))
    }));

    guard.set_ab_loop(AbLoopState::A);
    let a = guard.ab_loop_state().a.unwrap().time;
    assert_eq!(guard.ab_loop_state().state, AbLoopState::A);
    assert!(wait_for(&mut guard, &recorder, |p| {
        p.time().is_some_and(|t| t >= a + tick_from_ms(150))
    }));

    guard.set_ab_loop(AbLoopState::B);
    let status = guard.ab_loop_state();
    assert_eq!(status.state, AbLoopState::B);
    let b = status.b.unwrap().time;
    assert!(b > a);

    recorder.clear();
    // Two loop-backs
    assert!(wait_for(&mut guard, &recorder, |_| {
        let positions = recorder.positions();
        positions.windows(2).filter(|w| w[0] >= b && w[1] < b).count() >= 2
    }));

    let positions = recorder.positions();
    assert!(positions.iter().all(|t| *t >= a), "{:?}", positions);
    let loop_back = positions
        .windows(2)
        .position(|w| w[0] >= b && w[1] < b)
        .unwrap();
    assert_eq!(positions[loop_back + 1], a);
}

#[test]
fn test_ab_loop_survives_end_of_media() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=300ms")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();

    guard.set_time(tick_from_ms(100));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_ms(100))));
    guard.set_ab_loop(AbLoopState::A);

    // B one tick short of the end, so reaching it also ends the media
    let b = tick_from_ms(300) - 1;
    guard.set_time(b);
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(b)));
    guard.set_ab_loop(AbLoopState::B);
    assert_eq!(guard.ab_loop_state().state, AbLoopState::B);

    guard.set_time(tick_from_ms(290));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_ms(290))));
    recorder.clear();
    guard.resume();

    assert!(wait_for(&mut guard, &recorder, |_| {
        recorder.positions().contains(&tick_from_ms(100))
    }));
    assert_eq!(guard.state(), State::Playing);
    assert!(!recorder.states().contains(&State::Stopping));
    assert_eq!(guard.ab_loop_state().state, AbLoopState::B);
}

#[test]
fn test_ab_loop_rejects_b_not_after_a() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();
    guard.set_time(tick_from_secs(2));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_secs(2))));

    // B without A
    guard.set_ab_loop(AbLoopState::B);
    assert_eq!(guard.ab_loop_state().state, AbLoopState::None);

    guard.set_ab_loop(AbLoopState::A);
    guard.set_ab_loop(AbLoopState::B);
    assert_eq!(guard.ab_loop_state().state, AbLoopState::A);
    assert!(guard.ab_loop_state().b.is_none());

    guard.set_time(tick_from_secs(1));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_secs(1))));
    guard.set_ab_loop(AbLoopState::B);
    assert_eq!(guard.ab_loop_state().state, AbLoopState::A);

    let changes = recorder.count(|e| matches!(e, Event::AbLoop(_)));
    assert_eq!(changes, 1);

    guard.stop();
    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
    assert_eq!(guard.ab_loop_state().state, AbLoopState::None);
}

#[test]
fn test_rate_recorded_while_stopped() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.change_rate(2.0);
    assert_eq!(guard.rate(), 2.0);
    guard.change_rate(100.0);
    assert_eq!(guard.rate(), 32.0);
    guard.change_rate(0.0);
    assert_eq!(guard.rate(), 32.0);
    guard.change_rate(2.0);
    assert_eq!(recorder.count(|e| matches!(e, Event::Rate(_))), 3);

    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    assert_eq!(guard.rate(), 2.0);

    guard.increment_rate();
    assert_eq!(guard.rate(), 3.0);
    guard.decrement_rate();
    guard.decrement_rate();
    assert_eq!(guard.rate(), 1.5);
}

#[test]
fn test_rate_change_needs_capabilities() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;can_control_rate=false")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.change_rate(2.0);
    assert_eq!(guard.rate(), 1.0);

    guard.stop();
    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
    guard.set_current_media(Some(Media::new("mock://length=10s;can_rewind=false")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.change_rate(-1.0);
    assert_eq!(guard.rate(), 1.0);
    guard.change_rate(0.5);
    assert_eq!(guard.rate(), 0.5);
}

#[test]
fn test_delays_are_carried_across_media() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_audio_delay(tick_from_ms(50), SeekWhence::Absolute);
    guard.set_audio_delay(tick_from_ms(25), SeekWhence::Relative);
    assert_eq!(guard.audio_delay(), tick_from_ms(75));

    guard.set_subtitle_delay(-tick_from_ms(200), SeekWhence::Absolute);
    assert_eq!(guard.subtitle_delay(), -tick_from_ms(200));

    guard.set_category_delay(TrackCategory::Video, tick_from_ms(10), SeekWhence::Absolute);
    assert_eq!(guard.category_delay(TrackCategory::Video), 0);

    guard.set_current_media(Some(Media::new("mock://length=10s")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    assert_eq!(guard.audio_delay(), tick_from_ms(75));
    assert_eq!(guard.category_delay(TrackCategory::Subtitle), -tick_from_ms(200));

    guard.set_associated_subs_fps(25.0);
    guard.set_associated_subs_fps(-1.0);
    assert_eq!(guard.associated_subs_fps(), 25.0);
}
