//! Track, program, title and teletext registries

use ccplayer_core::player::{ListAction, SelectPolicy, State, TrackCategory, VoutAction};
use ccplayer_core::utils::{tick_from_ms, tick_from_secs};
use ccplayer_core::{Media, PlayerConfig};
use ccplayer_integration_tests::{
    player_with, test_config, test_player, wait_for, wait_for_state, Event,
};

fn selected_audio(guard: &ccplayer_core::PlayerGuard<'_>) -> Option<String> {
    guard
        .selected_track(TrackCategory::Audio)
        .map(|t| t.es_id.to_string())
}

#[test]
fn test_tracks_listed_and_defaults_selected() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://audio_tracks=2;sub_tracks=1")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    assert_eq!(guard.track_count(TrackCategory::Video), 1);
    assert_eq!(guard.track_count(TrackCategory::Audio), 2);
    assert_eq!(guard.track_count(TrackCategory::Subtitle), 1);

    assert!(guard.selected_track(TrackCategory::Video).is_some());
    assert_eq!(selected_audio(&guard).as_deref(), Some("audio/1"));
    // No subtitle without a language preference
    assert!(guard.selected_track(TrackCategory::Subtitle).is_none());

    let added = recorder.count(|e| matches!(e, Event::TrackList(ListAction::Added, _)));
    assert_eq!(added, 4);
    let vouts = guard.vouts();
    assert_eq!(vouts.len(), 1);
    assert_eq!(
        guard.vout_es_id(&vouts[0]),
        guard.selected_track(TrackCategory::Video).map(|t| &t.es_id)
    );
}

#[test]
fn test_tracks_removed_on_stop() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://audio_tracks=3")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    let es_id = guard.track_at(TrackCategory::Audio, 0).unwrap().es_id.clone();

    guard.stop();
    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));

    let added = recorder.count(|e| matches!(e, Event::TrackList(ListAction::Added, _)));
    let removed = recorder.count(|e| matches!(e, Event::TrackList(ListAction::Removed, _)));
    assert_eq!(added, 4);
    assert_eq!(removed, added);
    for category in TrackCategory::ALL {
        assert_eq!(guard.track_count(category), 0);
    }
    assert!(guard.track(&es_id).is_none());
    assert!(guard.vouts().is_empty());
    assert_eq!(
        recorder.count(|e| *e == Event::Vout(VoutAction::Started)),
        recorder.count(|e| *e == Event::Vout(VoutAction::Stopped))
    );

    // Selections are dropped before their track
    let events = recorder.events();
    let unselect = events
        .iter()
        .position(|e| *e == Event::TrackSelection(Some("audio/1".into()), None))
        .unwrap();
    let remove = events
        .iter()
        .position(|e| *e == Event::TrackList(ListAction::Removed, "audio/1".into()))
        .unwrap();
    assert!(unselect < remove);
}

#[test]
fn test_next_and_prev_track_are_inverse() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://audio_tracks=4")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    let initial = selected_audio(&guard);
    assert_eq!(initial.as_deref(), Some("audio/1"));

    for steps in 1..=5 {
        for _ in 0..steps {
            guard.select_next_track(TrackCategory::Audio);
        }
        for _ in 0..steps {
            guard.select_prev_track(TrackCategory::Audio);
        }
        assert_eq!(selected_audio(&guard), initial, "after {} steps", steps);
    }

    // Wraps around
    guard.select_prev_track(TrackCategory::Audio);
    assert_eq!(selected_audio(&guard).as_deref(), Some("audio/4"));
    guard.select_next_track(TrackCategory::Audio);
    assert_eq!(selected_audio(&guard), initial);

    let selected: Vec<_> = guard
        .tracks(TrackCategory::Audio)
        .iter()
        .filter(|t| t.selected)
        .collect();
    assert_eq!(selected.len(), 1);
}

#[test]
fn test_exclusive_selection_reports_both_tracks() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://audio_tracks=2")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    let second = guard.track_at(TrackCategory::Audio, 1).unwrap().es_id.clone();
    recorder.clear();
    guard.select_track(&second, SelectPolicy::Exclusive);
    guard.select_track(&second, SelectPolicy::Exclusive);

    assert_eq!(
        recorder.events(),
        vec![Event::TrackSelection(
            Some("audio/1".into()),
            Some("audio/2".into())
        )]
    );
    assert!(guard.track(&second).unwrap().selected);
}

#[test]
fn test_subtitle_selection_limit() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://sub_tracks=3")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    let ids: Vec<_> = guard
        .tracks(TrackCategory::Subtitle)
        .iter()
        .map(|t| t.es_id.clone())
        .collect();
    let selection = |guard: &ccplayer_core::PlayerGuard<'_>| -> Vec<bool> {
        guard
            .tracks(TrackCategory::Subtitle)
            .iter()
            .map(|t| t.selected)
            .collect()
    };

    guard.select_track(&ids[0], SelectPolicy::Simultaneous);
    guard.select_track(&ids[1], SelectPolicy::Simultaneous);
    assert_eq!(selection(&guard), vec![true, true, false]);

    // At the limit, a new selection replaces the others
    guard.select_track(&ids[2], SelectPolicy::Simultaneous);
    assert_eq!(selection(&guard), vec![false, false, true]);

    guard.unselect_track_category(TrackCategory::Subtitle);
    assert!(guard.selected_track(TrackCategory::Subtitle).is_none());
}

#[test]
fn test_cycle_from_several_selected_subtitles() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://sub_tracks=3")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    let ids: Vec<_> = guard
        .tracks(TrackCategory::Subtitle)
        .iter()
        .map(|t| t.es_id.clone())
        .collect();
    let selection = |guard: &ccplayer_core::PlayerGuard<'_>| -> Vec<bool> {
        guard
            .tracks(TrackCategory::Subtitle)
            .iter()
            .map(|t| t.selected)
            .collect()
    };

    guard.select_track(&ids[0], SelectPolicy::Simultaneous);
    guard.select_track(&ids[1], SelectPolicy::Simultaneous);
    guard.select_next_track(TrackCategory::Subtitle);
    assert_eq!(selection(&guard), vec![false, false, true]);

    guard.select_track(&ids[0], SelectPolicy::Simultaneous);
    guard.select_track(&ids[1], SelectPolicy::Exclusive);
    guard.select_track(&ids[0], SelectPolicy::Simultaneous);
    assert_eq!(selection(&guard), vec![true, true, false]);
    guard.select_prev_track(TrackCategory::Subtitle);
    assert_eq!(selection(&guard), vec![false, false, true]);

    // Wrapping onto a track that is already selected keeps it alone
    guard.select_track(&ids[0], SelectPolicy::Simultaneous);
    assert_eq!(selection(&guard), vec![true, false, true]);
    guard.select_next_track(TrackCategory::Subtitle);
    assert_eq!(selection(&guard), vec![true, false, false]);
}

#[test]
fn test_toggle_subtitle_remembers_last_track() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://sub_tracks=2")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    guard.toggle_subtitle();
    let first = guard.selected_track(TrackCategory::Subtitle).unwrap().es_id.clone();
    assert_eq!(first.str_id(), "subtitle/2");

    guard.select_next_track(TrackCategory::Subtitle);
    let second = guard.selected_track(TrackCategory::Subtitle).unwrap().es_id.clone();
    assert_eq!(second.str_id(), "subtitle/3");

    guard.toggle_subtitle();
    assert!(guard.selected_track(TrackCategory::Subtitle).is_none());
    guard.toggle_subtitle();
    assert_eq!(
        guard.selected_track(TrackCategory::Subtitle).map(|t| &t.es_id),
        Some(&second)
    );
}

#[test]
fn test_language_preference() {
    let config = PlayerConfig {
        audio_language: Some("es,fr".to_string()),
        ..test_config()
    };
    let (player, recorder) = player_with(config, None);
    let mut guard = player.lock();
    assert_eq!(guard.default_track_language(TrackCategory::Audio), Some("es,fr"));

    guard.set_current_media(Some(Media::new("mock://audio_tracks=3;audio_lang=en,fr,de")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    let selected = guard.selected_track(TrackCategory::Audio).unwrap();
    assert_eq!(selected.format.language.as_deref(), Some("fr"));

    // Applied to the current media right away
    guard.select_default_track(TrackCategory::Audio, Some("DE"));
    let selected = guard.selected_track(TrackCategory::Audio).unwrap();
    assert_eq!(selected.format.language.as_deref(), Some("de"));

    guard.select_default_track(TrackCategory::Subtitle, Some("en"));
    assert_eq!(guard.default_track_language(TrackCategory::Subtitle), Some("en"));
    assert!(guard.selected_track(TrackCategory::Subtitle).is_none());

    guard.select_default_track(TrackCategory::Audio, Some(" "));
    assert_eq!(guard.default_track_language(TrackCategory::Audio), None);
}

#[test]
fn test_track_added_during_playback() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://audio_tracks=1;add_track_at=50ms")));
    guard.start().unwrap();

    assert!(wait_for(&mut guard, &recorder, |p| p.track_count(TrackCategory::Audio) == 2));
    let late = guard.track_at(TrackCategory::Audio, 1).unwrap();
    assert_eq!(late.name, "late audio");
    assert!(!late.selected);
    assert_eq!(selected_audio(&guard).as_deref(), Some("audio/1"));
}

#[test]
fn test_programs() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://programs=3")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    assert_eq!(guard.program_count(), 3);
    assert_eq!(guard.selected_program().map(|p| p.group_id), Some(1));

    guard.select_next_program();
    assert_eq!(guard.selected_program().map(|p| p.group_id), Some(2));
    guard.select_prev_program();
    guard.select_prev_program();
    assert_eq!(guard.selected_program().map(|p| p.group_id), Some(3));

    recorder.clear();
    guard.select_program(3);
    guard.select_program(42);
    assert!(recorder.is_empty());

    guard.select_program(1);
    assert_eq!(recorder.events(), vec![Event::ProgramSelection(Some(3), Some(1))]);
    assert_eq!(guard.programs().iter().filter(|p| p.selected).count(), 1);
}

#[test]
fn test_titles_and_chapters() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;titles=2;chapters=4;menu")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();

    assert_eq!(guard.title_count(), 2);
    assert!(guard.title_list().unwrap().at(0).unwrap().is_menu());
    assert_eq!(guard.selected_title_idx(), Some(0));
    assert_eq!(guard.selected_chapter_idx(), Some(0));
    assert!(recorder.count(|e| *e == Event::Titles(2)) == 1);

    guard.select_chapter_idx(2);
    assert_eq!(guard.selected_chapter_idx(), Some(2));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_ms(5000))));
    assert_eq!(guard.selected_chapter_idx(), Some(2));

    guard.select_next_chapter();
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(tick_from_ms(7500))));
    assert_eq!(guard.selected_chapter().unwrap().time, tick_from_ms(7500));

    // No wrap around at the last chapter
    guard.select_next_chapter();
    assert_eq!(guard.selected_chapter_idx(), Some(3));
    guard.select_chapter_idx(9);
    assert_eq!(guard.selected_chapter_idx(), Some(3));

    guard.select_title_idx(1);
    assert_eq!(guard.selected_title_idx(), Some(1));
    assert_eq!(guard.selected_chapter_idx(), Some(0));
    assert!(wait_for(&mut guard, &recorder, |p| p.time() == Some(0)));
    assert!(recorder.count(|e| *e == Event::TitleSelected(1)) == 1);
    assert!(recorder.count(|e| *e == Event::ChapterSelected(1, 0)) == 1);

    guard.stop();
    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
    assert_eq!(guard.title_count(), 0);
    assert_eq!(guard.selected_title_idx(), None);
    assert_eq!(recorder.events().last(), Some(&Event::State(State::Stopped)));
}

#[test]
fn test_chapter_follows_playback_time() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.set_current_media(Some(Media::new("mock://length=10s;titles=1;chapters=5")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));
    guard.pause();

    // Chapters every 2s
    guard.set_time(tick_from_ms(4500));
    assert!(wait_for(&mut guard, &recorder, |p| p.selected_chapter_idx() == Some(2)));
    guard.set_time(tick_from_secs(1));
    assert!(wait_for(&mut guard, &recorder, |p| p.selected_chapter_idx() == Some(0)));
}

#[test]
fn test_teletext() {
    let (player, recorder) = test_player();
    let mut guard = player.lock();
    guard.select_teletext_page(200);
    assert_eq!(guard.teletext_page(), 100);

    guard.set_current_media(Some(Media::new("mock://teletext")));
    guard.start().unwrap();
    assert!(wait_for_state(&mut guard, &recorder, State::Playing));

    assert!(guard.has_teletext_menu());
    assert!(!guard.is_teletext_enabled());

    guard.set_teletext_enabled(true);
    assert!(guard.is_teletext_enabled());
    let telx = guard.selected_track(TrackCategory::Subtitle).unwrap();
    assert!(telx.format.is_teletext());

    guard.select_teletext_page(888);
    assert_eq!(guard.teletext_page(), 888);
    guard.select_teletext_page(1000);
    assert_eq!(guard.teletext_page(), 888);

    guard.set_teletext_transparency(true);
    assert!(guard.is_teletext_transparent());

    guard.set_teletext_enabled(false);
    assert!(!guard.is_teletext_enabled());
    assert!(guard.selected_track(TrackCategory::Subtitle).is_none());

    guard.set_teletext_enabled(true);
    guard.stop();
    assert!(wait_for_state(&mut guard, &recorder, State::Stopped));
    assert!(!guard.has_teletext_menu());
    assert!(!guard.is_teletext_enabled());
}
