//! Completions arriving after their binding changed must be dropped.

mod common;

use common::{command, message, Pack, ARCHIVE, WAIT};
use fs2_engine::audio::{AudioEvent, LOOP_FOREVER};
use fs2_engine::fetch::Dispatch;
use fs2_engine::image::ImageClass;

#[test]
fn rebinding_an_effect_channel_drops_the_earlier_sound() {
    let pack = Pack::new().sound("click").sound("beep");
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute("se 2 click -1");
    engine.execute("se 2 beep");
    assert_eq!(engine.pipeline_mut().parked(), 2);
    assert_eq!(engine.pipeline_mut().release_all(), 2);
    assert_eq!(engine.pump(), 1);

    let state = engine.audio().channel(2).unwrap();
    assert_eq!((state.name.as_str(), state.loops), ("beep", 0));
    assert_eq!(
        session.audio.events(),
        vec![
            AudioEvent::Halt { channel: 2 },
            AudioEvent::Halt { channel: 2 },
            AudioEvent::Play {
                channel: 2,
                name: "beep".into(),
                loops: 0
            },
        ]
    );
}

#[test]
fn only_the_latest_music_plays_and_cached_tracks_skip_the_fetch() {
    let pack = Pack::new().sound("BGM01").sound("BGM02");
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute("bgm 1 BGM01");
    engine.execute("bgm 2 BGM02");
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 1);
    assert_eq!(engine.audio().music(), Some("BGM02"));

    engine.execute("bgm 1 BGM01");
    assert_eq!(engine.in_flight(), 0);
    let names: Vec<_> = session
        .audio
        .events()
        .into_iter()
        .filter_map(|event| match event {
            AudioEvent::MusicPlay { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["BGM02", "BGM01"]);
}

#[test]
fn repeating_a_pending_track_starts_it_once() {
    let pack = Pack::new().sound("BGM01");
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute("bgm 1 BGM01");
    engine.execute("bgm 1 BGM01");
    assert_eq!(engine.pipeline_mut().parked(), 1);
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 1);

    let plays = session
        .audio
        .events()
        .into_iter()
        .filter(|event| matches!(event, AudioEvent::MusicPlay { .. }))
        .count();
    assert_eq!(plays, 1);
}

#[test]
fn superseded_image_is_never_bound() {
    let pack = Pack::new().image("BG01", (0, 0)).image("BG02", (0, 0));
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute("bg 0 BG01");
    engine.execute("bg 0 BG02");
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 1);

    let part = &engine.images().slot(ImageClass::Bg, 0).unwrap().parts()[0];
    assert_eq!(part.bound.as_deref(), Some("BG02"));
    let draws = engine.render().draws;
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].name, "BG02");
}

#[test]
fn late_completion_after_a_cached_rebind_is_dropped() {
    let pack = Pack::new().image("BG01", (0, 0)).image("BG02", (0, 0));
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute("bg 1 BG02");
    engine.pipeline_mut().release_all();
    engine.pump();

    engine.execute("bg 0 BG01");
    // Cached, so it binds without a fetch and overtakes BG01.
    engine.execute("bg 0 BG02");
    assert_eq!(engine.pipeline_mut().parked(), 1);
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 0);

    let part = &engine.images().slot(ImageClass::Bg, 0).unwrap().parts()[0];
    assert_eq!(part.bound.as_deref(), Some("BG02"));
}

#[test]
fn clearing_a_slot_discards_its_pending_texture() {
    let pack = Pack::new().image("FG01", (0, 0));
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute("fg 3 FG01");
    engine.execute("fg");
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 0);
    assert!(!engine.images().slot(ImageClass::Fg, 3).unwrap().is_active());
    assert!(engine.render().draws.is_empty());
}

#[test]
fn stopping_a_channel_discards_its_pending_sound() {
    let pack = Pack::new().sound("rain");
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.execute(&format!("se 1 rain {LOOP_FOREVER}"));
    engine.execute("se 1");
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 0);
    assert!(engine.audio().channel(1).is_none());
}

#[test]
fn the_most_recent_script_jump_wins_in_either_arrival_order() {
    let pack = Pack::new()
        .script("ev_a", &[message("A"), WAIT])
        .loose_script("ev_b", &[message("B"), WAIT]);

    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;
    engine.execute("next ev_a");
    engine.execute("next ev_b");
    assert!(engine.pipeline_mut().release("scene/ev_b.cst"));
    assert_eq!(engine.pump(), 1);
    assert!(engine.pipeline_mut().release(ARCHIVE));
    assert_eq!(engine.pump(), 0);
    assert_eq!(engine.interpreter().name(), Some("ev_b"));
    assert_eq!(engine.text().message, "B");

    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;
    engine.execute("next ev_a");
    engine.execute("next ev_b");
    engine.pipeline_mut().release_all();
    assert_eq!(engine.pump(), 1);
    assert_eq!(engine.interpreter().name(), Some("ev_b"));
}

#[test]
fn jump_issued_by_a_script_waits_for_its_target() {
    let pack = Pack::new()
        .script("op_cont2", &[command("next ev_a"), message("skipped"), WAIT])
        .script("ev_a", &[message("A"), WAIT]);
    let mut session = pack.session(Dispatch::Deferred);
    let engine = &mut session.engine;

    engine.start("op_cont2").unwrap();
    engine.pipeline_mut().release_all();
    engine.pump();
    assert_eq!(engine.pipeline_mut().parked(), 1);
    assert_eq!(engine.interpreter().name(), Some("op_cont2"));

    engine.pipeline_mut().release_all();
    engine.pump();
    assert_eq!(engine.interpreter().name(), Some("ev_a"));
    assert_eq!(engine.text().message, "A");
}
