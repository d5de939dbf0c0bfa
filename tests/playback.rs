//! End-to-end playback through the sound generator

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use famitone::{
    ChanNote, ChannelId, Effect, EngineConfig, NotePriority, Note, PlayerObserver, Song,
    SoundChipSet, SoundGenerator, TrackerChannel, TrackerModule,
};

#[derive(Default)]
struct Counters {
    rows: AtomicUsize,
    notes: AtomicUsize,
}

struct CountingObserver(Arc<Counters>);

impl PlayerObserver for CountingObserver {
    fn on_step_row(&mut self) {
        self.0.rows.fetch_add(1, Ordering::Relaxed);
    }

    fn on_play_note(&mut self, _channel: ChannelId, note: &ChanNote) {
        if !note.is_empty() {
            self.0.notes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn generator(chips: SoundChipSet, namco: usize, song: Song) -> SoundGenerator {
    let mut module = TrackerModule::new(chips, namco);
    module.add_song(song);
    let mut gen = SoundGenerator::new(EngineConfig::default()).expect("default config");
    gen.load_module(Arc::new(module));
    gen
}

#[test]
fn test_first_row_of_a_speed_six_song() {
    let mut song = Song::new(1, 64);
    song.set_frame_note(ChannelId::Square1, 0, 0, ChanNote::new(Note::at(4, 0)));
    let mut gen = generator(SoundChipSet::empty(), 0, song);

    let counters = Arc::new(Counters::default());
    gen.driver_mut()
        .set_observer(Some(Box::new(CountingObserver(counters.clone()))));
    gen.start_song(0).expect("song 0");

    for _ in 0..6 {
        gen.tick();
    }
    assert_eq!(counters.rows.load(Ordering::Relaxed), 1);
    assert_eq!(counters.notes.load(Ordering::Relaxed), 1);
    assert_eq!(gen.driver().player_cursor().map(|c| c.row()), Some(1));

    gen.tick();
    assert_eq!(counters.rows.load(Ordering::Relaxed), 2);

    let samples = gen.take_samples();
    assert!(samples.iter().any(|&s| s != 0));
}

#[test]
fn test_f00_behaves_like_f01() {
    let speeds: Vec<u8> = [0u8, 1]
        .into_iter()
        .map(|param| {
            let mut song = Song::new(1, 16);
            song.set_frame_note(
                ChannelId::Noise,
                0,
                0,
                ChanNote::default().with_effect(Effect::Speed, param),
            );
            let mut gen = generator(SoundChipSet::empty(), 0, song);
            gen.start_song(0).expect("song 0");
            for _ in 0..4 {
                gen.tick();
            }
            gen.driver().tempo_counter().speed()
        })
        .collect();
    assert_eq!(speeds, vec![1, 1]);
}

#[test]
fn test_jump_takes_precedence_over_skip() {
    let mut song = Song::new(4, 8).with_speed(1).with_tempo(0);
    song.set_frame_note(
        ChannelId::Square1,
        0,
        0,
        ChanNote::default().with_effect(Effect::Skip, 3),
    );
    song.set_frame_note(
        ChannelId::Square2,
        0,
        0,
        ChanNote::default().with_effect(Effect::Jump, 2),
    );
    let mut gen = generator(SoundChipSet::empty(), 0, song);
    gen.start_song(0).expect("song 0");
    gen.tick();
    let cursor = gen.driver().player_cursor().expect("cursor");
    assert_eq!((cursor.frame(), cursor.row()), (2, 0));
}

#[test]
fn test_mailbox_keeps_the_higher_priority_cell() {
    let mailbox = TrackerChannel::new();
    mailbox.set_note(ChanNote::new(Note::at(2, 0)), NotePriority::Prio2);
    mailbox.set_note(ChanNote::new(Note::at(3, 0)), NotePriority::Prio1);
    assert_eq!(mailbox.get_note().note, Note::at(2, 0));

    mailbox.set_note(ChanNote::new(Note::at(3, 0)), NotePriority::Prio1);
    mailbox.set_note(ChanNote::new(Note::at(2, 0)), NotePriority::Prio2);
    assert_eq!(mailbox.get_note().note, Note::at(2, 0));
}

#[test]
fn test_mailbox_is_shared_across_threads() {
    let gen = generator(SoundChipSet::empty(), 0, Song::new(1, 16));
    let mailbox = gen.driver().tracker_channel(ChannelId::Triangle);
    let writer = {
        let mailbox = mailbox.clone();
        std::thread::spawn(move || {
            mailbox.set_note(ChanNote::new(Note::at(3, 9)), NotePriority::Prio2);
        })
    };
    writer.join().expect("writer thread");
    assert!(mailbox.new_note_data());
}

#[test]
fn test_n163_song_plays_on_the_first_voice() {
    let mut song = Song::new(1, 16);
    song.set_frame_note(ChannelId::N163Ch1, 0, 0, ChanNote::new(Note::at(4, 0)));
    let mut gen = generator(SoundChipSet::N163, 4, song);
    gen.start_song(0).expect("song 0");
    for _ in 0..3 {
        gen.tick();
    }
    assert_eq!(gen.driver().channel_note(ChannelId::N163Ch1), 48);
    assert_eq!(gen.driver().channel_note(ChannelId::N163Ch5), -1);
}

#[test]
fn test_stop_silences_every_channel() {
    let mut song = Song::new(1, 16);
    song.set_frame_note(ChannelId::Square1, 0, 0, ChanNote::new(Note::at(4, 0)));
    let mut gen = generator(SoundChipSet::empty(), 0, song);
    gen.start_song(0).expect("song 0");
    gen.tick();
    gen.stop();
    assert!(!gen.is_playing());
    assert_eq!(gen.driver().channel_note(ChannelId::Square1), -1);
}

#[test]
fn test_config_round_trips_through_json() {
    let config = EngineConfig {
        sample_rate: 48_000,
        n163_legacy_mixing: true,
        ..EngineConfig::default()
    };
    let text = config.to_json().expect("serialize");
    assert_eq!(EngineConfig::from_json(&text).expect("parse"), config);
    assert!(EngineConfig::from_json(r#"{ "sample_rate": 100 }"#).is_err());
}
