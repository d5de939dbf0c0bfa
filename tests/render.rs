//! Offline rendering through the public API

use std::sync::atomic::Ordering;
use std::sync::Arc;

use famitone::{
    ChanNote, ChannelId, EngineConfig, FamitoneError, Note, RenderLength, RenderRequest,
    Renderer, Song, SoundChipSet, SoundGenerator, TrackerModule,
};

fn generator() -> anyhow::Result<SoundGenerator> {
    let mut song = Song::new(2, 16);
    song.set_frame_note(ChannelId::Square1, 0, 0, ChanNote::new(Note::at(4, 9)));
    song.set_frame_note(ChannelId::Triangle, 0, 0, ChanNote::new(Note::at(3, 0)));
    let mut module = TrackerModule::new(SoundChipSet::empty(), 0);
    module.add_song(song);
    let mut gen = SoundGenerator::new(EngineConfig::default())?;
    gen.load_module(Arc::new(module));
    Ok(gen)
}

#[test]
fn test_render_without_module_fails_early() -> anyhow::Result<()> {
    let mut gen = SoundGenerator::new(EngineConfig::default())?;
    let result = Renderer::new().render(&mut gen, &RenderRequest::new(0, RenderLength::Frames(4)));
    assert!(matches!(result, Err(FamitoneError::Render(_))));
    assert_eq!(gen.ticks(), 0);
    Ok(())
}

#[test]
fn test_invalid_lengths_are_rejected() -> anyhow::Result<()> {
    let gen = generator()?;
    for length in [
        RenderLength::Frames(0),
        RenderLength::Loops(0),
        RenderLength::Seconds(-1.0),
        RenderLength::Seconds(f64::NAN),
    ] {
        let request = RenderRequest::new(0, length);
        assert!(request.validate(&gen).is_err(), "{length:?}");
    }
    assert!(RenderRequest::new(7, RenderLength::Frames(1))
        .validate(&gen)
        .is_err());
    Ok(())
}

#[test]
fn test_cancel_flag_is_consumed() -> anyhow::Result<()> {
    let mut gen = generator()?;
    let renderer = Renderer::new();
    renderer.cancel_flag().store(true, Ordering::Relaxed);

    let request = RenderRequest::new(0, RenderLength::Frames(30));
    let first = renderer.render(&mut gen, &request)?;
    assert!(first.cancelled);
    assert_eq!(first.frames, 0);

    let second = renderer.render(&mut gen, &request)?;
    assert!(!second.cancelled);
    assert_eq!(second.frames, 30);
    assert!(second.samples.iter().any(|&s| s != 0));
    Ok(())
}

#[test]
fn test_muted_render_is_quieter() -> anyhow::Result<()> {
    let renderer = Renderer::new();
    let full = renderer.render(
        &mut generator()?,
        &RenderRequest::new(0, RenderLength::Frames(20)),
    )?;
    let request = RenderRequest::new(0, RenderLength::Frames(20))
        .mute(ChannelId::Square1)
        .mute(ChannelId::Triangle);
    let muted = renderer.render(&mut generator()?, &request)?;
    assert_eq!(full.samples.len(), muted.samples.len());
    assert!(muted.samples.iter().all(|&s| s == 0));
    Ok(())
}

#[cfg(feature = "export-wav")]
#[test]
fn test_wav_file_matches_the_render() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("song.wav");
    let mut gen = generator()?;
    let request = RenderRequest::new(0, RenderLength::Seconds(0.25)).with_output(&path);
    let output = Renderer::new().render_to_wav(&mut gen, &request)?;

    let mut reader = hound::WavReader::open(&path)?;
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(samples, output.samples);
    approx::assert_abs_diff_eq!(output.duration(), 0.25, epsilon = 0.02);
    Ok(())
}
