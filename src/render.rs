//! Offline rendering
//!
//! A [`RenderRequest`] describes what to render; [`Renderer`] checks it
//! against the loaded module before touching any chip state, then runs the
//! generator tick by tick. Cancellation is cooperative: the flag returned by
//! [`Renderer::cancel_flag`] is checked before every tick, so the output
//! always ends on a completed tick.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::SoundGenerator;
use crate::error::{FamitoneError, Result};
use crate::types::ChannelId;

/// How long to render
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderLength {
    /// Engine frames (ticks)
    Frames(u64),
    /// Passes through the song
    Loops(u32),
    /// Wall-clock seconds of output
    Seconds(f64),
}

/// What to render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Song index
    pub song: usize,
    /// Render length
    pub length: RenderLength,
    /// Channels left out of the mix
    pub muted: Vec<ChannelId>,
    /// Destination of [`Renderer::render_to_wav`]
    pub output: Option<PathBuf>,
}

impl RenderRequest {
    /// Render `song` for `length` with every channel enabled
    pub fn new(song: usize, length: RenderLength) -> Self {
        Self {
            song,
            length,
            muted: Vec::new(),
            output: None,
        }
    }

    /// Builder: leave `channel` out
    pub fn mute(mut self, channel: ChannelId) -> Self {
        if !self.muted.contains(&channel) {
            self.muted.push(channel);
        }
        self
    }

    /// Builder: file destination
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Check the request against the generator's module
    pub fn validate(&self, generator: &SoundGenerator) -> Result<()> {
        let module = generator
            .module()
            .ok_or_else(|| FamitoneError::Render("no module loaded".into()))?;
        if module.song(self.song).is_none() {
            return Err(FamitoneError::Render(format!(
                "song {} does not exist",
                self.song
            )));
        }
        match self.length {
            RenderLength::Frames(0) | RenderLength::Loops(0) => {
                return Err(FamitoneError::Render("render length is zero".into()));
            }
            RenderLength::Seconds(s) if !s.is_finite() || s <= 0.0 => {
                return Err(FamitoneError::Render(format!("invalid duration {s}")));
            }
            _ => {}
        }
        let enabled = module
            .channel_order()
            .iter()
            .filter(|ch| !self.muted.contains(ch))
            .count();
        if enabled == 0 {
            return Err(FamitoneError::Render("no enabled channels".into()));
        }
        Ok(())
    }

    #[cfg_attr(not(feature = "export-wav"), allow(dead_code))]
    fn output_path(&self) -> Result<&Path> {
        let path = self
            .output
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| FamitoneError::Render("no output path".into()))?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(FamitoneError::Render(format!(
                    "directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(path)
    }
}

/// Rendered audio
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    /// Mono PCM samples
    pub samples: Vec<i16>,
    /// Sample rate of `samples`
    pub sample_rate: u32,
    /// Engine frames rendered
    pub frames: u64,
    /// Whether the render was cancelled
    pub cancelled: bool,
}

impl RenderOutput {
    /// Length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Cancellable batch renderer
#[derive(Debug, Default)]
pub struct Renderer {
    cancel: Arc<AtomicBool>,
}

impl Renderer {
    /// Renderer with a fresh cancel flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag that stops a running render once set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Render into memory
    pub fn render(
        &self,
        generator: &mut SoundGenerator,
        request: &RenderRequest,
    ) -> Result<RenderOutput> {
        request.validate(generator)?;
        Ok(self.run(generator, request))
    }

    /// Render straight into a 16-bit mono WAV file
    #[cfg(feature = "export-wav")]
    pub fn render_to_wav(
        &self,
        generator: &mut SoundGenerator,
        request: &RenderRequest,
    ) -> Result<RenderOutput> {
        request.validate(generator)?;
        let path = request.output_path()?;
        let output = self.run(generator, request);
        write_wav(path, &output.samples, output.sample_rate)?;
        log::info!(
            "wrote {:.1}s to {}",
            output.duration(),
            path.display()
        );
        Ok(output)
    }

    fn run(&self, generator: &mut SoundGenerator, request: &RenderRequest) -> RenderOutput {
        let sample_rate = generator.config().sample_rate;
        let saved = generator.driver().muted_channels();
        for &channel in &request.muted {
            generator.driver_mut().set_channel_muted(channel, true);
        }

        let mut output = RenderOutput {
            sample_rate,
            ..RenderOutput::default()
        };
        let target_samples = match request.length {
            RenderLength::Seconds(s) => (s * sample_rate as f64).ceil() as usize,
            _ => usize::MAX,
        };

        if let Err(err) = generator.start_song(request.song) {
            log::warn!("render could not start: {err}");
        } else {
            log::debug!("render started: {:?}", request.length);
            generator.take_samples();
            loop {
                if self.cancel.swap(false, Ordering::Relaxed) {
                    output.cancelled = true;
                    break;
                }
                generator.tick();
                output.samples.extend(generator.take_samples());
                output.frames += 1;

                let done = match request.length {
                    RenderLength::Frames(n) => output.frames >= n,
                    RenderLength::Loops(n) => generator
                        .driver()
                        .player_cursor()
                        .is_some_and(|c| c.loop_count() >= n),
                    RenderLength::Seconds(_) => output.samples.len() >= target_samples,
                };
                if done || !generator.is_playing() {
                    break;
                }
            }
        }

        generator.stop();
        generator.driver_mut().set_muted_channels(saved);
        log::debug!(
            "render finished: {} frames, {} samples{}",
            output.frames,
            output.samples.len(),
            if output.cancelled { " (cancelled)" } else { "" }
        );
        output
    }
}

/// Write mono 16-bit PCM
#[cfg(feature = "export-wav")]
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::module::{ModuleSource, Song, TrackerModule};
    use crate::types::{ChanNote, Note, SoundChipSet};

    fn generator() -> SoundGenerator {
        let mut module = TrackerModule::new(SoundChipSet::empty(), 0);
        let mut song = Song::new(2, 4).with_tempo(0).with_speed(1);
        song.set_frame_note(ChannelId::Square1, 0, 0, ChanNote::new(Note::at(4, 0)));
        module.add_song(song);
        let mut gen = SoundGenerator::new(EngineConfig::default()).unwrap();
        gen.load_module(Arc::new(module));
        gen
    }

    #[test]
    fn frames_are_rendered_exactly() {
        let mut gen = generator();
        let out = Renderer::new()
            .render(&mut gen, &RenderRequest::new(0, RenderLength::Frames(10)))
            .unwrap();
        assert_eq!(out.frames, 10);
        assert!(!out.cancelled);
        assert!(!gen.is_playing());
    }

    #[test]
    fn loops_stop_after_the_song_wraps() {
        let mut gen = generator();
        let out = Renderer::new()
            .render(&mut gen, &RenderRequest::new(0, RenderLength::Loops(1)))
            .unwrap();
        assert_eq!(out.frames, 8);
    }

    #[test]
    fn seconds_cover_the_duration() {
        let mut gen = generator();
        let out = Renderer::new()
            .render(&mut gen, &RenderRequest::new(0, RenderLength::Seconds(0.5)))
            .unwrap();
        assert!(out.samples.len() >= 22_050);
        assert!(out.frames <= 31);
    }

    #[test]
    fn muting_every_channel_is_rejected() {
        let gen = generator();
        let order: Vec<ChannelId> = gen.module().unwrap().channel_order().iter().collect();
        let mut request = RenderRequest::new(0, RenderLength::Frames(1));
        for ch in order {
            request = request.mute(ch);
        }
        assert!(matches!(request.validate(&gen), Err(FamitoneError::Render(_))));
    }

    #[test]
    fn missing_output_path_is_rejected() {
        let request = RenderRequest::new(0, RenderLength::Frames(1));
        assert!(request.output_path().is_err());
        let request = request.with_output("/definitely/not/here/out.wav");
        assert!(request.output_path().is_err());
    }

    #[test]
    fn cancelled_before_start_renders_nothing() {
        let mut gen = generator();
        let renderer = Renderer::new();
        renderer.cancel();
        let out = renderer
            .render(&mut gen, &RenderRequest::new(0, RenderLength::Frames(100)))
            .unwrap();
        assert!(out.cancelled);
        assert_eq!(out.frames, 0);
        assert!(out.samples.is_empty());
    }

    struct MuteNoise;

    impl crate::driver::PlayerObserver for MuteNoise {
        fn is_channel_muted(&self, channel: ChannelId) -> bool {
            channel == ChannelId::Noise
        }
    }

    #[test]
    fn observer_mutes_are_not_copied_into_the_driver() {
        let mut gen = generator();
        gen.driver_mut().set_observer(Some(Box::new(MuteNoise)));
        gen.driver_mut().set_channel_muted(ChannelId::Triangle, true);
        let request = RenderRequest::new(0, RenderLength::Frames(2));
        Renderer::new().render(&mut gen, &request).unwrap();

        gen.driver_mut().take_observer();
        assert!(!gen.driver().is_channel_muted(ChannelId::Noise));
        assert!(gen.driver().is_channel_muted(ChannelId::Triangle));
    }

    #[test]
    fn mutes_are_restored() {
        let mut gen = generator();
        let request = RenderRequest::new(0, RenderLength::Frames(2)).mute(ChannelId::Noise);
        Renderer::new().render(&mut gen, &request).unwrap();
        assert!(!gen.driver().is_channel_muted(ChannelId::Noise));
    }
}
