//! Sound generator: driver plus sound bus
//!
//! One [`SoundGenerator::tick`] runs the driver for one engine frame, lets
//! the chips run for that frame's share of CPU cycles and resamples the
//! result. Cycle counts are carried between ticks so that the long-run
//! average matches the master clock exactly.

use std::sync::Arc;

use crate::apu::Apu;
use crate::chip_service::SoundChipService;
use crate::config::EngineConfig;
use crate::driver::{PlayerCursor, SoundDriver};
use crate::error::{FamitoneError, Result};
use crate::module::ModuleSource;
use crate::types::{ChanNote, ChannelId, Machine, NotePriority};

/// Owns the sound driver and the emulated bus
pub struct SoundGenerator {
    config: EngineConfig,
    apu: Apu,
    driver: SoundDriver,
    module: Option<Arc<dyn ModuleSource>>,
    cycle_carry: u64,
    ticks: u64,
}

impl SoundGenerator {
    /// Generator with every built-in chip type
    pub fn new(config: EngineConfig) -> Result<Self> {
        let service = SoundChipService::with_default_types()?;
        Self::with_service(config, &service)
    }

    /// Generator with chip handlers from `service`
    pub fn with_service(config: EngineConfig, service: &SoundChipService) -> Result<Self> {
        config.validate()?;
        let apu = Apu::new(Machine::default(), &config);
        let driver = SoundDriver::new(service)?;
        Ok(Self {
            config,
            apu,
            driver,
            module: None,
            cycle_carry: 0,
            ticks: 0,
        })
    }

    /// Install a module: the bus gets its chips and region, tables are rebuilt
    pub fn load_module(&mut self, module: Arc<dyn ModuleSource>) {
        self.driver.stop_player();
        self.apu.set_machine(module.machine());
        self.apu.set_chips(module.chips());
        self.apu.configure(&self.config);
        self.apu.reset();
        self.driver.assign_module(module.clone());
        self.driver.reset_tracks(&mut self.apu);
        self.module = Some(module);
        self.cycle_carry = 0;
    }

    /// Apply new output settings
    pub fn configure(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        self.apu.configure(&config);
        self.config = config;
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loaded module
    pub fn module(&self) -> Option<&Arc<dyn ModuleSource>> {
        self.module.as_ref()
    }

    /// Start song `index` from its first row
    pub fn start_song(&mut self, index: usize) -> Result<()> {
        self.start_song_at(index, 0, 0)
    }

    /// Start song `index` at `frame`/`row`
    pub fn start_song_at(&mut self, index: usize, frame: usize, row: usize) -> Result<()> {
        let module = self
            .module
            .as_ref()
            .ok_or_else(|| FamitoneError::Config("no module loaded".into()))?;
        let song = module
            .song(index)
            .ok_or_else(|| FamitoneError::Config(format!("song {index} does not exist")))?;
        let mut cursor = PlayerCursor::new(song);
        cursor.move_to(frame, row);
        self.driver.reset_tracks(&mut self.apu);
        self.driver.start_player(cursor);
        Ok(())
    }

    /// Stop playback and silence every channel
    pub fn stop(&mut self) {
        self.driver.stop_player();
        self.driver.reset_tracks(&mut self.apu);
    }

    /// Whether a song is playing
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.driver.is_playing()
    }

    /// Preview a cell on `channel` (editor priority)
    pub fn queue_note(&self, channel: ChannelId, note: ChanNote) {
        self.driver.queue_note(channel, note, NotePriority::Prio2);
    }

    fn cycles_for_tick(&mut self) -> u32 {
        let rate = self
            .module
            .as_ref()
            .map_or(self.apu.machine().frame_rate(), |m| m.frame_rate())
            .max(1) as u64;
        self.cycle_carry += self.apu.machine().master_clock() as u64;
        let cycles = self.cycle_carry / rate;
        self.cycle_carry %= rate;
        cycles as u32
    }

    /// Run one engine frame; returns the number of samples produced
    pub fn tick(&mut self) -> usize {
        self.driver.tick(&mut self.apu);
        if self.driver.should_halt() {
            log::debug!("halt after {} ticks", self.ticks);
            self.driver.stop_player();
            self.driver.reset_tracks(&mut self.apu);
        }
        let cycles = self.cycles_for_tick();
        self.apu.add_time(cycles);
        self.ticks += 1;
        self.apu.end_frame()
    }

    /// Engine frames run so far
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Take the samples produced since the last call
    pub fn take_samples(&mut self) -> Vec<i16> {
        self.apu.mixer_mut().take_samples()
    }

    /// Sound driver
    pub fn driver(&self) -> &SoundDriver {
        &self.driver
    }

    /// Mutable sound driver
    pub fn driver_mut(&mut self) -> &mut SoundDriver {
        &mut self.driver
    }

    /// Sound bus
    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    /// Mutable sound bus
    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }
}

impl std::fmt::Debug for SoundGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundGenerator")
            .field("apu", &self.apu)
            .field("driver", &self.driver)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MASTER_CLOCK_NTSC;
    use crate::module::{Song, TrackerModule};
    use crate::types::{Effect, Note, SoundChipSet};

    fn generator(song: Song) -> SoundGenerator {
        let mut module = TrackerModule::new(SoundChipSet::empty(), 0);
        module.add_song(song);
        let mut gen = SoundGenerator::new(EngineConfig::default()).unwrap();
        gen.load_module(Arc::new(module));
        gen
    }

    #[test]
    fn cycles_average_to_the_master_clock() {
        let mut gen = generator(Song::new(1, 16));
        let total: u64 = (0..60).map(|_| gen.cycles_for_tick() as u64).sum();
        assert_eq!(total, MASTER_CLOCK_NTSC as u64);
    }

    #[test]
    fn missing_song_is_an_error() {
        let mut gen = generator(Song::new(1, 16));
        assert!(matches!(gen.start_song(3), Err(FamitoneError::Config(_))));
        assert!(!gen.is_playing());
    }

    #[test]
    fn playing_square_produces_samples() {
        let mut song = Song::new(1, 16);
        song.set_frame_note(ChannelId::Square1, 0, 0, ChanNote::new(Note::at(4, 0)));
        let mut gen = generator(song);
        gen.start_song(0).unwrap();
        let mut produced = 0;
        for _ in 0..4 {
            produced += gen.tick();
        }
        let samples = gen.take_samples();
        assert_eq!(samples.len(), produced);
        assert!(samples.iter().any(|&s| s != 0));
        assert_eq!(gen.driver().channel_note(ChannelId::Square1), 48);
    }

    #[test]
    fn halt_stops_the_player() {
        let mut song = Song::new(1, 16).with_tempo(0).with_speed(1);
        song.set_frame_note(
            ChannelId::Square1,
            0,
            0,
            ChanNote::new(Note::at(4, 0)).with_effect(Effect::Halt, 0),
        );
        let mut gen = generator(song);
        gen.start_song(0).unwrap();
        gen.tick();
        assert!(gen.is_playing());
        gen.tick();
        assert!(!gen.is_playing());
        assert_eq!(gen.driver().channel_note(ChannelId::Square1), -1);
    }
}
