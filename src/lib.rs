//! NES/Famicom sound emulation with a tracker sound driver
//!
//! Register-level models of the 2A03 APU and the VRC6, VRC7, FDS, MMC5,
//! Namco 163 and Sunsoft 5B expansion chips, driven by a tracker-style
//! sequencer that turns song rows into register writes at the right cycle.
//!
//! # Layers
//! - [`apu`]: chip models, the CPU-side sound bus ([`Apu`]) and the mixer
//! - [`channel`]: per-voice channel handlers and per-chip chip handlers
//! - [`driver`]: the [`SoundDriver`] state machine, tempo counter, player
//!   cursor, period tables and the thread-safe [`TrackerChannel`] mailbox
//! - [`module`]: read-only song and instrument data ([`ModuleSource`])
//! - [`engine`] and [`render`]: the tick loop and offline rendering
//!
//! # Crate feature flags
//! - `export-wav` (default): WAV output for [`render::Renderer::render_to_wav`]
//!
//! # Quick start
//! ## Bare chip
//! ```no_run
//! use famitone::{Apu, EngineConfig, Machine};
//! let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
//! apu.write(0x4015, 0x01); // enable pulse 1
//! apu.write(0x4000, 0xBF); // duty 2, constant volume 15
//! apu.write(0x4002, 0xFD); // A-4
//! apu.write(0x4003, 0x08);
//! apu.add_time(29_830);
//! let count = apu.end_frame();
//! let samples = apu.mixer_mut().take_samples();
//! assert_eq!(samples.len(), count);
//! ```
//!
//! ## Play a song
//! ```no_run
//! use std::sync::Arc;
//! use famitone::{ChanNote, ChannelId, EngineConfig, Note, Song, SoundChipSet, SoundGenerator, TrackerModule};
//! let mut song = Song::new(1, 64);
//! song.set_frame_note(ChannelId::Square1, 0, 0, ChanNote::new(Note::at(4, 0)));
//! let mut module = TrackerModule::new(SoundChipSet::VRC6, 0);
//! module.add_song(song);
//!
//! let mut gen = SoundGenerator::new(EngineConfig::default()).unwrap();
//! gen.load_module(Arc::new(module));
//! gen.start_song(0).unwrap();
//! for _ in 0..60 {
//!     gen.tick();
//! }
//! let pcm = gen.take_samples();
//! ```

#![warn(missing_docs)]

pub mod apu;
pub mod channel;
pub mod chip_service;
pub mod config;
pub mod constants;
pub mod driver;
pub mod engine;
pub mod error;
pub mod module;
pub mod render;
pub mod types;

// Public API exports
pub use apu::{Apu, Chip, ChipModel, Mixer, RegisterLog, RegisterSink, RegisterWrite};
pub use channel::{ChannelHandler, ChipHandler};
pub use chip_service::{BuiltinChipType, SoundChipService, SoundChipType};
pub use config::{ChipLevels, EngineConfig};
pub use driver::{
    DriverState, PlayerCursor, PlayerObserver, SoundDriver, TempoCounter, TrackerChannel,
};
pub use engine::SoundGenerator;
pub use error::{FamitoneError, Result};
pub use module::{
    ChannelMap, ChannelOrder, Groove, Instrument, InstrumentData, InstrumentType, ModuleSource,
    Sequence, Song, SongSource, TrackerModule,
};
pub use render::{RenderLength, RenderOutput, RenderRequest, Renderer};
pub use types::{
    ChanNote, ChannelId, Effect, EffectCommand, Machine, Note, NotePriority, PeriodTable,
    SoundChip, SoundChipSet, VibratoStyle,
};
