//! Hardware and tracker constants
//!
//! Clock rates, note ranges and sequencer limits shared by the chip models,
//! the channel handlers and the sound driver.

/// NTSC 2A03 CPU clock in Hz
pub const MASTER_CLOCK_NTSC: u32 = 1_789_773;

/// PAL 2A07 CPU clock in Hz
pub const MASTER_CLOCK_PAL: u32 = 1_662_607;

/// NTSC engine refresh rate (ticks per second)
pub const FRAME_RATE_NTSC: u32 = 60;

/// PAL engine refresh rate (ticks per second)
pub const FRAME_RATE_PAL: u32 = 50;

/// Semitones per octave
pub const NOTE_RANGE: usize = 12;

/// Octaves addressable from a pattern
pub const OCTAVE_RANGE: usize = 8;

/// Number of playable notes (C-0 .. B-7)
pub const NOTE_COUNT: usize = NOTE_RANGE * OCTAVE_RANGE;

/// Effect columns per pattern cell
pub const MAX_EFFECT_COLUMNS: usize = 4;

/// Number of groove slots in a module
pub const MAX_GROOVE: u8 = 32;

/// Number of instrument slots in a module
pub const MAX_INSTRUMENTS: usize = 64;

/// Highest channel volume value
pub const MAX_VOLUME: u8 = 0x0F;

/// Wavetable channels on the Namco 163
pub const MAX_CHANNELS_N163: usize = 8;

/// Depth x phase entries in the vibrato table
pub const VIBRATO_TABLE_SIZE: usize = 16 * 16;

/// Tempo used when a song does not specify one
pub const DEFAULT_TEMPO_NTSC: u16 = 150;

/// Speed (ticks per row) used when a song does not specify one
pub const DEFAULT_SPEED: u8 = 6;

/// Fxx parameters at or above this value set tempo instead of speed
pub const DEFAULT_SPEED_SPLIT: u8 = 32;

/// Base address of DPCM sample memory on the CPU bus
pub const DPCM_BASE_ADDRESS: u16 = 0xC000;

/// Size of the DPCM sample window ($C000-$FFFF)
pub const DPCM_MEMORY_SIZE: usize = 0x4000;
