//! Song, instrument and channel data consumed by the sound driver
//!
//! The driver never parses project files. It reads module data through the
//! [`ModuleSource`] and [`SongSource`] query traits; [`TrackerModule`] and
//! [`Song`] are the in-memory implementations used by the engine, tests and
//! any importer built on top of this crate.

pub mod channel_map;
pub mod instrument;
pub mod sequence;
pub mod song;

use std::sync::Arc;

pub use channel_map::{ChannelMap, ChannelOrder};
pub use instrument::{DpcmKey, DpcmSample, Instrument, InstrumentData, InstrumentType};
pub use sequence::{ArpeggioMode, Sequence, SequencePlayer, SequenceState, SequenceType};
pub use song::{Groove, Song};

use crate::constants::{
    DEFAULT_SPEED_SPLIT, MAX_CHANNELS_N163, MAX_GROOVE, MAX_INSTRUMENTS, NOTE_COUNT,
};
use crate::types::{ChanNote, ChannelId, Machine, PeriodTable, SoundChip, SoundChipSet, VibratoStyle};

/// Read access to one song
pub trait SongSource: Send + Sync {
    /// Song title
    fn title(&self) -> &str {
        ""
    }

    /// Number of frames in the frame list
    fn frame_count(&self) -> usize;

    /// Rows per pattern
    fn pattern_length(&self) -> usize;

    /// Initial speed (ticks per row)
    fn speed(&self) -> u8;

    /// Initial tempo, 0 when tempo scaling is off
    fn tempo(&self) -> u16;

    /// Initial groove index, if the song starts on a groove
    fn groove(&self) -> Option<u8>;

    /// Cell played by `channel` at `frame`/`row`; empty when out of range
    fn active_note(&self, channel: ChannelId, frame: usize, row: usize) -> ChanNote;
}

/// Read access to module-wide data
pub trait ModuleSource: Send + Sync {
    /// Video region
    fn machine(&self) -> Machine;

    /// Engine ticks per second
    fn frame_rate(&self) -> u32 {
        self.machine().frame_rate()
    }

    /// Expansion chips in use (the 2A03 is implied)
    fn chips(&self) -> SoundChipSet;

    /// Active N163 channels (1-8)
    fn namco_channels(&self) -> usize;

    /// Vibrato depth curve
    fn vibrato_style(&self) -> VibratoStyle;

    /// Global tuning in semitones
    fn tuning_semitone(&self) -> i32;

    /// Global tuning in cents
    fn tuning_cent(&self) -> i32;

    /// Period offset of `note` in one detune table
    fn detune_offset(&self, table: PeriodTable, note: usize) -> i32;

    /// Fxx parameters at or above this value set the tempo
    fn speed_split(&self) -> u8 {
        DEFAULT_SPEED_SPLIT
    }

    /// Channels present in the module, in order
    fn channel_order(&self) -> &ChannelOrder;

    /// Number of songs
    fn song_count(&self) -> usize;

    /// Song at `index`
    fn song(&self, index: usize) -> Option<Arc<dyn SongSource>>;

    /// Instrument at `index`
    fn instrument(&self, index: u8) -> Option<Arc<Instrument>>;

    /// Groove at `index`
    fn groove(&self, index: u8) -> Option<Groove>;
}

/// In-memory module
#[derive(Debug, Clone)]
pub struct TrackerModule {
    machine: Machine,
    frame_rate: Option<u32>,
    chips: SoundChipSet,
    namco_channels: usize,
    vibrato_style: VibratoStyle,
    tuning_semitone: i32,
    tuning_cent: i32,
    detune: [[i32; NOTE_COUNT]; 6],
    speed_split: u8,
    order: ChannelOrder,
    songs: Vec<Arc<Song>>,
    instruments: Vec<Option<Arc<Instrument>>>,
    grooves: Vec<Option<Groove>>,
}

impl TrackerModule {
    /// NTSC module with the given chips, every supported channel in order
    pub fn new(chips: SoundChipSet, namco_channels: usize) -> Self {
        let map = ChannelMap::new(chips, namco_channels);
        let order = ChannelId::ALL
            .into_iter()
            .filter(|&ch| map.supports_channel(ch))
            .collect();
        Self {
            machine: Machine::Ntsc,
            frame_rate: None,
            chips: map.chips(),
            namco_channels: map.n163_channels(),
            vibrato_style: VibratoStyle::New,
            tuning_semitone: 0,
            tuning_cent: 0,
            detune: [[0; NOTE_COUNT]; 6],
            speed_split: DEFAULT_SPEED_SPLIT,
            order,
            songs: Vec::new(),
            instruments: vec![None; MAX_INSTRUMENTS],
            grooves: vec![None; MAX_GROOVE as usize],
        }
    }

    /// Builder: region
    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machine = machine;
        self
    }

    /// Builder: engine speed other than the region default
    pub fn with_frame_rate(mut self, rate: u32) -> Self {
        self.frame_rate = Some(rate.max(1));
        self
    }

    /// Builder: vibrato style
    pub fn with_vibrato_style(mut self, style: VibratoStyle) -> Self {
        self.vibrato_style = style;
        self
    }

    /// Builder: global tuning
    pub fn with_tuning(mut self, semitone: i32, cent: i32) -> Self {
        self.tuning_semitone = semitone;
        self.tuning_cent = cent;
        self
    }

    /// Builder: replace the channel order
    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    /// Set a detune offset; ignored for tables without a detune row
    pub fn set_detune(&mut self, table: PeriodTable, note: usize, offset: i32) {
        if let (Some(row), true) = (table.detune_index(), note < NOTE_COUNT) {
            self.detune[row][note] = offset;
        }
    }

    /// Append a song, returning its index
    pub fn add_song(&mut self, song: Song) -> usize {
        self.songs.push(Arc::new(song));
        self.songs.len() - 1
    }

    /// Store an instrument in slot `index`
    pub fn set_instrument(&mut self, index: u8, instrument: Instrument) {
        if let Some(slot) = self.instruments.get_mut(index as usize) {
            *slot = Some(Arc::new(instrument));
        }
    }

    /// Store a groove in slot `index`
    pub fn set_groove(&mut self, index: u8, groove: Groove) {
        if let Some(slot) = self.grooves.get_mut(index as usize) {
            *slot = Some(groove);
        }
    }

    /// Change the number of N163 channels, updating the channel order
    pub fn set_namco_channels(&mut self, count: usize) {
        if !self.chips.has(SoundChip::N163) {
            return;
        }
        self.namco_channels = count.clamp(1, MAX_CHANNELS_N163);
        let map = ChannelMap::new(self.chips, self.namco_channels);
        let dropped: Vec<_> = self
            .order
            .iter()
            .filter(|&ch| !map.supports_channel(ch))
            .collect();
        for ch in dropped {
            self.order.remove_channel(ch);
        }
        for ch in ChannelId::ALL {
            if ch.chip() == SoundChip::N163 && map.supports_channel(ch) {
                self.order.add_channel(ch);
            }
        }
    }
}

impl ModuleSource for TrackerModule {
    fn machine(&self) -> Machine {
        self.machine
    }

    fn frame_rate(&self) -> u32 {
        self.frame_rate.unwrap_or_else(|| self.machine.frame_rate())
    }

    fn chips(&self) -> SoundChipSet {
        self.chips
    }

    fn namco_channels(&self) -> usize {
        self.namco_channels
    }

    fn vibrato_style(&self) -> VibratoStyle {
        self.vibrato_style
    }

    fn tuning_semitone(&self) -> i32 {
        self.tuning_semitone
    }

    fn tuning_cent(&self) -> i32 {
        self.tuning_cent
    }

    fn detune_offset(&self, table: PeriodTable, note: usize) -> i32 {
        match table.detune_index() {
            Some(row) => self.detune[row].get(note).copied().unwrap_or(0),
            None => 0,
        }
    }

    fn speed_split(&self) -> u8 {
        self.speed_split
    }

    fn channel_order(&self) -> &ChannelOrder {
        &self.order
    }

    fn song_count(&self) -> usize {
        self.songs.len()
    }

    fn song(&self, index: usize) -> Option<Arc<dyn SongSource>> {
        self.songs
            .get(index)
            .map(|song| Arc::clone(song) as Arc<dyn SongSource>)
    }

    fn instrument(&self, index: u8) -> Option<Arc<Instrument>> {
        self.instruments.get(index as usize)?.clone()
    }

    fn groove(&self, index: u8) -> Option<Groove> {
        self.grooves.get(index as usize)?.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_lists_supported_channels() {
        let module = TrackerModule::new(SoundChipSet::VRC6, 0);
        let order: Vec<_> = module.channel_order().iter().collect();
        assert_eq!(order.len(), 8);
        assert_eq!(order[5], ChannelId::Vrc6Pulse1);
        assert_eq!(module.namco_channels(), 0);
    }

    #[test]
    fn namco_channel_count_resizes_order() {
        let mut module = TrackerModule::new(SoundChipSet::N163, 8);
        module.set_namco_channels(3);
        assert!(module.channel_order().has_channel(ChannelId::N163Ch3));
        assert!(!module.channel_order().has_channel(ChannelId::N163Ch4));
        module.set_namco_channels(5);
        assert!(module.channel_order().has_channel(ChannelId::N163Ch5));
    }

    #[test]
    fn detune_for_derived_table_is_zero() {
        let mut module = TrackerModule::new(SoundChipSet::empty(), 0);
        module.set_detune(PeriodTable::Ntsc, 10, 3);
        module.set_detune(PeriodTable::S5b, 10, 3);
        assert_eq!(module.detune_offset(PeriodTable::Ntsc, 10), 3);
        assert_eq!(module.detune_offset(PeriodTable::S5b, 10), 0);
    }
}
