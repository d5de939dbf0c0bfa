//! Shared identifiers for chips, channels, notes and effects

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    FRAME_RATE_NTSC, FRAME_RATE_PAL, MASTER_CLOCK_NTSC, MASTER_CLOCK_PAL, MAX_EFFECT_COLUMNS,
    NOTE_COUNT, NOTE_RANGE,
};

/// Sound chips known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SoundChip {
    /// Internal 2A03/2A07 APU
    Apu,
    /// Konami VRC6
    Vrc6,
    /// Konami VRC7 (OPLL derivative)
    Vrc7,
    /// Famicom Disk System
    Fds,
    /// Nintendo MMC5
    Mmc5,
    /// Namco 163
    N163,
    /// Sunsoft 5B
    S5b,
}

impl SoundChip {
    /// All chips in canonical driver order
    pub const ALL: [SoundChip; 7] = [
        SoundChip::Apu,
        SoundChip::Vrc6,
        SoundChip::Vrc7,
        SoundChip::Fds,
        SoundChip::Mmc5,
        SoundChip::N163,
        SoundChip::S5b,
    ];

    /// Flag for this chip inside a [`SoundChipSet`]
    pub fn flag(self) -> SoundChipSet {
        match self {
            SoundChip::Apu => SoundChipSet::APU,
            SoundChip::Vrc6 => SoundChipSet::VRC6,
            SoundChip::Vrc7 => SoundChipSet::VRC7,
            SoundChip::Fds => SoundChipSet::FDS,
            SoundChip::Mmc5 => SoundChipSet::MMC5,
            SoundChip::N163 => SoundChipSet::N163,
            SoundChip::S5b => SoundChipSet::S5B,
        }
    }
}

bitflags! {
    /// Set of chips present on a cartridge
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SoundChipSet: u8 {
        /// Internal APU
        const APU = 1 << 0;
        /// Konami VRC6
        const VRC6 = 1 << 1;
        /// Konami VRC7
        const VRC7 = 1 << 2;
        /// Famicom Disk System
        const FDS = 1 << 3;
        /// Nintendo MMC5
        const MMC5 = 1 << 4;
        /// Namco 163
        const N163 = 1 << 5;
        /// Sunsoft 5B
        const S5B = 1 << 6;
    }
}

impl SoundChipSet {
    /// Whether the set contains `chip`
    pub fn has(self, chip: SoundChip) -> bool {
        self.contains(chip.flag())
    }

    /// Iterate the chips of this set in canonical order
    pub fn chips(self) -> impl Iterator<Item = SoundChip> {
        SoundChip::ALL.into_iter().filter(move |chip| self.has(*chip))
    }
}

/// Number of logical channels across all chips
pub const CHANNEL_COUNT: usize = 29;

/// Logical tracker channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ChannelId {
    Square1,
    Square2,
    Triangle,
    Noise,
    Dpcm,
    Vrc6Pulse1,
    Vrc6Pulse2,
    Vrc6Sawtooth,
    Mmc5Square1,
    Mmc5Square2,
    Mmc5Voice,
    N163Ch1,
    N163Ch2,
    N163Ch3,
    N163Ch4,
    N163Ch5,
    N163Ch6,
    N163Ch7,
    N163Ch8,
    Fds,
    Vrc7Ch1,
    Vrc7Ch2,
    Vrc7Ch3,
    Vrc7Ch4,
    Vrc7Ch5,
    Vrc7Ch6,
    S5bCh1,
    S5bCh2,
    S5bCh3,
}

impl ChannelId {
    /// Every channel, indexed by [`ChannelId::index`]
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [
        ChannelId::Square1,
        ChannelId::Square2,
        ChannelId::Triangle,
        ChannelId::Noise,
        ChannelId::Dpcm,
        ChannelId::Vrc6Pulse1,
        ChannelId::Vrc6Pulse2,
        ChannelId::Vrc6Sawtooth,
        ChannelId::Mmc5Square1,
        ChannelId::Mmc5Square2,
        ChannelId::Mmc5Voice,
        ChannelId::N163Ch1,
        ChannelId::N163Ch2,
        ChannelId::N163Ch3,
        ChannelId::N163Ch4,
        ChannelId::N163Ch5,
        ChannelId::N163Ch6,
        ChannelId::N163Ch7,
        ChannelId::N163Ch8,
        ChannelId::Fds,
        ChannelId::Vrc7Ch1,
        ChannelId::Vrc7Ch2,
        ChannelId::Vrc7Ch3,
        ChannelId::Vrc7Ch4,
        ChannelId::Vrc7Ch5,
        ChannelId::Vrc7Ch6,
        ChannelId::S5bCh1,
        ChannelId::S5bCh2,
        ChannelId::S5bCh3,
    ];

    /// Dense index of this channel
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Channel for a dense index, `None` when out of range
    pub fn from_index(index: usize) -> Option<ChannelId> {
        Self::ALL.get(index).copied()
    }

    /// Chip that owns this channel
    pub fn chip(self) -> SoundChip {
        use ChannelId::*;
        match self {
            Square1 | Square2 | Triangle | Noise | Dpcm => SoundChip::Apu,
            Vrc6Pulse1 | Vrc6Pulse2 | Vrc6Sawtooth => SoundChip::Vrc6,
            Mmc5Square1 | Mmc5Square2 | Mmc5Voice => SoundChip::Mmc5,
            N163Ch1 | N163Ch2 | N163Ch3 | N163Ch4 | N163Ch5 | N163Ch6 | N163Ch7 | N163Ch8 => {
                SoundChip::N163
            }
            Fds => SoundChip::Fds,
            Vrc7Ch1 | Vrc7Ch2 | Vrc7Ch3 | Vrc7Ch4 | Vrc7Ch5 | Vrc7Ch6 => SoundChip::Vrc7,
            S5bCh1 | S5bCh2 | S5bCh3 => SoundChip::S5b,
        }
    }
}

/// Video region of the emulated console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Machine {
    /// 2A03, 60 Hz
    #[default]
    Ntsc,
    /// 2A07, 50 Hz
    Pal,
}

impl Machine {
    /// CPU clock in Hz
    pub fn master_clock(self) -> u32 {
        match self {
            Machine::Ntsc => MASTER_CLOCK_NTSC,
            Machine::Pal => MASTER_CLOCK_PAL,
        }
    }

    /// Default engine refresh rate
    pub fn frame_rate(self) -> u32 {
        match self {
            Machine::Ntsc => FRAME_RATE_NTSC,
            Machine::Pal => FRAME_RATE_PAL,
        }
    }
}

/// Vibrato table generation style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VibratoStyle {
    /// Sine based depth curve
    #[default]
    New,
    /// Linear depth curve of older releases
    Old,
}

/// Period/frequency lookup table families
///
/// The first six double as indices into a module's detune table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodTable {
    /// 2A03, MMC5 and VRC6 pulses
    Ntsc,
    /// 2A07
    Pal,
    /// VRC6 sawtooth
    Saw,
    /// VRC7 F-numbers
    Vrc7,
    /// FDS frequency register
    Fds,
    /// N163 frequency register
    N163,
    /// Sunsoft 5B
    S5b,
}

impl PeriodTable {
    /// Tables that carry their own detune row
    pub const DETUNED: [PeriodTable; 6] = [
        PeriodTable::Ntsc,
        PeriodTable::Pal,
        PeriodTable::Saw,
        PeriodTable::Vrc7,
        PeriodTable::Fds,
        PeriodTable::N163,
    ];

    /// Row of the detune table, `None` for tables derived from another
    pub fn detune_index(self) -> Option<usize> {
        match self {
            PeriodTable::Ntsc => Some(0),
            PeriodTable::Pal => Some(1),
            PeriodTable::Saw => Some(2),
            PeriodTable::Vrc7 => Some(3),
            PeriodTable::Fds => Some(4),
            PeriodTable::N163 => Some(5),
            PeriodTable::S5b => None,
        }
    }
}

/// Priority of a queued note; higher priorities replace lower ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NotePriority {
    /// Nothing queued
    #[default]
    Prio0,
    /// Notes from the player
    Prio1,
    /// Notes from the editor (preview, MIDI)
    Prio2,
}

/// Note column of a pattern cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Note {
    /// Empty cell
    #[default]
    None,
    /// A pitched note, `0..NOTE_COUNT` (C-0 = 0)
    Value(u8),
    /// Note cut
    Halt,
    /// Note release
    Release,
}

impl Note {
    /// Note at `octave` and `semitone` (0 = C)
    pub fn at(octave: u8, semitone: u8) -> Note {
        let value = octave as usize * NOTE_RANGE + semitone as usize;
        Note::Value(value.min(NOTE_COUNT - 1) as u8)
    }

    /// Pitched note index, if any
    pub fn value(self) -> Option<u8> {
        match self {
            Note::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; NOTE_RANGE] = [
            "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
        ];
        match self {
            Note::None => write!(f, "..."),
            Note::Halt => write!(f, "---"),
            Note::Release => write!(f, "==="),
            Note::Value(v) => {
                let v = *v as usize;
                write!(f, "{}{}", NAMES[v % NOTE_RANGE], v / NOTE_RANGE)
            }
        }
    }
}

/// Pattern effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Effect {
    #[default]
    None,
    Speed,
    Jump,
    Skip,
    Halt,
    Volume,
    Portamento,
    PortaOff,
    SweepUp,
    SweepDown,
    Arpeggio,
    Vibrato,
    Tremolo,
    Pitch,
    Delay,
    Dac,
    PortaUp,
    PortaDown,
    DutyCycle,
    SampleOffset,
    SlideUp,
    SlideDown,
    VolumeSlide,
    NoteCut,
    Retrigger,
    DelayedVolume,
    FdsModDepth,
    FdsModSpeedHi,
    FdsModSpeedLo,
    DpcmPitch,
    SunsoftEnvType,
    SunsoftEnvHi,
    SunsoftEnvLo,
    SunsoftNoise,
    Vrc7Port,
    Vrc7Write,
    NoteRelease,
    Groove,
    Transpose,
    N163WaveBuffer,
    FdsVolume,
    FdsModBias,
}

impl Effect {
    /// Whether the effect changes playback state instead of a channel's sound
    pub fn is_global(self) -> bool {
        matches!(
            self,
            Effect::Speed | Effect::Jump | Effect::Skip | Effect::Halt | Effect::Groove
        )
    }

    /// Pattern column letter
    pub fn letter(self) -> char {
        use Effect::*;
        match self {
            None => '.',
            Speed => 'F',
            Jump => 'B',
            Skip => 'D',
            Halt => 'C',
            Volume => 'E',
            Portamento => '3',
            PortaOff => '\'',
            SweepUp => 'H',
            SweepDown => 'I',
            Arpeggio => '0',
            Vibrato => '4',
            Tremolo => '7',
            Pitch => 'P',
            Delay => 'G',
            Dac => 'Z',
            PortaUp => '1',
            PortaDown => '2',
            DutyCycle => 'V',
            SampleOffset => 'Y',
            SlideUp => 'Q',
            SlideDown => 'R',
            VolumeSlide => 'A',
            NoteCut => 'S',
            Retrigger => 'X',
            DelayedVolume => 'M',
            FdsModDepth => 'H',
            FdsModSpeedHi => 'I',
            FdsModSpeedLo => 'J',
            DpcmPitch => 'W',
            SunsoftEnvType => 'J',
            SunsoftEnvHi => 'I',
            SunsoftEnvLo => 'H',
            SunsoftNoise => 'W',
            Vrc7Port => 'H',
            Vrc7Write => 'I',
            NoteRelease => 'L',
            Groove => 'O',
            Transpose => 'T',
            N163WaveBuffer => 'Z',
            FdsVolume => 'E',
            FdsModBias => 'Z',
        }
    }
}

/// One effect column of a pattern cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectCommand {
    /// Effect kind
    pub effect: Effect,
    /// Effect parameter
    pub param: u8,
}

/// Complete pattern cell for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChanNote {
    /// Note column
    pub note: Note,
    /// Instrument column
    pub instrument: Option<u8>,
    /// Volume column (0-15)
    pub volume: Option<u8>,
    /// Effect columns
    pub effects: [EffectCommand; MAX_EFFECT_COLUMNS],
}

impl ChanNote {
    /// Cell with a note and nothing else
    pub fn new(note: Note) -> Self {
        Self {
            note,
            ..Self::default()
        }
    }

    /// Builder: set instrument column
    pub fn with_instrument(mut self, instrument: u8) -> Self {
        self.instrument = Some(instrument);
        self
    }

    /// Builder: set volume column
    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume.min(crate::constants::MAX_VOLUME));
        self
    }

    /// Builder: place an effect in the first free column
    ///
    /// The effect is dropped if every column is in use.
    pub fn with_effect(mut self, effect: Effect, param: u8) -> Self {
        if let Some(slot) = self.effects.iter_mut().find(|e| e.effect == Effect::None) {
            *slot = EffectCommand { effect, param };
        }
        self
    }

    /// Whether the cell carries no data at all
    pub fn is_empty(&self) -> bool {
        self.note == Note::None
            && self.instrument.is_none()
            && self.volume.is_none()
            && self.effects.iter().all(|e| e.effect == Effect::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_index_round_trips_through_all() {
        for (i, ch) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
            assert_eq!(ChannelId::from_index(i), Some(*ch));
        }
        assert_eq!(ChannelId::from_index(CHANNEL_COUNT), None);
    }

    #[test]
    fn chip_set_iterates_in_driver_order() {
        let set = SoundChipSet::N163 | SoundChipSet::APU | SoundChipSet::VRC6;
        let chips: Vec<_> = set.chips().collect();
        assert_eq!(chips, vec![SoundChip::Apu, SoundChip::Vrc6, SoundChip::N163]);
    }

    #[test]
    fn note_display_matches_tracker_names() {
        assert_eq!(Note::at(4, 0).to_string(), "C-4");
        assert_eq!(Note::at(3, 10).to_string(), "A#3");
        assert_eq!(Note::Halt.to_string(), "---");
    }

    #[test]
    fn with_effect_fills_free_columns_only() {
        let mut note = ChanNote::new(Note::at(4, 0));
        for _ in 0..MAX_EFFECT_COLUMNS + 1 {
            note = note.with_effect(Effect::Vibrato, 0x44);
        }
        assert!(note.effects.iter().all(|e| e.effect == Effect::Vibrato));
    }
}
