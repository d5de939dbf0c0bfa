//! Per-channel note mailbox
//!
//! The sequencer and any editor thread queue cells here; the audio tick takes
//! them. A queued cell is only replaced by one of equal or higher priority.

use parking_lot::Mutex;

use crate::constants::MAX_GROOVE;
use crate::module::InstrumentType;
use crate::types::{ChanNote, ChannelId, Effect, NotePriority, SoundChip};

#[derive(Debug, Default)]
struct Mailbox {
    note: ChanNote,
    priority: NotePriority,
    new_note: bool,
    volume_meter: i32,
    pitch: i32,
}

/// Latest-value-with-priority cell for one channel
#[derive(Debug, Default)]
pub struct TrackerChannel {
    inner: Mutex<Mailbox>,
}

impl TrackerChannel {
    /// Empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `note` unless a higher priority cell is pending
    pub fn set_note(&self, note: ChanNote, priority: NotePriority) {
        let mut inner = self.inner.lock();
        if priority >= inner.priority {
            inner.note = note;
            inner.new_note = true;
            inner.priority = priority;
        }
    }

    /// Take the pending cell, leaving the mailbox empty
    pub fn get_note(&self) -> ChanNote {
        let mut inner = self.inner.lock();
        inner.new_note = false;
        inner.priority = NotePriority::Prio0;
        std::mem::take(&mut inner.note)
    }

    /// Whether a cell is pending
    pub fn new_note_data(&self) -> bool {
        self.inner.lock().new_note
    }

    /// Drop the pending cell and live values
    pub fn reset(&self) {
        *self.inner.lock() = Mailbox::default();
    }

    /// Record the channel's output volume for meters
    pub fn set_volume_meter(&self, value: i32) {
        self.inner.lock().volume_meter = value;
    }

    /// Last recorded output volume
    pub fn volume_meter(&self) -> i32 {
        self.inner.lock().volume_meter
    }

    /// Set the pitch wheel position
    pub fn set_pitch(&self, pitch: i32) {
        self.inner.lock().pitch = pitch;
    }

    /// Pitch wheel position
    pub fn pitch(&self) -> i32 {
        self.inner.lock().pitch
    }
}

/// Whether `chip` can play instruments of type `kind`
pub fn is_instrument_compatible(chip: SoundChip, kind: InstrumentType) -> bool {
    match chip {
        SoundChip::Vrc7 => kind == InstrumentType::Vrc7,
        _ => kind != InstrumentType::Vrc7,
    }
}

/// Whether `channel` accepts `effect` with `param`
pub fn is_effect_compatible(channel: ChannelId, effect: Effect, param: u8) -> bool {
    let chip = channel.chip();
    let dpcm = channel == ChannelId::Dpcm;
    match effect {
        Effect::None
        | Effect::Speed
        | Effect::Jump
        | Effect::Skip
        | Effect::Halt
        | Effect::Delay => true,
        Effect::NoteCut | Effect::NoteRelease => param <= 0x7F || channel == ChannelId::Triangle,
        Effect::Groove => param < MAX_GROOVE,
        Effect::Volume => {
            ((chip == SoundChip::Apu && !dpcm) || chip == SoundChip::Mmc5)
                && (param <= 0x1F || (0xE0..=0xE3).contains(&param))
        }
        Effect::Portamento
        | Effect::Arpeggio
        | Effect::Vibrato
        | Effect::Tremolo
        | Effect::Pitch
        | Effect::PortaUp
        | Effect::PortaDown
        | Effect::SlideUp
        | Effect::SlideDown
        | Effect::VolumeSlide
        | Effect::DelayedVolume
        | Effect::Transpose
        | Effect::DutyCycle => !dpcm,
        Effect::PortaOff => false,
        Effect::SweepUp | Effect::SweepDown => {
            matches!(channel, ChannelId::Square1 | ChannelId::Square2)
        }
        Effect::Dac | Effect::SampleOffset | Effect::Retrigger | Effect::DpcmPitch => dpcm,
        Effect::FdsModDepth => chip == SoundChip::Fds && (param <= 0x3F || param >= 0x80),
        Effect::FdsModSpeedHi | Effect::FdsModSpeedLo | Effect::FdsModBias => {
            chip == SoundChip::Fds
        }
        Effect::FdsVolume => chip == SoundChip::Fds && (param <= 0x7F || param == 0xE0),
        Effect::SunsoftEnvLo
        | Effect::SunsoftEnvHi
        | Effect::SunsoftEnvType
        | Effect::SunsoftNoise => chip == SoundChip::S5b,
        Effect::N163WaveBuffer => chip == SoundChip::N163 && param <= 0x7F,
        Effect::Vrc7Port | Effect::Vrc7Write => chip == SoundChip::Vrc7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Note;

    fn cell(note: u8) -> ChanNote {
        ChanNote::new(Note::Value(note))
    }

    #[test]
    fn higher_priority_wins_in_either_order() {
        let ch = TrackerChannel::new();
        ch.set_note(cell(10), NotePriority::Prio1);
        ch.set_note(cell(20), NotePriority::Prio2);
        assert_eq!(ch.get_note().note, Note::Value(20));

        ch.set_note(cell(20), NotePriority::Prio2);
        ch.set_note(cell(10), NotePriority::Prio1);
        assert!(ch.new_note_data());
        assert_eq!(ch.get_note().note, Note::Value(20));
    }

    #[test]
    fn get_note_clears_the_mailbox() {
        let ch = TrackerChannel::new();
        ch.set_note(cell(30), NotePriority::Prio1);
        ch.get_note();
        assert!(!ch.new_note_data());
        assert!(ch.get_note().is_empty());
        ch.set_note(cell(31), NotePriority::Prio1);
        assert_eq!(ch.get_note().note, Note::Value(31));
    }

    #[test]
    fn reset_clears_live_values() {
        let ch = TrackerChannel::new();
        ch.set_pitch(12);
        ch.set_volume_meter(9);
        ch.set_note(cell(1), NotePriority::Prio2);
        ch.reset();
        assert_eq!((ch.pitch(), ch.volume_meter()), (0, 0));
        assert!(!ch.new_note_data());
    }

    #[test]
    fn effect_compatibility() {
        assert!(is_effect_compatible(ChannelId::Square1, Effect::SweepUp, 0x88));
        assert!(!is_effect_compatible(ChannelId::Mmc5Square1, Effect::SweepUp, 0x88));
        assert!(is_effect_compatible(ChannelId::Dpcm, Effect::Retrigger, 2));
        assert!(!is_effect_compatible(ChannelId::Dpcm, Effect::Vibrato, 0x44));
        assert!(is_effect_compatible(ChannelId::Triangle, Effect::NoteCut, 0x85));
        assert!(!is_effect_compatible(ChannelId::Square1, Effect::NoteCut, 0x85));
        assert!(is_effect_compatible(ChannelId::Mmc5Square2, Effect::Volume, 0xE1));
        assert!(!is_effect_compatible(ChannelId::Vrc6Pulse1, Effect::Volume, 0x01));
        assert!(!is_effect_compatible(ChannelId::Fds, Effect::FdsModDepth, 0x50));
        assert!(is_effect_compatible(ChannelId::N163Ch2, Effect::N163WaveBuffer, 0x7F));
        assert!(!is_effect_compatible(ChannelId::Vrc7Ch1, Effect::PortaOff, 0));
    }

    #[test]
    fn instrument_compatibility() {
        assert!(is_instrument_compatible(SoundChip::Vrc7, InstrumentType::Vrc7));
        assert!(!is_instrument_compatible(SoundChip::Vrc7, InstrumentType::Apu));
        assert!(is_instrument_compatible(SoundChip::N163, InstrumentType::Apu));
        assert!(!is_instrument_compatible(SoundChip::Apu, InstrumentType::Vrc7));
    }
}
