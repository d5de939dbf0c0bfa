//! VRC7 channel handler

use super::{octave_of, ChannelCore, ChannelHandler, ChipShared};
use crate::apu::Apu;
use crate::constants::MAX_VOLUME;
use crate::module::{Instrument, InstrumentData};
use crate::types::{ChannelId, Effect, EffectCommand};

const VRC7_ADDRESS: u16 = 0x9010;
const VRC7_DATA: u16 = 0x9030;

const MAX_FNUM: i32 = 0x1FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum KeyState {
    #[default]
    Off,
    Trigger,
    Held,
    Released,
}

/// One FM voice of the VRC7
#[derive(Debug)]
pub struct Vrc7Handler {
    core: ChannelCore,
    voice: u8,
    patch: u8,
    custom: [u8; 8],
    custom_dirty: bool,
    port: u8,
    pending_write: Option<(u8, u8)>,
    key: KeyState,
}

impl Vrc7Handler {
    /// Handler for voice `voice` (0-5)
    pub fn new(voice: usize) -> Self {
        let id = ChannelId::from_index(ChannelId::Vrc7Ch1.index() + voice.min(5))
            .unwrap_or(ChannelId::Vrc7Ch1);
        Self {
            core: ChannelCore::new(id, MAX_FNUM, true),
            voice: voice.min(5) as u8,
            patch: 1,
            custom: [0; 8],
            custom_dirty: false,
            port: 0,
            pending_write: None,
            key: KeyState::Off,
        }
    }

    fn write_reg(apu: &mut Apu, reg: u8, value: u8) {
        apu.write(VRC7_ADDRESS, reg);
        apu.write(VRC7_DATA, value);
    }
}

impl ChannelHandler for Vrc7Handler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        match cmd.effect {
            Effect::Vrc7Port => self.port = cmd.param & 0x07,
            Effect::Vrc7Write => {
                self.pending_write = Some((self.port, cmd.param));
                if self.patch == 0 {
                    self.custom[self.port as usize] = cmd.param;
                }
            }
            _ => return false,
        }
        true
    }

    fn load_instrument(&mut self, instrument: &Instrument) {
        if let InstrumentData::Vrc7 { patch, custom } = &instrument.data {
            self.patch = *patch & 0x0F;
            if self.patch == 0 {
                self.custom = *custom;
                self.custom_dirty = true;
            }
        }
    }

    fn handle_note_on(&mut self, _note: u8) {
        self.key = KeyState::Trigger;
    }

    fn handle_cut(&mut self) {
        self.key = KeyState::Off;
    }

    fn handle_release(&mut self) {
        if self.key != KeyState::Off {
            self.key = KeyState::Released;
        }
    }

    fn reset_chip_state(&mut self) {
        self.key = KeyState::Off;
        self.pending_write = None;
        self.port = 0;
        self.custom_dirty = self.patch == 0;
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        if std::mem::take(&mut self.custom_dirty) {
            for (reg, value) in self.custom.iter().enumerate() {
                Self::write_reg(apu, reg as u8, *value);
            }
        }
        if let Some((reg, value)) = self.pending_write.take() {
            Self::write_reg(apu, reg, value);
        }

        let voice = self.voice;
        // Table F-numbers sit one block below the note's octave
        let period = self.core.output_period();
        let octave = self.core.note().map_or(0, octave_of);
        let (fnum, block) = if octave < 7 {
            (period as u16, octave + 1)
        } else {
            ((period * 2).min(MAX_FNUM) as u16, 7)
        };
        let attenuation = MAX_VOLUME - (self.core.output_volume() as u8).min(MAX_VOLUME);
        let high = ((fnum >> 8) as u8 & 0x01) | (block << 1);

        Self::write_reg(apu, 0x10 + voice, (fnum & 0xFF) as u8);
        Self::write_reg(apu, 0x30 + voice, (self.patch << 4) | attenuation);
        let key_bits = match self.key {
            KeyState::Trigger => {
                Self::write_reg(apu, 0x20 + voice, high);
                self.key = KeyState::Held;
                0x10
            }
            KeyState::Held => 0x10,
            KeyState::Released => 0x20,
            KeyState::Off => 0x00,
        };
        Self::write_reg(apu, 0x20 + voice, key_bits | high);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::apu::Chip;
    use crate::config::EngineConfig;
    use crate::module::InstrumentType;
    use crate::types::{Machine, PeriodTable, SoundChip, SoundChipSet};

    fn bus() -> Apu {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::VRC7);
        apu
    }

    #[test]
    fn note_keys_the_voice_on_its_octave() {
        let mut apu = bus();
        let mut handler = Vrc7Handler::new(2);
        handler.set_note_table(table(PeriodTable::Vrc7));
        handler.core_mut().trigger(45);
        handler.handle_note_on(45);
        handler.refresh_channel(&mut apu, &mut ChipShared::default());
        let hz = apu.freq(SoundChip::Vrc7, 2);
        assert!((hz - 440.0).abs() < 5.0, "{hz}");
    }

    #[test]
    fn custom_patch_is_uploaded() {
        let mut apu = bus();
        let inst = Instrument::new(InstrumentType::Vrc7, "fm").with_data(InstrumentData::Vrc7 {
            patch: 0,
            custom: [1, 2, 3, 4, 5, 6, 7, 8],
        });
        let mut handler = Vrc7Handler::new(0);
        handler.load_instrument(&inst);
        handler.refresh_channel(&mut apu, &mut ChipShared::default());
        match apu.chip(SoundChip::Vrc7) {
            Some(Chip::Vrc7(chip)) => assert_eq!(chip.patch(0), [1, 2, 3, 4, 5, 6, 7, 8]),
            _ => panic!("VRC7 missing"),
        }
    }

    #[test]
    fn cut_keys_off() {
        let mut apu = bus();
        let mut handler = Vrc7Handler::new(0);
        handler.set_note_table(table(PeriodTable::Vrc7));
        handler.core_mut().trigger(48);
        handler.handle_note_on(48);
        handler.refresh_channel(&mut apu, &mut ChipShared::default());
        assert!(apu.freq(SoundChip::Vrc7, 0) > 0.0);
        handler.core_mut().cut();
        handler.handle_cut();
        handler.refresh_channel(&mut apu, &mut ChipShared::default());
        assert_eq!(apu.freq(SoundChip::Vrc7, 0), 0.0);
    }
}
