//! FDS channel handler

use super::{ChannelCore, ChannelHandler, ChipShared};
use crate::apu::Apu;
use crate::constants::MAX_VOLUME;
use crate::module::{Instrument, InstrumentData};
use crate::types::{ChannelId, Effect, EffectCommand};

const MAX_FREQUENCY_FDS: i32 = 0xFFF;

/// Largest volume envelope gain
const MAX_GAIN: i32 = 0x20;

/// The FDS wavetable channel
#[derive(Debug)]
pub struct FdsHandler {
    core: ChannelCore,
    wave: [u8; 64],
    mod_table: [u8; 32],
    wave_dirty: bool,
    mod_dirty: bool,
    mod_speed: u16,
    mod_depth: u8,
    mod_delay: u8,
    mod_delay_counter: u8,
    hardware_volume: Option<u8>,
    mod_bias: Option<u8>,
}

impl FdsHandler {
    /// FDS handler
    pub fn new() -> Self {
        Self {
            core: ChannelCore::new(ChannelId::Fds, MAX_FREQUENCY_FDS, true),
            wave: [0; 64],
            mod_table: [0; 32],
            wave_dirty: false,
            mod_dirty: false,
            mod_speed: 0,
            mod_depth: 0,
            mod_delay: 0,
            mod_delay_counter: 0,
            hardware_volume: None,
            mod_bias: None,
        }
    }

    fn write_tables(&mut self, apu: &mut Apu) {
        if std::mem::take(&mut self.wave_dirty) {
            apu.write(0x4089, 0x80);
            for (i, sample) in self.wave.iter().enumerate() {
                apu.write(0x4040 + i as u16, sample & 0x3F);
            }
            apu.write(0x4089, 0x00);
        }
        if std::mem::take(&mut self.mod_dirty) {
            apu.write(0x4087, 0x80);
            for value in self.mod_table {
                apu.write(0x4088, value & 0x07);
            }
        }
    }
}

impl Default for FdsHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHandler for FdsHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        match cmd.effect {
            Effect::FdsModDepth => self.mod_depth = cmd.param & 0x3F,
            Effect::FdsModSpeedHi => {
                self.mod_speed = (self.mod_speed & 0x00FF) | (((cmd.param & 0x0F) as u16) << 8)
            }
            Effect::FdsModSpeedLo => self.mod_speed = (self.mod_speed & 0x0F00) | cmd.param as u16,
            Effect::FdsVolume => {
                self.hardware_volume = (cmd.param != 0xE0).then_some(cmd.param & 0x7F);
            }
            Effect::FdsModBias => self.mod_bias = Some(cmd.param & 0x7F),
            _ => return false,
        }
        true
    }

    fn load_instrument(&mut self, instrument: &Instrument) {
        if let InstrumentData::Fds {
            wave,
            mod_table,
            mod_speed,
            mod_depth,
            mod_delay,
        } = &instrument.data
        {
            if self.wave != *wave {
                self.wave = *wave;
                self.wave_dirty = true;
            }
            if self.mod_table != *mod_table {
                self.mod_table = *mod_table;
                self.mod_dirty = true;
            }
            self.mod_speed = *mod_speed & 0x0FFF;
            self.mod_depth = *mod_depth & 0x3F;
            self.mod_delay = *mod_delay;
        }
    }

    fn handle_note_on(&mut self, _note: u8) {
        self.mod_delay_counter = self.mod_delay;
        self.mod_bias.get_or_insert(0);
    }

    fn process_chip(&mut self) {
        self.mod_delay_counter = self.mod_delay_counter.saturating_sub(1);
    }

    fn reset_chip_state(&mut self) {
        self.hardware_volume = None;
        self.mod_bias = None;
        self.mod_delay_counter = 0;
        self.wave_dirty = true;
        self.mod_dirty = true;
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        self.write_tables(apu);

        let frequency = self.core.output_period();
        let volume = self.core.output_volume();
        if volume == 0 {
            apu.write(0x4080, 0x80);
            apu.write(0x4083, 0x80);
            return;
        }

        match self.hardware_volume {
            Some(envelope) => apu.write(0x4080, envelope),
            None => {
                let gain = volume * MAX_GAIN / MAX_VOLUME as i32;
                apu.write(0x4080, 0x80 | gain as u8);
            }
        }
        apu.write(0x4082, (frequency & 0xFF) as u8);
        apu.write(0x4083, ((frequency >> 8) & 0x0F) as u8);

        if let Some(bias) = self.mod_bias.take() {
            apu.write(0x4085, bias);
        }
        if self.mod_delay_counter == 0 && self.mod_depth > 0 {
            apu.write(0x4084, 0x80 | self.mod_depth);
            apu.write(0x4086, (self.mod_speed & 0xFF) as u8);
            apu.write(0x4087, ((self.mod_speed >> 8) & 0x0F) as u8);
        } else {
            apu.write(0x4084, 0x80);
            apu.write(0x4087, 0x80);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::EngineConfig;
    use crate::module::InstrumentType;
    use crate::types::{Machine, PeriodTable, SoundChip, SoundChipSet};

    fn bus() -> Apu {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::FDS);
        apu
    }

    #[test]
    fn instrument_wave_is_uploaded_and_played() {
        let mut apu = bus();
        let inst = Instrument::new(InstrumentType::Fds, "fds");
        let mut handler = FdsHandler::new();
        handler.set_note_table(table(PeriodTable::Fds));
        handler.load_instrument(&inst);
        handler.core_mut().trigger(45);
        handler.refresh_channel(&mut apu, &mut ChipShared::default());
        for i in 0..8u16 {
            let value = apu.read(0x4040 + i).unwrap_or(0) & 0x3F;
            assert_eq!(Some(&value), inst_wave(&inst).get(i as usize));
        }
        let hz = apu.freq(SoundChip::Fds, 0);
        assert!((hz - 440.0).abs() < 2.0, "{hz}");
    }

    fn inst_wave(inst: &Instrument) -> Vec<u8> {
        match &inst.data {
            InstrumentData::Fds { wave, .. } => wave.to_vec(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn mod_speed_effects_combine() {
        let mut handler = FdsHandler::new();
        handler.handle_chip_effect(EffectCommand {
            effect: Effect::FdsModSpeedHi,
            param: 0x03,
        });
        handler.handle_chip_effect(EffectCommand {
            effect: Effect::FdsModSpeedLo,
            param: 0x21,
        });
        assert_eq!(handler.mod_speed, 0x321);
    }

    #[test]
    fn silent_channel_halts_wave() {
        let mut apu = bus();
        let mut handler = FdsHandler::new();
        handler.refresh_channel(&mut apu, &mut ChipShared::default());
        apu.add_time(20_000);
        apu.end_frame();
        assert_eq!(apu.mixer().delta_count(ChannelId::Fds), 0);
    }
}
