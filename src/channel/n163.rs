//! N163 channel handler
//!
//! Each voice owns the 8-byte register block at `0x78 - 8 * k`. Waves are
//! packed two 4-bit samples per byte, low nibble first, in the RAM below the
//! register area. The note table holds frequencies for a one-sample wave;
//! the register value is scaled by the wave length on every refresh.

use super::{ChannelCore, ChannelHandler, ChipShared};
use crate::apu::Apu;
use crate::constants::MAX_CHANNELS_N163;
use crate::module::{Instrument, InstrumentData};
use crate::types::{ChannelId, Effect, EffectCommand};

const N163_ADDRESS: u16 = 0xF800;
const N163_DATA: u16 = 0x4800;
const AUTO_INCREMENT: u8 = 0x80;

const MAX_TABLE_VALUE: i32 = 0xFFFF;
const MAX_FREQUENCY: i64 = 0x3FFFF;

/// Wavetable voice of the N163
#[derive(Debug)]
pub struct N163Handler {
    voice: usize,
    core: ChannelCore,
    waves: Vec<Vec<u8>>,
    wave_size: u8,
    wave_position: u8,
    wave_index: Option<usize>,
    buffer_position: Option<u8>,
    wave_dirty: bool,
}

impl N163Handler {
    /// Handler for voice `voice` (0-7)
    pub fn new(voice: usize) -> Self {
        let voice = voice.min(MAX_CHANNELS_N163 - 1);
        let id = ChannelId::from_index(ChannelId::N163Ch1.index() + voice)
            .unwrap_or(ChannelId::N163Ch1);
        Self {
            voice,
            core: ChannelCore::new(id, MAX_TABLE_VALUE, true),
            waves: Vec::new(),
            wave_size: 32,
            wave_position: 0,
            wave_index: None,
            buffer_position: None,
            wave_dirty: false,
        }
    }

    /// First RAM address of this voice's register block
    #[inline]
    pub fn register_base(&self) -> u8 {
        0x78 - 8 * self.voice as u8
    }

    /// Wave length in samples, a multiple of 4
    fn wave_length(&self) -> u32 {
        (self.wave_size as u32 & 0xFC).max(4)
    }

    /// Register value for a table frequency and the current wave length
    fn frequency_register(&self, period: i32) -> u32 {
        let value = period.max(0) as i64 * self.wave_length() as i64 / 4;
        value.min(MAX_FREQUENCY) as u32
    }

    fn write_ram(apu: &mut Apu, address: u8, data: &[u8]) {
        apu.write(N163_ADDRESS, AUTO_INCREMENT | (address & 0x7F));
        for &byte in data {
            apu.write(N163_DATA, byte);
        }
    }

    fn upload_wave(&mut self, apu: &mut Apu, channels: usize) {
        let index = self.core.duty() as usize;
        let Some(wave) = self.waves.get(index).or_else(|| self.waves.last()) else {
            return;
        };
        let register_area = 0x80 - 8 * channels;
        let start = self.wave_position as usize / 2;
        let packed: Vec<u8> = wave
            .chunks(2)
            .map(|pair| (pair[0] & 0x0F) | (pair.get(1).copied().unwrap_or(0) & 0x0F) << 4)
            .take(register_area.saturating_sub(start))
            .collect();
        if !packed.is_empty() {
            Self::write_ram(apu, start as u8, &packed);
        }
        self.wave_index = Some(index);
    }
}

impl ChannelHandler for N163Handler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        if cmd.effect != Effect::N163WaveBuffer {
            return false;
        }
        self.buffer_position = (cmd.param < 0x7F).then_some(cmd.param << 1);
        true
    }

    fn load_instrument(&mut self, instrument: &Instrument) {
        if let InstrumentData::N163 {
            waves,
            wave_size,
            wave_position,
        } = &instrument.data
        {
            self.waves = waves.clone();
            self.wave_size = *wave_size;
            self.wave_position = *wave_position;
            self.wave_dirty = true;
        }
    }

    fn reset_chip_state(&mut self) {
        self.wave_index = None;
        self.buffer_position = None;
        self.wave_dirty = !self.waves.is_empty();
    }

    fn refresh_channel(&mut self, apu: &mut Apu, shared: &mut ChipShared) {
        let channels = shared.n163_channels.clamp(1, MAX_CHANNELS_N163);
        if self.voice >= channels {
            return;
        }
        let base = self.register_base();
        let wave_changed = self.wave_index != Some(self.core.duty() as usize);
        if self.buffer_position.is_none() && (self.wave_dirty || wave_changed) {
            self.wave_dirty = false;
            self.upload_wave(apu, channels);
        }

        let volume = self.core.output_volume() as u8;
        let length = self.wave_length();
        let frequency = if volume > 0 {
            self.frequency_register(self.core.output_period())
        } else {
            0
        };
        let count_bits = if self.voice == 0 {
            ((channels - 1) as u8) << 4
        } else {
            0
        };
        let offset = self.buffer_position.unwrap_or(self.wave_position);
        let block = [
            (frequency & 0xFF) as u8,
            0,
            ((frequency >> 8) & 0xFF) as u8,
            0,
            ((256 - length) as u8 & 0xFC) | ((frequency >> 16) & 0x03) as u8,
            0,
            offset,
            count_bits | volume,
        ];
        for (i, value) in block.iter().enumerate() {
            // Phase bytes are left to the chip
            if i % 2 == 1 && i != 7 {
                continue;
            }
            apu.write(N163_ADDRESS, base + i as u8);
            apu.write(N163_DATA, *value);
        }
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
        apu.set_chips(SoundChipSet::N163);
        apu
    }

    #[test]
    fn voices_map_to_descending_blocks() {
        assert_eq!(N163Handler::new(0).register_base(), 0x78);
        assert_eq!(N163Handler::new(7).register_base(), 0x40);
    }

    #[test]
    fn refresh_writes_wave_and_channel_count() {
        let mut apu = bus();
        let inst = Instrument::new(InstrumentType::N163, "wave");
        let mut handler = N163Handler::new(0);
        handler.set_note_table(table(PeriodTable::N163));
        handler.load_instrument(&inst);
        handler.core_mut().trigger(45);
        let mut shared = ChipShared {
            n163_channels: 8,
            ..ChipShared::default()
        };
        handler.refresh_channel(&mut apu, &mut shared);
        match apu.chip(SoundChip::N163) {
            Some(Chip::N163(chip)) => {
                assert_eq!(chip.channels_in_use(), 7);
                assert_eq!(chip.read_mem(0x7F) & 0x0F, 15);
                // Triangle wave: samples 0, 1 packed into the first byte
                assert_eq!(chip.read_mem(0x00), 0x10);
            }
            _ => panic!("N163 missing"),
        }
    }

    #[test]
    fn frequency_register_tracks_pitch() {
        let mut apu = bus();
        let inst = Instrument::new(InstrumentType::N163, "wave");
        let mut handler = N163Handler::new(0);
        handler.set_note_table(table(PeriodTable::N163));
        handler.load_instrument(&inst);
        handler.core_mut().trigger(45);
        let mut shared = ChipShared {
            n163_channels: 8,
            ..ChipShared::default()
        };
        handler.refresh_channel(&mut apu, &mut shared);
        let hz = apu.freq(SoundChip::N163, 0);
        assert!((hz - 440.0).abs() < 10.0, "{hz}");
    }

    #[test]
    fn voices_beyond_count_stay_quiet() {
        let mut apu = bus();
        let mut handler = N163Handler::new(5);
        handler.core_mut().trigger(45);
        let mut shared = ChipShared {
            n163_channels: 2,
            ..ChipShared::default()
        };
        handler.refresh_channel(&mut apu, &mut shared);
        match apu.chip(SoundChip::N163) {
            Some(Chip::N163(chip)) => assert_eq!(chip.read_mem(0x50), 0),
            _ => panic!("N163 missing"),
        }
    }
}
