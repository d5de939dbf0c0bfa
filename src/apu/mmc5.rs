//! Nintendo MMC5 audio: two pulses, raw PCM, multiplier and ExRAM

use super::square::{Square, SweepMode};
use super::{ChannelOutput, ChipModel, Mixer};
use crate::constants::MASTER_CLOCK_NTSC;
use crate::types::{ChannelId, SoundChip};

/// CPU cycles between envelope/length clocks (240 Hz)
const SEQUENCE_PERIOD: u32 = 7457;

const EXRAM_SIZE: usize = 0x400;

/// The MMC5 sound unit
#[derive(Debug, Clone)]
pub struct Mmc5 {
    square1: Square,
    square2: Square,
    pcm: ChannelOutput,
    pcm_level: u8,
    pcm_read_mode: bool,
    exram: Box<[u8; EXRAM_SIZE]>,
    mul_low: u8,
    mul_high: u8,
    sequence_counter: u32,
    time: u32,
}

impl Mmc5 {
    /// Power-on MMC5
    pub fn new() -> Self {
        Self {
            square1: Square::new(ChannelId::Mmc5Square1, SweepMode::Absent),
            square2: Square::new(ChannelId::Mmc5Square2, SweepMode::Absent),
            pcm: ChannelOutput::new(ChannelId::Mmc5Voice),
            pcm_level: 0,
            pcm_read_mode: false,
            exram: Box::new([0; EXRAM_SIZE]),
            mul_low: 0,
            mul_high: 0,
            sequence_counter: SEQUENCE_PERIOD,
            time: 0,
        }
    }

    fn clock_sequence(&mut self) {
        self.square1.clock_envelope();
        self.square2.clock_envelope();
        self.square1.clock_length();
        self.square2.clock_length();
    }
}

impl Default for Mmc5 {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModel for Mmc5 {
    fn id(&self) -> SoundChip {
        SoundChip::Mmc5
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn maps(&self, address: u16) -> bool {
        matches!(
            address,
            0x5000..=0x5003 | 0x5004..=0x5007 | 0x5010 | 0x5011 | 0x5015 | 0x5205 | 0x5206 | 0x5C00..=0x5FFF
        )
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x5000..=0x5003 => self.square1.write(address & 0x03, value),
            0x5004..=0x5007 => self.square2.write(address & 0x03, value),
            0x5010 => self.pcm_read_mode = value & 0x01 != 0,
            // Zero is ignored by the hardware in write mode
            0x5011 => {
                if !self.pcm_read_mode && value != 0 {
                    self.pcm_level = value;
                }
            }
            0x5015 => {
                self.square1.set_enabled(value & 0x01 != 0);
                self.square2.set_enabled(value & 0x02 != 0);
            }
            0x5205 => self.mul_low = value,
            0x5206 => self.mul_high = value,
            0x5C00..=0x5FFF => self.exram[(address & 0x3FF) as usize] = value,
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        let product = self.mul_low as u16 * self.mul_high as u16;
        match address {
            0x5015 => {
                let mut status = 0;
                if self.square1.is_active() {
                    status |= 0x01;
                }
                if self.square2.is_active() {
                    status |= 0x02;
                }
                Some(status)
            }
            0x5205 => Some((product & 0xFF) as u8),
            0x5206 => Some((product >> 8) as u8),
            0x5C00..=0x5FFF => Some(self.exram[(address & 0x3FF) as usize]),
            _ => None,
        }
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if time == 0 {
            return;
        }
        self.pcm.mix(mixer, self.pcm_level as i32, self.time);

        let mut remaining = time;
        while remaining > 0 {
            let step = remaining.min(self.sequence_counter);
            self.square1.process(step, mixer);
            self.square2.process(step, mixer);
            self.sequence_counter -= step;
            remaining -= step;
            self.time += step;
            if self.sequence_counter == 0 {
                self.sequence_counter = SEQUENCE_PERIOD;
                self.clock_sequence();
            }
        }
    }

    fn end_frame(&mut self) {
        self.square1.end_frame();
        self.square2.end_frame();
        self.time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        match channel {
            0 => self.square1.frequency(MASTER_CLOCK_NTSC),
            1 => self.square2.frequency(MASTER_CLOCK_NTSC),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier() {
        let mut mmc5 = Mmc5::new();
        mmc5.write(0x5205, 200);
        mmc5.write(0x5206, 100);
        assert_eq!(mmc5.read(0x5205), Some((20_000u16 & 0xFF) as u8));
        assert_eq!(mmc5.read(0x5206), Some((20_000u16 >> 8) as u8));
    }

    #[test]
    fn test_exram_round_trip() {
        let mut mmc5 = Mmc5::new();
        mmc5.write(0x5C10, 0xAB);
        assert_eq!(mmc5.read(0x5C10), Some(0xAB));
        assert_eq!(mmc5.read(0x5100), None);
    }

    #[test]
    fn test_raw_pcm_reaches_mixer() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut mmc5 = Mmc5::new();
        mmc5.write(0x5011, 0x80);
        mmc5.process(0, &mut mixer);
        assert_eq!(mixer.total_delta_count(), 0);
        mmc5.process(1, &mut mixer);
        assert_eq!(mixer.channel_level(ChannelId::Mmc5Voice), 0x80);
    }

    #[test]
    fn test_square_plays_when_enabled() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut mmc5 = Mmc5::new();
        mmc5.write(0x5015, 0x01);
        mmc5.write(0x5000, 0xBF);
        mmc5.write(0x5002, 0xFF);
        mmc5.write(0x5003, 0x07);
        mmc5.process(20_000, &mut mixer);
        assert!(mixer.delta_count(ChannelId::Mmc5Square1) > 0);
        assert!(mmc5.freq(0) > 0.0);
    }
}
