//! Sunsoft 5B (YM2149 derivative)
//!
//! Three square tone generators share one noise generator and one envelope
//! unit. Tone counters advance every 8 CPU cycles and noise/envelope every
//! 16, so a tone period `p` plays at `clock / (16 * p)` Hz. Registers are
//! reached through an address latch at $C000 and a data port at $E000.

use super::{ChannelOutput, ChipModel, Mixer};
use crate::constants::MASTER_CLOCK_NTSC;
use crate::types::{ChannelId, SoundChip};

const PRESCALER: u32 = 8;

/// Logarithmic DAC curve, 1.5 dB per step over 32 steps
fn volume_table() -> [i32; 32] {
    let mut table = [0; 32];
    for (i, level) in table.iter_mut().enumerate().skip(1) {
        *level = (255.0 * 10f64.powf(-((31 - i) as f64) * 1.5 / 20.0)).round() as i32;
    }
    table
}

/// One tone generator
#[derive(Debug, Clone)]
pub struct S5bChannel {
    output: ChannelOutput,
    volume: u8,
    period: u32,
    period_clock: u32,
    square_high: bool,
    square_disable: bool,
    noise_disable: bool,
}

impl S5bChannel {
    fn new(id: ChannelId) -> Self {
        Self {
            output: ChannelOutput::new(id),
            volume: 0,
            period: 0,
            period_clock: 0,
            square_high: false,
            square_disable: true,
            noise_disable: true,
        }
    }

    /// Advance the tone counter by one 8-cycle tick
    fn tick(&mut self) {
        self.period_clock += 1;
        if self.period_clock >= self.period.max(1) {
            self.period_clock = 0;
            self.square_high = !self.square_high;
        }
    }

    fn level(&self, noise: bool, envelope: u8, table: &[i32; 32]) -> i32 {
        let gate = (self.square_high || self.square_disable) && (noise || self.noise_disable);
        if !gate {
            return 0;
        }
        let index = if self.volume & 0x10 != 0 {
            envelope as usize
        } else if self.volume & 0x0F == 0 {
            0
        } else {
            ((self.volume & 0x0F) as usize) * 2 + 1
        };
        table[index.min(31)]
    }

    fn frequency(&self) -> f64 {
        if self.square_disable || self.volume == 0 {
            return 0.0;
        }
        MASTER_CLOCK_NTSC as f64 / (2.0 * PRESCALER as f64 * self.period.max(1) as f64)
    }
}

/// The Sunsoft 5B sound unit
#[derive(Debug, Clone)]
pub struct S5b {
    channels: [S5bChannel; 3],
    registers: [u8; 16],
    port: u8,
    counter: u32,
    odd_tick: bool,
    noise_period: u32,
    noise_clock: u32,
    noise_state: u32,
    envelope_period: u32,
    envelope_clock: u32,
    envelope_level: u8,
    envelope_shape: u8,
    envelope_hold: bool,
    volume_table: [i32; 32],
    time: u32,
}

impl S5b {
    /// Power-on 5B
    pub fn new() -> Self {
        Self {
            channels: [
                S5bChannel::new(ChannelId::S5bCh1),
                S5bChannel::new(ChannelId::S5bCh2),
                S5bChannel::new(ChannelId::S5bCh3),
            ],
            registers: [0; 16],
            port: 0,
            counter: 0,
            odd_tick: false,
            noise_period: 0,
            noise_clock: 0,
            noise_state: 0x1FFFF,
            envelope_period: 0,
            envelope_clock: 0,
            envelope_level: 0,
            envelope_shape: 0,
            envelope_hold: true,
            volume_table: volume_table(),
            time: 0,
        }
    }

    /// Apply a write to internal register `port`
    pub fn write_reg(&mut self, port: u8, value: u8) {
        let port = port & 0x0F;
        self.registers[port as usize] = value;
        match port {
            0x00..=0x05 => {
                let ch = &mut self.channels[(port >> 1) as usize];
                let fine = self.registers[(port & 0x0E) as usize] as u32;
                let coarse = (self.registers[(port | 0x01) as usize] & 0x0F) as u32;
                ch.period = fine | (coarse << 8);
            }
            0x06 => self.noise_period = (value & 0x1F) as u32,
            0x07 => {
                for (i, ch) in self.channels.iter_mut().enumerate() {
                    ch.square_disable = value & (1 << i) != 0;
                    ch.noise_disable = value & (1 << (i + 3)) != 0;
                }
            }
            0x08..=0x0A => self.channels[(port - 0x08) as usize].volume = value & 0x1F,
            0x0B | 0x0C => {
                self.envelope_period =
                    self.registers[0x0B] as u32 | ((self.registers[0x0C] as u32) << 8);
            }
            0x0D => {
                self.envelope_shape = value & 0x0F;
                self.envelope_hold = false;
                self.envelope_clock = 0;
                self.envelope_level = if value & 0x04 != 0 { 0 } else { 31 };
            }
            _ => {}
        }
    }

    /// Step the envelope unit by `ticks` 16-cycle clocks
    pub fn run_envelope(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.envelope_clock += 1;
            if self.envelope_clock < self.envelope_period.max(1) {
                continue;
            }
            self.envelope_clock = 0;
            if self.envelope_hold {
                continue;
            }
            let attack = self.envelope_shape & 0x04 != 0;
            let at_end = if attack {
                self.envelope_level == 31
            } else {
                self.envelope_level == 0
            };
            if !at_end {
                if attack {
                    self.envelope_level += 1;
                } else {
                    self.envelope_level -= 1;
                }
                continue;
            }
            let cont = self.envelope_shape & 0x08 != 0;
            let alternate = self.envelope_shape & 0x02 != 0;
            let hold = self.envelope_shape & 0x01 != 0;
            if !cont {
                self.envelope_level = 0;
                self.envelope_hold = true;
            } else if hold {
                if alternate {
                    self.envelope_level = 31 - self.envelope_level;
                }
                self.envelope_hold = true;
            } else if alternate {
                self.envelope_shape ^= 0x04;
            } else {
                self.envelope_level = if attack { 0 } else { 31 };
            }
        }
    }

    /// Step the noise generator by `ticks` 16-cycle clocks
    pub fn run_noise(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.noise_clock += 1;
            if self.noise_clock >= self.noise_period.max(1) {
                self.noise_clock = 0;
                let feedback = (self.noise_state ^ (self.noise_state >> 3)) & 1;
                self.noise_state = (self.noise_state >> 1) | (feedback << 16);
            }
        }
    }

    /// Current envelope level (0-31)
    #[inline]
    pub fn envelope_level(&self) -> u8 {
        self.envelope_level
    }

    fn output(&mut self, mixer: &mut Mixer) {
        let noise = self.noise_state & 1 != 0;
        for ch in &mut self.channels {
            let level = ch.level(noise, self.envelope_level, &self.volume_table);
            ch.output.mix(mixer, level, self.time);
        }
    }
}

impl Default for S5b {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModel for S5b {
    fn id(&self) -> SoundChip {
        SoundChip::S5b
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn maps(&self, address: u16) -> bool {
        matches!(address, 0xC000 | 0xE000)
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0xC000 => self.port = value & 0x0F,
            0xE000 => self.write_reg(self.port, value),
            _ => {}
        }
    }

    fn read(&mut self, _address: u16) -> Option<u8> {
        None
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        let mut remaining = time;
        while remaining > 0 {
            let step = remaining.min(PRESCALER - self.counter);
            self.counter += step;
            remaining -= step;
            self.time += step;
            if self.counter == PRESCALER {
                self.counter = 0;
                for ch in &mut self.channels {
                    ch.tick();
                }
                self.odd_tick = !self.odd_tick;
                if !self.odd_tick {
                    self.run_noise(1);
                    self.run_envelope(1);
                }
                self.output(mixer);
            }
        }
    }

    fn end_frame(&mut self) {
        self.time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        self.channels.get(channel).map_or(0.0, S5bChannel::frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(chip: &mut S5b, port: u8, value: u8) {
        chip.write(0xC000, port);
        chip.write(0xE000, value);
    }

    #[test]
    fn test_tone_through_latch() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut chip = S5b::new();
        write(&mut chip, 0x00, 0x20);
        write(&mut chip, 0x07, 0x3E);
        write(&mut chip, 0x08, 0x0F);
        chip.process(8 * 0x20 * 4, &mut mixer);
        assert_eq!(mixer.delta_count(ChannelId::S5bCh1), 4);
        approx::assert_relative_eq!(
            chip.freq(0),
            MASTER_CLOCK_NTSC as f64 / (16.0 * 32.0)
        );
    }

    #[test]
    fn test_silent_at_power_on() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut chip = S5b::new();
        chip.process(100_000, &mut mixer);
        assert_eq!(mixer.total_delta_count(), 0);
    }

    #[test]
    fn test_envelope_decay_holds_at_zero() {
        let mut chip = S5b::new();
        write(&mut chip, 0x0B, 0x01);
        write(&mut chip, 0x0D, 0x00);
        assert_eq!(chip.envelope_level(), 31);
        chip.run_envelope(40);
        assert_eq!(chip.envelope_level(), 0);
        chip.run_envelope(40);
        assert_eq!(chip.envelope_level(), 0);
    }

    #[test]
    fn test_envelope_triangle_alternates() {
        let mut chip = S5b::new();
        write(&mut chip, 0x0B, 0x01);
        write(&mut chip, 0x0D, 0x0E);
        chip.run_envelope(31);
        assert_eq!(chip.envelope_level(), 31);
        chip.run_envelope(32);
        assert_eq!(chip.envelope_level(), 0);
    }

    #[test]
    fn test_noise_changes_state() {
        let mut chip = S5b::new();
        write(&mut chip, 0x06, 0x01);
        let before = chip.noise_state;
        chip.run_noise(8);
        assert_ne!(chip.noise_state, before);
    }
}
