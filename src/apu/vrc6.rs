//! Konami VRC6: two pulses with 16-step duty and a sawtooth

use super::{ChannelOutput, ChipModel, Mixer};
use crate::constants::MASTER_CLOCK_NTSC;
use crate::types::{ChannelId, SoundChip};

/// VRC6 pulse channel
#[derive(Debug, Clone)]
pub struct Vrc6Pulse {
    output: ChannelOutput,
    duty: u8,
    volume: u8,
    gate: bool,
    enabled: bool,
    period: u16,
    counter: u32,
    duty_counter: u8,
    time: u32,
}

impl Vrc6Pulse {
    fn new(id: ChannelId) -> Self {
        Self {
            output: ChannelOutput::new(id),
            duty: 0,
            volume: 0,
            gate: false,
            enabled: false,
            period: 0,
            counter: 1,
            duty_counter: 15,
            time: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8) {
        match reg {
            0 => {
                self.gate = value & 0x80 != 0;
                self.duty = (value >> 4) & 0x07;
                self.volume = value & 0x0F;
            }
            1 => self.period = (self.period & 0xF00) | value as u16,
            2 => {
                self.period = (self.period & 0xFF) | (((value & 0x0F) as u16) << 8);
                self.enabled = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn level(&self) -> i32 {
        if self.enabled && (self.gate || self.duty_counter <= self.duty) {
            self.volume as i32
        } else {
            0
        }
    }

    fn process(&mut self, time: u32, halted: bool, mixer: &mut Mixer) {
        if !self.enabled || halted {
            let level = if self.enabled { self.level() } else { 0 };
            self.output.mix(mixer, level, self.time);
            self.time += time;
            return;
        }
        let mut remaining = time;
        while remaining > 0 {
            let step = remaining.min(self.counter);
            self.counter -= step;
            remaining -= step;
            self.time += step;
            if self.counter == 0 {
                self.counter = self.period as u32 + 1;
                self.duty_counter = self.duty_counter.wrapping_sub(1) & 0x0F;
                let level = self.level();
                self.output.mix(mixer, level, self.time);
            }
        }
    }

    fn frequency(&self) -> f64 {
        if !self.enabled || self.volume == 0 {
            return 0.0;
        }
        MASTER_CLOCK_NTSC as f64 / 16.0 / (self.period as f64 + 1.0)
    }
}

/// VRC6 sawtooth channel
#[derive(Debug, Clone)]
pub struct Vrc6Sawtooth {
    output: ChannelOutput,
    rate: u8,
    accumulator: u8,
    enabled: bool,
    period: u16,
    counter: u32,
    step: u8,
    time: u32,
}

impl Vrc6Sawtooth {
    fn new() -> Self {
        Self {
            output: ChannelOutput::new(ChannelId::Vrc6Sawtooth),
            rate: 0,
            accumulator: 0,
            enabled: false,
            period: 0,
            counter: 1,
            step: 0,
            time: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8) {
        match reg {
            0 => self.rate = value & 0x3F,
            1 => self.period = (self.period & 0xF00) | value as u16,
            2 => {
                self.period = (self.period & 0xFF) | (((value & 0x0F) as u16) << 8);
                self.enabled = value & 0x80 != 0;
                if !self.enabled {
                    self.accumulator = 0;
                    self.step = 0;
                }
            }
            _ => {}
        }
    }

    fn process(&mut self, time: u32, halted: bool, mixer: &mut Mixer) {
        if !self.enabled || halted {
            let level = (self.accumulator >> 3) as i32;
            self.output.mix(mixer, level, self.time);
            self.time += time;
            return;
        }
        let mut remaining = time;
        while remaining > 0 {
            let step = remaining.min(self.counter);
            self.counter -= step;
            remaining -= step;
            self.time += step;
            if self.counter == 0 {
                self.counter = self.period as u32 + 1;
                self.step += 1;
                if self.step >= 14 {
                    self.step = 0;
                    self.accumulator = 0;
                } else if self.step & 1 == 0 {
                    self.accumulator = self.accumulator.wrapping_add(self.rate);
                }
                let level = (self.accumulator >> 3) as i32;
                self.output.mix(mixer, level, self.time);
            }
        }
    }

    fn frequency(&self) -> f64 {
        if !self.enabled || self.rate == 0 {
            return 0.0;
        }
        MASTER_CLOCK_NTSC as f64 / 14.0 / (self.period as f64 + 1.0)
    }
}

/// The VRC6 sound unit
#[derive(Debug, Clone)]
pub struct Vrc6 {
    pulse1: Vrc6Pulse,
    pulse2: Vrc6Pulse,
    sawtooth: Vrc6Sawtooth,
    halted: bool,
}

impl Vrc6 {
    /// Power-on VRC6
    pub fn new() -> Self {
        Self {
            pulse1: Vrc6Pulse::new(ChannelId::Vrc6Pulse1),
            pulse2: Vrc6Pulse::new(ChannelId::Vrc6Pulse2),
            sawtooth: Vrc6Sawtooth::new(),
            halted: false,
        }
    }
}

impl Default for Vrc6 {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModel for Vrc6 {
    fn id(&self) -> SoundChip {
        SoundChip::Vrc6
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn maps(&self, address: u16) -> bool {
        matches!(address, 0x9000..=0x9003 | 0xA000..=0xA002 | 0xB000..=0xB002)
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x9003 => self.halted = value & 0x01 != 0,
            0x9000..=0x9002 => self.pulse1.write(address & 0x03, value),
            0xA000..=0xA002 => self.pulse2.write(address & 0x03, value),
            0xB000..=0xB002 => self.sawtooth.write(address & 0x03, value),
            _ => {}
        }
    }

    fn read(&mut self, _address: u16) -> Option<u8> {
        None
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if time == 0 {
            return;
        }
        self.pulse1.process(time, self.halted, mixer);
        self.pulse2.process(time, self.halted, mixer);
        self.sawtooth.process(time, self.halted, mixer);
    }

    fn end_frame(&mut self) {
        self.pulse1.time = 0;
        self.pulse2.time = 0;
        self.sawtooth.time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        match channel {
            0 => self.pulse1.frequency(),
            1 => self.pulse2.frequency(),
            2 => self.sawtooth.frequency(),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_duty_produces_edges() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut vrc6 = Vrc6::new();
        vrc6.write(0x9000, 0x7F);
        vrc6.write(0x9001, 0xFF);
        vrc6.write(0x9002, 0x80);
        vrc6.process(256 * 16, &mut mixer);
        assert_eq!(mixer.delta_count(ChannelId::Vrc6Pulse1), 2);
    }

    #[test]
    fn test_gate_holds_constant_level() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut vrc6 = Vrc6::new();
        vrc6.write(0xA000, 0x8A);
        vrc6.write(0xA002, 0x80);
        vrc6.process(10_000, &mut mixer);
        assert_eq!(mixer.delta_count(ChannelId::Vrc6Pulse2), 1);
        assert_eq!(mixer.channel_level(ChannelId::Vrc6Pulse2), 10);
    }

    #[test]
    fn test_sawtooth_peaks_and_resets() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut vrc6 = Vrc6::new();
        vrc6.write(0xB000, 0x2A);
        vrc6.write(0xB001, 0x00);
        vrc6.write(0xB002, 0x80);
        vrc6.process(13, &mut mixer);
        assert_eq!(mixer.channel_level(ChannelId::Vrc6Sawtooth), (0x2A * 6) >> 3);
        vrc6.process(1, &mut mixer);
        assert_eq!(mixer.channel_level(ChannelId::Vrc6Sawtooth), 0);
    }

    #[test]
    fn test_frequency_zero_when_disabled() {
        let vrc6 = Vrc6::new();
        assert_eq!(vrc6.freq(0), 0.0);
        assert_eq!(vrc6.freq(7), 0.0);
    }
}
