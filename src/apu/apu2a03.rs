//! Internal 2A03/2A07 APU
//!
//! Two pulses, triangle, noise and DPCM, clocked by the frame sequencer.
//! DPCM samples are fetched from a private copy of the $C000-$FFFF window
//! loaded with [`Apu2A03::load_sample_memory`].

use super::square::{Envelope, Square, SweepMode, LENGTH_TABLE};
use super::{ChannelOutput, ChipModel, Mixer};
use crate::constants::{DPCM_BASE_ADDRESS, DPCM_MEMORY_SIZE};
use crate::types::{ChannelId, Machine, SoundChip};

const NOISE_PERIODS_NTSC: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];
const NOISE_PERIODS_PAL: [u16; 16] = [
    4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
];
const DPCM_PERIODS_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];
const DPCM_PERIODS_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15,
];

/// CPU cycles between frame sequencer steps
const FRAME_STEP_NTSC: u32 = 7457;
const FRAME_STEP_PAL: u32 = 8313;

/// Triangle channel
#[derive(Debug, Clone)]
pub struct Triangle {
    output: ChannelOutput,
    enabled: bool,
    period: u16,
    counter: u32,
    step: u8,
    length: u8,
    control: bool,
    linear_load: u8,
    linear: u8,
    linear_reload: bool,
    time: u32,
}

impl Triangle {
    fn new() -> Self {
        Self {
            output: ChannelOutput::new(ChannelId::Triangle),
            enabled: false,
            period: 0,
            counter: 1,
            step: 0,
            length: 0,
            control: false,
            linear_load: 0,
            linear: 0,
            linear_reload: false,
            time: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8) {
        match reg & 0x03 {
            0 => {
                self.control = value & 0x80 != 0;
                self.linear_load = value & 0x7F;
            }
            2 => self.period = (self.period & 0x700) | value as u16,
            3 => {
                self.period = (self.period & 0xFF) | (((value & 0x07) as u16) << 8);
                if self.enabled {
                    self.length = LENGTH_TABLE[(value >> 3) as usize];
                }
                self.linear_reload = true;
            }
            _ => {}
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    fn is_running(&self) -> bool {
        self.length > 0 && self.linear > 0 && self.period >= 2
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        // A halted triangle holds its current step
        if !self.is_running() {
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
                self.step = (self.step + 1) & 0x1F;
                let level = TRIANGLE_SEQUENCE[self.step as usize] as i32;
                self.output.mix(mixer, level, self.time);
            }
        }
    }

    fn clock_linear(&mut self) {
        if self.linear_reload {
            self.linear = self.linear_load;
        } else if self.linear > 0 {
            self.linear -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    fn clock_length(&mut self) {
        if !self.control && self.length > 0 {
            self.length -= 1;
        }
    }

    fn frequency(&self, clock: u32) -> f64 {
        if !self.is_running() {
            return 0.0;
        }
        clock as f64 / 32.0 / (self.period as f64 + 1.0)
    }
}

/// Noise channel
#[derive(Debug, Clone)]
pub struct Noise {
    output: ChannelOutput,
    periods: &'static [u16; 16],
    enabled: bool,
    period: u16,
    counter: u32,
    short_mode: bool,
    shift: u16,
    length: u8,
    envelope: Envelope,
    time: u32,
}

impl Noise {
    fn new(machine: Machine) -> Self {
        let periods = match machine {
            Machine::Ntsc => &NOISE_PERIODS_NTSC,
            Machine::Pal => &NOISE_PERIODS_PAL,
        };
        Self {
            output: ChannelOutput::new(ChannelId::Noise),
            periods,
            enabled: false,
            period: periods[0],
            counter: 1,
            short_mode: false,
            shift: 1,
            length: 0,
            envelope: Envelope::default(),
            time: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8) {
        match reg & 0x03 {
            0 => self.envelope.write(value),
            2 => {
                self.short_mode = value & 0x80 != 0;
                self.period = self.periods[(value & 0x0F) as usize];
            }
            3 => {
                if self.enabled {
                    self.length = LENGTH_TABLE[(value >> 3) as usize];
                }
                self.envelope.restart();
            }
            _ => {}
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if self.length == 0 {
            self.output.mix(mixer, 0, self.time);
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
                self.counter = self.period as u32;
                let tap = if self.short_mode { 6 } else { 1 };
                let feedback = (self.shift ^ (self.shift >> tap)) & 1;
                self.shift = (self.shift >> 1) | (feedback << 14);
                let level = if self.shift & 1 == 0 {
                    self.envelope.output() as i32
                } else {
                    0
                };
                self.output.mix(mixer, level, self.time);
            }
        }
    }

    fn clock_length(&mut self) {
        if !self.envelope.looping && self.length > 0 {
            self.length -= 1;
        }
    }
}

/// Delta modulation channel
#[derive(Debug, Clone)]
pub struct Dpcm {
    output: ChannelOutput,
    machine: Machine,
    periods: &'static [u16; 16],
    memory: Box<[u8; DPCM_MEMORY_SIZE]>,
    looping: bool,
    period: u16,
    counter: u32,
    dac: u8,
    start_address: u16,
    start_length: u16,
    address: u16,
    bytes_remaining: u16,
    buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    silence: bool,
    time: u32,
}

impl Dpcm {
    fn new(machine: Machine) -> Self {
        let periods = match machine {
            Machine::Ntsc => &DPCM_PERIODS_NTSC,
            Machine::Pal => &DPCM_PERIODS_PAL,
        };
        Self {
            output: ChannelOutput::new(ChannelId::Dpcm),
            machine,
            periods,
            memory: Box::new([0; DPCM_MEMORY_SIZE]),
            looping: false,
            period: periods[0],
            counter: periods[0] as u32,
            dac: 0,
            start_address: DPCM_BASE_ADDRESS,
            start_length: 1,
            address: DPCM_BASE_ADDRESS,
            bytes_remaining: 0,
            buffer: None,
            shift: 0,
            bits_remaining: 8,
            silence: true,
            time: 0,
        }
    }

    fn reset(&mut self) {
        let memory = std::mem::replace(&mut self.memory, Box::new([0; DPCM_MEMORY_SIZE]));
        *self = Self::new(self.machine);
        self.memory = memory;
    }

    fn write(&mut self, reg: u16, value: u8) {
        match reg & 0x03 {
            0 => {
                self.looping = value & 0x40 != 0;
                self.period = self.periods[(value & 0x0F) as usize];
            }
            1 => self.dac = value & 0x7F,
            2 => self.start_address = DPCM_BASE_ADDRESS | ((value as u16) << 6),
            _ => self.start_length = ((value as u16) << 4) + 1,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.address = self.start_address;
        self.bytes_remaining = self.start_length;
    }

    fn is_active(&self) -> bool {
        self.bytes_remaining > 0
    }

    fn fetch(&mut self) {
        if self.buffer.is_some() || self.bytes_remaining == 0 {
            return;
        }
        let byte = if self.address >= DPCM_BASE_ADDRESS {
            self.memory[(self.address - DPCM_BASE_ADDRESS) as usize]
        } else {
            0
        };
        self.buffer = Some(byte);
        self.address = if self.address == 0xFFFF {
            0x8000
        } else {
            self.address + 1
        };
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 && self.looping {
            self.restart();
        }
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if self.silence && self.bytes_remaining == 0 && self.buffer.is_none() {
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
                self.counter = self.period as u32;
                self.clock_output(mixer);
            }
        }
    }

    fn clock_output(&mut self, mixer: &mut Mixer) {
        if !self.silence {
            if self.shift & 1 != 0 {
                if self.dac <= 125 {
                    self.dac += 2;
                }
            } else if self.dac >= 2 {
                self.dac -= 2;
            }
            self.output.mix(mixer, self.dac as i32, self.time);
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            self.fetch();
            match self.buffer.take() {
                Some(byte) => {
                    self.shift = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    fn frequency(&self, clock: u32) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        clock as f64 / self.period as f64
    }
}

/// The 2A03 sound unit
#[derive(Debug, Clone)]
pub struct Apu2A03 {
    machine: Machine,
    square1: Square,
    square2: Square,
    triangle: Triangle,
    noise: Noise,
    dpcm: Dpcm,
    five_step: bool,
    sequence_step: u8,
    frame_counter: u32,
    time: u32,
}

impl Apu2A03 {
    /// Power-on APU for a region
    pub fn new(machine: Machine) -> Self {
        Self {
            machine,
            square1: Square::new(ChannelId::Square1, SweepMode::OnesComplement),
            square2: Square::new(ChannelId::Square2, SweepMode::TwosComplement),
            triangle: Triangle::new(),
            noise: Noise::new(machine),
            dpcm: Dpcm::new(machine),
            five_step: false,
            sequence_step: 0,
            frame_counter: Self::frame_step(machine),
            time: 0,
        }
    }

    fn frame_step(machine: Machine) -> u32 {
        match machine {
            Machine::Ntsc => FRAME_STEP_NTSC,
            Machine::Pal => FRAME_STEP_PAL,
        }
    }

    /// Copy sample data into the DPCM window starting at `address`
    ///
    /// Bytes falling outside $C000-$FFFF are dropped.
    pub fn load_sample_memory(&mut self, address: u16, data: &[u8]) {
        let start = address.saturating_sub(DPCM_BASE_ADDRESS) as usize;
        let end = (start + data.len()).min(DPCM_MEMORY_SIZE);
        if start < end {
            self.dpcm.memory[start..end].copy_from_slice(&data[..end - start]);
        }
    }

    /// Current DPCM DAC level
    #[inline]
    pub fn dpcm_level(&self) -> u8 {
        self.dpcm.dac
    }

    fn clock_quarter(&mut self) {
        self.square1.clock_envelope();
        self.square2.clock_envelope();
        self.noise.envelope.clock();
        self.triangle.clock_linear();
    }

    fn clock_half(&mut self) {
        self.square1.clock_length();
        self.square2.clock_length();
        self.triangle.clock_length();
        self.noise.clock_length();
    }

    fn clock_sequence(&mut self) {
        let steps = if self.five_step { 5 } else { 4 };
        let step = self.sequence_step;
        self.sequence_step = (self.sequence_step + 1) % steps;
        if self.five_step {
            if step != 3 {
                self.clock_quarter();
            }
            if step == 1 || step == 4 {
                self.clock_half();
            }
        } else {
            self.clock_quarter();
            if step == 1 || step == 3 {
                self.clock_half();
            }
        }
    }

    fn run_channels(&mut self, time: u32, mixer: &mut Mixer) {
        self.square1.process(time, mixer);
        self.square2.process(time, mixer);
        self.triangle.process(time, mixer);
        self.noise.process(time, mixer);
        self.dpcm.process(time, mixer);
    }
}

impl ChipModel for Apu2A03 {
    fn id(&self) -> SoundChip {
        SoundChip::Apu
    }

    fn reset(&mut self) {
        self.square1.reset();
        self.square2.reset();
        self.triangle = Triangle::new();
        self.noise = Noise::new(self.machine);
        self.dpcm.reset();
        self.five_step = false;
        self.sequence_step = 0;
        self.frame_counter = Self::frame_step(self.machine);
        self.time = 0;
    }

    fn maps(&self, address: u16) -> bool {
        matches!(address, 0x4000..=0x4013 | 0x4015 | 0x4017)
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x4000..=0x4003 => self.square1.write(address, value),
            0x4004..=0x4007 => self.square2.write(address, value),
            0x4008..=0x400B => self.triangle.write(address, value),
            0x400C..=0x400F => self.noise.write(address, value),
            0x4010..=0x4013 => self.dpcm.write(address, value),
            0x4015 => {
                self.square1.set_enabled(value & 0x01 != 0);
                self.square2.set_enabled(value & 0x02 != 0);
                self.triangle.set_enabled(value & 0x04 != 0);
                self.noise.set_enabled(value & 0x08 != 0);
                self.dpcm.set_enabled(value & 0x10 != 0);
            }
            0x4017 => {
                self.five_step = value & 0x80 != 0;
                self.sequence_step = 0;
                self.frame_counter = Self::frame_step(self.machine);
                if self.five_step {
                    self.clock_quarter();
                    self.clock_half();
                }
            }
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        if address != 0x4015 {
            return None;
        }
        let mut status = 0;
        if self.square1.is_active() {
            status |= 0x01;
        }
        if self.square2.is_active() {
            status |= 0x02;
        }
        if self.triangle.length > 0 {
            status |= 0x04;
        }
        if self.noise.length > 0 {
            status |= 0x08;
        }
        if self.dpcm.is_active() {
            status |= 0x10;
        }
        Some(status)
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if time == 0 {
            return;
        }
        // A pending $4011 load is heard from the current position
        let dac = self.dpcm.dac as i32;
        self.dpcm.output.mix(mixer, dac, self.time);

        let mut remaining = time;
        while remaining > 0 {
            let step = remaining.min(self.frame_counter);
            self.run_channels(step, mixer);
            self.frame_counter -= step;
            remaining -= step;
            self.time += step;
            if self.frame_counter == 0 {
                self.frame_counter = Self::frame_step(self.machine);
                self.clock_sequence();
            }
        }
    }

    fn end_frame(&mut self) {
        self.square1.end_frame();
        self.square2.end_frame();
        self.triangle.time = 0;
        self.noise.time = 0;
        self.dpcm.time = 0;
        self.time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        let clock = self.machine.master_clock();
        match channel {
            0 => self.square1.frequency(clock),
            1 => self.square2.frequency(clock),
            2 => self.triangle.frequency(clock),
            3 => {
                if self.noise.length == 0 {
                    0.0
                } else {
                    clock as f64 / self.noise.period as f64
                }
            }
            4 => self.dpcm.frequency(clock),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer() -> Mixer {
        Mixer::new(1_789_773, 44_100)
    }

    #[test]
    fn test_status_reflects_length_counters() {
        let mut apu = Apu2A03::new(Machine::Ntsc);
        apu.write(0x4015, 0x05);
        apu.write(0x4003, 0x08);
        apu.write(0x400B, 0x08);
        assert_eq!(apu.read(0x4015), Some(0x05));
        assert_eq!(apu.read(0x4016), None);
    }

    #[test]
    fn test_triangle_steps_after_linear_load() {
        let mut mixer = mixer();
        let mut apu = Apu2A03::new(Machine::Ntsc);
        apu.write(0x4015, 0x04);
        apu.write(0x4008, 0x81);
        apu.write(0x400A, 0x40);
        apu.write(0x400B, 0x00);
        apu.process(FRAME_STEP_NTSC + 65 * 4, &mut mixer);
        assert!(mixer.delta_count(ChannelId::Triangle) > 0);
        assert!(apu.freq(2) > 0.0);
    }

    #[test]
    fn test_direct_load_moves_dac() {
        let mut mixer = mixer();
        let mut apu = Apu2A03::new(Machine::Ntsc);
        apu.write(0x4011, 0x40);
        apu.process(0, &mut mixer);
        assert_eq!(mixer.channel_level(ChannelId::Dpcm), 0);
        apu.process(1, &mut mixer);
        assert_eq!(mixer.channel_level(ChannelId::Dpcm), 0x40);
    }

    #[test]
    fn test_dpcm_plays_from_sample_memory() {
        let mut mixer = mixer();
        let mut apu = Apu2A03::new(Machine::Ntsc);
        apu.load_sample_memory(0xC000, &[0xFF; 16]);
        apu.write(0x4011, 0x20);
        apu.write(0x4010, 0x0F);
        apu.write(0x4012, 0x00);
        apu.write(0x4013, 0x01);
        apu.write(0x4015, 0x10);
        apu.process(54 * 8 * 10, &mut mixer);
        assert!(apu.dpcm_level() > 0x20);
    }

    #[test]
    fn test_noise_silent_without_length() {
        let mut mixer = mixer();
        let mut apu = Apu2A03::new(Machine::Ntsc);
        apu.write(0x400C, 0x3F);
        apu.write(0x400E, 0x00);
        apu.process(10_000, &mut mixer);
        assert_eq!(mixer.delta_count(ChannelId::Noise), 0);
    }
}
