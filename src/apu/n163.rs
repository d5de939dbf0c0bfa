//! Namco 163 wavetable chip
//!
//! Up to eight 4-bit wavetable voices share one DAC. The chip updates one
//! voice every 15 CPU cycles and cycles through the voices in use, so only
//! the voice owning the current slot is heard; the DAC returns to zero at
//! every slot boundary. The legacy mixer runs every voice continuously
//! instead.
//!
//! Registers live in 128 bytes of internal RAM. The voice using the block
//! at `0x40 + 8 * i` is logical channel `7 - i`: channel 1 sits at `0x78`
//! and voices are enabled downwards from there.

use super::{ChannelOutput, ChipModel, Mixer, RegisterSink};
use crate::constants::{MASTER_CLOCK_NTSC, MAX_CHANNELS_N163};
use crate::types::{ChannelId, SoundChip};

/// CPU cycles per voice slot
pub const CHANNEL_PERIOD: u32 = 15;

const RAM_SIZE: usize = 0x80;

/// Channel tag for the register block at `0x40 + 8 * block`
fn block_channel(block: usize) -> ChannelId {
    ChannelId::from_index(ChannelId::N163Ch1.index() + MAX_CHANNELS_N163 - 1 - block)
        .unwrap_or(ChannelId::N163Ch1)
}

/// One wavetable voice
#[derive(Debug, Clone)]
struct N163Voice {
    output: ChannelOutput,
    counter: u32,
    wave_offset: u8,
    wave_length: u32,
    volume: u8,
    last_sample: i32,
    phase: u32,
    frequency: u32,
    time: u32,
}

impl N163Voice {
    fn new(id: ChannelId) -> Self {
        Self {
            output: ChannelOutput::new(id),
            counter: 0,
            wave_offset: 0,
            wave_length: 0x0100_0000,
            volume: 0,
            last_sample: 0,
            phase: 0,
            frequency: 0,
            time: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.output.id());
    }

    fn write(&mut self, reg: usize, value: u8) {
        let value32 = value as u32;
        match reg {
            0 => self.frequency = (self.frequency & 0xFFFF00) | value32,
            1 => self.phase = (self.phase & 0xFFFF00) | value32,
            2 => self.frequency = (self.frequency & 0xFF00FF) | (value32 << 8),
            3 => self.phase = (self.phase & 0xFF00FF) | (value32 << 8),
            4 => {
                self.frequency = (self.frequency & 0x00FFFF) | ((value32 & 0x03) << 16);
                self.wave_length = (256 - (value32 & 0xFC)) << 16;
            }
            5 => self.phase = (self.phase & 0x00FFFF) | (value32 << 16),
            6 => self.wave_offset = value,
            _ => self.volume = value & 0x0F,
        }
    }

    fn read_mem(&self, reg: usize) -> u8 {
        match reg & 7 {
            0 => (self.frequency & 0xFF) as u8,
            1 => (self.phase & 0xFF) as u8,
            2 => ((self.frequency >> 8) & 0xFF) as u8,
            3 => ((self.phase >> 8) & 0xFF) as u8,
            4 => (((self.frequency >> 16) & 0x03) | (256 - (self.wave_length >> 16))) as u8,
            5 => ((self.phase >> 16) & 0xFF) as u8,
            6 => self.wave_offset,
            _ => self.volume,
        }
    }

    fn is_silent(&self) -> bool {
        self.frequency == 0 || self.wave_length == 0
    }

    /// Step the phase and fetch the next 4-bit sample
    fn clock(&mut self, wave: &[u8; RAM_SIZE]) -> i32 {
        self.phase = (self.phase + self.frequency) % self.wave_length;
        let pointer = (self.phase >> 16) as usize;
        let mut sample = wave[((pointer + self.wave_offset as usize) & 0xFF) >> 1];
        if pointer & 1 != 0 {
            sample >>= 4;
        }
        (sample & 0x0F) as i32 * self.volume as i32
    }

    fn frequency_hz(&self) -> f64 {
        MASTER_CLOCK_NTSC as f64 / 983_040.0 * self.frequency as f64
            / (self.wave_length >> 16) as f64
    }
}

/// The Namco 163 sound unit
#[derive(Debug, Clone)]
pub struct N163 {
    voices: [N163Voice; MAX_CHANNELS_N163],
    wave: Box<[u8; RAM_SIZE]>,
    expand_addr: u8,
    channels_in_use: u8,
    legacy_mixing: bool,
    last_value: i32,
    global_time: u32,
    channel_counter: u32,
    active_slot: usize,
    last_slot: usize,
    slot_cycles: [u64; MAX_CHANNELS_N163],
}

impl N163 {
    /// Power-on N163
    pub fn new() -> Self {
        Self {
            voices: std::array::from_fn(|block| N163Voice::new(block_channel(block))),
            wave: Box::new([0; RAM_SIZE]),
            expand_addr: 0,
            channels_in_use: 0,
            legacy_mixing: false,
            last_value: 0,
            global_time: 0,
            channel_counter: 0,
            active_slot: MAX_CHANNELS_N163 - 1,
            last_slot: MAX_CHANNELS_N163 - 1,
            slot_cycles: [0; MAX_CHANNELS_N163],
        }
    }

    /// Select the legacy mixer; all voice counters restart
    ///
    /// Levels left by the previous mixer are returned to zero first.
    pub fn set_mixing_method(&mut self, legacy: bool, mixer: &mut Mixer) {
        for voice in &mut self.voices {
            let time = voice.time;
            voice.output.mix(mixer, 0, time);
            voice.reset();
            voice.time = time;
        }
        let last_id = self.voices[self.last_slot].output.id();
        self.mix(mixer, 0, 0, last_id);
        self.legacy_mixing = legacy;
    }

    /// Whether the legacy mixer is selected
    #[inline]
    pub fn legacy_mixing(&self) -> bool {
        self.legacy_mixing
    }

    /// Number of enabled voices minus one (register $7F bits 4-6)
    #[inline]
    pub fn channels_in_use(&self) -> u8 {
        self.channels_in_use
    }

    /// Register block currently owning the DAC
    #[inline]
    pub fn active_slot(&self) -> usize {
        self.active_slot
    }

    /// Cycles a register block has owned the DAC since reset
    pub fn slot_cycles(&self, block: usize) -> u64 {
        self.slot_cycles.get(block).copied().unwrap_or(0)
    }

    /// Internal RAM byte as seen by the CPU, with voice state folded in
    pub fn read_mem(&self, reg: u8) -> u8 {
        let reg = (reg & 0x7F) as usize;
        let chan_area = 0x80 - ((self.channels_in_use as usize + 1) << 3);
        let block = (reg & 0x3F) >> 3;
        if reg < chan_area {
            return self.wave[reg];
        }
        if reg & 7 == 7 {
            return self.voices[block].read_mem(reg) | (self.wave[reg] & 0xF0);
        }
        self.voices[block].read_mem(reg)
    }

    fn namco_volume(&self) -> f32 {
        let in_use = self.channels_in_use as f32;
        match (self.legacy_mixing, self.channels_in_use) {
            (false, 0) => 1.3,
            (false, _) => 1.5 + (in_use - 1.0) / 1.5,
            (true, 0) => 1.0,
            (true, _) => 0.75,
        }
    }

    fn mix(&mut self, mixer: &mut Mixer, value: i32, time: u32, channel: ChannelId) {
        if value != self.last_value {
            mixer.add_value(channel, value - self.last_value, time + self.global_time);
            self.last_value = value;
        }
    }

    /// Run the voice in `block` for one slot visit
    fn process_slot(&mut self, block: usize, time: u32, mixer: &mut Mixer) {
        let id = self.voices[block].output.id();
        let mut stamp = 0;
        let last = self.voices[block].last_sample;
        self.mix(mixer, last, stamp, id);

        if self.voices[block].is_silent() {
            let voice = &mut self.voices[block];
            voice.last_sample = 0;
            voice.time += time;
            return;
        }

        let mut remaining = time;
        while remaining >= self.voices[block].counter {
            let voice = &mut self.voices[block];
            remaining -= voice.counter;
            voice.time += voice.counter;
            stamp += voice.counter;
            voice.counter = CHANNEL_PERIOD;
            let sample = voice.clock(&self.wave);
            voice.last_sample = sample;
            self.mix(mixer, sample, stamp, id);
        }
        let voice = &mut self.voices[block];
        voice.counter -= remaining;
        voice.time += remaining;
    }

    fn process_multiplexed(&mut self, time: u32, mixer: &mut Mixer) {
        let in_use = self.channels_in_use as usize;
        let mut time = time;
        while time > 0 {
            let run = time.min(CHANNEL_PERIOD - self.channel_counter);

            let last_id = self.voices[self.last_slot].output.id();
            self.mix(mixer, 0, 0, last_id);
            self.process_slot(self.active_slot, run, mixer);
            self.slot_cycles[self.active_slot] += run as u64;
            self.last_slot = self.active_slot;

            time -= run;
            self.global_time += run;
            self.channel_counter += run;

            if self.channel_counter >= CHANNEL_PERIOD {
                if self.active_slot + in_use < MAX_CHANNELS_N163 {
                    self.active_slot = MAX_CHANNELS_N163;
                }
                self.active_slot -= 1;
                self.channel_counter -= CHANNEL_PERIOD;
            }
        }
    }

    fn process_legacy(&mut self, time: u32, mixer: &mut Mixer) {
        let period = CHANNEL_PERIOD * (self.channels_in_use as u32 + 1);
        let first = MAX_CHANNELS_N163 - 1 - self.channels_in_use as usize;
        for block in first..MAX_CHANNELS_N163 {
            let voice = &mut self.voices[block];
            if voice.is_silent() {
                voice.time += time;
                continue;
            }
            let mut remaining = time;
            while remaining >= voice.counter {
                remaining -= voice.counter;
                voice.time += voice.counter;
                voice.counter = period;
                let sample = voice.clock(&self.wave);
                voice.output.mix(mixer, sample, voice.time);
            }
            voice.counter -= remaining;
            voice.time += remaining;
        }
    }
}

impl Default for N163 {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModel for N163 {
    fn id(&self) -> SoundChip {
        SoundChip::N163
    }

    fn reset(&mut self) {
        let legacy = self.legacy_mixing;
        *self = Self::new();
        self.legacy_mixing = legacy;
    }

    fn maps(&self, address: u16) -> bool {
        matches!(address, 0x4800 | 0xF800)
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x4800 => {
                let area = (self.expand_addr & 0x7F) as usize;
                self.wave[area] = value;
                if area >= 0x40 {
                    let block = (area & 0x3F) >> 3;
                    self.voices[block].write(area & 0x07, value);
                    if area == 0x7F {
                        self.channels_in_use = (value >> 4) & 0x07;
                    }
                }
                if self.expand_addr & 0x80 != 0 {
                    self.expand_addr = ((self.expand_addr + 1) & 0x7F) | 0x80;
                }
            }
            0xF800 => self.expand_addr = value,
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        if address != 0x4800 {
            return None;
        }
        let addr = (self.expand_addr & 0x7F) as usize;
        if self.expand_addr & 0x80 != 0 {
            self.expand_addr = ((self.expand_addr + 1) & 0x7F) | 0x80;
        }
        Some(self.wave[addr])
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if time == 0 {
            return;
        }
        mixer.set_namco_volume(self.namco_volume());
        if self.legacy_mixing {
            self.process_legacy(time, mixer);
        } else {
            self.process_multiplexed(time, mixer);
        }
    }

    fn end_frame(&mut self) {
        for (block, voice) in self.voices.iter_mut().enumerate() {
            voice.time = 0;
            if block != self.active_slot {
                voice.counter = 0;
            }
        }
        self.global_time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        if channel > self.channels_in_use as usize {
            return 0.0;
        }
        self.voices[MAX_CHANNELS_N163 - 1 - channel].frequency_hz()
            / (self.channels_in_use as f64 + 1.0)
    }

    fn log_frame_state(&mut self, sink: &mut dyn RegisterSink) {
        for i in 0..=self.channels_in_use as u16 {
            for j in [1u16, 3, 5] {
                let address = 0x78 - i * 8 + j;
                sink.record(SoundChip::N163, address, self.read_mem(address as u8));
            }
        }
    }
}
