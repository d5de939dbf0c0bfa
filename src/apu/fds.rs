//! Famicom Disk System wavetable channel
//!
//! A 64-step, 6-bit wavetable with a frequency modulator driven by a
//! 64-entry delta table, volume and modulation envelopes, and a master
//! volume divider. The wave and modulator accumulators overflow every
//! 2^20 units of pitch, so a pitch of `p` plays at `clock * p / 2^20` Hz.

use super::{ChannelOutput, ChipModel, Mixer};
use crate::constants::MASTER_CLOCK_NTSC;
use crate::types::{ChannelId, SoundChip};

const WAVE_SIZE: usize = 64;
const MOD_SIZE: usize = 64;

/// Accumulator bits below the table index
const POSITION_SHIFT: u32 = 14;
const POSITION_STEP: u32 = 1 << POSITION_SHIFT;

/// Modulator counter deltas for table values 0-7 (`None` resets the counter)
const MOD_DELTAS: [Option<i8>; 8] = [
    Some(0),
    Some(1),
    Some(2),
    Some(4),
    None,
    Some(-4),
    Some(-2),
    Some(-1),
];

/// Master volume multipliers (out of 30)
const MASTER_VOLUME: [i32; 4] = [30, 20, 15, 12];

/// Volume or modulation envelope unit
#[derive(Debug, Clone, Default)]
struct FdsEnvelope {
    speed: u8,
    gain: u8,
    increase: bool,
    disabled: bool,
    counter: u32,
}

impl FdsEnvelope {
    fn write(&mut self, value: u8) {
        self.disabled = value & 0x80 != 0;
        self.increase = value & 0x40 != 0;
        self.speed = value & 0x3F;
        if self.disabled {
            self.gain = self.speed;
        }
    }

    fn period(&self, master_speed: u8) -> u32 {
        8 * (master_speed as u32) * (self.speed as u32 + 1)
    }

    fn tick(&mut self) {
        if self.increase {
            if self.gain < 32 {
                self.gain += 1;
            }
        } else if self.gain > 0 {
            self.gain -= 1;
        }
    }
}

/// The FDS sound unit
#[derive(Debug, Clone)]
pub struct Fds {
    output: ChannelOutput,
    wave: [u8; WAVE_SIZE],
    mod_table: [u8; MOD_SIZE],
    wave_write: bool,
    wave_halt: bool,
    envelopes_halted: bool,
    frequency: u16,
    wave_acc: u32,
    mod_frequency: u16,
    mod_halt: bool,
    mod_acc: u32,
    mod_counter: i8,
    master_volume: u8,
    envelope_speed: u8,
    volume_env: FdsEnvelope,
    mod_env: FdsEnvelope,
    time: u32,
}

impl Fds {
    /// Power-on FDS audio
    pub fn new() -> Self {
        Self {
            output: ChannelOutput::new(ChannelId::Fds),
            wave: [0; WAVE_SIZE],
            mod_table: [0; MOD_SIZE],
            wave_write: false,
            wave_halt: true,
            envelopes_halted: true,
            frequency: 0,
            wave_acc: 0,
            mod_frequency: 0,
            mod_halt: true,
            mod_acc: 0,
            mod_counter: 0,
            master_volume: 0,
            envelope_speed: 0xE8,
            volume_env: FdsEnvelope::default(),
            mod_env: FdsEnvelope::default(),
            time: 0,
        }
    }

    /// Carrier pitch after frequency modulation
    fn pitch(&self) -> u32 {
        if self.mod_halt || self.mod_env.gain == 0 {
            return self.frequency as u32;
        }
        let counter = self.mod_counter as i32;
        let mut temp = counter * self.mod_env.gain as i32;
        let remainder = temp & 0x0F;
        temp >>= 4;
        if remainder > 0 && temp & 0x80 == 0 {
            temp += if counter < 0 { -1 } else { 2 };
        }
        if temp >= 192 {
            temp -= 256;
        } else if temp < -64 {
            temp += 256;
        }
        let freq = self.frequency as i32;
        let mut offset = freq * temp;
        let remainder = offset & 0x3F;
        offset >>= 6;
        if remainder >= 32 {
            offset += 1;
        }
        (freq + offset).max(0) as u32
    }

    fn level(&self) -> i32 {
        let sample = self.wave[(self.wave_acc >> POSITION_SHIFT) as usize % WAVE_SIZE] as i32;
        let gain = self.volume_env.gain.min(32) as i32;
        sample * gain * MASTER_VOLUME[self.master_volume as usize] / 30
    }

    fn clock_modulator(&mut self) {
        let position = ((self.mod_acc >> POSITION_SHIFT) as usize) % MOD_SIZE;
        match MOD_DELTAS[(self.mod_table[position] & 0x07) as usize] {
            Some(delta) => {
                // 7-bit signed counter
                let next = ((self.mod_counter as i32 + delta as i32 + 64) & 0x7F) - 64;
                self.mod_counter = next as i8;
            }
            None => self.mod_counter = 0,
        }
    }

    fn envelopes_running(&self) -> bool {
        !self.envelopes_halted && !self.wave_halt && self.envelope_speed != 0
    }

    /// Cycles until the accumulator crosses the next table position
    fn cycles_to_step(acc: u32, rate: u32) -> u32 {
        if rate == 0 {
            return u32::MAX;
        }
        let next = ((acc >> POSITION_SHIFT) + 1) << POSITION_SHIFT;
        (next - acc).div_ceil(rate)
    }

    fn write_mod_table(&mut self, value: u8) {
        if !self.mod_halt {
            return;
        }
        // Each write fills two consecutive positions
        let position = ((self.mod_acc >> POSITION_SHIFT) as usize) % MOD_SIZE & !1;
        self.mod_table[position] = value & 0x07;
        self.mod_table[position + 1] = value & 0x07;
        self.mod_acc = (self.mod_acc + 2 * POSITION_STEP) % (MOD_SIZE as u32 * POSITION_STEP);
    }
}

impl Default for Fds {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModel for Fds {
    fn id(&self) -> SoundChip {
        SoundChip::Fds
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn maps(&self, address: u16) -> bool {
        matches!(address, 0x4040..=0x408A)
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x4040..=0x407F => {
                if self.wave_write {
                    self.wave[(address & 0x3F) as usize] = value & 0x3F;
                }
            }
            0x4080 => self.volume_env.write(value),
            0x4082 => self.frequency = (self.frequency & 0xF00) | value as u16,
            0x4083 => {
                self.frequency = (self.frequency & 0xFF) | (((value & 0x0F) as u16) << 8);
                self.wave_halt = value & 0x80 != 0;
                self.envelopes_halted = value & 0x40 != 0;
                if self.wave_halt {
                    self.wave_acc = 0;
                }
            }
            0x4084 => self.mod_env.write(value),
            0x4085 => {
                self.mod_counter = (((value & 0x7F) as i32 ^ 0x40) - 0x40) as i8;
            }
            0x4086 => self.mod_frequency = (self.mod_frequency & 0xF00) | value as u16,
            0x4087 => {
                self.mod_frequency =
                    (self.mod_frequency & 0xFF) | (((value & 0x0F) as u16) << 8);
                self.mod_halt = value & 0x80 != 0;
            }
            0x4088 => self.write_mod_table(value),
            0x4089 => {
                self.wave_write = value & 0x80 != 0;
                self.master_volume = value & 0x03;
            }
            0x408A => self.envelope_speed = value,
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        match address {
            0x4040..=0x407F => Some(self.wave[(address & 0x3F) as usize] | 0x40),
            0x4090 => Some(self.volume_env.gain | 0x40),
            0x4092 => Some(self.mod_env.gain | 0x40),
            _ => None,
        }
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if time == 0 {
            return;
        }
        // Wave RAM writes hold the output
        if self.wave_write {
            self.time += time;
            return;
        }
        let level = self.level();
        self.output.mix(mixer, level, self.time);

        let mut remaining = time;
        while remaining > 0 {
            let pitch = if self.wave_halt { 0 } else { self.pitch() };
            let mod_rate = if self.mod_halt {
                0
            } else {
                self.mod_frequency as u32
            };
            let env_running = self.envelopes_running();

            let mut step = remaining
                .min(Self::cycles_to_step(self.wave_acc, pitch))
                .min(Self::cycles_to_step(self.mod_acc, mod_rate));
            if env_running {
                if !self.volume_env.disabled {
                    let period = self.volume_env.period(self.envelope_speed);
                    step = step.min(period.saturating_sub(self.volume_env.counter).max(1));
                }
                if !self.mod_env.disabled {
                    let period = self.mod_env.period(self.envelope_speed);
                    step = step.min(period.saturating_sub(self.mod_env.counter).max(1));
                }
            }

            let old_wave = self.wave_acc >> POSITION_SHIFT;
            let old_mod = self.mod_acc >> POSITION_SHIFT;
            self.wave_acc = (self.wave_acc + pitch * step) % (WAVE_SIZE as u32 * POSITION_STEP);
            self.mod_acc = (self.mod_acc + mod_rate * step) % (MOD_SIZE as u32 * POSITION_STEP);
            remaining -= step;
            self.time += step;

            if mod_rate != 0 && self.mod_acc >> POSITION_SHIFT != old_mod {
                self.clock_modulator();
            }
            if env_running {
                for env in [&mut self.volume_env, &mut self.mod_env] {
                    if env.disabled {
                        continue;
                    }
                    env.counter += step;
                    if env.counter >= env.period(self.envelope_speed) {
                        env.counter = 0;
                        env.tick();
                    }
                }
            }
            if pitch != 0 && self.wave_acc >> POSITION_SHIFT != old_wave || env_running {
                let level = self.level();
                self.output.mix(mixer, level, self.time);
            }
        }
    }

    fn end_frame(&mut self) {
        self.time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        if channel != 0 || self.wave_halt || self.volume_env.gain == 0 {
            return 0.0;
        }
        MASTER_CLOCK_NTSC as f64 * self.frequency as f64 / (1u64 << 20) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_fds() -> Fds {
        let mut fds = Fds::new();
        fds.write(0x4089, 0x80);
        for i in 0..64u16 {
            fds.write(0x4040 + i, if i < 32 { 63 } else { 0 });
        }
        fds.write(0x4089, 0x00);
        fds.write(0x4080, 0x80 | 0x20);
        fds
    }

    #[test]
    fn test_wave_ram_needs_write_enable() {
        let mut fds = Fds::new();
        fds.write(0x4040, 0x3F);
        assert_eq!(fds.read(0x4040), Some(0x40));
        fds.write(0x4089, 0x80);
        fds.write(0x4040, 0x3F);
        assert_eq!(fds.read(0x4040), Some(0x7F));
    }

    #[test]
    fn test_square_wave_plays() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut fds = loaded_fds();
        fds.write(0x4082, 0x00);
        fds.write(0x4083, 0x04);
        fds.process(30_000, &mut mixer);
        assert!(mixer.delta_count(ChannelId::Fds) >= 2);
        assert!(fds.freq(0) > 0.0);
    }

    #[test]
    fn test_halted_wave_is_silent() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut fds = loaded_fds();
        fds.write(0x4083, 0x80);
        fds.process(30_000, &mut mixer);
        // Position 0 holds 63, so the halted level is constant
        assert!(mixer.delta_count(ChannelId::Fds) <= 1);
        assert_eq!(fds.freq(0), 0.0);
    }

    #[test]
    fn test_modulator_counter_is_seven_bit() {
        let mut fds = Fds::new();
        fds.write(0x4085, 0x7F);
        assert_eq!(fds.mod_counter, -1);
        fds.write(0x4085, 0x3F);
        assert_eq!(fds.mod_counter, 63);
    }

    #[test]
    fn test_mod_table_fills_pairs() {
        let mut fds = Fds::new();
        fds.write(0x4087, 0x80);
        fds.write(0x4088, 0x03);
        fds.write(0x4088, 0x05);
        assert_eq!(&fds.mod_table[..4], &[3, 3, 5, 5]);
    }
}
