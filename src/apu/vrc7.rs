//! Konami VRC7 (YM2413 / OPLL derivative)
//!
//! Six two-operator FM voices with one user patch and fifteen fixed patches.
//! The synthesis core runs at `clock / 36` (about 49.7 kHz): per sample each
//! voice steps a modulator and a carrier with their ADSR envelopes and the
//! shared tremolo/vibrato LFOs. This is a compact model of the chip; it keeps
//! the register interface and envelope behavior, not the exact log-sin
//! arithmetic of the die.

use std::f64::consts::TAU;

use super::{ChannelOutput, ChipModel, Mixer};
use crate::constants::MASTER_CLOCK_NTSC;
use crate::types::{ChannelId, SoundChip};

/// CPU cycles per synthesis sample
pub const OPLL_DIVIDER: u32 = 36;

/// Built-in patches; entry 0 is replaced by the user patch ($00-$07)
pub const VRC7_PATCHES: [[u8; 8]; 16] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x03, 0x21, 0x05, 0x06, 0xE8, 0x81, 0x42, 0x27],
    [0x13, 0x41, 0x14, 0x0D, 0xD8, 0xF6, 0x23, 0x12],
    [0x11, 0x11, 0x08, 0x08, 0xFA, 0xB2, 0x20, 0x12],
    [0x31, 0x61, 0x0C, 0x07, 0xA8, 0x64, 0x61, 0x27],
    [0x32, 0x21, 0x1E, 0x06, 0xE1, 0x76, 0x01, 0x28],
    [0x02, 0x01, 0x06, 0x00, 0xA3, 0xE2, 0xF4, 0xF4],
    [0x21, 0x61, 0x1D, 0x07, 0x82, 0x81, 0x11, 0x07],
    [0x23, 0x21, 0x22, 0x17, 0xA2, 0x72, 0x01, 0x17],
    [0x35, 0x11, 0x25, 0x00, 0x40, 0x73, 0x72, 0x01],
    [0xB5, 0x01, 0x0F, 0x0F, 0xA8, 0xA5, 0x51, 0x02],
    [0x17, 0xC1, 0x24, 0x07, 0xF8, 0xF8, 0x22, 0x12],
    [0x71, 0x23, 0x11, 0x06, 0x65, 0x74, 0x18, 0x16],
    [0x01, 0x02, 0xD3, 0x05, 0xC9, 0x95, 0x03, 0x02],
    [0x61, 0x63, 0x0C, 0x00, 0x94, 0xC0, 0x33, 0xF6],
    [0x21, 0x72, 0x0D, 0x00, 0xC1, 0xD5, 0x56, 0x06],
];

const MULTIPLIERS: [f64; 16] = [
    0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 10.0, 12.0, 12.0, 15.0, 15.0,
];

/// Attenuation treated as silence
const MAX_ATTENUATION: f64 = 96.0;
const AM_DEPTH_DB: f64 = 4.8;
const AM_RATE_HZ: f64 = 3.7;
const PM_DEPTH: f64 = 0.004;
const PM_RATE_HZ: f64 = 6.4;
/// Peak carrier phase deviation from a full-scale modulator
const MOD_INDEX: f64 = 2.0 * TAU;
const OUTPUT_SCALE: f64 = 2047.0;
/// Release rate used while the voice sustain bit is set
const SUSTAIN_RELEASE_RATE: u8 = 5;

fn sample_rate() -> f64 {
    MASTER_CLOCK_NTSC as f64 / OPLL_DIVIDER as f64
}

/// dB per sample for an effective decay rate (0-63)
fn decay_step(rate: u8) -> f64 {
    if rate < 4 {
        return 0.0;
    }
    let time_ms = 39_456.0 / 2f64.powf(rate as f64 / 4.0);
    MAX_ATTENUATION / (time_ms * sample_rate() / 1000.0)
}

/// dB per sample for an effective attack rate (0-63)
fn attack_step(rate: u8) -> f64 {
    if rate < 4 {
        return 0.0;
    }
    if rate >= 60 {
        return MAX_ATTENUATION;
    }
    let time_ms = 5_400.0 / 2f64.powf(rate as f64 / 4.0);
    MAX_ATTENUATION / (time_ms * sample_rate() / 1000.0)
}

fn gain(db: f64) -> f64 {
    if db >= MAX_ATTENUATION {
        0.0
    } else {
        10f64.powf(-db / 20.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EgState {
    Attack,
    Decay,
    Sustain,
    Release,
    Off,
}

/// Operator parameters decoded from a patch
#[derive(Debug, Clone, Copy)]
struct OperatorParams {
    am: bool,
    vibrato: bool,
    sustained: bool,
    ksr: bool,
    multiplier: f64,
    rectified: bool,
    attack: u8,
    decay: u8,
    sustain_level: u8,
    release: u8,
}

impl OperatorParams {
    fn decode(patch: &[u8; 8], op: usize) -> Self {
        let flags = patch[op];
        Self {
            am: flags & 0x80 != 0,
            vibrato: flags & 0x40 != 0,
            sustained: flags & 0x20 != 0,
            ksr: flags & 0x10 != 0,
            multiplier: MULTIPLIERS[(flags & 0x0F) as usize],
            rectified: patch[3] & if op == 0 { 0x08 } else { 0x10 } != 0,
            attack: patch[4 + op] >> 4,
            decay: patch[4 + op] & 0x0F,
            sustain_level: patch[6 + op] >> 4,
            release: patch[6 + op] & 0x0F,
        }
    }
}

#[derive(Debug, Clone)]
struct Operator {
    phase: f64,
    state: EgState,
    attenuation: f64,
}

impl Operator {
    fn new() -> Self {
        Self {
            phase: 0.0,
            state: EgState::Off,
            attenuation: MAX_ATTENUATION,
        }
    }

    fn key_on(&mut self) {
        self.phase = 0.0;
        self.state = EgState::Attack;
    }

    fn key_off(&mut self) {
        if self.state != EgState::Off {
            self.state = EgState::Release;
        }
    }

    fn run_envelope(&mut self, params: &OperatorParams, key_scale: u8, voice_sustain: bool) {
        let effective = |rate: u8| -> u8 {
            if rate == 0 {
                0
            } else {
                (rate * 4 + key_scale).min(63)
            }
        };
        match self.state {
            EgState::Attack => {
                self.attenuation -= attack_step(effective(params.attack));
                if self.attenuation <= 0.0 {
                    self.attenuation = 0.0;
                    self.state = EgState::Decay;
                }
            }
            EgState::Decay => {
                let target = params.sustain_level as f64 * 3.0;
                self.attenuation += decay_step(effective(params.decay));
                if self.attenuation >= target {
                    self.attenuation = target;
                    self.state = EgState::Sustain;
                }
            }
            EgState::Sustain => {
                if !params.sustained {
                    self.attenuation += decay_step(effective(params.release));
                }
            }
            EgState::Release => {
                let rate = if voice_sustain {
                    SUSTAIN_RELEASE_RATE
                } else {
                    params.release
                };
                self.attenuation += decay_step(effective(rate));
            }
            EgState::Off => {}
        }
        if self.attenuation >= MAX_ATTENUATION && self.state != EgState::Attack {
            self.attenuation = MAX_ATTENUATION;
            if self.state != EgState::Decay {
                self.state = EgState::Off;
            }
        }
    }

    fn wave(&self, offset: f64, rectified: bool) -> f64 {
        let value = (self.phase * TAU + offset).sin();
        if rectified && value < 0.0 {
            0.0
        } else {
            value
        }
    }
}

/// One FM voice
#[derive(Debug, Clone)]
struct Vrc7Voice {
    output: ChannelOutput,
    fnum: u16,
    block: u8,
    key: bool,
    sustain: bool,
    instrument: u8,
    volume: u8,
    modulator: Operator,
    carrier: Operator,
    feedback: [f64; 2],
}

impl Vrc7Voice {
    fn new(id: ChannelId) -> Self {
        Self {
            output: ChannelOutput::new(id),
            fnum: 0,
            block: 0,
            key: false,
            sustain: false,
            instrument: 0,
            volume: 0,
            modulator: Operator::new(),
            carrier: Operator::new(),
            feedback: [0.0; 2],
        }
    }

    fn set_key(&mut self, key: bool) {
        if key && !self.key {
            self.modulator.key_on();
            self.carrier.key_on();
        } else if !key && self.key {
            self.modulator.key_off();
            self.carrier.key_off();
        }
        self.key = key;
    }

    fn key_scale(&self, ksr: bool) -> u8 {
        let base = (self.block << 1) | (self.fnum >> 8) as u8;
        if ksr {
            base
        } else {
            base >> 2
        }
    }

    fn frequency(&self) -> f64 {
        self.fnum as f64 * sample_rate() * (1u32 << self.block) as f64 / (1u32 << 19) as f64
    }

    fn sample(&mut self, patch: &[u8; 8], am_db: f64, pm: f64) -> i32 {
        let mod_params = OperatorParams::decode(patch, 0);
        let car_params = OperatorParams::decode(patch, 1);
        self.modulator.run_envelope(
            &mod_params,
            self.key_scale(mod_params.ksr),
            self.sustain,
        );
        self.carrier.run_envelope(
            &car_params,
            self.key_scale(car_params.ksr),
            self.sustain,
        );
        if self.carrier.state == EgState::Off {
            self.feedback = [0.0; 2];
            return 0;
        }

        let base = self.frequency() / sample_rate();
        let mod_pm = if mod_params.vibrato { pm } else { 1.0 };
        let car_pm = if car_params.vibrato { pm } else { 1.0 };
        self.modulator.phase = (self.modulator.phase + base * mod_params.multiplier * mod_pm).fract();
        self.carrier.phase = (self.carrier.phase + base * car_params.multiplier * car_pm).fract();

        let fb_level = patch[3] & 0x07;
        let fb_offset = if fb_level == 0 {
            0.0
        } else {
            (self.feedback[0] + self.feedback[1]) / 2.0 * std::f64::consts::PI
                / (1u32 << (7 - fb_level)) as f64
        };
        let total_level = (patch[2] & 0x3F) as f64 * 0.75;
        let mod_am = if mod_params.am { am_db } else { 0.0 };
        let mod_out = self.modulator.wave(fb_offset, mod_params.rectified)
            * gain(self.modulator.attenuation + total_level + mod_am);
        self.feedback = [self.feedback[1], mod_out];

        let car_am = if car_params.am { am_db } else { 0.0 };
        let car_out = self.carrier.wave(mod_out * MOD_INDEX, car_params.rectified)
            * gain(self.carrier.attenuation + self.volume as f64 * 3.0 + car_am);
        (car_out * OUTPUT_SCALE).round() as i32
    }
}

/// The VRC7 sound unit
#[derive(Debug, Clone)]
pub struct Vrc7 {
    voices: [Vrc7Voice; 6],
    custom_patch: [u8; 8],
    address: u8,
    counter: u32,
    lfo_time: f64,
    time: u32,
}

impl Vrc7 {
    /// Power-on VRC7
    pub fn new() -> Self {
        Self {
            voices: [
                Vrc7Voice::new(ChannelId::Vrc7Ch1),
                Vrc7Voice::new(ChannelId::Vrc7Ch2),
                Vrc7Voice::new(ChannelId::Vrc7Ch3),
                Vrc7Voice::new(ChannelId::Vrc7Ch4),
                Vrc7Voice::new(ChannelId::Vrc7Ch5),
                Vrc7Voice::new(ChannelId::Vrc7Ch6),
            ],
            custom_patch: [0; 8],
            address: 0,
            counter: 0,
            lfo_time: 0.0,
            time: 0,
        }
    }

    /// Write internal register `reg`
    pub fn write_reg(&mut self, reg: u8, value: u8) {
        match reg {
            0x00..=0x07 => self.custom_patch[reg as usize] = value,
            0x10..=0x15 => {
                let voice = &mut self.voices[(reg & 0x0F) as usize];
                voice.fnum = (voice.fnum & 0x100) | value as u16;
            }
            0x20..=0x25 => {
                let voice = &mut self.voices[(reg & 0x0F) as usize];
                voice.fnum = (voice.fnum & 0xFF) | (((value & 0x01) as u16) << 8);
                voice.block = (value >> 1) & 0x07;
                voice.sustain = value & 0x20 != 0;
                voice.set_key(value & 0x10 != 0);
            }
            0x30..=0x35 => {
                let voice = &mut self.voices[(reg & 0x0F) as usize];
                voice.instrument = value >> 4;
                voice.volume = value & 0x0F;
            }
            _ => {}
        }
    }

    /// Patch bytes for an instrument number
    pub fn patch(&self, instrument: u8) -> [u8; 8] {
        match instrument & 0x0F {
            0 => self.custom_patch,
            n => VRC7_PATCHES[n as usize],
        }
    }

    fn synthesize(&mut self, mixer: &mut Mixer) {
        self.lfo_time += 1.0 / sample_rate();
        let am_db = AM_DEPTH_DB * 0.5 * (1.0 + (self.lfo_time * AM_RATE_HZ * TAU).sin());
        let pm = 1.0 + PM_DEPTH * (self.lfo_time * PM_RATE_HZ * TAU).sin();
        let custom = self.custom_patch;
        for voice in &mut self.voices {
            let patch = match voice.instrument {
                0 => custom,
                n => VRC7_PATCHES[n as usize],
            };
            let level = voice.sample(&patch, am_db, pm);
            voice.output.mix(mixer, level, self.time);
        }
    }
}

impl Default for Vrc7 {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModel for Vrc7 {
    fn id(&self) -> SoundChip {
        SoundChip::Vrc7
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn maps(&self, address: u16) -> bool {
        matches!(address, 0x9010 | 0x9030)
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x9010 => self.address = value & 0x3F,
            0x9030 => self.write_reg(self.address, value),
            _ => {}
        }
    }

    fn read(&mut self, _address: u16) -> Option<u8> {
        None
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        let mut remaining = time;
        while remaining > 0 {
            let step = remaining.min(OPLL_DIVIDER - self.counter);
            self.counter += step;
            remaining -= step;
            self.time += step;
            if self.counter == OPLL_DIVIDER {
                self.counter = 0;
                self.synthesize(mixer);
            }
        }
    }

    fn end_frame(&mut self) {
        self.time = 0;
    }

    fn freq(&self, channel: usize) -> f64 {
        match self.voices.get(channel) {
            Some(voice) if voice.key => voice.frequency(),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(chip: &mut Vrc7, reg: u8, value: u8) {
        chip.write(0x9010, reg);
        chip.write(0x9030, value);
    }

    #[test]
    fn test_silent_without_key_on() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut chip = Vrc7::new();
        write(&mut chip, 0x10, 0xAC);
        write(&mut chip, 0x30, 0x10);
        chip.process(50_000, &mut mixer);
        assert_eq!(mixer.total_delta_count(), 0);
    }

    #[test]
    fn test_key_on_produces_output_on_its_channel() {
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        let mut chip = Vrc7::new();
        write(&mut chip, 0x11, 0x20);
        write(&mut chip, 0x31, 0x30);
        write(&mut chip, 0x21, 0x10 | (4 << 1) | 0x01);
        chip.process(30_000, &mut mixer);
        assert!(mixer.delta_count(ChannelId::Vrc7Ch2) > 10);
        assert_eq!(mixer.delta_count(ChannelId::Vrc7Ch1), 0);
        assert!(chip.freq(1) > 0.0);
        assert_eq!(chip.freq(0), 0.0);
    }

    #[test]
    fn test_custom_patch_is_instrument_zero() {
        let mut chip = Vrc7::new();
        for (i, byte) in [1u8, 2, 3, 4, 5, 6, 7, 8].iter().enumerate() {
            write(&mut chip, i as u8, *byte);
        }
        assert_eq!(chip.patch(0), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(chip.patch(1), VRC7_PATCHES[1]);
    }

    #[test]
    fn test_frequency_follows_fnum_and_block() {
        let mut chip = Vrc7::new();
        write(&mut chip, 0x10, 0x22);
        write(&mut chip, 0x20, 0x10 | (4 << 1) | 0x01);
        let expected = 0x122 as f64 * sample_rate() * 16.0 / (1u32 << 19) as f64;
        approx::assert_relative_eq!(chip.freq(0), expected);
    }
}
