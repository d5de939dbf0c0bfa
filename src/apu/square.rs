//! Pulse channel shared by the 2A03 and the MMC5
//!
//! Timer, 8-step duty sequencer, envelope, length counter and (2A03 only)
//! sweep unit. The owner clocks the quarter/half frame units.

use super::{ChannelOutput, Mixer};
use crate::types::ChannelId;

/// Length counter load values, indexed by the upper 5 bits of register 3
pub const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

/// How the sweep unit negates its change amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Ones' complement (2A03 pulse 1)
    OnesComplement,
    /// Two's complement (2A03 pulse 2)
    TwosComplement,
    /// No sweep unit (MMC5)
    Absent,
}

/// Envelope generator shared by pulse and noise channels
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Constant volume or envelope period
    pub volume: u8,
    /// Output `volume` directly instead of the decay level
    pub constant: bool,
    /// Loop the decay (same bit as the length counter halt)
    pub looping: bool,
    start: bool,
    divider: u8,
    decay: u8,
}

impl Envelope {
    /// Decode `--LC VVVV`
    pub fn write(&mut self, value: u8) {
        self.looping = value & 0x20 != 0;
        self.constant = value & 0x10 != 0;
        self.volume = value & 0x0F;
    }

    /// Restart on the next quarter frame
    #[inline]
    pub fn restart(&mut self) {
        self.start = true;
    }

    /// Quarter-frame clock
    pub fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.volume;
        } else if self.divider == 0 {
            self.divider = self.volume;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    /// Current output volume
    #[inline]
    pub fn output(&self) -> u8 {
        if self.constant {
            self.volume
        } else {
            self.decay
        }
    }
}

/// One pulse channel
#[derive(Debug, Clone)]
pub struct Square {
    output: ChannelOutput,
    sweep_mode: SweepMode,
    enabled: bool,
    duty: u8,
    sequence: u8,
    period: u16,
    counter: u32,
    length: u8,
    envelope: Envelope,
    sweep_enabled: bool,
    sweep_period: u8,
    sweep_negate: bool,
    sweep_shift: u8,
    sweep_divider: u8,
    sweep_reload: bool,
    time: u32,
}

impl Square {
    /// Silent channel reporting as `id`
    pub fn new(id: ChannelId, sweep_mode: SweepMode) -> Self {
        Self {
            output: ChannelOutput::new(id),
            sweep_mode,
            enabled: false,
            duty: 0,
            sequence: 0,
            period: 0,
            counter: 2,
            length: 0,
            envelope: Envelope::default(),
            sweep_enabled: false,
            sweep_period: 0,
            sweep_negate: false,
            sweep_shift: 0,
            sweep_divider: 0,
            sweep_reload: false,
            time: 0,
        }
    }

    /// Power-on state
    pub fn reset(&mut self) {
        *self = Self::new(self.output.id(), self.sweep_mode);
    }

    /// Write register `reg` (0..=3)
    pub fn write(&mut self, reg: u16, value: u8) {
        match reg & 0x03 {
            0 => {
                self.duty = value >> 6;
                self.envelope.write(value);
            }
            1 => {
                self.sweep_enabled = value & 0x80 != 0;
                self.sweep_period = (value >> 4) & 0x07;
                self.sweep_negate = value & 0x08 != 0;
                self.sweep_shift = value & 0x07;
                self.sweep_reload = true;
            }
            2 => self.period = (self.period & 0x700) | value as u16,
            _ => {
                self.period = (self.period & 0xFF) | (((value & 0x07) as u16) << 8);
                if self.enabled {
                    self.length = LENGTH_TABLE[(value >> 3) as usize];
                }
                self.sequence = 0;
                self.envelope.restart();
            }
        }
    }

    /// Enable bit from the status register; disabling clears the length
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    /// Whether the length counter is running
    #[inline]
    pub fn is_active(&self) -> bool {
        self.length > 0
    }

    /// Timer period register
    #[inline]
    pub fn period(&self) -> u16 {
        self.period
    }

    fn sweep_target(&self) -> u16 {
        let change = self.period >> self.sweep_shift;
        if self.sweep_negate {
            match self.sweep_mode {
                SweepMode::OnesComplement => self.period.saturating_sub(change + 1),
                _ => self.period.saturating_sub(change),
            }
        } else {
            self.period + change
        }
    }

    fn is_audible(&self) -> bool {
        if self.length == 0 || self.period < 8 {
            return false;
        }
        self.sweep_mode == SweepMode::Absent || self.sweep_target() <= 0x7FF
    }

    fn level(&self) -> i32 {
        if DUTY_TABLE[self.duty as usize][self.sequence as usize] != 0 {
            self.envelope.output() as i32
        } else {
            0
        }
    }

    /// Advance by `time` CPU cycles
    pub fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if !self.is_audible() {
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
                self.counter = (self.period as u32 + 1) * 2;
                self.sequence = (self.sequence + 1) & 0x07;
                let level = self.level();
                self.output.mix(mixer, level, self.time);
            }
        }
    }

    /// Quarter-frame clock
    pub fn clock_envelope(&mut self) {
        self.envelope.clock();
    }

    /// Half-frame clock: length counter and sweep
    pub fn clock_length(&mut self) {
        if !self.envelope.looping && self.length > 0 {
            self.length -= 1;
        }
        if self.sweep_mode == SweepMode::Absent {
            return;
        }
        if self.sweep_divider == 0
            && self.sweep_enabled
            && self.sweep_shift > 0
            && self.period >= 8
            && self.sweep_target() <= 0x7FF
        {
            self.period = self.sweep_target();
        }
        if self.sweep_divider == 0 || self.sweep_reload {
            self.sweep_divider = self.sweep_period;
            self.sweep_reload = false;
        } else {
            self.sweep_divider -= 1;
        }
    }

    /// Restart frame timestamps
    #[inline]
    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    /// Output frequency for a CPU clock
    pub fn frequency(&self, clock: u32) -> f64 {
        if !self.is_audible() {
            return 0.0;
        }
        clock as f64 / 16.0 / (self.period as f64 + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_square() -> Square {
        let mut sq = Square::new(ChannelId::Square1, SweepMode::OnesComplement);
        sq.set_enabled(true);
        sq.write(0, 0xBF);
        sq.write(2, 0xFD);
        sq.write(3, 0x00);
        sq
    }

    #[test]
    fn test_reset_is_silent() {
        let mut mixer = Mixer::new(1_789_773, 44_100);
        let mut sq = playing_square();
        sq.reset();
        sq.process(50_000, &mut mixer);
        assert_eq!(mixer.delta_count(ChannelId::Square1), 0);
    }

    #[test]
    fn test_duty_pattern_toggles_output() {
        let mut mixer = Mixer::new(1_789_773, 44_100);
        let mut sq = playing_square();
        sq.process(254 * 2 * 8, &mut mixer);
        // 50% duty: one rise and one fall per period
        assert_eq!(mixer.delta_count(ChannelId::Square1), 2);
    }

    #[test]
    fn test_length_counter_silences() {
        let mut sq = playing_square();
        sq.write(0, 0x9F);
        for _ in 0..10 {
            sq.clock_length();
        }
        assert!(!sq.is_active());
        assert_eq!(sq.frequency(1_789_773), 0.0);
    }

    #[test]
    fn test_sweep_raises_pitch() {
        let mut sq = playing_square();
        sq.write(1, 0x89);
        sq.clock_length();
        sq.clock_length();
        assert!(sq.period() < 0xFD);
    }
}
