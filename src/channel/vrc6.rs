//! VRC6 channel handlers

use super::{ChannelCore, ChannelHandler, ChipShared};
use crate::apu::Apu;
use crate::types::ChannelId;

const MAX_PERIOD_VRC6: i32 = 0xFFF;

/// VRC6 pulse channel
#[derive(Debug)]
pub struct Vrc6PulseHandler {
    core: ChannelCore,
    base: u16,
}

impl Vrc6PulseHandler {
    /// Handler for pulse 1 ($9000) or pulse 2 ($A000)
    pub fn new(id: ChannelId) -> Self {
        let base = if id == ChannelId::Vrc6Pulse2 { 0xA000 } else { 0x9000 };
        Self {
            core: ChannelCore::new(id, MAX_PERIOD_VRC6, false),
            base,
        }
    }
}

impl ChannelHandler for Vrc6PulseHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        let period = self.core.output_period();
        let volume = self.core.output_volume() as u8;
        let duty = self.core.duty() & 0x07;
        apu.write(self.base, (duty << 4) | volume);
        apu.write(self.base + 1, (period & 0xFF) as u8);
        let enable = if volume > 0 { 0x80 } else { 0x00 };
        apu.write(self.base + 2, enable | ((period >> 8) & 0x0F) as u8);
    }
}

/// VRC6 sawtooth channel
#[derive(Debug)]
pub struct SawtoothHandler {
    core: ChannelCore,
}

impl SawtoothHandler {
    /// Sawtooth handler
    pub fn new() -> Self {
        Self {
            core: ChannelCore::new(ChannelId::Vrc6Sawtooth, MAX_PERIOD_VRC6, false),
        }
    }

    /// Accumulator rate for a 0-15 volume; duty 1 selects the loud range
    fn accumulator_rate(volume: u8, duty: u8) -> u8 {
        if duty & 0x01 != 0 {
            (volume * 4).min(0x3F)
        } else {
            volume * 2
        }
    }
}

impl Default for SawtoothHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHandler for SawtoothHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        let period = self.core.output_period();
        let volume = self.core.output_volume() as u8;
        apu.write(0xB000, Self::accumulator_rate(volume, self.core.duty()));
        apu.write(0xB001, (period & 0xFF) as u8);
        let enable = if volume > 0 { 0x80 } else { 0x00 };
        apu.write(0xB002, enable | ((period >> 8) & 0x0F) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{Machine, PeriodTable, SoundChip, SoundChipSet};

    fn bus() -> Apu {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::VRC6);
        apu
    }

    #[test]
    fn sawtooth_rate_ranges() {
        assert_eq!(SawtoothHandler::accumulator_rate(15, 0), 30);
        assert_eq!(SawtoothHandler::accumulator_rate(15, 1), 0x3C);
        assert_eq!(SawtoothHandler::accumulator_rate(0, 1), 0);
    }

    #[test]
    fn pulse_and_saw_sound_after_trigger() {
        let mut apu = bus();
        let mut pulse = Vrc6PulseHandler::new(ChannelId::Vrc6Pulse1);
        let mut saw = SawtoothHandler::new();
        pulse.set_note_table(table(PeriodTable::Ntsc));
        saw.set_note_table(table(PeriodTable::Saw));
        pulse.core_mut().trigger(48);
        saw.core_mut().trigger(36);
        let mut shared = ChipShared::default();
        pulse.refresh_channel(&mut apu, &mut shared);
        saw.refresh_channel(&mut apu, &mut shared);
        apu.add_time(20_000);
        apu.end_frame();
        assert!(apu.mixer().delta_count(ChannelId::Vrc6Pulse1) > 0);
        assert!(apu.mixer().delta_count(ChannelId::Vrc6Sawtooth) > 0);
        assert!(apu.freq(SoundChip::Vrc6, 2) > 0.0);
    }

    #[test]
    fn gate_off_disables_pulse() {
        let mut apu = bus();
        let mut pulse = Vrc6PulseHandler::new(ChannelId::Vrc6Pulse2);
        pulse.set_note_table(table(PeriodTable::Ntsc));
        pulse.refresh_channel(&mut apu, &mut ChipShared::default());
        apu.add_time(20_000);
        apu.end_frame();
        assert_eq!(apu.mixer().delta_count(ChannelId::Vrc6Pulse2), 0);
    }
}
