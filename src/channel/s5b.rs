//! Sunsoft 5B channel handler
//!
//! The duty value of a 5B channel packs the mixer setup: bit 7 enables
//! noise, bit 6 disables the tone, bit 5 selects envelope volume and the
//! low five bits set the noise period.

use super::chip_handler::{S5B_ADDRESS, S5B_DATA};
use super::{ChannelCore, ChannelHandler, ChipShared};
use crate::apu::Apu;
use crate::types::{ChannelId, Effect, EffectCommand};

const MAX_PERIOD_S5B: i32 = 0xFFF;

const DUTY_NOISE: u8 = 0x80;
const DUTY_TONE_OFF: u8 = 0x40;
const DUTY_ENVELOPE: u8 = 0x20;
const DUTY_NOISE_PERIOD: u8 = 0x1F;

/// One tone channel of the 5B
#[derive(Debug)]
pub struct S5bHandler {
    voice: u8,
    core: ChannelCore,
    envelope_period: u16,
    envelope_dirty: bool,
    envelope_shape: Option<u8>,
    noise_period: Option<u8>,
}

impl S5bHandler {
    /// Handler for tone channel `voice` (0-2)
    pub fn new(voice: usize) -> Self {
        let voice = voice.min(2);
        let id = ChannelId::from_index(ChannelId::S5bCh1.index() + voice)
            .unwrap_or(ChannelId::S5bCh1);
        Self {
            voice: voice as u8,
            core: ChannelCore::new(id, MAX_PERIOD_S5B, false),
            envelope_period: 0,
            envelope_dirty: false,
            envelope_shape: None,
            noise_period: None,
        }
    }

    fn write_reg(apu: &mut Apu, reg: u8, value: u8) {
        apu.write(S5B_ADDRESS, reg);
        apu.write(S5B_DATA, value);
    }
}

impl ChannelHandler for S5bHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        match cmd.effect {
            Effect::SunsoftEnvLo => {
                self.envelope_period = (self.envelope_period & 0xFF00) | cmd.param as u16;
                self.envelope_dirty = true;
            }
            Effect::SunsoftEnvHi => {
                self.envelope_period = (self.envelope_period & 0x00FF) | ((cmd.param as u16) << 8);
                self.envelope_dirty = true;
            }
            Effect::SunsoftEnvType => self.envelope_shape = Some(cmd.param & 0x0F),
            Effect::SunsoftNoise => self.noise_period = Some(cmd.param & DUTY_NOISE_PERIOD),
            _ => return false,
        }
        true
    }

    fn reset_chip_state(&mut self) {
        self.envelope_period = 0;
        self.envelope_dirty = false;
        self.envelope_shape = None;
        self.noise_period = None;
    }

    fn refresh_channel(&mut self, apu: &mut Apu, shared: &mut ChipShared) {
        let period = self.core.output_period();
        let volume = self.core.output_volume() as u8;
        let duty = self.core.duty();
        let reg = self.voice * 2;

        Self::write_reg(apu, reg, (period & 0xFF) as u8);
        Self::write_reg(apu, reg + 1, ((period >> 8) & 0x0F) as u8);
        let envelope = if duty & DUTY_ENVELOPE != 0 { 0x10 } else { 0 };
        Self::write_reg(apu, 0x08 + self.voice, envelope | volume);

        if volume > 0 {
            if duty & DUTY_TONE_OFF == 0 {
                shared.s5b_mixer &= !(1 << self.voice);
            }
            if duty & DUTY_NOISE != 0 {
                shared.s5b_mixer &= !(1 << (self.voice + 3));
                if self.noise_period.is_none() && duty & DUTY_NOISE_PERIOD != 0 {
                    shared.s5b_noise = Some(duty & DUTY_NOISE_PERIOD);
                }
            }
        }
        if let Some(noise) = self.noise_period.take() {
            shared.s5b_noise = Some(noise);
        }
        if std::mem::take(&mut self.envelope_dirty) {
            shared.s5b_envelope_period = Some(self.envelope_period);
        }
        if let Some(shape) = self.envelope_shape.take() {
            shared.s5b_envelope_shape = Some(shape);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ChipHandler;
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{Machine, PeriodTable, SoundChip, SoundChipSet};

    #[test]
    fn tone_clears_mixer_bit() {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::S5B);
        let mut handler = S5bHandler::new(1);
        handler.set_note_table(table(PeriodTable::S5b));
        handler.core_mut().trigger(45);
        let mut shared = ChipShared::default();
        handler.refresh_channel(&mut apu, &mut shared);
        assert_eq!(shared.s5b_mixer, 0x3F & !0x02);
    }

    #[test]
    fn chip_handler_commits_mixer() {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::S5B);
        let mut chip = ChipHandler::new(SoundChip::S5b);
        chip.visit_channel_handlers(|h| h.set_note_table(table(PeriodTable::S5b)));
        if let Some((handler, _)) = chip.parts_mut(ChannelId::S5bCh1) {
            handler.core_mut().trigger(45);
        }
        chip.refresh_before(&mut apu);
        if let Some((handler, shared)) = chip.parts_mut(ChannelId::S5bCh1) {
            handler.refresh_channel(&mut apu, shared);
        }
        chip.refresh_after(&mut apu);
        let hz = apu.freq(SoundChip::S5b, 0);
        assert!((hz - 440.0).abs() < 3.0, "{hz}");
        assert_eq!(apu.freq(SoundChip::S5b, 1), 0.0);
    }

    #[test]
    fn envelope_effects_are_combined() {
        let mut handler = S5bHandler::new(0);
        handler.handle_chip_effect(EffectCommand {
            effect: Effect::SunsoftEnvHi,
            param: 0x12,
        });
        handler.handle_chip_effect(EffectCommand {
            effect: Effect::SunsoftEnvLo,
            param: 0x34,
        });
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        let mut shared = ChipShared::default();
        handler.refresh_channel(&mut apu, &mut shared);
        assert_eq!(shared.s5b_envelope_period, Some(0x1234));
    }
}
