//! 2A03 and MMC5 channel handlers

use super::{ChannelCore, ChannelHandler, ChipShared};
use crate::apu::{Apu, Chip};
use crate::constants::DPCM_BASE_ADDRESS;
use crate::module::{DpcmKey, Instrument};
use crate::types::{ChannelId, Effect, EffectCommand, SoundChip};

const MAX_PERIOD_2A03: i32 = 0x7FF;

/// Length table index loaded when the length counter is not in use
const LENGTH_LOAD: u8 = 0x1F;

/// Hardware envelope/length state controlled by Exx
///
/// E00-E1F select the length table entry, EE0-EE3 toggle the length
/// counter (bit 0) and the hardware envelope (bit 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HardwareMode {
    length_counter: bool,
    envelope: bool,
    length_index: u8,
}

impl Default for HardwareMode {
    fn default() -> Self {
        Self {
            length_counter: false,
            envelope: false,
            length_index: LENGTH_LOAD,
        }
    }
}

impl HardwareMode {
    /// Apply an Exx parameter; `false` when out of range
    fn apply(&mut self, param: u8) -> bool {
        match param {
            0x00..=0x1F => self.length_index = param,
            0xE0..=0xE3 => {
                self.length_counter = param & 0x01 != 0;
                self.envelope = param & 0x02 != 0;
            }
            _ => return false,
        }
        true
    }

    /// Length register bits 3-7
    fn length_bits(self) -> u8 {
        self.length_index << 3
    }

    /// Bits 4-5 of the volume register
    fn control_bits(self) -> u8 {
        let mut bits = 0;
        if !self.length_counter {
            bits |= 0x20;
        }
        if !self.envelope {
            bits |= 0x10;
        }
        bits
    }
}

/// 2A03 or MMC5 pulse channel
#[derive(Debug)]
pub struct SquareHandler {
    core: ChannelCore,
    base: u16,
    has_sweep: bool,
    sweep: u8,
    sweep_pending: bool,
    mode: HardwareMode,
    last_hi: Option<u8>,
}

impl SquareHandler {
    /// Handler for one of the four pulse channels
    pub fn new(id: ChannelId) -> Self {
        let base = match id {
            ChannelId::Square2 => 0x4004,
            ChannelId::Mmc5Square1 => 0x5000,
            ChannelId::Mmc5Square2 => 0x5004,
            _ => 0x4000,
        };
        Self {
            core: ChannelCore::new(id, MAX_PERIOD_2A03, false),
            base,
            has_sweep: id.chip() == SoundChip::Apu,
            sweep: 0,
            sweep_pending: false,
            mode: HardwareMode::default(),
            last_hi: None,
        }
    }
}

impl ChannelHandler for SquareHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        match cmd.effect {
            Effect::SweepUp | Effect::SweepDown if self.has_sweep => {
                let rate = (cmd.param >> 4) & 0x07;
                let shift = cmd.param & 0x07;
                self.sweep = if shift == 0 {
                    0
                } else {
                    let negate = if cmd.effect == Effect::SweepUp { 0x08 } else { 0 };
                    0x80 | (rate << 4) | negate | shift
                };
                self.sweep_pending = true;
                true
            }
            Effect::Volume => self.mode.apply(cmd.param),
            _ => false,
        }
    }

    fn handle_note_on(&mut self, _note: u8) {
        if self.sweep != 0 {
            self.sweep_pending = true;
        }
    }

    fn reset_chip_state(&mut self) {
        self.sweep = 0;
        self.sweep_pending = false;
        self.mode = HardwareMode::default();
        self.last_hi = None;
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        let period = self.core.output_period();
        let volume = self.core.output_volume() as u8;
        let duty = self.core.duty() & 0x03;
        let lo = (period & 0xFF) as u8;
        let hi = ((period >> 8) & 0x07) as u8;

        apu.write(self.base, (duty << 6) | self.mode.control_bits() | volume);

        if self.sweep_pending {
            self.sweep_pending = false;
            if self.has_sweep {
                apu.write(self.base + 1, if self.sweep != 0 { self.sweep } else { 0x08 });
            }
            self.last_hi = None;
            if self.sweep != 0 {
                // The hardware sweep owns the period until the next note
                apu.write(self.base + 2, lo);
                apu.write(self.base + 3, hi | self.mode.length_bits());
                return;
            }
        } else if self.sweep != 0 {
            return;
        }

        if self.has_sweep && self.last_hi.is_none() {
            apu.write(self.base + 1, 0x08);
        }
        apu.write(self.base + 2, lo);
        let restart = self.core.new_note() && (self.mode.envelope || self.mode.length_counter);
        if self.last_hi != Some(hi) || restart {
            apu.write(self.base + 3, hi | self.mode.length_bits());
            self.last_hi = Some(hi);
        }
    }
}

/// 2A03 triangle channel
#[derive(Debug)]
pub struct TriangleHandler {
    core: ChannelCore,
    linear_counter: Option<u8>,
    last_hi: Option<u8>,
}

impl TriangleHandler {
    /// Triangle handler
    pub fn new() -> Self {
        Self {
            core: ChannelCore::new(ChannelId::Triangle, MAX_PERIOD_2A03, false),
            linear_counter: None,
            last_hi: None,
        }
    }
}

impl Default for TriangleHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHandler for TriangleHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        // Sxx with the high bit set drives the linear counter
        if cmd.effect == Effect::NoteCut && cmd.param >= 0x80 {
            self.linear_counter = Some(cmd.param & 0x7F);
            self.last_hi = None;
            return true;
        }
        false
    }

    fn handle_note_on(&mut self, _note: u8) {
        self.last_hi = None;
    }

    fn reset_chip_state(&mut self) {
        self.linear_counter = None;
        self.last_hi = None;
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        let period = self.core.output_period();
        let active = self.core.output_volume() > 0;
        let control = match (active, self.linear_counter) {
            (false, _) => 0x80,
            (true, Some(load)) => load,
            (true, None) => 0x81,
        };
        apu.write(0x4008, control);
        apu.write(0x400A, (period & 0xFF) as u8);
        let hi = ((period >> 8) & 0x07) as u8;
        if self.last_hi != Some(hi) {
            apu.write(0x400B, hi | (LENGTH_LOAD << 3));
            self.last_hi = Some(hi);
        }
    }
}

/// 2A03 noise channel
#[derive(Debug)]
pub struct NoiseHandler {
    core: ChannelCore,
    mode: HardwareMode,
}

impl NoiseHandler {
    /// Noise handler; its "period" is the 4-bit rate index
    pub fn new() -> Self {
        Self {
            core: ChannelCore::new(ChannelId::Noise, 0x0F, true),
            mode: HardwareMode::default(),
        }
    }
}

impl Default for NoiseHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHandler for NoiseHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        cmd.effect == Effect::Volume && self.mode.apply(cmd.param)
    }

    fn reset_chip_state(&mut self) {
        self.mode = HardwareMode::default();
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        let rate = self.core.output_period() & 0x0F;
        let volume = self.core.output_volume() as u8;
        let short_mode = (self.core.duty() & 0x01) << 7;
        apu.write(0x400C, self.mode.control_bits() | volume);
        apu.write(0x400E, short_mode | (0x0F - rate as u8));
        if self.core.new_note() {
            apu.write(0x400F, self.mode.length_bits());
        }
    }
}

/// Pending DPCM playback request
#[derive(Debug, Clone, PartialEq, Eq)]
enum DpcmCommand {
    Play(DpcmKey),
    Stop,
    Release,
}

/// 2A03 delta modulation channel
#[derive(Debug)]
pub struct DpcmHandler {
    core: ChannelCore,
    command: Option<DpcmCommand>,
    last_key: Option<DpcmKey>,
    dac: Option<u8>,
    offset: u8,
    pitch_override: Option<u8>,
    retrigger: u8,
    retrigger_counter: u8,
}

impl DpcmHandler {
    /// DPCM handler
    pub fn new() -> Self {
        Self {
            core: ChannelCore::new(ChannelId::Dpcm, 0x0F, true),
            command: None,
            last_key: None,
            dac: None,
            offset: 0,
            pitch_override: None,
            retrigger: 0,
            retrigger_counter: 0,
        }
    }

    fn start(&mut self, apu: &mut Apu, key: &DpcmKey) {
        let data = &key.sample.data;
        if data.is_empty() {
            return;
        }
        if let Some(Chip::Apu(chip)) = apu.chip_mut(SoundChip::Apu) {
            chip.load_sample_memory(DPCM_BASE_ADDRESS, data);
        }
        let pitch = self.pitch_override.unwrap_or(key.pitch) & 0x0F;
        let looping = if key.looping { 0x40 } else { 0 };
        let length = ((data.len() - 1) >> 4).min(0xFF) as u8;
        let offset = self.offset.min(length / 4);
        apu.write(0x4015, 0x0F);
        apu.write(0x4010, looping | pitch);
        if let Some(delta) = key.delta {
            apu.write(0x4011, delta & 0x7F);
        }
        apu.write(0x4012, offset);
        apu.write(0x4013, length - offset * 4);
        apu.write(0x4015, 0x1F);
    }
}

impl Default for DpcmHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHandler for DpcmHandler {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        &mut self.core
    }

    fn handle_chip_effect(&mut self, cmd: EffectCommand) -> bool {
        match cmd.effect {
            Effect::Dac => self.dac = Some(cmd.param & 0x7F),
            Effect::SampleOffset => self.offset = cmd.param,
            Effect::DpcmPitch => self.pitch_override = Some(cmd.param & 0x0F),
            Effect::Retrigger => {
                self.retrigger = cmd.param;
                self.retrigger_counter = cmd.param;
            }
            _ => return false,
        }
        true
    }

    fn load_instrument(&mut self, _instrument: &Instrument) {
        self.last_key = None;
    }

    fn handle_note_on(&mut self, note: u8) {
        let key = self
            .core
            .instrument()
            .and_then(|inst| inst.dpcm_key(note))
            .cloned();
        match key {
            Some(key) => {
                self.last_key = Some(key.clone());
                self.command = Some(DpcmCommand::Play(key));
            }
            None => {
                log::trace!("no DPCM sample on note {note}");
                self.command = Some(DpcmCommand::Stop);
            }
        }
        self.retrigger_counter = self.retrigger;
    }

    fn handle_cut(&mut self) {
        self.command = Some(DpcmCommand::Stop);
        self.retrigger = 0;
    }

    fn handle_release(&mut self) {
        self.command = Some(DpcmCommand::Release);
    }

    fn process_chip(&mut self) {
        if self.retrigger == 0 || self.command.is_some() {
            return;
        }
        self.retrigger_counter = self.retrigger_counter.saturating_sub(1);
        if self.retrigger_counter == 0 {
            self.retrigger_counter = self.retrigger;
            if let Some(key) = self.last_key.clone() {
                self.command = Some(DpcmCommand::Play(key));
            }
        }
    }

    fn reset_chip_state(&mut self) {
        *self = Self {
            core: self.core.clone(),
            ..Self::new()
        };
    }

    fn refresh_channel(&mut self, apu: &mut Apu, _shared: &mut ChipShared) {
        match self.command.take() {
            Some(DpcmCommand::Play(key)) => {
                self.start(apu, &key);
                self.offset = 0;
                self.pitch_override = None;
            }
            Some(DpcmCommand::Stop) => apu.write(0x4015, 0x0F),
            Some(DpcmCommand::Release) => {
                let pitch = self.last_key.as_ref().map_or(0, |k| k.pitch & 0x0F);
                apu.write(0x4010, pitch);
            }
            None => {}
        }
        if let Some(dac) = self.dac.take() {
            apu.write(0x4011, dac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::EngineConfig;
    use crate::module::{DpcmSample, InstrumentType};
    use crate::types::{Machine, PeriodTable};
    use std::sync::Arc;

    fn bus() -> Apu {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.write(0x4015, 0x0F);
        apu
    }

    #[test]
    fn square_note_sounds() {
        let mut apu = bus();
        let mut square = SquareHandler::new(ChannelId::Square1);
        square.set_note_table(table(PeriodTable::Ntsc));
        square.core_mut().trigger(48);
        square.refresh_channel(&mut apu, &mut ChipShared::default());
        apu.add_time(10_000);
        apu.end_frame();
        assert!(apu.mixer().delta_count(ChannelId::Square1) > 0);
        assert!(apu.freq(SoundChip::Apu, 0) > 100.0);
    }

    #[test]
    fn sweep_effect_builds_register() {
        let mut square = SquareHandler::new(ChannelId::Square1);
        assert!(square.handle_chip_effect(EffectCommand {
            effect: Effect::SweepUp,
            param: 0x23,
        }));
        assert_eq!(square.sweep, 0x80 | 0x20 | 0x08 | 0x03);
        let mut mmc5 = SquareHandler::new(ChannelId::Mmc5Square1);
        assert!(!mmc5.handle_chip_effect(EffectCommand {
            effect: Effect::SweepUp,
            param: 0x23,
        }));
    }

    #[test]
    fn volume_effect_selects_length_and_mode() {
        let mut mode = HardwareMode::default();
        assert_eq!(mode.control_bits(), 0x30);
        assert!(mode.apply(0xE3));
        assert_eq!(mode.control_bits(), 0x00);
        assert!(mode.apply(0x02));
        assert_eq!(mode.length_bits(), 0x10);
        assert!(!mode.apply(0x40));
    }

    #[test]
    fn silent_triangle_halts() {
        let mut apu = bus();
        let mut triangle = TriangleHandler::new();
        triangle.set_note_table(table(PeriodTable::Ntsc));
        triangle.refresh_channel(&mut apu, &mut ChipShared::default());
        apu.add_time(30_000);
        apu.end_frame();
        assert_eq!(apu.mixer().delta_count(ChannelId::Triangle), 0);
    }

    #[test]
    fn dpcm_note_plays_mapped_sample() {
        let mut apu = bus();
        let sample = Arc::new(DpcmSample {
            name: "snare".into(),
            data: vec![0x55; 33],
        });
        let mut inst = Instrument::new(InstrumentType::Apu, "drums");
        inst.set_dpcm_key(
            36,
            Some(DpcmKey {
                sample,
                pitch: 0x0F,
                looping: true,
                delta: Some(0x40),
            }),
        );
        let mut dpcm = DpcmHandler::new();
        dpcm.core_mut().set_instrument(0, Arc::new(inst));
        dpcm.core_mut().trigger(36);
        dpcm.handle_note_on(36);
        dpcm.refresh_channel(&mut apu, &mut ChipShared::default());
        apu.add_time(20_000);
        apu.end_frame();
        assert!(apu.mixer().delta_count(ChannelId::Dpcm) > 0);
    }
}
