//! Sound chip emulation and the CPU-side sound bus
//!
//! Every chip implements [`ChipModel`]: it decodes register writes, advances
//! its oscillators by an exact number of CPU cycles and reports level changes
//! to the shared [`Mixer`]. The [`Apu`] owns one model per enabled chip,
//! broadcasts bus writes to them and closes audio frames.
//!
//! Writes are applied at the cycle position reached so far: callers add time
//! with [`Apu::add_time`], and any pending time is run before the next write
//! lands, so register changes take effect at the right point of the frame.

pub mod apu2a03;
pub mod dc_filter;
pub mod fds;
pub mod mixer;
pub mod mmc5;
pub mod n163;
pub mod register_log;
pub mod s5b;
pub mod square;
pub mod vrc6;
pub mod vrc7;

pub use apu2a03::Apu2A03;
pub use fds::Fds;
pub use mixer::Mixer;
pub use mmc5::Mmc5;
pub use n163::N163;
pub use register_log::{RegisterLog, RegisterSink, RegisterWrite};
pub use s5b::S5b;
pub use vrc6::Vrc6;
pub use vrc7::Vrc7;

use crate::config::EngineConfig;
use crate::types::{ChannelId, Machine, SoundChip, SoundChipSet};

/// Register-level model of one sound chip
pub trait ChipModel {
    /// Chip identity
    fn id(&self) -> SoundChip;

    /// Return to power-on state
    fn reset(&mut self);

    /// Whether `address` belongs to this chip's register map
    fn maps(&self, address: u16) -> bool;

    /// Apply one register write; unmapped addresses are ignored
    fn write(&mut self, address: u16, value: u8);

    /// Read a register, `None` when the address is not mapped
    fn read(&mut self, address: u16) -> Option<u8>;

    /// Advance by exactly `time` CPU cycles, reporting level changes
    fn process(&mut self, time: u32, mixer: &mut Mixer);

    /// Close the current frame; timestamps restart from zero afterwards
    fn end_frame(&mut self);

    /// Output frequency of a channel in Hz, 0.0 when silent or out of range
    fn freq(&self, channel: usize) -> f64;

    /// Record internal state that does not travel over the bus
    fn log_frame_state(&mut self, _sink: &mut dyn RegisterSink) {}
}

/// Coalescing output of one channel DAC
///
/// Only changes of the level reach the mixer.
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    id: ChannelId,
    last_value: i32,
}

impl ChannelOutput {
    /// Output tagged with `id`
    pub fn new(id: ChannelId) -> Self {
        Self { id, last_value: 0 }
    }

    /// Channel tag
    #[inline]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Last level sent to the mixer
    #[inline]
    pub fn value(&self) -> i32 {
        self.last_value
    }

    /// Set the level at `time`
    #[inline]
    pub fn mix(&mut self, mixer: &mut Mixer, value: i32, time: u32) {
        if value != self.last_value {
            mixer.add_value(self.id, value - self.last_value, time);
            self.last_value = value;
        }
    }

    /// Forget the last level (the mixer is reset alongside)
    #[inline]
    pub fn reset(&mut self) {
        self.last_value = 0;
    }
}

/// One emulated chip
#[derive(Debug)]
pub enum Chip {
    /// 2A03/2A07
    Apu(Apu2A03),
    /// Konami VRC6
    Vrc6(Vrc6),
    /// Konami VRC7
    Vrc7(Vrc7),
    /// Famicom Disk System
    Fds(Fds),
    /// Nintendo MMC5
    Mmc5(Mmc5),
    /// Namco 163
    N163(N163),
    /// Sunsoft 5B
    S5b(S5b),
}

impl Chip {
    /// Power-on model of `chip` for a region
    pub fn new(chip: SoundChip, machine: Machine) -> Self {
        match chip {
            SoundChip::Apu => Chip::Apu(Apu2A03::new(machine)),
            SoundChip::Vrc6 => Chip::Vrc6(Vrc6::new()),
            SoundChip::Vrc7 => Chip::Vrc7(Vrc7::new()),
            SoundChip::Fds => Chip::Fds(Fds::new()),
            SoundChip::Mmc5 => Chip::Mmc5(Mmc5::new()),
            SoundChip::N163 => Chip::N163(N163::new()),
            SoundChip::S5b => Chip::S5b(S5b::new()),
        }
    }

    /// Dynamic view of the model
    pub fn model(&self) -> &dyn ChipModel {
        match self {
            Chip::Apu(c) => c,
            Chip::Vrc6(c) => c,
            Chip::Vrc7(c) => c,
            Chip::Fds(c) => c,
            Chip::Mmc5(c) => c,
            Chip::N163(c) => c,
            Chip::S5b(c) => c,
        }
    }

    /// Mutable dynamic view of the model
    pub fn model_mut(&mut self) -> &mut dyn ChipModel {
        match self {
            Chip::Apu(c) => c,
            Chip::Vrc6(c) => c,
            Chip::Vrc7(c) => c,
            Chip::Fds(c) => c,
            Chip::Mmc5(c) => c,
            Chip::N163(c) => c,
            Chip::S5b(c) => c,
        }
    }
}

/// CPU-side sound bus: chip models, mixer and optional register log
pub struct Apu {
    machine: Machine,
    chips: Vec<Chip>,
    mixer: Mixer,
    cycles_to_run: u32,
    frame_cycles: u32,
    sink: Option<Box<dyn RegisterSink>>,
}

impl Apu {
    /// Bus with only the internal APU
    pub fn new(machine: Machine, config: &EngineConfig) -> Self {
        let mut mixer = Mixer::new(machine.master_clock(), config.sample_rate);
        mixer.set_levels(&config.levels);
        mixer.set_master_volume(config.master_volume);
        mixer.set_dc_filter(config.dc_filter);
        let mut apu = Self {
            machine,
            chips: vec![Chip::new(SoundChip::Apu, machine)],
            mixer,
            cycles_to_run: 0,
            frame_cycles: 0,
            sink: None,
        };
        apu.set_mixing_method(config.n163_legacy_mixing);
        apu
    }

    /// Emulated region
    #[inline]
    pub fn machine(&self) -> Machine {
        self.machine
    }

    /// Switch region; chips are rebuilt and the mixer retimed
    pub fn set_machine(&mut self, machine: Machine) {
        if machine != self.machine {
            self.machine = machine;
            self.mixer.set_clock_rate(machine.master_clock());
            let set = self.chip_set();
            self.set_chips(set);
        }
    }

    /// Install the chips of `set`; the 2A03 is always present
    pub fn set_chips(&mut self, set: SoundChipSet) {
        let legacy = self.legacy_mixing();
        self.chips = (set | SoundChipSet::APU)
            .chips()
            .map(|chip| Chip::new(chip, self.machine))
            .collect();
        self.cycles_to_run = 0;
        self.frame_cycles = 0;
        self.set_mixing_method(legacy);
        self.mixer.reset();
        log::debug!("sound bus chips: {:?}", set | SoundChipSet::APU);
    }

    /// Chips currently on the bus
    pub fn chip_set(&self) -> SoundChipSet {
        self.chips
            .iter()
            .fold(SoundChipSet::empty(), |set, c| set | c.model().id().flag())
    }

    /// Model of `chip`, if installed
    pub fn chip(&self, chip: SoundChip) -> Option<&Chip> {
        self.chips.iter().find(|c| c.model().id() == chip)
    }

    /// Mutable model of `chip`, if installed
    pub fn chip_mut(&mut self, chip: SoundChip) -> Option<&mut Chip> {
        self.chips.iter_mut().find(|c| c.model().id() == chip)
    }

    /// Reset every chip and drop buffered output
    pub fn reset(&mut self) {
        for chip in &mut self.chips {
            chip.model_mut().reset();
        }
        self.mixer.reset();
        self.cycles_to_run = 0;
        self.frame_cycles = 0;
    }

    /// Queue `cycles` of emulation, run lazily on the next write or frame end
    #[inline]
    pub fn add_time(&mut self, cycles: u32) {
        self.cycles_to_run += cycles;
    }

    /// Run all queued cycles
    pub fn process(&mut self) {
        let time = std::mem::take(&mut self.cycles_to_run);
        if time == 0 {
            return;
        }
        for chip in &mut self.chips {
            chip.model_mut().process(time, &mut self.mixer);
        }
        self.frame_cycles += time;
    }

    /// Broadcast a bus write to every chip mapping `address`
    pub fn write(&mut self, address: u16, value: u8) {
        self.process();
        for chip in &mut self.chips {
            let model = chip.model_mut();
            if model.maps(address) {
                model.write(address, value);
                if let Some(sink) = self.sink.as_mut() {
                    sink.record(model.id(), address, value);
                }
            }
        }
    }

    /// Read from the first chip mapping `address`, `None` for open bus
    pub fn read(&mut self, address: u16) -> Option<u8> {
        self.process();
        self.chips
            .iter_mut()
            .find_map(|chip| chip.model_mut().read(address))
    }

    /// Finish the frame and resample it; returns the number of new samples
    pub fn end_frame(&mut self) -> usize {
        self.process();
        for chip in &mut self.chips {
            let model = chip.model_mut();
            if let Some(sink) = self.sink.as_mut() {
                model.log_frame_state(sink.as_mut());
            }
            model.end_frame();
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.end_frame();
        }
        let cycles = std::mem::take(&mut self.frame_cycles);
        self.mixer.finish_frame(cycles)
    }

    /// Cycles emulated so far in the current frame
    #[inline]
    pub fn frame_cycles(&self) -> u32 {
        self.frame_cycles + self.cycles_to_run
    }

    /// Select N163 mixing: `true` for the legacy all-channel mixer
    pub fn set_mixing_method(&mut self, legacy: bool) {
        self.process();
        for chip in &mut self.chips {
            if let Chip::N163(n163) = chip {
                n163.set_mixing_method(legacy, &mut self.mixer);
            }
        }
    }

    fn legacy_mixing(&self) -> bool {
        matches!(self.chip(SoundChip::N163), Some(Chip::N163(n)) if n.legacy_mixing())
    }

    /// Apply output settings from a configuration
    pub fn configure(&mut self, config: &EngineConfig) {
        self.mixer.set_sample_rate(config.sample_rate);
        self.mixer.set_levels(&config.levels);
        self.mixer.set_master_volume(config.master_volume);
        self.mixer.set_dc_filter(config.dc_filter);
        self.set_mixing_method(config.n163_legacy_mixing);
    }

    /// Frequency of a channel for meters, 0.0 when the chip is absent
    pub fn freq(&self, chip: SoundChip, channel: usize) -> f64 {
        self.chip(chip).map_or(0.0, |c| c.model().freq(channel))
    }

    /// Attach or detach the register-write observer
    pub fn set_register_sink(&mut self, sink: Option<Box<dyn RegisterSink>>) {
        self.sink = sink;
    }

    /// Detach and return the register-write observer
    pub fn take_register_sink(&mut self) -> Option<Box<dyn RegisterSink>> {
        self.sink.take()
    }

    /// Mixer access
    #[inline]
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Mutable mixer access
    #[inline]
    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }
}

impl std::fmt::Debug for Apu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Apu")
            .field("machine", &self.machine)
            .field("chips", &self.chip_set())
            .field("frame_cycles", &self.frame_cycles)
            .field("logging", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_chips() -> Apu {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::all());
        apu
    }

    #[test]
    fn test_apu_always_present() {
        let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
        apu.set_chips(SoundChipSet::VRC6);
        assert!(apu.chip_set().has(SoundChip::Apu));
        assert!(apu.chip_set().has(SoundChip::Vrc6));
        assert!(apu.chip(SoundChip::N163).is_none());
    }

    #[test]
    fn test_unmapped_read_is_open_bus() {
        let mut apu = all_chips();
        assert_eq!(apu.read(0x6000), None);
        assert!(apu.read(0x4015).is_some());
    }

    #[test]
    fn test_fresh_reset_is_silent() {
        let mut apu = all_chips();
        apu.reset();
        apu.add_time(100_000);
        apu.end_frame();
        assert_eq!(apu.mixer().total_delta_count(), 0);
    }

    #[test]
    fn test_writes_without_time_emit_nothing() {
        let mut apu = all_chips();
        apu.write(0x4015, 0x0F);
        apu.write(0x4000, 0xBF);
        apu.write(0x4002, 0xFD);
        apu.write(0x4003, 0x00);
        apu.write(0x9000, 0x7F);
        apu.write(0x9002, 0x80);
        apu.process();
        assert_eq!(apu.mixer().total_delta_count(), 0);
        apu.add_time(2000);
        apu.process();
        assert!(apu.mixer().delta_count(ChannelId::Square1) > 0);
    }

    #[test]
    fn test_register_sink_sees_mapped_writes_only() {
        let mut apu = all_chips();
        apu.set_register_sink(Some(Box::new(RegisterLog::new())));
        apu.write(0x4000, 0x30);
        apu.write(0x1234, 0x55);
        let sink = apu.take_register_sink().unwrap();
        let log = sink.as_any().downcast_ref::<RegisterLog>().unwrap();
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].address, 0x4000);
    }
}
