//! Sound chip type registry
//!
//! A [`SoundChipService`] maps chip ids to [`SoundChipType`] descriptors:
//! names, channel ranges and factories for the chip model and its chip
//! handler. The service is built once at startup and passed to whatever
//! needs it; registration mistakes are returned as errors immediately.

use std::collections::BTreeMap;

use crate::apu::Chip;
use crate::channel::ChipHandler;
use crate::error::{FamitoneError, Result};
use crate::types::{ChannelId, Machine, SoundChip};

/// Tracker channels provided by a built-in chip (N163 at its maximum)
pub fn builtin_channel_count(chip: SoundChip) -> usize {
    match chip {
        SoundChip::Apu => 5,
        SoundChip::Vrc6 => 3,
        SoundChip::Vrc7 => 6,
        SoundChip::Fds => 1,
        SoundChip::Mmc5 => 2,
        SoundChip::N163 => 8,
        SoundChip::S5b => 3,
    }
}

/// Descriptor of one chip type
pub trait SoundChipType: Send + Sync {
    /// Chip id; `None` marks an invalid descriptor
    fn chip(&self) -> Option<SoundChip>;

    /// First tracker channel of the chip
    fn first_channel(&self) -> ChannelId;

    /// Number of tracker channels
    fn channel_count(&self) -> usize;

    /// Short name, e.g. "VRC6"
    fn short_name(&self) -> &'static str;

    /// Full name, e.g. "Konami VRC6"
    fn full_name(&self) -> &'static str;

    /// Short name of channel `subindex`
    fn short_channel_name(&self, subindex: usize) -> &'static str;

    /// Full name of channel `subindex`
    fn full_channel_name(&self, subindex: usize) -> &'static str;

    /// Power-on chip model
    fn make_chip_model(&self, machine: Machine) -> Chip;

    /// Chip handler with one channel handler per channel
    fn make_chip_handler(&self) -> ChipHandler;
}

/// Descriptor for one of the chips emulated by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinChipType(pub SoundChip);

impl BuiltinChipType {
    fn channel_names(&self) -> &'static [(&'static str, &'static str)] {
        match self.0 {
            SoundChip::Apu => &[
                ("PU1", "Pulse 1"),
                ("PU2", "Pulse 2"),
                ("TRI", "Triangle"),
                ("NOI", "Noise"),
                ("DMC", "DPCM"),
            ],
            SoundChip::Vrc6 => &[("V1", "VRC6 Pulse 1"), ("V2", "VRC6 Pulse 2"), ("SAW", "Sawtooth")],
            SoundChip::Vrc7 => &[
                ("FM1", "FM Channel 1"),
                ("FM2", "FM Channel 2"),
                ("FM3", "FM Channel 3"),
                ("FM4", "FM Channel 4"),
                ("FM5", "FM Channel 5"),
                ("FM6", "FM Channel 6"),
            ],
            SoundChip::Fds => &[("FDS", "FDS")],
            SoundChip::Mmc5 => &[("PU3", "MMC5 Pulse 1"), ("PU4", "MMC5 Pulse 2")],
            SoundChip::N163 => &[
                ("N1", "Namco 1"),
                ("N2", "Namco 2"),
                ("N3", "Namco 3"),
                ("N4", "Namco 4"),
                ("N5", "Namco 5"),
                ("N6", "Namco 6"),
                ("N7", "Namco 7"),
                ("N8", "Namco 8"),
            ],
            SoundChip::S5b => &[("5B1", "5B Square 1"), ("5B2", "5B Square 2"), ("5B3", "5B Square 3")],
        }
    }
}

impl SoundChipType for BuiltinChipType {
    fn chip(&self) -> Option<SoundChip> {
        Some(self.0)
    }

    fn first_channel(&self) -> ChannelId {
        match self.0 {
            SoundChip::Apu => ChannelId::Square1,
            SoundChip::Vrc6 => ChannelId::Vrc6Pulse1,
            SoundChip::Vrc7 => ChannelId::Vrc7Ch1,
            SoundChip::Fds => ChannelId::Fds,
            SoundChip::Mmc5 => ChannelId::Mmc5Square1,
            SoundChip::N163 => ChannelId::N163Ch1,
            SoundChip::S5b => ChannelId::S5bCh1,
        }
    }

    fn channel_count(&self) -> usize {
        builtin_channel_count(self.0)
    }

    fn short_name(&self) -> &'static str {
        match self.0 {
            SoundChip::Apu => "2A03",
            SoundChip::Vrc6 => "VRC6",
            SoundChip::Vrc7 => "VRC7",
            SoundChip::Fds => "FDS",
            SoundChip::Mmc5 => "MMC5",
            SoundChip::N163 => "N163",
            SoundChip::S5b => "5B",
        }
    }

    fn full_name(&self) -> &'static str {
        match self.0 {
            SoundChip::Apu => "Nintendo 2A03",
            SoundChip::Vrc6 => "Konami VRC6",
            SoundChip::Vrc7 => "Konami VRC7",
            SoundChip::Fds => "Famicom Disk System",
            SoundChip::Mmc5 => "Nintendo MMC5",
            SoundChip::N163 => "Namco 163",
            SoundChip::S5b => "Sunsoft 5B",
        }
    }

    fn short_channel_name(&self, subindex: usize) -> &'static str {
        self.channel_names().get(subindex).map_or("", |n| n.0)
    }

    fn full_channel_name(&self, subindex: usize) -> &'static str {
        self.channel_names().get(subindex).map_or("", |n| n.1)
    }

    fn make_chip_model(&self, machine: Machine) -> Chip {
        Chip::new(self.0, machine)
    }

    fn make_chip_handler(&self) -> ChipHandler {
        ChipHandler::new(self.0)
    }
}

/// Registry of chip types
#[derive(Default)]
pub struct SoundChipService {
    types: BTreeMap<SoundChip, Box<dyn SoundChipType>>,
}

impl SoundChipService {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in chip
    pub fn with_default_types() -> Result<Self> {
        let mut service = Self::new();
        service.add_default_types()?;
        Ok(service)
    }

    /// Register a chip type
    ///
    /// # Errors
    ///
    /// [`FamitoneError::InvalidChip`] when the type has no id and
    /// [`FamitoneError::DuplicateChip`] when the id is already taken.
    pub fn add_type(&mut self, chip_type: Box<dyn SoundChipType>) -> Result<()> {
        let id = chip_type.chip().ok_or(FamitoneError::InvalidChip)?;
        if self.types.contains_key(&id) {
            return Err(FamitoneError::DuplicateChip(id));
        }
        self.types.insert(id, chip_type);
        Ok(())
    }

    /// Register all built-in chips
    pub fn add_default_types(&mut self) -> Result<()> {
        for chip in SoundChip::ALL {
            self.add_type(Box::new(BuiltinChipType(chip)))?;
        }
        Ok(())
    }

    /// Descriptor of `chip`
    pub fn get_type(&self, chip: SoundChip) -> Result<&dyn SoundChipType> {
        self.types
            .get(&chip)
            .map(|t| t.as_ref())
            .ok_or(FamitoneError::UnknownChip(chip))
    }

    /// Registered chips in canonical order
    pub fn chips(&self) -> impl Iterator<Item = SoundChip> + '_ {
        self.types.keys().copied()
    }

    /// Tracker channels of `chip`, 0 when unregistered
    pub fn supported_channel_count(&self, chip: SoundChip) -> usize {
        self.types.get(&chip).map_or(0, |t| t.channel_count())
    }

    fn owner(&self, channel: ChannelId) -> Option<(SoundChip, &dyn SoundChipType, usize)> {
        let id = channel.index();
        self.types.iter().find_map(|(&chip, t)| {
            let first = t.first_channel().index();
            (id >= first && id < first + t.channel_count())
                .then(|| (chip, t.as_ref(), id - first))
        })
    }

    /// Position of `channel` within its chip, `None` if no chip provides it
    pub fn channel_subindex(&self, channel: ChannelId) -> Option<usize> {
        self.owner(channel).map(|(_, _, sub)| sub)
    }

    /// Channel `subindex` of `chip`, `None` if out of range
    pub fn make_channel_index(&self, chip: SoundChip, subindex: usize) -> Option<ChannelId> {
        let t = self.types.get(&chip)?;
        if subindex >= t.channel_count() {
            return None;
        }
        ChannelId::from_index(t.first_channel().index() + subindex)
    }

    /// Short chip name
    pub fn short_chip_name(&self, chip: SoundChip) -> Result<&'static str> {
        Ok(self.get_type(chip)?.short_name())
    }

    /// Full chip name
    pub fn full_chip_name(&self, chip: SoundChip) -> Result<&'static str> {
        Ok(self.get_type(chip)?.full_name())
    }

    /// Short channel name
    pub fn short_channel_name(&self, channel: ChannelId) -> Result<&'static str> {
        let (_, t, sub) = self
            .owner(channel)
            .ok_or(FamitoneError::UnknownChip(channel.chip()))?;
        Ok(t.short_channel_name(sub))
    }

    /// Full channel name
    pub fn full_channel_name(&self, channel: ChannelId) -> Result<&'static str> {
        let (_, t, sub) = self
            .owner(channel)
            .ok_or(FamitoneError::UnknownChip(channel.chip()))?;
        Ok(t.full_channel_name(sub))
    }

    /// Chip providing `channel`, `None` if unregistered
    pub fn chip_from_channel(&self, channel: ChannelId) -> Option<SoundChip> {
        self.owner(channel).map(|(chip, _, _)| chip)
    }

    /// Chip whose short name is `name`
    pub fn chip_from_string(&self, name: &str) -> Option<SoundChip> {
        self.types
            .iter()
            .find(|(_, t)| t.short_name() == name)
            .map(|(&chip, _)| chip)
    }

    /// Power-on model of `chip`
    pub fn make_chip_model(&self, chip: SoundChip, machine: Machine) -> Result<Chip> {
        Ok(self.get_type(chip)?.make_chip_model(machine))
    }

    /// Chip handler of `chip`
    pub fn make_chip_handler(&self, chip: SoundChip) -> Result<ChipHandler> {
        Ok(self.get_type(chip)?.make_chip_handler())
    }
}

impl std::fmt::Debug for SoundChipService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundChipService")
            .field("chips", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apu::ChipModel;

    struct NoChip;

    impl SoundChipType for NoChip {
        fn chip(&self) -> Option<SoundChip> {
            None
        }
        fn first_channel(&self) -> ChannelId {
            ChannelId::Square1
        }
        fn channel_count(&self) -> usize {
            0
        }
        fn short_name(&self) -> &'static str {
            ""
        }
        fn full_name(&self) -> &'static str {
            ""
        }
        fn short_channel_name(&self, _: usize) -> &'static str {
            ""
        }
        fn full_channel_name(&self, _: usize) -> &'static str {
            ""
        }
        fn make_chip_model(&self, machine: Machine) -> Chip {
            Chip::new(SoundChip::Apu, machine)
        }
        fn make_chip_handler(&self) -> ChipHandler {
            ChipHandler::new(SoundChip::Apu)
        }
    }

    #[test]
    fn test_rejects_invalid_and_duplicate_types() {
        let mut service = SoundChipService::new();
        assert!(matches!(
            service.add_type(Box::new(NoChip)),
            Err(FamitoneError::InvalidChip)
        ));
        service.add_type(Box::new(BuiltinChipType(SoundChip::Vrc6))).unwrap();
        assert!(matches!(
            service.add_type(Box::new(BuiltinChipType(SoundChip::Vrc6))),
            Err(FamitoneError::DuplicateChip(SoundChip::Vrc6))
        ));
    }

    #[test]
    fn test_default_types_cover_every_chip() {
        let service = SoundChipService::with_default_types().unwrap();
        assert_eq!(service.chips().count(), SoundChip::ALL.len());
        assert!(SoundChipService::with_default_types()
            .and_then(|mut s| s.add_default_types())
            .is_err());
    }

    #[test]
    fn test_channel_index_round_trip() {
        let service = SoundChipService::with_default_types().unwrap();
        assert_eq!(service.channel_subindex(ChannelId::N163Ch3), Some(2));
        assert_eq!(
            service.make_channel_index(SoundChip::N163, 2),
            Some(ChannelId::N163Ch3)
        );
        assert_eq!(service.make_channel_index(SoundChip::Fds, 1), None);
        assert_eq!(service.channel_subindex(ChannelId::Mmc5Voice), None);
        assert_eq!(service.chip_from_channel(ChannelId::Vrc7Ch6), Some(SoundChip::Vrc7));
    }

    #[test]
    fn test_names() {
        let service = SoundChipService::with_default_types().unwrap();
        assert_eq!(service.short_chip_name(SoundChip::S5b).unwrap(), "5B");
        assert_eq!(service.full_chip_name(SoundChip::N163).unwrap(), "Namco 163");
        assert_eq!(service.short_channel_name(ChannelId::Triangle).unwrap(), "TRI");
        assert_eq!(service.full_channel_name(ChannelId::Vrc6Sawtooth).unwrap(), "Sawtooth");
        assert_eq!(service.chip_from_string("VRC7"), Some(SoundChip::Vrc7));
        assert_eq!(service.chip_from_string("SID"), None);
    }

    #[test]
    fn test_unregistered_chip_is_an_error() {
        let service = SoundChipService::new();
        assert!(matches!(
            service.make_chip_model(SoundChip::Fds, Machine::Ntsc),
            Err(FamitoneError::UnknownChip(SoundChip::Fds))
        ));
        assert!(service.short_channel_name(ChannelId::Fds).is_err());
        assert_eq!(service.supported_channel_count(SoundChip::Fds), 0);
    }

    #[test]
    fn test_factories_build_matching_chips() {
        let service = SoundChipService::with_default_types().unwrap();
        let chip = service.make_chip_model(SoundChip::N163, Machine::Pal).unwrap();
        assert_eq!(chip.model().id(), SoundChip::N163);
        let handler = service.make_chip_handler(SoundChip::S5b).unwrap();
        assert_eq!(handler.chip(), SoundChip::S5b);
        assert_eq!(handler.channel_count(), 3);
    }
}
