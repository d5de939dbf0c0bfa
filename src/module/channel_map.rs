//! Channel order and chip/channel availability

use crate::chip_service::builtin_channel_count;
use crate::constants::MAX_CHANNELS_N163;
use crate::types::{ChannelId, SoundChip, SoundChipSet};

/// Ordered, possibly sparse set of channels used by a module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOrder {
    channels: Vec<ChannelId>,
}

impl ChannelOrder {
    /// Empty order
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `channel`; returns `false` if it was already present
    pub fn add_channel(&mut self, channel: ChannelId) -> bool {
        if self.has_channel(channel) {
            return false;
        }
        self.channels.push(channel);
        true
    }

    /// Remove `channel`; returns `false` if it was absent
    pub fn remove_channel(&mut self, channel: ChannelId) -> bool {
        let before = self.channels.len();
        self.channels.retain(|&c| c != channel);
        self.channels.len() != before
    }

    /// Whether `channel` is in the order
    pub fn has_channel(&self, channel: ChannelId) -> bool {
        self.channels.contains(&channel)
    }

    /// Position of `channel`
    pub fn index_of(&self, channel: ChannelId) -> Option<usize> {
        self.channels.iter().position(|&c| c == channel)
    }

    /// Channel at `index`
    pub fn get(&self, index: usize) -> Option<ChannelId> {
        self.channels.get(index).copied()
    }

    /// Number of channels
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is present
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in order
    pub fn iter(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().copied()
    }

    /// Run `f` on every channel in order
    pub fn foreach_channel(&self, mut f: impl FnMut(ChannelId)) {
        for &channel in &self.channels {
            f(channel);
        }
    }
}

impl FromIterator<ChannelId> for ChannelOrder {
    fn from_iter<I: IntoIterator<Item = ChannelId>>(iter: I) -> Self {
        let mut order = ChannelOrder::new();
        for channel in iter {
            order.add_channel(channel);
        }
        order
    }
}

/// Chips of a cartridge together with the channel order they provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    chips: SoundChipSet,
    n163_channels: usize,
    order: ChannelOrder,
}

impl ChannelMap {
    /// Map for `chips`; the 2A03 is always present
    pub fn new(chips: SoundChipSet, n163_channels: usize) -> Self {
        let n163_channels = if chips.has(SoundChip::N163) {
            n163_channels.clamp(1, MAX_CHANNELS_N163)
        } else {
            0
        };
        Self {
            chips: chips | SoundChipSet::APU,
            n163_channels,
            order: ChannelOrder::new(),
        }
    }

    /// Whether a channel can exist on this cartridge
    pub fn supports_channel(&self, channel: ChannelId) -> bool {
        let chip = channel.chip();
        if !self.chips.has(chip) {
            return false;
        }
        let first = ChannelId::ALL
            .iter()
            .position(|c| c.chip() == chip)
            .unwrap_or(0);
        let sub = channel.index() - first;
        let count = match chip {
            SoundChip::N163 => self.n163_channels,
            _ => builtin_channel_count(chip),
        };
        sub < count
    }

    /// Chips on the cartridge
    #[inline]
    pub fn chips(&self) -> SoundChipSet {
        self.chips
    }

    /// Active N163 channels
    #[inline]
    pub fn n163_channels(&self) -> usize {
        self.n163_channels
    }

    /// Channel order
    #[inline]
    pub fn channel_order(&self) -> &ChannelOrder {
        &self.order
    }

    /// Mutable channel order
    #[inline]
    pub fn channel_order_mut(&mut self) -> &mut ChannelOrder {
        &mut self.order
    }

    /// Consume the map, keeping the order
    pub fn into_order(self) -> ChannelOrder {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_rejects_duplicates() {
        let mut order = ChannelOrder::new();
        assert!(order.add_channel(ChannelId::Square1));
        assert!(!order.add_channel(ChannelId::Square1));
        assert!(order.add_channel(ChannelId::Noise));
        assert_eq!(order.index_of(ChannelId::Noise), Some(1));
        assert!(order.remove_channel(ChannelId::Square1));
        assert_eq!(order.get(0), Some(ChannelId::Noise));
    }

    #[test]
    fn n163_support_follows_channel_count() {
        let map = ChannelMap::new(SoundChipSet::N163, 4);
        assert!(map.supports_channel(ChannelId::Square1));
        assert!(map.supports_channel(ChannelId::N163Ch4));
        assert!(!map.supports_channel(ChannelId::N163Ch5));
        assert!(!map.supports_channel(ChannelId::Vrc6Pulse1));
    }

    #[test]
    fn mmc5_pcm_is_not_a_tracker_channel() {
        let map = ChannelMap::new(SoundChipSet::MMC5, 0);
        assert!(map.supports_channel(ChannelId::Mmc5Square2));
        assert!(!map.supports_channel(ChannelId::Mmc5Voice));
    }
}
