//! Per-chip owner of channel handlers
//!
//! A [`ChipHandler`] groups the channel handlers of one chip together with
//! register state that several of its channels write to (the 5B mixer, the
//! N163 channel count). It also knows how to put its chip into a playable
//! state after a reset.

use std::fmt;

use super::apu::{DpcmHandler, NoiseHandler, SquareHandler, TriangleHandler};
use super::fds::FdsHandler;
use super::n163::N163Handler;
use super::s5b::S5bHandler;
use super::vrc6::{SawtoothHandler, Vrc6PulseHandler};
use super::vrc7::Vrc7Handler;
use super::ChannelHandler;
use crate::apu::Apu;
use crate::chip_service::builtin_channel_count;
use crate::constants::MAX_CHANNELS_N163;
use crate::module::ModuleSource;
use crate::types::{ChannelId, SoundChip};

/// Sunsoft 5B port addresses
pub(crate) const S5B_ADDRESS: u16 = 0xC000;
pub(crate) const S5B_DATA: u16 = 0xE000;

/// Register state shared by the channels of one chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipShared {
    /// Active N163 channels
    pub n163_channels: usize,
    /// 5B register 7 under construction for this tick
    pub s5b_mixer: u8,
    /// Pending 5B noise period (register 6)
    pub s5b_noise: Option<u8>,
    /// Pending 5B envelope period (registers 11/12)
    pub s5b_envelope_period: Option<u16>,
    /// Pending 5B envelope shape (register 13)
    pub s5b_envelope_shape: Option<u8>,
}

impl Default for ChipShared {
    fn default() -> Self {
        Self {
            n163_channels: 1,
            s5b_mixer: 0x3F,
            s5b_noise: None,
            s5b_envelope_period: None,
            s5b_envelope_shape: None,
        }
    }
}

/// Channel handlers of one chip
pub struct ChipHandler {
    chip: SoundChip,
    channels: Vec<Box<dyn ChannelHandler>>,
    shared: ChipShared,
}

impl ChipHandler {
    /// Handlers for every channel `chip` provides
    pub fn new(chip: SoundChip) -> Self {
        let channels: Vec<Box<dyn ChannelHandler>> = match chip {
            SoundChip::Apu => vec![
                Box::new(SquareHandler::new(ChannelId::Square1)),
                Box::new(SquareHandler::new(ChannelId::Square2)),
                Box::new(TriangleHandler::new()),
                Box::new(NoiseHandler::new()),
                Box::new(DpcmHandler::new()),
            ],
            SoundChip::Vrc6 => vec![
                Box::new(Vrc6PulseHandler::new(ChannelId::Vrc6Pulse1)),
                Box::new(Vrc6PulseHandler::new(ChannelId::Vrc6Pulse2)),
                Box::new(SawtoothHandler::new()),
            ],
            SoundChip::Vrc7 => (0..builtin_channel_count(chip))
                .map(|i| Box::new(Vrc7Handler::new(i)) as Box<dyn ChannelHandler>)
                .collect(),
            SoundChip::Fds => vec![Box::new(FdsHandler::new())],
            SoundChip::Mmc5 => vec![
                Box::new(SquareHandler::new(ChannelId::Mmc5Square1)),
                Box::new(SquareHandler::new(ChannelId::Mmc5Square2)),
            ],
            SoundChip::N163 => (0..MAX_CHANNELS_N163)
                .map(|i| Box::new(N163Handler::new(i)) as Box<dyn ChannelHandler>)
                .collect(),
            SoundChip::S5b => (0..builtin_channel_count(chip))
                .map(|i| Box::new(S5bHandler::new(i)) as Box<dyn ChannelHandler>)
                .collect(),
        };
        Self {
            chip,
            channels,
            shared: ChipShared::default(),
        }
    }

    /// Chip driven by these handlers
    #[inline]
    pub fn chip(&self) -> SoundChip {
        self.chip
    }

    /// Number of channel handlers
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Shared register state
    #[inline]
    pub fn shared(&self) -> &ChipShared {
        &self.shared
    }

    /// Handler for `channel`, if it belongs to this chip
    pub fn channel(&self, channel: ChannelId) -> Option<&dyn ChannelHandler> {
        self.channels
            .iter()
            .find(|h| h.channel_id() == channel)
            .map(|h| h.as_ref())
    }

    /// Handler for `channel` together with the shared state
    pub fn parts_mut(
        &mut self,
        channel: ChannelId,
    ) -> Option<(&mut dyn ChannelHandler, &mut ChipShared)> {
        for handler in &mut self.channels {
            if handler.channel_id() == channel {
                return Some((handler.as_mut(), &mut self.shared));
            }
        }
        None
    }

    /// Run `f` on every channel handler
    pub fn visit_channel_handlers(&mut self, mut f: impl FnMut(&mut dyn ChannelHandler)) {
        for handler in &mut self.channels {
            f(handler.as_mut());
        }
    }

    /// Apply module settings to the chip and its channels
    pub fn configure_document(&mut self, module: &dyn ModuleSource) {
        if self.chip == SoundChip::N163 {
            self.shared.n163_channels = module.namco_channels().clamp(1, MAX_CHANNELS_N163);
        }
        for handler in &mut self.channels {
            handler.configure_document(module);
        }
    }

    /// Put the chip into its playing state
    pub fn reset_chip(&mut self, apu: &mut Apu) {
        let n163 = self.shared.n163_channels;
        self.shared = ChipShared {
            n163_channels: n163,
            ..ChipShared::default()
        };
        match self.chip {
            SoundChip::Apu => {
                apu.write(0x4015, 0x0F);
                apu.write(0x4017, 0x40);
            }
            SoundChip::Vrc6 => apu.write(0x9003, 0x00),
            SoundChip::Fds => {
                apu.write(0x4089, 0x00);
                apu.write(0x4080, 0x80);
                apu.write(0x4087, 0x80);
                apu.write(0x408A, 0xE8);
            }
            SoundChip::Mmc5 => apu.write(0x5015, 0x03),
            SoundChip::S5b => {
                apu.write(S5B_ADDRESS, 0x07);
                apu.write(S5B_DATA, 0x3F);
            }
            SoundChip::N163 => {
                apu.write(0xF800, 0x7F);
                apu.write(0x4800, ((n163 - 1) as u8) << 4);
            }
            SoundChip::Vrc7 => {}
        }
        for handler in &mut self.channels {
            handler.reset_channel();
        }
        log::debug!("{:?}: chip reset", self.chip);
    }

    /// Called before the channels of this tick are refreshed
    pub fn refresh_before(&mut self, _apu: &mut Apu) {
        if self.chip == SoundChip::S5b {
            self.shared.s5b_mixer = 0x3F;
        }
    }

    /// Called after every channel was refreshed
    pub fn refresh_after(&mut self, apu: &mut Apu) {
        if self.chip != SoundChip::S5b {
            return;
        }
        let mut write = |reg: u8, value: u8| {
            apu.write(S5B_ADDRESS, reg);
            apu.write(S5B_DATA, value);
        };
        if let Some(period) = self.shared.s5b_noise.take() {
            write(0x06, period & 0x1F);
        }
        if let Some(period) = self.shared.s5b_envelope_period.take() {
            write(0x0B, (period & 0xFF) as u8);
            write(0x0C, (period >> 8) as u8);
        }
        if let Some(shape) = self.shared.s5b_envelope_shape.take() {
            write(0x0D, shape & 0x0F);
        }
        write(0x07, self.shared.s5b_mixer);
    }
}

impl fmt::Debug for ChipHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChipHandler")
            .field("chip", &self.chip)
            .field("channels", &self.channels.len())
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}
