//! Register-write observation
//!
//! The bus reports every decoded write to an optional [`RegisterSink`].
//! [`RegisterLog`] keeps them in memory as a replayable trace.

use std::any::Any;

use crate::types::SoundChip;

/// Observer of chip register writes
pub trait RegisterSink: Send {
    /// One write to `chip`
    ///
    /// `address` is the bus address, except for state a chip reports from
    /// [`ChipModel::log_frame_state`](super::ChipModel::log_frame_state),
    /// which uses the chip's internal register index.
    fn record(&mut self, chip: SoundChip, address: u16, value: u8);

    /// Called after every chip has closed the frame
    fn end_frame(&mut self) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

/// One logged write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Frame the write happened in
    pub frame: u32,
    /// Target chip
    pub chip: SoundChip,
    /// Bus address or internal register index
    pub address: u16,
    /// Written value
    pub value: u8,
}

/// In-memory register trace
#[derive(Debug, Clone, Default)]
pub struct RegisterLog {
    frame: u32,
    entries: Vec<RegisterWrite>,
}

impl RegisterLog {
    /// Empty log starting at frame 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame number
    #[inline]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// All writes recorded so far
    pub fn entries(&self) -> &[RegisterWrite] {
        &self.entries
    }

    /// Writes recorded in `frame`
    pub fn frame_entries(&self, frame: u32) -> impl Iterator<Item = &RegisterWrite> {
        self.entries.iter().filter(move |w| w.frame == frame)
    }

    /// Drop all writes and restart at frame 0
    pub fn clear(&mut self) {
        self.frame = 0;
        self.entries.clear();
    }
}

impl RegisterSink for RegisterLog {
    fn record(&mut self, chip: SoundChip, address: u16, value: u8) {
        self.entries.push(RegisterWrite {
            frame: self.frame,
            chip,
            address,
            value,
        });
    }

    fn end_frame(&mut self) {
        self.frame += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_partition_entries() {
        let mut log = RegisterLog::new();
        log.record(SoundChip::Apu, 0x4000, 1);
        log.end_frame();
        log.record(SoundChip::Vrc6, 0x9000, 2);
        log.record(SoundChip::Vrc6, 0x9001, 3);
        assert_eq!(log.frame_entries(0).count(), 1);
        assert_eq!(log.frame_entries(1).count(), 2);
        assert_eq!(log.frame(), 1);
    }
}
