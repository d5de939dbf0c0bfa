//! DC offset removal for the final mix
//!
//! The 2A03 DACs only ever output positive levels and most expansion chips
//! idle at a non-zero level, so the raw mix sits on a moving offset. The
//! filter subtracts a running average of recent samples.

/// History buffer size (2048 samples, ~46ms at 44.1kHz)
const HISTORY_SIZE_BITS: usize = 11;
const HISTORY_SIZE: usize = 1 << HISTORY_SIZE_BITS;

/// Running-average DC blocker over signed mixer samples
#[derive(Clone)]
pub struct DcFilter {
    buffer: Box<[i32; HISTORY_SIZE]>,
    position: usize,
    running_sum: i64,
}

impl DcFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self {
            buffer: Box::new([0; HISTORY_SIZE]),
            position: 0,
            running_sum: 0,
        }
    }

    /// Feed one sample and return it with the current offset removed
    #[inline]
    pub fn process(&mut self, sample: i32) -> i32 {
        self.running_sum -= self.buffer[self.position] as i64;
        self.running_sum += sample as i64;
        self.buffer[self.position] = sample;
        self.position = (self.position + 1) & (HISTORY_SIZE - 1);

        let dc_offset = self.running_sum >> HISTORY_SIZE_BITS;
        (sample as i64 - dc_offset) as i32
    }

    /// Clear the history
    pub fn reset(&mut self) {
        self.buffer.fill(0);
        self.position = 0;
        self.running_sum = 0;
    }
}

impl Default for DcFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DcFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcFilter")
            .field("position", &self.position)
            .field("running_sum", &self.running_sum)
            .finish_non_exhaustive()
    }
}
