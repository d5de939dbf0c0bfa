//! Delta mixer and output stage
//!
//! Chip models never produce samples directly. Each channel reports signed
//! changes of its DAC level at a cycle offset inside the current frame. The
//! mixer weights them with per-chip gain and the 2A03's non-linear DAC
//! curves, and at the end of every frame places each step on the output
//! sample its cycle offset falls into (no band-limiting).

use crate::apu::dc_filter::DcFilter;
use crate::config::ChipLevels;
use crate::types::{ChannelId, SoundChip, CHANNEL_COUNT};

/// Scale from mixer units to 16-bit PCM
const OUTPUT_SCALE: f32 = 32767.0;

// Per-unit weights of the expansion DACs, relative to a full 2A03 square (~0.15)
const VRC6_UNIT: f32 = 0.0096;
const MMC5_UNIT: f32 = 0.0095;
const MMC5_PCM_UNIT: f32 = 0.00057;
const N163_UNIT: f32 = 0.00064;
const FDS_UNIT: f32 = 0.000075;
const VRC7_UNIT: f32 = 0.000040;
const S5B_UNIT: f32 = 0.00065;

/// One weighted level change inside a frame
#[derive(Clone, Copy, Debug, PartialEq)]
struct MixEvent {
    time: u32,
    value: f32,
}

/// Non-linear pulse DAC of the 2A03 (both squares share it)
#[inline]
fn pulse_out(sum: i32) -> f32 {
    if sum <= 0 {
        0.0
    } else {
        95.88 / (8128.0 / sum as f32 + 100.0)
    }
}

/// Non-linear triangle/noise/DPCM DAC of the 2A03
#[inline]
fn tnd_out(triangle: i32, noise: i32, dpcm: i32) -> f32 {
    let weighted = triangle as f32 / 8227.0 + noise as f32 / 12241.0 + dpcm as f32 / 22638.0;
    if weighted <= 0.0 {
        0.0
    } else {
        159.79 / (1.0 / weighted + 100.0)
    }
}

/// Convert a level in dB to a linear gain factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Accumulates channel deltas and renders them to PCM
#[derive(Clone)]
pub struct Mixer {
    clock_rate: u32,
    sample_rate: u32,
    events: Vec<MixEvent>,
    channel_levels: [i32; CHANNEL_COUNT],
    delta_counts: [u32; CHANNEL_COUNT],
    pulse_level: f32,
    tnd_level: f32,
    apu1_gain: f32,
    apu2_gain: f32,
    chip_gains: [f32; SoundChip::ALL.len()],
    namco_volume: f32,
    master_volume: f32,
    output_level: f32,
    sample_carry: u64,
    dc_filter: Option<DcFilter>,
    samples: Vec<i16>,
}

impl Mixer {
    /// Create a mixer for a CPU clock and output rate
    pub fn new(clock_rate: u32, sample_rate: u32) -> Self {
        Self {
            clock_rate,
            sample_rate,
            events: Vec::with_capacity(4096),
            channel_levels: [0; CHANNEL_COUNT],
            delta_counts: [0; CHANNEL_COUNT],
            pulse_level: 0.0,
            tnd_level: 0.0,
            apu1_gain: 1.0,
            apu2_gain: 1.0,
            chip_gains: [1.0; SoundChip::ALL.len()],
            namco_volume: 1.0,
            master_volume: 1.0,
            output_level: 0.0,
            sample_carry: 0,
            dc_filter: Some(DcFilter::new()),
            samples: Vec::new(),
        }
    }

    /// Change the CPU clock (region switch)
    pub fn set_clock_rate(&mut self, clock_rate: u32) {
        self.clock_rate = clock_rate.max(1);
        self.sample_carry = 0;
    }

    /// Change the output sample rate
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.sample_carry = 0;
    }

    /// Output sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Apply per-chip levels in dB
    pub fn set_levels(&mut self, levels: &ChipLevels) {
        self.apu1_gain = db_to_gain(levels.apu1);
        self.apu2_gain = db_to_gain(levels.apu2);
        for chip in SoundChip::ALL {
            self.chip_gains[chip as usize] = db_to_gain(levels.level(chip));
        }
    }

    /// Set the linear master gain
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.max(0.0);
    }

    /// Enable or disable the DC blocker on the final mix
    pub fn set_dc_filter(&mut self, enabled: bool) {
        self.dc_filter = enabled.then(DcFilter::new);
    }

    /// Scale the Namco 163 output (depends on the number of active channels)
    #[inline]
    pub fn set_namco_volume(&mut self, volume: f32) {
        self.namco_volume = volume;
    }

    /// Current Namco 163 scale factor
    #[inline]
    pub fn namco_volume(&self) -> f32 {
        self.namco_volume
    }

    /// Add a signed level change for `channel` at `time` cycles into the frame
    pub fn add_value(&mut self, channel: ChannelId, delta: i32, time: u32) {
        if delta == 0 {
            return;
        }
        let idx = channel.index();
        self.channel_levels[idx] += delta;
        self.delta_counts[idx] += 1;

        let value = match channel {
            ChannelId::Square1 | ChannelId::Square2 => {
                let level = pulse_out(
                    self.channel_levels[ChannelId::Square1.index()]
                        + self.channel_levels[ChannelId::Square2.index()],
                ) * self.apu1_gain;
                let step = level - self.pulse_level;
                self.pulse_level = level;
                step
            }
            ChannelId::Triangle | ChannelId::Noise | ChannelId::Dpcm => {
                let level = tnd_out(
                    self.channel_levels[ChannelId::Triangle.index()],
                    self.channel_levels[ChannelId::Noise.index()],
                    self.channel_levels[ChannelId::Dpcm.index()],
                ) * self.apu2_gain;
                let step = level - self.tnd_level;
                self.tnd_level = level;
                step
            }
            _ => {
                let chip = channel.chip();
                let unit = match channel {
                    ChannelId::Mmc5Voice => MMC5_PCM_UNIT,
                    _ => match chip {
                        SoundChip::Vrc6 => VRC6_UNIT,
                        SoundChip::Mmc5 => MMC5_UNIT,
                        SoundChip::N163 => N163_UNIT * self.namco_volume,
                        SoundChip::Fds => FDS_UNIT,
                        SoundChip::Vrc7 => VRC7_UNIT,
                        SoundChip::S5b => S5B_UNIT,
                        SoundChip::Apu => 0.0,
                    },
                };
                delta as f32 * unit * self.chip_gains[chip as usize]
            }
        };

        if value != 0.0 {
            self.events.push(MixEvent { time, value });
        }
    }

    /// Current DAC level of a channel (raw chip units)
    #[inline]
    pub fn channel_level(&self, channel: ChannelId) -> i32 {
        self.channel_levels[channel.index()]
    }

    /// Number of deltas received for a channel since the last counter reset
    #[inline]
    pub fn delta_count(&self, channel: ChannelId) -> u32 {
        self.delta_counts[channel.index()]
    }

    /// Total number of deltas received since the last counter reset
    pub fn total_delta_count(&self) -> u32 {
        self.delta_counts.iter().sum()
    }

    /// Clear the per-channel delta counters
    pub fn reset_counters(&mut self) {
        self.delta_counts = [0; CHANNEL_COUNT];
    }

    /// Number of weighted events waiting for the end of the frame
    #[inline]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Resample the pending events of a `cycles` long frame into PCM
    ///
    /// Returns the number of samples appended to the output buffer.
    pub fn finish_frame(&mut self, cycles: u32) -> usize {
        let total = self.sample_carry + cycles as u64 * self.sample_rate as u64;
        let count = (total / self.clock_rate as u64) as usize;
        let start_carry = self.sample_carry;
        self.sample_carry = total % self.clock_rate as u64;

        if count == 0 {
            for event in self.events.drain(..) {
                self.output_level += event.value;
            }
            return 0;
        }

        let mut steps = vec![0.0f32; count];
        for event in self.events.drain(..) {
            let position =
                (start_carry + event.time as u64 * self.sample_rate as u64) / self.clock_rate as u64;
            steps[(position as usize).min(count - 1)] += event.value;
        }

        self.samples.reserve(count);
        for step in steps {
            self.output_level += step;
            let mut sample = (self.output_level * self.master_volume * OUTPUT_SCALE) as i32;
            if let Some(filter) = self.dc_filter.as_mut() {
                sample = filter.process(sample);
            }
            self.samples
                .push(sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }
        count
    }

    /// Rendered samples not yet taken
    #[inline]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Take all rendered samples
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    /// Drop events, levels and buffered output
    pub fn reset(&mut self) {
        self.events.clear();
        self.channel_levels = [0; CHANNEL_COUNT];
        self.delta_counts = [0; CHANNEL_COUNT];
        self.pulse_level = 0.0;
        self.tnd_level = 0.0;
        self.output_level = 0.0;
        self.sample_carry = 0;
        self.samples.clear();
        if let Some(filter) = self.dc_filter.as_mut() {
            filter.reset();
        }
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("clock_rate", &self.clock_rate)
            .field("sample_rate", &self.sample_rate)
            .field("pending_events", &self.events.len())
            .field("namco_volume", &self.namco_volume)
            .finish_non_exhaustive()
    }
}
