//! Instruments
//!
//! An instrument is a kind tag, up to five sequences and the chip-specific
//! payload (FM patch, FDS wave and modulation table, N163 waves, DPCM key
//! map). Instruments are shared read-only between the module and the channel
//! handlers through `Arc`.

use std::sync::Arc;

use super::sequence::{Sequence, SequenceType};
use crate::constants::NOTE_COUNT;

/// Instrument families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentType {
    /// 2A03/MMC5 instrument (with DPCM key map)
    Apu,
    /// VRC6 instrument
    Vrc6,
    /// VRC7 FM patch
    Vrc7,
    /// FDS wavetable instrument
    Fds,
    /// N163 wavetable instrument
    N163,
    /// Sunsoft 5B instrument
    S5b,
}

/// A DPCM sample
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DpcmSample {
    /// Sample name
    pub name: String,
    /// 1-bit delta encoded data
    pub data: Vec<u8>,
}

/// DPCM sample bound to one note of a 2A03 instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpcmKey {
    /// Sample to play
    pub sample: Arc<DpcmSample>,
    /// Rate index (0-15)
    pub pitch: u8,
    /// Loop the sample
    pub looping: bool,
    /// Initial DAC value, if set
    pub delta: Option<u8>,
}

/// Chip-specific instrument payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentData {
    /// Sequences only
    Basic,
    /// 2A03 instrument with per-note DPCM assignments
    Apu {
        /// Sample assignment for each note
        dpcm: Vec<Option<DpcmKey>>,
    },
    /// VRC7 FM patch
    Vrc7 {
        /// Built-in patch number, 0 selects `custom`
        patch: u8,
        /// User patch bytes
        custom: [u8; 8],
    },
    /// FDS wave and modulator settings
    Fds {
        /// 64-entry 6-bit waveform
        wave: [u8; 64],
        /// 32-entry modulation table (0-7)
        mod_table: [u8; 32],
        /// Modulator frequency
        mod_speed: u16,
        /// Modulator depth (0-63)
        mod_depth: u8,
        /// Ticks before modulation starts
        mod_delay: u8,
    },
    /// N163 waves
    N163 {
        /// Wave samples (4-bit) per wave index
        waves: Vec<Vec<u8>>,
        /// Wave size in samples
        wave_size: u8,
        /// Position of the wave in N163 RAM (in samples)
        wave_position: u8,
    },
}

/// An instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    /// Instrument name
    pub name: String,
    /// Family
    pub kind: InstrumentType,
    /// Sequences by [`SequenceType::index`]
    pub sequences: [Option<Arc<Sequence>>; SequenceType::COUNT],
    /// Chip-specific data
    pub data: InstrumentData,
}

impl Instrument {
    /// Instrument of `kind` with no sequences and default payload
    pub fn new(kind: InstrumentType, name: impl Into<String>) -> Self {
        let data = match kind {
            InstrumentType::Apu => InstrumentData::Apu {
                dpcm: vec![None; NOTE_COUNT],
            },
            InstrumentType::Vrc7 => InstrumentData::Vrc7 {
                patch: 1,
                custom: [0; 8],
            },
            InstrumentType::Fds => InstrumentData::Fds {
                wave: default_fds_wave(),
                mod_table: [0; 32],
                mod_speed: 0,
                mod_depth: 0,
                mod_delay: 0,
            },
            InstrumentType::N163 => InstrumentData::N163 {
                waves: vec![default_n163_wave(32)],
                wave_size: 32,
                wave_position: 0,
            },
            InstrumentType::Vrc6 | InstrumentType::S5b => InstrumentData::Basic,
        };
        Self {
            name: name.into(),
            kind,
            sequences: Default::default(),
            data,
        }
    }

    /// Builder: attach a sequence
    pub fn with_sequence(mut self, kind: SequenceType, sequence: Sequence) -> Self {
        self.sequences[kind.index()] = Some(Arc::new(sequence));
        self
    }

    /// Builder: replace the payload
    pub fn with_data(mut self, data: InstrumentData) -> Self {
        self.data = data;
        self
    }

    /// Sequence of `kind`, if any
    pub fn sequence(&self, kind: SequenceType) -> Option<Arc<Sequence>> {
        self.sequences[kind.index()].clone()
    }

    /// DPCM assignment for `note` (2A03 instruments only)
    pub fn dpcm_key(&self, note: u8) -> Option<&DpcmKey> {
        match &self.data {
            InstrumentData::Apu { dpcm } => dpcm.get(note as usize)?.as_ref(),
            _ => None,
        }
    }

    /// Bind a sample to `note` (2A03 instruments only)
    pub fn set_dpcm_key(&mut self, note: u8, key: Option<DpcmKey>) {
        if let InstrumentData::Apu { dpcm } = &mut self.data {
            if let Some(slot) = dpcm.get_mut(note as usize) {
                *slot = key;
            }
        }
    }
}

/// Sine-like default FDS wave
fn default_fds_wave() -> [u8; 64] {
    let mut wave = [0u8; 64];
    for (i, sample) in wave.iter_mut().enumerate() {
        let phase = i as f64 / 64.0 * std::f64::consts::TAU;
        *sample = (31.5 + 31.5 * phase.sin()).round() as u8;
    }
    wave
}

/// Triangle default N163 wave of `size` samples
fn default_n163_wave(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| {
            let pos = i * 32 / size.max(1);
            if pos < 16 {
                pos as u8
            } else {
                (31 - pos) as u8
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_waves_stay_in_range() {
        assert!(default_fds_wave().iter().all(|&s| s < 64));
        assert!(default_n163_wave(32).iter().all(|&s| s < 16));
    }

    #[test]
    fn dpcm_keys_only_on_apu_instruments() {
        let sample = Arc::new(DpcmSample {
            name: "kick".into(),
            data: vec![0xAA; 17],
        });
        let key = DpcmKey {
            sample,
            pitch: 15,
            looping: false,
            delta: None,
        };
        let mut apu = Instrument::new(InstrumentType::Apu, "drums");
        apu.set_dpcm_key(36, Some(key.clone()));
        assert_eq!(apu.dpcm_key(36), Some(&key));
        assert_eq!(apu.dpcm_key(37), None);

        let mut vrc6 = Instrument::new(InstrumentType::Vrc6, "lead");
        vrc6.set_dpcm_key(36, Some(key));
        assert_eq!(vrc6.dpcm_key(36), None);
    }
}
