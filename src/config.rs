//! Engine configuration
//!
//! Output-side settings that do not belong to a module: sample rate, mixer
//! levels and the N163 mixing mode. Region, tuning and chip selection come
//! from the module itself.

use serde::{Deserialize, Serialize};

use crate::error::{FamitoneError, Result};
use crate::types::SoundChip;

/// Lowest accepted output sample rate
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Highest accepted output sample rate
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Per-chip mixer levels in decibels (0.0 = nominal)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipLevels {
    /// 2A03 squares
    pub apu1: f32,
    /// 2A03 triangle, noise and DPCM
    pub apu2: f32,
    /// Konami VRC6
    pub vrc6: f32,
    /// Konami VRC7
    pub vrc7: f32,
    /// Famicom Disk System
    pub fds: f32,
    /// Nintendo MMC5
    pub mmc5: f32,
    /// Namco 163
    pub n163: f32,
    /// Sunsoft 5B
    pub s5b: f32,
}

impl Default for ChipLevels {
    fn default() -> Self {
        Self {
            apu1: 0.0,
            apu2: 0.0,
            vrc6: 0.0,
            vrc7: 0.0,
            fds: 0.0,
            mmc5: 0.0,
            n163: 0.0,
            s5b: 0.0,
        }
    }
}

impl ChipLevels {
    /// Level in dB for an expansion chip (the 2A03 uses `apu1`/`apu2`)
    pub fn level(&self, chip: SoundChip) -> f32 {
        match chip {
            SoundChip::Apu => self.apu1,
            SoundChip::Vrc6 => self.vrc6,
            SoundChip::Vrc7 => self.vrc7,
            SoundChip::Fds => self.fds,
            SoundChip::Mmc5 => self.mmc5,
            SoundChip::N163 => self.n163,
            SoundChip::S5b => self.s5b,
        }
    }
}

/// Engine output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Master output gain (linear)
    pub master_volume: f32,
    /// Use the legacy all-channels N163 mixer instead of time multiplexing
    pub n163_legacy_mixing: bool,
    /// Remove DC offset from the final mix
    pub dc_filter: bool,
    /// Per-chip levels
    pub levels: ChipLevels,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            master_volume: 1.0,
            n163_legacy_mixing: false,
            dc_filter: true,
            levels: ChipLevels::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(FamitoneError::Config(format!(
                "sample rate {} outside {}..={}",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if !self.master_volume.is_finite() || self.master_volume < 0.0 {
            return Err(FamitoneError::Config(format!(
                "master volume {} must be a non-negative number",
                self.master_volume
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = EngineConfig::from_json(r#"{ "sample_rate": 48000 }"#).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert!(config.dc_filter);
        assert_eq!(config.levels, ChipLevels::default());
    }

    #[test]
    fn out_of_range_sample_rate_is_rejected() {
        let err = EngineConfig::from_json(r#"{ "sample_rate": 1000 }"#).unwrap_err();
        assert!(matches!(err, FamitoneError::Config(_)));
    }

    #[test]
    fn json_round_trip_keeps_levels() {
        let mut config = EngineConfig::default();
        config.levels.n163 = -3.0;
        config.n163_legacy_mixing = true;
        let text = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&text).unwrap(), config);
    }
}
