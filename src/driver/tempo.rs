//! Tempo accumulator
//!
//! Rows advance when the accumulator drops to zero or below. With tempo
//! scaling the accumulator is refilled with `60 * frame_rate` and drained by
//! `tempo * 24 / speed` per tick, so 150 BPM at speed 6 on a 60 Hz engine
//! yields exactly six ticks per row. Without tempo scaling each row lasts
//! `speed` ticks.

use crate::constants::{DEFAULT_SPEED, MAX_GROOVE};
use crate::module::{Groove, ModuleSource, SongSource};

/// Converts engine ticks into row steps
#[derive(Debug, Clone)]
pub struct TempoCounter {
    tempo: u16,
    speed: u8,
    frame_rate: u32,
    speed_split: u8,
    accumulator: i32,
    decrement: i32,
    remainder: i32,
    groove: Option<Groove>,
    groove_position: usize,
}

impl TempoCounter {
    /// Counter at speed 6, tempo 150, 60 Hz
    pub fn new() -> Self {
        let mut counter = Self {
            tempo: crate::constants::DEFAULT_TEMPO_NTSC,
            speed: DEFAULT_SPEED,
            frame_rate: crate::constants::FRAME_RATE_NTSC,
            speed_split: crate::constants::DEFAULT_SPEED_SPLIT,
            accumulator: 0,
            decrement: 0,
            remainder: 0,
            groove: None,
            groove_position: 0,
        };
        counter.setup_speed();
        counter
    }

    /// Load a song's initial speed, tempo or groove
    pub fn load_song(&mut self, module: &dyn ModuleSource, song: &dyn SongSource) {
        self.frame_rate = module.frame_rate().max(1);
        self.speed_split = module.speed_split();
        self.tempo = song.tempo();
        self.speed = song.speed().max(1);
        self.groove = None;
        self.groove_position = 0;
        if let Some(index) = song.groove() {
            self.load_groove(module, index);
        }
        self.accumulator = 0;
        self.setup_speed();
    }

    fn setup_speed(&mut self) {
        if self.tempo != 0 {
            let scaled = self.tempo as i32 * 24;
            self.decrement = scaled / self.speed as i32;
            self.remainder = scaled % self.speed as i32;
        } else {
            self.decrement = 1;
            self.remainder = 0;
        }
    }

    fn load_groove(&mut self, module: &dyn ModuleSource, index: u8) {
        match module.groove(index) {
            Some(groove) => {
                self.speed = groove.entry(0);
                self.groove_position = 0;
                self.groove = Some(groove);
            }
            None => log::debug!("groove {index:02X} does not exist"),
        }
    }

    /// Advance one engine tick
    pub fn tick(&mut self) {
        if self.accumulator <= 0 {
            let refill = if self.tempo != 0 {
                60 * self.frame_rate as i32
            } else {
                self.speed as i32
            };
            self.accumulator += refill - self.remainder;
        }
        self.accumulator -= self.decrement;
    }

    /// Whether a row is due on this tick
    #[inline]
    pub fn can_step_row(&self) -> bool {
        self.accumulator <= 0
    }

    /// Called for every row step; advances the groove
    pub fn step_row(&mut self) {
        if let Some(groove) = &self.groove {
            self.speed = groove.entry(self.groove_position);
            self.groove_position = (self.groove_position + 1) % groove.len();
            self.setup_speed();
        }
    }

    /// Fxx: speed below the split point, tempo at or above it; F00 acts as F01
    pub fn do_fxx(&mut self, param: u8) {
        let param = param.max(1);
        if param < self.speed_split {
            self.speed = param;
            self.groove = None;
        } else {
            self.tempo = param as u16;
        }
        self.setup_speed();
    }

    /// Oxx: switch to groove `param`
    pub fn do_oxx(&mut self, module: &dyn ModuleSource, param: u8) {
        if param < MAX_GROOVE {
            self.load_groove(module, param);
            self.setup_speed();
        }
    }

    /// Current speed
    #[inline]
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Current tempo, 0 when tempo scaling is off
    #[inline]
    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    /// Whether a groove drives the speed
    #[inline]
    pub fn has_groove(&self) -> bool {
        self.groove.is_some()
    }

    /// Effective rows per minute
    pub fn rows_per_minute(&self) -> f64 {
        let speed = match &self.groove {
            Some(groove) => groove.average(),
            None => self.speed as f64,
        };
        if self.tempo != 0 {
            self.tempo as f64 * 24.0 / speed
        } else {
            self.frame_rate as f64 * 60.0 / speed
        }
    }
}

impl Default for TempoCounter {
    fn default() -> Self {
        Self::new()
    }
}
