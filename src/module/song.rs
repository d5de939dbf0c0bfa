//! In-memory songs and grooves

use std::collections::HashMap;

use super::SongSource;
use crate::constants::{DEFAULT_SPEED, DEFAULT_TEMPO_NTSC, MAX_GROOVE};
use crate::types::{ChanNote, ChannelId, CHANNEL_COUNT};

/// Repeating list of row speeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groove {
    entries: Vec<u8>,
}

impl Groove {
    /// Groove from speeds; zero entries are raised to 1
    pub fn new(entries: Vec<u8>) -> Self {
        let entries = if entries.is_empty() {
            vec![DEFAULT_SPEED]
        } else {
            entries.into_iter().map(|e| e.max(1)).collect()
        };
        Self { entries }
    }

    /// Speed at `position`, wrapping
    pub fn entry(&self, position: usize) -> u8 {
        self.entries[position % self.entries.len()]
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a groove has at least one entry
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean speed over one period
    pub fn average(&self) -> f64 {
        self.entries.iter().map(|&e| e as f64).sum::<f64>() / self.entries.len() as f64
    }
}

/// One song: a frame list referencing per-channel patterns
#[derive(Debug, Clone)]
pub struct Song {
    title: String,
    pattern_length: usize,
    speed: u8,
    tempo: u16,
    groove: Option<u8>,
    frames: Vec<[u8; CHANNEL_COUNT]>,
    patterns: HashMap<(ChannelId, u8), Vec<ChanNote>>,
}

impl Song {
    /// Song with `frames` frames of `pattern_length` rows, each frame
    /// pointing at pattern 0 of every channel
    pub fn new(frames: usize, pattern_length: usize) -> Self {
        Self {
            title: String::new(),
            pattern_length: pattern_length.max(1),
            speed: DEFAULT_SPEED,
            tempo: DEFAULT_TEMPO_NTSC,
            groove: None,
            frames: vec![[0; CHANNEL_COUNT]; frames.max(1)],
            patterns: HashMap::new(),
        }
    }

    /// Builder: title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: initial speed (ticks per row)
    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = speed.max(1);
        self
    }

    /// Builder: initial tempo; 0 disables tempo scaling
    pub fn with_tempo(mut self, tempo: u16) -> Self {
        self.tempo = tempo;
        self
    }

    /// Builder: start on a groove instead of a fixed speed
    pub fn with_groove(mut self, groove: u8) -> Self {
        self.groove = Some(groove % MAX_GROOVE);
        self
    }

    /// Pattern used by `channel` in `frame`
    pub fn set_frame_pattern(&mut self, frame: usize, channel: ChannelId, pattern: u8) {
        if frame >= self.frames.len() {
            self.frames.resize(frame + 1, [0; CHANNEL_COUNT]);
        }
        self.frames[frame][channel.index()] = pattern;
    }

    /// Write a cell of a pattern
    pub fn set_note(&mut self, channel: ChannelId, pattern: u8, row: usize, note: ChanNote) {
        if row >= self.pattern_length {
            return;
        }
        let len = self.pattern_length;
        let rows = self
            .patterns
            .entry((channel, pattern))
            .or_insert_with(|| vec![ChanNote::default(); len]);
        rows[row] = note;
    }

    /// Write a cell in whichever pattern `frame` uses for `channel`
    pub fn set_frame_note(&mut self, channel: ChannelId, frame: usize, row: usize, note: ChanNote) {
        let pattern = self
            .frames
            .get(frame)
            .map_or(0, |f| f[channel.index()]);
        self.set_note(channel, pattern, row, note);
    }
}

impl SongSource for Song {
    fn title(&self) -> &str {
        &self.title
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn pattern_length(&self) -> usize {
        self.pattern_length
    }

    fn speed(&self) -> u8 {
        self.speed
    }

    fn tempo(&self) -> u16 {
        self.tempo
    }

    fn groove(&self) -> Option<u8> {
        self.groove
    }

    fn active_note(&self, channel: ChannelId, frame: usize, row: usize) -> ChanNote {
        let Some(frame) = self.frames.get(frame) else {
            return ChanNote::default();
        };
        self.patterns
            .get(&(channel, frame[channel.index()]))
            .and_then(|rows| rows.get(row))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Note;

    #[test]
    fn frames_share_patterns() {
        let mut song = Song::new(3, 16);
        song.set_frame_pattern(1, ChannelId::Square1, 1);
        song.set_note(ChannelId::Square1, 0, 2, ChanNote::new(Note::at(4, 0)));
        assert_eq!(song.active_note(ChannelId::Square1, 0, 2).note, Note::at(4, 0));
        assert_eq!(song.active_note(ChannelId::Square1, 2, 2).note, Note::at(4, 0));
        assert_eq!(song.active_note(ChannelId::Square1, 1, 2).note, Note::None);
        assert!(song.active_note(ChannelId::Square1, 9, 0).is_empty());
    }

    #[test]
    fn groove_wraps_and_averages() {
        let groove = Groove::new(vec![6, 5, 0]);
        assert_eq!(groove.entry(2), 1);
        assert_eq!(groove.entry(3), 6);
        assert!((groove.average() - 4.0).abs() < 1e-9);
    }
}
