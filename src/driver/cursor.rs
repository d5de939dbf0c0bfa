//! Playback position within a song

use std::fmt;
use std::sync::Arc;

use crate::module::SongSource;
use crate::types::{ChanNote, ChannelId};

/// Frame/row position plus playback counters
#[derive(Clone)]
pub struct PlayerCursor {
    song: Arc<dyn SongSource>,
    frame: usize,
    row: usize,
    loop_count: u32,
    rows_played: u64,
    ticks: u64,
    halted: bool,
}

impl PlayerCursor {
    /// Cursor at the start of `song`
    pub fn new(song: Arc<dyn SongSource>) -> Self {
        Self {
            song,
            frame: 0,
            row: 0,
            loop_count: 0,
            rows_played: 0,
            ticks: 0,
            halted: false,
        }
    }

    /// Current frame
    #[inline]
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Current row
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Times playback wrapped or jumped backwards
    #[inline]
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Rows advanced so far
    #[inline]
    pub fn rows_played(&self) -> u64 {
        self.rows_played
    }

    /// Engine ticks so far
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Song being played
    pub fn song(&self) -> &Arc<dyn SongSource> {
        &self.song
    }

    /// Count one engine tick
    #[inline]
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    /// Cell for `channel` at the current position
    pub fn get_note(&self, channel: ChannelId) -> ChanNote {
        self.song.active_note(channel, self.frame, self.row)
    }

    fn next_frame(&mut self) {
        self.frame += 1;
        if self.frame >= self.song.frame_count().max(1) {
            self.frame = 0;
            self.loop_count += 1;
        }
    }

    /// Advance one row, wrapping into the next frame
    pub fn step_row(&mut self) {
        self.rows_played += 1;
        self.row += 1;
        if self.row >= self.song.pattern_length() {
            self.row = 0;
            self.next_frame();
        }
    }

    /// Bxx: continue at the first row of `frame`
    pub fn do_bxx(&mut self, frame: usize) {
        let target = frame % self.song.frame_count().max(1);
        if target <= self.frame {
            self.loop_count += 1;
        }
        self.rows_played += 1;
        self.frame = target;
        self.row = 0;
    }

    /// Dxx: continue at `row` of the next frame
    pub fn do_dxx(&mut self, row: usize) {
        self.rows_played += 1;
        self.next_frame();
        self.row = row.min(self.song.pattern_length().saturating_sub(1));
    }

    /// Cxx: playback ends at the current row
    pub fn do_cxx(&mut self) {
        self.halted = true;
    }

    /// Whether a Cxx was met
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Jump to an arbitrary position without touching the counters
    pub fn move_to(&mut self, frame: usize, row: usize) {
        self.frame = frame % self.song.frame_count().max(1);
        self.row = row.min(self.song.pattern_length().saturating_sub(1));
    }
}

impl fmt::Debug for PlayerCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerCursor")
            .field("frame", &self.frame)
            .field("row", &self.row)
            .field("loop_count", &self.loop_count)
            .field("ticks", &self.ticks)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Song;

    fn cursor() -> PlayerCursor {
        PlayerCursor::new(Arc::new(Song::new(3, 4)))
    }

    #[test]
    fn rows_wrap_into_frames_and_loop() {
        let mut c = cursor();
        for _ in 0..4 {
            c.step_row();
        }
        assert_eq!((c.frame(), c.row()), (1, 0));
        for _ in 0..8 {
            c.step_row();
        }
        assert_eq!((c.frame(), c.row()), (0, 0));
        assert_eq!(c.loop_count(), 1);
    }

    #[test]
    fn backwards_jump_counts_as_loop() {
        let mut c = cursor();
        c.do_bxx(2);
        assert_eq!(c.loop_count(), 0);
        c.do_bxx(1);
        assert_eq!((c.frame(), c.row(), c.loop_count()), (1, 0, 1));
    }

    #[test]
    fn skip_clamps_row() {
        let mut c = cursor();
        c.do_dxx(9);
        assert_eq!((c.frame(), c.row()), (1, 3));
    }
}
