//! Instrument sequences and their per-tick playback state

use std::sync::Arc;

/// What a sequence drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceType {
    /// Volume multiplier (0-15)
    Volume,
    /// Note offset
    Arpeggio,
    /// Relative period change per tick
    Pitch,
    /// Relative period change in steps of 16
    HiPitch,
    /// Duty cycle / noise mode / wave index
    DutyCycle,
}

impl SequenceType {
    /// Number of sequence kinds
    pub const COUNT: usize = 5;

    /// Slot inside an instrument's sequence array
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// How arpeggio values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArpeggioMode {
    /// Offset from the played note
    #[default]
    Absolute,
    /// Fixed note, ignoring the played note
    Fixed,
    /// Offsets accumulate tick after tick
    Relative,
}

/// A list of per-tick values with optional loop and release points
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    /// Values, one per tick
    pub values: Vec<i8>,
    /// Index playback returns to after the last value
    pub loop_point: Option<usize>,
    /// Index playback holds on until the note is released
    pub release_point: Option<usize>,
    /// Interpretation of arpeggio values
    pub arpeggio_mode: ArpeggioMode,
}

impl Sequence {
    /// Sequence without loop or release
    pub fn new(values: Vec<i8>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Builder: set loop point
    pub fn with_loop(mut self, index: usize) -> Self {
        self.loop_point = Some(index);
        self
    }

    /// Builder: set release point
    pub fn with_release(mut self, index: usize) -> Self {
        self.release_point = Some(index);
        self
    }

    /// Builder: set arpeggio mode
    pub fn with_arpeggio_mode(mut self, mode: ArpeggioMode) -> Self {
        self.arpeggio_mode = mode;
        self
    }

    /// Number of values
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the sequence is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Playback state of a [`SequencePlayer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceState {
    /// No sequence bound
    #[default]
    Disabled,
    /// Producing values
    Running,
    /// Played past the end without a loop
    Ended,
}

/// Walks a sequence one tick at a time
#[derive(Debug, Clone, Default)]
pub struct SequencePlayer {
    sequence: Option<Arc<Sequence>>,
    position: usize,
    state: SequenceState,
    released: bool,
}

impl SequencePlayer {
    /// Bind `sequence` and restart it
    pub fn start(&mut self, sequence: Option<Arc<Sequence>>) {
        self.state = match &sequence {
            Some(seq) if !seq.is_empty() => SequenceState::Running,
            _ => SequenceState::Disabled,
        };
        self.sequence = sequence;
        self.position = 0;
        self.released = false;
    }

    /// Restart the bound sequence from the beginning
    pub fn restart(&mut self) {
        let sequence = self.sequence.take();
        self.start(sequence);
    }

    /// Unbind the sequence
    pub fn stop(&mut self) {
        self.sequence = None;
        self.state = SequenceState::Disabled;
        self.position = 0;
        self.released = false;
    }

    /// Leave the release hold, if any
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(seq) = &self.sequence {
            if let Some(release) = seq.release_point {
                if self.state == SequenceState::Running && self.position <= release {
                    self.position = release + 1;
                    if self.position >= seq.len() {
                        self.wrap(seq.loop_point, seq.len(), Some(release));
                    }
                }
            }
        }
    }

    fn wrap(&mut self, loop_point: Option<usize>, len: usize, release: Option<usize>) {
        match loop_point {
            // A loop placed before the release point is left once released
            Some(lp) if lp < len && !(self.released && release.is_some_and(|r| lp <= r)) => {
                self.position = lp;
            }
            _ => self.state = SequenceState::Ended,
        }
    }

    /// Value for this tick, `None` once ended or when disabled
    pub fn step(&mut self) -> Option<i8> {
        if self.state != SequenceState::Running {
            return None;
        }
        let seq = self.sequence.clone()?;
        let value = *seq.values.get(self.position)?;

        if !self.released && seq.release_point == Some(self.position) {
            // Hold on the release point, or loop back into it
            match seq.loop_point {
                Some(lp) if lp < self.position => self.position = lp,
                _ => {}
            }
            return Some(value);
        }

        self.position += 1;
        if self.position >= seq.len() {
            self.wrap(seq.loop_point, seq.len(), seq.release_point);
        }
        Some(value)
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Bound sequence
    #[inline]
    pub fn sequence(&self) -> Option<&Arc<Sequence>> {
        self.sequence.as_ref()
    }

    /// Position of the next value
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(seq: Sequence) -> SequencePlayer {
        let mut p = SequencePlayer::default();
        p.start(Some(Arc::new(seq)));
        p
    }

    #[test]
    fn test_plays_once_then_ends() {
        let mut p = player(Sequence::new(vec![3, 2, 1]));
        assert_eq!(p.step(), Some(3));
        assert_eq!(p.step(), Some(2));
        assert_eq!(p.step(), Some(1));
        assert_eq!(p.step(), None);
        assert_eq!(p.state(), SequenceState::Ended);
    }

    #[test]
    fn test_loop_point_repeats_tail() {
        let mut p = player(Sequence::new(vec![1, 2, 3]).with_loop(1));
        let values: Vec<_> = (0..6).map(|_| p.step().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 2, 3, 2]);
    }

    #[test]
    fn test_release_point_holds_until_released() {
        let mut p = player(Sequence::new(vec![15, 10, 5, 0]).with_release(1));
        assert_eq!(p.step(), Some(15));
        assert_eq!(p.step(), Some(10));
        assert_eq!(p.step(), Some(10));
        p.release();
        assert_eq!(p.step(), Some(5));
        assert_eq!(p.step(), Some(0));
        assert_eq!(p.step(), None);
    }

    #[test]
    fn test_loop_before_release_cycles_then_exits() {
        let mut p = player(Sequence::new(vec![1, 2, 3, 9]).with_loop(0).with_release(2));
        let held: Vec<_> = (0..5).map(|_| p.step().unwrap()).collect();
        assert_eq!(held, vec![1, 2, 3, 1, 2]);
        p.release();
        assert_eq!(p.step(), Some(9));
        assert_eq!(p.step(), None);
    }

    #[test]
    fn test_empty_sequence_is_disabled() {
        let mut p = player(Sequence::new(Vec::new()));
        assert_eq!(p.state(), SequenceState::Disabled);
        assert_eq!(p.step(), None);
    }
}
