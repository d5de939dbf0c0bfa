//! Period and vibrato lookup tables
//!
//! Tables are derived from the module's tuning and detune settings and the
//! N163 channel count, so they are rebuilt whenever those change.

use std::sync::Arc;

use crate::constants::{
    MASTER_CLOCK_NTSC, MASTER_CLOCK_PAL, NOTE_COUNT, NOTE_RANGE, VIBRATO_TABLE_SIZE,
};
use crate::module::ModuleSource;
use crate::types::{ChannelId, Machine, PeriodTable, SoundChip, VibratoStyle};

/// Note index of A440 before tuning
const A440_NOTE: f64 = 45.0;

/// VRC7 synthesis rate used by the F-number formula
const VRC7_RATE: f64 = 49716.0;

/// N163 frequency scale (15 cycles per voice x 2^16)
const N163_SCALE: f64 = 983040.0;

/// Largest N163 table entry; the channel shifts it up to the 18-bit register
const N163_MAX_FREQUENCY: u32 = 0xFFFF;

const NEW_VIBRATO_DEPTH: [f64; 16] = [
    1.0, 1.5, 2.5, 4.0, 5.0, 7.0, 10.0, 12.0, 14.0, 17.0, 22.0, 30.0, 44.0, 64.0, 96.0, 128.0,
];

const OLD_VIBRATO_DEPTH: [i32; 16] = [1, 1, 2, 3, 4, 7, 8, 15, 16, 31, 32, 63, 64, 127, 128, 255];

/// Period tables for every [`PeriodTable`] family
#[derive(Debug, Clone)]
pub struct NoteTables {
    ntsc: Arc<[u32]>,
    pal: Arc<[u32]>,
    saw: Arc<[u32]>,
    vrc7: Arc<[u32]>,
    fds: Arc<[u32]>,
    n163: Arc<[u32]>,
    s5b: Arc<[u32]>,
    noise: Arc<[u32]>,
}

impl NoteTables {
    /// Compute every table for `module`
    pub fn build(module: &dyn ModuleSource) -> Self {
        let a440 = A440_NOTE
            - module.tuning_semitone() as f64
            - module.tuning_cent() as f64 / 100.0;
        let pitch = |note: usize| 440.0 * 2f64.powf((note as f64 - a440) / NOTE_RANGE as f64);
        let clock_ntsc = MASTER_CLOCK_NTSC as f64 / 16.0;
        let clock_pal = MASTER_CLOCK_PAL as f64 / 16.0;
        let namco = module.namco_channels().max(1) as f64;
        let detune = |table: PeriodTable, note: usize| module.detune_offset(table, note) as i64;

        let mut ntsc = vec![0u32; NOTE_COUNT];
        let mut pal = vec![0u32; NOTE_COUNT];
        let mut saw = vec![0u32; NOTE_COUNT];
        let mut vrc7 = vec![0u32; NOTE_COUNT];
        let mut fds = vec![0u32; NOTE_COUNT];
        let mut n163 = vec![0u32; NOTE_COUNT];
        let mut s5b = vec![0u32; NOTE_COUNT];

        for note in 0..NOTE_COUNT {
            let freq = pitch(note);
            // Raw values; each channel clamps to its own register range
            let raw = |value: i64| value.max(0) as u32;

            let period = (clock_ntsc / freq - 0.5) as i64 - detune(PeriodTable::Ntsc, note);
            ntsc[note] = raw(period);
            s5b[note] = raw(period + 1);

            let period = (clock_pal / freq - 0.5) as i64 - detune(PeriodTable::Pal, note);
            pal[note] = raw(period);

            let period =
                (clock_ntsc * 16.0 / (freq * 14.0) - 0.5) as i64 - detune(PeriodTable::Saw, note);
            saw[note] = raw(period);

            let value = (freq * 65536.0 / clock_ntsc + 0.5) as i64 + detune(PeriodTable::Fds, note);
            fds[note] = raw(value);

            let value = (freq * namco * N163_SCALE / clock_ntsc + 0.5) as i64 / 4
                + detune(PeriodTable::N163, note);
            n163[note] = raw(value).min(N163_MAX_FREQUENCY);

            if note < NOTE_RANGE {
                let value =
                    (freq * 262144.0 / VRC7_RATE + 0.5) as i64 + detune(PeriodTable::Vrc7, note);
                vrc7[note] = raw(value);
            } else {
                vrc7[note] = vrc7[note % NOTE_RANGE];
            }
        }

        let noise: Vec<u32> = (0..NOTE_COUNT).map(|note| (note & 0x0F) as u32).collect();

        log::debug!(
            "note tables built (tuning {} semitones {} cents, {} N163 channels)",
            module.tuning_semitone(),
            module.tuning_cent(),
            namco
        );

        Self {
            ntsc: ntsc.into(),
            pal: pal.into(),
            saw: saw.into(),
            vrc7: vrc7.into(),
            fds: fds.into(),
            n163: n163.into(),
            s5b: s5b.into(),
            noise: noise.into(),
        }
    }

    /// Shared handle to one table
    pub fn table(&self, kind: PeriodTable) -> Arc<[u32]> {
        match kind {
            PeriodTable::Ntsc => self.ntsc.clone(),
            PeriodTable::Pal => self.pal.clone(),
            PeriodTable::Saw => self.saw.clone(),
            PeriodTable::Vrc7 => self.vrc7.clone(),
            PeriodTable::Fds => self.fds.clone(),
            PeriodTable::N163 => self.n163.clone(),
            PeriodTable::S5b => self.s5b.clone(),
        }
    }

    /// Entry `note` of a table; 0 when out of range
    pub fn read_period_table(&self, note: usize, kind: PeriodTable) -> u32 {
        match kind {
            PeriodTable::Ntsc => &self.ntsc,
            PeriodTable::Pal => &self.pal,
            PeriodTable::Saw => &self.saw,
            PeriodTable::Vrc7 => &self.vrc7,
            PeriodTable::Fds => &self.fds,
            PeriodTable::N163 => &self.n163,
            PeriodTable::S5b => &self.s5b,
        }
        .get(note)
        .copied()
        .unwrap_or(0)
    }

    /// Table family used by `channel`, `None` when it does not use one
    pub fn kind_for_channel(channel: ChannelId, machine: Machine) -> Option<PeriodTable> {
        use ChannelId::*;
        match channel {
            Square1 | Square2 | Triangle => Some(match machine {
                Machine::Ntsc => PeriodTable::Ntsc,
                Machine::Pal => PeriodTable::Pal,
            }),
            Noise | Dpcm | Mmc5Voice => None,
            Vrc6Sawtooth => Some(PeriodTable::Saw),
            _ => Some(match channel.chip() {
                SoundChip::Vrc7 => PeriodTable::Vrc7,
                SoundChip::Fds => PeriodTable::Fds,
                SoundChip::N163 => PeriodTable::N163,
                SoundChip::S5b => PeriodTable::S5b,
                _ => PeriodTable::Ntsc,
            }),
        }
    }

    /// Table to bind to `channel`; the noise channel gets its rate map
    pub fn for_channel(&self, channel: ChannelId, machine: Machine) -> Option<Arc<[u32]>> {
        match Self::kind_for_channel(channel, machine) {
            Some(kind) => Some(self.table(kind)),
            None if channel == ChannelId::Noise => Some(self.noise.clone()),
            None => None,
        }
    }
}

/// Vibrato and tremolo depth curves
pub struct VibratoTable;

impl VibratoTable {
    /// 16 depths x 16 quarter-wave phases, indexed `depth * 16 + phase`
    pub fn build(style: VibratoStyle) -> Arc<[i32]> {
        let mut table = vec![0i32; VIBRATO_TABLE_SIZE];
        for depth in 0..16 {
            for phase in 0..16 {
                table[depth * 16 + phase] = match style {
                    VibratoStyle::New => {
                        let angle = phase as f64 / 16.0 * (3.1415 / 2.0);
                        (angle.sin() * NEW_VIBRATO_DEPTH[depth]) as i32
                    }
                    VibratoStyle::Old => phase as i32 * OLD_VIBRATO_DEPTH[depth] / 16 + 1,
                };
            }
        }
        table.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::TrackerModule;
    use crate::types::SoundChipSet;

    fn tables() -> NoteTables {
        NoteTables::build(&TrackerModule::new(SoundChipSet::all(), 8))
    }

    #[test]
    fn a440_periods() {
        let t = tables();
        assert_eq!(t.read_period_table(45, PeriodTable::Ntsc), 0xFD);
        assert_eq!(t.read_period_table(45, PeriodTable::S5b), 0xFE);
        assert_eq!(t.read_period_table(45, PeriodTable::Fds), 258);
        assert_eq!(t.read_period_table(9, PeriodTable::Vrc7), 290);
        assert_eq!(
            t.read_period_table(9 + 36, PeriodTable::Vrc7),
            t.read_period_table(9, PeriodTable::Vrc7)
        );
    }

    #[test]
    fn tuning_shifts_by_a_semitone() {
        let tuned = NoteTables::build(&TrackerModule::new(SoundChipSet::empty(), 0).with_tuning(1, 0));
        let t = tables();
        assert_eq!(
            tuned.read_period_table(44, PeriodTable::Ntsc),
            t.read_period_table(45, PeriodTable::Ntsc)
        );
    }

    #[test]
    fn detune_moves_pitch_up() {
        let mut module = TrackerModule::new(SoundChipSet::empty(), 0);
        module.set_detune(PeriodTable::Ntsc, 45, 2);
        let t = NoteTables::build(&module);
        assert_eq!(t.read_period_table(45, PeriodTable::Ntsc), 0xFD - 2);
    }

    #[test]
    fn low_notes_keep_their_full_period() {
        let t = tables();
        // C-0 is far below what an 11-bit pulse period reaches
        assert!(t.read_period_table(0, PeriodTable::Ntsc) > 0x7FF);
        assert!(t.read_period_table(0, PeriodTable::Pal) > 0x7FF);
        assert_eq!(
            t.read_period_table(0, PeriodTable::S5b),
            t.read_period_table(0, PeriodTable::Ntsc) + 1
        );
        let n163 = NoteTables::build(&TrackerModule::new(SoundChipSet::N163, 8));
        assert_eq!(n163.read_period_table(95, PeriodTable::N163), 0xFFFF);
    }

    #[test]
    fn channel_table_selection() {
        assert_eq!(
            NoteTables::kind_for_channel(ChannelId::Triangle, Machine::Pal),
            Some(PeriodTable::Pal)
        );
        assert_eq!(
            NoteTables::kind_for_channel(ChannelId::Mmc5Square1, Machine::Pal),
            Some(PeriodTable::Ntsc)
        );
        assert_eq!(NoteTables::kind_for_channel(ChannelId::Dpcm, Machine::Ntsc), None);
        let noise = tables().for_channel(ChannelId::Noise, Machine::Ntsc).unwrap();
        assert_eq!(noise[0x13], 0x03);
    }

    #[test]
    fn vibrato_depth_grows() {
        let new = VibratoTable::build(VibratoStyle::New);
        assert_eq!(new[0], 0);
        assert!(new[15 * 16 + 15] > new[16 + 15]);
        let old = VibratoTable::build(VibratoStyle::Old);
        assert_eq!(old[0], 1);
        assert_eq!(old[15 * 16 + 15], 15 * 255 / 16 + 1);
    }
}
