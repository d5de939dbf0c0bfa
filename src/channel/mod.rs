//! Channel handlers
//!
//! A channel handler turns queued pattern cells into register writes for one
//! logical voice. The note, instrument, sequence and effect logic shared by
//! every chip lives in [`ChannelCore`]; the per-chip handlers only decide how
//! the resulting period, volume and duty reach their registers.
//!
//! Per tick the driver calls, in order: [`ChannelHandler::play_note`] when a
//! cell was queued, [`ChannelHandler::set_pitch`],
//! [`ChannelHandler::process_channel`] (or [`ChannelHandler::reset_channel`]
//! while halting), [`ChannelHandler::refresh_channel`] and finally
//! [`ChannelHandler::finish_tick`].

pub mod apu;
pub mod chip_handler;
pub mod fds;
pub mod n163;
pub mod s5b;
pub mod vrc6;
pub mod vrc7;

use std::fmt::Write as _;
use std::sync::Arc;

pub use chip_handler::{ChipHandler, ChipShared};

use crate::apu::Apu;
use crate::constants::{MAX_VOLUME, NOTE_COUNT, NOTE_RANGE};
use crate::driver::tracker_channel::{is_effect_compatible, is_instrument_compatible};
use crate::module::{ArpeggioMode, Instrument, ModuleSource, SequencePlayer, SequenceType};
use crate::types::{ChanNote, ChannelId, Effect, EffectCommand, Note};

/// Fractional bits of the channel volume (volume column << 3)
pub const VOLUME_SHIFT: u32 = 3;

const MAX_CHANNEL_VOLUME: i32 = (MAX_VOLUME as i32) << VOLUME_SHIFT;

/// Pitch effect currently driving the period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitchEffect {
    /// No pitch effect
    #[default]
    None,
    /// 0xy
    Arpeggio,
    /// 1xx
    PortaUp,
    /// 2xx
    PortaDown,
    /// 3xx
    Portamento,
    /// Qxy / Rxy, ends on the target note
    Slide,
}

/// Events raised by delayed effects during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickEvents {
    /// Sxx expired
    pub cut: bool,
    /// Lxx expired
    pub release: bool,
}

/// Note, instrument and effect state shared by all channel handlers
#[derive(Debug, Clone)]
pub struct ChannelCore {
    id: ChannelId,
    note_table: Arc<[u32]>,
    vibrato_table: Arc<[i32]>,
    max_period: i32,
    inverted: bool,

    note: Option<u8>,
    gate: bool,
    released: bool,
    period: i32,
    new_note: bool,

    instrument_index: Option<u8>,
    instrument: Option<Arc<Instrument>>,
    reload_instrument: bool,

    volume: i32,
    sequences: [SequencePlayer; SequenceType::COUNT],
    seq_volume: i32,
    seq_pitch: i32,
    duty: u8,

    pitch_effect: PitchEffect,
    porta_speed: i32,
    porta_target: i32,
    arpeggio: u8,
    arp_step: u8,
    pending_slide: Option<(bool, u8)>,
    vibrato_speed: u8,
    vibrato_depth: u8,
    vibrato_phase: u8,
    tremolo_speed: u8,
    tremolo_depth: u8,
    tremolo_phase: u8,
    fine_pitch: i32,
    volume_slide: u8,
    note_cut: Option<u8>,
    note_release: Option<u8>,
    delayed_volume: Option<(u8, u8)>,
    transpose: Option<(u8, i8)>,
    delayed_note: Option<(u8, ChanNote)>,
    pitch_wheel: i32,
}

impl ChannelCore {
    /// Core for `id`; `inverted` when larger register values mean higher pitch
    pub fn new(id: ChannelId, max_period: i32, inverted: bool) -> Self {
        Self {
            id,
            note_table: Arc::from(vec![0u32; NOTE_COUNT]),
            vibrato_table: Arc::from(vec![0i32; 256]),
            max_period,
            inverted,
            note: None,
            gate: false,
            released: false,
            period: 0,
            new_note: false,
            instrument_index: None,
            instrument: None,
            reload_instrument: false,
            volume: MAX_CHANNEL_VOLUME,
            sequences: Default::default(),
            seq_volume: MAX_VOLUME as i32,
            seq_pitch: 0,
            duty: 0,
            pitch_effect: PitchEffect::None,
            porta_speed: 0,
            porta_target: 0,
            arpeggio: 0,
            arp_step: 0,
            pending_slide: None,
            vibrato_speed: 0,
            vibrato_depth: 0,
            vibrato_phase: 0,
            tremolo_speed: 0,
            tremolo_depth: 0,
            tremolo_phase: 0,
            fine_pitch: 0,
            volume_slide: 0,
            note_cut: None,
            note_release: None,
            delayed_volume: None,
            transpose: None,
            delayed_note: None,
            pitch_wheel: 0,
        }
    }

    /// Forget all note and effect state; tables are kept
    pub fn reset(&mut self) {
        let tables = (self.note_table.clone(), self.vibrato_table.clone());
        *self = Self::new(self.id, self.max_period, self.inverted);
        self.note_table = tables.0;
        self.vibrato_table = tables.1;
    }

    /// Channel id
    #[inline]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Bind a period lookup table
    pub fn set_note_table(&mut self, table: Arc<[u32]>) {
        self.note_table = table;
    }

    /// Bind the vibrato depth table
    pub fn set_vibrato_table(&mut self, table: Arc<[i32]>) {
        self.vibrato_table = table;
    }

    /// Period register value for `note`, clamped to the table
    pub fn note_period(&self, note: i32) -> i32 {
        let index = note.clamp(0, NOTE_COUNT as i32 - 1) as usize;
        self.note_table.get(index).copied().unwrap_or(0) as i32
    }

    /// Period change that raises the pitch by `amount`
    #[inline]
    fn bend(&self, amount: i32) -> i32 {
        if self.inverted {
            amount
        } else {
            -amount
        }
    }

    fn clamp_period(&self, period: i32) -> i32 {
        period.clamp(0, self.max_period)
    }

    /// Current base note
    #[inline]
    pub fn note(&self) -> Option<u8> {
        self.note
    }

    /// Whether the note is sounding
    #[inline]
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Whether the note was released
    #[inline]
    pub fn released(&self) -> bool {
        self.released
    }

    /// A note was triggered during this tick
    #[inline]
    pub fn new_note(&self) -> bool {
        self.new_note
    }

    /// Base period before per-tick offsets
    #[inline]
    pub fn period(&self) -> i32 {
        self.period
    }

    /// Duty value from Vxx or the duty sequence
    #[inline]
    pub fn duty(&self) -> u8 {
        self.duty
    }

    /// Bound instrument
    #[inline]
    pub fn instrument(&self) -> Option<&Arc<Instrument>> {
        self.instrument.as_ref()
    }

    /// Active pitch effect
    #[inline]
    pub fn pitch_effect(&self) -> PitchEffect {
        self.pitch_effect
    }

    /// Channel volume column (0-15)
    pub fn volume_column(&self) -> u8 {
        (self.volume >> VOLUME_SHIFT) as u8
    }

    /// Set the volume column
    pub fn set_volume_column(&mut self, volume: u8) {
        self.volume = (volume.min(MAX_VOLUME) as i32) << VOLUME_SHIFT;
    }

    /// Bind instrument `index`; sequences start with the next note
    pub fn set_instrument(&mut self, index: u8, instrument: Arc<Instrument>) {
        self.instrument_index = Some(index);
        self.instrument = Some(instrument);
        self.reload_instrument = false;
    }

    /// Apply a channel effect; `false` when the effect is chip-specific
    pub fn handle_effect(&mut self, cmd: EffectCommand) -> bool {
        let param = cmd.param;
        match cmd.effect {
            Effect::Arpeggio => {
                if param == 0 {
                    if self.pitch_effect == PitchEffect::Arpeggio {
                        self.pitch_effect = PitchEffect::None;
                    }
                } else {
                    self.pitch_effect = PitchEffect::Arpeggio;
                    self.arpeggio = param;
                    self.arp_step = 0;
                }
            }
            Effect::PortaUp | Effect::PortaDown => {
                self.porta_speed = param as i32;
                self.pitch_effect = match (param, cmd.effect) {
                    (0, _) => PitchEffect::None,
                    (_, Effect::PortaUp) => PitchEffect::PortaUp,
                    _ => PitchEffect::PortaDown,
                };
            }
            Effect::Portamento => {
                self.porta_speed = param as i32;
                if param == 0 {
                    self.pitch_effect = PitchEffect::None;
                } else {
                    self.pitch_effect = PitchEffect::Portamento;
                    self.porta_target = self.period;
                }
            }
            Effect::SlideUp => self.pending_slide = Some((true, param)),
            Effect::SlideDown => self.pending_slide = Some((false, param)),
            Effect::Vibrato => {
                self.vibrato_speed = param >> 4;
                self.vibrato_depth = param & 0x0F;
                if self.vibrato_speed == 0 {
                    self.vibrato_phase = 0;
                }
            }
            Effect::Tremolo => {
                self.tremolo_speed = param >> 4;
                self.tremolo_depth = param & 0x0F;
                if self.tremolo_speed == 0 {
                    self.tremolo_phase = 0;
                }
            }
            Effect::Pitch => self.fine_pitch = param as i32 - 0x80,
            Effect::VolumeSlide => self.volume_slide = param,
            Effect::NoteCut if param <= 0x7F => self.note_cut = Some(param),
            Effect::NoteRelease if param <= 0x7F => self.note_release = Some(param),
            Effect::DelayedVolume => {
                self.delayed_volume = (param >> 4 != 0).then_some((param >> 4, param & 0x0F));
            }
            Effect::Transpose => {
                let semitones = (param & 0x0F) as i8;
                let semitones = if param & 0x80 != 0 { -semitones } else { semitones };
                self.transpose = Some(((param >> 4) & 0x07, semitones));
            }
            Effect::DutyCycle => self.duty = param,
            Effect::None | Effect::Delay => {}
            effect if effect.is_global() => {}
            _ => return false,
        }
        true
    }

    /// Start `note` (before transposition by the caller)
    pub fn trigger(&mut self, note: u8) {
        let note = note.min(NOTE_COUNT as u8 - 1);
        let target = self.note_period(note as i32);
        let gliding = self.pitch_effect == PitchEffect::Portamento
            && self.porta_speed > 0
            && self.gate
            && self.period != 0;
        if gliding {
            self.porta_target = target;
        } else {
            self.period = target;
            self.porta_target = target;
        }
        self.note = Some(note);
        self.gate = true;
        self.released = false;
        self.new_note = true;
        self.seq_pitch = 0;
        self.seq_volume = MAX_VOLUME as i32;
        self.arp_step = 0;
        if let Some(inst) = self.instrument.clone() {
            for kind in [
                SequenceType::Volume,
                SequenceType::Arpeggio,
                SequenceType::Pitch,
                SequenceType::HiPitch,
                SequenceType::DutyCycle,
            ] {
                self.sequences[kind.index()].start(inst.sequence(kind));
            }
        }
    }

    /// Silence the note
    pub fn cut(&mut self) {
        self.gate = false;
        self.released = false;
        for seq in &mut self.sequences {
            seq.stop();
        }
    }

    /// Move sequences past their release points
    pub fn release(&mut self) {
        if !self.gate {
            return;
        }
        self.released = true;
        for seq in &mut self.sequences {
            seq.release();
        }
    }

    /// Replace the note without restarting sequences (auto-arpeggio)
    pub fn arpeggiate(&mut self, note: u8) {
        if (note as usize) < NOTE_COUNT {
            self.note = Some(note);
            self.period = self.note_period(note as i32);
        }
    }

    /// Pitch wheel offset in period units
    pub fn set_pitch_wheel(&mut self, pitch: i32) {
        self.pitch_wheel = pitch;
    }

    /// Resolve a Qxy/Rxy queued on this row
    pub fn apply_pending_slide(&mut self) {
        let Some((up, param)) = self.pending_slide.take() else {
            return;
        };
        let Some(note) = self.note else {
            return;
        };
        let semitones = (param & 0x0F) as i32;
        let target_note = if up {
            note as i32 + semitones
        } else {
            note as i32 - semitones
        }
        .clamp(0, NOTE_COUNT as i32 - 1);
        self.note = Some(target_note as u8);
        self.porta_target = self.note_period(target_note);
        self.porta_speed = ((param >> 4) as i32) * 2 + 1;
        self.pitch_effect = PitchEffect::Slide;
    }

    /// Hold `note` for `ticks` ticks (Gxx)
    pub fn delay_note(&mut self, ticks: u8, note: ChanNote) {
        self.delayed_note = Some((ticks, note));
    }

    /// Pending delayed note, removed
    pub fn take_delayed_note(&mut self) -> Option<ChanNote> {
        self.delayed_note.take().map(|(_, note)| note)
    }

    /// Count down a delayed note; returns it once due
    ///
    /// Gxx queued on a row's tick 0 is due on tick `xx`.
    pub fn step_delay(&mut self) -> Option<ChanNote> {
        match self.delayed_note.as_mut() {
            Some((0, _)) => self.take_delayed_note(),
            Some((ticks, _)) => {
                *ticks -= 1;
                None
            }
            None => None,
        }
    }

    fn countdown(slot: &mut Option<u8>) -> bool {
        match slot {
            Some(0) => {
                *slot = None;
                true
            }
            Some(n) => {
                *n -= 1;
                false
            }
            None => false,
        }
    }

    /// Advance per-tick effects
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        if Self::countdown(&mut self.note_cut) {
            self.cut();
            events.cut = true;
        }
        if Self::countdown(&mut self.note_release) {
            self.release();
            events.release = true;
        }
        if let Some((ticks, volume)) = self.delayed_volume {
            if ticks == 0 {
                self.delayed_volume = None;
                self.set_volume_column(volume);
            } else {
                self.delayed_volume = Some((ticks - 1, volume));
            }
        }
        if let Some((ticks, semitones)) = self.transpose {
            if ticks == 0 {
                self.transpose = None;
                if let Some(note) = self.note {
                    let note = (note as i32 + semitones as i32).clamp(0, NOTE_COUNT as i32 - 1);
                    self.note = Some(note as u8);
                    self.period = self.note_period(note);
                }
            } else {
                self.transpose = Some((ticks - 1, semitones));
            }
        }

        if self.volume_slide != 0 {
            let up = (self.volume_slide >> 4) as i32;
            let down = (self.volume_slide & 0x0F) as i32;
            self.volume = (self.volume + up - down).clamp(0, MAX_CHANNEL_VOLUME);
        }

        match self.pitch_effect {
            PitchEffect::Arpeggio => {
                if let Some(note) = self.note {
                    let offset = match self.arp_step {
                        0 => 0,
                        1 => (self.arpeggio >> 4) as i32,
                        _ => (self.arpeggio & 0x0F) as i32,
                    };
                    self.period = self.note_period(note as i32 + offset);
                    self.arp_step = match self.arp_step {
                        0 => 1,
                        1 if self.arpeggio & 0x0F != 0 => 2,
                        _ => 0,
                    };
                }
            }
            PitchEffect::PortaUp => {
                self.period = self.clamp_period(self.period + self.bend(self.porta_speed));
            }
            PitchEffect::PortaDown => {
                self.period = self.clamp_period(self.period - self.bend(self.porta_speed));
            }
            PitchEffect::Portamento | PitchEffect::Slide => {
                if self.period < self.porta_target {
                    self.period = (self.period + self.porta_speed).min(self.porta_target);
                } else if self.period > self.porta_target {
                    self.period = (self.period - self.porta_speed).max(self.porta_target);
                }
                if self.pitch_effect == PitchEffect::Slide && self.period == self.porta_target {
                    self.pitch_effect = PitchEffect::None;
                }
            }
            PitchEffect::None => {}
        }

        if self.vibrato_speed != 0 {
            self.vibrato_phase = (self.vibrato_phase + self.vibrato_speed) & 63;
        }
        if self.tremolo_speed != 0 {
            self.tremolo_phase = (self.tremolo_phase + self.tremolo_speed) & 63;
        }
        events
    }

    /// Step the instrument sequences
    pub fn run_sequences(&mut self) {
        if let Some(v) = self.sequences[SequenceType::Volume.index()].step() {
            self.seq_volume = (v as i32).clamp(0, MAX_VOLUME as i32);
        }
        let arp_mode = self.sequences[SequenceType::Arpeggio.index()]
            .sequence()
            .map(|s| s.arpeggio_mode);
        if let Some(v) = self.sequences[SequenceType::Arpeggio.index()].step() {
            if let Some(note) = self.note {
                match arp_mode.unwrap_or_default() {
                    ArpeggioMode::Absolute => self.period = self.note_period(note as i32 + v as i32),
                    ArpeggioMode::Fixed => self.period = self.note_period(v as i32),
                    ArpeggioMode::Relative => {
                        let n = (note as i32 + v as i32).clamp(0, NOTE_COUNT as i32 - 1);
                        self.note = Some(n as u8);
                        self.period = self.note_period(n);
                    }
                }
            }
        }
        if let Some(v) = self.sequences[SequenceType::Pitch.index()].step() {
            self.seq_pitch -= self.bend(v as i32);
        }
        if let Some(v) = self.sequences[SequenceType::HiPitch.index()].step() {
            self.seq_pitch -= self.bend(v as i32 * 16);
        }
        if let Some(v) = self.sequences[SequenceType::DutyCycle.index()].step() {
            self.duty = v as u8;
        }
    }

    /// Vibrato offset for this tick (pitch units)
    pub fn vibrato(&self) -> i32 {
        if self.vibrato_speed == 0 {
            return 0;
        }
        let row = (self.vibrato_depth as usize) << 4;
        let phase = self.vibrato_phase as usize;
        let at = |i: usize| self.vibrato_table.get(row + i).copied().unwrap_or(0);
        match phase & 0x30 {
            0x00 => at(phase & 0x0F),
            0x10 => at(15 - (phase & 0x0F)),
            0x20 => -at(phase & 0x0F),
            _ => -at(15 - (phase & 0x0F)),
        }
    }

    /// Tremolo attenuation for this tick (fixed-point volume units)
    pub fn tremolo(&self) -> i32 {
        if self.tremolo_speed == 0 {
            return 0;
        }
        let row = (self.tremolo_depth as usize) << 4;
        let phase = ((self.tremolo_phase >> 1) & 0x1F) as usize;
        let at = |i: usize| self.vibrato_table.get(row + i).copied().unwrap_or(0);
        let value = if phase & 0x10 != 0 {
            at(15 - (phase & 0x0F))
        } else {
            at(phase & 0x0F)
        };
        value >> 1
    }

    /// Final period/frequency register value for this tick
    pub fn output_period(&self) -> i32 {
        let period = self.period
            + self.seq_pitch
            + self.bend(self.fine_pitch)
            + self.bend(self.vibrato())
            + self.bend(self.pitch_wheel);
        self.clamp_period(period)
    }

    /// Final volume (0-15) for this tick
    pub fn output_volume(&self) -> i32 {
        if !self.gate {
            return 0;
        }
        let channel = ((self.volume - self.tremolo()).max(0)) >> VOLUME_SHIFT;
        let volume = self.seq_volume * channel / MAX_VOLUME as i32;
        if volume == 0 && self.seq_volume > 0 && channel > 0 {
            1
        } else {
            volume
        }
    }

    /// Clear per-tick flags
    pub fn finish_tick(&mut self) {
        self.new_note = false;
    }

    /// Diagnostic summary of the channel
    pub fn state_string(&self) -> String {
        let mut text = String::new();
        let note = self.note.map_or(Note::None, Note::Value);
        let _ = write!(
            text,
            "{} vol {:X} inst {}",
            if self.gate { note } else { Note::Halt },
            self.volume_column(),
            self.instrument_index
                .map_or_else(|| "--".to_string(), |i| format!("{i:02X}"))
        );
        let effects = [
            (self.pitch_effect == PitchEffect::Arpeggio, '0', self.arpeggio),
            (self.pitch_effect == PitchEffect::PortaUp, '1', self.porta_speed as u8),
            (self.pitch_effect == PitchEffect::PortaDown, '2', self.porta_speed as u8),
            (self.pitch_effect == PitchEffect::Portamento, '3', self.porta_speed as u8),
            (
                self.vibrato_speed != 0,
                '4',
                (self.vibrato_speed << 4) | self.vibrato_depth,
            ),
            (
                self.tremolo_speed != 0,
                '7',
                (self.tremolo_speed << 4) | self.tremolo_depth,
            ),
            (self.volume_slide != 0, 'A', self.volume_slide),
            (self.fine_pitch != 0, 'P', (self.fine_pitch + 0x80) as u8),
        ];
        for (active, letter, param) in effects {
            if active {
                let _ = write!(text, " {letter}{param:02X}");
            }
        }
        text
    }
}

/// Logic of one tracker channel driving one chip voice
pub trait ChannelHandler: Send {
    /// Shared state
    fn core(&self) -> &ChannelCore;

    /// Mutable shared state
    fn core_mut(&mut self) -> &mut ChannelCore;

    /// Write this tick's register values
    fn refresh_channel(&mut self, apu: &mut Apu, shared: &mut ChipShared);

    /// Chip-specific effect; `false` if ignored
    fn handle_chip_effect(&mut self, _cmd: EffectCommand) -> bool {
        false
    }

    /// Chip-specific part of an instrument change
    fn load_instrument(&mut self, _instrument: &Instrument) {}

    /// Called after a note was triggered
    fn handle_note_on(&mut self, _note: u8) {}

    /// Called after a note cut
    fn handle_cut(&mut self) {}

    /// Called after a note release
    fn handle_release(&mut self) {}

    /// Chip-specific per-tick processing
    fn process_chip(&mut self) {}

    /// Chip-specific part of a channel reset
    fn reset_chip_state(&mut self) {}

    /// Channel id
    fn channel_id(&self) -> ChannelId {
        self.core().id()
    }

    /// Bind the vibrato table
    fn init_channel(&mut self, vibrato: Arc<[i32]>) {
        self.core_mut().set_vibrato_table(vibrato);
    }

    /// Apply module-wide settings
    fn configure_document(&mut self, _module: &dyn ModuleSource) {}

    /// Rebind the period lookup table
    fn set_note_table(&mut self, table: Arc<[u32]>) {
        self.core_mut().set_note_table(table);
    }

    /// Consume a queued cell
    fn play_note(&mut self, note: ChanNote, module: &dyn ModuleSource) {
        if let Some(pending) = self.core_mut().take_delayed_note() {
            apply_note(self, pending, module);
        }
        let delay = note
            .effects
            .iter()
            .find(|e| e.effect == Effect::Delay && e.param > 0)
            .map(|e| e.param);
        match delay {
            Some(ticks) => {
                let mut note = note;
                for cmd in &mut note.effects {
                    if cmd.effect == Effect::Delay {
                        *cmd = EffectCommand::default();
                    }
                }
                self.core_mut().delay_note(ticks, note);
            }
            None => apply_note(self, note, module),
        }
    }

    /// Per-tick effect and sequence update
    fn process_channel(&mut self, module: &dyn ModuleSource) {
        if let Some(note) = self.core_mut().step_delay() {
            apply_note(self, note, module);
        }
        let events = self.core_mut().tick();
        if events.cut {
            self.handle_cut();
        }
        if events.release {
            self.handle_release();
        }
        self.core_mut().run_sequences();
        self.process_chip();
    }

    /// Silence the channel and forget its state
    fn reset_channel(&mut self) {
        self.core_mut().reset();
        self.reset_chip_state();
    }

    /// Replace the playing note (auto-arpeggio)
    fn arpeggiate(&mut self, note: u8) {
        self.core_mut().arpeggiate(note);
    }

    /// Pitch wheel position
    fn set_pitch(&mut self, pitch: i32) {
        self.core_mut().set_pitch_wheel(pitch);
    }

    /// End of tick bookkeeping
    fn finish_tick(&mut self) {
        self.core_mut().finish_tick();
    }

    /// Reload the instrument with the next note even if unchanged
    fn force_reload_instrument(&mut self) {
        self.core_mut().reload_instrument = true;
    }

    /// Playing note index, -1 when silent
    fn active_note(&self) -> i32 {
        match (self.core().gate(), self.core().note()) {
            (true, Some(n)) => n as i32,
            _ => -1,
        }
    }

    /// Output volume (0-15)
    fn channel_volume(&self) -> i32 {
        self.core().output_volume()
    }

    /// Diagnostic summary
    fn state_string(&self) -> String {
        self.core().state_string()
    }
}

/// Apply one cell: effects, instrument, volume, then the note
fn apply_note<H: ChannelHandler + ?Sized>(handler: &mut H, data: ChanNote, module: &dyn ModuleSource) {
    let id = handler.channel_id();
    for cmd in data.effects {
        if cmd.effect == Effect::None || cmd.effect.is_global() {
            continue;
        }
        if !is_effect_compatible(id, cmd.effect, cmd.param) {
            log::trace!("{id:?}: ignoring {}{:02X}", cmd.effect.letter(), cmd.param);
            continue;
        }
        if !handler.core_mut().handle_effect(cmd) {
            handler.handle_chip_effect(cmd);
        }
    }

    if let Some(index) = data.instrument {
        let core = handler.core();
        if core.instrument_index != Some(index) || core.reload_instrument {
            match module.instrument(index) {
                Some(inst) if is_instrument_compatible(id.chip(), inst.kind) => {
                    handler.core_mut().set_instrument(index, inst.clone());
                    handler.load_instrument(&inst);
                }
                Some(inst) => {
                    log::warn!("{id:?}: instrument {index:02X} ({:?}) is not compatible", inst.kind)
                }
                None => log::debug!("{id:?}: instrument {index:02X} does not exist"),
            }
        }
    }

    if let Some(volume) = data.volume {
        handler.core_mut().set_volume_column(volume);
    }

    match data.note {
        Note::Value(n) => {
            if handler.core().reload_instrument {
                if let Some(inst) = handler.core().instrument.clone() {
                    handler.core_mut().reload_instrument = false;
                    handler.load_instrument(&inst);
                }
            }
            handler.core_mut().trigger(n);
            handler.handle_note_on(n);
        }
        Note::Halt => {
            handler.core_mut().cut();
            handler.handle_cut();
        }
        Note::Release => {
            handler.core_mut().release();
            handler.handle_release();
        }
        Note::None => {}
    }
    handler.core_mut().apply_pending_slide();
}

/// Octave of a note
#[inline]
pub(crate) fn octave_of(note: u8) -> u8 {
    note / NOTE_RANGE as u8
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::driver::tables::{NoteTables, VibratoTable};
    use crate::module::TrackerModule;
    use crate::types::{Machine, PeriodTable, SoundChipSet};

    pub fn module() -> TrackerModule {
        TrackerModule::new(SoundChipSet::all(), 8)
    }

    pub fn table(kind: PeriodTable) -> Arc<[u32]> {
        NoteTables::build(&module()).table(kind)
    }

    pub fn vibrato() -> Arc<[i32]> {
        VibratoTable::build(crate::types::VibratoStyle::New)
    }

    pub fn machine() -> Machine {
        Machine::Ntsc
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn core() -> ChannelCore {
        let mut core = ChannelCore::new(ChannelId::Square1, 0x7FF, false);
        core.set_note_table(table(crate::types::PeriodTable::Ntsc));
        core.set_vibrato_table(vibrato());
        core
    }

    #[test]
    fn trigger_sets_period_from_table() {
        let mut c = core();
        c.trigger(48);
        assert_eq!(c.period(), c.note_period(48));
        assert!(c.gate());
        assert!(c.new_note());
        assert_eq!(c.output_volume(), 15);
    }

    #[test]
    fn low_note_period_is_clamped_at_output() {
        let mut c = core();
        c.trigger(0);
        assert!(c.note_period(0) > 0x7FF);
        assert_eq!(c.output_period(), 0x7FF);
    }

    #[test]
    fn portamento_glides_to_new_note() {
        let mut c = core();
        c.trigger(48);
        let start = c.period();
        c.handle_effect(EffectCommand {
            effect: Effect::Portamento,
            param: 4,
        });
        c.trigger(50);
        assert_eq!(c.period(), start);
        c.tick();
        assert_eq!(c.period(), start - 4);
        for _ in 0..100 {
            c.tick();
        }
        assert_eq!(c.period(), c.note_period(50));
    }

    #[test]
    fn arpeggio_cycles_three_steps() {
        let mut c = core();
        c.trigger(48);
        c.handle_effect(EffectCommand {
            effect: Effect::Arpeggio,
            param: 0x47,
        });
        let mut periods = Vec::new();
        for _ in 0..4 {
            c.tick();
            periods.push(c.period());
        }
        assert_eq!(
            periods,
            vec![
                c.note_period(48),
                c.note_period(52),
                c.note_period(55),
                c.note_period(48)
            ]
        );
    }

    #[test]
    fn note_cut_fires_after_delay() {
        let mut c = core();
        c.trigger(48);
        c.handle_effect(EffectCommand {
            effect: Effect::NoteCut,
            param: 2,
        });
        assert!(!c.tick().cut);
        assert!(!c.tick().cut);
        assert!(c.tick().cut);
        assert_eq!(c.output_volume(), 0);
    }

    #[test]
    fn volume_slide_reaches_silence() {
        let mut c = core();
        c.trigger(48);
        c.handle_effect(EffectCommand {
            effect: Effect::VolumeSlide,
            param: 0x0F,
        });
        for _ in 0..10 {
            c.tick();
        }
        assert_eq!(c.output_volume(), 0);
    }

    #[test]
    fn vibrato_is_symmetric_over_a_cycle() {
        let mut c = core();
        c.trigger(48);
        c.handle_effect(EffectCommand {
            effect: Effect::Vibrato,
            param: 0x1F,
        });
        let mut sum = 0;
        for _ in 0..64 {
            c.tick();
            sum += c.vibrato();
        }
        assert_eq!(sum, 0);
    }

    #[test]
    fn slide_up_moves_note_and_stops() {
        let mut c = core();
        c.trigger(48);
        c.handle_effect(EffectCommand {
            effect: Effect::SlideUp,
            param: 0xF2,
        });
        c.apply_pending_slide();
        assert_eq!(c.note(), Some(50));
        for _ in 0..20 {
            c.tick();
        }
        assert_eq!(c.period(), c.note_period(50));
        assert_eq!(c.pitch_effect(), PitchEffect::None);
    }

    #[test]
    fn state_string_lists_effects() {
        let mut c = core();
        c.trigger(48);
        c.handle_effect(EffectCommand {
            effect: Effect::Vibrato,
            param: 0x45,
        });
        let text = c.state_string();
        assert!(text.starts_with("C-4 vol F"));
        assert!(text.contains("445"));
    }
}
