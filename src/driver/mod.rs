//! Tracker sound driver
//!
//! [`SoundDriver`] owns the chip handlers and one [`TrackerChannel`] per
//! channel. Each [`SoundDriver::tick`] first advances the player (when
//! playing): the [`TempoCounter`] decides whether a row is due, the row is
//! read from the song, global effects are applied and the remaining cells are
//! queued at [`NotePriority::Prio1`]. Then every channel in the module's order
//! consumes its mailbox and writes its registers, bracketed by the chip
//! handlers' `refresh_before`/`refresh_after` passes.

pub mod cursor;
pub mod tables;
pub mod tempo;
pub mod tracker_channel;

use std::fmt;
use std::sync::Arc;

pub use cursor::PlayerCursor;
pub use tables::{NoteTables, VibratoTable};
pub use tempo::TempoCounter;
pub use tracker_channel::{is_effect_compatible, is_instrument_compatible, TrackerChannel};

use crate::apu::Apu;
use crate::channel::{ChannelHandler, ChipHandler};
use crate::chip_service::SoundChipService;
use crate::constants::{MAX_GROOVE, VIBRATO_TABLE_SIZE};
use crate::error::Result;
use crate::module::{ChannelMap, ModuleSource};
use crate::types::{
    ChanNote, ChannelId, Effect, EffectCommand, NotePriority, PeriodTable, SoundChip,
    SoundChipSet, VibratoStyle, CHANNEL_COUNT,
};

/// Player state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverState {
    /// Not stepping rows; queued notes still play
    #[default]
    Stopped,
    /// Stepping rows
    Playing,
    /// A halt was requested; the generator should stop at the next tick
    Halting,
}

/// Callbacks from the player, typically implemented by a UI or renderer
pub trait PlayerObserver: Send {
    /// Once per player tick, before any row is read
    fn on_tick(&mut self) {}

    /// After all channels of a row were queued
    fn on_step_row(&mut self) {}

    /// A cell is about to play on `channel`
    fn on_play_note(&mut self, _channel: ChannelId, _note: &ChanNote) {}

    /// The cursor moved to `frame`/`row`
    fn on_update_row(&mut self, _frame: usize, _row: usize) {}

    /// Request a halt, e.g. once enough loops were rendered
    fn should_stop_player(&self) -> bool {
        false
    }

    /// Cells of muted channels are not queued
    fn is_channel_muted(&self, _channel: ChannelId) -> bool {
        false
    }

    /// Auto-arpeggio note for `channel`
    fn arp_note(&mut self, _channel: ChannelId) -> Option<u8> {
        None
    }
}

struct Track {
    mailbox: Arc<TrackerChannel>,
    chip: Option<usize>,
}

/// Top-level player and channel scheduler
pub struct SoundDriver {
    chips: Vec<ChipHandler>,
    tracks: Vec<Track>,
    module: Option<Arc<dyn ModuleSource>>,
    tables: Option<NoteTables>,
    vibrato: Arc<[i32]>,
    tempo: TempoCounter,
    cursor: Option<PlayerCursor>,
    playing: bool,
    do_halt: bool,
    halt_request: bool,
    jump_to: Option<usize>,
    skip_to: Option<usize>,
    muted: [bool; CHANNEL_COUNT],
    observer: Option<Box<dyn PlayerObserver>>,
}

impl SoundDriver {
    /// Driver with handlers for every chip registered in `service`
    pub fn new(service: &SoundChipService) -> Result<Self> {
        let mut chips = Vec::new();
        for chip in service.chips() {
            chips.push(service.make_chip_handler(chip)?);
        }
        let mut tracks: Vec<Track> = (0..CHANNEL_COUNT)
            .map(|_| Track {
                mailbox: Arc::new(TrackerChannel::new()),
                chip: None,
            })
            .collect();
        for (index, chip) in chips.iter_mut().enumerate() {
            chip.visit_channel_handlers(|handler| {
                tracks[handler.channel_id().index()].chip = Some(index);
            });
        }
        Ok(Self {
            chips,
            tracks,
            module: None,
            tables: None,
            vibrato: VibratoTable::build(VibratoStyle::New),
            tempo: TempoCounter::new(),
            cursor: None,
            playing: false,
            do_halt: false,
            halt_request: false,
            jump_to: None,
            skip_to: None,
            muted: [false; CHANNEL_COUNT],
            observer: None,
        })
    }

    /// Play `module`; tables are rebuilt
    pub fn assign_module(&mut self, module: Arc<dyn ModuleSource>) {
        self.module = Some(module);
        self.configure_document();
    }

    /// Module being played
    pub fn module(&self) -> Option<&Arc<dyn ModuleSource>> {
        self.module.as_ref()
    }

    /// Rebuild period and vibrato tables after a tuning, region or chip change
    pub fn configure_document(&mut self) {
        let Some(module) = self.module.clone() else {
            return;
        };
        let machine = module.machine();
        let tables = NoteTables::build(module.as_ref());
        self.vibrato = VibratoTable::build(module.vibrato_style());
        for chip in &mut self.chips {
            chip.configure_document(module.as_ref());
            chip.visit_channel_handlers(|handler| {
                handler.init_channel(self.vibrato.clone());
                if let Some(table) = tables.for_channel(handler.channel_id(), machine) {
                    handler.set_note_table(table);
                }
            });
        }
        self.tables = Some(tables);
        log::debug!(
            "driver configured: {:?}, chips {:?}, {} N163 channels",
            machine,
            module.chips(),
            module.namco_channels()
        );
    }

    /// Channel order for a cartridge with `chips`
    pub fn make_channel_map(&self, chips: SoundChipSet, n163_channels: usize) -> ChannelMap {
        let mut map = ChannelMap::new(chips, n163_channels);
        for channel in ChannelId::ALL {
            if self.tracks[channel.index()].chip.is_some() && map.supports_channel(channel) {
                map.channel_order_mut().add_channel(channel);
            }
        }
        map
    }

    /// Mailbox of `channel`, shareable with other threads
    pub fn tracker_channel(&self, channel: ChannelId) -> Arc<TrackerChannel> {
        self.tracks[channel.index()].mailbox.clone()
    }

    /// Handlers of `chip`
    pub fn chip_handler(&self, chip: SoundChip) -> Option<&ChipHandler> {
        self.chips.iter().find(|c| c.chip() == chip)
    }

    /// Handler playing `channel`
    pub fn channel_handler(&self, channel: ChannelId) -> Option<&dyn ChannelHandler> {
        let index = self.tracks[channel.index()].chip?;
        self.chips[index].channel(channel)
    }

    /// Install or remove the player observer
    pub fn set_observer(&mut self, observer: Option<Box<dyn PlayerObserver>>) {
        self.observer = observer;
    }

    /// Detach the player observer
    pub fn take_observer(&mut self) -> Option<Box<dyn PlayerObserver>> {
        self.observer.take()
    }

    /// Mute or unmute `channel`
    pub fn set_channel_muted(&mut self, channel: ChannelId, muted: bool) {
        self.muted[channel.index()] = muted;
    }

    /// Mutes set through [`Self::set_channel_muted`], indexed by channel;
    /// observer mutes are not included
    pub fn muted_channels(&self) -> [bool; CHANNEL_COUNT] {
        self.muted
    }

    /// Replace every driver-side mute at once
    pub fn set_muted_channels(&mut self, muted: [bool; CHANNEL_COUNT]) {
        self.muted = muted;
    }

    /// Whether cells for `channel` are dropped
    pub fn is_channel_muted(&self, channel: ChannelId) -> bool {
        self.muted[channel.index()]
            || self
                .observer
                .as_ref()
                .is_some_and(|o| o.is_channel_muted(channel))
    }

    /// Begin stepping rows from `cursor`
    pub fn start_player(&mut self, cursor: PlayerCursor) {
        if let Some(module) = &self.module {
            self.tempo.load_song(module.as_ref(), cursor.song().as_ref());
        }
        log::debug!(
            "player started at frame {} row {}",
            cursor.frame(),
            cursor.row()
        );
        self.cursor = Some(cursor);
        self.playing = true;
        self.halt_request = false;
        self.jump_to = None;
        self.skip_to = None;
        self.do_halt = false;
    }

    /// Stop stepping rows
    pub fn stop_player(&mut self) {
        if self.playing {
            log::debug!("player stopped");
        }
        self.playing = false;
        self.do_halt = false;
        self.halt_request = false;
    }

    /// Reset every chip, channel handler and mailbox
    pub fn reset_tracks(&mut self, apu: &mut Apu) {
        for chip in &mut self.chips {
            chip.reset_chip(apu);
        }
        for track in &self.tracks {
            track.mailbox.reset();
        }
    }

    /// Whether rows are being stepped
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the generator should stop now
    #[inline]
    pub fn should_halt(&self) -> bool {
        self.halt_request
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        match (self.playing, self.do_halt || self.halt_request) {
            (false, _) => DriverState::Stopped,
            (true, false) => DriverState::Playing,
            (true, true) => DriverState::Halting,
        }
    }

    /// Playback position, while a song is loaded
    pub fn player_cursor(&self) -> Option<&PlayerCursor> {
        self.cursor.as_ref()
    }

    /// Tempo state
    pub fn tempo_counter(&self) -> &TempoCounter {
        &self.tempo
    }

    /// Queue a cell for `channel`; dropped when no handler plays it
    pub fn queue_note(&self, channel: ChannelId, note: ChanNote, priority: NotePriority) {
        let track = &self.tracks[channel.index()];
        if track.chip.is_some() {
            track.mailbox.set_note(note, priority);
        }
    }

    /// Reload the instrument of `channel` with its next note
    pub fn force_reload_instrument(&mut self, channel: ChannelId) {
        if self.module.is_none() {
            return;
        }
        if let Some(index) = self.tracks[channel.index()].chip {
            if let Some((handler, _)) = self.chips[index].parts_mut(channel) {
                handler.force_reload_instrument();
            }
        }
    }

    /// Note sounding on `channel`, -1 when silent or unassigned
    pub fn channel_note(&self, channel: ChannelId) -> i32 {
        self.channel_handler(channel).map_or(-1, |h| h.active_note())
    }

    /// Output volume of `channel`, 0 when unassigned
    pub fn channel_volume(&self, channel: ChannelId) -> i32 {
        self.channel_handler(channel).map_or(0, |h| h.channel_volume())
    }

    /// Diagnostic summary of `channel`, empty when unassigned
    pub fn channel_state_string(&self, channel: ChannelId) -> String {
        self.channel_handler(channel)
            .map(|h| h.state_string())
            .unwrap_or_default()
    }

    /// Period table entry, 0 before a module is assigned
    pub fn read_period_table(&self, note: usize, kind: PeriodTable) -> u32 {
        self.tables
            .as_ref()
            .map_or(0, |t| t.read_period_table(note, kind))
    }

    /// Vibrato table entry, 0 when out of range
    pub fn read_vibrato_table(&self, index: usize) -> i32 {
        if index >= VIBRATO_TABLE_SIZE {
            return 0;
        }
        self.vibrato.get(index).copied().unwrap_or(0)
    }

    /// Run one engine tick
    pub fn tick(&mut self, apu: &mut Apu) {
        if self.playing {
            self.player_tick();
        }
        self.update_channels(apu);
    }

    fn player_tick(&mut self) {
        let Some(module) = self.module.clone() else {
            return;
        };
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };
        cursor.tick();
        if let Some(observer) = self.observer.as_mut() {
            observer.on_tick();
        }

        let mut stepped = false;
        if self.tempo.can_step_row() {
            if self.do_halt {
                self.halt_request = true;
            } else {
                stepped = true;
                self.tempo.step_row();
                for channel in module.channel_order().iter() {
                    self.step_row(channel, module.as_ref());
                }
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_step_row();
                }
            }
        }
        self.tempo.tick();

        if self.observer.as_ref().is_some_and(|o| o.should_stop_player()) {
            self.halt_request = true;
        } else if stepped && !self.do_halt {
            let (jump, skip) = (self.jump_to.take(), self.skip_to.take());
            let Some(cursor) = self.cursor.as_mut() else {
                return;
            };
            match (jump, skip) {
                (Some(frame), _) => cursor.do_bxx(frame),
                (None, Some(row)) => cursor.do_dxx(row),
                (None, None) => cursor.step_row(),
            }
            let (frame, row) = (cursor.frame(), cursor.row());
            log::trace!("row {frame:02X}:{row:02X}");
            if let Some(observer) = self.observer.as_mut() {
                observer.on_update_row(frame, row);
            }
        }
        if self.halt_request {
            log::debug!("player halting");
        }
    }

    fn step_row(&mut self, channel: ChannelId, module: &dyn ModuleSource) {
        let Some(cursor) = self.cursor.as_ref() else {
            return;
        };
        let mut note = cursor.get_note(channel);
        self.handle_global_effects(&mut note, module);
        if !self.is_channel_muted(channel) {
            self.queue_note(channel, note, NotePriority::Prio1);
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_play_note(channel, &note);
        }
    }

    fn handle_global_effects(&mut self, note: &mut ChanNote, module: &dyn ModuleSource) {
        for cmd in &mut note.effects {
            let param = cmd.param;
            match cmd.effect {
                Effect::Speed => self.tempo.do_fxx(param.max(1)),
                Effect::Groove => self.tempo.do_oxx(module, param % MAX_GROOVE),
                Effect::Jump => self.jump_to = Some(param as usize),
                Effect::Skip => self.skip_to = Some(param as usize),
                Effect::Halt => {
                    self.do_halt = true;
                    if let Some(cursor) = self.cursor.as_mut() {
                        cursor.do_cxx();
                    }
                }
                _ => continue,
            }
            *cmd = EffectCommand::default();
        }
    }

    fn update_channels(&mut self, apu: &mut Apu) {
        let Some(module) = self.module.clone() else {
            return;
        };
        for chip in &mut self.chips {
            chip.refresh_before(apu);
        }

        // Refresh in channel-id order so register writes do not follow the
        // module's column layout
        let order = module.channel_order();
        for channel in ChannelId::ALL.into_iter().filter(|&c| order.has_channel(c)) {
            let track = &self.tracks[channel.index()];
            let Some(index) = track.chip else {
                continue;
            };
            let arp = self
                .observer
                .as_mut()
                .and_then(|o| o.arp_note(channel))
                .filter(|&n| n > 0);
            let Some((handler, shared)) = self.chips[index].parts_mut(channel) else {
                continue;
            };
            if let Some(note) = arp {
                handler.arpeggiate(note);
            }
            if track.mailbox.new_note_data() {
                handler.play_note(track.mailbox.get_note(), module.as_ref());
            }
            handler.set_pitch(track.mailbox.pitch());
            if self.halt_request {
                handler.reset_channel();
            } else {
                handler.process_channel(module.as_ref());
            }
            handler.refresh_channel(apu, shared);
            handler.finish_tick();
            track.mailbox.set_volume_meter(handler.channel_volume());
        }

        for chip in &mut self.chips {
            chip.refresh_after(apu);
        }
    }
}

impl fmt::Debug for SoundDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundDriver")
            .field("chips", &self.chips.iter().map(|c| c.chip()).collect::<Vec<_>>())
            .field("state", &self.state())
            .field("cursor", &self.cursor)
            .field("tempo", &self.tempo)
            .finish_non_exhaustive()
    }
}
