//! Chip-level behaviour seen through the public bus and model API

use famitone::apu::{Chip, ChipModel, Mixer, N163};
use famitone::constants::MASTER_CLOCK_NTSC;
use famitone::{Apu, ChannelId, EngineConfig, Machine, SoundChip, SoundChipSet};

/// A handful of writes that start a tone on each chip
fn key_on(chip: SoundChip) -> Vec<(u16, u8)> {
    match chip {
        SoundChip::Apu => vec![
            (0x4015, 0x0F),
            (0x4000, 0xBF),
            (0x4002, 0xFD),
            (0x4003, 0x08),
            (0x4008, 0xFF),
            (0x400A, 0x80),
            (0x400B, 0x08),
        ],
        SoundChip::Vrc6 => vec![(0x9000, 0x7F), (0x9001, 0x80), (0x9002, 0x80)],
        SoundChip::Vrc7 => vec![
            (0x9010, 0x30),
            (0x9030, 0x10),
            (0x9010, 0x10),
            (0x9030, 0x80),
            (0x9010, 0x20),
            (0x9030, 0x1C),
        ],
        SoundChip::Fds => vec![
            (0x4089, 0x80),
            (0x4040, 0x3F),
            (0x4089, 0x00),
            (0x4080, 0xBF),
            (0x4082, 0x00),
            (0x4083, 0x04),
        ],
        SoundChip::Mmc5 => vec![
            (0x5015, 0x03),
            (0x5000, 0xBF),
            (0x5002, 0xFD),
            (0x5003, 0x08),
        ],
        SoundChip::N163 => vec![
            (0xF800, 0xFF),
            (0x4800, 0x0F),
            (0xF800, 0xF8),
            (0x4800, 0x00),
            (0x4800, 0x00),
            (0x4800, 0x00),
            (0x4800, 0x00),
            (0x4800, 0xE1),
        ],
        SoundChip::S5b => vec![
            (0xC000, 0x07),
            (0xE000, 0x3E),
            (0xC000, 0x00),
            (0xE000, 0x40),
            (0xC000, 0x08),
            (0xE000, 0x0F),
        ],
    }
}

#[test]
fn test_processing_zero_cycles_emits_nothing() {
    for chip in SoundChip::ALL {
        let mut model = Chip::new(chip, Machine::Ntsc);
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        for (address, value) in key_on(chip) {
            model.model_mut().write(address, value);
        }
        model.model_mut().process(0, &mut mixer);
        assert_eq!(mixer.total_delta_count(), 0, "{chip:?}");
    }
}

#[test]
fn test_reset_chips_stay_silent() {
    for chip in SoundChip::ALL {
        let mut model = Chip::new(chip, Machine::Ntsc);
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        for (address, value) in key_on(chip) {
            model.model_mut().write(address, value);
        }
        model.model_mut().reset();
        model.model_mut().process(50_000, &mut mixer);
        assert_eq!(mixer.total_delta_count(), 0, "{chip:?}");
    }
}

#[test]
fn test_n163_slots_cover_every_voice_in_use() {
    for count in 1..=8u8 {
        let mut chip = N163::new();
        let mut mixer = Mixer::new(MASTER_CLOCK_NTSC, 44_100);
        chip.write(0xF800, 0x7F);
        chip.write(0x4800, (count - 1) << 4);

        let rotations = 10u64;
        let cycles = 15 * count as u64 * rotations;
        chip.process(cycles as u32, &mut mixer);

        let first = 8 - count as usize;
        let total: u64 = (first..8).map(|block| chip.slot_cycles(block)).sum();
        assert_eq!(total, cycles, "{count} voices");
        for block in first..8 {
            assert_eq!(chip.slot_cycles(block), 15 * rotations, "block {block}");
        }
        for block in 0..first {
            assert_eq!(chip.slot_cycles(block), 0, "block {block}");
        }
        assert_eq!(chip.active_slot(), 7);
    }
}

fn n163_write(apu: &mut Apu, address: u8, value: u8) {
    apu.write(0xF800, address);
    apu.write(0x4800, value);
}

#[test]
fn test_n163_idle_voice_does_not_reach_the_mixer() {
    let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
    apu.set_chips(SoundChipSet::N163);

    // 32-sample square wave at RAM 0x00
    apu.write(0xF800, 0x80);
    for _ in 0..16 {
        apu.write(0x4800, 0xF0);
    }

    for channel in 0..4u8 {
        let base = 0x78 - channel * 8;
        let freq_hi = if channel == 1 { 0xE0 } else { 0xE1 };
        n163_write(&mut apu, base + 4, freq_hi);
        n163_write(&mut apu, base + 6, 0x00);
        let volume = if channel == 0 { 0x30 | 0x0F } else { 0x0F };
        n163_write(&mut apu, base + 7, volume);
    }

    apu.add_time(15 * 4 * 200);
    apu.process();

    let mixer = apu.mixer();
    assert_eq!(mixer.delta_count(ChannelId::N163Ch2), 0);
    for channel in [ChannelId::N163Ch1, ChannelId::N163Ch3, ChannelId::N163Ch4] {
        assert!(mixer.delta_count(channel) > 0, "{channel:?}");
    }
    assert!(apu.freq(SoundChip::N163, 0) > 0.0);
    assert_eq!(apu.freq(SoundChip::N163, 1), 0.0);
    assert_eq!(apu.freq(SoundChip::N163, 5), 0.0);
}

#[test]
fn test_frame_sample_count_follows_the_rate() {
    let mut apu = Apu::new(Machine::Ntsc, &EngineConfig::default());
    let mut total = 0;
    for _ in 0..60 {
        apu.add_time(MASTER_CLOCK_NTSC / 60);
        total += apu.end_frame();
    }
    let expected = 44_100i64;
    assert!((total as i64 - expected).abs() <= 2, "{total}");
}
