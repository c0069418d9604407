/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use crate::flash::*;
use crate::registry::*;
use crate::types::*;

use super::sim_flash::*;
use super::*;

const LAYOUT: RegistryLayout = RegistryLayout::default();

fn enrolled_registry(count: u8) -> SimRegistry {
    let mut registry = open_registry(SimFlash::new());
    for n in 0..count {
        assert_eq!(registry.add(slave(n)), Ok(AddOutcome::Added));
    }
    registry
}

/// Same array, fresh controller prepared by `f`
fn reopen_with(registry: SimRegistry, f: impl FnOnce(&mut SimFlash)) -> SimRegistry {
    let mut sim = registry.into_flash().release().reboot();
    f(&mut sim);
    open_registry(sim)
}

fn sim(registry: &SimRegistry) -> &SimFlash {
    registry.flash().registers()
}

#[test]
fn blank_flash_boots_empty_primary() {
    let registry = open_registry(SimFlash::new());

    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(registry.is_empty());
    assert!(registry.slaves().iter().all(|x| x.is_empty()));
    assert_eq!(registry.master(), MASTER_CARD_ID);
}

#[test]
fn add_then_remove_alternates_generation() {
    let mut registry = open_registry(SimFlash::new());

    assert_eq!(registry.add(slave(1)), Ok(AddOutcome::Added));
    assert!(registry.contains(&slave(1)));
    assert_eq!(registry.active_generation(), Generation::Secondary);
    assert_eq!(sim(&registry).bytes(LAYOUT.pointer, 2), &[0x02, 0xFF]);
    assert!(sim(&registry).page_is_erased(LAYOUT.primary));

    assert_eq!(registry.remove(slave(1)), Ok(RemoveOutcome::Removed));
    assert!(!registry.contains(&slave(1)));
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert_eq!(sim(&registry).bytes(LAYOUT.pointer, 2), &[0x01, 0xFF]);
    assert!(sim(&registry).page_is_erased(LAYOUT.secondary));
    assert!(registry.is_empty());
}

#[test]
fn slot_record_is_id_and_padding() {
    let registry = enrolled_registry(2);
    let active = registry.active_generation();

    let slot1 = LAYOUT.slot_address(active, 1);
    let mut expected = [0xFFu8; SLOT_STRIDE as usize];
    expected[..CARD_ID_LEN].copy_from_slice(slave(1).as_bytes());
    assert_eq!(sim(&registry).bytes(slot1, SLOT_STRIDE as usize), &expected);

    // empty slots are left erased
    let slot2 = LAYOUT.slot_address(active, 2);
    assert_eq!(sim(&registry).bytes(slot2, SLOT_STRIDE as usize), &[0xFF; 8]);
}

#[test]
fn duplicate_add_does_not_touch_flash() {
    let mut registry = enrolled_registry(3);
    let before = sim(&registry).mutations();
    let active = registry.active_generation();

    assert_eq!(registry.add(slave(2)), Ok(AddOutcome::AlreadyPresent));
    assert_eq!(sim(&registry).mutations(), before);
    assert_eq!(registry.active_generation(), active);
    assert_eq!(registry.len(), 3);
}

#[test]
fn remove_unknown_does_not_touch_flash() {
    let mut registry = enrolled_registry(3);
    let before = sim(&registry).mutations();

    assert_eq!(registry.remove(slave(42)), Ok(RemoveOutcome::NotFound));
    assert_eq!(sim(&registry).mutations(), before);
}

#[test]
fn empty_sentinel_is_never_a_member() {
    let mut registry = enrolled_registry(1);

    assert!(!registry.contains(&CardId::EMPTY));
    assert_eq!(registry.add(CardId::EMPTY), Ok(AddOutcome::AlreadyPresent));
    assert_eq!(registry.remove(CardId::EMPTY), Ok(RemoveOutcome::NotFound));
    assert_eq!(registry.len(), 1);
}

#[test]
fn full_table_refuses_until_slot_freed() {
    let mut registry = enrolled_registry(MAX_SLAVE_CARDS as u8);
    assert!(registry.is_full());

    let before = sim(&registry).mutations();
    assert_eq!(registry.add(slave(200)), Ok(AddOutcome::TableFull));
    assert_eq!(sim(&registry).mutations(), before);

    assert_eq!(registry.remove(slave(17)), Ok(RemoveOutcome::Removed));
    assert!(!registry.is_full());
    assert_eq!(registry.add(slave(200)), Ok(AddOutcome::Added));
    assert_eq!(registry.slaves()[17], slave(200));
    assert!(registry.is_full());
}

#[test]
fn table_survives_reboot() {
    for count in [0u8, 1, 2, 25, 49, 50] {
        let registry = enrolled_registry(count);
        let table = *registry.slaves();
        let active = registry.active_generation();

        let registry = reboot(registry);
        assert_eq!(registry.slaves(), &table, "{} cards", count);
        assert_eq!(registry.active_generation(), active);
        assert_eq!(registry.len(), count as usize);
    }
}

#[test]
fn reboot_after_removal_keeps_hole() {
    let mut registry = enrolled_registry(5);
    assert_eq!(registry.remove(slave(2)), Ok(RemoveOutcome::Removed));

    let registry = reboot(registry);
    assert!(registry.slaves()[2].is_empty());
    assert!(registry.contains(&slave(4)));
    assert!(!registry.contains(&slave(2)));
    assert_eq!(registry.len(), 4);
}

#[test]
fn power_lost_before_pointer_flip_keeps_old_table() {
    let registry = enrolled_registry(1);
    let old = *registry.slaves();

    let mut registry = reopen_with(registry, |sim| {
        sim.set_power_cut(PowerCut::BeforeErase(LAYOUT.pointer))
    });
    let _ = registry.add(slave(9));
    assert!(!sim(&registry).is_powered());

    let registry = reboot(registry);
    assert_eq!(registry.slaves(), &old);
    assert_eq!(registry.active_generation(), Generation::Secondary);
}

#[test]
fn power_lost_before_stale_erase_keeps_new_table() {
    let registry = enrolled_registry(1);

    let mut registry = reopen_with(registry, |sim| {
        sim.set_power_cut(PowerCut::BeforeErase(LAYOUT.secondary))
    });
    let _ = registry.add(slave(9));
    assert!(!sim(&registry).is_powered());

    let registry = reboot(registry);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(registry.contains(&slave(0)));
    assert!(registry.contains(&slave(9)));
}

/// Cut power after every possible mutation of one swap, from both sides of the ping-pong.
#[test]
fn swap_is_atomic_under_power_loss() {
    for enrolled in [1u8, 2] {
        let reference = enrolled_registry(enrolled);
        let old = *reference.slaves();
        let mut new = old;
        new[enrolled as usize] = slave(100);

        // target erase + 3 half-words per card, pointer erase + marker, stale erase
        let total = 1 + 3 * (enrolled as usize + 1) + 2 + 1;

        for cut in 0..=total {
            let registry = enrolled_registry(enrolled);
            let mut registry =
                reopen_with(registry, |sim| sim.set_power_cut(PowerCut::AfterMutations(cut)));
            let _ = registry.add(slave(100));

            let registry = reboot(registry);
            let table = registry.slaves();
            assert!(
                *table == old || *table == new,
                "{} cards, cut after {} mutations",
                enrolled,
                cut
            );

            if cut >= total - 1 {
                assert_eq!(*table, new, "marker written, cut {}", cut);
            }
            if cut < total - 3 {
                assert_eq!(*table, old, "target incomplete, cut {}", cut);
            }
        }
    }
}

#[test]
fn pointer_torn_between_erase_and_write() {
    // active secondary, swap targets primary, blank pointer reads as primary
    let registry = enrolled_registry(1);
    let mut registry = reopen_with(registry, |sim| {
        sim.set_power_cut(PowerCut::AfterMutations(1 + 6 + 1))
    });
    let _ = registry.add(slave(100));
    let registry = reboot(registry);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(registry.contains(&slave(100)));

    // active primary, swap targets secondary, blank pointer falls back to the old primary
    let registry = enrolled_registry(2);
    let mut registry = reopen_with(registry, |sim| {
        sim.set_power_cut(PowerCut::AfterMutations(1 + 9 + 1))
    });
    let _ = registry.add(slave(100));
    let registry = reboot(registry);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(!registry.contains(&slave(100)));
    assert_eq!(registry.len(), 2);
}

#[test]
fn fault_while_writing_target_changes_nothing() {
    let registry = enrolled_registry(2);
    assert_eq!(registry.active_generation(), Generation::Primary);
    let old = *registry.slaves();

    let mut registry = reopen_with(registry, |sim| sim.protect_page(LAYOUT.secondary));
    assert_eq!(registry.add(slave(7)), Err(FaultKind::WriteProtected));
    assert_eq!(registry.slaves(), &old);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(!registry.contains(&slave(7)));

    let registry = reboot(registry);
    assert_eq!(registry.slaves(), &old);
}

#[test]
fn marker_write_fault_reloads_from_pointer() {
    // active secondary, pointer left blank after the fault now names the new primary table
    let registry = enrolled_registry(1);
    assert_eq!(registry.active_generation(), Generation::Secondary);

    let mut registry = reopen_with(registry, |sim| sim.set_weak_cell(LAYOUT.pointer));
    assert!(matches!(
        registry.add(slave(9)),
        Err(FaultKind::VerifyMismatch { .. })
    ));
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(registry.contains(&slave(0)));
    assert!(registry.contains(&slave(9)));

    // next swap must target secondary and leave the authoritative primary alone
    let primary_erases = sim(&registry).erase_count(LAYOUT.primary);
    assert!(matches!(
        registry.add(slave(10)),
        Err(FaultKind::VerifyMismatch { .. })
    ));
    assert_eq!(sim(&registry).erase_count(LAYOUT.primary), primary_erases);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(!registry.contains(&slave(10)));

    let active = registry.active_generation();
    let table = *registry.slaves();
    let registry = reboot(registry);
    assert_eq!(registry.active_generation(), active);
    assert_eq!(registry.slaves(), &table);
    assert!(registry.contains(&slave(0)));
}

#[test]
fn marker_write_fault_on_primary_keeps_old_table() {
    // active primary, blank pointer falls back to the untouched old table
    let registry = enrolled_registry(2);
    assert_eq!(registry.active_generation(), Generation::Primary);
    let old = *registry.slaves();

    let mut registry = reopen_with(registry, |sim| sim.set_weak_cell(LAYOUT.pointer));
    assert!(matches!(
        registry.remove(slave(1)),
        Err(FaultKind::VerifyMismatch { .. })
    ));
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert_eq!(registry.slaves(), &old);

    let registry = reboot(registry);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert_eq!(registry.slaves(), &old);
}

#[test]
fn stale_erase_fault_is_not_reported() {
    let registry = enrolled_registry(2);

    let mut registry = reopen_with(registry, |sim| sim.protect_page(LAYOUT.primary));
    assert_eq!(registry.add(slave(7)), Ok(AddOutcome::Added));
    assert_eq!(registry.active_generation(), Generation::Secondary);

    let registry = reboot(registry);
    assert!(registry.contains(&slave(7)));
}

#[test]
fn busy_timeout_is_surfaced() {
    let sim = enrolled_registry(1)
        .into_flash()
        .release()
        .reboot()
        .with_stuck_busy(StuckBusy::Always);
    let mut registry = open_registry(sim);

    assert_eq!(registry.add(slave(3)), Err(FaultKind::BusyTimeout));
    assert_eq!(registry.remove(slave(0)), Err(FaultKind::BusyTimeout));
    assert!(registry.contains(&slave(0)));
}

#[test]
fn unknown_marker_falls_back_to_primary() {
    let mut sim = SimFlash::new();
    sim.load(LAYOUT.pointer, &[0x34, 0x12]);
    sim.load(LAYOUT.slot_address(Generation::Secondary, 0), slave(5).as_bytes());

    let registry = open_registry(sim);
    assert_eq!(registry.active_generation(), Generation::Primary);
    assert!(registry.is_empty());
}

#[test]
fn secondary_marker_selects_secondary_sector() {
    let mut sim = SimFlash::new();
    sim.load(LAYOUT.pointer, &Generation::Secondary.marker().to_le_bytes());
    sim.load(LAYOUT.slot_address(Generation::Secondary, 3), slave(7).as_bytes());
    sim.load(LAYOUT.slot_address(Generation::Primary, 0), slave(8).as_bytes());

    let registry = open_registry(sim);
    assert_eq!(registry.active_generation(), Generation::Secondary);
    assert!(registry.contains(&slave(7)));
    assert!(!registry.contains(&slave(8)));
    assert_eq!(registry.slaves()[3], slave(7));
}

#[test]
fn every_swap_erases_both_sectors() {
    let registry = enrolled_registry(4);
    let sim = sim(&registry);

    assert_eq!(sim.erase_count(LAYOUT.primary), 4);
    assert_eq!(sim.erase_count(LAYOUT.secondary), 4);
    assert_eq!(sim.erase_count(LAYOUT.pointer), 4);
}

#[test]
fn classify_presented_cards() {
    let registry = enrolled_registry(1);
    assert_eq!(registry.classify(None), CardClass::NoCard);
    assert_eq!(registry.classify(Some(MASTER_CARD_ID)), CardClass::Master);
    assert_eq!(registry.classify(Some(slave(0))), CardClass::Slave(slave(0)));

    let registry = registry.with_master(slave(0));
    assert!(registry.is_master(&slave(0)));
    assert_eq!(
        registry.classify(Some(MASTER_CARD_ID)),
        CardClass::Slave(MASTER_CARD_ID)
    );
}
