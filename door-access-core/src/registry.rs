/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! Persistent slave card table.
//!
//! Memory Map - STM32F103 embedded flash, 2KB pages.
//! +------------- 0x0800_8000 --------------+------------- 0x0800_8800 --------------+
//! |  Sector A : Primary generation         |  Sector B : Secondary generation       |
//! |  +------+-------------------+-------+  |  +------+-------------------+-------+  |
//! |  | 0x00 | card id (5 bytes) | pad 3 |  |  | 0x00 | card id (5 bytes) | pad 3 |  |
//! |  | 0x08 | card id (5 bytes) | pad 3 |  |  | 0x08 | card id (5 bytes) | pad 3 |  |
//! |  | ...  | ...               | ...   |  |  | ...  | ...               | ...   |  |
//! |  | 0x188| card id (5 bytes) | pad 3 |  |  | 0x188| card id (5 bytes) | pad 3 |  |
//! |  +------+-------------------+-------+  |  +------+-------------------+-------+  |
//! +------------- 0x0800_9000 --------------+----------------------------------------+
//! |  Sector C : pointer                    |
//! |  +------+---------------------------+  |   0xFF01 : Primary is active
//! |  | 0x00 | marker u16 little endian  |  |   0xFF02 : Secondary is active
//! |  +------+---------------------------+  |   else   : Primary is active
//! +----------------------------------------+
//!
//! Flash bits only go from 1 to 0 without a page erase, so a single slot can not be
//! rewritten in place. Every change writes the whole table to the inactive sector,
//! then flips the pointer, then erases the stale sector. Whichever step power is
//! lost in, the pointer names a sector that was completely written.

use static_assertions::*;

use crate::flash::{FaultKind, FlashDevice};
use crate::types::*;

pub const MAX_SLAVE_CARDS: usize = 50;
pub const FLASH_PAGE_SIZE: u32 = 2048;
pub const SLOT_STRIDE: u32 = 8;
/// Bytes actually programmed per slot, card id plus one pad byte for half-word alignment.
pub const SLOT_RECORD_LEN: usize = 6;

const_assert!(MAX_SLAVE_CARDS as u32 * SLOT_STRIDE <= FLASH_PAGE_SIZE);
const_assert!(SLOT_RECORD_LEN % 2 == 0);
const_assert!(SLOT_RECORD_LEN >= CARD_ID_LEN);
const_assert!(SLOT_RECORD_LEN as u32 <= SLOT_STRIDE);

pub type SlaveTable = [CardId; MAX_SLAVE_CARDS];

/// Page base addresses of the three sectors
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RegistryLayout {
    pub primary: u32,
    pub secondary: u32,
    pub pointer: u32,
}

impl RegistryLayout {
    pub const fn default() -> Self {
        Self {
            primary: 0x0800_8000,
            secondary: 0x0800_8800,
            pointer: 0x0800_9000,
        }
    }

    pub const fn sector(&self, generation: Generation) -> u32 {
        match generation {
            Generation::Primary => self.primary,
            Generation::Secondary => self.secondary,
        }
    }

    pub const fn slot_address(&self, generation: Generation, index: usize) -> u32 {
        self.sector(generation) + (index as u32) * SLOT_STRIDE
    }
}

impl Default for RegistryLayout {
    fn default() -> Self {
        Self::default()
    }
}

pub struct CardRegistry<F: FlashDevice> {
    flash: F,
    layout: RegistryLayout,
    master: CardId,
    active: Generation,
    slaves: SlaveTable,
}

impl<F: FlashDevice> CardRegistry<F> {
    /// Rebuild in-memory table from whichever generation the pointer sector names.
    /// Should be called once on boot before anything else touches the sectors.
    pub fn init(mut flash: F, layout: RegistryLayout) -> Self {
        let marker = Self::read_marker(&mut flash, &layout);
        let active = Generation::from_marker(marker);

        let slaves = Self::read_generation(&mut flash, &layout, active);

        let ret = Self {
            flash,
            layout,
            master: MASTER_CARD_ID,
            active,
            slaves,
        };

        hybrid_info!(
            "card registry : marker {:#x}, active {:?}, {} cards",
            marker,
            active,
            ret.len()
        );

        ret
    }

    /// Replace the compiled-in master card
    pub fn with_master(mut self, master: CardId) -> Self {
        self.master = master;
        self
    }

    fn read_marker(flash: &mut F, layout: &RegistryLayout) -> u16 {
        let mut raw_marker = [0u8; 2];
        flash.read(layout.pointer, &mut raw_marker);
        u16::from_le_bytes(raw_marker)
    }

    fn read_generation(flash: &mut F, layout: &RegistryLayout, generation: Generation) -> SlaveTable {
        let mut table = [CardId::EMPTY; MAX_SLAVE_CARDS];

        for (index, slot) in table.iter_mut().enumerate() {
            let mut raw = [0u8; CARD_ID_LEN];
            flash.read(layout.slot_address(generation, index), &mut raw);
            *slot = CardId::new(raw);
        }

        table
    }

    pub fn active_generation(&self) -> Generation {
        self.active
    }

    pub fn layout(&self) -> &RegistryLayout {
        &self.layout
    }

    pub fn master(&self) -> CardId {
        self.master
    }

    pub fn slaves(&self) -> &SlaveTable {
        &self.slaves
    }

    /// Occupied slots only
    pub fn enrolled(&self) -> impl Iterator<Item = &CardId> + '_ {
        self.slaves.iter().filter(|x| !x.is_empty())
    }

    pub fn len(&self) -> usize {
        self.enrolled().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slaves.iter().all(|x| !x.is_empty())
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    pub fn is_master(&self, card: &CardId) -> bool {
        *card == self.master
    }

    pub fn contains(&self, card: &CardId) -> bool {
        !card.is_empty() && self.slaves.iter().any(|x| x == card)
    }

    pub fn classify(&self, card: Option<CardId>) -> CardClass {
        match card {
            None => CardClass::NoCard,
            Some(x) if self.is_master(&x) => CardClass::Master,
            Some(x) => CardClass::Slave(x),
        }
    }

    pub fn add(&mut self, card: CardId) -> Result<AddOutcome, FaultKind> {
        if card.is_empty() {
            // every empty slot already holds the sentinel
            hybrid_warn!("card registry : refuse to store empty sentinel");
            return Ok(AddOutcome::AlreadyPresent);
        }

        if self.contains(&card) {
            return Ok(AddOutcome::AlreadyPresent);
        }

        let Some(index) = self.slaves.iter().position(|x| x.is_empty()) else {
            hybrid_warn!("card registry : table full, {} not added", card);
            return Ok(AddOutcome::TableFull);
        };

        let mut table = self.slaves;
        table[index] = card;
        self.commit(table)?;

        hybrid_info!("card registry : {} added on slot {}", card, index);
        Ok(AddOutcome::Added)
    }

    pub fn remove(&mut self, card: CardId) -> Result<RemoveOutcome, FaultKind> {
        let Some(index) = self
            .slaves
            .iter()
            .position(|x| !card.is_empty() && *x == card)
        else {
            return Ok(RemoveOutcome::NotFound);
        };

        let mut table = self.slaves;
        table[index] = CardId::EMPTY;
        self.commit(table)?;

        hybrid_info!("card registry : {} removed from slot {}", card, index);
        Ok(RemoveOutcome::Removed)
    }

    /// Generation swap. Order matters and must not change:
    /// 1. inactive sector erased and fully written
    /// 2. pointer sector flipped to it
    /// 3. stale sector erased
    ///
    /// A fault in 2 may leave the pointer erased or torn, so memory is reloaded
    /// from whatever generation the pointer names before the error is returned.
    fn commit(&mut self, table: SlaveTable) -> Result<(), FaultKind> {
        let target = self.active.other();
        let stale = self.active;

        // 1
        self.flash.erase_page(self.layout.sector(target))?;
        for (index, card) in table.iter().enumerate() {
            if card.is_empty() {
                continue; // erased flash already reads as sentinel
            }

            let mut record = [0xFFu8; SLOT_RECORD_LEN];
            record[..CARD_ID_LEN].copy_from_slice(card.as_bytes());
            self.flash
                .write(self.layout.slot_address(target, index), &record)?;
        }

        // 2
        if let Err(e) = self.flip_pointer(target) {
            self.reload();
            hybrid_error!(
                "card registry : pointer flip to {:?} failed : {:?}, reloaded {:?}",
                target,
                e,
                self.active
            );
            return Err(e);
        }

        self.active = target;
        self.slaves = table;

        // 3
        if let Err(e) = self.flash.erase_page(self.layout.sector(stale)) {
            hybrid_warn!("card registry : stale {:?} sector erase failed : {:?}", stale, e);
        }

        hybrid_debug!("card registry : swapped {:?} -> {:?}", stale, target);
        Ok(())
    }

    fn flip_pointer(&mut self, target: Generation) -> Result<(), FaultKind> {
        self.flash.erase_page(self.layout.pointer)?;
        self.flash
            .write(self.layout.pointer, &target.marker().to_le_bytes())
    }

    /// Resync active flag and table with the pointer sector as it reads now
    fn reload(&mut self) {
        let marker = Self::read_marker(&mut self.flash, &self.layout);
        self.active = Generation::from_marker(marker);
        self.slaves = Self::read_generation(&mut self.flash, &self.layout, self.active);
    }
}
