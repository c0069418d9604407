/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

mod registry;

use crate::flash::Flash;
use crate::registry::{CardRegistry, RegistryLayout};
use crate::types::CardId;

use self::sim_flash::SimFlash;

/// Tests never wait millions of polls on a stuck flag
pub(crate) const TEST_POLL_BUDGET: u32 = 64;

pub(crate) type SimRegistry = CardRegistry<Flash<SimFlash>>;

pub(crate) fn sim_device(sim: SimFlash) -> Flash<SimFlash> {
    Flash::new(sim).with_poll_budget(TEST_POLL_BUDGET)
}

pub(crate) fn open_registry(sim: SimFlash) -> SimRegistry {
    CardRegistry::init(sim_device(sim), RegistryLayout::default())
}

/// Power cycle, the array survives and the controller comes back locked.
pub(crate) fn reboot(registry: SimRegistry) -> SimRegistry {
    let sim = registry.into_flash().release();
    open_registry(sim.reboot())
}

pub(crate) fn slave(n: u8) -> CardId {
    CardId::from_uid([0x10, 0x20, n, 0x5A])
}
