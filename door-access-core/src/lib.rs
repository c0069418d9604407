/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! Hardware independent part of the rfid door controller.
//!
//! The firmware binary wires real peripherals into the traits of this crate, while
//! the host test-suite wires a simulated NOR flash and mocked reader / display.
//!
//! | Module | Purpose |
//! | ------ | ------- |
//! | [`flash`] | bounded busy-wait erase / program / read protocol on top of raw registers |
//! | [`registry`] | double buffered slave card table with crash consistent generation swap |
//! | [`controller`] | master / slave card state machine and door cycle |
//! | [`types`] | card identifiers, generation markers, outcomes |

#![no_std]

#[cfg(test)] // for the print out internnal log in test code
extern crate std;

#[macro_use]
mod common;

pub mod controller;
pub mod flash;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use controller::{
    AccessController, AccessControllerState, AccessMode, CardReader, ControllerConfig, DoorCycle,
    Presentation, TickSource,
};
pub use flash::{FaultKind, Flash, FlashDevice, FlashRegisters, FlashStatus};
pub use registry::{CardRegistry, RegistryLayout, SlaveTable, MAX_SLAVE_CARDS};
pub use types::*;
