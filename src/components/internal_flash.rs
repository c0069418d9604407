/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! STM32F1 embedded flash controller registers for the card registry.

use core::sync::atomic::{fence, Ordering};

use door_access_core::{FlashRegisters, FlashStatus};
use embassy_stm32::pac;
use embassy_stm32::pac::flash::regs::Sr;
use embassy_stm32::peripherals::FLASH;

/// Holds the `FLASH` peripheral so nothing else in the firmware programs the array.
pub struct InternalFlash {
    _flash: FLASH,
}

impl InternalFlash {
    pub fn new(flash: FLASH) -> Self {
        Self { _flash: flash }
    }
}

impl FlashRegisters for InternalFlash {
    fn status(&self) -> FlashStatus {
        FlashStatus(pac::FLASH.sr().read().0)
    }

    fn clear_status(&mut self, flags: FlashStatus) {
        pac::FLASH.sr().write_value(Sr(flags.0));
    }

    fn is_locked(&self) -> bool {
        pac::FLASH.cr().read().lock()
    }

    fn write_key(&mut self, key: u32) {
        pac::FLASH.keyr().write(|w| w.set_fkeyr(key));
    }

    fn set_page_erase(&mut self, enable: bool) {
        pac::FLASH.cr().modify(|w| w.set_per(enable));
    }

    fn set_erase_address(&mut self, address: u32) {
        pac::FLASH.ar().write(|w| w.set_far(address));
    }

    fn start(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_strt(true));
    }

    fn clear_start(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_strt(false));
    }

    fn set_program(&mut self, enable: bool) {
        pac::FLASH.cr().modify(|w| w.set_pg(enable));
    }

    fn program_half_word(&mut self, address: u32, value: u16) {
        fence(Ordering::SeqCst);
        // PG is set, the controller turns this store into a half-word program
        unsafe { core::ptr::write_volatile(address as *mut u16, value) };
        fence(Ordering::SeqCst);
    }

    fn read_u32(&self, address: u32) -> u32 {
        unsafe { core::ptr::read_volatile(address as *const u32) }
    }

    fn read_u16(&self, address: u32) -> u16 {
        unsafe { core::ptr::read_volatile(address as *const u16) }
    }

    fn read_u8(&self, address: u32) -> u8 {
        unsafe { core::ptr::read_volatile(address as *const u8) }
    }
}
