/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! Embedded flash primitive layer.
//!
//! The STM32F1 flash controller only knows how to erase a whole page and program
//! a single half-word at a time, and both have to be polled on `BSY`.
//! [`FlashRegisters`] is the raw register surface, [`Flash`] puts the erase / program
//! protocol on top of it and is what the card registry talks to through [`FlashDevice`].
//!
//! Register usage (RM0008 flash programming manual)
//! +----------+-------------------------------------------------------------+
//! | FLASH_SR | BSY(0) busy, PGERR(2) program error, WRPRTERR(4), EOP(5)    |
//! | FLASH_CR | PG(0) program, PER(1) page erase, STRT(6) start, LOCK(7)    |
//! | FLASH_AR | page address for PER                                        |
//! | FLASH_KEYR | unlock with KEY1 then KEY2                                |
//! +----------+-------------------------------------------------------------+

use core::fmt;

use bit_field::BitField;

pub const FLASH_KEY1: u32 = 0x4567_0123;
pub const FLASH_KEY2: u32 = 0xCDEF_89AB;

/// Number of `FLASH_SR` reads before a busy flag is treated as stuck.
/// Page erase takes 20~40 ms worst case, this leaves a wide margin at 72 MHz.
pub const DEFAULT_BUSY_POLL_BUDGET: u32 = 4_000_000;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// `BSY` never cleared within the poll budget
    BusyTimeout,
    /// Key sequence written but controller still reports `LOCK`
    Locked,
    /// `PGERR`, programming a location that was not erased
    ProgramError,
    /// `WRPRTERR`, programming a write protected page
    WriteProtected,
    /// Half-word read back differs from what was programmed
    VerifyMismatch { address: u32 },
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::BusyTimeout => write!(f, "busy timeout"),
            FaultKind::Locked => write!(f, "unlock failed"),
            FaultKind::ProgramError => write!(f, "program error"),
            FaultKind::WriteProtected => write!(f, "write protected"),
            FaultKind::VerifyMismatch { address } => write!(f, "vfy 0x{:08X}", address),
        }
    }
}

/// Raw `FLASH_SR` value
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct FlashStatus(pub u32);

impl FlashStatus {
    pub const BSY: usize = 0;
    pub const PGERR: usize = 2;
    pub const WRPRTERR: usize = 4;
    pub const EOP: usize = 5;

    pub fn is_busy(&self) -> bool {
        self.0.get_bit(Self::BSY)
    }

    pub fn is_program_error(&self) -> bool {
        self.0.get_bit(Self::PGERR)
    }

    pub fn is_write_protect_error(&self) -> bool {
        self.0.get_bit(Self::WRPRTERR)
    }

    pub fn is_end_of_operation(&self) -> bool {
        self.0.get_bit(Self::EOP)
    }

    /// Only the sticky write-1-to-clear flags
    pub fn sticky(&self) -> Self {
        let mut ret = 0u32;
        ret.set_bit(Self::PGERR, self.is_program_error());
        ret.set_bit(Self::WRPRTERR, self.is_write_protect_error());
        ret.set_bit(Self::EOP, self.is_end_of_operation());
        Self(ret)
    }
}

/// Register level access to the embedded flash controller.
///
/// Reads of flash memory itself are here as well, since on target they are plain
/// volatile loads from the mapped address.
pub trait FlashRegisters {
    fn status(&self) -> FlashStatus;

    /// Write-1-to-clear on `FLASH_SR`
    fn clear_status(&mut self, flags: FlashStatus);

    fn is_locked(&self) -> bool;

    fn write_key(&mut self, key: u32);

    fn set_page_erase(&mut self, enable: bool);

    fn set_erase_address(&mut self, address: u32);

    /// Set `STRT`
    fn start(&mut self);

    /// Clear `STRT`
    fn clear_start(&mut self);

    fn set_program(&mut self, enable: bool);

    fn program_half_word(&mut self, address: u32, value: u16);

    fn read_u32(&self, address: u32) -> u32;

    fn read_u16(&self, address: u32) -> u16;

    fn read_u8(&self, address: u32) -> u8;
}

impl<T: FlashRegisters + ?Sized> FlashRegisters for &mut T {
    fn status(&self) -> FlashStatus {
        (**self).status()
    }

    fn clear_status(&mut self, flags: FlashStatus) {
        (**self).clear_status(flags)
    }

    fn is_locked(&self) -> bool {
        (**self).is_locked()
    }

    fn write_key(&mut self, key: u32) {
        (**self).write_key(key)
    }

    fn set_page_erase(&mut self, enable: bool) {
        (**self).set_page_erase(enable)
    }

    fn set_erase_address(&mut self, address: u32) {
        (**self).set_erase_address(address)
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn clear_start(&mut self) {
        (**self).clear_start()
    }

    fn set_program(&mut self, enable: bool) {
        (**self).set_program(enable)
    }

    fn program_half_word(&mut self, address: u32, value: u16) {
        (**self).program_half_word(address, value)
    }

    fn read_u32(&self, address: u32) -> u32 {
        (**self).read_u32(address)
    }

    fn read_u16(&self, address: u32) -> u16 {
        (**self).read_u16(address)
    }

    fn read_u8(&self, address: u32) -> u8 {
        (**self).read_u8(address)
    }
}

/// What the card registry needs from flash.
pub trait FlashDevice {
    /// Write the two key sequence to the unlock register.
    fn unlock(&mut self) -> Result<(), FaultKind>;

    /// Erase the page starting at `address`.
    /// `address` must be a page base, misalignment is not checked.
    fn erase_page(&mut self, address: u32) -> Result<(), FaultKind>;

    /// Program `data` half-word by half-word.
    /// Empty or odd length data is ignored without touching the controller.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FaultKind>;

    /// Copy `buf.len()` bytes starting at `address`. Never waits on busy.
    fn read(&mut self, address: u32, buf: &mut [u8]);
}

impl<T: FlashDevice + ?Sized> FlashDevice for &mut T {
    fn unlock(&mut self) -> Result<(), FaultKind> {
        (**self).unlock()
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FaultKind> {
        (**self).erase_page(address)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FaultKind> {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) {
        (**self).read(address, buf)
    }
}

/// Erase / program protocol with bounded busy polling.
pub struct Flash<R: FlashRegisters> {
    regs: R,
    poll_budget: u32,
}

impl<R: FlashRegisters> Flash<R> {
    pub const fn new(regs: R) -> Self {
        Self {
            regs,
            poll_budget: DEFAULT_BUSY_POLL_BUDGET,
        }
    }

    pub const fn with_poll_budget(mut self, poll_budget: u32) -> Self {
        self.poll_budget = poll_budget;
        self
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn release(self) -> R {
        self.regs
    }

    fn wait_ready(&mut self) -> Result<(), FaultKind> {
        for _ in 0..self.poll_budget {
            if !self.regs.status().is_busy() {
                return Ok(());
            }
        }

        hybrid_error!("flash BSY stuck after {} polls", self.poll_budget);
        Err(FaultKind::BusyTimeout)
    }

    /// Clear sticky flags and turn the error ones into a fault.
    fn take_errors(&mut self) -> Result<(), FaultKind> {
        let status = self.regs.status();
        let sticky = status.sticky();
        if sticky.0 != 0 {
            self.regs.clear_status(sticky);
        }

        if status.is_write_protect_error() {
            Err(FaultKind::WriteProtected)
        } else if status.is_program_error() {
            Err(FaultKind::ProgramError)
        } else {
            Ok(())
        }
    }

    fn unlock_if_locked(&mut self) -> Result<(), FaultKind> {
        match self.regs.is_locked() {
            true => self.unlock(),
            false => Ok(()),
        }
    }

    fn program_one(&mut self, address: u32, value: u16) -> Result<(), FaultKind> {
        self.regs.program_half_word(address, value);
        self.wait_ready()?;
        self.take_errors()?;

        match self.regs.read_u16(address) == value {
            true => Ok(()),
            false => Err(FaultKind::VerifyMismatch { address }),
        }
    }
}

impl<R: FlashRegisters> FlashDevice for Flash<R> {
    fn unlock(&mut self) -> Result<(), FaultKind> {
        self.regs.write_key(FLASH_KEY1);
        self.regs.write_key(FLASH_KEY2);

        match self.regs.is_locked() {
            true => Err(FaultKind::Locked),
            false => Ok(()),
        }
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FaultKind> {
        self.wait_ready()?;
        self.unlock_if_locked()?;

        self.regs.set_page_erase(true);
        self.regs.set_erase_address(address);
        self.regs.start();

        let waited = self.wait_ready();

        // control bits are released even when the controller did not finish
        self.regs.set_page_erase(false);
        self.regs.clear_start();

        waited?;
        self.take_errors()
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FaultKind> {
        if data.is_empty() || data.len() % 2 != 0 {
            hybrid_warn!(
                "flash write ignored, address {:#x} length {}",
                address,
                data.len()
            );
            return Ok(());
        }

        self.wait_ready()?;
        self.unlock_if_locked()?;

        self.regs.set_program(true);

        let mut ret = Ok(());
        for (index, chunk) in data.chunks_exact(2).enumerate() {
            let target = address + (index as u32) * 2;
            let value = u16::from_le_bytes([chunk[0], chunk[1]]);

            if let Err(e) = self.program_one(target, value) {
                hybrid_error!("flash program failed at {:#x} : {:?}", target, e);
                ret = Err(e);
                break;
            }
        }

        self.regs.set_program(false);
        ret
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) {
        let mut address = address;
        let mut offset = 0;

        while offset < buf.len() {
            let remain = buf.len() - offset;

            let step = if address % 4 == 0 && remain >= 4 {
                buf[offset..offset + 4].copy_from_slice(&self.regs.read_u32(address).to_le_bytes());
                4
            } else if address % 2 == 0 && remain >= 2 {
                buf[offset..offset + 2].copy_from_slice(&self.regs.read_u16(address).to_le_bytes());
                2
            } else {
                buf[offset] = self.regs.read_u8(address);
                1
            };

            address += step as u32;
            offset += step;
        }
    }
}
