/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! MFRC522 ISO14443A reader over SPI1, blocking.
//!
//! Only what a door lock needs: REQA, cascade level 1 anticollision and HLTA.
//! The 5 byte anticollision answer (4 byte uid + BCC) is the card identifier.
//!
//! SPI address byte
//! +-----+-----+-----+-----+-----+-----+-----+-----+
//! |  b7 |  b6 |  b5 |  b4 |  b3 |  b2 |  b1 |  b0 |
//! +-----+-----+-----+-----+-----+-----+-----+-----+
//! | R/W |          register address         |  0  |
//! +-----+-----+-----+-----+-----+-----+-----+-----+

use bit_field::BitField;
use door_access_core::{CardId, CardReader, CARD_ID_LEN};
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::SPI1;
use embassy_stm32::spi::Spi;
use embassy_time::{block_for, Duration, Instant};
use num_enum::IntoPrimitive;

pub type ReaderSpi = Spi<'static, SPI1, NoDma, NoDma>;

#[repr(u8)]
#[derive(Clone, Copy, IntoPrimitive)]
enum Register {
    Command = 0x01,
    ComIrq = 0x04,
    DivIrq = 0x05,
    Error = 0x06,
    FifoData = 0x09,
    FifoLevel = 0x0A,
    BitFraming = 0x0D,
    Mode = 0x11,
    TxControl = 0x14,
    TxAsk = 0x15,
    CrcResultH = 0x21,
    CrcResultL = 0x22,
    RfCfg = 0x26,
    TMode = 0x2A,
    TPrescaler = 0x2B,
    TReloadH = 0x2C,
    TReloadL = 0x2D,
    Version = 0x37,
}

#[repr(u8)]
#[derive(Clone, Copy, IntoPrimitive)]
enum PcdCommand {
    Idle = 0x00,
    CalcCrc = 0x03,
    Transceive = 0x0C,
    SoftReset = 0x0F,
}

const PICC_REQA: u8 = 0x26;
const PICC_ANTICOLL_CL1: [u8; 2] = [0x93, 0x20];
const PICC_HALT: [u8; 2] = [0x50, 0x00];

// ComIrqReg
const IRQ_TIMER: usize = 0;
const IRQ_IDLE: usize = 4;
const IRQ_RX: usize = 5;
// DivIrqReg
const IRQ_CRC: usize = 2;
// ErrorReg
const ERR_PROTOCOL: usize = 0;
const ERR_PARITY: usize = 1;
const ERR_COLLISION: usize = 3;
const ERR_BUFFER_OVERFLOW: usize = 4;
// BitFramingReg
const START_SEND: usize = 7;

/// Software guard on top of the reader's own 25 ms timer
const TRANSCEIVE_TIMEOUT: Duration = Duration::from_millis(36);
const CRC_TIMEOUT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum ReaderError {
    Spi,
    /// No answer, also the normal result when nothing is in the field
    Timeout,
    Collision,
    Protocol,
    /// Unexpected answer length
    Frame,
    /// Anticollision BCC does not match the uid
    Bcc,
}

impl From<embassy_stm32::spi::Error> for ReaderError {
    fn from(_: embassy_stm32::spi::Error) -> Self {
        ReaderError::Spi
    }
}

pub struct Mfrc522 {
    spi: ReaderSpi,
    cs: Output<'static, AnyPin>,
    rst: Output<'static, AnyPin>,
}

impl Mfrc522 {
    pub fn new(
        spi: ReaderSpi,
        cs: Output<'static, AnyPin>,
        rst: Output<'static, AnyPin>,
    ) -> Self {
        Self { spi, cs, rst }
    }

    /// Hard reset, then timer / modulation setup and antenna on.
    /// Returns chip version (0x91 or 0x92 for genuine parts).
    pub fn init(&mut self) -> Result<u8, ReaderError> {
        self.cs.set_high();
        self.rst.set_low();
        block_for(Duration::from_millis(1));
        self.rst.set_high();
        block_for(Duration::from_millis(50));

        self.command(PcdCommand::SoftReset)?;
        block_for(Duration::from_millis(50));

        // TAuto, prescaler 0xD3E -> 2 kHz tick, reload 30 -> 15 ms timeout
        self.write(Register::TMode, 0x8D)?;
        self.write(Register::TPrescaler, 0x3E)?;
        self.write(Register::TReloadL, 30)?;
        self.write(Register::TReloadH, 0)?;
        self.write(Register::RfCfg, 0x70)?; // 48 dB receiver gain
        self.write(Register::TxAsk, 0x40)?; // 100% ASK
        self.write(Register::Mode, 0x3D)?; // CRC preset 0x6363

        let tx_control = self.read(Register::TxControl)?;
        if tx_control & 0x03 != 0x03 {
            self.write(Register::TxControl, tx_control | 0x03)?;
        }

        self.read(Register::Version)
    }

    fn read(&mut self, reg: Register) -> Result<u8, ReaderError> {
        let address: u8 = reg.into();
        let mut buf = [(address << 1) | 0x80, 0x00];

        self.cs.set_low();
        let ret = self.spi.blocking_transfer_in_place(&mut buf);
        self.cs.set_high();

        ret?;
        Ok(buf[1])
    }

    fn write(&mut self, reg: Register, value: u8) -> Result<(), ReaderError> {
        let address: u8 = reg.into();

        self.cs.set_low();
        let ret = self.spi.blocking_write(&[(address << 1) & 0x7E, value]);
        self.cs.set_high();

        Ok(ret?)
    }

    fn modify(&mut self, reg: Register, f: impl FnOnce(&mut u8)) -> Result<(), ReaderError> {
        let mut value = self.read(reg)?;
        f(&mut value);
        self.write(reg, value)
    }

    fn command(&mut self, cmd: PcdCommand) -> Result<(), ReaderError> {
        self.write(Register::Command, cmd.into())
    }

    fn load_fifo(&mut self, data: &[u8]) -> Result<(), ReaderError> {
        self.write(Register::FifoLevel, 0x80)?; // flush
        for x in data {
            self.write(Register::FifoData, *x)?;
        }
        Ok(())
    }

    /// Send `tx`, collect the answer into `rx`. `tx_last_bits` is the number of bits
    /// sent from the last byte (0 means all 8).
    fn transceive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        tx_last_bits: u8,
    ) -> Result<usize, ReaderError> {
        self.command(PcdCommand::Idle)?;
        self.write(Register::ComIrq, 0x7F)?;
        self.load_fifo(tx)?;
        self.write(Register::BitFraming, tx_last_bits & 0x07)?;
        self.command(PcdCommand::Transceive)?;
        self.modify(Register::BitFraming, |x| {
            x.set_bit(START_SEND, true);
        })?;

        let deadline = Instant::now() + TRANSCEIVE_TIMEOUT;
        let waited = loop {
            let irq = self.read(Register::ComIrq)?;
            if irq.get_bit(IRQ_RX) || irq.get_bit(IRQ_IDLE) {
                break Ok(());
            }
            if irq.get_bit(IRQ_TIMER) || Instant::now() > deadline {
                break Err(ReaderError::Timeout);
            }
        };

        self.modify(Register::BitFraming, |x| {
            x.set_bit(START_SEND, false);
        })?;
        waited?;

        let error = self.read(Register::Error)?;
        if error.get_bit(ERR_BUFFER_OVERFLOW)
            || error.get_bit(ERR_PARITY)
            || error.get_bit(ERR_PROTOCOL)
        {
            return Err(ReaderError::Protocol);
        }
        if error.get_bit(ERR_COLLISION) {
            return Err(ReaderError::Collision);
        }

        let len = self.read(Register::FifoLevel)? as usize;
        if len > rx.len() {
            return Err(ReaderError::Frame);
        }
        for x in rx[..len].iter_mut() {
            *x = self.read(Register::FifoData)?;
        }

        Ok(len)
    }

    fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2], ReaderError> {
        self.command(PcdCommand::Idle)?;
        // Set2 = 0, ones written clear the marked flags
        self.write(Register::DivIrq, 1 << IRQ_CRC)?;
        self.load_fifo(data)?;
        self.command(PcdCommand::CalcCrc)?;

        let deadline = Instant::now() + CRC_TIMEOUT;
        while !self.read(Register::DivIrq)?.get_bit(IRQ_CRC) {
            if Instant::now() > deadline {
                return Err(ReaderError::Timeout);
            }
        }
        self.command(PcdCommand::Idle)?;

        Ok([
            self.read(Register::CrcResultL)?,
            self.read(Register::CrcResultH)?,
        ])
    }

    /// REQA, `Ok` when some card in the field answered with ATQA
    pub fn request(&mut self) -> Result<(), ReaderError> {
        let mut atqa = [0u8; 2];
        match self.transceive(&[PICC_REQA], &mut atqa, 7)? {
            2 => Ok(()),
            _ => Err(ReaderError::Frame),
        }
    }

    pub fn anticollision(&mut self) -> Result<CardId, ReaderError> {
        let mut raw = [0u8; CARD_ID_LEN];
        if self.transceive(&PICC_ANTICOLL_CL1, &mut raw, 0)? != CARD_ID_LEN {
            return Err(ReaderError::Frame);
        }

        let id = CardId::new(raw);
        match id.has_valid_bcc() {
            true => Ok(id),
            false => Err(ReaderError::Bcc),
        }
    }

    pub fn read_card_id(&mut self) -> Result<CardId, ReaderError> {
        self.request()?;
        self.anticollision()
    }

    pub fn halt_card(&mut self) -> Result<(), ReaderError> {
        let crc = self.calculate_crc(&PICC_HALT)?;
        let frame = [PICC_HALT[0], PICC_HALT[1], crc[0], crc[1]];

        // a halted card does not answer, timeout is the success path
        match self.transceive(&frame, &mut [], 0) {
            Ok(_) | Err(ReaderError::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl CardReader for Mfrc522 {
    fn try_read_card_id(&mut self) -> Option<CardId> {
        match self.read_card_id() {
            Ok(id) => Some(id),
            Err(ReaderError::Timeout) => None,
            Err(e) => {
                defmt::debug!("card read failed : {}", e);
                None
            }
        }
    }

    fn halt(&mut self) {
        if let Err(e) = self.halt_card() {
            defmt::debug!("card halt failed : {}", e);
        }
    }
}
