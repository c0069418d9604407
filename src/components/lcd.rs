/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! HD44780 16x2 character LCD in 4 bit mode behind a PCF8574 I2C backpack.
//!
//! PCF8574 port wiring of the common backpack
//! +-----+-----+-----+-----+-----+-----+-----+-----+
//! |  P7 |  P6 |  P5 |  P4 |  P3 |  P2 |  P1 |  P0 |
//! +-----+-----+-----+-----+-----+-----+-----+-----+
//! |  D7 |  D6 |  D5 |  D4 |  BL |  EN |  RW |  RS |
//! +-----+-----+-----+-----+-----+-----+-----+-----+

use bit_field::BitField;
use embassy_stm32::dma::NoDma;
use embassy_stm32::i2c::I2c;
use embassy_stm32::peripherals::I2C1;
use embassy_time::{block_for, Duration};

pub type LcdI2c = I2c<'static, I2C1, NoDma, NoDma>;

pub const PCF8574_ADDRESS: u8 = 0x27;
pub const LCD_COLUMNS: usize = 16;

const PIN_RS: usize = 0;
const PIN_EN: usize = 2;
const PIN_BACKLIGHT: usize = 3;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_INCREMENT: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum DisplayError {
    I2c,
}

impl From<embassy_stm32::i2c::Error> for DisplayError {
    fn from(_: embassy_stm32::i2c::Error) -> Self {
        DisplayError::I2c
    }
}

pub struct Lcd {
    i2c: LcdI2c,
    address: u8,
    backlight: bool,
}

impl Lcd {
    pub fn new(i2c: LcdI2c, address: u8) -> Self {
        Self {
            i2c,
            address,
            backlight: true,
        }
    }

    fn expander_write(&mut self, value: u8) -> Result<(), DisplayError> {
        let mut value = value;
        value.set_bit(PIN_BACKLIGHT, self.backlight);
        Ok(self.i2c.blocking_write(self.address, &[value])?)
    }

    /// Latch upper nibble of `bits` on the falling edge of EN
    fn pulse(&mut self, bits: u8) -> Result<(), DisplayError> {
        let mut bits = bits;
        bits.set_bit(PIN_EN, true);
        self.expander_write(bits)?;
        block_for(Duration::from_micros(1));

        bits.set_bit(PIN_EN, false);
        self.expander_write(bits)?;
        block_for(Duration::from_micros(50));
        Ok(())
    }

    fn send(&mut self, byte: u8, is_data: bool) -> Result<(), DisplayError> {
        let mut high = byte & 0xF0;
        let mut low = (byte << 4) & 0xF0;
        high.set_bit(PIN_RS, is_data);
        low.set_bit(PIN_RS, is_data);

        self.pulse(high)?;
        self.pulse(low)
    }

    fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.send(cmd, false)
    }

    /// Power-on reset sequence into 4 bit mode, display on, cursor off.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        block_for(Duration::from_millis(50));

        self.pulse(0x30)?;
        block_for(Duration::from_millis(5));
        self.pulse(0x30)?;
        block_for(Duration::from_millis(5));
        self.pulse(0x30)?;
        block_for(Duration::from_micros(150));
        self.pulse(0x20)?;

        self.command(CMD_FUNCTION_4BIT_2LINE)?;
        self.command(CMD_DISPLAY_ON)?;
        self.command(CMD_ENTRY_INCREMENT)?;
        self.clear()
    }

    pub fn clear(&mut self) -> Result<(), DisplayError> {
        self.command(CMD_CLEAR)?;
        block_for(Duration::from_millis(2));
        Ok(())
    }

    pub fn set_cursor(&mut self, row: usize, col: u8) -> Result<(), DisplayError> {
        let offset = ROW_OFFSETS.get(row).copied().unwrap_or(ROW_OFFSETS[0]);
        self.command(CMD_SET_DDRAM | (offset + col))
    }

    /// Whole row rewritten, text is cut or space padded to the panel width.
    pub fn write_line(&mut self, row: usize, text: &str) -> Result<(), DisplayError> {
        self.set_cursor(row, 0)?;
        for ch in text
            .bytes()
            .chain(core::iter::repeat(b' '))
            .take(LCD_COLUMNS)
        {
            self.send(ch, true)?;
        }
        Ok(())
    }
}
