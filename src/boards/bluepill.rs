/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! Hardware initialization code for STM32F103C8 "blue pill"
//!
//! +-----------+-------+------------------------------+
//! | MFRC522   | SPI1  | SCK PA5, MOSI PA7, MISO PA6  |
//! |           | GPIO  | NSS PA4, RST PB0             |
//! | PCF8574   | I2C1  | SCL PB6, SDA PB7, addr 0x27  |
//! | SG90      | TIM4  | CH4 PB9, 50Hz                |
//! +-----------+-------+------------------------------+

use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, OutputType, Pin, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::{hz, Hertz};
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::{Channel, CountingMode};
use embassy_stm32::{bind_interrupts, peripherals};

use super::Hardware;
use crate::components::card_reader::Mfrc522;
use crate::components::door_panel::DoorPanel;
use crate::components::internal_flash::InternalFlash;
use crate::components::lcd::{Lcd, PCF8574_ADDRESS};
use crate::components::servo::DoorServo;

bind_interrupts!(struct Irqs {
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

pub fn hardware_init_bluepill(p: embassy_stm32::Peripherals) -> Hardware {
    // SPI1 initialization for MFRC522, mode 0 up to 10Mhz
    let spi_config = {
        let mut ret = spi::Config::default();
        ret.frequency = Hertz(1_000_000);
        ret
    };
    let spi1 = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, spi_config);

    // I2C1 initialization for PCF8574 LCD backpack
    let i2c1 = I2c::new(
        p.I2C1,
        p.PB6,
        p.PB7,
        Irqs,
        NoDma,
        NoDma,
        Hertz(100_000),
        Default::default(),
    );

    // TIM4 CH4 initialization for door servo, 20ms frame
    let pwm = SimplePwm::new(
        p.TIM4,
        None,
        None,
        None,
        Some(PwmPin::new_ch4(p.PB9, OutputType::PushPull)),
        hz(50),
        CountingMode::EdgeAlignedUp,
    );

    Hardware {
        reader: Mfrc522::new(
            spi1,
            Output::new(p.PA4.degrade(), Level::High, Speed::Medium), // MFRC522_NSS
            Output::new(p.PB0.degrade(), Level::High, Speed::Low),    // MFRC522_RST
        ),
        panel: DoorPanel::new(
            Lcd::new(i2c1, PCF8574_ADDRESS),
            DoorServo::new(pwm, Channel::Ch4),
        ),
        flash: InternalFlash::new(p.FLASH),
    }
}
