/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use door_access_core::{DoorPosition, Presentation};
use embassy_stm32::Config as Stm32Config;
use embassy_time::{block_for, Duration};

#[cfg(feature = "board_bluepill")]
use self::bluepill::hardware_init_bluepill;
use self::const_str::*;
use crate::components::card_reader::Mfrc522;
use crate::components::door_panel::DoorPanel;
use crate::components::internal_flash::InternalFlash;

#[cfg(feature = "board_bluepill")]
mod bluepill;
mod const_str;

/// Bolt is driven closed this long before the servo is released on boot
const BOOT_LOCK_SETTLE_MS: u64 = 100;

pub struct Hardware {
    /// MFRC522 contactless reader
    pub reader: Mfrc522,

    /// 16x2 LCD and the door bolt servo
    pub panel: DoorPanel,

    /// Embedded flash controller holding the slave card registry
    pub flash: InternalFlash,
}

impl Hardware {
    /// STM32F103 boots from the 8Mhz HSI, the reader and LCD buses need nothing faster.
    fn mcu_default_config() -> Stm32Config {
        Stm32Config::default()
    }

    /// Initialize MCU clocks
    /// > `Hardware::mcu_pre_init()`
    /// 2 `Hardware::hardware_init(..)`
    /// 3 `hardware.boot()`
    pub fn mcu_pre_init() -> embassy_stm32::Peripherals {
        embassy_stm32::init(Self::mcu_default_config())
    }

    /// Initialize MCU peripherals and nearby components
    /// 1 `Hardware::mcu_pre_init()`
    /// > `Hardware::hardware_init(..)`
    /// 3 `hardware.boot()`
    fn hardware_init(peripherals: embassy_stm32::Peripherals) -> Hardware {
        #[cfg(feature = "board_bluepill")]
        let ret = hardware_init_bluepill(peripherals);

        ret
    }

    /// Bring external parts into a known state
    /// 1 `Hardware::mcu_pre_init()`
    /// 2 `Hardware::hardware_init(..)`
    /// > `hardware.boot()`
    fn boot(&mut self) {
        self.panel.set_door_actuator(DoorPosition::Locked);

        if let Err(e) = self.panel.init() {
            defmt::warn!("lcd init failed : {}", e);
        }

        match self.reader.init() {
            Ok(version) => defmt::info!("MFRC522 version : {:#04x}", version),
            Err(e) => defmt::error!("MFRC522 init failed : {}", e),
        }

        block_for(Duration::from_millis(BOOT_LOCK_SETTLE_MS));
        self.panel.set_door_actuator(DoorPosition::Released);
    }
}

pub struct Board {
    pub hardware: Hardware,
}

impl Board {
    pub fn init() -> Self {
        let p = Hardware::mcu_pre_init();

        // print my info
        defmt::println!("{}", PRINT_BAR);
        defmt::println!("Firmware Ver : {} {}", PROJECT_NAME, VERSION_STR);
        defmt::println!("Git Hash     : {}", COMMIT_HASH);
        defmt::println!("Git Datetime : {} | {}", GIT_COMMIT_DATETIME, COMMIT_SHORT);
        defmt::println!("{}", PRINT_BAR);

        let mut hardware: Hardware = Hardware::hardware_init(p);
        hardware.boot();

        Self { hardware }
    }
}
