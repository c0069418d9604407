/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use door_access_core::{DoorPosition, Presentation};

use super::lcd::{DisplayError, Lcd};
use super::servo::DoorServo;

/// What the person at the door sees and the bolt they are waiting on.
pub struct DoorPanel {
    lcd: Lcd,
    servo: DoorServo,
}

impl DoorPanel {
    pub fn new(lcd: Lcd, servo: DoorServo) -> Self {
        Self { lcd, servo }
    }

    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.lcd.init()
    }
}

// A dead display must not keep the door from working, LCD errors are only logged.
impl Presentation for DoorPanel {
    fn show_lines(&mut self, line0: &str, line1: &str) {
        if let Err(e) = self
            .lcd
            .write_line(0, line0)
            .and_then(|_| self.lcd.write_line(1, line1))
        {
            defmt::warn!("lcd write failed : {}", e);
        }
    }

    fn clear(&mut self) {
        if let Err(e) = self.lcd.clear() {
            defmt::warn!("lcd clear failed : {}", e);
        }
    }

    fn set_door_actuator(&mut self, position: DoorPosition) {
        defmt::debug!("door servo : {}", position);
        self.servo.set_position(position);
    }
}
