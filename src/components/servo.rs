/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use door_access_core::DoorPosition;
use embassy_stm32::peripherals::TIM4;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;
use static_assertions::*;

// Pulse widths in ticks of a 14400 tick 20 ms frame, scaled to the timer's real period.
const FRAME_TICKS: u32 = 14_400;
const LOCKED_TICKS: u32 = 920; // ~1.28 ms
const UNLOCKED_TICKS: u32 = 1_650; // ~2.29 ms

const_assert!(LOCKED_TICKS < FRAME_TICKS);
const_assert!(UNLOCKED_TICKS < FRAME_TICKS);

/// SG90 class hobby servo latching the door bolt
pub struct DoorServo {
    pwm: SimplePwm<'static, TIM4>,
    channel: Channel,
}

impl DoorServo {
    pub fn new(pwm: SimplePwm<'static, TIM4>, channel: Channel) -> Self {
        let mut ret = Self { pwm, channel };
        ret.pwm.set_duty(channel, 0);
        ret.pwm.enable(channel);
        ret
    }

    pub fn set_position(&mut self, position: DoorPosition) {
        let ticks = match position {
            DoorPosition::Locked => LOCKED_TICKS,
            DoorPosition::Unlocked => UNLOCKED_TICKS,
            DoorPosition::Released => 0,
        };

        let duty = self.pwm.get_max_duty() as u32 * ticks / FRAME_TICKS;
        self.pwm.set_duty(self.channel, duty as u16);
    }
}
