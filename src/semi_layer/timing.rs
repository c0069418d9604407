/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use door_access_core::TickSource;
use embassy_time::{block_for, Duration, Instant};

/// Millisecond clock from the embassy time driver.
///
/// Delays are busy waits, the controller loop is the only task and
/// expects every status message to block until it is wiped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTicks;

impl TickSource for SystemTicks {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn delay_ms(&mut self, ms: u32) {
        block_for(Duration::from_millis(ms as u64));
    }
}
