/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use door_access_core::{
    AccessController, AccessControllerState, CardRegistry, ControllerConfig, DoorPosition, Flash,
    Presentation, RegistryLayout,
};
use embassy_futures::yield_now;
use embassy_time::{Duration, Timer};

use crate::boards::*;
use crate::semi_layer::timing::SystemTicks;

pub struct Application {
    /// Hardware and necessary shared object
    pub board: &'static mut Board,
}

impl Application {
    pub fn new(board: &'static mut Board) -> Self {
        Self { board }
    }

    pub async fn main_task(self) -> ! {
        let hardware = &mut self.board.hardware;

        let mut registry = CardRegistry::init(
            Flash::new(&mut hardware.flash),
            RegistryLayout::default(),
        );
        defmt::info!(
            "registry ready, {} slave cards in {}",
            registry.len(),
            registry.active_generation()
        );

        let mut state = AccessControllerState::new();
        let mut controller = AccessController::new(
            &mut hardware.reader,
            &mut hardware.panel,
            SystemTicks,
            ControllerConfig::default(),
        );
        controller.start(&mut state);

        loop {
            if let Err(fault) = controller.poll(&mut state, &mut registry) {
                // fault text is already on the LCD
                defmt::error!("flash fault, controller halted : {}", fault);
                controller
                    .presentation_mut()
                    .set_door_actuator(DoorPosition::Locked);
                break;
            }

            yield_now().await;
        }

        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    }
}
