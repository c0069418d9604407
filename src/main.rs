/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

#![no_std]
#![no_main]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

mod application;
mod boards;
mod components;
mod semi_layer;

use embassy_executor::Spawner;
use static_cell::make_static;
use {defmt_rtt as _, panic_probe as _};

use crate::application::Application;
use crate::boards::*;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    // Initialize necessary BSP
    let board: &'static mut Board = make_static!(Board::init());

    // Main Application
    let app = Application::new(board);
    app.main_task().await;
}
