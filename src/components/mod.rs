/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

pub(crate) mod card_reader;
pub(crate) mod door_panel;
pub(crate) mod internal_flash;
pub(crate) mod lcd;
pub(crate) mod servo;
