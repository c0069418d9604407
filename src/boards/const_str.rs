/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION_STR: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT_HASH: &str = env!("GIT_COMMIT_HASH");
pub const COMMIT_SHORT: &str = env!("GIT_COMMIT_SHORT_HASH");
pub const GIT_COMMIT_DATETIME: &str = env!("GIT_COMMIT_DATETIME");
pub const PRINT_BAR: &str = "+-----------------------------------------------------------+";
