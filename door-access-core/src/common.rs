/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

// Logging that works on both sides of the crate.
// - firmware (no_std + `defmt` feature) : forwarded to `defmt`
// - host test (std)                      : forwarded to `log`
// - anything else                        : arguments are type checked and dropped
// Only `{}`, `{:?}` and `{:#x}` placeholders are understood by all three.

#[cfg(all(feature = "defmt", not(test)))]
macro_rules! hybrid_debug {
    ($($args:tt)*) => {
        defmt::debug!($($args)*)
    };
}

#[cfg(test)]
macro_rules! hybrid_debug {
    ($($args:tt)*) => {
        log::debug!($($args)*)
    };
}

#[cfg(all(not(feature = "defmt"), not(test)))]
macro_rules! hybrid_debug {
    ($($args:tt)*) => {{
        let _ = core::format_args!($($args)*);
    }};
}

/// info! for no_std , std(test)
/// Work as `defmt::info!` on no_std environment
/// Work as `log::info!` on test coverage with std
#[cfg(all(feature = "defmt", not(test)))]
macro_rules! hybrid_info {
    ($($args:tt)*) => {
        defmt::info!($($args)*)
    };
}

#[cfg(test)]
macro_rules! hybrid_info {
    ($($args:tt)*) => {
        log::info!($($args)*)
    };
}

#[cfg(all(not(feature = "defmt"), not(test)))]
macro_rules! hybrid_info {
    ($($args:tt)*) => {{
        let _ = core::format_args!($($args)*);
    }};
}

/// warn! for no_std , std(test)
/// Work as `defmt::warn!` on no_std environment
/// Work as `log::warn!` on test coverage with std
#[cfg(all(feature = "defmt", not(test)))]
macro_rules! hybrid_warn {
    ($($args:tt)*) => {
        defmt::warn!($($args)*)
    };
}

#[cfg(test)]
macro_rules! hybrid_warn {
    ($($args:tt)*) => {
        log::warn!($($args)*)
    };
}

#[cfg(all(not(feature = "defmt"), not(test)))]
macro_rules! hybrid_warn {
    ($($args:tt)*) => {{
        let _ = core::format_args!($($args)*);
    }};
}

#[cfg(all(feature = "defmt", not(test)))]
macro_rules! hybrid_error {
    ($($args:tt)*) => {
        defmt::error!($($args)*)
    };
}

#[cfg(test)]
macro_rules! hybrid_error {
    ($($args:tt)*) => {
        log::error!($($args)*)
    };
}

#[cfg(all(not(feature = "defmt"), not(test)))]
macro_rules! hybrid_error {
    ($($args:tt)*) => {{
        let _ = core::format_args!($($args)*);
    }};
}
