/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use static_assertions::*;

pub const CARD_ID_LEN: usize = 5;

/// Card serial as it comes out of the ISO14443A anticollision frame.
///
/// +-------+-------+-------+-------+-------+
/// |  uid0 |  uid1 |  uid2 |  uid3 |  BCC  |
/// +-------+-------+-------+-------+-------+
///
/// BCC is XOR of the four uid bytes. All 0xFF is reserved for an empty slot
/// because that is what erased flash reads back as.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardId([u8; CARD_ID_LEN]);
assert_eq_size!(CardId, [u8; CARD_ID_LEN]);

impl CardId {
    /// Empty slot sentinel
    pub const EMPTY: Self = Self([0xFF; CARD_ID_LEN]);

    pub const fn new(raw: [u8; CARD_ID_LEN]) -> Self {
        Self(raw)
    }

    /// Build identifier from 4 byte single size uid, appending block check character.
    pub const fn from_uid(uid: [u8; 4]) -> Self {
        Self([
            uid[0],
            uid[1],
            uid[2],
            uid[3],
            uid[0] ^ uid[1] ^ uid[2] ^ uid[3],
        ])
    }

    pub const fn as_bytes(&self) -> &[u8; CARD_ID_LEN] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn has_valid_bcc(&self) -> bool {
        self.0[0] ^ self.0[1] ^ self.0[2] ^ self.0[3] == self.0[4]
    }
}

impl From<[u8; CARD_ID_LEN]> for CardId {
    fn from(value: [u8; CARD_ID_LEN]) -> Self {
        Self(value)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4]
        )
    }
}

/// Administrator card, compiled in and never persisted.
pub const MASTER_CARD_ID: CardId = CardId::new([0xC3, 0x91, 0x94, 0x25, 0xE3]);

/// Which of two flash sectors currently holds the authoritative slave table.
/// The discriminant is the marker written on the pointer sector.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Generation {
    Primary = 0xFF01,
    Secondary = 0xFF02,
}

impl Generation {
    /// Unknown marker (erased pointer sector, torn write, garbage) falls back to primary.
    pub fn from_marker(raw: u16) -> Self {
        Self::try_from(raw).unwrap_or(Self::Primary)
    }

    pub fn marker(self) -> u16 {
        self.into()
    }

    pub const fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// Result of a presented card classification
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardClass {
    NoCard,
    Master,
    Slave(CardId),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    TableFull,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Logical servo positions, the board maps them to PWM duty.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DoorPosition {
    Locked,
    Unlocked,
    /// PWM off, servo holds by friction and stops jittering.
    Released,
}

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use super::*;

    #[test]
    fn master_card_carries_valid_bcc() {
        assert!(MASTER_CARD_ID.has_valid_bcc());
        assert_eq!(CardId::from_uid([0xC3, 0x91, 0x94, 0x25]), MASTER_CARD_ID);
    }

    #[test]
    fn empty_sentinel() {
        assert!(CardId::EMPTY.is_empty());
        assert!(!MASTER_CARD_ID.is_empty());
        assert!(!CardId::new([0xFF, 0xFF, 0xFF, 0xFF, 0xFE]).is_empty());
    }

    #[test]
    fn display_as_colon_hex() {
        assert_eq!(MASTER_CARD_ID.to_string(), "C3:91:94:25:E3");
    }

    #[test]
    fn unknown_marker_means_primary() {
        assert_eq!(Generation::from_marker(0xFF02), Generation::Secondary);
        assert_eq!(Generation::from_marker(0xFF01), Generation::Primary);
        assert_eq!(Generation::from_marker(0xFFFF), Generation::Primary);
        assert_eq!(Generation::from_marker(0x0000), Generation::Primary);
        assert_eq!(Generation::Secondary.marker(), 0xFF02);
        assert_eq!(Generation::Primary.other(), Generation::Secondary);
    }
}
