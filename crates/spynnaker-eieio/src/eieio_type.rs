// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

use crate::EieioError;
use std::fmt::{Display, Formatter};

/// The (key width, payload presence) combination of an EIEIO data packet.
///
/// The discriminant is the 2 bit type field stored in the data header byte.
///
/// # Example
/// ```
/// use spynnaker_eieio::EieioType;
///
/// assert_eq!(EieioType::Key32 as u8, 2);
/// assert_eq!(EieioType::Key32.element_size(), 4);
/// assert_eq!(EieioType::KeyPayload32.element_size(), 8);
/// ```
#[repr(u8)]
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum EieioType {
    /// 16 bit keys, no payload
    Key16 = 0u8,
    /// 16 bit keys each followed by a 16 bit payload
    KeyPayload16 = 1u8,
    /// 32 bit keys, no payload
    Key32 = 2u8,
    /// 32 bit keys each followed by a 32 bit payload
    KeyPayload32 = 3u8,
}

impl EieioType {
    /// Number of bytes used by each key (and by the payload base field).
    pub const fn key_size(&self) -> usize {
        match self {
            EieioType::Key16 | EieioType::KeyPayload16 => 2,
            EieioType::Key32 | EieioType::KeyPayload32 => 4,
        }
    }

    /// Number of bytes used by each per-entry payload (0 if the type has none).
    pub const fn payload_size(&self) -> usize {
        match self {
            EieioType::Key16 | EieioType::Key32 => 0,
            EieioType::KeyPayload16 => 2,
            EieioType::KeyPayload32 => 4,
        }
    }

    /// Number of bytes used by a single entry (key + payload).
    pub const fn element_size(&self) -> usize {
        self.key_size() + self.payload_size()
    }

    pub const fn has_payload(&self) -> bool {
        self.payload_size() != 0
    }

    /// Largest key (or payload) value representable by this type.
    pub const fn max_value(&self) -> u32 {
        match self.key_size() {
            2 => u16::MAX as u32,
            _ => u32::MAX,
        }
    }
}

/// Pure lookup of the per-entry size of a type. See [`EieioType::element_size`].
pub const fn element_size(eieio_type: EieioType) -> usize {
    eieio_type.element_size()
}

/// Pure lookup of the key size of a type. See [`EieioType::key_size`].
pub const fn key_size(eieio_type: EieioType) -> usize {
    eieio_type.key_size()
}

impl TryFrom<u8> for EieioType {
    type Error = EieioError;
    fn try_from(value: u8) -> Result<Self, EieioError> {
        match value {
            0 => Ok(EieioType::Key16),
            1 => Ok(EieioType::KeyPayload16),
            2 => Ok(EieioType::Key32),
            3 => Ok(EieioType::KeyPayload32),
            _ => Err(EieioError::ProtocolFormat(format!(
                "Unknown EIEIO data type {}",
                value
            ))),
        }
    }
}

impl Display for EieioType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EieioType::Key16 => "Key16",
            EieioType::KeyPayload16 => "KeyPayload16",
            EieioType::Key32 => "Key32",
            EieioType::KeyPayload32 => "KeyPayload32",
        };
        write!(f, "{name}")
    }
}
