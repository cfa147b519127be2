// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Pull requests issued by cores when their on-chip ring buffer has room.

use byteorder::{ByteOrder, LittleEndian};
use spynnaker_eieio::{EieioCommand, EieioError};
use std::fmt::{Display, Formatter};

/// Location of a processor: chip coordinates plus processor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreAddress {
    pub x: u8,
    pub y: u8,
    pub p: u8,
}

impl CoreAddress {
    pub const fn new(x: u8, y: u8, p: u8) -> Self {
        Self { x, y, p }
    }
}

impl Display for CoreAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.p)
    }
}

/// A decoded device buffer request.
///
/// # Format (version 1, little-endian, 15 bytes)
/// - version (1 byte)
/// - chip x, chip y, processor (1 byte each)
/// - command id (2 bytes)
/// - region id (1 byte)
/// - sequence number (4 bytes)
/// - free bytes in the device ring buffer (4 bytes)
///
/// # Example
/// ```
/// use spynnaker_buffers::{CoreAddress, DeviceBufferRequest};
///
/// let request = DeviceBufferRequest::new(CoreAddress::new(0, 1, 3), 2, 7, 256);
/// let bytes = request.to_bytes();
/// assert_eq!(bytes.len(), DeviceBufferRequest::BYTE_COUNT);
/// assert_eq!(DeviceBufferRequest::try_from_bytes(&bytes).unwrap(), request);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBufferRequest {
    pub address: CoreAddress,
    pub command: EieioCommand,
    pub region_id: u8,
    /// Device-side sequence number, repeated when the device retransmits
    pub sequence_no: u32,
    /// Free space in the device ring buffer for this region
    pub free_bytes: u32,
}

impl DeviceBufferRequest {
    pub const CURRENT_VERSION: u8 = 1;

    pub const BYTE_COUNT: usize = 15; // 4 u8, 1 u16, 1 u8, 2 u32

    /// Highest region id a core can stream to
    pub const MAX_REGION_ID: u8 = 15;

    /// Creates a buffer request (the only command a device sends on this path).
    pub fn new(address: CoreAddress, region_id: u8, sequence_no: u32, free_bytes: u32) -> Self {
        Self {
            address,
            command: EieioCommand::SpinnakerRequestBuffers,
            region_id,
            sequence_no,
            free_bytes,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::BYTE_COUNT] {
        let mut bytes = [0u8; Self::BYTE_COUNT];
        bytes[0] = Self::CURRENT_VERSION;
        bytes[1] = self.address.x;
        bytes[2] = self.address.y;
        bytes[3] = self.address.p;
        LittleEndian::write_u16(&mut bytes[4..6], self.command as u16);
        bytes[6] = self.region_id;
        LittleEndian::write_u32(&mut bytes[7..11], self.sequence_no);
        LittleEndian::write_u32(&mut bytes[11..15], self.free_bytes);
        bytes
    }

    /// Decodes a request record, rejecting unknown versions, commands and region ids.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, EieioError> {
        if bytes.len() != Self::BYTE_COUNT {
            return Err(EieioError::ProtocolFormat(format!(
                "Buffer request must be {} bytes long, {} were given!",
                Self::BYTE_COUNT,
                bytes.len()
            )));
        }
        if bytes[0] != Self::CURRENT_VERSION {
            return Err(EieioError::ProtocolFormat(format!(
                "Buffer request uses version {} when only version {} is supported!",
                bytes[0],
                Self::CURRENT_VERSION
            )));
        }
        let command = EieioCommand::try_from(LittleEndian::read_u16(&bytes[4..6]))?;
        let region_id = bytes[6];
        if region_id > Self::MAX_REGION_ID {
            return Err(EieioError::ProtocolFormat(format!(
                "Region id {} is out of range (max {})!",
                region_id,
                Self::MAX_REGION_ID
            )));
        }
        Ok(Self {
            address: CoreAddress::new(bytes[1], bytes[2], bytes[3]),
            command,
            region_id,
            sequence_no: LittleEndian::read_u32(&bytes[7..11]),
            free_bytes: LittleEndian::read_u32(&bytes[11..15]),
        })
    }
}
