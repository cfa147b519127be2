// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

use crate::CoreAddress;
use spynnaker_eieio::session::{self, SessionCommand};
use spynnaker_eieio::EieioError;

/// What the host sends back for one device buffer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Write `bytes` into the region stream of the core at `address`
    SendData {
        address: CoreAddress,
        region_id: u8,
        sequence_no: u32,
        bytes: Vec<u8>,
    },
    /// Region is drained; the device should stop requesting
    Stop { address: CoreAddress, region_id: u8 },
    /// Filler of exactly `size` bytes
    Padding { size: usize },
}

impl Response {
    /// Builds a padding response, checking `size` can be made of whole padding packets.
    pub fn padding(size: usize) -> Result<Self, EieioError> {
        session::padding_bytes(size)?;
        Ok(Response::Padding { size })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Response::Stop { .. })
    }

    /// Bytes the transport layer puts on the link for this response.
    ///
    /// # Example
    /// ```
    /// use spynnaker_buffers::{CoreAddress, Response};
    ///
    /// let stop = Response::Stop { address: CoreAddress::new(0, 0, 1), region_id: 0 };
    /// assert_eq!(stop.to_wire_bytes().unwrap(), vec![0x03, 0x40]); // EventStop
    /// ```
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, EieioError> {
        match self {
            Response::SendData { bytes, .. } => Ok(bytes.clone()),
            Response::Stop { .. } => Ok(SessionCommand::EventStop.to_bytes().to_vec()),
            Response::Padding { size } => session::padding_bytes(*size),
        }
    }
}
