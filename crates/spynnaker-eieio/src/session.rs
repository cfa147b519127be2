// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Fixed shape session control packets.
//!
//! Every packet here is a bare 2 byte command word. The layer holds no state; it only names
//! the commands the buffer subsystem sends and builds padding out of whole padding packets.

use crate::{EieioCommand, EieioCommandPacket, EieioError, EieioPacket};

/// Encoded length of one `EventPadding` command packet.
pub const PADDING_PACKET_BYTE_COUNT: usize = EieioCommandPacket::HEADER_BYTE_COUNT;

/// Host-to-core session control.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum SessionCommand {
    /// The core may begin issuing buffer requests for its region
    StartRequests,
    /// Host-initiated teardown: the core should stop issuing requests
    StopRequests,
    /// Permanent end of stream, written once per run
    EventStop,
}

impl SessionCommand {
    pub const fn command(&self) -> EieioCommand {
        match self {
            SessionCommand::StartRequests => EieioCommand::StartSendingRequests,
            SessionCommand::StopRequests => EieioCommand::StopSendingRequests,
            SessionCommand::EventStop => EieioCommand::EventStop,
        }
    }

    pub fn to_packet(&self) -> EieioPacket {
        EieioPacket::Command(EieioCommandPacket::new(self.command()))
    }

    /// The 2 byte wire form.
    ///
    /// # Example
    /// ```
    /// use spynnaker_eieio::session::SessionCommand;
    ///
    /// assert_eq!(SessionCommand::StartRequests.to_bytes(), [0x05, 0x40]);
    /// ```
    pub fn to_bytes(&self) -> [u8; 2] {
        self.command().command_word().to_le_bytes()
    }

    /// Recognises a session command among decoded packets.
    pub fn from_packet(packet: &EieioPacket) -> Option<Self> {
        let command = packet.as_command()?;
        if !command.payload().is_empty() {
            return None;
        }
        match command.command() {
            EieioCommand::StartSendingRequests => Some(SessionCommand::StartRequests),
            EieioCommand::StopSendingRequests => Some(SessionCommand::StopRequests),
            EieioCommand::EventStop => Some(SessionCommand::EventStop),
            _ => None,
        }
    }
}

/// The minimal command packet used for padding.
pub fn padding_packet() -> EieioPacket {
    EieioPacket::Command(EieioCommandPacket::new(EieioCommand::EventPadding))
}

/// Exactly `size` bytes of back-to-back padding packets.
///
/// # Example
/// ```
/// use spynnaker_eieio::{session, EieioError};
///
/// assert_eq!(session::padding_bytes(4).unwrap(), vec![0x02, 0x40, 0x02, 0x40]);
/// assert!(matches!(
///     session::padding_bytes(3),
///     Err(EieioError::InvalidPaddingSize { size: 3, packet_len: 2 })
/// ));
/// ```
pub fn padding_bytes(size: usize) -> Result<Vec<u8>, EieioError> {
    if size % PADDING_PACKET_BYTE_COUNT != 0 {
        return Err(EieioError::InvalidPaddingSize {
            size,
            packet_len: PADDING_PACKET_BYTE_COUNT,
        });
    }
    let single = padding_packet().to_bytes();
    Ok(single.repeat(size / PADDING_PACKET_BYTE_COUNT))
}
