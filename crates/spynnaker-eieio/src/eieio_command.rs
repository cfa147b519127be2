// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

use crate::EieioError;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt::{Display, Formatter};

/// Identifiers of the EIEIO session commands.
///
/// On the wire the id occupies the low 14 bits of the command word; the top two bits are
/// always `0b01`, a combination no data header can produce.
#[repr(u16)]
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum EieioCommand {
    DatabaseConfirmation = 1,
    /// Filler, ignored by the receiver
    EventPadding = 2,
    /// Permanent end of stream for a region
    EventStop = 3,
    /// Host asks the core to stop issuing buffer requests
    StopSendingRequests = 4,
    /// Host allows the core to start issuing buffer requests
    StartSendingRequests = 5,
    /// Core asks the host for more buffered data
    SpinnakerRequestBuffers = 6,
    HostSendSequencedData = 7,
    SpinnakerRequestReadData = 8,
    HostDataRead = 9,
    StopPauseNotification = 10,
    StartResumeNotification = 11,
    HostDataReadAck = 12,
}

impl EieioCommand {
    /// Marker placed in the top two bits of every command word.
    pub const COMMAND_FLAG: u16 = 0b01 << 14;

    pub const COMMAND_ID_MASK: u16 = 0x3FFF;

    /// Full 16 bit command word (marker + id).
    pub const fn command_word(&self) -> u16 {
        Self::COMMAND_FLAG | (*self as u16)
    }

    /// Payload length for commands whose shape is fixed, `None` when the payload is opaque and
    /// runs to the end of the message.
    pub const fn fixed_payload_len(&self) -> Option<usize> {
        match self {
            EieioCommand::EventPadding
            | EieioCommand::EventStop
            | EieioCommand::StopSendingRequests
            | EieioCommand::StartSendingRequests => Some(0),
            _ => None,
        }
    }

    /// Checks whether the two bytes at the start of `bytes` form a command word.
    pub(crate) fn is_command_word(bytes: &[u8]) -> bool {
        bytes.len() >= EieioCommandPacket::HEADER_BYTE_COUNT
            && LittleEndian::read_u16(&bytes[0..2]) & !Self::COMMAND_ID_MASK == Self::COMMAND_FLAG
    }
}

impl TryFrom<u16> for EieioCommand {
    type Error = EieioError;
    fn try_from(value: u16) -> Result<Self, EieioError> {
        match value {
            1 => Ok(EieioCommand::DatabaseConfirmation),
            2 => Ok(EieioCommand::EventPadding),
            3 => Ok(EieioCommand::EventStop),
            4 => Ok(EieioCommand::StopSendingRequests),
            5 => Ok(EieioCommand::StartSendingRequests),
            6 => Ok(EieioCommand::SpinnakerRequestBuffers),
            7 => Ok(EieioCommand::HostSendSequencedData),
            8 => Ok(EieioCommand::SpinnakerRequestReadData),
            9 => Ok(EieioCommand::HostDataRead),
            10 => Ok(EieioCommand::StopPauseNotification),
            11 => Ok(EieioCommand::StartResumeNotification),
            12 => Ok(EieioCommand::HostDataReadAck),
            _ => Err(EieioError::ProtocolFormat(format!(
                "Unknown EIEIO command id {}",
                value
            ))),
        }
    }
}

impl Display for EieioCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, *self as u16)
    }
}

/// A session control packet: command word followed by an optional opaque payload.
///
/// # Example
/// ```
/// use spynnaker_eieio::{EieioCommand, EieioCommandPacket};
///
/// let packet = EieioCommandPacket::new(EieioCommand::EventStop);
/// assert_eq!(packet.encoded_len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EieioCommandPacket {
    command: EieioCommand,
    payload: Vec<u8>,
}

impl EieioCommandPacket {
    pub const HEADER_BYTE_COUNT: usize = 2; // 1 u16

    /// Creates a command packet without payload.
    pub fn new(command: EieioCommand) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Creates a command packet carrying opaque payload bytes.
    ///
    /// Fails for commands with a fixed shape whose payload length does not match.
    pub fn try_with_payload(command: EieioCommand, payload: Vec<u8>) -> Result<Self, EieioError> {
        if let Some(expected) = command.fixed_payload_len() {
            if payload.len() != expected {
                return Err(EieioError::BadParameters(format!(
                    "Command {} carries {} payload bytes, {} were given!",
                    command,
                    expected,
                    payload.len()
                )));
            }
        }
        Ok(Self { command, payload })
    }

    pub fn command(&self) -> EieioCommand {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_BYTE_COUNT + self.payload.len()
    }

    pub(crate) fn write_to(&self, bytes: &mut Vec<u8>) {
        let start = bytes.len();
        bytes.resize(start + Self::HEADER_BYTE_COUNT, 0);
        LittleEndian::write_u16(&mut bytes[start..], self.command.command_word());
        bytes.extend_from_slice(&self.payload);
    }

    /// Reads one command packet from the start of `bytes`, returning it and the number of
    /// bytes consumed. Opaque payloads consume everything after the command word.
    pub(crate) fn try_read(bytes: &[u8]) -> Result<(Self, usize), EieioError> {
        if !EieioCommand::is_command_word(bytes) {
            return Err(EieioError::ProtocolFormat(
                "Bytes do not start with an EIEIO command word!".into(),
            ));
        }
        let word = LittleEndian::read_u16(&bytes[0..2]);
        let command = EieioCommand::try_from(word & EieioCommand::COMMAND_ID_MASK)?;
        let payload_end = match command.fixed_payload_len() {
            Some(payload_len) => Self::HEADER_BYTE_COUNT + payload_len,
            None => bytes.len(),
        };
        if bytes.len() < payload_end {
            return Err(EieioError::ProtocolFormat(format!(
                "Command {} needs {} bytes but only {} were given!",
                command,
                payload_end,
                bytes.len()
            )));
        }
        let packet = Self {
            command,
            payload: bytes[Self::HEADER_BYTE_COUNT..payload_end].to_vec(),
        };
        Ok((packet, payload_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_word_layout() {
        let mut bytes = Vec::new();
        EieioCommandPacket::new(EieioCommand::EventPadding).write_to(&mut bytes);
        assert_eq!(bytes, vec![0x02, 0x40]);
        assert!(EieioCommand::is_command_word(&bytes));
    }

    #[test]
    fn test_fixed_command_rejects_payload() {
        let result = EieioCommandPacket::try_with_payload(EieioCommand::EventStop, vec![1]);
        assert!(matches!(result, Err(EieioError::BadParameters(_))));

        let packet =
            EieioCommandPacket::try_with_payload(EieioCommand::HostDataRead, vec![1, 2, 3]).unwrap();
        assert_eq!(packet.encoded_len(), 5);
    }

    #[test]
    fn test_unknown_command_id() {
        // 0x4000 | 0x3FFF
        let bytes = [0xFF, 0x7F];
        assert!(matches!(
            EieioCommandPacket::try_read(&bytes),
            Err(EieioError::ProtocolFormat(_))
        ));
    }
}
