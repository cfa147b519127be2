// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

use crate::eieio_command::EieioCommand;
use crate::{EieioCommandPacket, EieioDataPacket, EieioError};

/// Any EIEIO packet.
///
/// The two families are told apart by the top two bits of the second byte: command words
/// carry `0b01` there, which a data header never does (the prefix half flag is only valid
/// together with the prefix present flag).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EieioPacket {
    Command(EieioCommandPacket),
    Data(EieioDataPacket),
}

impl EieioPacket {
    /// Number of bytes [`EieioPacket::to_bytes`] will produce.
    pub fn encoded_len(&self) -> usize {
        match self {
            EieioPacket::Command(command) => command.encoded_len(),
            EieioPacket::Data(data) => data.encoded_len(),
        }
    }

    /// Encodes the packet into a new byte vector.
    ///
    /// # Example
    /// ```
    /// use spynnaker_eieio::{EieioCommand, EieioCommandPacket, EieioPacket};
    ///
    /// let packet = EieioPacket::from(EieioCommandPacket::new(EieioCommand::EventStop));
    /// assert_eq!(packet.to_bytes(), vec![0x03, 0x40]);
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut bytes);
        bytes
    }

    /// Appends the encoded packet to `bytes`.
    pub fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            EieioPacket::Command(command) => command.write_to(bytes),
            EieioPacket::Data(data) => data.write_to(bytes),
        }
    }

    /// Decodes exactly one packet; trailing bytes are an error.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, EieioError> {
        let (packet, consumed) = Self::try_decode_from(bytes)?;
        if consumed != bytes.len() {
            return Err(EieioError::ProtocolFormat(format!(
                "Packet ends after {} bytes but {} were given!",
                consumed,
                bytes.len()
            )));
        }
        Ok(packet)
    }

    /// Decodes the packet at the start of `bytes`, returning it and the bytes consumed.
    pub fn try_decode_from(bytes: &[u8]) -> Result<(Self, usize), EieioError> {
        if EieioCommand::is_command_word(bytes) {
            let (command, consumed) = EieioCommandPacket::try_read(bytes)?;
            return Ok((EieioPacket::Command(command), consumed));
        }
        let (data, consumed) = EieioDataPacket::try_read(bytes)?;
        Ok((EieioPacket::Data(data), consumed))
    }

    pub fn as_command(&self) -> Option<&EieioCommandPacket> {
        match self {
            EieioPacket::Command(command) => Some(command),
            EieioPacket::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&EieioDataPacket> {
        match self {
            EieioPacket::Command(_) => None,
            EieioPacket::Data(data) => Some(data),
        }
    }
}

impl From<EieioCommandPacket> for EieioPacket {
    fn from(command: EieioCommandPacket) -> Self {
        EieioPacket::Command(command)
    }
}

impl From<EieioDataPacket> for EieioPacket {
    fn from(data: EieioDataPacket) -> Self {
        EieioPacket::Data(data)
    }
}

/// Encodes a packet. See [`EieioPacket::to_bytes`].
pub fn encode(packet: &EieioPacket) -> Vec<u8> {
    packet.to_bytes()
}

/// Decodes exactly one packet. See [`EieioPacket::try_from_bytes`].
pub fn decode(bytes: &[u8]) -> Result<EieioPacket, EieioError> {
    EieioPacket::try_from_bytes(bytes)
}

/// Splits a concatenation of packets back into packets.
///
/// Commands with an opaque payload swallow the rest of the stream, so they can only appear
/// last.
///
/// # Example
/// ```
/// use spynnaker_eieio::{decode_stream, session};
///
/// let bytes = session::padding_bytes(6).unwrap();
/// assert_eq!(decode_stream(&bytes).unwrap().len(), 3);
/// ```
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<EieioPacket>, EieioError> {
    let mut packets = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        let (packet, consumed) = EieioPacket::try_decode_from(&bytes[index..])?;
        packets.push(packet);
        index += consumed;
    }
    Ok(packets)
}
