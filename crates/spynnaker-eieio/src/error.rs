// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while building, encoding or decoding EIEIO packets.
///
/// # Examples
/// ```
/// use spynnaker_eieio::{EieioError, EieioPacket};
///
/// // A lone byte cannot even hold a packet header
/// let err = EieioPacket::try_from_bytes(&[0x03]).unwrap_err();
/// assert!(matches!(err, EieioError::ProtocolFormat(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EieioError {
    /// Malformed or unknown packet on decode
    #[error("Malformed EIEIO packet: {0}")]
    ProtocolFormat(String),

    /// Requested padding cannot be built from whole padding packets
    #[error("Padding size {size} is not a multiple of the {packet_len} byte padding packet")]
    InvalidPaddingSize { size: usize, packet_len: usize },

    /// Invalid parameters provided while building a packet
    #[error("Bad Parameters: {0}")]
    BadParameters(String),
}
