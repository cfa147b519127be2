// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! # EIEIO Wire Protocol
//!
//! Encoding and decoding of the EIEIO packets exchanged between the host and SpiNNaker
//! cores while a simulation is running. Two packet families exist:
//!
//! - **[`EieioCommandPacket`]** - session control, a 16 bit command word plus optional
//!   opaque payload
//! - **[`EieioDataPacket`]** - up to 255 keys (optionally with payloads) sharing a single
//!   [`EieioDataHeader`]
//!
//! Both are wrapped by the [`EieioPacket`] tagged union, which is what gets written to and
//! read from the wire. The [`session`] module contains the fixed shape control packets
//! (start / stop requests, end of stream, padding).
//!
//! ## Basic Usage
//!
//! ```rust
//! use spynnaker_eieio::{EieioDataHeader, EieioDataPacket, EieioPacket, EieioType};
//!
//! let header = EieioDataHeader::timestamped(EieioType::Key32, 5);
//! let packet = EieioDataPacket::try_with_keys(header, [10, 11, 12]).unwrap();
//! let bytes = EieioPacket::from(packet.clone()).to_bytes();
//! assert_eq!(bytes.len(), 18); // 2 header + 4 timestamp + 3 * 4 keys
//!
//! let decoded = EieioPacket::try_from_bytes(&bytes).unwrap();
//! assert_eq!(decoded, EieioPacket::Data(packet));
//! ```
//!
//! All multi-byte fields are little-endian.

mod eieio_command;
mod eieio_data_packet;
mod eieio_packet;
mod eieio_type;
mod error;
pub mod session;

pub use eieio_command::{EieioCommand, EieioCommandPacket};
pub use eieio_data_packet::{
    max_entries, EieioDataHeader, EieioDataPacket, EieioEntry, KeyPrefix, PrefixHalf,
};
pub use eieio_packet::{decode, decode_stream, encode, EieioPacket};
pub use eieio_type::{element_size, key_size, EieioType};
pub use error::EieioError;
