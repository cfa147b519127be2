// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

use crate::{EieioError, EieioType};
use byteorder::{ByteOrder, LittleEndian};

//region Header Flags

const FLAG_PREFIX_PRESENT: u8 = 1 << 7;
const FLAG_PREFIX_UPPER: u8 = 1 << 6;
const FLAG_PAYLOAD_BASE_PRESENT: u8 = 1 << 5;
const FLAG_IS_TIME: u8 = 1 << 4;
const TYPE_SHIFT: u8 = 2;
const TYPE_MASK: u8 = 0b11;
const TAG_MASK: u8 = 0b11;

//endregion

//region Key Prefix

/// Which half-word of the full key a [`KeyPrefix`] supplies.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum PrefixHalf {
    /// Prefix is the low 16 bits, the transmitted key becomes the high 16 bits
    Lower,
    /// Prefix is the high 16 bits, the transmitted key becomes the low 16 bits
    Upper,
}

/// A constant half-word combined with every key of a packet, letting 32 bit keys travel as
/// 16 bit entries.
///
/// # Example
/// ```
/// use spynnaker_eieio::{KeyPrefix, PrefixHalf};
///
/// let prefix = KeyPrefix { value: 0x0001, half: PrefixHalf::Upper };
/// assert_eq!(prefix.apply(0x0203), 0x0001_0203);
/// ```
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct KeyPrefix {
    pub value: u16,
    pub half: PrefixHalf,
}

impl KeyPrefix {
    /// Combines the prefix with a transmitted key, giving the full routing key.
    pub fn apply(&self, key: u32) -> u32 {
        match self.half {
            PrefixHalf::Upper => ((self.value as u32) << 16) | (key & 0xFFFF),
            PrefixHalf::Lower => ((key & 0xFFFF) << 16) | self.value as u32,
        }
    }
}

//endregion

//region Data Header

/// The fixed (entry independent) part of a data packet.
///
/// Wire layout: `count:u8, flags:u8, [prefix:u16], [payload_base:key_size]`. Flags are
/// `P F D T type:2 tag:2` from the most significant bit down.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct EieioDataHeader {
    pub eieio_type: EieioType,
    /// Routing tag (2 bits)
    pub tag: u8,
    pub prefix: Option<KeyPrefix>,
    /// Shared payload applied to every entry (a timestamp when `is_time` is set)
    pub payload_base: Option<u32>,
    /// Payload base, or the per-entry payloads, are timestamps
    pub is_time: bool,
}

impl EieioDataHeader {
    pub const COUNT_AND_FLAGS_BYTE_COUNT: usize = 2; // 1 u8, 1 u8

    pub const PREFIX_BYTE_COUNT: usize = 2; // 1 u16

    /// Number of entries the one byte count field can describe
    pub const MAX_ENTRIES: usize = u8::MAX as usize;

    pub const MAX_TAG: u8 = TAG_MASK;

    /// Plain header: no prefix, no payload base, tag 0.
    pub fn new(eieio_type: EieioType) -> Self {
        Self {
            eieio_type,
            tag: 0,
            prefix: None,
            payload_base: None,
            is_time: false,
        }
    }

    /// Header for a packet whose entries all fire at `timestamp`.
    pub fn timestamped(eieio_type: EieioType, timestamp: u32) -> Self {
        Self {
            payload_base: Some(timestamp),
            is_time: true,
            ..Self::new(eieio_type)
        }
    }

    pub fn with_tag(mut self, tag: u8) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_prefix(mut self, prefix: KeyPrefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Number of bytes taken by the header, prefix and payload base.
    pub fn byte_count(&self) -> usize {
        let mut count = Self::COUNT_AND_FLAGS_BYTE_COUNT;
        if self.prefix.is_some() {
            count += Self::PREFIX_BYTE_COUNT;
        }
        if self.payload_base.is_some() {
            count += self.eieio_type.key_size();
        }
        count
    }

    /// Size of the smallest useful packet using this header (a single entry).
    pub fn minimal_packet_byte_count(&self) -> usize {
        self.byte_count() + self.eieio_type.element_size()
    }

    /// How many entries fit in `available_bytes` once the fixed cost is paid, capped by the
    /// count field.
    pub fn max_entries(&self, available_bytes: usize) -> usize {
        let remaining = available_bytes.saturating_sub(self.byte_count());
        (remaining / self.eieio_type.element_size()).min(Self::MAX_ENTRIES)
    }

    /// Checks the header describes something the wire format can carry.
    pub fn validate(&self) -> Result<(), EieioError> {
        if self.tag > Self::MAX_TAG {
            return Err(EieioError::BadParameters(format!(
                "Tag {} does not fit in the 2 bit tag field!",
                self.tag
            )));
        }
        if let Some(payload_base) = self.payload_base {
            if payload_base > self.eieio_type.max_value() {
                return Err(EieioError::BadParameters(format!(
                    "Payload base {} does not fit a {} packet!",
                    payload_base, self.eieio_type
                )));
            }
        }
        if self.is_time && self.payload_base.is_none() && !self.eieio_type.has_payload() {
            return Err(EieioError::BadParameters(
                "Time flag set on a packet without payload base or payloads!".into(),
            ));
        }
        Ok(())
    }

    fn flags_byte(&self) -> u8 {
        let mut flags = ((self.eieio_type as u8) << TYPE_SHIFT) | (self.tag & TAG_MASK);
        if let Some(prefix) = self.prefix {
            flags |= FLAG_PREFIX_PRESENT;
            if prefix.half == PrefixHalf::Upper {
                flags |= FLAG_PREFIX_UPPER;
            }
        }
        if self.payload_base.is_some() {
            flags |= FLAG_PAYLOAD_BASE_PRESENT;
        }
        if self.is_time {
            flags |= FLAG_IS_TIME;
        }
        flags
    }

    /// Writes the header (including `count`) into the start of `bytes`, which must be at
    /// least [`Self::byte_count`] long.
    fn write_to_slice(&self, count: u8, bytes: &mut [u8]) {
        bytes[0] = count;
        bytes[1] = self.flags_byte();
        let mut index = Self::COUNT_AND_FLAGS_BYTE_COUNT;
        if let Some(prefix) = self.prefix {
            LittleEndian::write_u16(&mut bytes[index..index + 2], prefix.value);
            index += Self::PREFIX_BYTE_COUNT;
        }
        if let Some(payload_base) = self.payload_base {
            write_sized(&mut bytes[index..], self.eieio_type.key_size(), payload_base);
        }
    }

    /// Reads the header at the start of `bytes`, returning it and the entry count.
    fn try_read(bytes: &[u8]) -> Result<(Self, usize), EieioError> {
        if bytes.len() < Self::COUNT_AND_FLAGS_BYTE_COUNT {
            return Err(EieioError::ProtocolFormat(format!(
                "Data packet needs at least {} header bytes, {} were given!",
                Self::COUNT_AND_FLAGS_BYTE_COUNT,
                bytes.len()
            )));
        }
        let count = bytes[0] as usize;
        let flags = bytes[1];
        if flags & FLAG_PREFIX_PRESENT == 0 && flags & FLAG_PREFIX_UPPER != 0 {
            return Err(EieioError::ProtocolFormat(
                "Prefix half flag set without a prefix (this is a command word)!".into(),
            ));
        }
        let eieio_type = EieioType::try_from((flags >> TYPE_SHIFT) & TYPE_MASK)?;

        let mut header = Self::new(eieio_type).with_tag(flags & TAG_MASK);
        header.is_time = flags & FLAG_IS_TIME != 0;
        let mut index = Self::COUNT_AND_FLAGS_BYTE_COUNT;
        if flags & FLAG_PREFIX_PRESENT != 0 {
            ensure_length(bytes, index + Self::PREFIX_BYTE_COUNT, "key prefix")?;
            let half = if flags & FLAG_PREFIX_UPPER != 0 {
                PrefixHalf::Upper
            } else {
                PrefixHalf::Lower
            };
            header.prefix = Some(KeyPrefix {
                value: LittleEndian::read_u16(&bytes[index..index + 2]),
                half,
            });
            index += Self::PREFIX_BYTE_COUNT;
        }
        if flags & FLAG_PAYLOAD_BASE_PRESENT != 0 {
            let key_size = eieio_type.key_size();
            ensure_length(bytes, index + key_size, "payload base")?;
            header.payload_base = Some(read_sized(&bytes[index..], key_size));
        }
        if header.is_time && header.payload_base.is_none() && !eieio_type.has_payload() {
            return Err(EieioError::ProtocolFormat(
                "Time flag set but neither payload base nor payloads are present!".into(),
            ));
        }
        Ok((header, count))
    }
}

/// Maximum number of entries a packet with `header` can carry in `available_bytes`.
pub fn max_entries(available_bytes: usize, header: &EieioDataHeader) -> usize {
    header.max_entries(available_bytes)
}

//endregion

//region Data Packet

/// A single key, with its payload when the packet type carries one.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct EieioEntry {
    pub key: u32,
    pub payload: Option<u32>,
}

/// An EIEIO data packet: a header plus up to 255 entries.
///
/// Keys are stored as transmitted; use [`EieioDataPacket::resolved_keys`] to apply the key
/// prefix.
///
/// # Example
/// ```
/// use spynnaker_eieio::{EieioDataHeader, EieioDataPacket, EieioType};
///
/// let mut packet = EieioDataPacket::new(EieioDataHeader::new(EieioType::Key16)).unwrap();
/// packet.try_add_key(7).unwrap();
/// assert_eq!(packet.count(), 1);
/// assert_eq!(packet.encoded_len(), 4);
/// assert!(packet.try_add_key(0x1_0000).is_err()); // does not fit 16 bits
/// ```
#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct EieioDataPacket {
    header: EieioDataHeader,
    entries: Vec<EieioEntry>,
}

impl EieioDataPacket {
    /// Creates an empty packet, validating the header.
    pub fn new(header: EieioDataHeader) -> Result<Self, EieioError> {
        header.validate()?;
        Ok(Self {
            header,
            entries: Vec::new(),
        })
    }

    /// Creates a payload-less packet filled with `keys`.
    pub fn try_with_keys<I>(header: EieioDataHeader, keys: I) -> Result<Self, EieioError>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut packet = Self::new(header)?;
        for key in keys {
            packet.try_add_key(key)?;
        }
        Ok(packet)
    }

    pub fn header(&self) -> &EieioDataHeader {
        &self.header
    }

    pub fn entries(&self) -> &[EieioEntry] {
        &self.entries
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= EieioDataHeader::MAX_ENTRIES
    }

    /// Transmitted keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|entry| entry.key)
    }

    /// Full routing keys with the key prefix (if any) applied.
    pub fn resolved_keys(&self) -> Vec<u32> {
        match self.header.prefix {
            Some(prefix) => self.keys().map(|key| prefix.apply(key)).collect(),
            None => self.keys().collect(),
        }
    }

    pub fn try_add_key(&mut self, key: u32) -> Result<(), EieioError> {
        if self.header.eieio_type.has_payload() {
            return Err(EieioError::BadParameters(format!(
                "A {} packet needs a payload with every key!",
                self.header.eieio_type
            )));
        }
        self.try_push(EieioEntry { key, payload: None })
    }

    pub fn try_add_key_and_payload(&mut self, key: u32, payload: u32) -> Result<(), EieioError> {
        if !self.header.eieio_type.has_payload() {
            return Err(EieioError::BadParameters(format!(
                "A {} packet cannot carry payloads!",
                self.header.eieio_type
            )));
        }
        if payload > self.header.eieio_type.max_value() {
            return Err(EieioError::BadParameters(format!(
                "Payload {} does not fit a {} packet!",
                payload, self.header.eieio_type
            )));
        }
        self.try_push(EieioEntry {
            key,
            payload: Some(payload),
        })
    }

    pub fn encoded_len(&self) -> usize {
        self.header.byte_count() + self.entries.len() * self.header.eieio_type.element_size()
    }

    pub(crate) fn write_to(&self, bytes: &mut Vec<u8>) {
        let start = bytes.len();
        bytes.resize(start + self.encoded_len(), 0);
        let packet_bytes = &mut bytes[start..];
        self.header
            .write_to_slice(self.entries.len() as u8, packet_bytes);

        let key_size = self.header.eieio_type.key_size();
        let payload_size = self.header.eieio_type.payload_size();
        let mut index = self.header.byte_count();
        for entry in &self.entries {
            write_sized(&mut packet_bytes[index..], key_size, entry.key);
            index += key_size;
            if let Some(payload) = entry.payload {
                write_sized(&mut packet_bytes[index..], payload_size, payload);
                index += payload_size;
            }
        }
    }

    /// Reads one data packet from the start of `bytes`, returning it and the bytes consumed.
    pub(crate) fn try_read(bytes: &[u8]) -> Result<(Self, usize), EieioError> {
        let (header, count) = EieioDataHeader::try_read(bytes)?;
        let eieio_type = header.eieio_type;
        let total_len = header.byte_count() + count * eieio_type.element_size();
        ensure_length(bytes, total_len, "entries")?;

        let key_size = eieio_type.key_size();
        let payload_size = eieio_type.payload_size();
        let mut entries = Vec::with_capacity(count);
        let mut index = header.byte_count();
        for _ in 0..count {
            let key = read_sized(&bytes[index..], key_size);
            index += key_size;
            let payload = if eieio_type.has_payload() {
                let payload = read_sized(&bytes[index..], payload_size);
                index += payload_size;
                Some(payload)
            } else {
                None
            };
            entries.push(EieioEntry { key, payload });
        }
        Ok((Self { header, entries }, total_len))
    }

    fn try_push(&mut self, entry: EieioEntry) -> Result<(), EieioError> {
        if self.is_full() {
            return Err(EieioError::BadParameters(format!(
                "Data packets only support a max of {} entries!",
                EieioDataHeader::MAX_ENTRIES
            )));
        }
        if entry.key > self.header.eieio_type.max_value() {
            return Err(EieioError::BadParameters(format!(
                "Key {} does not fit a {} packet!",
                entry.key, self.header.eieio_type
            )));
        }
        self.entries.push(entry);
        Ok(())
    }
}

//endregion

//region Internal

fn ensure_length(bytes: &[u8], needed: usize, what: &str) -> Result<(), EieioError> {
    if bytes.len() < needed {
        return Err(EieioError::ProtocolFormat(format!(
            "Data packet declares {} bytes (through {}) but only {} were given!",
            needed,
            what,
            bytes.len()
        )));
    }
    Ok(())
}

fn write_sized(bytes: &mut [u8], size: usize, value: u32) {
    match size {
        2 => LittleEndian::write_u16(&mut bytes[..2], value as u16),
        _ => LittleEndian::write_u32(&mut bytes[..4], value),
    }
}

fn read_sized(bytes: &[u8], size: usize) -> u32 {
    match size {
        2 => LittleEndian::read_u16(&bytes[..2]) as u32,
        _ => LittleEndian::read_u32(&bytes[..4]),
    }
}

//endregion
