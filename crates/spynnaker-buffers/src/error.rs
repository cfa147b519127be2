// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

use crate::CoreAddress;
use spynnaker_eieio::{EieioCommand, EieioError, EieioType};

/// Errors of the buffered event streaming subsystem.
///
/// Load time variants (`OutOfOrderKey`, `KeyOutOfRange`, ...) are fatal to the caller.
/// Variants raised while servicing a live request are logged and the request is dropped,
/// except `BufferOverflow`, which signals a packing bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("non-monotonic timestamp: latest={latest}, requested={requested}")]
    OutOfOrderKey { latest: u32, requested: u32 },

    #[error("region {region_id} of core {address} is not managed")]
    RegionNotFound { address: CoreAddress, region_id: u8 },

    #[error("region {region_id} of core {address} is already registered")]
    RegionAlreadyRegistered { address: CoreAddress, region_id: u8 },

    #[error("region {region_id} of core {address} has already started streaming")]
    RegionAlreadyStarted { address: CoreAddress, region_id: u8 },

    #[error("region id {0} is out of range")]
    InvalidRegionId(u8),

    #[error("key {key:#x} does not fit a {eieio_type} packet")]
    KeyOutOfRange { key: u32, eieio_type: EieioType },

    #[error("timestamp {timestamp} does not fit a {eieio_type} packet")]
    TimestampOutOfRange { timestamp: u32, eieio_type: EieioType },

    #[error("request carries command {0} instead of a buffer request")]
    UnexpectedCommand(EieioCommand),

    #[error("invalid flow control settings: {0}")]
    InvalidSettings(String),

    #[error(
        "retransmitted request {sequence_no} reports {free_space} free bytes, \
         the response already sent is {cached} bytes"
    )]
    ReplayExceedsFreeSpace {
        sequence_no: u32,
        cached: usize,
        free_space: usize,
    },

    #[error("packed {written} bytes into {free_space} bytes of free space")]
    BufferOverflow { written: usize, free_space: usize },

    #[error(transparent)]
    Protocol(#[from] EieioError),
}

impl BufferError {
    /// Whether the error means the packing logic itself is broken.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BufferError::BufferOverflow { .. })
    }
}
