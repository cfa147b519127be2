// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section of `spynnaker_configuration.toml`. Missing sections and
//! fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpynnakerConfig {
    pub buffers: BuffersConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

/// Width of the keys streamed to cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyWidth {
    Bits16,
    Bits32,
}

impl KeyWidth {
    /// Bytes used per key on the wire
    pub const fn byte_count(&self) -> usize {
        match self {
            KeyWidth::Bits16 => 2,
            KeyWidth::Bits32 => 4,
        }
    }
}

impl Display for KeyWidth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyWidth::Bits16 => write!(f, "bits16"),
            KeyWidth::Bits32 => write!(f, "bits32"),
        }
    }
}

impl FromStr for KeyWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bits16" | "16" => Ok(KeyWidth::Bits16),
            "bits32" | "32" => Ok(KeyWidth::Bits32),
            other => Err(format!("unknown key width '{}'", other)),
        }
    }
}

/// Packing parameters of the buffer flow controller
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BuffersConfig {
    /// Largest encoded packet the transport can carry
    pub max_packet_bytes: usize,
    pub key_width: KeyWidth,
}

impl Default for BuffersConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: 256,
            key_width: KeyWidth::Bits32,
        }
    }
}

/// Async buffer service channel sizes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub inbound_channel_capacity: usize,
    /// Queue depth of each per-region worker
    pub region_channel_capacity: usize,
    pub outbound_channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            inbound_channel_capacity: 1024,
            region_channel_capacity: 16,
            outbound_channel_capacity: 1024,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Folder for rolling log files (file logging is off when unset)
    pub log_dir: Option<PathBuf>,
    /// Crates logged at debug level regardless of `level`
    pub debug_crates: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            debug_crates: Vec::new(),
        }
    }
}
