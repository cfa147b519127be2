// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Cross-field checks that serde defaults cannot express.

use crate::{ConfigError, ConfigResult, SpynnakerConfig};

/// Count and flags bytes at the front of every data packet
/// (`EieioDataHeader::COUNT_AND_FLAGS_BYTE_COUNT` in spynnaker-eieio)
const COUNT_AND_FLAGS_BYTE_COUNT: usize = 2;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    PacketTooSmall { max_packet_bytes: usize, minimum: usize },
    ZeroCapacity { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PacketTooSmall {
                max_packet_bytes,
                minimum,
            } => write!(
                f,
                "buffers.max_packet_bytes = {} cannot hold one timestamped packet ({} bytes)",
                max_packet_bytes, minimum
            ),
            Self::ZeroCapacity { field } => write!(f, "{} must be greater than 0", field),
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Smallest `max_packet_bytes` that fits one timestamped packet with one key
/// (count and flags, the timestamp, one key).
///
/// Must agree with `FlowControlSettings::minimal_packet_bytes` in spynnaker-buffers, which
/// asks the codec for the same size.
pub fn minimal_packet_bytes(config: &SpynnakerConfig) -> usize {
    COUNT_AND_FLAGS_BYTE_COUNT + 2 * config.buffers.key_width.byte_count()
}

/// Validate the complete configuration
///
/// Checks for:
/// - A packet size able to hold one minimal packet
/// - Non-zero channel capacities
/// - A known log level
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &SpynnakerConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_buffers(config, &mut errors);
    validate_service(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_buffers(config: &SpynnakerConfig, errors: &mut Vec<ConfigValidationError>) {
    let minimum = minimal_packet_bytes(config);
    if config.buffers.max_packet_bytes < minimum {
        errors.push(ConfigValidationError::PacketTooSmall {
            max_packet_bytes: config.buffers.max_packet_bytes,
            minimum,
        });
    }
}

fn validate_service(config: &SpynnakerConfig, errors: &mut Vec<ConfigValidationError>) {
    let capacities = [
        ("service.inbound_channel_capacity", config.service.inbound_channel_capacity),
        ("service.region_channel_capacity", config.service.region_channel_capacity),
        ("service.outbound_channel_capacity", config.service.outbound_channel_capacity),
    ];
    for (field, capacity) in capacities {
        if capacity == 0 {
            errors.push(ConfigValidationError::ZeroCapacity {
                field: field.to_string(),
            });
        }
    }
}

fn validate_logging(config: &SpynnakerConfig, errors: &mut Vec<ConfigValidationError>) {
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!(
                "'{}' is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }
}
