// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! # sPyNNaker event streaming
//!
//! Host side of live spike streaming to SpiNNaker cores. Spike schedules computed before a run
//! are loaded into per-region event buffers; while the run is live, each core pulls more events
//! whenever its on-chip ring buffer has room, and the host answers with EIEIO packets that never
//! exceed the space the core reported.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! spynnaker = "0.1"  # Default: async buffer service included
//! ```
//!
//! ## Feature Flags
//!
//! - **`service`** (default): tokio receive loop with one worker task per region
//! - **`file-logging`**: per-run log files next to console output
//!
//! ## Usage
//!
//! ```rust
//! use spynnaker::prelude::*;
//!
//! let config = SpynnakerConfig::default();
//! let settings = spynnaker::flow_control_settings(&config).unwrap();
//!
//! let core = CoreAddress::new(0, 0, 1);
//! let region = EventRegion::from_schedule([(5, 10), (5, 11), (5, 12)]).unwrap();
//!
//! let mut manager = BufferManager::new();
//! manager.add_region(core, 0, region, settings).unwrap();
//!
//! // A core with 100 free bytes asks for data
//! let datagram = DeviceBufferRequest::new(core, 0, 0, 100).to_bytes();
//! let response = manager.handle_datagram(&datagram).unwrap();
//! assert_eq!(response.to_wire_bytes().unwrap().len(), 18);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: spynnaker-config, spynnaker-observability  │
//! │  (TOML + overrides, logging)                            │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Wire protocol: spynnaker-eieio                         │
//! │  (command + data packets, session commands)             │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Streaming: spynnaker-buffers                           │
//! │  (event regions, flow control, buffer service)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

use spynnaker_buffers::{BufferError, FlowControlSettings};
use spynnaker_config::{LoggingConfig, SpynnakerConfig};
use spynnaker_observability::{parse_debug_flags, LoggingGuard};
use tracing::info;

// Re-export workspace crates
pub use spynnaker_buffers as buffers;
pub use spynnaker_config as config;
pub use spynnaker_eieio as eieio;
pub use spynnaker_observability as observability;

#[cfg(feature = "service")]
mod host;
#[cfg(feature = "service")]
pub use host::{spawn_buffer_service, BufferServiceHandle};

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::buffers::{
        BufferError, BufferManager, CoreAddress, DeviceBufferRequest, EventRegion,
        FlowControlSettings, RegionFlowController, Response, StreamState,
    };
    pub use crate::config::{load_config, validate_config, KeyWidth, SpynnakerConfig};
    pub use crate::eieio::session::SessionCommand;
    pub use crate::eieio::{EieioCommand, EieioDataHeader, EieioDataPacket, EieioPacket, EieioType};

    #[cfg(feature = "service")]
    pub use crate::buffers::{BufferService, ServiceStats};
}

/// Packing settings for the `[buffers]` section of `config`.
pub fn flow_control_settings(config: &SpynnakerConfig) -> Result<FlowControlSettings, BufferError> {
    FlowControlSettings::try_from(&config.buffers)
}

/// Installs logging for the `[logging]` section.
///
/// Debug crates listed in the config are merged with `--debug-*` arguments and
/// `SPYNNAKER_DEBUG`.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut debug_flags = parse_debug_flags();
    for crate_name in &config.debug_crates {
        debug_flags.enable(crate_name);
    }

    let guard =
        spynnaker_observability::init_logging(&debug_flags, &config.level, config.log_dir.clone(), None)?;
    info!(
        target: "spynnaker",
        level = %config.level,
        debug_crates = ?debug_flags.enabled_crates,
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyWidth;
    use crate::eieio::EieioType;

    #[test]
    fn test_settings_follow_config() {
        let mut config = SpynnakerConfig::default();
        config.buffers.key_width = KeyWidth::Bits16;
        config.buffers.max_packet_bytes = 64;

        let settings = flow_control_settings(&config).unwrap();
        assert_eq!(settings.eieio_type, EieioType::Key16);
        assert_eq!(settings.max_packet_bytes, 64);

        config.buffers.max_packet_bytes = 4;
        assert!(matches!(
            flow_control_settings(&config),
            Err(BufferError::InvalidSettings(_))
        ));
    }
}
