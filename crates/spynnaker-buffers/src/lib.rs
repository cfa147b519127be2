// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! # Buffered Event Streaming
//!
//! Host side of the pull protocol that feeds pre-computed spike schedules to running cores:
//!
//! - **[`EventRegion`]** - the time-ordered keys of one (core, region), built before the run
//! - **[`RegionFlowController`]** - answers each [`DeviceBufferRequest`] with data, stop or
//!   padding, never exceeding the free space the device reported
//! - **[`BufferManager`]** - registry of controllers, one lock per region
//! - **[`BufferService`]** (feature `service`) - tokio receive loop with one worker per region
//!
//! ## Basic Usage
//!
//! ```rust
//! use spynnaker_buffers::{
//!     BufferManager, CoreAddress, DeviceBufferRequest, EventRegion, FlowControlSettings, Response,
//! };
//!
//! let core = CoreAddress::new(0, 0, 1);
//! let mut region = EventRegion::new();
//! region.add_keys(5, [10, 11, 12]).unwrap();
//!
//! let mut manager = BufferManager::new();
//! manager.add_region(core, 0, region, FlowControlSettings::default()).unwrap();
//!
//! let response = manager.handle_request(&DeviceBufferRequest::new(core, 0, 0, 100)).unwrap();
//! assert!(matches!(response, Response::SendData { .. }));
//!
//! let response = manager.handle_request(&DeviceBufferRequest::new(core, 0, 1, 100)).unwrap();
//! assert!(response.is_stop());
//! ```

mod device_request;
mod error;
mod event_region;
mod flow_controller;
pub mod manager;
mod response;
#[cfg(feature = "service")]
pub mod service;

pub use device_request::{CoreAddress, DeviceBufferRequest};
pub use error::BufferError;
pub use event_region::EventRegion;
pub use flow_controller::{FlowControlSettings, RegionFlowController, StreamState, ZERO_PAD_WORD};
pub use manager::BufferManager;
pub use response::Response;
#[cfg(feature = "service")]
pub use service::{BufferService, ServiceStats};
