// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Wiring of the buffer service onto channels sized from configuration.

use std::sync::Arc;

use spynnaker_buffers::{BufferError, BufferManager, BufferService, CoreAddress, Response, ServiceStats};
use spynnaker_config::ServiceConfig;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

/// Endpoints of a running buffer service.
///
/// Dropping `requests` (and every clone of it) stops the service once queued requests are
/// answered; `task` then yields the final counters.
pub struct BufferServiceHandle {
    /// Raw request datagrams from the transport layer
    pub requests: Sender<Vec<u8>>,
    /// Responses for the transport layer to deliver
    pub responses: Receiver<(CoreAddress, Response)>,
    pub task: JoinHandle<Result<ServiceStats, BufferError>>,
}

/// Spawns a [`BufferService`] for `manager` on the current tokio runtime.
///
/// # Panics
/// Panics when called outside a tokio runtime.
pub fn spawn_buffer_service(manager: Arc<BufferManager>, config: &ServiceConfig) -> BufferServiceHandle {
    let (requests, inbound) = mpsc::channel(config.inbound_channel_capacity.max(1));
    let (outbound, responses) = mpsc::channel(config.outbound_channel_capacity.max(1));
    let service = BufferService::from_config(manager, config);
    let task = tokio::spawn(service.run(inbound, outbound));
    BufferServiceHandle {
        requests,
        responses,
        task,
    }
}
