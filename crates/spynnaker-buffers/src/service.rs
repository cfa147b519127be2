// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Async front end of the buffer manager.
//!
//! A single receive loop decodes raw request datagrams and routes each one to the worker task
//! owning its (core, region). Workers are created on first use and fed through a bounded
//! channel, so the requests of one region are packed strictly in arrival order, one at a time.

use std::sync::Arc;

use ahash::AHashMap;
use spynnaker_config::ServiceConfig;
use spynnaker_eieio::EieioCommand;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::manager::RegionKey;
use crate::{BufferError, BufferManager, CoreAddress, DeviceBufferRequest, Response};

/// Raw request datagrams, as delivered by the transport layer
pub type InboundReceiver = Receiver<Vec<u8>>;

/// Responses for the transport layer to deliver
pub type OutboundSender = Sender<(CoreAddress, Response)>;

/// Counters reported when the service stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub datagrams_received: u64,
    pub responses_sent: u64,
    /// Malformed, unroutable or failed requests
    pub requests_dropped: u64,
    pub workers_spawned: usize,
}

#[derive(Debug, Default)]
struct WorkerStats {
    responses_sent: u64,
    requests_dropped: u64,
}

/// Receive loop plus one worker task per region.
pub struct BufferService {
    manager: Arc<BufferManager>,
    region_channel_capacity: usize,
}

impl BufferService {
    pub fn new(manager: Arc<BufferManager>, region_channel_capacity: usize) -> Self {
        Self {
            manager,
            region_channel_capacity: region_channel_capacity.max(1),
        }
    }

    pub fn from_config(manager: Arc<BufferManager>, config: &ServiceConfig) -> Self {
        Self::new(manager, config.region_channel_capacity)
    }

    /// Serves requests until `inbound` closes or a fatal error occurs.
    ///
    /// Recoverable failures (bad datagrams, unknown regions, full worker queues) are logged and
    /// the request is dropped; the device will ask again. A `BufferOverflow` stops the service
    /// and is returned. Either way the workers are drained and joined before returning.
    pub async fn run(
        self,
        mut inbound: InboundReceiver,
        outbound: OutboundSender,
    ) -> Result<ServiceStats, BufferError> {
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<BufferError>(1);
        let mut workers: AHashMap<RegionKey, Sender<DeviceBufferRequest>> = AHashMap::new();
        let mut handles: Vec<JoinHandle<WorkerStats>> = Vec::new();
        let mut stats = ServiceStats::default();

        info!(target: "spynnaker-buffers", regions = self.manager.n_regions(), "Buffer service started");

        let outcome = loop {
            tokio::select! {
                biased;

                Some(err) = fatal_rx.recv() => break Err(err),

                datagram = inbound.recv() => {
                    let Some(datagram) = datagram else {
                        break Ok(());
                    };
                    stats.datagrams_received += 1;

                    let Some(request) = self.route(&datagram) else {
                        stats.requests_dropped += 1;
                        continue;
                    };

                    let key = (request.address, request.region_id);
                    let sender = workers.entry(key).or_insert_with(|| {
                        let (tx, rx) = mpsc::channel(self.region_channel_capacity);
                        handles.push(tokio::spawn(region_worker(
                            Arc::clone(&self.manager),
                            rx,
                            outbound.clone(),
                            fatal_tx.clone(),
                        )));
                        debug!(target: "spynnaker-buffers", address = %key.0, region_id = key.1, "Spawned region worker");
                        tx
                    });

                    match sender.try_send(request) {
                        Ok(()) => {}
                        Err(TrySendError::Full(request)) => {
                            warn!(
                                target: "spynnaker-buffers",
                                address = %request.address,
                                region_id = request.region_id,
                                sequence_no = request.sequence_no,
                                "Region queue full, dropping request"
                            );
                            stats.requests_dropped += 1;
                        }
                        Err(TrySendError::Closed(request)) => {
                            warn!(
                                target: "spynnaker-buffers",
                                address = %request.address,
                                region_id = request.region_id,
                                "Region worker stopped, dropping request"
                            );
                            stats.requests_dropped += 1;
                        }
                    }
                }
            }
        };

        stats.workers_spawned = handles.len();
        drop(workers);
        drop(fatal_tx);
        for handle in handles {
            match handle.await {
                Ok(worker) => {
                    stats.responses_sent += worker.responses_sent;
                    stats.requests_dropped += worker.requests_dropped;
                }
                Err(err) => warn!(target: "spynnaker-buffers", "Region worker failed: {}", err),
            }
        }

        // A worker may have hit a fatal error while draining its queue
        let outcome = match (outcome, fatal_rx.try_recv()) {
            (Ok(()), Ok(err)) => Err(err),
            (outcome, _) => outcome,
        };

        match outcome {
            Ok(()) => {
                info!(
                    target: "spynnaker-buffers",
                    received = stats.datagrams_received,
                    sent = stats.responses_sent,
                    dropped = stats.requests_dropped,
                    "Buffer service stopped"
                );
                Ok(stats)
            }
            Err(err) => {
                error!(target: "spynnaker-buffers", "Buffer service terminated: {}", err);
                Err(err)
            }
        }
    }

    // Decodes a datagram and checks it names a managed region
    fn route(&self, datagram: &[u8]) -> Option<DeviceBufferRequest> {
        let request = match DeviceBufferRequest::try_from_bytes(datagram) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: "spynnaker-buffers", len = datagram.len(), "Dropping malformed request: {}", err);
                return None;
            }
        };
        if request.command != EieioCommand::SpinnakerRequestBuffers {
            warn!(
                target: "spynnaker-buffers",
                address = %request.address,
                command = %request.command,
                "Dropping request with unexpected command"
            );
            return None;
        }
        if !self
            .manager
            .contains_region(request.address, request.region_id)
        {
            warn!(
                target: "spynnaker-buffers",
                address = %request.address,
                region_id = request.region_id,
                "Dropping request for unmanaged region"
            );
            return None;
        }
        Some(request)
    }
}

async fn region_worker(
    manager: Arc<BufferManager>,
    mut requests: Receiver<DeviceBufferRequest>,
    outbound: OutboundSender,
    fatal: Sender<BufferError>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Some(request) = requests.recv().await {
        match manager.handle_request(&request) {
            Ok(response) => {
                if outbound.send((request.address, response)).await.is_err() {
                    warn!(target: "spynnaker-buffers", "Outbound channel closed, region worker stopping");
                    break;
                }
                stats.responses_sent += 1;
            }
            Err(err) if err.is_fatal() => {
                error!(
                    target: "spynnaker-buffers",
                    address = %request.address,
                    region_id = request.region_id,
                    "Fatal packing error: {}",
                    err
                );
                let _ = fatal.try_send(err);
                break;
            }
            Err(err) => {
                warn!(
                    target: "spynnaker-buffers",
                    address = %request.address,
                    region_id = request.region_id,
                    sequence_no = request.sequence_no,
                    "Dropping request: {}",
                    err
                );
                stats.requests_dropped += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventRegion, FlowControlSettings};

    const CORE: CoreAddress = CoreAddress::new(0, 0, 1);

    fn manager() -> Arc<BufferManager> {
        let mut manager = BufferManager::new();
        manager
            .add_region(
                CORE,
                0,
                EventRegion::from_schedule((0..40).map(|key| (key / 10, key))).unwrap(),
                FlowControlSettings::default(),
            )
            .unwrap();
        Arc::new(manager)
    }

    #[tokio::test]
    async fn test_requests_answered_in_order() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let service = tokio::spawn(BufferService::new(manager(), 8).run(in_rx, out_tx));

        for sequence_no in 0..6 {
            let request = DeviceBufferRequest::new(CORE, 0, sequence_no, 50);
            in_tx.send(request.to_bytes().to_vec()).await.unwrap();
        }
        drop(in_tx);

        let mut seen = Vec::new();
        while let Some((address, response)) = out_rx.recv().await {
            assert_eq!(address, CORE);
            if let Response::SendData { sequence_no, .. } = response {
                seen.push(sequence_no);
            }
        }
        let stats = service.await.unwrap().unwrap();

        assert_eq!(seen, (0..seen.len() as u32).collect::<Vec<_>>());
        assert_eq!(stats.datagrams_received, 6);
        assert_eq!(stats.responses_sent, 6);
        assert_eq!(stats.workers_spawned, 1);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_dropped() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let service = tokio::spawn(BufferService::new(manager(), 8).run(in_rx, out_tx));

        in_tx.send(vec![0xFF; 3]).await.unwrap();
        let unknown = DeviceBufferRequest::new(CoreAddress::new(5, 5, 5), 0, 0, 100);
        in_tx.send(unknown.to_bytes().to_vec()).await.unwrap();
        drop(in_tx);

        assert!(out_rx.recv().await.is_none());
        let stats = service.await.unwrap().unwrap();
        assert_eq!(stats.requests_dropped, 2);
        assert_eq!(stats.workers_spawned, 0);
    }
}
