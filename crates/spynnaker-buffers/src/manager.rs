// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Registry of region flow controllers, one per (core, region).

use ahash::AHashMap;
use parking_lot::Mutex;
use spynnaker_eieio::EieioCommand;
use tracing::{debug, info};

use crate::{
    BufferError, CoreAddress, DeviceBufferRequest, EventRegion, FlowControlSettings,
    RegionFlowController, Response, StreamState,
};

/// Identifies a region stream.
pub type RegionKey = (CoreAddress, u8);

/// Owns every streamed region for a run.
///
/// Regions are registered before the run with `&mut self`; requests are then served through
/// `&self`, each region behind its own lock so packs on different regions never contend.
#[derive(Debug, Default)]
pub struct BufferManager {
    regions: AHashMap<RegionKey, Mutex<RegionFlowController>>,
}

impl BufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `region` over to the manager.
    ///
    /// Fails if the region is already registered or its keys do not fit `settings`.
    pub fn add_region(
        &mut self,
        address: CoreAddress,
        region_id: u8,
        region: EventRegion,
        settings: FlowControlSettings,
    ) -> Result<(), BufferError> {
        if self.regions.contains_key(&(address, region_id)) {
            return Err(BufferError::RegionAlreadyRegistered { address, region_id });
        }
        let n_keys = region.n_keys();
        let controller = RegionFlowController::new(address, region_id, region, settings)?;
        self.regions
            .insert((address, region_id), Mutex::new(controller));
        debug!(
            target: "spynnaker-buffers",
            %address,
            region_id,
            n_keys,
            "Registered region"
        );
        Ok(())
    }

    /// Answers one decoded device request.
    pub fn handle_request(&self, request: &DeviceBufferRequest) -> Result<Response, BufferError> {
        if request.command != EieioCommand::SpinnakerRequestBuffers {
            return Err(BufferError::UnexpectedCommand(request.command));
        }
        let controller = self.controller(request.address, request.region_id)?;
        let mut controller = controller.lock();
        controller.handle_request(request)
    }

    /// Decodes a raw request record and answers it.
    pub fn handle_datagram(&self, bytes: &[u8]) -> Result<Response, BufferError> {
        let request = DeviceBufferRequest::try_from_bytes(bytes)?;
        self.handle_request(&request)
    }

    /// Initial load of a region's device buffer. See [`RegionFlowController::prefill`].
    pub fn prefill(
        &self,
        address: CoreAddress,
        region_id: u8,
        region_size: usize,
    ) -> Result<Vec<u8>, BufferError> {
        self.controller(address, region_id)?.lock().prefill(region_size)
    }

    pub fn region_state(&self, address: CoreAddress, region_id: u8) -> Option<StreamState> {
        self.regions
            .get(&(address, region_id))
            .map(|controller| controller.lock().state())
    }

    /// Keys not yet sent for a region.
    pub fn remaining_keys(&self, address: CoreAddress, region_id: u8) -> Option<usize> {
        self.regions
            .get(&(address, region_id))
            .map(|controller| controller.lock().region().n_keys())
    }

    pub fn contains_region(&self, address: CoreAddress, region_id: u8) -> bool {
        self.regions.contains_key(&(address, region_id))
    }

    pub fn n_regions(&self) -> usize {
        self.regions.len()
    }

    /// Registered regions, sorted for deterministic output.
    pub fn region_keys(&self) -> Vec<RegionKey> {
        let mut keys: Vec<RegionKey> = self.regions.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Loads the schedules of the next run.
    ///
    /// Every registered region is rewound; those missing from `schedules` restart empty.
    /// Nothing changes unless every schedule names a registered region and fits its settings.
    pub fn reset_regions<I>(&self, schedules: I) -> Result<(), BufferError>
    where
        I: IntoIterator<Item = (RegionKey, EventRegion)>,
    {
        let mut schedules: AHashMap<RegionKey, EventRegion> = schedules.into_iter().collect();

        for ((address, region_id), region) in &schedules {
            let controller = self.controller(*address, *region_id)?;
            controller.lock().settings().check_region(region)?;
        }

        for (key, controller) in &self.regions {
            let region = schedules.remove(key).unwrap_or_default();
            controller.lock().reset(region)?;
        }
        info!(
            target: "spynnaker-buffers",
            n_regions = self.regions.len(),
            "Regions reset for next run"
        );
        Ok(())
    }

    /// Discards all region state at the end of a run.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    fn controller(
        &self,
        address: CoreAddress,
        region_id: u8,
    ) -> Result<&Mutex<RegionFlowController>, BufferError> {
        self.regions
            .get(&(address, region_id))
            .ok_or(BufferError::RegionNotFound { address, region_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORE: CoreAddress = CoreAddress::new(1, 0, 2);

    fn manager_with(schedule: &[(u32, u32)]) -> BufferManager {
        let mut manager = BufferManager::new();
        manager
            .add_region(
                CORE,
                3,
                EventRegion::from_schedule(schedule.iter().copied()).unwrap(),
                FlowControlSettings::default(),
            )
            .unwrap();
        manager
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let mut manager = manager_with(&[(0, 1)]);
        let result = manager.add_region(
            CORE,
            3,
            EventRegion::new(),
            FlowControlSettings::default(),
        );
        assert_eq!(
            result,
            Err(BufferError::RegionAlreadyRegistered {
                address: CORE,
                region_id: 3
            })
        );
    }

    #[test]
    fn test_unknown_region_is_error() {
        let manager = manager_with(&[(0, 1)]);
        let request = DeviceBufferRequest::new(CORE, 4, 0, 100);
        assert_eq!(
            manager.handle_request(&request),
            Err(BufferError::RegionNotFound {
                address: CORE,
                region_id: 4
            })
        );
    }

    #[test]
    fn test_wrong_command_rejected_without_state_change() {
        let manager = manager_with(&[(0, 1)]);
        let mut request = DeviceBufferRequest::new(CORE, 3, 0, 100);
        request.command = EieioCommand::HostDataRead;

        assert_eq!(
            manager.handle_request(&request),
            Err(BufferError::UnexpectedCommand(EieioCommand::HostDataRead))
        );
        assert_eq!(manager.region_state(CORE, 3), Some(StreamState::Idle));
        assert_eq!(manager.remaining_keys(CORE, 3), Some(1));
    }

    #[test]
    fn test_malformed_datagram_is_protocol_error() {
        let manager = manager_with(&[(0, 1)]);
        assert!(matches!(
            manager.handle_datagram(&[1, 2, 3]),
            Err(BufferError::Protocol(_))
        ));
        assert_eq!(manager.remaining_keys(CORE, 3), Some(1));
    }

    #[test]
    fn test_reset_regions() {
        let mut manager = manager_with(&[(0, 1), (1, 2)]);
        manager
            .add_region(
                CORE,
                4,
                EventRegion::from_schedule([(0, 5)]).unwrap(),
                FlowControlSettings::default(),
            )
            .unwrap();

        let datagram = DeviceBufferRequest::new(CORE, 3, 0, 1000).to_bytes();
        manager.handle_datagram(&datagram).unwrap();
        assert_eq!(manager.remaining_keys(CORE, 3), Some(0));

        let unknown = ((CoreAddress::new(9, 9, 9), 0), EventRegion::new());
        assert!(manager.reset_regions([unknown]).is_err());
        assert_eq!(manager.remaining_keys(CORE, 4), Some(1));

        let next_run = EventRegion::from_schedule([(0, 7), (0, 8)]).unwrap();
        manager.reset_regions([((CORE, 3), next_run)]).unwrap();
        assert_eq!(manager.remaining_keys(CORE, 3), Some(2));
        assert_eq!(manager.remaining_keys(CORE, 4), Some(0));
        assert_eq!(manager.region_state(CORE, 3), Some(StreamState::Idle));

        manager.clear();
        assert_eq!(manager.n_regions(), 0);
    }
}
