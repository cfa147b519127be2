// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! Per-region flow control: turns device buffer requests into responses.
//!
//! Each request is answered by packing as many timestamped data packets as the device's
//! reported free space allows, taking keys from the region in timestamp order. A region with
//! nothing left answers `Stop` from then on.

use spynnaker_config::{BuffersConfig, KeyWidth};
use spynnaker_eieio::session::{self, SessionCommand, PADDING_PACKET_BYTE_COUNT};
use spynnaker_eieio::{EieioDataHeader, EieioDataPacket, EieioPacket, EieioType};
use tracing::{debug, info};

use crate::{BufferError, CoreAddress, DeviceBufferRequest, EventRegion, Response};

/// Written into leftover space too small for a data packet
pub const ZERO_PAD_WORD: [u8; 2] = [0, 0];

/// Lifecycle of one region's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Nothing sent yet
    Idle,
    Streaming,
    /// Terminal: every request is answered with `Stop`
    Exhausted,
}

/// Packet shape used when packing a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlSettings {
    /// Key-only type; the timestamp travels in the payload base
    pub eieio_type: EieioType,
    pub max_packet_bytes: usize,
}

impl Default for FlowControlSettings {
    fn default() -> Self {
        Self {
            eieio_type: EieioType::Key32,
            max_packet_bytes: 256,
        }
    }
}

impl FlowControlSettings {
    pub fn new(eieio_type: EieioType, max_packet_bytes: usize) -> Result<Self, BufferError> {
        let settings = Self {
            eieio_type,
            max_packet_bytes,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BufferError> {
        if self.eieio_type.has_payload() {
            return Err(BufferError::InvalidSettings(format!(
                "{} carries per-key payloads, a key-only type is required",
                self.eieio_type
            )));
        }
        if self.max_packet_bytes < self.minimal_packet_bytes() {
            return Err(BufferError::InvalidSettings(format!(
                "max_packet_bytes {} is below the minimal packet size {}",
                self.max_packet_bytes,
                self.minimal_packet_bytes()
            )));
        }
        Ok(())
    }

    /// Header plus timestamp plus one key.
    pub fn minimal_packet_bytes(&self) -> usize {
        self.header(0).minimal_packet_byte_count()
    }

    fn header(&self, timestamp: u32) -> EieioDataHeader {
        EieioDataHeader::timestamped(self.eieio_type, timestamp)
    }

    /// Checks every key and timestamp of `region` fits this packet shape.
    pub fn check_region(&self, region: &EventRegion) -> Result<(), BufferError> {
        let max_value = self.eieio_type.max_value();
        if let Some(key) = region.max_key().filter(|key| *key > max_value) {
            return Err(BufferError::KeyOutOfRange {
                key,
                eieio_type: self.eieio_type,
            });
        }
        if let Some(timestamp) = region.last_timestamp().filter(|t| *t > max_value) {
            return Err(BufferError::TimestampOutOfRange {
                timestamp,
                eieio_type: self.eieio_type,
            });
        }
        Ok(())
    }
}

impl TryFrom<&BuffersConfig> for FlowControlSettings {
    type Error = BufferError;

    fn try_from(config: &BuffersConfig) -> Result<Self, Self::Error> {
        let eieio_type = match config.key_width {
            KeyWidth::Bits16 => EieioType::Key16,
            KeyWidth::Bits32 => EieioType::Key32,
        };
        Self::new(eieio_type, config.max_packet_bytes)
    }
}

/// Owns one region and answers the requests its core sends for it.
#[derive(Debug)]
pub struct RegionFlowController {
    address: CoreAddress,
    region_id: u8,
    region: EventRegion,
    settings: FlowControlSettings,
    state: StreamState,
    last_serviced: Option<(u32, Response)>, // sequence number, response sent
}

impl RegionFlowController {
    pub fn new(
        address: CoreAddress,
        region_id: u8,
        region: EventRegion,
        settings: FlowControlSettings,
    ) -> Result<Self, BufferError> {
        if region_id > DeviceBufferRequest::MAX_REGION_ID {
            return Err(BufferError::InvalidRegionId(region_id));
        }
        settings.validate()?;
        settings.check_region(&region)?;
        Ok(Self {
            address,
            region_id,
            region,
            settings,
            state: StreamState::Idle,
            last_serviced: None,
        })
    }

    pub fn address(&self) -> CoreAddress {
        self.address
    }

    pub fn region_id(&self) -> u8 {
        self.region_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn settings(&self) -> &FlowControlSettings {
        &self.settings
    }

    pub fn region(&self) -> &EventRegion {
        &self.region
    }

    /// Produces the response to one device request.
    ///
    /// A request repeating the sequence number of the previous one is a retransmission and
    /// gets the previous response again, without touching the region. A retransmission
    /// reporting less free space than that response needs is rejected with
    /// `ReplayExceedsFreeSpace` and the cached response is kept.
    pub fn handle_request(
        &mut self,
        request: &DeviceBufferRequest,
    ) -> Result<Response, BufferError> {
        if let Some((sequence_no, response)) = &self.last_serviced {
            if *sequence_no == request.sequence_no {
                if let Response::SendData { bytes, .. } = response {
                    if bytes.len() > request.free_bytes as usize {
                        return Err(BufferError::ReplayExceedsFreeSpace {
                            sequence_no: *sequence_no,
                            cached: bytes.len(),
                            free_space: request.free_bytes as usize,
                        });
                    }
                }
                debug!(
                    target: "spynnaker-buffers",
                    address = %self.address,
                    region_id = self.region_id,
                    sequence_no,
                    "Replaying response to retransmitted request"
                );
                return Ok(response.clone());
            }
        }

        let response = self.respond(request)?;
        self.last_serviced = Some((request.sequence_no, response.clone()));
        Ok(response)
    }

    fn respond(&mut self, request: &DeviceBufferRequest) -> Result<Response, BufferError> {
        if self.state == StreamState::Exhausted || !self.region.has_more() {
            self.mark_exhausted();
            return Ok(Response::Stop {
                address: self.address,
                region_id: self.region_id,
            });
        }

        let bytes = self.pack(request.free_bytes as usize)?;
        Ok(Response::SendData {
            address: self.address,
            region_id: self.region_id,
            sequence_no: request.sequence_no,
            bytes,
        })
    }

    /// Packs data packets into at most `free_space` bytes.
    ///
    /// Leftover space too small for another packet (but at least 2 bytes) is closed with a
    /// zero pad word so the device never parses a truncated header.
    pub fn pack(&mut self, free_space: usize) -> Result<Vec<u8>, BufferError> {
        let mut bytes = Vec::new();
        let remaining = self.pack_events(&mut bytes, free_space)?;
        if remaining > 0
            && remaining < self.settings.minimal_packet_bytes()
            && remaining >= ZERO_PAD_WORD.len()
        {
            bytes.extend_from_slice(&ZERO_PAD_WORD);
        }
        check_free_space(bytes.len(), free_space)?;
        Ok(bytes)
    }

    /// Builds the initial contents of a device buffer of `region_size` bytes.
    ///
    /// Packs as much as fits; if that drains the region an `EventStop` follows, and the rest
    /// is filled with padding commands (rounded down to whole padding packets).
    ///
    /// Only an `Idle` region can be prefilled; use [`reset`](Self::reset) before loading again.
    pub fn prefill(&mut self, region_size: usize) -> Result<Vec<u8>, BufferError> {
        if self.state != StreamState::Idle {
            return Err(BufferError::RegionAlreadyStarted {
                address: self.address,
                region_id: self.region_id,
            });
        }
        let mut bytes = Vec::with_capacity(region_size);
        let mut remaining = self.pack_events(&mut bytes, region_size)?;

        if !self.region.has_more() && remaining >= PADDING_PACKET_BYTE_COUNT {
            bytes.extend_from_slice(&SessionCommand::EventStop.to_bytes());
            remaining -= PADDING_PACKET_BYTE_COUNT;
            self.mark_exhausted();
        }

        let padding = remaining - remaining % PADDING_PACKET_BYTE_COUNT;
        bytes.extend(session::padding_bytes(padding)?);

        check_free_space(bytes.len(), region_size)?;
        debug!(
            target: "spynnaker-buffers",
            address = %self.address,
            region_id = self.region_id,
            written = bytes.len(),
            keys_left = self.region.n_keys(),
            "Prefilled region buffer"
        );
        Ok(bytes)
    }

    /// Swaps in the schedule for the next run and rewinds to `Idle`.
    pub fn reset(&mut self, region: EventRegion) -> Result<(), BufferError> {
        self.settings.check_region(&region)?;
        self.region = region;
        self.state = StreamState::Idle;
        self.last_serviced = None;
        Ok(())
    }

    // Returns the unused part of free_space
    fn pack_events(&mut self, bytes: &mut Vec<u8>, free_space: usize) -> Result<usize, BufferError> {
        let minimal = self.settings.minimal_packet_bytes();
        let mut remaining = free_space;
        let mut n_packets = 0usize;

        while remaining >= minimal {
            let Some(timestamp) = self.region.peek_timestamp() else {
                break;
            };
            let header = self.settings.header(timestamp);
            let n_entries = header
                .max_entries(remaining.min(self.settings.max_packet_bytes))
                .min(self.region.bucket_size(timestamp));

            let mut packet = EieioDataPacket::new(header)?;
            for _ in 0..n_entries {
                match self.region.take_key() {
                    Some(key) => packet.try_add_key(key)?,
                    None => break,
                }
            }

            let before = bytes.len();
            EieioPacket::Data(packet).write_to(bytes);
            remaining = remaining.saturating_sub(bytes.len() - before);
            n_packets += 1;
        }

        if n_packets > 0 {
            self.state = StreamState::Streaming;
            debug!(
                target: "spynnaker-buffers",
                address = %self.address,
                region_id = self.region_id,
                n_packets,
                free_space,
                remaining,
                "Packed event packets"
            );
        }
        Ok(remaining)
    }

    fn mark_exhausted(&mut self) {
        if self.state != StreamState::Exhausted {
            self.state = StreamState::Exhausted;
            info!(
                target: "spynnaker-buffers",
                address = %self.address,
                region_id = self.region_id,
                "Region drained, stream stopped"
            );
        }
    }
}

fn check_free_space(written: usize, free_space: usize) -> Result<(), BufferError> {
    if written > free_space {
        return Err(BufferError::BufferOverflow {
            written,
            free_space,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spynnaker_eieio::decode_stream;

    const CORE: CoreAddress = CoreAddress::new(0, 0, 1);

    fn controller(region: EventRegion, max_packet_bytes: usize) -> RegionFlowController {
        let settings = FlowControlSettings::new(EieioType::Key32, max_packet_bytes).unwrap();
        RegionFlowController::new(CORE, 0, region, settings).unwrap()
    }

    fn request(sequence_no: u32, free_bytes: u32) -> DeviceBufferRequest {
        DeviceBufferRequest::new(CORE, 0, sequence_no, free_bytes)
    }

    fn sent_bytes(response: Response) -> Vec<u8> {
        match response {
            Response::SendData { bytes, .. } => bytes,
            other => panic!("expected SendData, got {:?}", other),
        }
    }

    #[test]
    fn test_single_bucket_then_stop() {
        let region = EventRegion::from_schedule([(5, 10), (5, 11), (5, 12)]).unwrap();
        let mut controller = controller(region, 256);

        let bytes = sent_bytes(controller.handle_request(&request(0, 100)).unwrap());
        assert_eq!(
            bytes,
            vec![3, 0b0011_1000, 5, 0, 0, 0, 10, 0, 0, 0, 11, 0, 0, 0, 12, 0, 0, 0]
        );
        assert_eq!(controller.state(), StreamState::Streaming);

        let response = controller.handle_request(&request(1, 100)).unwrap();
        assert!(response.is_stop());
        assert_eq!(controller.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_entry_count_capped_at_255() {
        let mut region = EventRegion::new();
        region.add_keys(0, 0..300).unwrap();
        let mut controller = controller(region, 2048);

        let bytes = sent_bytes(controller.handle_request(&request(0, 1026)).unwrap());
        let packets = decode_stream(&bytes).unwrap();
        assert_eq!(packets.len(), 1);
        let data = packets[0].as_data().unwrap();
        assert_eq!(data.count(), 255);
        assert_eq!(data.header().payload_base, Some(0));

        assert_eq!(controller.region().bucket_size(0), 45);
        assert_eq!(controller.state(), StreamState::Streaming);
    }

    #[test]
    fn test_too_little_space_gets_pad_word() {
        let region = EventRegion::from_schedule([(1, 1)]).unwrap();
        let mut controller = controller(region, 256);

        let bytes = sent_bytes(controller.handle_request(&request(0, 7)).unwrap());
        assert_eq!(bytes, ZERO_PAD_WORD.to_vec());
        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(controller.region().n_keys(), 1);
    }

    #[test]
    fn test_one_byte_left_is_not_padded() {
        let region = EventRegion::from_schedule([(1, 1)]).unwrap();
        let mut controller = controller(region, 256);

        let bytes = sent_bytes(controller.handle_request(&request(0, 1)).unwrap());
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_stop_is_terminal() {
        let mut controller = controller(EventRegion::new(), 256);
        for sequence_no in 0..5 {
            assert!(controller
                .handle_request(&request(sequence_no, 1000))
                .unwrap()
                .is_stop());
        }
        assert_eq!(controller.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_retransmission_replayed() {
        let region = EventRegion::from_schedule((0..20).map(|key| (key / 5, key))).unwrap();
        let mut controller = controller(region, 256);

        let first = controller.handle_request(&request(7, 30)).unwrap();
        let keys_after_first = controller.region().n_keys();
        let replay = controller.handle_request(&request(7, 30)).unwrap();

        assert_eq!(first, replay);
        assert_eq!(controller.region().n_keys(), keys_after_first);

        let next = controller.handle_request(&request(8, 30)).unwrap();
        assert_ne!(first, next);
        assert!(controller.region().n_keys() < keys_after_first);
    }

    #[test]
    fn test_free_space_respected_and_order_kept() {
        let region =
            EventRegion::from_schedule((0..500u32).map(|key| (key / 37, key))).unwrap();
        let mut controller = controller(region, 128);

        let mut timestamps = Vec::new();
        let mut keys = Vec::new();
        for (sequence_no, free_space) in (0..).zip([11u32, 64, 3, 200, 17, 1000, 999, 4096, 50]
            .into_iter()
            .cycle())
        {
            match controller.handle_request(&request(sequence_no, free_space)).unwrap() {
                Response::SendData { bytes, .. } => {
                    assert!(bytes.len() <= free_space as usize);
                    for packet in decode_stream(&bytes).unwrap() {
                        let data = packet.as_data().unwrap();
                        assert!(data.count() <= 255);
                        if let Some(timestamp) = data.header().payload_base {
                            timestamps.push(timestamp);
                        }
                        keys.extend(data.keys());
                    }
                }
                Response::Stop { .. } => break,
                Response::Padding { .. } => unreachable!(),
            }
        }

        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(keys, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_prefill_drains_and_stops() {
        let region = EventRegion::from_schedule([(0, 1), (1, 2)]).unwrap();
        let mut controller = controller(region, 256);

        let bytes = controller.prefill(40).unwrap();
        assert_eq!(bytes.len(), 40);
        let packets = decode_stream(&bytes).unwrap();
        assert_eq!(packets.len(), 2 + 1 + 9); // two data packets, EventStop, padding
        assert_eq!(
            SessionCommand::from_packet(&packets[2]),
            Some(SessionCommand::EventStop)
        );
        assert_eq!(controller.state(), StreamState::Exhausted);
        assert!(controller.handle_request(&request(0, 100)).unwrap().is_stop());
    }

    #[test]
    fn test_prefill_only_once_per_run() {
        let region = EventRegion::from_schedule([(0, 1)]).unwrap();
        let mut controller = controller(region, 256);

        controller.prefill(40).unwrap();
        assert!(matches!(
            controller.prefill(40),
            Err(BufferError::RegionAlreadyStarted { region_id: 0, .. })
        ));

        controller.reset(EventRegion::from_schedule([(0, 2)]).unwrap()).unwrap();
        let bytes = controller.prefill(40).unwrap();
        let stops = decode_stream(&bytes)
            .unwrap()
            .iter()
            .filter(|p| SessionCommand::from_packet(p) == Some(SessionCommand::EventStop))
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_prefill_after_streaming_rejected() {
        let region = EventRegion::from_schedule((0..10).map(|key| (0, key))).unwrap();
        let mut controller = controller(region, 256);

        controller.handle_request(&request(0, 14)).unwrap();
        assert_eq!(controller.state(), StreamState::Streaming);
        assert!(controller.prefill(64).is_err());
        assert_eq!(controller.region().n_keys(), 8);
    }

    #[test]
    fn test_shorter_retransmission_not_replayed() {
        let region = EventRegion::from_schedule((0..50).map(|key| (key / 10, key))).unwrap();
        let mut controller = controller(region, 256);

        let first = sent_bytes(controller.handle_request(&request(7, 200)).unwrap());
        let keys_left = controller.region().n_keys();
        assert!(matches!(
            controller.handle_request(&request(7, 20)),
            Err(BufferError::ReplayExceedsFreeSpace {
                sequence_no: 7,
                free_space: 20,
                ..
            })
        ));
        assert_eq!(controller.region().n_keys(), keys_left);

        let again = sent_bytes(controller.handle_request(&request(7, 200)).unwrap());
        assert_eq!(first, again);
    }

    #[test]
    fn test_prefill_partial_keeps_streaming() {
        let mut region = EventRegion::new();
        region.add_keys(0, 0..10).unwrap();
        let mut controller = controller(region, 256);

        let bytes = controller.prefill(21).unwrap();
        // 6 byte header + 3 keys, 3 bytes left: one padding packet, one byte unused
        assert_eq!(bytes.len(), 20);
        assert_eq!(controller.region().n_keys(), 7);
        assert_eq!(controller.state(), StreamState::Streaming);
    }

    #[test]
    fn test_key_and_timestamp_width_checked() {
        let settings = FlowControlSettings::new(EieioType::Key16, 64).unwrap();

        let wide_key = EventRegion::from_schedule([(0, 0x1_0000)]).unwrap();
        assert!(matches!(
            RegionFlowController::new(CORE, 0, wide_key, settings),
            Err(BufferError::KeyOutOfRange { key: 0x1_0000, .. })
        ));

        let late = EventRegion::from_schedule([(70_000, 1)]).unwrap();
        assert!(matches!(
            RegionFlowController::new(CORE, 0, late, settings),
            Err(BufferError::TimestampOutOfRange { .. })
        ));

        assert!(matches!(
            RegionFlowController::new(CORE, 16, EventRegion::new(), settings),
            Err(BufferError::InvalidRegionId(16))
        ));
    }

    #[test]
    fn test_settings_validation() {
        assert!(FlowControlSettings::new(EieioType::KeyPayload32, 256).is_err());
        assert!(FlowControlSettings::new(EieioType::Key32, 9).is_err());
        assert_eq!(
            FlowControlSettings::new(EieioType::Key16, 6)
                .unwrap()
                .minimal_packet_bytes(),
            6
        );

        let config = BuffersConfig {
            max_packet_bytes: 512,
            key_width: KeyWidth::Bits16,
        };
        let settings = FlowControlSettings::try_from(&config).unwrap();
        assert_eq!(settings.eieio_type, EieioType::Key16);
        assert_eq!(settings.max_packet_bytes, 512);
    }

    #[test]
    fn test_config_minimum_matches_codec() {
        for key_width in [KeyWidth::Bits16, KeyWidth::Bits32] {
            let mut config = spynnaker_config::SpynnakerConfig::default();
            config.buffers.key_width = key_width;
            config.buffers.max_packet_bytes = 1024;
            let settings = FlowControlSettings::try_from(&config.buffers).unwrap();
            assert_eq!(
                spynnaker_config::validation::minimal_packet_bytes(&config),
                settings.minimal_packet_bytes()
            );
        }
    }

    #[test]
    fn test_reset_rewinds_state() {
        let mut controller = controller(EventRegion::from_schedule([(0, 1)]).unwrap(), 256);
        controller.handle_request(&request(0, 100)).unwrap();
        assert!(controller.handle_request(&request(1, 100)).unwrap().is_stop());

        controller
            .reset(EventRegion::from_schedule([(0, 9)]).unwrap())
            .unwrap();
        assert_eq!(controller.state(), StreamState::Idle);
        let bytes = sent_bytes(controller.handle_request(&request(1, 100)).unwrap());
        assert_eq!(&bytes[6..], &[9, 0, 0, 0]);
    }
}
