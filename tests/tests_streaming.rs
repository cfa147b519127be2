//! End-to-end streaming tests
//!
//! Configuration in, regions registered, a simulated core pulling events through the async
//! buffer service until it is told to stop.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use spynnaker::prelude::*;
use spynnaker::{flow_control_settings, spawn_buffer_service};
use spynnaker_eieio::decode_stream;

/// Emulates a core's ring buffer: pulls until `Stop`, collecting `(timestamp, key)` pairs.
async fn pull_until_stop(
    handle: &mut spynnaker::BufferServiceHandle,
    core: CoreAddress,
    region_id: u8,
    free_bytes: u32,
) -> Vec<(u32, u32)> {
    let mut received = Vec::new();
    for sequence_no in 0.. {
        let request = DeviceBufferRequest::new(core, region_id, sequence_no, free_bytes);
        handle.requests.send(request.to_bytes().to_vec()).await.unwrap();

        let (address, response) = handle.responses.recv().await.unwrap();
        assert_eq!(address, core);
        match response {
            Response::SendData { bytes, .. } => {
                assert!(bytes.len() <= free_bytes as usize);
                for packet in decode_stream(&bytes).unwrap() {
                    let data = packet.as_data().unwrap();
                    if let Some(timestamp) = data.header().payload_base {
                        received.extend(data.keys().map(|key| (timestamp, key)));
                    }
                }
            }
            Response::Stop { region_id: stopped, .. } => {
                assert_eq!(stopped, region_id);
                break;
            }
            Response::Padding { .. } => panic!("unexpected padding"),
        }
    }
    received
}

#[tokio::test]
async fn test_two_cores_stream_their_schedules() {
    let config = SpynnakerConfig::default();
    let settings = flow_control_settings(&config).unwrap();

    let first = CoreAddress::new(0, 0, 1);
    let second = CoreAddress::new(0, 1, 1);
    let first_schedule: Vec<(u32, u32)> = (0..600).map(|key| (key / 100, key)).collect();
    let second_schedule: Vec<(u32, u32)> = (0..50).map(|key| (key * 3, 0x8000_0000 | key)).collect();

    let mut manager = BufferManager::new();
    manager
        .add_region(first, 0, EventRegion::from_schedule(first_schedule.clone()).unwrap(), settings)
        .unwrap();
    manager
        .add_region(second, 2, EventRegion::from_schedule(second_schedule.clone()).unwrap(), settings)
        .unwrap();
    let manager = Arc::new(manager);

    let mut handle = spawn_buffer_service(Arc::clone(&manager), &config.service);

    assert_eq!(pull_until_stop(&mut handle, first, 0, 300).await, first_schedule);
    assert_eq!(pull_until_stop(&mut handle, second, 2, 97).await, second_schedule);
    assert_eq!(manager.region_state(first, 0), Some(StreamState::Exhausted));

    let spynnaker::BufferServiceHandle { requests, task, .. } = handle;
    drop(requests);
    let stats = task.await.unwrap().unwrap();
    assert_eq!(stats.workers_spawned, 2);
    assert_eq!(stats.requests_dropped, 0);
    assert_eq!(stats.responses_sent, stats.datagrams_received);
}

#[tokio::test]
async fn test_retransmitted_request_gets_same_bytes() {
    let config = SpynnakerConfig::default();
    let core = CoreAddress::new(1, 1, 3);
    let mut manager = BufferManager::new();
    manager
        .add_region(
            core,
            0,
            EventRegion::from_schedule((0..30).map(|key| (key, key))).unwrap(),
            flow_control_settings(&config).unwrap(),
        )
        .unwrap();
    let mut handle = spawn_buffer_service(Arc::new(manager), &config.service);

    let request = DeviceBufferRequest::new(core, 0, 9, 40).to_bytes().to_vec();
    handle.requests.send(request.clone()).await.unwrap();
    handle.requests.send(request).await.unwrap();

    let (_, first) = handle.responses.recv().await.unwrap();
    let (_, second) = handle.responses.recv().await.unwrap();
    assert_eq!(first.to_wire_bytes().unwrap(), second.to_wire_bytes().unwrap());
}

#[tokio::test]
async fn test_garbage_datagrams_produce_no_response() {
    let config = SpynnakerConfig::default();
    let mut handle = spawn_buffer_service(Arc::new(BufferManager::new()), &config.service);

    handle.requests.send(Vec::new()).await.unwrap();
    handle.requests.send(vec![2; 15]).await.unwrap();
    let spynnaker::BufferServiceHandle {
        requests,
        mut responses,
        task,
    } = handle;
    drop(requests);

    assert!(responses.recv().await.is_none());
    let stats = task.await.unwrap().unwrap();
    assert_eq!(stats.datagrams_received, 2);
    assert_eq!(stats.requests_dropped, 2);
}

#[test]
fn test_config_file_drives_packet_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spynnaker_configuration.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[buffers]").unwrap();
    writeln!(file, "key_width = \"bits16\"").unwrap();

    let mut cli_args = HashMap::new();
    cli_args.insert("max_packet_bytes".to_string(), "64".to_string());
    let config = load_config(Some(&path), Some(&cli_args)).unwrap();
    validate_config(&config).unwrap();

    let settings = flow_control_settings(&config).unwrap();
    let core = CoreAddress::new(0, 0, 1);
    let mut manager = BufferManager::new();
    manager
        .add_region(core, 0, EventRegion::from_schedule((0..100).map(|key| (0, key))).unwrap(), settings)
        .unwrap();

    let response = manager
        .handle_request(&DeviceBufferRequest::new(core, 0, 0, 1000))
        .unwrap();
    let bytes = response.to_wire_bytes().unwrap();
    for packet in decode_stream(&bytes).unwrap() {
        let data = packet.as_data().unwrap();
        assert_eq!(data.header().eieio_type, EieioType::Key16);
        assert!(data.encoded_len() <= 64);
    }
    assert_eq!(manager.remaining_keys(core, 0), Some(0));
}
