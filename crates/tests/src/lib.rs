//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约测试（错误码、属性编号、配置默认值、转发格式）
//! - 模拟设备上的 e2e 场景（协商、重同步、请求互斥、属性读写）
//! - 协议栈性质测试（编解码往返、错位恢复、终止事件顺序）

#[cfg(test)]
mod contract_tests {
    use contracts::{
        DisconnectReason, Event, EventPayload, ImuProperty, ImuSample, SensorDesc, SensorInitError,
        SensorProperty, ZenConfig, ZenError,
    };

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ZenError::IoBusy.code(), 811);
        assert_eq!(ZenError::IoTimeout.code(), 812);
        assert_eq!(ZenError::UnknownProperty.code(), 850);
        assert_eq!(ZenError::InvalidSensorHandle.code(), 2001);
        assert_eq!(ZenError::from_code(814), Some(ZenError::IoUnsupportedFunction));
        assert_eq!(SensorInitError::ConnectFailed.code(), 7);
    }

    #[test]
    fn test_property_tags() {
        assert_eq!(SensorProperty::DeviceName.tag(), 1000);
        assert_eq!(ImuProperty::StreamData.tag(), 1000);
        assert_ne!(ImuProperty::OutputQuat.tag(), ImuProperty::OutputEuler.tag());
    }

    #[test]
    fn test_desc_identity() {
        let a = SensorDesc::new("one", "IG1-1", "Test", "sim", 921_600);
        let b = SensorDesc::new("other name", "IG1-1", "Test", "sim", 115_200);
        assert_eq!(a, b);
        assert!(a.matches("Test", "sim", "IG1-1"));
    }

    #[test]
    fn test_only_disconnect_is_terminal() {
        let lost = Event::new(1, 0, EventPayload::SensorDisconnected(DisconnectReason::ConnectionLost));
        let sample = Event::new(1, 1, EventPayload::Imu(ImuSample::default()));
        assert!(lost.is_terminal());
        assert!(!sample.is_terminal());
    }

    #[test]
    fn test_config_defaults_survive_loader() {
        let loaded = config_loader::ConfigLoader::load_from_str("", config_loader::ConfigFormat::Toml).unwrap();
        assert_eq!(loaded, ZenConfig::default());
        assert_eq!(loaded.protocol.io_timeout_ms, 2500);
        assert!(!loaded.relay.enabled);
    }

    #[test]
    fn test_relay_record_layout() {
        let event = Event::new(
            0x0102,
            1,
            EventPayload::Imu(ImuSample {
                frame_count: 5,
                ..Default::default()
            }),
        );
        let record = dispatcher::encode_event(&event).unwrap().unwrap();
        assert_eq!(record[..4], [0, 0, 0, dispatcher::RELAY_TYPE_IMU]);
        assert_eq!(record[4..12], 0x0102u64.to_le_bytes());

        let listing = Event::new(0, 0, EventPayload::SensorDisconnected(DisconnectReason::Released));
        assert!(dispatcher::encode_event(&listing).unwrap().is_none());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use contracts::{
        DisconnectReason, DropPolicy, Event, EventPayload, Frame, Framing, ImuProperty, SensorDesc,
        ZenConfig, ZenError, COMPONENT_GNSS, COMPONENT_IMU, MAX_PAYLOAD_LEN,
    };
    use dispatcher::EventQueue;
    use ingestion::mock::{MockTransport, SimulatedDevice};
    use ingestion::opcodes::OpcodeV1;
    use ingestion::{decode_all, Communicator, ConnectionNegotiator, FrameCodec, SyncedCommunicator};
    use openzen::{Client, SensorManager};
    use rand::Rng;
    use sensor_core::Sensor;

    const IG1P: &str = "LPMS-IG1P-RS232";

    fn negotiate(device: Arc<SimulatedDevice>) -> ingestion::Negotiated {
        let transport = MockTransport::with_device("sim", device);
        let communicator = Communicator::new(transport, Framing::Zensync);
        ConnectionNegotiator::new(communicator).negotiate(921_600).unwrap()
    }

    fn connect(device: Arc<SimulatedDevice>) -> (Arc<Sensor>, Arc<MockTransport>) {
        let transport = MockTransport::with_device("sim", device);
        let communicator = Communicator::new(transport.clone(), Framing::Zensync);
        let negotiated = ConnectionNegotiator::new(communicator.clone()).negotiate(921_600).unwrap();
        let desc = SensorDesc::new("sim", "sim-1", "Test", "sim", 921_600);
        let sensor =
            Sensor::create(3, desc, negotiated.config, communicator, Duration::from_millis(1000)).unwrap();
        (sensor, transport)
    }

    fn client_with(device: Arc<SimulatedDevice>, config: ZenConfig) -> (Client, openzen::SensorHandle) {
        let client = Client::new(SensorManager::new(config));
        let desc = client.manager().mock_io().add_device("sim", IG1P, device);
        let handle = client.obtain_sensor(&desc).unwrap();
        (client, handle)
    }

    fn drain(queue: &EventQueue, until: impl Fn(&Event) -> bool) -> Vec<Event> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            match queue.try_pop() {
                Some(event) => {
                    let done = until(&event);
                    events.push(event);
                    if done {
                        break;
                    }
                }
                None => thread::sleep(Duration::from_millis(2)),
            }
        }
        events
    }

    /// S1: 旧版固件协商
    #[test]
    fn test_legacy_negotiation() {
        let negotiated = negotiate(SimulatedDevice::legacy());
        assert_eq!(negotiated.config.version, 0);
        assert_eq!(negotiated.config.components.len(), 1);
        assert_eq!(negotiated.config.components[0].id, COMPONENT_IMU);
        assert_eq!(negotiated.config.components[0].version, 0);
    }

    /// S2: Ig1 协商，带 GNSS 的型号多一个组件
    #[test]
    fn test_ig1_negotiation() {
        let plain = negotiate(SimulatedDevice::ig1("LPMS-IG1-RS232"));
        assert_eq!(plain.config.version, 1);
        let ids: Vec<&str> = plain.config.components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![COMPONENT_IMU]);

        let gnss = negotiate(SimulatedDevice::ig1(IG1P));
        let ids: Vec<&str> = gnss.config.components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![COMPONENT_IMU, COMPONENT_GNSS]);
    }

    /// S3: 垃圾前缀后仍能解出完整帧
    #[test]
    fn test_resync_after_garbage() {
        let mut wire = vec![0x1A, 0x00, 0x01];
        wire.extend(Framing::Zensync.encode(10, 11, &[1, 2, 3, 4]).unwrap());

        let (frames, discarded) = decode_all(Framing::Zensync, &wire);
        assert_eq!(frames, vec![Frame::new(10, 11, vec![1u8, 2, 3, 4])]);
        assert!(discarded <= 3);
    }

    /// S4: 同一时刻只允许一个未完成的同步请求
    #[test]
    fn test_concurrent_request_is_busy() {
        let transport = MockTransport::new();
        let communicator = Communicator::new(transport.clone(), Framing::Zensync);
        let synced = Arc::new(SyncedCommunicator::with_timeout(communicator, Duration::from_secs(2)));

        let first = {
            let synced = synced.clone();
            thread::spawn(move || synced.send_and_wait_for_ack(0, 6, 0, &[]))
        };
        while transport.sent_bytes().is_empty() {
            thread::yield_now();
        }
        assert_eq!(synced.send_and_wait_for_ack(0, 6, 0, &[]), Err(ZenError::IoBusy));

        synced.publish_ack(0, Ok(()));
        assert_eq!(first.join().unwrap(), Ok(()));
        assert_eq!(transport.sent_bytes().len(), 1);
    }

    /// S5: 输出开关映射到传输位掩码
    #[test]
    fn test_output_toggle_through_client() {
        let device = SimulatedDevice::ig1(IG1P);
        let (client, handle) = client_with(device.clone(), ZenConfig::default());
        let imu = client.components(handle, Some(COMPONENT_IMU)).unwrap()[0];
        device.clear_received();

        let tag = ImuProperty::OutputLinearAcc.tag();
        client.set_bool(handle, Some(imu), tag, true).unwrap();
        assert!(client.get_bool(handle, Some(imu), tag).unwrap());
        client.set_bool(handle, Some(imu), tag, false).unwrap();

        let masks: Vec<Vec<u8>> = device
            .received()
            .into_iter()
            .filter(|frame| frame.function == OpcodeV1::SetImuTransmitData.code())
            .map(|frame| frame.payload.to_vec())
            .collect();
        assert_eq!(masks, vec![0x2001u32.to_le_bytes().to_vec(), 0x1u32.to_le_bytes().to_vec()]);
        assert_eq!(device.imu_bitset(), 0x1);
        assert!(device.is_streaming());
    }

    /// S6: 读取属性时先退出流模式，之后恢复
    #[test]
    fn test_filter_mode_read_is_quiesced() {
        let device = SimulatedDevice::ig1("LPMS-IG1-RS232");
        let (client, handle) = client_with(device.clone(), ZenConfig::default());
        let imu = client.components(handle, Some(COMPONENT_IMU)).unwrap()[0];
        device.clear_received();

        assert_eq!(client.get_int32(handle, Some(imu), ImuProperty::FilterMode.tag()), Ok(3));
        assert_eq!(
            device.received_functions(),
            vec![
                OpcodeV1::GotoCommandMode.code(),
                OpcodeV1::GetFilterMode.code(),
                OpcodeV1::GotoStreamMode.code()
            ]
        );
    }

    #[test]
    fn test_failed_read_restores_streaming() {
        let device = SimulatedDevice::ig1("LPMS-IG1-RS232");
        let mut config = ZenConfig::default();
        config.protocol.io_timeout_ms = 300;
        let (client, handle) = client_with(device.clone(), config);
        let imu = client.components(handle, Some(COMPONENT_IMU)).unwrap()[0];

        // the getter is then answered with a bare ack
        device.update(|state| {
            state.registers.remove(&OpcodeV1::GetFilterMode.code());
        });
        assert!(client.get_int32(handle, Some(imu), ImuProperty::FilterMode.tag()).is_err());
        assert!(device.is_streaming());
        assert_eq!(client.get_bool(handle, Some(imu), ImuProperty::StreamData.tag()), Ok(true));
    }

    #[test]
    fn test_round_trip_every_framing() {
        let mut rng = rand::rng();
        for framing in [Framing::Zensync, Framing::Ascii, Framing::Rtu] {
            for _ in 0..32 {
                let len = rng.random_range(0..=MAX_PAYLOAD_LEN);
                let payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
                let address: u8 = rng.random();
                let function: u8 = rng.random();

                let wire = framing.encode(address, function, &payload).unwrap();
                let (frames, discarded) = decode_all(framing, &wire);
                assert_eq!(discarded, 0, "{framing:?}");
                assert_eq!(frames, vec![Frame::new(address, function, payload)], "{framing:?}");
            }
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        for framing in [Framing::Zensync, Framing::Ascii, Framing::Rtu] {
            assert_eq!(framing.encode(1, 2, &payload), Err(ZenError::IoMsgTooBig));
        }
    }

    #[test]
    fn test_recovery_from_skewed_stream() {
        let mut rng = rand::rng();
        for framing in [Framing::Zensync, Framing::Ascii] {
            for _ in 0..32 {
                // ':' starts a frame in both framings
                let prefix: Vec<u8> = (0..rng.random_range(0..64))
                    .map(|_| rng.random::<u8>())
                    .filter(|byte| *byte != b':')
                    .collect();
                let mut wire = prefix.clone();
                wire.extend(framing.encode(1, 9, &[7, 7, 7]).unwrap());

                let (frames, discarded) = decode_all(framing, &wire);
                assert_eq!(frames, vec![Frame::new(1, 9, vec![7u8, 7, 7])], "{framing:?}");
                assert_eq!(discarded, prefix.len(), "{framing:?}");
            }
        }
    }

    #[test]
    fn test_samples_reach_every_subscriber() {
        let (sensor, transport) = connect(SimulatedDevice::ig1("LPMS-IG1-RS232"));
        let a = Arc::new(EventQueue::new(16, DropPolicy::DropNewest));
        let b = Arc::new(EventQueue::new(16, DropPolicy::DropNewest));
        sensor.subscribe(a.clone());
        sensor.subscribe(b.clone());

        let mut payload = 500u32.to_le_bytes().to_vec();
        for value in [1.0f32, 2.0, 3.0] {
            payload.extend(value.to_le_bytes());
        }
        transport
            .emit_frame(0, OpcodeV1::GetRawImuSensorData.code(), &payload)
            .unwrap();

        for queue in [&a, &b] {
            let events = drain(queue, |_| true);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].sensor, 3);
            assert!(matches!(events[0].payload, EventPayload::Imu(_)));
        }
    }

    #[test]
    fn test_nothing_follows_disconnect() {
        let device = SimulatedDevice::ig1(IG1P);
        let (client, _handle) = client_with(device, ZenConfig::default());
        let manager = client.manager().clone();

        manager.shutdown();
        let events = drain(client.queue(), Event::is_terminal);
        let last = events.last().unwrap();
        assert_eq!(
            last.payload,
            EventPayload::SensorDisconnected(DisconnectReason::Shutdown)
        );
        assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);

        thread::sleep(Duration::from_millis(20));
        assert!(client.poll_next_event().is_none());
    }

    #[test]
    fn test_last_release_drops_sensor() {
        let manager = SensorManager::new(ZenConfig::default());
        let desc = manager.mock_io().add_device("sim", IG1P, SimulatedDevice::ig1(IG1P));
        let first = Client::new(manager.clone());
        let second = Client::new(manager.clone());

        let a = first.obtain_sensor(&desc).unwrap();
        let b = second.obtain_sensor(&desc).unwrap();
        assert_eq!(manager.sensor_count(), 1);

        first.release_sensor(a).unwrap();
        assert_eq!(manager.sensor_count(), 1);
        second.release_sensor(b).unwrap();
        assert_eq!(manager.sensor_count(), 0);
        assert!(manager.sensor(b.0).is_none());

        // a fresh obtain negotiates again
        let again = first.obtain_sensor(&desc).unwrap();
        assert_ne!(again, a);
        assert_eq!(manager.sensor_count(), 1);
    }

    #[tokio::test]
    async fn test_async_listing_reports_devices() {
        let manager = SensorManager::new(ZenConfig::default());
        manager.mock_io().add_device("a", IG1P, SimulatedDevice::ig1(IG1P));
        manager.mock_io().add_device("b", "LPMS-CU2", SimulatedDevice::legacy());
        let client = Client::new(manager.clone());
        client.list_sensors_async().unwrap();

        let mut found = Vec::new();
        let listing = async {
            while let Some(event) = client.next_event().await {
                match event.payload {
                    EventPayload::SensorFound(desc) => found.push(desc.identifier),
                    EventPayload::SensorListingProgress(progress) if progress.complete => break,
                    _ => {}
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), listing).await.unwrap();

        found.sort();
        assert_eq!(found, vec!["a", "b"]);
        manager.shutdown();
    }
}
