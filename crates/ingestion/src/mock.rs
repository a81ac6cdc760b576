//! Mock 传输层与模拟设备
//!
//! 用于无真实硬件的测试。`MockTransport` 记录所有发送的字节；挂接
//! `SimulatedDevice` 后，设备在自己的线程上解析请求并按寄存器模型回复，
//! 因此回复永远不会在 `send` 调用内部重入。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread;

use async_channel::{Receiver, Sender};
use contracts::{
    BytesCallback, DisconnectCallback, Frame, Framing, IoSystem, SensorDesc, SensorInitError,
    Transport, ZenError, ZenResult,
};
use tracing::{debug, trace};

use crate::codec::{self, FrameCodec, FrameParser};
use crate::opcodes::{OpcodeV0, OpcodeV1};

/// Io type name of every mock transport.
pub const MOCK_IO_TYPE: &str = "Test";

const SUPPORTED_BAUD_RATES: [u32; 5] = [115_200, 230_400, 460_800, 921_600, 2_000_000];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 传输层到设备线程的消息
enum DeviceMessage {
    /// 主机发送的原始字节
    Request(Vec<u8>),
    /// 设备主动发出的原始字节 (数据流)
    Emit(Vec<u8>),
}

/// Mock 传输层
pub struct MockTransport {
    identifier: String,
    baud_rate: AtomicU32,
    callback: RwLock<Option<BytesCallback>>,
    on_disconnect: Mutex<Option<DisconnectCallback>>,
    delivery: Mutex<()>,
    sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    device: Mutex<Option<Sender<DeviceMessage>>>,
}

impl MockTransport {
    /// 创建不带设备的传输层，发送的字节只会被记录
    pub fn new() -> Arc<Self> {
        Self::named("mock")
    }

    pub fn named(identifier: &str) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            baud_rate: AtomicU32::new(921_600),
            callback: RwLock::new(None),
            on_disconnect: Mutex::new(None),
            delivery: Mutex::new(()),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            device: Mutex::new(None),
        })
    }

    /// 创建挂接模拟设备的传输层
    pub fn with_device(identifier: &str, device: Arc<SimulatedDevice>) -> Arc<Self> {
        let transport = Self::named(identifier);
        let (tx, rx) = async_channel::unbounded();
        *lock(&transport.device) = Some(tx);

        let weak = Arc::downgrade(&transport);
        thread::Builder::new()
            .name(format!("mock-device-{identifier}"))
            .spawn(move || device.run(rx, weak))
            .map_err(|error| debug!(%error, "failed to spawn mock device thread"))
            .ok();
        transport
    }

    /// 同步注入来自设备的字节
    pub fn inject(&self, bytes: &[u8]) {
        let _delivery = lock(&self.delivery);
        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(bytes);
        }
    }

    /// 通过设备线程发出一帧，与回复保持顺序
    pub fn emit_frame(&self, address: u8, function: u8, payload: &[u8]) -> ZenResult<()> {
        let wire = Framing::Zensync.encode(address, function, payload)?;
        match lock(&self.device).as_ref() {
            Some(tx) => tx
                .send_blocking(DeviceMessage::Emit(wire))
                .map_err(|_| ZenError::IoSendFailed),
            None => {
                self.inject(&wire);
                Ok(())
            }
        }
    }

    /// 所有已发送的原始字节块
    pub fn sent_bytes(&self) -> Vec<Vec<u8>> {
        lock(&self.sent).clone()
    }

    /// 按 ZenSync 解码已发送的帧
    pub fn sent_frames(&self) -> Vec<Frame> {
        let wire: Vec<u8> = lock(&self.sent).concat();
        codec::decode_all(Framing::Zensync, &wire).0
    }

    pub fn clear_sent(&self) {
        lock(&self.sent).clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 模拟设备掉线
    pub fn disconnect(&self) {
        let callback = lock(&self.on_disconnect).take();
        self.close();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl Transport for MockTransport {
    fn io_type(&self) -> &str {
        MOCK_IO_TYPE
    }

    fn send(&self, data: &[u8]) -> ZenResult<()> {
        if self.is_closed() {
            return Err(ZenError::IoSendFailed);
        }
        lock(&self.sent).push(data.to_vec());
        if let Some(tx) = lock(&self.device).as_ref() {
            tx.send_blocking(DeviceMessage::Request(data.to_vec()))
                .map_err(|_| ZenError::IoSendFailed)?;
        }
        Ok(())
    }

    fn baud_rate(&self) -> ZenResult<u32> {
        Ok(self.baud_rate.load(Ordering::Relaxed))
    }

    fn set_baud_rate(&self, rate: u32) -> ZenResult<()> {
        if !SUPPORTED_BAUD_RATES.contains(&rate) {
            return Err(ZenError::InvalidArgument);
        }
        self.baud_rate.store(rate, Ordering::Relaxed);
        Ok(())
    }

    fn supported_baud_rates(&self) -> ZenResult<Vec<u32>> {
        Ok(SUPPORTED_BAUD_RATES.to_vec())
    }

    fn equals(&self, desc: &SensorDesc) -> bool {
        desc.io_type == MOCK_IO_TYPE && desc.identifier == self.identifier
    }

    fn subscribe(&self, callback: BytesCallback) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn unsubscribe(&self) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // dropping the sender ends the device thread
            lock(&self.device).take();
            self.unsubscribe();
        }
    }

    fn on_disconnect(&self, callback: DisconnectCallback) {
        *lock(&self.on_disconnect) = Some(callback);
    }
}

/// 模拟设备的协议代
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Legacy,
    Ig1,
}

/// 模拟设备的寄存器模型
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub generation: Generation,
    pub streaming: bool,
    pub imu_bitset: u32,
    pub gps_bitset: u64,
    /// getter 功能码 -> 回复负载
    pub registers: HashMap<u8, Vec<u8>>,
    /// 前 N 个命令模式请求不回复 (模拟中途接入数据流)
    pub unanswered_command_modes: u32,
    /// 不回复任何请求
    pub silent: bool,
    /// 进入流模式的 ack 之后紧接着发出的帧
    pub stream_burst: Vec<Frame>,
}

/// 模拟设备
///
/// 记录收到的每一帧，按协议代回复 ack / nack / 寄存器值。
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
    received: Mutex<Vec<Frame>>,
}

fn u32_bytes(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

fn floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl SimulatedDevice {
    /// 旧款传感器 (LPMS-CU2 等)
    pub fn legacy() -> Arc<Self> {
        use OpcodeV0 as Op;

        let mut registers = HashMap::new();
        registers.insert(Op::GetFirmwareInfoOrImuId.code(), vec![0, 0, 0, 23]);
        registers.insert(Op::GetSerialNumber.code(), b"LPMSCU2000573".to_vec());
        registers.insert(Op::GetDeviceName.code(), b"LPMS-CU2".to_vec());
        registers.insert(Op::GetFirmwareInfo.code(), b"2.0.5".to_vec());
        // major version last
        registers.insert(Op::GetFirmwareVersion.code(), [5u32, 0, 2].iter().flat_map(|v| v.to_le_bytes()).collect());
        registers.insert(Op::GetBatteryLevel.code(), floats(&[87.5]));
        registers.insert(Op::GetBatteryVoltage.code(), floats(&[3.9]));
        registers.insert(Op::GetBatteryCharging.code(), u32_bytes(1));
        registers.insert(Op::GetPing.code(), u32_bytes(0));
        registers.insert(Op::GetFilterMode.code(), u32_bytes(2));
        registers.insert(Op::GetFilterPreset.code(), u32_bytes(0));
        registers.insert(Op::GetGyrRange.code(), u32_bytes(2000));
        registers.insert(Op::GetAccRange.code(), u32_bytes(4));
        registers.insert(Op::GetMagRange.code(), u32_bytes(4));
        registers.insert(Op::GetFieldRadius.code(), floats(&[50.0]));
        registers.insert(Op::GetLinearCompensationRate.code(), u32_bytes(0));
        registers.insert(Op::GetCentricCompensationRate.code(), floats(&[0.0]));
        registers.insert(Op::GetBaudRate.code(), u32_bytes(921_600));
        registers.insert(Op::GetCanMapping.code(), vec![0; 64]);
        registers.insert(Op::GetCanHeartbeat.code(), u32_bytes(1));
        registers.insert(Op::GetCanConfiguration.code(), u32_bytes(0));
        for getter in [Op::GetAccAlignment, Op::GetGyrAlignment, Op::GetMagSoftIronMatrix, Op::GetMagAlignment] {
            registers.insert(getter.code(), floats(&IDENTITY));
        }
        for getter in [Op::GetAccBias, Op::GetGyrBias, Op::GetMagHardIronOffset, Op::GetMagBias, Op::GetMagReference] {
            registers.insert(getter.code(), floats(&[0.0; 3]));
        }

        Self::from_state(DeviceState {
            generation: Generation::Legacy,
            streaming: false,
            // quaternion, euler, raw acc/gyr/mag
            imu_bitset: (1 << 18) | (1 << 17) | (1 << 12) | (1 << 11) | (1 << 10),
            gps_bitset: 0,
            registers,
            unanswered_command_modes: 0,
            silent: false,
            stream_burst: Vec::new(),
        })
    }

    /// Ig1 传感器，`model` 为 GetSensorModel 的回复
    pub fn ig1(model: &str) -> Arc<Self> {
        use OpcodeV1 as Op;

        let mut registers = HashMap::new();
        registers.insert(Op::GetSensorModel.code(), model.as_bytes().to_vec());
        registers.insert(Op::GetFirmwareInfo.code(), b"v-10-100-100-100-100-100".to_vec());
        registers.insert(Op::GetSerialNumber.code(), b"IG1-000123".to_vec());
        registers.insert(Op::GetFilterVersion.code(), b"1.0".to_vec());
        registers.insert(Op::GetSensorStatus.code(), u32_bytes(0));
        registers.insert(Op::GetImuId.code(), u32_bytes(1));
        registers.insert(Op::GetStreamFreq.code(), u32_bytes(100));
        registers.insert(Op::GetDegGradOutput.code(), u32_bytes(0));
        registers.insert(Op::GetAccRange.code(), u32_bytes(8));
        registers.insert(Op::GetGyrRange.code(), u32_bytes(2000));
        registers.insert(Op::GetEnableGyrAutoCalibration.code(), u32_bytes(1));
        registers.insert(Op::GetGyrThreshold.code(), u32_bytes(0));
        registers.insert(Op::GetMagRange.code(), u32_bytes(8));
        registers.insert(Op::GetMagCalibrationTimeout.code(), u32_bytes(20));
        registers.insert(Op::GetFilterMode.code(), u32_bytes(3));
        registers.insert(Op::GetCanStartId.code(), u32_bytes(1));
        registers.insert(Op::GetCanBaudRate.code(), u32_bytes(1000));
        registers.insert(Op::GetCanDataPrecision.code(), u32_bytes(1));
        registers.insert(Op::GetCanMode.code(), u32_bytes(0));
        registers.insert(Op::GetCanMapping.code(), vec![0; 64]);
        registers.insert(Op::GetCanHeartbeat.code(), u32_bytes(1));
        // baud rate table index, 8 = 921600
        registers.insert(Op::GetUartBaudRate.code(), u32_bytes(8));
        registers.insert(Op::GetUartFormat.code(), u32_bytes(0));
        registers.insert(Op::GetUartAsciiCharacter.code(), vec![b'!']);
        registers.insert(Op::GetLpBusDataPrecision.code(), u32_bytes(1));

        Self::from_state(DeviceState {
            generation: Generation::Ig1,
            streaming: false,
            imu_bitset: 0x0000_0001,
            gps_bitset: 0,
            registers,
            unanswered_command_modes: 0,
            silent: false,
            stream_burst: Vec::new(),
        })
    }

    pub fn from_state(state: DeviceState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            received: Mutex::new(Vec::new()),
        })
    }

    /// 修改寄存器模型
    pub fn update(&self, f: impl FnOnce(&mut DeviceState)) {
        f(&mut lock(&self.state));
    }

    pub fn state(&self) -> DeviceState {
        lock(&self.state).clone()
    }

    pub fn set_register(&self, getter: u8, value: Vec<u8>) {
        lock(&self.state).registers.insert(getter, value);
    }

    pub fn imu_bitset(&self) -> u32 {
        lock(&self.state).imu_bitset
    }

    pub fn gps_bitset(&self) -> u64 {
        lock(&self.state).gps_bitset
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    /// 收到的所有帧
    pub fn received(&self) -> Vec<Frame> {
        lock(&self.received).clone()
    }

    /// 收到的所有功能码
    pub fn received_functions(&self) -> Vec<u8> {
        lock(&self.received).iter().map(|frame| frame.function).collect()
    }

    pub fn clear_received(&self) {
        lock(&self.received).clear();
    }

    fn run(self: Arc<Self>, rx: Receiver<DeviceMessage>, transport: Weak<MockTransport>) {
        let mut parser: Box<dyn FrameParser> = Framing::Zensync.parser();
        while let Ok(message) = rx.recv_blocking() {
            let Some(transport) = transport.upgrade() else {
                break;
            };
            match message {
                DeviceMessage::Emit(bytes) => transport.inject(&bytes),
                DeviceMessage::Request(bytes) => {
                    let mut requests = Vec::new();
                    codec::drive(parser.as_mut(), &bytes, |frame| requests.push(frame), |_| {});
                    for request in requests {
                        for reply in self.respond(request) {
                            match Framing::Zensync.encode(reply.address, reply.function, &reply.payload) {
                                Ok(wire) => transport.inject(&wire),
                                Err(error) => debug!(%error, "mock reply not encodable"),
                            }
                        }
                    }
                }
            }
        }
        trace!("mock device stopped");
    }

    fn respond(&self, request: Frame) -> Vec<Frame> {
        lock(&self.received).push(request.clone());
        let mut state = lock(&self.state);
        if state.silent {
            return Vec::new();
        }
        let was_streaming = state.streaming;
        let reply = match state.generation {
            Generation::Legacy => Self::respond_v0(&mut state, &request),
            Generation::Ig1 => Self::respond_v1(&mut state, &request),
        };
        let mut replies: Vec<Frame> = reply.into_iter().collect();
        if state.streaming && !was_streaming {
            replies.extend(state.stream_burst.iter().cloned());
        }
        replies
    }

    fn ack(request: &Frame) -> Option<Frame> {
        Some(Frame::empty(request.address, OpcodeV0::Ack.code()))
    }

    fn nack(request: &Frame) -> Option<Frame> {
        Some(Frame::empty(request.address, OpcodeV0::Nack.code()))
    }

    fn read_u32(payload: &[u8]) -> Option<u32> {
        payload.get(..4)?.try_into().ok().map(u32::from_le_bytes)
    }

    fn respond_v0(state: &mut DeviceState, request: &Frame) -> Option<Frame> {
        use OpcodeV0 as Op;

        let Some(op) = Op::from_code(request.function) else {
            return Self::nack(request);
        };
        match op {
            Op::SetCommandMode => {
                if state.unanswered_command_modes > 0 {
                    state.unanswered_command_modes -= 1;
                    return None;
                }
                state.streaming = false;
                Self::ack(request)
            }
            Op::SetStreamMode => {
                state.streaming = true;
                Self::ack(request)
            }
            Op::GetConfig => Some(Frame::new(request.address, op.code(), u32_bytes(state.imu_bitset))),
            Op::SetTransmitData => match Self::read_u32(&request.payload) {
                Some(bitset) => {
                    state.imu_bitset = bitset;
                    Self::ack(request)
                }
                None => Self::nack(request),
            },
            _ => {
                if let Some(value) = state.registers.get(&op.code()) {
                    return Some(Frame::new(request.address, op.code(), value.clone()));
                }
                if let Some(getter) = v0_getter(op) {
                    state.registers.insert(getter, request.payload.to_vec());
                }
                Self::ack(request)
            }
        }
    }

    fn respond_v1(state: &mut DeviceState, request: &Frame) -> Option<Frame> {
        use OpcodeV1 as Op;

        let Some(op) = Op::from_code(request.function) else {
            return Self::nack(request);
        };
        match op {
            Op::GotoCommandMode => {
                if state.unanswered_command_modes > 0 {
                    state.unanswered_command_modes -= 1;
                    return None;
                }
                state.streaming = false;
                Self::ack(request)
            }
            Op::GotoStreamMode => {
                state.streaming = true;
                Self::ack(request)
            }
            Op::GetImuTransmitData => Some(Frame::new(request.address, op.code(), u32_bytes(state.imu_bitset))),
            Op::SetImuTransmitData => match Self::read_u32(&request.payload) {
                Some(bitset) => {
                    state.imu_bitset = bitset;
                    Self::ack(request)
                }
                None => Self::nack(request),
            },
            Op::GetGpsTransmitData => {
                let mut payload = u32_bytes(state.gps_bitset as u32);
                payload.extend(u32_bytes((state.gps_bitset >> 32) as u32));
                Some(Frame::new(request.address, op.code(), payload))
            }
            Op::SetGpsTransmitData => {
                let low = Self::read_u32(&request.payload);
                let high = request.payload.get(4..).and_then(Self::read_u32);
                match (low, high) {
                    (Some(low), Some(high)) => {
                        state.gps_bitset = u64::from(low) | (u64::from(high) << 32);
                        Self::ack(request)
                    }
                    _ => Self::nack(request),
                }
            }
            _ => {
                if let Some(value) = state.registers.get(&op.code()) {
                    return Some(Frame::new(request.address, op.code(), value.clone()));
                }
                // Ig1 setters sit one below their getter
                let getter = op.code().wrapping_add(1);
                if state.registers.contains_key(&getter) && !request.payload.is_empty() {
                    state.registers.insert(getter, request.payload.to_vec());
                }
                Self::ack(request)
            }
        }
    }
}

/// Getter that reads back what a legacy setter wrote.
fn v0_getter(setter: OpcodeV0) -> Option<u8> {
    use OpcodeV0 as Op;

    let getter = match setter {
        Op::SetGyrRange => Op::GetGyrRange,
        Op::SetAccBias => Op::GetAccBias,
        Op::SetAccAlignment => Op::GetAccAlignment,
        Op::SetAccRange => Op::GetAccRange,
        Op::SetMagRange => Op::GetMagRange,
        Op::SetMagHardIronOffset => Op::GetMagHardIronOffset,
        Op::SetMagSoftIronMatrix => Op::GetMagSoftIronMatrix,
        Op::SetFieldRadius => Op::GetFieldRadius,
        Op::SetFilterMode => Op::GetFilterMode,
        Op::SetFilterPreset => Op::GetFilterPreset,
        Op::SetGyrBias => Op::GetGyrBias,
        Op::SetGyrAlignment => Op::GetGyrAlignment,
        Op::SetCanMapping => Op::GetCanMapping,
        Op::SetCanHeartbeat => Op::GetCanHeartbeat,
        Op::SetLinearCompensationRate => Op::GetLinearCompensationRate,
        Op::SetCentricCompensationRate => Op::GetCentricCompensationRate,
        Op::SetMagAlignment => Op::GetMagAlignment,
        Op::SetMagBias => Op::GetMagBias,
        Op::SetMagReference => Op::GetMagReference,
        Op::SetBaudRate => Op::GetBaudRate,
        _ => return None,
    };
    Some(getter.code())
}

/// 一个模拟设备条目
pub struct MockDeviceEntry {
    pub desc: SensorDesc,
    pub device: Arc<SimulatedDevice>,
}

/// Mock IO 系统
///
/// 列出预先登记的模拟设备；`obtain` 为每次连接创建新的 `MockTransport`。
#[derive(Default)]
pub struct MockIoSystem {
    entries: Mutex<Vec<MockDeviceEntry>>,
}

impl MockIoSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个模拟设备，返回其描述
    pub fn add_device(&self, identifier: &str, name: &str, device: Arc<SimulatedDevice>) -> SensorDesc {
        let desc = SensorDesc::new(name, identifier, MOCK_IO_TYPE, identifier, 921_600);
        lock(&self.entries).push(MockDeviceEntry {
            desc: desc.clone(),
            device,
        });
        desc
    }

    pub fn remove_device(&self, identifier: &str) {
        lock(&self.entries).retain(|entry| entry.desc.identifier != identifier);
    }
}

impl IoSystem for MockIoSystem {
    fn io_type(&self) -> &str {
        MOCK_IO_TYPE
    }

    fn list_devices(&self) -> ZenResult<Vec<SensorDesc>> {
        Ok(lock(&self.entries).iter().map(|entry| entry.desc.clone()).collect())
    }

    fn obtain(&self, desc: &SensorDesc) -> Result<Arc<dyn Transport>, SensorInitError> {
        let entries = lock(&self.entries);
        let entry = entries
            .iter()
            .find(|entry| entry.desc.identifier == desc.identifier)
            .ok_or(SensorInitError::ConnectFailed)?;
        let transport: Arc<dyn Transport> =
            MockTransport::with_device(&entry.desc.identifier, entry.device.clone());
        Ok(transport)
    }

    fn default_baud_rate(&self) -> u32 {
        921_600
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn collect(transport: &Arc<MockTransport>) -> Arc<Mutex<Vec<u8>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        transport.subscribe(Arc::new(move |bytes: &[u8]| {
            sink.lock().unwrap().extend_from_slice(bytes)
        }));
        received
    }

    fn wait_for_frames(received: &Mutex<Vec<u8>>, count: usize) -> Vec<Frame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let frames = codec::decode_all(Framing::Zensync, &received.lock().unwrap()).0;
            if frames.len() >= count || Instant::now() > deadline {
                return frames;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_legacy_device_answers_handshake() {
        let device = SimulatedDevice::legacy();
        let transport = MockTransport::with_device("dev0", device.clone());
        let received = collect(&transport);

        transport.send(&Framing::Zensync.encode(0, 6, &[]).unwrap()).unwrap();
        transport.send(&Framing::Zensync.encode(0, 21, &[]).unwrap()).unwrap();

        let frames = wait_for_frames(&received, 2);
        assert_eq!(frames[0], Frame::empty(0, 0));
        assert_eq!(frames[1], Frame::new(0, 21, vec![0u8, 0, 0, 23]));
        assert_eq!(device.received_functions(), vec![6, 21]);
    }

    #[test]
    fn test_ig1_bitset_register() {
        let device = SimulatedDevice::ig1("LPMS-IG1-RS232");
        let transport = MockTransport::with_device("dev1", device.clone());
        let received = collect(&transport);

        transport
            .send(&Framing::Zensync.encode(0, 30, &0x2001u32.to_le_bytes()).unwrap())
            .unwrap();
        let frames = wait_for_frames(&received, 1);
        assert_eq!(frames[0].function, 0);
        assert_eq!(device.imu_bitset(), 0x2001);
    }

    #[test]
    fn test_closed_transport_rejects_send() {
        let transport = MockTransport::new();
        transport.close();
        assert_eq!(transport.send(&[1]), Err(ZenError::IoSendFailed));
    }

    #[test]
    fn test_io_system_obtain() {
        let system = MockIoSystem::new();
        let desc = system.add_device("dev2", "LPMS-IG1", SimulatedDevice::ig1("LPMS-IG1-RS232"));
        assert_eq!(system.list_devices().unwrap(), vec![desc.clone()]);

        let transport = system.obtain(&desc).unwrap();
        assert!(transport.equals(&desc));

        let mut unknown = desc.clone();
        unknown.identifier = "missing".to_string();
        assert_eq!(system.obtain(&unknown).err(), Some(SensorInitError::ConnectFailed));
    }
}
