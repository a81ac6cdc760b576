//! Sensor
//!
//! A sensor owns the link to one device, the properties of the device and
//! its components, and the set of subscriber queues. Inbound frames are
//! dispatched on the transport's ingestion thread:
//!
//! - acks, nacks and replies of sensor-wide requests go to the coordinator
//! - sample frames become events, multicast to every subscriber
//! - everything else is offered to the components
//!
//! Teardown order matters: the upload worker stops first, then components
//! flush their state to the device, then the link closes, and only then do
//! subscribers see the final `SensorDisconnected` event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use contracts::{
    AsyncStatus, DisconnectReason, Event, EventPayload, Frame, SensorConfig, SensorDesc,
    SensorInitError, SensorToken, Transport, ZenError, ZenResult, COMPONENT_GNSS,
};
use dispatcher::{DispatcherError, EventQueue, EventRelay, SubscriberSet};
use ingestion::opcodes::{OpcodeV0, OpcodeV1};
use ingestion::{Communicator, FrameSubscriber, SyncedCommunicator};
use tracing::{debug, info, instrument, warn};

use crate::component::SensorComponent;
use crate::factory::make_component;
use crate::parsing::{read_value, read_vec};
use crate::properties::{
    DeviceChannel, Ig1CoreProperties, LegacyCoreProperties, NoProperties, Properties, StreamControl,
};
use crate::upload::{UploadKind, Uploader};

/// Called with the sensor's token once its last subscriber is gone.
pub type ReleaseCallback = Arc<dyn Fn(SensorToken) + Send + Sync>;

/// How events reach the sensor.
enum Link {
    Framed {
        communicator: Arc<Communicator>,
        stream: Arc<StreamControl>,
        uploader: Uploader,
    },
    /// Transport delivers parsed events; no protocol, no properties
    Events(Arc<dyn Transport>),
}

pub struct Sensor {
    token: SensorToken,
    desc: SensorDesc,
    config: SensorConfig,
    link: Link,
    properties: Arc<dyn Properties>,
    components: Vec<Arc<dyn SensorComponent>>,
    subscribers: SubscriberSet,
    relay: Mutex<Option<EventRelay>>,
    release: Mutex<Option<ReleaseCallback>>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Sensor {
    /// Build a sensor on a negotiated link and bring every component up.
    ///
    /// On failure the communicator is closed.
    pub fn create(
        token: SensorToken,
        desc: SensorDesc,
        config: SensorConfig,
        communicator: Arc<Communicator>,
        io_timeout: Duration,
    ) -> Result<Arc<Self>, SensorInitError> {
        let synced = Arc::new(SyncedCommunicator::with_timeout(communicator.clone(), io_timeout));
        let stream = StreamControl::new(synced);
        let channel = DeviceChannel::new(stream.clone());

        let built = Self::build_parts(&config, channel).map(|(properties, components)| {
            let uploader = Uploader::new(stream.clone());
            Arc::new(Self {
                token,
                desc,
                config,
                link: Link::Framed {
                    communicator: communicator.clone(),
                    stream,
                    uploader,
                },
                properties,
                components,
                subscribers: SubscriberSet::new(),
                relay: Mutex::new(None),
                release: Mutex::new(None),
                closed: AtomicBool::new(false),
            })
        });
        let sensor = match built {
            Ok(sensor) => sensor,
            Err(error) => {
                communicator.close();
                return Err(error);
            }
        };

        communicator.attach(Arc::downgrade(&sensor) as Weak<dyn FrameSubscriber>);
        let weak = Arc::downgrade(&sensor);
        communicator.transport().on_disconnect(Arc::new(move || {
            if let Some(sensor) = weak.upgrade() {
                sensor.handle_disconnect();
            }
        }));

        for component in &sensor.components {
            if let Err(error) = component.init() {
                warn!(token, component = component.kind(), %error, "component init failed");
                sensor.abandon();
                return Err(error);
            }
        }

        info!(
            token,
            name = %sensor.desc.name,
            version = sensor.config.version,
            components = sensor.components.len(),
            "sensor ready"
        );
        Ok(sensor)
    }

    #[allow(clippy::type_complexity)]
    fn build_parts(
        config: &SensorConfig,
        channel: DeviceChannel,
    ) -> Result<(Arc<dyn Properties>, Vec<Arc<dyn SensorComponent>>), SensorInitError> {
        let properties: Arc<dyn Properties> = match config.version {
            0 => Arc::new(LegacyCoreProperties::new(channel.clone())),
            1 => Arc::new(Ig1CoreProperties::new(channel.clone())),
            _ => return Err(SensorInitError::UnsupportedProtocol),
        };
        let components = config
            .components
            .iter()
            .map(|component| make_component(component, config.version, channel.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((properties, components))
    }

    /// Build a sensor on a transport that delivers parsed events.
    ///
    /// Returns `None` when the transport has no event mode.
    pub fn from_event_transport(
        token: SensorToken,
        desc: SensorDesc,
        transport: Arc<dyn Transport>,
    ) -> Option<Arc<Self>> {
        let target: Arc<OnceLock<Weak<Sensor>>> = Arc::default();
        let sink = target.clone();
        let accepted = transport.subscribe_events(Arc::new(move |event: Event| {
            if let Some(sensor) = sink.get().and_then(Weak::upgrade) {
                sensor.publish(Event::new(sensor.token, event.component, event.payload));
            }
        }));
        if !accepted {
            return None;
        }

        let sensor = Arc::new(Self {
            token,
            desc,
            config: SensorConfig {
                version: 0,
                components: Vec::new(),
            },
            link: Link::Events(transport.clone()),
            properties: Arc::new(NoProperties::default()),
            components: Vec::new(),
            subscribers: SubscriberSet::new(),
            relay: Mutex::new(None),
            release: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        // events delivered before this point have no sensor to go to
        let _ = target.set(Arc::downgrade(&sensor));

        let weak = Arc::downgrade(&sensor);
        transport.on_disconnect(Arc::new(move || {
            if let Some(sensor) = weak.upgrade() {
                sensor.handle_disconnect();
            }
        }));
        info!(token, io_type = transport.io_type(), "event sensor ready");
        Some(sensor)
    }

    pub fn token(&self) -> SensorToken {
        self.token
    }

    pub fn desc(&self) -> &SensorDesc {
        &self.desc
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn properties(&self) -> Arc<dyn Properties> {
        self.properties.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Components with their event index, optionally of one kind only.
    pub fn components(&self, kind: Option<&str>) -> Vec<(u64, Arc<dyn SensorComponent>)> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, component)| kind.is_none_or(|kind| component.kind() == kind))
            .map(|(index, component)| (index as u64 + 1, component.clone()))
            .collect()
    }

    /// Component by event index.
    pub fn component(&self, index: u64) -> Option<Arc<dyn SensorComponent>> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.components.get(position).cloned()
    }

    /// Whether `desc` addresses the device behind this sensor.
    pub fn equals(&self, desc: &SensorDesc) -> bool {
        match &self.link {
            Link::Framed { communicator, .. } => communicator.transport().equals(desc),
            Link::Events(transport) => transport.equals(desc),
        }
    }

    pub fn set_release_handler(&self, callback: ReleaseCallback) {
        *lock(&self.release) = Some(callback);
    }

    /// Add `queue` to the subscribers. Returns `false` if it already was one.
    pub fn subscribe(&self, queue: Arc<EventQueue>) -> bool {
        self.subscribers.subscribe(queue)
    }

    /// Remove `queue`; the last one out releases the sensor.
    pub fn unsubscribe(&self, queue: &Arc<EventQueue>) {
        if self.subscribers.unsubscribe(queue) {
            debug!(token = self.token, "last subscriber gone");
            let release = lock(&self.release).clone();
            if let Some(release) = release {
                release(self.token);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Mirror sample events to a UDP endpoint.
    pub fn publish_events(&self, endpoint: &str, queue_capacity: usize) -> Result<(), DispatcherError> {
        if self.is_closed() {
            return Err(DispatcherError::RelayClosed);
        }
        let relay = EventRelay::udp(endpoint, queue_capacity)?;
        if let Some(previous) = lock(&self.relay).replace(relay) {
            previous.close();
        }
        Ok(())
    }

    pub fn update_firmware(&self, image: &[u8]) -> AsyncStatus {
        self.update(UploadKind::Firmware, image)
    }

    pub fn update_iap(&self, image: &[u8]) -> AsyncStatus {
        self.update(UploadKind::Iap, image)
    }

    fn update(&self, kind: UploadKind, image: &[u8]) -> AsyncStatus {
        match &self.link {
            Link::Framed { uploader, .. } => uploader.update(kind, image),
            Link::Events(_) => AsyncStatus::InvalidArgument,
        }
    }

    /// Pass RTK correction data to the GNSS component.
    pub fn forward_rtk_correction(&self, data: &[u8]) -> ZenResult<()> {
        self.components
            .iter()
            .find(|component| component.kind() == COMPONENT_GNSS)
            .ok_or(ZenError::NotSupported)?
            .forward_rtk_correction(data)
    }

    fn publish(&self, event: Event) {
        if let Some(relay) = lock(&self.relay).as_ref() {
            relay.send(&event);
        }
        if self.subscribers.publish(&event) == 0 && !event.is_terminal() {
            observability::record_event_unclaimed();
        }
    }

    fn synced(&self) -> Option<&Arc<SyncedCommunicator>> {
        match &self.link {
            Link::Framed { stream, .. } => Some(stream.synced()),
            Link::Events(_) => None,
        }
    }

    fn emit_sample(&self, function: u8, payload: &[u8]) -> Option<ZenResult<()>> {
        let (index, component) = self
            .components
            .iter()
            .enumerate()
            .find(|(_, component)| component.sample_function() == function)?;
        Some(component.parse_sample(payload).map(|sample| {
            self.publish(Event::new(self.token, index as u64 + 1, sample));
        }))
    }

    fn forward(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        for component in &self.components {
            match component.process_data(function, payload) {
                Err(ZenError::IoUnsupportedFunction) => continue,
                result => return result,
            }
        }
        debug!(token = self.token, function, "frame not claimed");
        Err(ZenError::IoUnsupportedFunction)
    }

    fn process_v0(&self, synced: &SyncedCommunicator, function: u8, payload: &[u8]) -> ZenResult<()> {
        use OpcodeV0 as Op;

        let property = u32::from(function);
        match Op::from_code(function) {
            Some(Op::Ack) => synced.publish_ack(property, Ok(())),
            Some(Op::Nack) => synced.publish_ack(property, Err(ZenError::FwFunctionFailed)),
            Some(Op::GetConfig | Op::GetBatteryCharging | Op::GetPing) => {
                synced.publish_result(property, read_value::<u32>(payload));
            }
            Some(Op::GetBatteryLevel | Op::GetBatteryVoltage) => {
                synced.publish_result(property, read_value::<f32>(payload));
            }
            Some(Op::GetSerialNumber | Op::GetDeviceName | Op::GetFirmwareInfo) => {
                synced.publish_array(property, Ok(payload));
            }
            Some(Op::GetFirmwareVersion) => {
                // legacy firmware sends the major version last
                let version = read_vec::<u32>(payload).map(|mut version| {
                    version.reverse();
                    version
                });
                synced.publish_array(property, version.as_deref().map_err(|error| *error));
            }
            _ => {
                return self
                    .emit_sample(function, payload)
                    .unwrap_or_else(|| self.forward(function, payload));
            }
        }
        Ok(())
    }

    fn process_v1(&self, synced: &SyncedCommunicator, function: u8, payload: &[u8]) -> ZenResult<()> {
        use OpcodeV1 as Op;

        let property = u32::from(function);
        match Op::from_code(function) {
            Some(Op::Ack) => synced.publish_ack(property, Ok(())),
            Some(Op::Nack) => synced.publish_ack(property, Err(ZenError::FwFunctionFailed)),
            Some(Op::GetSensorModel | Op::GetFirmwareInfo | Op::GetSerialNumber | Op::GetFilterVersion) => {
                synced.publish_array(property, Ok(payload));
            }
            Some(Op::GetImuTransmitData | Op::GetSensorStatus) => {
                synced.publish_result(property, read_value::<u32>(payload));
            }
            Some(Op::GetGpsTransmitData) => {
                let halves = read_vec::<u32>(payload);
                synced.publish_array(property, halves.as_deref().map_err(|error| *error));
            }
            _ => {
                return self
                    .emit_sample(function, payload)
                    .unwrap_or_else(|| self.forward(function, payload));
            }
        }
        Ok(())
    }

    fn handle_disconnect(&self) {
        warn!(token = self.token, "device disconnected");
        self.shutdown(DisconnectReason::ConnectionLost);
        let release = lock(&self.release).clone();
        if let Some(release) = release {
            release(self.token);
        }
    }

    /// Tear the sensor down and tell subscribers why. Idempotent.
    pub fn close(&self, reason: DisconnectReason) {
        self.shutdown(reason);
    }

    #[instrument(skip(self), fields(token = self.token))]
    fn shutdown(&self, reason: DisconnectReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Link::Framed { uploader, .. } = &self.link {
            uploader.stop();
        }
        for component in &self.components {
            if let Err(error) = component.close() {
                warn!(component = component.kind(), %error, "component close failed");
            }
        }
        match &self.link {
            Link::Framed { communicator, .. } => communicator.close(),
            Link::Events(transport) => {
                transport.unsubscribe();
                transport.close();
            }
        }
        if let Some(relay) = lock(&self.relay).take() {
            relay.close();
        }

        self.subscribers.publish(&Event::new(
            self.token,
            0,
            EventPayload::SensorDisconnected(reason),
        ));
        info!(?reason, "sensor closed");
    }

    /// Close the link without the orderly teardown, after a failed init.
    fn abandon(&self) {
        self.closed.store(true, Ordering::Release);
        if let Link::Framed { communicator, .. } = &self.link {
            communicator.close();
        }
    }
}

impl FrameSubscriber for Sensor {
    fn on_frame(&self, frame: Frame) -> ZenResult<()> {
        let Some(synced) = self.synced() else {
            return Err(ZenError::UnsupportedEvent);
        };
        match self.config.version {
            0 => self.process_v0(synced, frame.function, &frame.payload),
            _ => self.process_v1(synced, frame.function, &frame.payload),
        }
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.shutdown(DisconnectReason::Released);
    }
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("token", &self.token)
            .field("name", &self.desc.name)
            .field("version", &self.config.version)
            .field("components", &self.components)
            .field("closed", &self.is_closed())
            .finish()
    }
}
