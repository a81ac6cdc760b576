//! Client - public entry point
//!
//! A client owns one event queue and the handles of the sensors it obtained.
//! Handles are plain integers; the manager keeps the sensors alive, the client
//! only holds weak references and reports `InvalidSensorHandle` once a sensor
//! is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use contracts::{
    AsyncStatus, Event, PropertyTag, PropertyType, PropertyValue, SensorDesc, SensorInitError,
    ZenError, ZenResult,
};
use dispatcher::EventQueue;
use sensor_core::{PropertyChangeCallback, Properties, Sensor};
use tracing::{debug, info, warn};

use crate::manager::SensorManager;

/// Handle of an obtained sensor (its manager token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorHandle(pub u64);

/// Handle of a component: its event index on the owning sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentHandle(pub u64);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Client {
    manager: Arc<SensorManager>,
    queue: Arc<EventQueue>,
    sensors: Mutex<HashMap<u64, Weak<Sensor>>>,
}

/// Client bound to the process-wide manager.
pub fn make_client() -> Client {
    Client::new(SensorManager::global())
}

impl Client {
    pub fn new(manager: Arc<SensorManager>) -> Self {
        let queue = Arc::new(EventQueue::from_config(&manager.config().events));
        manager.register_client(&queue);
        Self {
            manager,
            queue,
            sensors: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &Arc<SensorManager> {
        &self.manager
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Start a listing; `SensorFound` and `SensorListingProgress` events
    /// arrive on this client's queue.
    pub fn list_sensors_async(&self) -> ZenResult<()> {
        self.check_open()?;
        self.manager.list_sensors_async(self.queue.clone());
        Ok(())
    }

    pub fn obtain_sensor(&self, desc: &SensorDesc) -> Result<SensorHandle, SensorInitError> {
        if self.check_open().is_err() {
            return Err(SensorInitError::InvalidHandle);
        }
        let sensor = self.manager.obtain(desc)?;
        sensor.subscribe(self.queue.clone());
        let token = sensor.token();
        lock(&self.sensors).insert(token, Arc::downgrade(&sensor));
        info!(token, identifier = %desc.identifier, "client obtained sensor");
        Ok(SensorHandle(token))
    }

    pub fn obtain_sensor_by_name(
        &self,
        io_type: &str,
        identifier: &str,
        baud_rate: u32,
    ) -> Result<SensorHandle, SensorInitError> {
        let desc = SensorDesc::new("", "", io_type, identifier, baud_rate);
        self.obtain_sensor(&desc)
    }

    /// Stop receiving events of `handle`. The sensor is released once no
    /// client listens to it anymore.
    pub fn release_sensor(&self, handle: SensorHandle) -> ZenResult<()> {
        let weak = lock(&self.sensors)
            .remove(&handle.0)
            .ok_or(ZenError::InvalidSensorHandle)?;
        if let Some(sensor) = weak.upgrade() {
            sensor.unsubscribe(&self.queue);
        }
        debug!(token = handle.0, "client released sensor");
        Ok(())
    }

    fn check_open(&self) -> ZenResult<()> {
        if self.queue.is_terminated() {
            return Err(ZenError::InvalidClientHandle);
        }
        Ok(())
    }

    fn sensor(&self, handle: SensorHandle) -> ZenResult<Arc<Sensor>> {
        self.check_open()?;
        lock(&self.sensors)
            .get(&handle.0)
            .and_then(Weak::upgrade)
            .filter(|sensor| !sensor.is_closed())
            .ok_or(ZenError::InvalidSensorHandle)
    }

    /// Description of the sensor behind `handle`.
    pub fn sensor_desc(&self, handle: SensorHandle) -> ZenResult<SensorDesc> {
        Ok(self.sensor(handle)?.desc().clone())
    }

    /// Component handles, optionally only those of one kind (`"imu"`, `"gnss"`).
    pub fn components(&self, handle: SensorHandle, kind: Option<&str>) -> ZenResult<Vec<ComponentHandle>> {
        Ok(self
            .sensor(handle)?
            .components(kind)
            .into_iter()
            .map(|(index, _)| ComponentHandle(index))
            .collect())
    }

    /// Sensor properties, or those of `component`.
    pub fn properties(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
    ) -> ZenResult<Arc<dyn Properties>> {
        let sensor = self.sensor(handle)?;
        match component {
            None => Ok(sensor.properties()),
            Some(ComponentHandle(index)) => sensor
                .component(index)
                .map(|component| component.properties())
                .ok_or(ZenError::InvalidComponentHandle),
        }
    }

    pub fn get_bool(&self, handle: SensorHandle, component: Option<ComponentHandle>, tag: PropertyTag) -> ZenResult<bool> {
        self.properties(handle, component)?.get_bool(tag)
    }

    pub fn set_bool(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        tag: PropertyTag,
        value: bool,
    ) -> ZenResult<()> {
        self.properties(handle, component)?.set_bool(tag, value)
    }

    pub fn get_int32(&self, handle: SensorHandle, component: Option<ComponentHandle>, tag: PropertyTag) -> ZenResult<i32> {
        self.properties(handle, component)?.get_int32(tag)
    }

    pub fn set_int32(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        tag: PropertyTag,
        value: i32,
    ) -> ZenResult<()> {
        self.properties(handle, component)?.set_int32(tag, value)
    }

    pub fn get_float(&self, handle: SensorHandle, component: Option<ComponentHandle>, tag: PropertyTag) -> ZenResult<f32> {
        self.properties(handle, component)?.get_float(tag)
    }

    pub fn set_float(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        tag: PropertyTag,
        value: f32,
    ) -> ZenResult<()> {
        self.properties(handle, component)?.set_float(tag, value)
    }

    pub fn get_uint64(&self, handle: SensorHandle, component: Option<ComponentHandle>, tag: PropertyTag) -> ZenResult<u64> {
        self.properties(handle, component)?.get_uint64(tag)
    }

    pub fn set_uint64(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        tag: PropertyTag,
        value: u64,
    ) -> ZenResult<()> {
        self.properties(handle, component)?.set_uint64(tag, value)
    }

    pub fn get_array(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        tag: PropertyTag,
        ty: PropertyType,
    ) -> ZenResult<PropertyValue> {
        self.properties(handle, component)?.get_array(tag, ty)
    }

    pub fn set_array(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        tag: PropertyTag,
        value: &PropertyValue,
    ) -> ZenResult<()> {
        self.properties(handle, component)?.set_array(tag, value)
    }

    pub fn execute(&self, handle: SensorHandle, component: Option<ComponentHandle>, tag: PropertyTag) -> ZenResult<()> {
        self.properties(handle, component)?.execute(tag)
    }

    pub fn subscribe_to_property_changes(
        &self,
        handle: SensorHandle,
        component: Option<ComponentHandle>,
        callback: PropertyChangeCallback,
    ) -> ZenResult<()> {
        self.properties(handle, component)?
            .subscribe_to_property_changes(callback);
        Ok(())
    }

    pub fn poll_next_event(&self) -> Option<Event> {
        self.queue.try_pop()
    }

    /// Block until an event arrives. `None` once the client is closed and
    /// the queue drained.
    pub fn wait_for_next_event(&self) -> Option<Event> {
        self.queue.wait_pop()
    }

    /// Async counterpart of [`Client::wait_for_next_event`].
    pub async fn next_event(&self) -> Option<Event> {
        self.queue.next().await
    }

    pub fn update_firmware(&self, handle: SensorHandle, image: &[u8]) -> ZenResult<AsyncStatus> {
        Ok(self.sensor(handle)?.update_firmware(image))
    }

    pub fn update_iap(&self, handle: SensorHandle, image: &[u8]) -> ZenResult<AsyncStatus> {
        Ok(self.sensor(handle)?.update_iap(image))
    }

    /// Mirror the samples of `handle` to a UDP endpoint (`host:port`).
    pub fn publish_events(&self, handle: SensorHandle, endpoint: &str) -> ZenResult<()> {
        let sensor = self.sensor(handle)?;
        let capacity = self.manager.config().events.queue_capacity;
        sensor.publish_events(endpoint, capacity).map_err(|error| {
            warn!(token = handle.0, endpoint, %error, "event relay not started");
            ZenError::IoInitFailed
        })
    }

    pub fn forward_rtk_correction(&self, handle: SensorHandle, data: &[u8]) -> ZenResult<()> {
        self.sensor(handle)?.forward_rtk_correction(data)
    }

    /// Release every sensor and wake any thread waiting for events.
    /// Idempotent.
    pub fn close(&self) {
        let sensors: Vec<Weak<Sensor>> = lock(&self.sensors).drain().map(|(_, sensor)| sensor).collect();
        for sensor in sensors.iter().filter_map(Weak::upgrade) {
            sensor.unsubscribe(&self.queue);
        }
        self.queue.terminate();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{EventPayload, ImuProperty, SensorProperty, ZenConfig};
    use ingestion::mock::SimulatedDevice;
    use std::time::Duration;

    fn rig(model: &str) -> (Client, SensorHandle, Arc<SimulatedDevice>) {
        let client = Client::new(SensorManager::new(ZenConfig::default()));
        let device = SimulatedDevice::ig1(model);
        let desc = client.manager().mock_io().add_device("sim", model, device.clone());
        let handle = client.obtain_sensor(&desc).unwrap();
        (client, handle, device)
    }

    #[test]
    fn test_components_and_properties() {
        let (client, handle, _device) = rig("LPMS-IG1P-RS232");
        let all = client.components(handle, None).unwrap();
        assert_eq!(all, vec![ComponentHandle(1), ComponentHandle(2)]);
        assert_eq!(client.components(handle, Some("gnss")).unwrap(), vec![ComponentHandle(2)]);

        let imu = Some(ComponentHandle(1));
        client.set_bool(handle, imu, ImuProperty::OutputQuat.tag(), true).unwrap();
        assert!(client.get_bool(handle, imu, ImuProperty::OutputQuat.tag()).unwrap());

        let serial = client
            .get_array(handle, None, SensorProperty::SerialNumber.tag(), PropertyType::Byte)
            .unwrap();
        assert!(serial.as_bytes().is_some());

        assert_eq!(
            client.get_bool(handle, Some(ComponentHandle(9)), ImuProperty::OutputQuat.tag()).unwrap_err(),
            ZenError::InvalidComponentHandle
        );
    }

    #[test]
    fn test_release_invalidates_handle() {
        let (client, handle, _device) = rig("LPMS-IG1-RS232");
        client.release_sensor(handle).unwrap();
        assert_eq!(client.components(handle, None).unwrap_err(), ZenError::InvalidSensorHandle);
        assert_eq!(client.release_sensor(handle).unwrap_err(), ZenError::InvalidSensorHandle);
        assert_eq!(client.manager().sensor_count(), 0);
    }

    #[test]
    fn test_two_clients_share_a_sensor() {
        let manager = SensorManager::new(ZenConfig::default());
        let desc = manager
            .mock_io()
            .add_device("sim", "LPMS-IG1-RS232", SimulatedDevice::ig1("LPMS-IG1-RS232"));
        let first = Client::new(manager.clone());
        let second = Client::new(manager.clone());
        let a = first.obtain_sensor(&desc).unwrap();
        let b = second.obtain_sensor(&desc).unwrap();
        assert_eq!(a, b);

        first.close();
        assert_eq!(manager.sensor_count(), 1);
        second.release_sensor(b).unwrap();
        assert_eq!(manager.sensor_count(), 0);
    }

    #[test]
    fn test_closed_client() {
        let (client, handle, _device) = rig("LPMS-IG1-RS232");
        client.close();
        assert_eq!(client.components(handle, None).unwrap_err(), ZenError::InvalidClientHandle);
        assert_eq!(client.list_sensors_async().unwrap_err(), ZenError::InvalidClientHandle);
        assert!(client.wait_for_next_event().is_none_or(|event| event.is_terminal()));
    }

    #[test]
    fn test_publish_events_rejects_bad_endpoint() {
        let (client, handle, _device) = rig("LPMS-IG1-RS232");
        assert_eq!(
            client.publish_events(handle, "not an endpoint").unwrap_err(),
            ZenError::IoInitFailed
        );
    }

    #[tokio::test]
    async fn test_next_event_delivers_listing() {
        let (client, _handle, _device) = rig("LPMS-IG1-RS232");
        client.list_sensors_async().unwrap();

        let mut found = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), client.next_event())
                .await
                .expect("listing did not finish")
                .expect("queue closed");
            assert_eq!(event.sensor, 0);
            match event.payload {
                EventPayload::SensorFound(desc) => found.push(desc.identifier),
                EventPayload::SensorListingProgress(progress) if progress.complete => break,
                _ => {}
            }
        }
        assert_eq!(found, vec!["sim"]);
    }
}
