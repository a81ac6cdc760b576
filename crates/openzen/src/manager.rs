//! SensorManager
//!
//! 进程级传感器管理器。
//!
//! - 持有所有活动传感器的强引用 (按 token 索引)
//! - 传感器的最后一个订阅者离开时释放传感器
//! - 发现线程：等待列举请求，依次列举各 IO 系统
//! - 轮询线程：每 1 ms 轮询一次需要轮询的 IO 系统 (CAN)
//!
//! 锁顺序：sensors → 传感器订阅者 → 队列内部。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{
    DisconnectReason, Event, EventPayload, IoSystem, ListingProgress, SensorDesc, SensorInitError,
    SensorToken, ZenConfig,
};
use dispatcher::EventQueue;
use ingestion::mock::MockIoSystem;
use ingestion::{Communicator, ConnectionNegotiator};
use sensor_core::Sensor;
use tracing::{debug, error, info, instrument, warn};

use crate::io::IoRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    config: ZenConfig,
    io: IoRegistry,
    sensors: Mutex<HashMap<SensorToken, Arc<Sensor>>>,
    next_token: AtomicU64,
    /// Serializes obtain so one device never gets two sensors
    obtaining: Mutex<()>,
    /// Queues waiting for the next listing
    listing: Mutex<Vec<Arc<EventQueue>>>,
    listing_cv: Condvar,
    /// Every client queue, terminated on shutdown
    clients: Mutex<Vec<Weak<EventQueue>>>,
    terminate: AtomicBool,
}

impl Inner {
    fn sensor(&self, token: SensorToken) -> Option<Arc<Sensor>> {
        lock(&self.sensors).get(&token).cloned()
    }

    fn find(&self, desc: &SensorDesc) -> Option<Arc<Sensor>> {
        lock(&self.sensors)
            .values()
            .find(|sensor| sensor.equals(desc))
            .cloned()
    }

    fn insert(&self, sensor: Arc<Sensor>) {
        let live = {
            let mut sensors = lock(&self.sensors);
            sensors.insert(sensor.token(), sensor);
            sensors.len()
        };
        observability::metrics::set_live_sensors(live);
    }

    fn release(&self, token: SensorToken) {
        let removed = {
            let mut sensors = lock(&self.sensors);
            let removed = sensors.remove(&token);
            observability::metrics::set_live_sensors(sensors.len());
            removed
        };
        if let Some(sensor) = removed {
            info!(token, "sensor released");
            sensor.close(DisconnectReason::Released);
        }
    }

    fn obtain(self: &Arc<Self>, desc: &SensorDesc) -> Result<Arc<Sensor>, SensorInitError> {
        let _obtaining = lock(&self.obtaining);
        if self.terminate.load(Ordering::Acquire) {
            return Err(SensorInitError::InvalidHandle);
        }
        if let Some(sensor) = self.find(desc) {
            debug!(token = sensor.token(), "sensor already obtained");
            return Ok(sensor);
        }

        let system = self
            .io
            .get(&desc.io_type)
            .ok_or(SensorInitError::UnsupportedIoType)?;
        let transport = system.obtain(desc)?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let sensor = match Sensor::from_event_transport(token, desc.clone(), transport.clone()) {
            Some(sensor) => sensor,
            None => {
                let protocol = &self.config.protocol;
                let communicator = Communicator::new(transport, protocol.framing);
                let baud_rate = match desc.baud_rate {
                    0 => system.default_baud_rate(),
                    rate => rate,
                };
                let negotiated = ConnectionNegotiator::with_timeout(
                    communicator.clone(),
                    Duration::from_millis(protocol.negotiation_timeout_ms),
                )
                .negotiate(baud_rate)
                .inspect_err(|_| communicator.close())?;
                Sensor::create(
                    token,
                    desc.clone(),
                    negotiated.config,
                    communicator,
                    Duration::from_millis(protocol.io_timeout_ms),
                )?
            }
        };

        let weak = Arc::downgrade(self);
        sensor.set_release_handler(Arc::new(move |token| {
            if let Some(inner) = weak.upgrade() {
                inner.release(token);
            }
        }));
        self.insert(sensor.clone());
        info!(token, name = %desc.name, io_type = %desc.io_type, "sensor obtained");
        Ok(sensor)
    }

    fn discovery_loop(&self) {
        loop {
            let queues = {
                let mut listing = lock(&self.listing);
                while listing.is_empty() && !self.terminate.load(Ordering::Acquire) {
                    listing = self
                        .listing_cv
                        .wait(listing)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if self.terminate.load(Ordering::Acquire) {
                    return;
                }
                std::mem::take(&mut *listing)
            };
            self.list(&queues);
        }
    }

    fn list(&self, queues: &[Arc<EventQueue>]) {
        let emit = |payload: EventPayload| {
            let event = Event::new(0, 0, payload);
            for queue in queues {
                queue.push(event.clone());
            }
        };

        let systems = self.io.available();
        let total = systems.len();
        let mut found = 0;
        for (index, system) in systems.iter().enumerate() {
            if self.terminate.load(Ordering::Acquire) {
                return;
            }
            match system.list_devices() {
                Ok(devices) => {
                    found += devices.len();
                    for desc in devices {
                        emit(EventPayload::SensorFound(desc));
                    }
                }
                Err(error) => warn!(io_type = system.io_type(), %error, "listing failed"),
            }
            emit(EventPayload::SensorListingProgress(ListingProgress {
                progress: (index + 1) as f32 / total as f32,
                complete: index + 1 == total,
            }));
        }
        if total == 0 {
            emit(EventPayload::SensorListingProgress(ListingProgress {
                progress: 1.0,
                complete: true,
            }));
        }
        info!(systems = total, found, "sensor listing finished");
    }

    fn poll_loop(&self) {
        while !self.terminate.load(Ordering::Acquire) {
            for system in self.io.available().iter().filter(|system| system.pollable()) {
                if let Err(error) = system.poll() {
                    debug!(io_type = system.io_type(), %error, "poll failed");
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Owns every live sensor and the background threads.
pub struct SensorManager {
    inner: Arc<Inner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

static GLOBAL: Mutex<Weak<SensorManager>> = Mutex::new(Weak::new());

impl SensorManager {
    pub fn new(config: ZenConfig) -> Arc<Self> {
        let inner = Arc::new(Inner {
            config,
            io: IoRegistry::new(),
            sensors: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            obtaining: Mutex::new(()),
            listing: Mutex::new(Vec::new()),
            listing_cv: Condvar::new(),
            clients: Mutex::new(Vec::new()),
            terminate: AtomicBool::new(false),
        });

        let mut threads = Vec::new();
        let workers: [(&str, fn(&Inner)); 2] = [
            ("openzen-discovery", Inner::discovery_loop),
            ("openzen-poll", Inner::poll_loop),
        ];
        for (name, work) in workers {
            let shared = inner.clone();
            match thread::Builder::new()
                .name(name.to_string())
                .spawn(move || work(&shared))
            {
                Ok(handle) => threads.push(handle),
                Err(error) => error!(thread = name, %error, "failed to spawn manager thread"),
            }
        }

        info!("sensor manager started");
        Arc::new(Self {
            inner,
            threads: Mutex::new(threads),
        })
    }

    /// Process-wide manager, created on first use with the default
    /// configuration and torn down when the last holder drops it.
    pub fn global() -> Arc<Self> {
        Self::global_with(ZenConfig::default())
    }

    /// Like [`SensorManager::global`]; `config` only applies if no manager
    /// is alive.
    pub fn global_with(config: ZenConfig) -> Arc<Self> {
        let mut slot = lock(&GLOBAL);
        if let Some(manager) = slot.upgrade() {
            return manager;
        }
        let manager = Self::new(config);
        *slot = Arc::downgrade(&manager);
        manager
    }

    pub fn config(&self) -> &ZenConfig {
        &self.inner.config
    }

    pub fn register_io_system(&self, system: Arc<dyn IoSystem>) {
        self.inner.io.register(system);
    }

    /// The simulated device system, always registered.
    pub fn mock_io(&self) -> &Arc<MockIoSystem> {
        self.inner.io.mock()
    }

    /// Sensor for `desc`, connecting to the device if no sensor exists yet.
    pub fn obtain(&self, desc: &SensorDesc) -> Result<Arc<Sensor>, SensorInitError> {
        self.inner.obtain(desc)
    }

    pub fn sensor(&self, token: SensorToken) -> Option<Arc<Sensor>> {
        self.inner.sensor(token)
    }

    pub fn sensor_count(&self) -> usize {
        lock(&self.inner.sensors).len()
    }

    /// Drop the sensor and close it.
    pub fn release(&self, token: SensorToken) {
        self.inner.release(token);
    }

    /// Queue a listing; results arrive on `queue` as events.
    pub fn list_sensors_async(&self, queue: Arc<EventQueue>) {
        let mut listing = lock(&self.inner.listing);
        if !listing.iter().any(|pending| Arc::ptr_eq(pending, &queue)) {
            listing.push(queue);
        }
        self.inner.listing_cv.notify_one();
    }

    /// Track a client queue so shutdown can release its waiters.
    pub fn register_client(&self, queue: &Arc<EventQueue>) {
        let mut clients = lock(&self.inner.clients);
        clients.retain(|client| client.strong_count() > 0);
        clients.push(Arc::downgrade(queue));
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.terminate.load(Ordering::Acquire)
    }

    /// Stop the threads, close every sensor and wake every waiting client.
    /// Idempotent.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        if self.inner.terminate.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let _listing = lock(&self.inner.listing);
            self.inner.listing_cv.notify_all();
        }
        for handle in lock(&self.threads).drain(..) {
            if handle.join().is_err() {
                warn!("manager thread panicked");
            }
        }

        let sensors: Vec<Arc<Sensor>> = lock(&self.inner.sensors).drain().map(|(_, sensor)| sensor).collect();
        for sensor in &sensors {
            sensor.close(DisconnectReason::Shutdown);
        }
        observability::metrics::set_live_sensors(0);

        for queue in lock(&self.inner.clients).drain(..).filter_map(|client| client.upgrade()) {
            queue.terminate();
        }
        info!(sensors = sensors.len(), "sensor manager shut down");
    }
}

impl Drop for SensorManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
