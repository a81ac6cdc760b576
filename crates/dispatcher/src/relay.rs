//! Event relay - forwards Imu / Gnss events to an external UDP endpoint
//!
//! 线上格式: 4 字节头 `{0, 0, 0, type}` (1 = Imu, 2 = Gnss)，随后是
//! 小端的 sensor token (u64)、component 下标 (u64) 与按声明顺序排列的采样字段。

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use contracts::{ContractError, Event, EventPayload, EventSink};
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, instrument};

use crate::error::DispatcherError;
use crate::handle::RelayHandle;

/// Record type byte for IMU samples
pub const RELAY_TYPE_IMU: u8 = 1;
/// Record type byte for GNSS samples
pub const RELAY_TYPE_GNSS: u8 = 2;

/// Serialize an event into a relay record.
///
/// Returns `Ok(None)` for events that are not relayed (discovery, disconnect).
pub fn encode_event(event: &Event) -> Result<Option<Vec<u8>>, bincode::Error> {
    let (kind, body) = match &event.payload {
        EventPayload::Imu(sample) => (
            RELAY_TYPE_IMU,
            bincode::serialize(&(event.sensor, event.component, sample))?,
        ),
        EventPayload::Gnss(sample) => (
            RELAY_TYPE_GNSS,
            bincode::serialize(&(event.sensor, event.component, sample))?,
        ),
        _ => return Ok(None),
    };

    let mut record = Vec::with_capacity(4 + body.len());
    record.extend_from_slice(&[0, 0, 0, kind]);
    record.extend_from_slice(&body);
    Ok(Some(record))
}

/// Sink that sends relay records over UDP (best effort)
pub struct UdpRelaySink {
    name: String,
    target: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpRelaySink {
    /// Bind an ephemeral local port and connect it to `target`
    #[instrument(name = "udp_relay_sink_new", skip(name))]
    pub async fn connect(name: impl Into<String>, target: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(unspecified_for(target)).await?;
        socket.connect(target).await?;
        Ok(Self::from_socket(name, target, socket))
    }

    /// Same as [`Self::connect`] but without awaiting; needs an entered runtime.
    pub fn connect_blocking(name: impl Into<String>, target: SocketAddr) -> std::io::Result<Self> {
        let socket = std::net::UdpSocket::bind(unspecified_for(target))?;
        socket.connect(target)?;
        socket.set_nonblocking(true)?;
        Ok(Self::from_socket(name, target, UdpSocket::from_std(socket)?))
    }

    fn from_socket(name: impl Into<String>, target: SocketAddr, socket: UdpSocket) -> Self {
        let name = name.into();
        debug!(relay = %name, target = %target, "UdpRelaySink connected");
        Self {
            name,
            target,
            socket: Some(socket),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    }
}

impl EventSink for UdpRelaySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, event: &Event) -> Result<(), ContractError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not connected"))?;

        let record = match encode_event(event) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(()),
            Err(e) => return Err(ContractError::sink_write(&self.name, e.to_string())),
        };

        match socket.send(&record).await {
            Ok(sent) => debug!(relay = %self.name, sensor = event.sensor, bytes = sent, "Sent"),
            // UDP is best-effort
            Err(e) => error!(relay = %self.name, error = %e, "UDP send failed"),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(relay = %self.name, "UdpRelaySink closed");
        Ok(())
    }
}

struct Running {
    runtime: Runtime,
    handle: RelayHandle,
}

/// Relay owned by a sensor.
///
/// Sensors run on plain threads, so the relay brings its own single-worker
/// runtime and is driven entirely through blocking-safe calls.
pub struct EventRelay {
    endpoint: SocketAddr,
    running: Mutex<Option<Running>>,
}

impl EventRelay {
    /// Start relaying to `endpoint` (`host:port`)
    pub fn udp(endpoint: &str, queue_capacity: usize) -> Result<Self, DispatcherError> {
        let target: SocketAddr = endpoint
            .parse()
            .map_err(|e| DispatcherError::relay_creation(endpoint, format!("{e}")))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("openzen-relay")
            .enable_all()
            .build()?;

        let handle = {
            let _guard = runtime.enter();
            let sink = UdpRelaySink::connect_blocking(format!("udp:{target}"), target)
                .map_err(|e| DispatcherError::relay_creation(endpoint, e.to_string()))?;
            RelayHandle::spawn(sink, queue_capacity)
        };

        info!(endpoint = %target, "event relay started");
        Ok(Self {
            endpoint: target,
            running: Mutex::new(Some(Running { runtime, handle })),
        })
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Queue `event` for relaying. Non-sample events are ignored.
    pub fn send(&self, event: &Event) -> bool {
        if !matches!(event.payload, EventPayload::Imu(_) | EventPayload::Gnss(_)) {
            return false;
        }
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running
            .as_ref()
            .is_some_and(|running| running.handle.try_send(event.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Flush queued events and stop the worker. Idempotent.
    pub fn close(&self) {
        let Some(Running { runtime, handle }) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        // The runtime may not be blocked on or dropped from an async context.
        let joined = std::thread::Builder::new()
            .name("openzen-relay-close".to_string())
            .spawn(move || {
                runtime.block_on(handle.shutdown());
                drop(runtime);
            })
            .map(|thread| thread.join());

        match joined {
            Ok(Ok(())) => info!(endpoint = %self.endpoint, "event relay closed"),
            Ok(Err(_)) => error!(endpoint = %self.endpoint, "relay shutdown panicked"),
            Err(e) => error!(endpoint = %self.endpoint, error = %e, "relay shutdown thread failed"),
        }
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        self.close();
    }
}
