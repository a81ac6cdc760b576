//! `stream` command implementation.
//!
//! Obtains one sensor, optionally tunes its IMU, and prints the samples it
//! emits until enough arrived. Simulated sensors do not stream on their own,
//! so they are polled.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ingestion::mock::SimulatedDevice;
use ingestion::opcodes::OpcodeV1;
use openzen::{Client, ComponentHandle, Event, EventPayload, ImuProperty, SensorDesc, SensorHandle, SensorManager};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cli::{ComponentArg, SimModel, StreamArgs};
use crate::error::CliError;

/// Raw acc, quaternion and euler angles.
const SIM_IMU_BITSET: u32 = (1 << 0) | (1 << 11) | (1 << 12);
const SIM_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// 500 Hz device ticks per 10 ms poll
const SIM_TICKS_PER_POLL: u32 = 5;

#[derive(Debug, Clone, Copy)]
struct DumpOptions {
    filter: ComponentArg,
    count: usize,
    /// Longest gap between two printed samples
    idle_limit: Duration,
    json: bool,
}

impl From<&StreamArgs> for DumpOptions {
    fn from(args: &StreamArgs) -> Self {
        Self {
            filter: args.component,
            count: args.count,
            idle_limit: Duration::from_secs(args.timeout),
            json: args.json,
        }
    }
}

/// Execute the `stream` command
pub async fn run_stream(args: &StreamArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let manager = SensorManager::new(config);
    let client = Arc::new(Client::new(manager.clone()));

    let (desc, device) = match args.simulate {
        Some(model) => {
            let (desc, device) = simulate(&manager, model);
            (desc, Some(device))
        }
        None => {
            let identifier = args.sensor.as_deref().ok_or(CliError::MissingSensor)?;
            let desc = SensorDesc::new("", "", &args.io_type, identifier, args.baud_rate);
            (desc, None)
        }
    };

    let handle = obtain(&client, &desc).await?;
    let imus = client.components(handle, Some("imu"))?;
    info!(identifier = %desc.identifier, imus = imus.len(), "Sensor ready");

    if let Some(rate) = args.sampling_rate {
        let targets = imus.clone();
        blocking(&client, move |client| {
            targets
                .iter()
                .try_for_each(|imu| client.set_int32(handle, Some(*imu), ImuProperty::SamplingRate.tag(), rate))
        })
        .await?
        .context("Failed to set sampling rate")?;
    }

    let interval = args
        .poll_ms
        .map(Duration::from_millis)
        .or(device.as_ref().map(|_| SIM_POLL_INTERVAL));
    let poller = match (interval, imus.first()) {
        (Some(every), Some(imu)) => Some(spawn_poller(client.clone(), handle, *imu, device, every)),
        _ => None,
    };

    let mut stdout = std::io::stdout();
    let result = dump_samples(&client, handle, DumpOptions::from(args), &mut stdout).await;

    if let Some(poller) = poller {
        poller.abort();
    }
    if let Ok(Err(error)) = blocking(&client, move |client| client.release_sensor(handle)).await {
        warn!(%error, "Release failed");
    }
    client.close();
    manager.shutdown();

    let printed = result?;
    info!(printed, "Stream finished");
    Ok(())
}

/// Run a blocking client call off the async workers.
async fn blocking<T: Send + 'static>(
    client: &Arc<Client>,
    call: impl FnOnce(&Client) -> T + Send + 'static,
) -> Result<T> {
    let client = client.clone();
    tokio::task::spawn_blocking(move || call(&client))
        .await
        .context("Sensor task panicked")
}

async fn obtain(client: &Arc<Client>, desc: &SensorDesc) -> Result<SensorHandle> {
    let target = desc.clone();
    let handle = blocking(client, move |client| client.obtain_sensor(&target))
        .await?
        .map_err(|error| CliError::obtain_failed(&desc.identifier, error))?;
    Ok(handle)
}

/// Register a simulated Ig1 sensor that reports orientation.
fn simulate(manager: &SensorManager, model: SimModel) -> (SensorDesc, Arc<SimulatedDevice>) {
    let device = SimulatedDevice::ig1(model.model_name());
    device.update(|state| state.imu_bitset = SIM_IMU_BITSET);
    let desc = manager
        .mock_io()
        .add_device("sim-stream", model.model_name(), device.clone());
    debug!(model = model.model_name(), "Simulated sensor registered");
    (desc, device)
}

/// One sample in the `SIM_IMU_BITSET` layout: level, turning about z.
fn simulated_sample(poll: u32) -> Vec<u8> {
    let angle = poll as f32 * 0.01;
    let (half_sin, half_cos) = (angle / 2.0).sin_cos();
    let fields = [0.0, 0.0, 1.0, half_cos, 0.0, 0.0, half_sin, 0.0, 0.0, angle.to_degrees()];

    let mut payload = poll.wrapping_mul(SIM_TICKS_PER_POLL).to_le_bytes().to_vec();
    for field in fields {
        payload.extend(field.to_le_bytes());
    }
    payload
}

fn spawn_poller(
    client: Arc<Client>,
    handle: SensorHandle,
    imu: ComponentHandle,
    device: Option<Arc<SimulatedDevice>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = 0u32;
        loop {
            ticker.tick().await;
            if let Some(device) = &device {
                device.set_register(OpcodeV1::GetRawImuSensorData.code(), simulated_sample(poll));
            }
            poll = poll.wrapping_add(1);

            let polled = blocking(&client, move |client| {
                client.execute(handle, Some(imu), ImuProperty::PollSensorData.tag())
            })
            .await;
            match polled {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(%error, "Poll request failed");
                    return;
                }
                Err(error) => {
                    warn!(%error, "Poll task failed");
                    return;
                }
            }
        }
    })
}

/// Print samples of `handle` until `options.count` were written.
async fn dump_samples(
    client: &Client,
    handle: SensorHandle,
    options: DumpOptions,
    out: &mut impl Write,
) -> Result<usize> {
    let wanted: Vec<u64> = client
        .components(handle, options.filter.kind())?
        .into_iter()
        .map(|component| component.0)
        .collect();
    if wanted.is_empty() {
        return Err(CliError::NoComponent {
            kind: format!("{:?}", options.filter).to_lowercase(),
        }
        .into());
    }

    let mut printed = 0;
    while printed < options.count {
        let event = timeout(options.idle_limit, client.next_event())
            .await
            .map_err(|_| CliError::SampleTimeout {
                printed,
                seconds: options.idle_limit.as_secs(),
            })?
            .ok_or(CliError::QueueClosed)?;
        if event.sensor != handle.0 {
            continue;
        }
        match &event.payload {
            EventPayload::Imu(_) | EventPayload::Gnss(_) if wanted.contains(&event.component) => {
                write_sample(out, &event, options.json)?;
                printed += 1;
            }
            EventPayload::SensorDisconnected(reason) => {
                return Err(CliError::SensorLost {
                    reason: format!("{reason:?}"),
                }
                .into());
            }
            _ => {}
        }
    }
    Ok(printed)
}

fn write_sample(out: &mut impl Write, event: &Event, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, event).context("Failed to serialize sample")?;
        writeln!(out)?;
        return Ok(());
    }
    match &event.payload {
        EventPayload::Imu(s) => writeln!(
            out,
            "imu#{:<2} t={:>9.3}s acc=[{:>7.3} {:>7.3} {:>7.3}] q=[{:>7.4} {:>7.4} {:>7.4} {:>7.4}] euler=[{:>8.2} {:>8.2} {:>8.2}]",
            event.component,
            s.timestamp,
            s.a_raw[0],
            s.a_raw[1],
            s.a_raw[2],
            s.q[0],
            s.q[1],
            s.q[2],
            s.q[3],
            s.r[0],
            s.r[1],
            s.r[2],
        )?,
        EventPayload::Gnss(s) => writeln!(
            out,
            "gnss#{:<2} t={:>9.3}s lat={:.7} lon={:.7} h={:.2}m fix={:?}",
            event.component, s.timestamp, s.latitude, s.longitude, s.height, s.fix_type,
        )?,
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(filter: ComponentArg, count: usize, json: bool) -> DumpOptions {
        DumpOptions {
            filter,
            count,
            idle_limit: Duration::from_secs(5),
            json,
        }
    }

    struct Simulated {
        manager: Arc<SensorManager>,
        client: Arc<Client>,
        handle: SensorHandle,
        poller: JoinHandle<()>,
    }

    async fn simulated(model: SimModel) -> Simulated {
        let manager = SensorManager::new(Default::default());
        let client = Arc::new(Client::new(manager.clone()));
        let (desc, device) = simulate(&manager, model);
        let handle = obtain(&client, &desc).await.unwrap();
        let imu = client.components(handle, Some("imu")).unwrap()[0];
        let poller = spawn_poller(client.clone(), handle, imu, Some(device), SIM_POLL_INTERVAL);
        Simulated {
            manager,
            client,
            handle,
            poller,
        }
    }

    impl Simulated {
        fn stop(self) {
            self.poller.abort();
            self.client.close();
            self.manager.shutdown();
        }
    }

    #[test]
    fn test_simulated_sample_layout() {
        let payload = simulated_sample(2);
        assert_eq!(payload.len(), 4 + 10 * 4);
        assert_eq!(&payload[..4], &10u32.to_le_bytes());
        // z of the unit gravity vector
        assert_eq!(&payload[12..16], &1.0f32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_dump_text_lines() {
        let sim = simulated(SimModel::Ig1).await;
        let mut out = Vec::new();
        let printed = dump_samples(&sim.client, sim.handle, options(ComponentArg::All, 3, false), &mut out)
            .await
            .unwrap();
        assert_eq!(printed, 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.starts_with("imu#1")), "{text}");
        assert!(lines[0].contains("acc=[  0.000   0.000   1.000]"), "{text}");
        sim.stop();
    }

    #[tokio::test]
    async fn test_dump_json_lines() {
        let sim = simulated(SimModel::Ig1p).await;
        let mut out = Vec::new();
        dump_samples(&sim.client, sim.handle, options(ComponentArg::Imu, 2, true), &mut out)
            .await
            .unwrap();

        for line in String::from_utf8(out).unwrap().lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["sensor"], sim.handle.0);
            let sample = &value["payload"]["Imu"];
            let w = sample["q"][0].as_f64().unwrap();
            assert!(w > 0.99 && w <= 1.0, "{line}");
            assert_eq!(sample["a_raw"][2], 1.0);
        }
        sim.stop();
    }

    #[tokio::test]
    async fn test_silent_component_times_out() {
        let sim = simulated(SimModel::Ig1p).await;
        let mut quiet = options(ComponentArg::Gnss, 1, false);
        quiet.idle_limit = Duration::from_millis(200);

        let error = dump_samples(&sim.client, sim.handle, quiet, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(
            matches!(error.downcast_ref::<CliError>(), Some(CliError::SampleTimeout { printed: 0, .. })),
            "{error:#}"
        );
        sim.stop();
    }

    #[tokio::test]
    async fn test_missing_component_kind() {
        let sim = simulated(SimModel::Ig1).await;
        let error = dump_samples(&sim.client, sim.handle, options(ComponentArg::Gnss, 1, false), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(error.downcast_ref::<CliError>(), Some(CliError::NoComponent { .. })));
        sim.stop();
    }

    #[tokio::test]
    async fn test_unknown_sensor_is_reported() {
        let args = StreamArgs {
            config: None,
            sensor: Some("not-there".to_string()),
            io_type: ingestion::mock::MOCK_IO_TYPE.to_string(),
            baud_rate: 921_600,
            simulate: None,
            count: 1,
            component: ComponentArg::All,
            sampling_rate: None,
            poll_ms: None,
            timeout: 1,
            json: false,
        };
        let error = run_stream(&args).await.unwrap_err();
        assert!(matches!(error.downcast_ref::<CliError>(), Some(CliError::ObtainFailed { .. })));
    }

    #[tokio::test]
    async fn test_stream_simulated_end_to_end() {
        let args = StreamArgs {
            config: None,
            sensor: None,
            io_type: ingestion::mock::MOCK_IO_TYPE.to_string(),
            baud_rate: 921_600,
            simulate: Some(SimModel::Ig1),
            count: 2,
            component: ComponentArg::Imu,
            sampling_rate: Some(200),
            poll_ms: None,
            timeout: 5,
            json: true,
        };
        assert!(run_stream(&args).await.is_ok());
    }
}
