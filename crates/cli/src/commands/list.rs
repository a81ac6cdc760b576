//! `list` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::SensorDesc;
use ingestion::mock::SimulatedDevice;
use openzen::{Client, EventPayload, SensorManager};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::cli::ListArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct ListedSensor {
    name: String,
    serial_number: String,
    io_type: String,
    identifier: String,
    baud_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<SensorDesc> for ListedSensor {
    fn from(desc: SensorDesc) -> Self {
        Self {
            name: desc.name,
            serial_number: desc.serial_number,
            io_type: desc.io_type,
            identifier: desc.identifier,
            baud_rate: desc.baud_rate,
            components: None,
            error: None,
        }
    }
}

/// Execute the `list` command
pub async fn run_list(args: &ListArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let manager = SensorManager::new(config);
    if args.simulate {
        manager
            .mock_io()
            .add_device("sim-ig1p", "LPMS-IG1P-RS232", SimulatedDevice::ig1("LPMS-IG1P-RS232"));
        manager.mock_io().add_device("sim-cu2", "LPMS-CU2", SimulatedDevice::legacy());
    }
    let client = Arc::new(Client::new(manager.clone()));

    let found = collect_listing(&client, Duration::from_secs(args.timeout)).await?;
    info!(count = found.len(), "Listing finished");

    let mut sensors: Vec<ListedSensor> = Vec::with_capacity(found.len());
    for desc in found {
        let mut listed = ListedSensor::from(desc.clone());
        if args.inspect {
            let client = client.clone();
            match tokio::task::spawn_blocking(move || inspect(&client, &desc))
                .await
                .context("Inspect task panicked")?
            {
                Ok(components) => listed.components = Some(components),
                Err(error) => {
                    warn!(identifier = %listed.identifier, %error, "Inspect failed");
                    listed.error = Some(error.to_string());
                }
            }
        }
        sensors.push(listed);
    }

    if args.json {
        let json = serde_json::to_string_pretty(&sensors).context("Failed to serialize sensors")?;
        println!("{}", json);
    } else {
        print_sensors(&sensors);
    }

    client.close();
    manager.shutdown();
    Ok(())
}

async fn collect_listing(client: &Client, limit: Duration) -> Result<Vec<SensorDesc>> {
    let deadline = Instant::now() + limit;
    client.list_sensors_async()?;

    let mut found = Vec::new();
    loop {
        let event = timeout_at(deadline, client.next_event())
            .await
            .map_err(|_| CliError::ListingTimeout {
                seconds: limit.as_secs(),
            })?
            .ok_or(CliError::QueueClosed)?;

        match event.payload {
            EventPayload::SensorFound(desc) => {
                debug!(identifier = %desc.identifier, io_type = %desc.io_type, "Sensor found");
                found.push(desc);
            }
            EventPayload::SensorListingProgress(progress) => {
                debug!(progress = progress.progress, "Listing progress");
                if progress.complete {
                    return Ok(found);
                }
            }
            _ => {}
        }
    }
}

/// Obtain the sensor, name its components and release it again.
fn inspect(client: &Client, desc: &SensorDesc) -> Result<Vec<String>> {
    let handle = client.obtain_sensor(desc)?;
    let mut components = Vec::new();
    for kind in ["imu", "gnss"] {
        for component in client.components(handle, Some(kind))? {
            components.push(format!("{kind}#{}", component.0));
        }
    }
    client.release_sensor(handle)?;
    Ok(components)
}

fn print_sensors(sensors: &[ListedSensor]) {
    if sensors.is_empty() {
        println!("No sensors found");
        return;
    }
    println!("{} sensor(s)", sensors.len());
    for sensor in sensors {
        println!(
            "  {:<20} {:<8} {:<16} serial={} baud={}",
            sensor.name, sensor.io_type, sensor.identifier, sensor.serial_number, sensor.baud_rate
        );
        if let Some(ref components) = sensor.components {
            println!("      components: {}", components.join(", "));
        }
        if let Some(ref error) = sensor.error {
            println!("      obtain failed: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(simulate: bool, inspect: bool) -> ListArgs {
        ListArgs {
            config: None,
            simulate,
            inspect,
            timeout: 5,
            json: true,
        }
    }

    #[tokio::test]
    async fn test_list_simulated() {
        assert!(run_list(&args(true, true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_empty() {
        assert!(run_list(&args(false, false)).await.is_ok());
    }

    #[test]
    fn test_inspect_names_components() {
        let manager = SensorManager::new(Default::default());
        let desc = manager
            .mock_io()
            .add_device("sim", "LPMS-IG1P-RS232", SimulatedDevice::ig1("LPMS-IG1P-RS232"));
        let client = Client::new(manager.clone());
        assert_eq!(inspect(&client, &desc).unwrap(), vec!["imu#1", "gnss#2"]);
        assert_eq!(manager.sensor_count(), 0);
    }
}
