//! Connection negotiator
//!
//! Borrows a freshly opened communicator to find out which protocol
//! generation the device speaks, which model it is, and therefore which
//! components the sensor is made of.

use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::Duration;

use contracts::{
    ComponentConfig, Frame, SensorConfig, SensorInitError, SpecialOptions, ZenResult,
    COMPONENT_GNSS, COMPONENT_IMU,
};
use tracing::{debug, info, warn};

use crate::communicator::{Communicator, FrameSubscriber};
use crate::opcodes::{InternalOpcode, OpcodeV1, GET_FIRMWARE_INFO, SET_COMMAND_MODE};

/// Default wait per negotiation step.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Length of the legacy "IMU id" reply to the firmware-info opcode.
const LEGACY_ID_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    AwaitingCommandMode,
    AwaitingFirmwareInfo,
    AwaitingSensorModel,
    Done,
}

#[derive(Debug)]
struct HandshakeState {
    stage: Stage,
    reply: Option<Frame>,
}

/// Frame subscriber installed for the duration of the negotiation.
#[derive(Debug)]
struct Handshake {
    state: Mutex<HandshakeState>,
    cv: Condvar,
}

impl Handshake {
    fn new() -> Self {
        Self {
            state: Mutex::new(HandshakeState {
                stage: Stage::Idle,
                reply: None,
            }),
            cv: Condvar::new(),
        }
    }

    fn expect(&self, stage: Stage) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stage = stage;
        state.reply = None;
    }

    fn wait(&self, timeout: Duration) -> Option<Frame> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut state, _) = self
            .cv
            .wait_timeout_while(state, timeout, |state| state.reply.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.reply.take()
    }
}

impl FrameSubscriber for Handshake {
    fn on_frame(&self, frame: Frame) -> ZenResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let expected = match state.stage {
            Stage::AwaitingCommandMode => {
                frame.function == InternalOpcode::Ack.code()
                    || frame.function == InternalOpcode::Nack.code()
            }
            Stage::AwaitingFirmwareInfo => frame.function == GET_FIRMWARE_INFO,
            Stage::AwaitingSensorModel => frame.function == OpcodeV1::GetSensorModel.code(),
            Stage::Idle | Stage::Done => false,
        };
        // leftover stream samples are ignored
        if expected && state.reply.is_none() {
            state.reply = Some(frame);
            drop(state);
            self.cv.notify_all();
        }
        Ok(())
    }
}

/// Model-name pattern. A trailing `*` matches any suffix; `"*"` alone is the
/// wildcard.
struct ModelEntry {
    generation: u32,
    pattern: &'static str,
    config: fn() -> SensorConfig,
}

impl ModelEntry {
    fn matches(&self, generation: u32, model: &str) -> bool {
        if self.generation != generation {
            return false;
        }
        match self.pattern.strip_suffix('*') {
            Some(prefix) => model.starts_with(prefix),
            None => model == self.pattern,
        }
    }
}

fn ig1_single_imu() -> SensorConfig {
    SensorConfig {
        version: 1,
        components: vec![ComponentConfig::new(COMPONENT_IMU, 1)],
    }
}

fn ig1_imu_gnss() -> SensorConfig {
    SensorConfig {
        version: 1,
        components: vec![
            ComponentConfig::new(COMPONENT_IMU, 1).with_options(SpecialOptions::SECOND_GYRO),
            ComponentConfig::new(COMPONENT_GNSS, 1).with_options(SpecialOptions::RTK_CORRECTION),
        ],
    }
}

/// Checked in order; the first match wins.
const MODEL_TABLE: &[ModelEntry] = &[
    ModelEntry {
        generation: 1,
        pattern: "LPMS-IG1P-*",
        config: ig1_imu_gnss,
    },
    ModelEntry {
        generation: 1,
        pattern: "LPMS-BE1P-*",
        config: ig1_imu_gnss,
    },
    ModelEntry {
        generation: 1,
        pattern: "*",
        config: ig1_single_imu,
    },
    ModelEntry {
        generation: 0,
        pattern: "*",
        config: SensorConfig::legacy,
    },
];

/// Configuration of a device of the given generation and model.
pub fn lookup_config(generation: u32, model: &str) -> Result<SensorConfig, SensorInitError> {
    MODEL_TABLE
        .iter()
        .find(|entry| entry.matches(generation, model))
        .map(|entry| (entry.config)())
        .ok_or(SensorInitError::NoConfiguration)
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub config: SensorConfig,
    /// Trimmed model string; empty for legacy devices
    pub model: String,
}

pub struct ConnectionNegotiator {
    communicator: Arc<Communicator>,
    step_timeout: Duration,
}

impl ConnectionNegotiator {
    pub fn new(communicator: Arc<Communicator>) -> Self {
        Self::with_timeout(communicator, NEGOTIATION_TIMEOUT)
    }

    pub fn with_timeout(communicator: Arc<Communicator>, step_timeout: Duration) -> Self {
        Self {
            communicator,
            step_timeout,
        }
    }

    /// Run the handshake sequence at `baud_rate`.
    pub fn negotiate(&self, baud_rate: u32) -> Result<Negotiated, SensorInitError> {
        self.communicator
            .set_baud_rate(baud_rate)
            .map_err(|_| SensorInitError::SetBaudRateFailed)?;

        let handshake = Arc::new(Handshake::new());
        let subscriber: Weak<dyn FrameSubscriber> = Arc::downgrade(&handshake) as Weak<dyn FrameSubscriber>;
        self.communicator.attach(subscriber);
        let result = self.run(&handshake);
        self.communicator.detach();
        handshake.expect(Stage::Done);

        match &result {
            Ok(negotiated) => info!(
                version = negotiated.config.version,
                model = %negotiated.model,
                components = negotiated.config.components.len(),
                "sensor negotiated"
            ),
            Err(error) => warn!(%error, "negotiation failed"),
        }
        result
    }

    fn run(&self, handshake: &Handshake) -> Result<Negotiated, SensorInitError> {
        self.enter_command_mode(handshake)?;

        let info = self.request(handshake, Stage::AwaitingFirmwareInfo, GET_FIRMWARE_INFO)?;
        if info.payload.len() == LEGACY_ID_LEN {
            debug!("4-byte firmware info, legacy protocol");
            return Ok(Negotiated {
                config: lookup_config(0, "")?,
                model: String::new(),
            });
        }

        let reply = self.request(handshake, Stage::AwaitingSensorModel, OpcodeV1::GetSensorModel.code())?;
        let model = trim_model(&reply.payload);
        Ok(Negotiated {
            config: lookup_config(1, &model)?,
            model,
        })
    }

    fn enter_command_mode(&self, handshake: &Handshake) -> Result<(), SensorInitError> {
        for attempt in 0..2 {
            match self.request(handshake, Stage::AwaitingCommandMode, SET_COMMAND_MODE) {
                Ok(frame) if frame.function == InternalOpcode::Ack.code() => return Ok(()),
                Ok(_) => return Err(SensorInitError::RetrieveFailed),
                Err(SensorInitError::Timeout) => {
                    // the device may have been streaming when we attached
                    debug!(attempt, "no command mode ack, resetting parser");
                    self.communicator.reset_parser();
                }
                Err(error) => return Err(error),
            }
        }
        Err(SensorInitError::Timeout)
    }

    fn request(&self, handshake: &Handshake, stage: Stage, function: u8) -> Result<Frame, SensorInitError> {
        handshake.expect(stage);
        self.communicator
            .send(0, function, &[])
            .map_err(|_| SensorInitError::SendFailed)?;
        handshake.wait(self.step_timeout).ok_or(SensorInitError::Timeout)
    }
}

/// ASCII model string without NUL padding or surrounding whitespace.
fn trim_model(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, SimulatedDevice};
    use contracts::Framing;

    fn negotiate(device: Arc<SimulatedDevice>) -> Result<Negotiated, SensorInitError> {
        let transport = MockTransport::with_device("handshake", device);
        let communicator = Communicator::new(transport, Framing::Zensync);
        ConnectionNegotiator::with_timeout(communicator, Duration::from_millis(200)).negotiate(921_600)
    }

    #[test]
    fn test_lookup_table() {
        assert_eq!(lookup_config(0, "anything"), Ok(SensorConfig::legacy()));
        assert_eq!(lookup_config(1, "LPMS-IG1-CAN").unwrap().components.len(), 1);
        assert_eq!(lookup_config(1, "LPMS-IG1P-RS485").unwrap().components[1].id, COMPONENT_GNSS);
        assert_eq!(lookup_config(2, "x"), Err(SensorInitError::NoConfiguration));
    }

    #[test]
    fn test_trim_model() {
        assert_eq!(trim_model(b" LPMS-IG1-RS232\0\0"), "LPMS-IG1-RS232");
    }

    #[test]
    fn test_legacy_device() {
        let device = SimulatedDevice::legacy();
        let negotiated = negotiate(device.clone()).unwrap();
        assert_eq!(negotiated.config, SensorConfig::legacy());
        assert_eq!(device.received_functions(), vec![6, 21]);
    }

    #[test]
    fn test_ig1_device() {
        let negotiated = negotiate(SimulatedDevice::ig1("LPMS-IG1-RS232")).unwrap();
        assert_eq!(negotiated.model, "LPMS-IG1-RS232");
        assert_eq!(
            negotiated.config,
            SensorConfig {
                version: 1,
                components: vec![ComponentConfig::new(COMPONENT_IMU, 1)],
            }
        );
    }

    #[test]
    fn test_retries_command_mode_once() {
        let device = SimulatedDevice::legacy();
        device.update(|state| state.unanswered_command_modes = 1);
        assert!(negotiate(device.clone()).is_ok());
        assert_eq!(device.received_functions(), vec![6, 6, 21]);
    }

    #[test]
    fn test_silent_device_times_out() {
        let device = SimulatedDevice::legacy();
        device.update(|state| state.silent = true);
        assert_eq!(negotiate(device), Err(SensorInitError::Timeout));
    }
}
