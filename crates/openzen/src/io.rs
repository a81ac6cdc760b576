//! I/O system registry
//!
//! Every transport family the manager can list and open. The simulated
//! device system is always present so tests and demos need no hardware.

use std::sync::{Arc, PoisonError, RwLock};

use contracts::IoSystem;
use ingestion::mock::MockIoSystem;
use tracing::{debug, info};

pub struct IoRegistry {
    systems: RwLock<Vec<Arc<dyn IoSystem>>>,
    mock: Arc<MockIoSystem>,
}

impl IoRegistry {
    pub fn new() -> Self {
        let mock = Arc::new(MockIoSystem::new());
        Self {
            systems: RwLock::new(vec![mock.clone() as Arc<dyn IoSystem>]),
            mock,
        }
    }

    /// Add `system`, replacing any system of the same io type.
    pub fn register(&self, system: Arc<dyn IoSystem>) {
        let mut systems = self.systems.write().unwrap_or_else(PoisonError::into_inner);
        systems.retain(|existing| existing.io_type() != system.io_type());
        info!(io_type = system.io_type(), available = system.available(), "io system registered");
        systems.push(system);
    }

    pub fn get(&self, io_type: &str) -> Option<Arc<dyn IoSystem>> {
        self.systems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|system| system.io_type() == io_type)
            .cloned()
    }

    /// Systems whose driver is usable on this host.
    pub fn available(&self) -> Vec<Arc<dyn IoSystem>> {
        let systems = self.systems.read().unwrap_or_else(PoisonError::into_inner);
        systems
            .iter()
            .filter(|system| {
                let available = system.available();
                if !available {
                    debug!(io_type = system.io_type(), "io system unavailable");
                }
                available
            })
            .cloned()
            .collect()
    }

    /// The simulated device system.
    pub fn mock(&self) -> &Arc<MockIoSystem> {
        &self.mock
    }
}

impl Default for IoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SensorDesc, SensorInitError, Transport, ZenResult};
    use ingestion::mock::MOCK_IO_TYPE;

    struct Offline;

    impl IoSystem for Offline {
        fn io_type(&self) -> &str {
            "Serial"
        }
        fn available(&self) -> bool {
            false
        }
        fn list_devices(&self) -> ZenResult<Vec<SensorDesc>> {
            Ok(Vec::new())
        }
        fn obtain(&self, _desc: &SensorDesc) -> Result<Arc<dyn Transport>, SensorInitError> {
            Err(SensorInitError::ConnectFailed)
        }
        fn default_baud_rate(&self) -> u32 {
            115_200
        }
    }

    #[test]
    fn test_mock_always_present() {
        let registry = IoRegistry::new();
        assert!(registry.get(MOCK_IO_TYPE).is_some());
        assert!(registry.get("Serial").is_none());
        assert_eq!(registry.available().len(), 1);
    }

    #[test]
    fn test_unavailable_systems_are_not_listed() {
        let registry = IoRegistry::new();
        registry.register(Arc::new(Offline));
        registry.register(Arc::new(Offline));
        assert!(registry.get("Serial").is_some());
        assert_eq!(registry.available().len(), 1);
    }
}
