use crate::adapter::{AdapterFactory, NoHardware, VirtualBus, MAX_INTERFACE_NAME};
use crate::error::ConfigError;
use crate::simulation::SimulationEngine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INTERFACE: &str = "vcan0";
/// 10 Hz
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Which hardware transport strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Platform without CAN support
    #[default]
    None,
    /// In-process virtual segments
    Virtual,
}

/// Mode entered right after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    Idle,
    #[default]
    Simulation,
    Hardware,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub backend: Backend,
    pub interface: String,
    pub tick_interval_ms: u64,
    pub seed: Option<u64>,
    pub start_mode: StartMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::None,
            interface: DEFAULT_INTERFACE.to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            seed: None,
            start_mode: StartMode::Simulation,
        }
    }
}

impl ControllerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.is_empty() || self.interface.len() >= MAX_INTERFACE_NAME {
            return Err(ConfigError::Invalid(format!(
                "interface name must be 1-{} bytes, got {:?}",
                MAX_INTERFACE_NAME - 1,
                self.interface
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn engine(&self) -> SimulationEngine {
        match self.seed {
            Some(seed) => SimulationEngine::with_seed(seed),
            None => SimulationEngine::new(),
        }
    }

    /// Build the transport strategy. The virtual backend comes up with the
    /// configured interface already present.
    pub fn factory(&self) -> (Box<dyn AdapterFactory>, Option<VirtualBus>) {
        match self.backend {
            Backend::None => (Box::new(NoHardware), None),
            Backend::Virtual => {
                let bus = VirtualBus::with_interfaces([self.interface.as_str()]);
                (Box::new(bus.clone()), Some(bus))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.backend, Backend::None);
        assert_eq!(config.interface, "vcan0");
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ControllerConfig::from_json_str(r#"{"backend":"virtual","seed":9}"#).unwrap();
        assert_eq!(config.backend, Backend::Virtual);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.start_mode, StartMode::Simulation);
        assert_eq!(config.tick_interval_ms, 100);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = ControllerConfig::from_json_str(r#"{"tick_interval_ms":0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_long_interface() {
        let result = ControllerConfig::from_json_str(r#"{"interface":"a_very_long_can_iface"}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let result = ControllerConfig::from_json_str(r#"{"backend":"socketcan"}"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_virtual_factory_has_interface() {
        let config = ControllerConfig {
            backend: Backend::Virtual,
            interface: "vcan3".to_string(),
            ..ControllerConfig::default()
        };
        let (factory, bus) = config.factory();
        assert_eq!(factory.available_interfaces(), vec!["vcan3"]);
        assert!(bus.unwrap().has_interface("vcan3"));
    }
}
