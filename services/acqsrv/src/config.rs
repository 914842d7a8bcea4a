//! Configuration loading
//!
//! The whole acquisition setup comes from one YAML file, with `ACQSRV_`
//! environment variables layered on top for deployment overrides. After
//! deserialization every record is validated individually and then
//! cross-checked for dangling references and duplicate ids.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AcqError, AcqResult};
use crate::model::{
    AlarmConfig, CalculatedRegisterConfig, DeviceConfig, InterfaceConfig, RegisterConfig,
};

fn default_event_capacity() -> usize {
    1024
}

/// Service-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Event bus ring size; slow subscribers lag and drop from the tail
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub registers: Vec<RegisterConfig>,
    #[serde(default)]
    pub alarms: Vec<AlarmConfig>,
    #[serde(default)]
    pub calculated: Vec<CalculatedRegisterConfig>,
}

impl AppConfig {
    /// Load from a YAML file with `ACQSRV_` environment overrides
    /// (e.g. `ACQSRV_SERVICE__EVENT_CAPACITY=4096`).
    pub fn load(path: impl AsRef<Path>) -> AcqResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AcqError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config: Self = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("ACQSRV_").split("__"))
            .extract()
            .map_err(|e| AcqError::config(format!("Failed to load {}: {}", path.display(), e)))?;

        config.validate()?;
        info!(
            interfaces = config.interfaces.len(),
            devices = config.devices.len(),
            registers = config.registers.len(),
            alarms = config.alarms.len(),
            calculated = config.calculated.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Per-record validation plus referential integrity.
    pub fn validate(&self) -> AcqResult<()> {
        let mut interface_ids = HashSet::new();
        for iface in &self.interfaces {
            iface.validate()?;
            if !interface_ids.insert(iface.id) {
                return Err(AcqError::validation(format!(
                    "Duplicate interface id {}",
                    iface.id
                )));
            }
        }

        let mut device_ids = HashSet::new();
        for dev in &self.devices {
            dev.validate()?;
            if !device_ids.insert(dev.id) {
                return Err(AcqError::validation(format!("Duplicate device id {}", dev.id)));
            }
            if !interface_ids.contains(&dev.interface_id) {
                return Err(AcqError::validation(format!(
                    "Device '{}' references unknown interface {}",
                    dev.name, dev.interface_id
                )));
            }
        }

        let mut register_ids = HashSet::new();
        for reg in &self.registers {
            reg.validate()?;
            if !register_ids.insert(reg.id) {
                return Err(AcqError::validation(format!(
                    "Duplicate register id {}",
                    reg.id
                )));
            }
            if !device_ids.contains(&reg.device_id) {
                return Err(AcqError::validation(format!(
                    "Register '{}' references unknown device {}",
                    reg.name, reg.device_id
                )));
            }
        }

        let mut alarm_ids = HashSet::new();
        for alarm in &self.alarms {
            alarm.validate()?;
            if !alarm_ids.insert(alarm.id) {
                return Err(AcqError::validation(format!("Duplicate alarm id {}", alarm.id)));
            }
            if !register_ids.contains(&alarm.register_id) {
                return Err(AcqError::validation(format!(
                    "Alarm '{}' references unknown register {}",
                    alarm.name, alarm.register_id
                )));
            }
        }

        let mut calc_ids = HashSet::new();
        for calc in &self.calculated {
            calc.validate()?;
            if !calc_ids.insert(calc.id) {
                return Err(AcqError::validation(format!(
                    "Duplicate calculated register id {}",
                    calc.id
                )));
            }
            for (var, reg_id) in &calc.inputs {
                if !register_ids.contains(reg_id) {
                    return Err(AcqError::validation(format!(
                        "Calculated register '{}' input '{}' references unknown register {}",
                        calc.name, var, reg_id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn interface(&self, id: u32) -> AcqResult<&InterfaceConfig> {
        self.interfaces
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| AcqError::not_found(format!("Interface {id}")))
    }

    pub fn device(&self, id: u32) -> AcqResult<&DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| AcqError::not_found(format!("Device {id}")))
    }

    pub fn register(&self, id: u32) -> AcqResult<&RegisterConfig> {
        self.registers
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| AcqError::not_found(format!("Register {id}")))
    }

    pub fn calculated(&self, id: u32) -> AcqResult<&CalculatedRegisterConfig> {
        self.calculated
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AcqError::not_found(format!("Calculated register {id}")))
    }

    /// Enabled registers of one device.
    pub fn device_registers(&self, device_id: u32) -> Vec<&RegisterConfig> {
        self.registers
            .iter()
            .filter(|r| r.device_id == device_id && r.enabled)
            .collect()
    }

    /// Enabled alarms keyed by register id.
    pub fn alarms_by_register(&self) -> HashMap<u32, Vec<&AlarmConfig>> {
        let mut map: HashMap<u32, Vec<&AlarmConfig>> = HashMap::new();
        for alarm in self.alarms.iter().filter(|a| a.enabled) {
            map.entry(alarm.register_id).or_default().push(alarm);
        }
        map
    }
}
