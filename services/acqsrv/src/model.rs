//! Domain model
//!
//! Configuration records for interfaces, devices, registers, alarms and
//! calculated registers, plus the runtime sample and alarm event types.
//! Each config type carries its own `validate()`; cross-record checks
//! (dangling ids) live in the config loader.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};
use gridlink_modbus::ValueLayout;

/// How an interface reaches its devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum InterfaceKind {
    /// Modbus TCP over a socket
    Tcp { host: String, port: u16 },
    /// Modbus RTU over a serial line
    Serial {
        port: String,
        baud_rate: u32,
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        #[serde(default)]
        parity: Parity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_enabled() -> bool {
    true
}

/// A physical communication channel (one socket or one serial bus).
/// All devices on an interface share it; exchanges are serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub id: u32,
    pub name: String,
    #[serde(flatten)]
    pub kind: InterfaceKind,
    /// Per-exchange response timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InterfaceConfig {
    pub fn validate(&self) -> AcqResult<()> {
        if self.name.is_empty() {
            return Err(AcqError::validation(format!(
                "Interface {}: name must not be empty",
                self.id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(AcqError::validation(format!(
                "Interface '{}': timeout must be positive",
                self.name
            )));
        }
        match &self.kind {
            InterfaceKind::Tcp { host, port } => {
                if host.is_empty() {
                    return Err(AcqError::validation(format!(
                        "Interface '{}': host must not be empty",
                        self.name
                    )));
                }
                if *port == 0 {
                    return Err(AcqError::validation(format!(
                        "Interface '{}': port must be positive",
                        self.name
                    )));
                }
            },
            InterfaceKind::Serial {
                port,
                baud_rate,
                data_bits,
                stop_bits,
                ..
            } => {
                if port.is_empty() {
                    return Err(AcqError::validation(format!(
                        "Interface '{}': serial port must not be empty",
                        self.name
                    )));
                }
                if *baud_rate == 0 {
                    return Err(AcqError::validation(format!(
                        "Interface '{}': baud rate must be positive",
                        self.name
                    )));
                }
                if !matches!(data_bits, 7 | 8) {
                    return Err(AcqError::validation(format!(
                        "Interface '{}': data bits must be 7 or 8",
                        self.name
                    )));
                }
                if !matches!(stop_bits, 1 | 2) {
                    return Err(AcqError::validation(format!(
                        "Interface '{}': stop bits must be 1 or 2",
                        self.name
                    )));
                }
            },
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// One Modbus slave on an interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: u32,
    pub interface_id: u32,
    pub name: String,
    /// Modbus unit/slave id, 1-247
    pub unit_id: u8,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl DeviceConfig {
    pub fn validate(&self) -> AcqResult<()> {
        if self.name.is_empty() {
            return Err(AcqError::validation(format!(
                "Device {}: name must not be empty",
                self.id
            )));
        }
        if self.unit_id == 0 || self.unit_id > 247 {
            return Err(AcqError::validation(format!(
                "Device '{}': unit id {} outside 1-247",
                self.name, self.unit_id
            )));
        }
        if self.poll_interval_ms < 50 {
            return Err(AcqError::validation(format!(
                "Device '{}': poll interval {}ms below 50ms minimum",
                self.name, self.poll_interval_ms
            )));
        }
        Ok(())
    }
}

/// Modbus register table a point lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    Coil,
    DiscreteInput,
    Holding,
    Input,
}

impl RegisterKind {
    /// Function code used to read this table.
    pub fn read_function(&self) -> u8 {
        match self {
            Self::Coil => 0x01,
            Self::DiscreteInput => 0x02,
            Self::Holding => 0x03,
            Self::Input => 0x04,
        }
    }

    /// Whether the table holds single bits rather than 16-bit registers.
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// Whether the table is writable at all.
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Coil | Self::Holding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

fn default_factor() -> f64 {
    1.0
}

/// One point on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterConfig {
    pub id: u32,
    pub device_id: u32,
    pub name: String,
    pub kind: RegisterKind,
    pub address: u16,
    #[serde(flatten)]
    pub layout: ValueLayout,
    /// Engineering value = raw * factor + offset
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub offset: f64,
    /// Engineering unit label, e.g. "°C" or "kWh"
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RegisterConfig {
    pub fn validate(&self) -> AcqResult<()> {
        if self.name.is_empty() {
            return Err(AcqError::validation(format!(
                "Register {}: name must not be empty",
                self.id
            )));
        }
        if self.factor == 0.0 {
            return Err(AcqError::validation(format!(
                "Register '{}': factor must be non-zero",
                self.name
            )));
        }
        let words = self.layout.word_count();
        if self.kind.is_bit() && words != 1 {
            return Err(AcqError::validation(format!(
                "Register '{}': bit tables only support single-word types",
                self.name
            )));
        }
        if u32::from(self.address) + u32::from(words) - 1 > 0xFFFF {
            return Err(AcqError::validation(format!(
                "Register '{}': address {} + {} words exceeds 0xFFFF",
                self.name, self.address, words
            )));
        }
        if self.access == AccessMode::ReadWrite && !self.kind.is_writable() {
            return Err(AcqError::validation(format!(
                "Register '{}': {:?} table is not writable",
                self.name, self.kind
            )));
        }
        Ok(())
    }

    /// Number of 16-bit registers (or bits, for bit tables) this point spans.
    pub fn word_count(&self) -> u16 {
        self.layout.word_count()
    }
}

/// Runtime health of an interface connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Never connected, or cleanly closed
    #[default]
    Offline,
    /// Last exchange succeeded
    Online,
    /// Last exchange failed at the transport level
    Error,
}

/// Sample quality flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Bad,
    /// Read succeeded but the value is suspect (reserved for gateways
    /// and stale-data marking; the pollers themselves emit Good/Bad)
    Uncertain,
}

/// One acquired value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub register_id: u32,
    pub device_id: u32,
    /// Source register name, for consumers that never see the config
    #[serde(default)]
    pub register_name: String,
    /// Engineering unit label of the source register
    #[serde(default)]
    pub unit: String,
    /// Value before scaling
    pub raw: f64,
    /// Engineering value after factor/offset
    pub value: f64,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn good(register_id: u32, device_id: u32, raw: f64, value: f64) -> Self {
        Self {
            register_id,
            device_id,
            register_name: String::new(),
            unit: String::new(),
            raw,
            value,
            quality: Quality::Good,
            timestamp: Utc::now(),
        }
    }

    pub fn bad(register_id: u32, device_id: u32) -> Self {
        Self {
            register_id,
            device_id,
            register_name: String::new(),
            unit: String::new(),
            raw: 0.0,
            value: 0.0,
            quality: Quality::Bad,
            timestamp: Utc::now(),
        }
    }

    /// Attach the source register's name and unit label.
    pub fn with_source(mut self, name: &str, unit: &str) -> Self {
        self.register_name = name.to_string();
        self.unit = unit.to_string();
        self
    }

    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }
}

/// Alarm trigger condition, evaluated against the engineering value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum AlarmCondition {
    GreaterThan { threshold: f64 },
    LessThan { threshold: f64 },
    OutOfRange { low: f64, high: f64 },
    Equals { target: f64 },
    NotEquals { target: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub id: u32,
    pub register_id: u32,
    pub name: String,
    #[serde(flatten)]
    pub condition: AlarmCondition,
    /// Recovery margin: the value must recross the threshold by this much
    /// before the alarm clears
    #[serde(default)]
    pub hysteresis: f64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AlarmConfig {
    pub fn validate(&self) -> AcqResult<()> {
        if self.name.is_empty() {
            return Err(AcqError::validation(format!(
                "Alarm {}: name must not be empty",
                self.id
            )));
        }
        if self.hysteresis < 0.0 {
            return Err(AcqError::validation(format!(
                "Alarm '{}': hysteresis must be non-negative",
                self.name
            )));
        }
        if let AlarmCondition::OutOfRange { low, high } = self.condition {
            if low >= high {
                return Err(AcqError::validation(format!(
                    "Alarm '{}': low {} must be below high {}",
                    self.name, low, high
                )));
            }
            if high - low < 2.0 * self.hysteresis {
                return Err(AcqError::validation(format!(
                    "Alarm '{}': hysteresis {} too wide for band [{}, {}]",
                    self.name, self.hysteresis, low, high
                )));
            }
        }
        Ok(())
    }
}

/// Raised/cleared transition emitted by the alarm engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub alarm_id: u32,
    pub register_id: u32,
    pub kind: AlarmTransition,
    pub severity: Severity,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmTransition {
    Raised,
    Cleared,
}

/// A virtual register computed from other registers by formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedRegisterConfig {
    pub id: u32,
    pub name: String,
    pub formula: String,
    /// Formula variable name -> source register id
    pub inputs: HashMap<String, u32>,
    /// Engineering unit label of the computed value
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl CalculatedRegisterConfig {
    pub fn validate(&self) -> AcqResult<()> {
        if self.name.is_empty() {
            return Err(AcqError::validation(format!(
                "Calculated register {}: name must not be empty",
                self.id
            )));
        }
        if self.formula.trim().is_empty() {
            return Err(AcqError::validation(format!(
                "Calculated register '{}': formula must not be empty",
                self.name
            )));
        }
        if self.interval_ms < 50 {
            return Err(AcqError::validation(format!(
                "Calculated register '{}': interval {}ms below 50ms minimum",
                self.name, self.interval_ms
            )));
        }
        Ok(())
    }
}
