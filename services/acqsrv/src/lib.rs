//! GridLink acquisition service (`acqsrv`)
//!
//! Concurrent Modbus data acquisition: polls RTU/serial and TCP devices on
//! independent schedules, serializes access per interface, converts raw
//! registers to engineering values, evaluates hysteresis alarms and
//! formula-based calculated registers, and fans everything out over an
//! event bus.

pub mod alarm;
pub mod calc;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod model;
pub mod poller;
pub mod service;
pub mod store;
pub mod transport;

pub use config::AppConfig;
pub use error::{AcqError, AcqResult};
pub use events::Event;
pub use service::AcqService;
