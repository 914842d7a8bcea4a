//! Acquisition service facade
//!
//! Wires configuration, connections, pollers, alarms and calculated
//! registers together and exposes the operations external callers use:
//! on-demand polling, writes, connection tests, alarm acknowledgement and
//! event subscription. `spawn_pollers` starts the long-running tasks, one
//! per enabled device and calculated register.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::alarm::{AlarmEngine, AlarmState};
use crate::calc::{CalcPoller, CalcRegister};
use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::error::AcqResult;
use crate::events::{Event, EventBus};
use crate::model::Sample;
use crate::poller::{poll_device, write_register, DevicePoller};
use crate::store::ValueStore;
use crate::transport::TransportFactory;

pub struct AcqService {
    config: AppConfig,
    connections: Arc<ConnectionManager>,
    store: Arc<ValueStore>,
    alarms: Arc<AlarmEngine>,
    events: EventBus,
}

impl AcqService {
    /// Build the service from validated configuration. Calculated register
    /// formulas are compiled here so a broken formula fails startup.
    pub fn new(config: AppConfig, factory: Arc<dyn TransportFactory>) -> AcqResult<Self> {
        config.validate()?;
        for calc in config.calculated.iter().filter(|c| c.enabled) {
            // Compile check only; pollers build their own runners
            CalcRegister::new(calc.clone())?;
        }

        let events = EventBus::new(config.service.event_capacity);
        let connections = Arc::new(ConnectionManager::new(
            factory,
            &config.interfaces,
            events.clone(),
        ));
        let alarms = Arc::new(AlarmEngine::new(&config.alarms));

        Ok(Self {
            config,
            connections,
            store: Arc::new(ValueStore::new()),
            alarms,
            events,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    /// Subscribe to samples, alarm transitions and device status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Poll one device immediately, outside its schedule. Samples are
    /// stored and published exactly as scheduled polls are.
    pub async fn poll_device(&self, device_id: u32) -> AcqResult<Vec<Sample>> {
        let device = self.config.device(device_id)?;
        let registers: Vec<_> = self
            .config
            .device_registers(device_id)
            .into_iter()
            .cloned()
            .collect();

        let samples = poll_device(&self.connections, device, &registers).await?;
        for sample in &samples {
            for event in self.alarms.process(sample) {
                self.events.publish(Event::Alarm(event));
            }
            self.store.update(sample.clone());
            self.events.publish(Event::Sample(sample.clone()));
        }
        Ok(samples)
    }

    /// Write an engineering value to a writable register.
    pub async fn write_register(&self, register_id: u32, value: f64) -> AcqResult<()> {
        let register = self.config.register(register_id)?;
        let device = self.config.device(register.device_id)?;
        write_register(&self.connections, device, register, value).await
    }

    /// Evaluate a calculated register once, on demand. An evaluation
    /// failure leaves the previously stored value untouched.
    pub fn evaluate_calculated(&self, calc_id: u32) -> AcqResult<Sample> {
        let config = self.config.calculated(calc_id)?;
        let calc = CalcRegister::new(config.clone())?;
        let sample = calc.evaluate(&self.store)?;
        self.store.update(sample.clone());
        self.events.publish(Event::Sample(sample.clone()));
        Ok(sample)
    }

    /// Check an interface is reachable and return the probe round-trip
    /// latency in milliseconds, probing with the first enabled device's
    /// unit id (or unit 1 when the interface has no devices).
    pub async fn test_connection(&self, interface_id: u32) -> AcqResult<u64> {
        self.config.interface(interface_id)?;
        let unit_id = self
            .config
            .devices
            .iter()
            .find(|d| d.interface_id == interface_id && d.enabled)
            .map_or(1, |d| d.unit_id);
        self.connections.test_connection(interface_id, unit_id).await
    }

    pub fn acknowledge_alarm(&self, alarm_id: u32) -> AcqResult<()> {
        self.alarms.acknowledge(alarm_id)
    }

    pub fn alarm_state(&self, alarm_id: u32) -> Option<AlarmState> {
        self.alarms.state(alarm_id)
    }

    pub fn active_alarms(&self) -> Vec<u32> {
        self.alarms.active_alarms()
    }

    /// Spawn the long-running poll tasks. Returns the `JoinSet` so the
    /// caller can wait for them to drain after cancelling the token.
    pub fn spawn_pollers(&self, cancel: CancellationToken) -> AcqResult<JoinSet<()>> {
        let mut tasks = JoinSet::new();

        for device in self.config.devices.iter().filter(|d| d.enabled) {
            let registers: Vec<_> = self
                .config
                .device_registers(device.id)
                .into_iter()
                .cloned()
                .collect();
            if registers.is_empty() {
                info!(device = %device.name, "No enabled registers, skipping poller");
                continue;
            }
            let poller = DevicePoller {
                device: device.clone(),
                registers,
                connections: self.connections.clone(),
                store: self.store.clone(),
                alarms: self.alarms.clone(),
                events: self.events.clone(),
            };
            tasks.spawn(poller.run(cancel.clone()));
        }

        for calc in self.config.calculated.iter().filter(|c| c.enabled) {
            let poller = CalcPoller {
                calc: CalcRegister::new(calc.clone())?,
                store: self.store.clone(),
                events: self.events.clone(),
            };
            tasks.spawn(poller.run(cancel.clone()));
        }

        info!(tasks = tasks.len(), "Pollers spawned");
        Ok(tasks)
    }

    /// Close all connections. Call after the poll tasks have drained.
    pub async fn shutdown(&self) {
        self.connections.shutdown().await;
        info!("Service shut down");
    }
}

impl AcqService {
    /// Direct access for embedders that drive connections themselves.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }
}
