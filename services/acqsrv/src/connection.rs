//! Connection manager
//!
//! Owns one connection slot per interface. Devices on the same interface
//! share the slot and take turns through its async mutex, so at most one
//! request is in flight per socket or serial bus. Connections are opened
//! lazily on first use and dropped after fatal errors, reconnecting on the
//! next acquire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{AcqError, AcqResult};
use crate::events::{Event, EventBus};
use crate::model::{ConnectionStatus, InterfaceConfig};
use crate::transport::{ModbusTransport, TransportFactory};
use gridlink_modbus::{build_read_request, Pdu};

/// State behind each interface mutex.
pub struct InterfaceSlot {
    config: InterfaceConfig,
    transport: Option<Box<dyn ModbusTransport>>,
    status: ConnectionStatus,
    last_seen: Option<DateTime<Utc>>,
    events: EventBus,
}

impl InterfaceSlot {
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Record a status transition and announce it if it actually changed.
    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.events.publish(Event::InterfaceStatus {
                interface_id: self.config.id,
                status,
            });
        }
    }

    /// Exchange one request, connecting first if needed. A fatal error
    /// drops the transport so the next call reconnects.
    pub async fn exchange(
        &mut self,
        factory: &dyn TransportFactory,
        unit_id: u8,
        request: &Pdu,
    ) -> AcqResult<Pdu> {
        if self.transport.is_none() {
            debug!(interface = %self.config.name, "Opening connection");
            match factory.connect(&self.config).await {
                Ok(transport) => self.transport = Some(transport),
                Err(err) => {
                    self.set_status(ConnectionStatus::Error);
                    return Err(err);
                },
            }
        }

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| AcqError::internal("Transport missing after connect"))?;

        match transport.exchange(unit_id, request).await {
            Ok(response) => {
                self.last_seen = Some(Utc::now());
                self.set_status(ConnectionStatus::Online);
                Ok(response)
            },
            Err(err) => {
                if err.is_connection_fatal() {
                    warn!(
                        interface = %self.config.name,
                        error = %err,
                        "Connection failed, dropping transport"
                    );
                    if let Some(mut dead) = self.transport.take() {
                        dead.close().await;
                    }
                    self.set_status(ConnectionStatus::Error);
                }
                Err(err)
            },
        }
    }
}

/// Shared registry of interface slots.
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    slots: HashMap<u32, Arc<Mutex<InterfaceSlot>>>,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        interfaces: &[InterfaceConfig],
        events: EventBus,
    ) -> Self {
        let slots = interfaces
            .iter()
            .filter(|iface| iface.enabled)
            .map(|iface| {
                (
                    iface.id,
                    Arc::new(Mutex::new(InterfaceSlot {
                        config: iface.clone(),
                        transport: None,
                        status: ConnectionStatus::Offline,
                        last_seen: None,
                        events: events.clone(),
                    })),
                )
            })
            .collect();
        Self { factory, slots }
    }

    pub fn factory(&self) -> &dyn TransportFactory {
        self.factory.as_ref()
    }

    /// Take exclusive ownership of an interface for one request sequence.
    /// The guard is owned so it can cross await points inside a poll cycle.
    pub async fn acquire(&self, interface_id: u32) -> AcqResult<OwnedMutexGuard<InterfaceSlot>> {
        let slot = self
            .slots
            .get(&interface_id)
            .ok_or_else(|| AcqError::not_found(format!("Interface {interface_id}")))?;
        Ok(slot.clone().lock_owned().await)
    }

    /// Convenience: single exchange with acquire/release around it.
    pub async fn exchange(&self, interface_id: u32, unit_id: u8, request: &Pdu) -> AcqResult<Pdu> {
        let mut slot = self.acquire(interface_id).await?;
        slot.exchange(self.factory.as_ref(), unit_id, request).await
    }

    /// Probe an interface by reading one holding register from the given
    /// unit and return the round-trip latency in milliseconds. A device
    /// exception still proves the channel works; only transport-level
    /// failures count as unreachable.
    pub async fn test_connection(&self, interface_id: u32, unit_id: u8) -> AcqResult<u64> {
        let probe = build_read_request(0x03, 0, 1).map_err(AcqError::from)?;
        let started = Instant::now();
        match self.exchange(interface_id, unit_id, &probe).await {
            Ok(_) | Err(AcqError::DeviceException(_)) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                info!(interface_id, unit_id, latency_ms, "Connection test passed");
                Ok(latency_ms)
            },
            Err(err) => {
                warn!(interface_id, unit_id, error = %err, "Connection test failed");
                Err(err)
            },
        }
    }

    /// Current status of an interface slot.
    pub async fn status(&self, interface_id: u32) -> Option<ConnectionStatus> {
        match self.slots.get(&interface_id) {
            Some(slot) => Some(slot.lock().await.status()),
            None => None,
        }
    }

    /// Drop any open transport for the interface.
    pub async fn disconnect(&self, interface_id: u32) {
        if let Some(slot) = self.slots.get(&interface_id) {
            let mut slot = slot.lock().await;
            if let Some(mut transport) = slot.transport.take() {
                transport.close().await;
                debug!(interface = %slot.config.name, "Disconnected");
            }
            slot.set_status(ConnectionStatus::Offline);
        }
    }

    /// Close all transports, used on shutdown.
    pub async fn shutdown(&self) {
        for (id, slot) in &self.slots {
            let mut slot = slot.lock().await;
            if let Some(mut transport) = slot.transport.take() {
                transport.close().await;
                debug!(interface_id = id, "Closed on shutdown");
            }
            slot.set_status(ConnectionStatus::Offline);
        }
    }
}
