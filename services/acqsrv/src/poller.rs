//! Device polling
//!
//! Plans read batches from a device's register map, runs the poll cycle
//! against the shared interface, and decodes responses into samples. Each
//! enabled device gets its own task driving [`DevicePoller::run`] on its
//! configured interval.

use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alarm::AlarmEngine;
use crate::connection::ConnectionManager;
use crate::error::{AcqError, AcqResult};
use crate::events::{Event, EventBus};
use crate::model::{DeviceConfig, RegisterConfig, RegisterKind, Sample};
use crate::store::ValueStore;
use gridlink_modbus::{
    build_read_request, build_write_multiple_registers, build_write_single_coil,
    build_write_single_register, decode_raw, encode_scaled, parse_bit_response,
    parse_register_response, parse_write_response, DataType, MAX_READ_COILS, MAX_READ_REGISTERS,
};

/// One read request covering a contiguous run of registers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBatch {
    pub kind: RegisterKind,
    pub start: u16,
    pub quantity: u16,
    /// Registers decoded from this batch, sorted by address
    pub registers: Vec<RegisterConfig>,
}

/// Group registers into minimal contiguous read requests. Registers are
/// batched per table kind; a gap in addresses starts a new batch, as does
/// hitting the protocol quantity limit.
pub fn plan_batches(registers: &[RegisterConfig]) -> Vec<ReadBatch> {
    let mut sorted: Vec<RegisterConfig> = registers.to_vec();
    sorted.sort_by_key(|r| (r.kind.read_function(), r.address));

    let mut batches: Vec<ReadBatch> = Vec::new();
    for reg in sorted {
        let span = if reg.kind.is_bit() { 1 } else { reg.word_count() };
        let max = if reg.kind.is_bit() {
            MAX_READ_COILS
        } else {
            MAX_READ_REGISTERS
        };

        // u32 math: a register ending exactly at 0x10000 must not wrap
        let reg_end = u32::from(reg.address) + u32::from(span);
        if let Some(batch) = batches.last_mut() {
            let end = u32::from(batch.start) + u32::from(batch.quantity);
            if batch.kind == reg.kind
                && u32::from(reg.address) <= end
                && reg_end - u32::from(batch.start) <= u32::from(max)
            {
                batch.quantity = (reg_end.max(end) - u32::from(batch.start)) as u16;
                batch.registers.push(reg);
                continue;
            }
        }
        batches.push(ReadBatch {
            kind: reg.kind,
            start: reg.address,
            quantity: span,
            registers: vec![reg],
        });
    }
    batches
}

/// Decode every register of a batch from the response payload.
fn decode_batch_registers(
    batch: &ReadBatch,
    device_id: u32,
    words: Option<&[u16]>,
    bits: Option<&[bool]>,
) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(batch.registers.len());
    for reg in &batch.registers {
        let offset = (reg.address - batch.start) as usize;
        let raw = if reg.kind.is_bit() {
            bits.and_then(|b| b.get(offset))
                .map(|&bit| Ok(f64::from(u8::from(bit))))
        } else {
            words
                .and_then(|w| w.get(offset..offset + reg.word_count() as usize))
                .map(|slice| decode_raw(slice, &reg.layout))
        };

        match raw {
            Some(Ok(raw)) => {
                let value = raw * reg.factor + reg.offset;
                samples.push(
                    Sample::good(reg.id, device_id, raw, value).with_source(&reg.name, &reg.unit),
                );
            },
            Some(Err(err)) => {
                warn!(register = %reg.name, error = %err, "Failed to decode register");
                samples.push(Sample::bad(reg.id, device_id).with_source(&reg.name, &reg.unit));
            },
            None => {
                warn!(register = %reg.name, "Register missing from batch response");
                samples.push(Sample::bad(reg.id, device_id).with_source(&reg.name, &reg.unit));
            },
        }
    }
    samples
}

/// Poll every enabled register of a device once.
///
/// The interface is held for the whole cycle so batches of one device are
/// not interleaved with other devices on the same bus. Device exceptions
/// mark the affected batch bad and continue; transport failures abort the
/// cycle with an error.
pub async fn poll_device(
    connections: &ConnectionManager,
    device: &DeviceConfig,
    registers: &[RegisterConfig],
) -> AcqResult<Vec<Sample>> {
    let batches = plan_batches(registers);
    if batches.is_empty() {
        return Ok(Vec::new());
    }

    let mut slot = connections.acquire(device.interface_id).await?;
    let mut samples = Vec::with_capacity(registers.len());

    for batch in &batches {
        let fc = batch.kind.read_function();
        let request = build_read_request(fc, batch.start, batch.quantity)?;
        let response = match slot
            .exchange(connections.factory(), device.unit_id, &request)
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_connection_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    device = %device.name,
                    start = batch.start,
                    quantity = batch.quantity,
                    error = %err,
                    "Batch read failed"
                );
                samples.extend(decode_batch_registers(batch, device.id, None, None));
                continue;
            },
        };

        if batch.kind.is_bit() {
            match parse_bit_response(&response, fc, batch.quantity) {
                Ok(bits) => {
                    samples.extend(decode_batch_registers(batch, device.id, None, Some(&bits)));
                },
                Err(err) => {
                    warn!(device = %device.name, error = %err, "Bad bit response");
                    samples.extend(decode_batch_registers(batch, device.id, None, None));
                },
            }
        } else {
            match parse_register_response(&response, fc, batch.quantity) {
                Ok(words) => {
                    samples.extend(decode_batch_registers(batch, device.id, Some(&words), None));
                },
                Err(err) => {
                    warn!(device = %device.name, error = %err, "Bad register response");
                    samples.extend(decode_batch_registers(batch, device.id, None, None));
                },
            }
        }
    }

    Ok(samples)
}

/// Write an engineering value to one register.
///
/// The value is descaled and encoded per the register layout, then written
/// with FC 05 (coil), FC 06 (single word) or FC 16 (multi word).
pub async fn write_register(
    connections: &ConnectionManager,
    device: &DeviceConfig,
    register: &RegisterConfig,
    value: f64,
) -> AcqResult<()> {
    if register.access != crate::model::AccessMode::ReadWrite {
        return Err(AcqError::permission(format!(
            "Register '{}' is read-only",
            register.name
        )));
    }
    if !register.kind.is_writable() {
        return Err(AcqError::permission(format!(
            "Register '{}' is in a read-only table",
            register.name
        )));
    }

    let request = if register.kind == RegisterKind::Coil {
        build_write_single_coil(register.address, value != 0.0)?
    } else if register.word_count() == 1 && register.layout.data_type != DataType::Bool {
        let words = encode_scaled(value, &register.layout, register.factor, register.offset)?;
        build_write_single_register(register.address, words[0])?
    } else {
        let words = encode_scaled(value, &register.layout, register.factor, register.offset)?;
        build_write_multiple_registers(register.address, &words)?
    };
    let fc = request
        .function_code()
        .ok_or_else(|| AcqError::internal("Empty write request"))?;

    let response = connections
        .exchange(device.interface_id, device.unit_id, &request)
        .await?;
    parse_write_response(&response, fc, register.address)?;

    info!(
        device = %device.name,
        register = %register.name,
        value,
        "Register written"
    );
    Ok(())
}

/// Long-running poll task for one device.
pub struct DevicePoller {
    pub device: DeviceConfig,
    pub registers: Vec<RegisterConfig>,
    pub connections: Arc<ConnectionManager>,
    pub store: Arc<ValueStore>,
    pub alarms: Arc<AlarmEngine>,
    pub events: EventBus,
}

impl DevicePoller {
    /// Poll at the device interval until cancelled. Cycle failures flip the
    /// device offline and are retried on the next tick; one device's
    /// failures never touch another device's task.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(Duration::from_millis(self.device.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut online = false;
        let mut consecutive_errors = 0u32;

        info!(
            device = %self.device.name,
            interval_ms = self.device.poll_interval_ms,
            registers = self.registers.len(),
            "Device poller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(device = %self.device.name, "Device poller stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match poll_device(&self.connections, &self.device, &self.registers).await {
                Ok(samples) => {
                    consecutive_errors = 0;
                    if !online {
                        online = true;
                        self.events.publish(Event::DeviceOnline {
                            device_id: self.device.id,
                        });
                    }
                    for sample in samples {
                        for event in self.alarms.process(&sample) {
                            self.events.publish(Event::Alarm(event));
                        }
                        self.store.update(sample.clone());
                        self.events.publish(Event::Sample(sample));
                    }
                },
                Err(err) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    if online {
                        online = false;
                        self.events.publish(Event::DeviceOffline {
                            device_id: self.device.id,
                            reason: err.to_string(),
                        });
                        error!(device = %self.device.name, error = %err, "Device went offline");
                    } else {
                        debug!(
                            device = %self.device.name,
                            consecutive_errors,
                            error = %err,
                            "Poll failed"
                        );
                    }
                    // Mark everything bad so stale values are not trusted;
                    // subscribers see the failed attempt, not silence
                    for reg in &self.registers {
                        let sample = Sample::bad(reg.id, self.device.id)
                            .with_source(&reg.name, &reg.unit);
                        self.store.update(sample.clone());
                        self.events.publish(Event::Sample(sample));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::AccessMode;
    use gridlink_modbus::ValueLayout;

    fn holding(id: u32, address: u16, data_type: DataType) -> RegisterConfig {
        RegisterConfig {
            id,
            device_id: 1,
            name: format!("reg-{id}"),
            kind: RegisterKind::Holding,
            address,
            layout: ValueLayout::new(data_type),
            factor: 1.0,
            offset: 0.0,
            unit: String::new(),
            access: AccessMode::ReadOnly,
            enabled: true,
        }
    }

    #[test]
    fn test_contiguous_registers_merge() {
        let regs = vec![
            holding(1, 100, DataType::Uint16),
            holding(2, 101, DataType::Uint16),
            holding(3, 102, DataType::Uint16),
            holding(4, 500, DataType::Uint16),
        ];
        let batches = plan_batches(&regs);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].start, 100);
        assert_eq!(batches[0].quantity, 3);
        assert_eq!(batches[0].registers.len(), 3);
        assert_eq!(batches[1].start, 500);
        assert_eq!(batches[1].quantity, 1);
    }

    #[test]
    fn test_multi_word_registers_extend_batch() {
        let regs = vec![
            holding(1, 100, DataType::Float32),
            holding(2, 102, DataType::Float32),
        ];
        let batches = plan_batches(&regs);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 4);
    }

    #[test]
    fn test_gap_splits_batch() {
        let regs = vec![
            holding(1, 100, DataType::Uint16),
            holding(2, 102, DataType::Uint16),
        ];
        let batches = plan_batches(&regs);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_quantity_limit_splits_batch() {
        let regs: Vec<RegisterConfig> = (0..130)
            .map(|i| holding(i, 100 + i as u16, DataType::Uint16))
            .collect();
        let batches = plan_batches(&regs);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].quantity, MAX_READ_REGISTERS);
        assert_eq!(batches[1].quantity, 5);
    }

    #[test]
    fn test_kinds_never_mix() {
        let mut coil = holding(1, 100, DataType::Bool);
        coil.kind = RegisterKind::Coil;
        let regs = vec![coil, holding(2, 100, DataType::Uint16)];
        let batches = plan_batches(&regs);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_unsorted_input_still_merges() {
        let regs = vec![
            holding(3, 102, DataType::Uint16),
            holding(1, 100, DataType::Uint16),
            holding(2, 101, DataType::Uint16),
        ];
        let batches = plan_batches(&regs);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 3);
    }

    #[test]
    fn test_decode_batch_with_scaling() {
        let mut reg = holding(1, 100, DataType::Float32);
        reg.factor = 0.1;
        let batch = ReadBatch {
            kind: RegisterKind::Holding,
            start: 100,
            quantity: 2,
            registers: vec![reg],
        };
        // 0x41C80000 = 25.0, scaled by 0.1 -> 2.5
        let samples = decode_batch_registers(&batch, 1, Some(&[0x41C8, 0x0000]), None);
        assert_eq!(samples.len(), 1);
        assert!(samples[0].is_good());
        assert!((samples[0].raw - 25.0).abs() < 1e-9);
        assert!((samples[0].value - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_batch_missing_payload_is_bad() {
        let batch = ReadBatch {
            kind: RegisterKind::Holding,
            start: 100,
            quantity: 1,
            registers: vec![holding(1, 100, DataType::Uint16)],
        };
        let samples = decode_batch_registers(&batch, 1, None, None);
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].is_good());
    }
}
