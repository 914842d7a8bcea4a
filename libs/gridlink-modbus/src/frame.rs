//! Modbus frame codecs
//!
//! Wraps a PDU into the RTU wire format (unit id + PDU + CRC-16) or the
//! TCP wire format (MBAP header + unit id + PDU), and validates the
//! corresponding responses. Framing is pure byte manipulation; the
//! transports own the sockets and serial ports.

use crate::error::{ModbusError, Result};
use crate::pdu::{Pdu, MAX_PDU_SIZE};

/// MBAP header length (transaction id, protocol id, length, unit id).
pub const MBAP_HEADER_LEN: usize = 7;

/// Largest possible RTU frame: unit id + PDU + CRC.
pub const MAX_RTU_FRAME_LEN: usize = 1 + MAX_PDU_SIZE + 2;

/// Modbus CRC-16 (polynomial 0xA001, reflected, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// RTU frame codec: `[unit_id] [pdu...] [crc_lo] [crc_hi]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtuFramer;

impl RtuFramer {
    pub fn new() -> Self {
        Self
    }

    /// Build an RTU request frame for the given unit.
    pub fn encode(&self, unit_id: u8, pdu: &Pdu) -> Result<Vec<u8>> {
        if pdu.is_empty() {
            return Err(ModbusError::invalid_request("Empty PDU"));
        }
        let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
        frame.push(unit_id);
        frame.extend_from_slice(pdu.as_slice());
        let crc = crc16(&frame);
        frame.push((crc & 0xFF) as u8);
        frame.push((crc >> 8) as u8);
        Ok(frame)
    }

    /// Validate CRC and unit id of a response frame and extract the PDU.
    pub fn decode(&self, expected_unit: u8, frame: &[u8]) -> Result<Pdu> {
        if frame.len() < 4 {
            return Err(ModbusError::protocol(format!(
                "RTU frame too short: {} bytes",
                frame.len()
            )));
        }

        let data_len = frame.len() - 2;
        let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
        let computed = crc16(&frame[..data_len]);
        if received != computed {
            tracing::debug!("RTU CRC mismatch: received {received:#06X}, computed {computed:#06X}");
            return Err(ModbusError::protocol(format!(
                "CRC mismatch: received {received:#06X}, computed {computed:#06X}"
            )));
        }

        let unit_id = frame[0];
        if unit_id != expected_unit {
            return Err(ModbusError::protocol(format!(
                "Unit id mismatch: expected {expected_unit}, got {unit_id}"
            )));
        }

        Pdu::from_slice(&frame[1..data_len])
    }
}

/// TCP frame codec: MBAP header + unit id + PDU. Transaction ids increment
/// per request and responses are matched against the id in flight.
#[derive(Debug, Clone, Default)]
pub struct TcpFramer {
    next_transaction: u16,
}

impl TcpFramer {
    pub fn new() -> Self {
        Self { next_transaction: 0 }
    }

    /// Build a TCP request frame, returning the frame and its transaction id.
    pub fn encode(&mut self, unit_id: u8, pdu: &Pdu) -> Result<(Vec<u8>, u16)> {
        if pdu.is_empty() {
            return Err(ModbusError::invalid_request("Empty PDU"));
        }
        let transaction_id = self.next_transaction;
        self.next_transaction = self.next_transaction.wrapping_add(1);

        // Length field covers unit id + PDU
        let length = (pdu.len() + 1) as u16;
        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes()); // protocol id, always 0
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(pdu.as_slice());
        Ok((frame, transaction_id))
    }

    /// Parse the MBAP header of a response. Returns the transaction id and
    /// the number of body bytes (unit id + PDU) that follow.
    pub fn parse_header(&self, header: &[u8]) -> Result<(u16, usize)> {
        if header.len() != MBAP_HEADER_LEN {
            return Err(ModbusError::protocol(format!(
                "MBAP header must be {MBAP_HEADER_LEN} bytes, got {}",
                header.len()
            )));
        }
        let transaction_id = u16::from_be_bytes([header[0], header[1]]);
        let protocol_id = u16::from_be_bytes([header[2], header[3]]);
        if protocol_id != 0 {
            return Err(ModbusError::protocol(format!(
                "Invalid MBAP protocol id: {protocol_id}"
            )));
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if length < 2 || length > MAX_PDU_SIZE + 1 {
            return Err(ModbusError::protocol(format!(
                "Invalid MBAP length field: {length}"
            )));
        }
        // The unit id byte is part of the header read; length counts it too,
        // so length - 1 PDU bytes remain on the wire.
        Ok((transaction_id, length - 1))
    }

    /// Validate the response against the request's transaction id and unit,
    /// and extract the PDU. `header` is the 7-byte MBAP header, `body` the
    /// PDU bytes following it.
    pub fn decode(
        &self,
        expected_transaction: u16,
        expected_unit: u8,
        header: &[u8],
        body: &[u8],
    ) -> Result<Pdu> {
        let (transaction_id, pdu_len) = self.parse_header(header)?;
        if transaction_id != expected_transaction {
            tracing::debug!(
                expected = expected_transaction,
                got = transaction_id,
                "MBAP transaction id mismatch"
            );
            return Err(ModbusError::protocol(format!(
                "Transaction id mismatch: expected {expected_transaction}, got {transaction_id}"
            )));
        }
        let unit_id = header[6];
        if unit_id != expected_unit {
            return Err(ModbusError::protocol(format!(
                "Unit id mismatch: expected {expected_unit}, got {unit_id}"
            )));
        }
        if body.len() != pdu_len {
            return Err(ModbusError::protocol(format!(
                "MBAP body length mismatch: header says {pdu_len}, got {}",
                body.len()
            )));
        }
        Pdu::from_slice(body)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_crc16_reference_vector() {
        // FC03 read of one register at address 0, unit 1
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(&frame), 0x0A84);
    }

    #[test]
    fn test_rtu_encode_appends_crc_little_endian() {
        let pdu = Pdu::from_slice(&[0x03, 0x00, 0x00, 0x00, 0x01]).unwrap();
        let frame = RtuFramer::new().encode(0x01, &pdu).unwrap();
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn test_rtu_round_trip() {
        let framer = RtuFramer::new();
        let pdu = Pdu::from_slice(&[0x03, 0x02, 0x41, 0xC8]).unwrap();
        let frame = framer.encode(0x11, &pdu).unwrap();
        let decoded = framer.decode(0x11, &frame).unwrap();
        assert_eq!(decoded.as_slice(), pdu.as_slice());
    }

    #[test]
    fn test_rtu_decode_rejects_bad_crc() {
        let framer = RtuFramer::new();
        let pdu = Pdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
        let mut frame = framer.encode(0x01, &pdu).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(framer.decode(0x01, &frame).is_err());
    }

    #[test]
    fn test_rtu_decode_rejects_wrong_unit() {
        let framer = RtuFramer::new();
        let pdu = Pdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
        let frame = framer.encode(0x02, &pdu).unwrap();
        assert!(framer.decode(0x01, &frame).is_err());
    }

    #[test]
    fn test_tcp_encode_header_layout() {
        let mut framer = TcpFramer::new();
        let pdu = Pdu::from_slice(&[0x03, 0x00, 0x00, 0x00, 0x01]).unwrap();
        let (frame, tid) = framer.encode(0x11, &pdu).unwrap();

        assert_eq!(tid, 0);
        assert_eq!(&frame[0..2], &[0x00, 0x00]); // transaction id
        assert_eq!(&frame[2..4], &[0x00, 0x00]); // protocol id
        assert_eq!(&frame[4..6], &[0x00, 0x06]); // length = unit + pdu
        assert_eq!(frame[6], 0x11);
        assert_eq!(&frame[7..], pdu.as_slice());

        // Transaction ids increment per request
        let (_, tid2) = framer.encode(0x11, &pdu).unwrap();
        assert_eq!(tid2, 1);
    }

    #[test]
    fn test_tcp_transaction_id_wraps() {
        let mut framer = TcpFramer::new();
        framer.next_transaction = u16::MAX;
        let pdu = Pdu::from_slice(&[0x03, 0x00, 0x00, 0x00, 0x01]).unwrap();
        let (_, tid) = framer.encode(0x01, &pdu).unwrap();
        assert_eq!(tid, u16::MAX);
        let (_, tid) = framer.encode(0x01, &pdu).unwrap();
        assert_eq!(tid, 0);
    }

    #[test]
    fn test_tcp_round_trip() {
        let mut framer = TcpFramer::new();
        let pdu = Pdu::from_slice(&[0x03, 0x02, 0x41, 0xC8]).unwrap();
        let (frame, tid) = framer.encode(0x05, &pdu).unwrap();

        let (header, body) = frame.split_at(MBAP_HEADER_LEN);
        let decoded = framer.decode(tid, 0x05, header, body).unwrap();
        assert_eq!(decoded.as_slice(), pdu.as_slice());
    }

    #[test]
    fn test_tcp_decode_rejects_stale_transaction() {
        let mut framer = TcpFramer::new();
        let pdu = Pdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
        let (frame, tid) = framer.encode(0x01, &pdu).unwrap();
        let (header, body) = frame.split_at(MBAP_HEADER_LEN);
        assert!(framer.decode(tid.wrapping_add(1), 0x01, header, body).is_err());
    }

    #[test]
    fn test_tcp_parse_header_rejects_bad_protocol_id() {
        let framer = TcpFramer::new();
        let header = [0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0x01];
        assert!(framer.parse_header(&header).is_err());
    }

    #[test]
    fn test_tcp_parse_header_rejects_bad_length() {
        let framer = TcpFramer::new();
        let header = [0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01];
        assert!(framer.parse_header(&header).is_err());
        let header = [0x00, 0x01, 0x00, 0x00, 0xFF, 0xFF, 0x01];
        assert!(framer.parse_header(&header).is_err());
    }
}
