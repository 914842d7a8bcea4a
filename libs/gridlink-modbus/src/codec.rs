//! Modbus request building and response parsing
//!
//! Pure translation between typed read/write operations and PDU bytes for
//! function codes 1-6, 15 and 16. No I/O happens here.

use crate::error::{ExceptionCode, ModbusError, Result};
use crate::pdu::Pdu;

/// Protocol limits per the Modbus application specification.
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: u16 = 123;
pub const MAX_READ_COILS: u16 = 2000;
pub const MAX_WRITE_COILS: u16 = 1968;

/// Build a read request PDU (FC 01/02/03/04).
pub fn build_read_request(function_code: u8, start_address: u16, quantity: u16) -> Result<Pdu> {
    let max = match function_code {
        0x01 | 0x02 => MAX_READ_COILS,
        0x03 | 0x04 => MAX_READ_REGISTERS,
        other => {
            return Err(ModbusError::invalid_request(format!(
                "Unsupported read function code: {other:#04X}"
            )))
        },
    };
    if quantity == 0 || quantity > max {
        return Err(ModbusError::invalid_request(format!(
            "Invalid quantity {quantity} for FC{function_code:02} (max {max})"
        )));
    }
    if start_address.checked_add(quantity - 1).is_none() {
        return Err(ModbusError::invalid_request(format!(
            "Address range {start_address}+{quantity} exceeds 0xFFFF"
        )));
    }

    let mut pdu = Pdu::new();
    pdu.push(function_code)?;
    pdu.push_u16(start_address)?;
    pdu.push_u16(quantity)?;
    Ok(pdu)
}

/// Build a single-coil write PDU (FC 05). On-value is 0xFF00 per spec.
pub fn build_write_single_coil(address: u16, value: bool) -> Result<Pdu> {
    let mut pdu = Pdu::new();
    pdu.push(0x05)?;
    pdu.push_u16(address)?;
    pdu.push_u16(if value { 0xFF00 } else { 0x0000 })?;
    Ok(pdu)
}

/// Build a single-register write PDU (FC 06).
pub fn build_write_single_register(address: u16, value: u16) -> Result<Pdu> {
    let mut pdu = Pdu::new();
    pdu.push(0x06)?;
    pdu.push_u16(address)?;
    pdu.push_u16(value)?;
    Ok(pdu)
}

/// Build a multiple-coils write PDU (FC 15), packing values LSB-first.
pub fn build_write_multiple_coils(start_address: u16, values: &[bool]) -> Result<Pdu> {
    if values.is_empty() || values.len() > MAX_WRITE_COILS as usize {
        return Err(ModbusError::invalid_request(format!(
            "Invalid coil count {} for FC15 (max {})",
            values.len(),
            MAX_WRITE_COILS
        )));
    }

    let mut pdu = Pdu::new();
    pdu.push(0x0F)?;
    pdu.push_u16(start_address)?;
    pdu.push_u16(values.len() as u16)?;
    pdu.push(values.len().div_ceil(8) as u8)?;

    let mut current = 0u8;
    let mut bit = 0;
    for &value in values {
        if value {
            current |= 1 << bit;
        }
        bit += 1;
        if bit == 8 {
            pdu.push(current)?;
            current = 0;
            bit = 0;
        }
    }
    if bit > 0 {
        pdu.push(current)?;
    }
    Ok(pdu)
}

/// Build a multiple-registers write PDU (FC 16).
pub fn build_write_multiple_registers(start_address: u16, values: &[u16]) -> Result<Pdu> {
    if values.is_empty() || values.len() > MAX_WRITE_REGISTERS as usize {
        return Err(ModbusError::invalid_request(format!(
            "Invalid register count {} for FC16 (max {})",
            values.len(),
            MAX_WRITE_REGISTERS
        )));
    }

    let mut pdu = Pdu::new();
    pdu.push(0x10)?;
    pdu.push_u16(start_address)?;
    pdu.push_u16(values.len() as u16)?;
    pdu.push((values.len() * 2) as u8)?;
    for &value in values {
        pdu.push_u16(value)?;
    }
    Ok(pdu)
}

/// Map an exception PDU to its typed error, or pass through.
fn check_exception(pdu: &Pdu, expected_fc: u8) -> Result<()> {
    if pdu.is_exception() {
        let code = pdu.exception_code().unwrap_or(0);
        return Err(ModbusError::Exception(ExceptionCode::from_code(code)));
    }
    match pdu.function_code() {
        Some(fc) if fc == expected_fc => Ok(()),
        Some(fc) => Err(ModbusError::protocol(format!(
            "Function code mismatch: expected {expected_fc:#04X}, got {fc:#04X}"
        ))),
        None => Err(ModbusError::protocol("Empty response PDU")),
    }
}

/// Parse a register read response (FC 03/04) into 16-bit words.
pub fn parse_register_response(pdu: &Pdu, expected_fc: u8, expected_count: u16) -> Result<Vec<u16>> {
    check_exception(pdu, expected_fc)?;

    let data = pdu.as_slice();
    if data.len() < 2 {
        return Err(ModbusError::protocol("Register response too short"));
    }
    let byte_count = data[1] as usize;
    let payload = &data[2..];
    if payload.len() != byte_count || byte_count != expected_count as usize * 2 {
        return Err(ModbusError::protocol(format!(
            "Register response length mismatch: byte_count={}, payload={}, expected {} registers",
            byte_count,
            payload.len(),
            expected_count
        )));
    }

    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Parse a coil/discrete-input read response (FC 01/02) into booleans.
pub fn parse_bit_response(pdu: &Pdu, expected_fc: u8, expected_count: u16) -> Result<Vec<bool>> {
    check_exception(pdu, expected_fc)?;

    let data = pdu.as_slice();
    if data.len() < 2 {
        return Err(ModbusError::protocol("Bit response too short"));
    }
    let byte_count = data[1] as usize;
    let payload = &data[2..];
    if payload.len() != byte_count || byte_count < (expected_count as usize).div_ceil(8) {
        return Err(ModbusError::protocol(format!(
            "Bit response length mismatch: byte_count={}, expected {} bits",
            byte_count, expected_count
        )));
    }

    let mut bits = Vec::with_capacity(expected_count as usize);
    for i in 0..expected_count as usize {
        let byte = payload[i / 8];
        bits.push(byte & (1 << (i % 8)) != 0);
    }
    Ok(bits)
}

/// Parse a write response (FC 05/06/15/16). The echo of address and
/// value/quantity must match the request.
pub fn parse_write_response(pdu: &Pdu, expected_fc: u8, address: u16) -> Result<()> {
    check_exception(pdu, expected_fc)?;

    let data = pdu.as_slice();
    if data.len() < 5 {
        return Err(ModbusError::protocol("Write response too short"));
    }
    let echoed = u16::from_be_bytes([data[1], data[2]]);
    if echoed != address {
        return Err(ModbusError::protocol(format!(
            "Write echo address mismatch: expected {address}, got {echoed}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_build_read_request_fc03() {
        let pdu = build_read_request(0x03, 0x0100, 10).unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_build_read_request_limits() {
        assert!(build_read_request(0x03, 0, MAX_READ_REGISTERS).is_ok());
        assert!(build_read_request(0x03, 0, MAX_READ_REGISTERS + 1).is_err());
        assert!(build_read_request(0x01, 0, MAX_READ_COILS).is_ok());
        assert!(build_read_request(0x01, 0, MAX_READ_COILS + 1).is_err());
        assert!(build_read_request(0x03, 0, 0).is_err());
        // FC 07 is not a read function
        assert!(build_read_request(0x07, 0, 1).is_err());
    }

    #[test]
    fn test_build_read_request_address_overflow() {
        assert!(build_read_request(0x03, 0xFFFE, 3).is_err());
        assert!(build_read_request(0x03, 0xFFFE, 2).is_ok());
    }

    #[test]
    fn test_build_write_single_coil_values() {
        let on = build_write_single_coil(0x0010, true).unwrap();
        assert_eq!(on.as_slice(), &[0x05, 0x00, 0x10, 0xFF, 0x00]);

        let off = build_write_single_coil(0x0010, false).unwrap();
        assert_eq!(off.as_slice(), &[0x05, 0x00, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn test_build_write_single_register() {
        let pdu = build_write_single_register(0x0001, 0x0003).unwrap();
        assert_eq!(pdu.as_slice(), &[0x06, 0x00, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn test_build_write_multiple_coils_bit_packing() {
        // 10 coils: 1,1,0,0,1,1,0,1 | 0,1 -> 0xB3, 0x02 (LSB first)
        let values = [true, true, false, false, true, true, false, true, false, true];
        let pdu = build_write_multiple_coils(0x0013, &values).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xB3, 0x02]
        );
    }

    #[test]
    fn test_build_write_multiple_registers() {
        let pdu = build_write_multiple_registers(0x0001, &[0x000A, 0x0102]).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn test_build_write_limits() {
        let too_many = vec![0u16; MAX_WRITE_REGISTERS as usize + 1];
        assert!(build_write_multiple_registers(0, &too_many).is_err());
        let too_many_coils = vec![false; MAX_WRITE_COILS as usize + 1];
        assert!(build_write_multiple_coils(0, &too_many_coils).is_err());
        assert!(build_write_multiple_registers(0, &[]).is_err());
    }

    #[test]
    fn test_parse_register_response() {
        let pdu = Pdu::from_slice(&[0x03, 0x04, 0x41, 0xC8, 0x00, 0x00]).unwrap();
        let words = parse_register_response(&pdu, 0x03, 2).unwrap();
        assert_eq!(words, vec![0x41C8, 0x0000]);
    }

    #[test]
    fn test_parse_register_response_count_mismatch() {
        let pdu = Pdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
        assert!(parse_register_response(&pdu, 0x03, 2).is_err());
    }

    #[test]
    fn test_parse_register_response_exception() {
        let pdu = Pdu::from_slice(&[0x83, 0x02]).unwrap();
        let err = parse_register_response(&pdu, 0x03, 1).unwrap_err();
        match err {
            ModbusError::Exception(code) => {
                assert_eq!(code, ExceptionCode::IllegalDataAddress)
            },
            other => panic!("Expected exception, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bit_response() {
        // 10 bits in 2 bytes, LSB-first
        let pdu = Pdu::from_slice(&[0x01, 0x02, 0xB3, 0x02]).unwrap();
        let bits = parse_bit_response(&pdu, 0x01, 10).unwrap();
        assert_eq!(
            bits,
            vec![true, true, false, false, true, true, false, true, false, true]
        );
    }

    #[test]
    fn test_parse_write_response_echo() {
        let pdu = Pdu::from_slice(&[0x06, 0x00, 0x01, 0x00, 0x03]).unwrap();
        assert!(parse_write_response(&pdu, 0x06, 0x0001).is_ok());
        assert!(parse_write_response(&pdu, 0x06, 0x0002).is_err());
    }

    #[test]
    fn test_parse_write_response_function_mismatch() {
        let pdu = Pdu::from_slice(&[0x10, 0x00, 0x01, 0x00, 0x02]).unwrap();
        assert!(parse_write_response(&pdu, 0x06, 0x0001).is_err());
    }
}
