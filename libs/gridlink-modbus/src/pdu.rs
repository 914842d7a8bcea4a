//! Modbus PDU data structure
//!
//! Fixed-size stack buffer for the protocol data unit (function code plus
//! payload), shared by the request builders and the frame codecs.

use crate::error::{ModbusError, Result};

/// Maximum PDU size per the Modbus specification (253 bytes:
/// 256-byte RTU frame minus address and CRC).
pub const MAX_PDU_SIZE: usize = 253;

/// Protocol data unit backed by a fixed stack array.
#[derive(Debug, Clone)]
pub struct Pdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl Pdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PDU_SIZE {
            return Err(ModbusError::protocol(format!(
                "PDU too large: {} bytes (max {})",
                bytes.len(),
                MAX_PDU_SIZE
            )));
        }
        let mut pdu = Self::new();
        pdu.data[..bytes.len()].copy_from_slice(bytes);
        pdu.len = bytes.len();
        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::protocol("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push a u16 in big-endian order
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)
    }

    /// Extend with a byte slice
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        if self.len + bytes.len() > MAX_PDU_SIZE {
            return Err(ModbusError::protocol(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                bytes.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Function code (first byte), if present
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Whether this PDU is an exception response (high bit of the
    /// function code set)
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code().is_some_and(|fc| fc & 0x80 != 0)
    }

    /// Exception code byte of an exception response
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }
}

impl Default for Pdu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_pdu_basic_operations() {
        let mut pdu = Pdu::new();
        assert!(pdu.is_empty());

        pdu.push(0x03).unwrap();
        pdu.push_u16(0x0100).unwrap();
        pdu.push_u16(0x000A).unwrap();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
        assert_eq!(pdu.function_code(), Some(0x03));
        assert!(!pdu.is_exception());
    }

    #[test]
    fn test_pdu_exception_detection() {
        let pdu = Pdu::from_slice(&[0x83, 0x02]).unwrap();
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));

        let normal = Pdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
        assert!(!normal.is_exception());
        assert_eq!(normal.exception_code(), None);
    }

    #[test]
    fn test_pdu_overflow() {
        let mut pdu = Pdu::new();
        assert!(pdu.extend(&vec![0xFF; MAX_PDU_SIZE + 1]).is_err());

        pdu.extend(&vec![0xAA; MAX_PDU_SIZE]).unwrap();
        assert!(pdu.push(0x00).is_err());
    }

    #[test]
    fn test_pdu_from_slice_preserves_content() {
        let bytes = [0x10, 0x01, 0x00, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02];
        let pdu = Pdu::from_slice(&bytes).unwrap();
        assert_eq!(pdu.as_slice(), &bytes);
    }

    #[test]
    fn test_pdu_extend_failure_leaves_content_unchanged() {
        let mut pdu = Pdu::new();
        pdu.extend(&[0x01, 0x02]).unwrap();
        assert!(pdu.extend(&vec![0xFF; MAX_PDU_SIZE]).is_err());
        assert_eq!(pdu.as_slice(), &[0x01, 0x02]);
    }
}
