//! Error types for the Modbus codec layer

use thiserror::Error;

/// Modbus exception codes returned by a slave device (PDU byte 2 of an
/// exception response).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 0x01 - Function code not supported by the device
    IllegalFunction,
    /// 0x02 - Register address not valid for the device
    IllegalDataAddress,
    /// 0x03 - Value in the request not acceptable
    IllegalDataValue,
    /// 0x04 - Unrecoverable error while servicing the request
    DeviceFailure,
    /// 0x05 - Request accepted, long-running processing in progress
    Acknowledge,
    /// 0x06 - Device busy with a long-running command
    DeviceBusy,
    /// 0x08 - Memory parity error on extended file access
    MemoryParityError,
    /// 0x0A - Gateway could not allocate a path
    GatewayPathUnavailable,
    /// 0x0B - Gateway target did not respond
    GatewayTargetFailed,
    /// Any code outside the standard set
    Other(u8),
}

impl ExceptionCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::DeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::DeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetFailed,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::DeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::DeviceBusy => 0x06,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetFailed => 0x0B,
            Self::Other(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::DeviceFailure => "Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::DeviceBusy => "Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetFailed => "Gateway Target Device Failed to Respond",
            Self::Other(_) => "Unknown Exception",
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.code())
    }
}

/// Modbus codec error type
#[derive(Error, Debug, Clone)]
pub enum ModbusError {
    /// Request could not be encoded (bad quantity, unsupported function code)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed frame, CRC mismatch or transaction ID mismatch
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Valid Modbus exception response from the device
    #[error("Device exception: {0}")]
    Exception(ExceptionCode),

    /// Value does not fit the target data type
    #[error("Range error: {0}")]
    Range(String),

    /// Register configuration is inconsistent (word count, factor)
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ModbusError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type alias for the codec layer
pub type Result<T> = std::result::Result<T, ModbusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_round_trip() {
        for code in [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x08, 0x0A, 0x0B] {
            assert_eq!(ExceptionCode::from_code(code).code(), code);
        }
        assert_eq!(ExceptionCode::from_code(0x7F), ExceptionCode::Other(0x7F));
    }

    #[test]
    fn test_exception_display() {
        let exc = ExceptionCode::IllegalDataAddress;
        assert_eq!(exc.to_string(), "Illegal Data Address (0x02)");
    }
}
