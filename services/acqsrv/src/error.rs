//! Service error types
//!
//! Single error enum for the acquisition service. Codec and formula errors
//! from the library crates are mapped into it at the boundary so callers
//! see one taxonomy.

use gridlink_calc::CalcError;
use gridlink_modbus::{ExceptionCode, ModbusError};
use thiserror::Error;

/// Acquisition service error type
#[derive(Error, Debug)]
pub enum AcqError {
    /// Transport could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// No response within the interface timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or inconsistent response frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed Modbus exception from the device
    #[error("Device exception: {0}")]
    DeviceException(ExceptionCode),

    /// Configuration or request fails validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Value out of range for the target data type
    #[error("Range error: {0}")]
    Range(String),

    /// Write attempted on a read-only register
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Formula compilation or evaluation failed
    #[error("Formula error: {0}")]
    Formula(String),

    /// Configuration file could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// Unknown interface, device, register or alarm id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bug guard for states that should be unreachable
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AcqError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn formula(msg: impl Into<String>) -> Self {
        Self::Formula(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error indicates the connection should be torn down and
    /// re-established before the next request.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::Io(_))
    }
}

impl From<ModbusError> for AcqError {
    fn from(err: ModbusError) -> Self {
        match err {
            ModbusError::InvalidRequest(msg) => Self::Validation(msg),
            ModbusError::Protocol(msg) => Self::Protocol(msg),
            ModbusError::Exception(code) => Self::DeviceException(code),
            ModbusError::Range(msg) => Self::Range(msg),
            ModbusError::Validation(msg) => Self::Validation(msg),
        }
    }
}

impl From<CalcError> for AcqError {
    fn from(err: CalcError) -> Self {
        Self::Formula(err.to_string())
    }
}

/// Result type alias for the service
pub type AcqResult<T> = std::result::Result<T, AcqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_error_mapping() {
        let err: AcqError = ModbusError::Exception(ExceptionCode::DeviceBusy).into();
        assert!(matches!(
            err,
            AcqError::DeviceException(ExceptionCode::DeviceBusy)
        ));

        let err: AcqError = ModbusError::protocol("bad frame").into();
        assert!(matches!(err, AcqError::Protocol(_)));
    }

    #[test]
    fn test_calc_error_mapping() {
        let err: AcqError = CalcError::DivisionByZero.into();
        assert!(matches!(err, AcqError::Formula(_)));
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(AcqError::timeout("no response").is_connection_fatal());
        assert!(AcqError::connection("refused").is_connection_fatal());
        assert!(!AcqError::DeviceException(ExceptionCode::IllegalFunction).is_connection_fatal());
        assert!(!AcqError::permission("read only").is_connection_fatal());
    }
}
