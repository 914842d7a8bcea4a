//! GridLink Modbus codec library
//!
//! Protocol-level building blocks shared by the acquisition service:
//! PDU construction for the supported function codes, RTU and TCP frame
//! codecs, and the register value codec (data types, byte/word ordering,
//! linear scaling). Everything here is synchronous and I/O-free; the
//! transports that move frames over sockets and serial ports live in the
//! service crate.

pub mod codec;
pub mod error;
pub mod frame;
pub mod pdu;
pub mod value;

pub use codec::{
    build_read_request, build_write_multiple_coils, build_write_multiple_registers,
    build_write_single_coil, build_write_single_register, parse_bit_response,
    parse_register_response, parse_write_response, MAX_READ_COILS, MAX_READ_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
pub use error::{ExceptionCode, ModbusError, Result};
pub use frame::{crc16, RtuFramer, TcpFramer, MAX_RTU_FRAME_LEN, MBAP_HEADER_LEN};
pub use pdu::{Pdu, MAX_PDU_SIZE};
pub use value::{
    apply_scaling, decode_raw, decode_scaled, encode_raw, encode_scaled, invert_scaling,
    ByteOrder, DataType, ValueLayout, WordOrder,
};
