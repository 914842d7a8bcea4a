//! Register value codec
//!
//! Converts between raw 16-bit register words and engineering values:
//! data type interpretation, byte/word ordering for multi-register types
//! and the linear scaling (factor/offset) applied on top.

use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, Result};

/// Interpretation of one or two 16-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Bool,
}

impl DataType {
    /// Number of 16-bit registers the type occupies.
    pub fn word_count(&self) -> u16 {
        match self {
            Self::Int16 | Self::Uint16 | Self::Bool => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 => 2,
        }
    }
}

/// Byte order within each 16-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Word order for 32-bit types spanning two registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// High word in the lower-addressed register
    #[default]
    HighFirst,
    /// Low word in the lower-addressed register
    LowFirst,
}

/// Full layout of a register value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueLayout {
    pub data_type: DataType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub word_order: WordOrder,
}

impl ValueLayout {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            byte_order: ByteOrder::default(),
            word_order: WordOrder::default(),
        }
    }

    pub fn word_count(&self) -> u16 {
        self.data_type.word_count()
    }
}

fn apply_byte_order(word: u16, order: ByteOrder) -> u16 {
    match order {
        ByteOrder::Big => word,
        ByteOrder::Little => word.swap_bytes(),
    }
}

/// Assemble a 32-bit quantity from two registers according to the layout.
fn assemble_u32(words: &[u16], layout: &ValueLayout) -> u32 {
    let w0 = apply_byte_order(words[0], layout.byte_order);
    let w1 = apply_byte_order(words[1], layout.byte_order);
    let (high, low) = match layout.word_order {
        WordOrder::HighFirst => (w0, w1),
        WordOrder::LowFirst => (w1, w0),
    };
    ((high as u32) << 16) | (low as u32)
}

/// Split a 32-bit quantity into two registers according to the layout.
fn split_u32(value: u32, layout: &ValueLayout) -> [u16; 2] {
    let high = (value >> 16) as u16;
    let low = (value & 0xFFFF) as u16;
    let (w0, w1) = match layout.word_order {
        WordOrder::HighFirst => (high, low),
        WordOrder::LowFirst => (low, high),
    };
    [
        apply_byte_order(w0, layout.byte_order),
        apply_byte_order(w1, layout.byte_order),
    ]
}

/// Decode raw register words into the type's raw numeric value, before any
/// scaling. The slice length must match the layout's word count.
pub fn decode_raw(words: &[u16], layout: &ValueLayout) -> Result<f64> {
    if words.len() != layout.word_count() as usize {
        return Err(ModbusError::validation(format!(
            "Expected {} register(s) for {:?}, got {}",
            layout.word_count(),
            layout.data_type,
            words.len()
        )));
    }

    let raw = match layout.data_type {
        DataType::Uint16 => apply_byte_order(words[0], layout.byte_order) as f64,
        DataType::Int16 => apply_byte_order(words[0], layout.byte_order) as i16 as f64,
        DataType::Bool => {
            if apply_byte_order(words[0], layout.byte_order) != 0 {
                1.0
            } else {
                0.0
            }
        },
        DataType::Uint32 => assemble_u32(words, layout) as f64,
        DataType::Int32 => assemble_u32(words, layout) as i32 as f64,
        DataType::Float32 => f32::from_bits(assemble_u32(words, layout)) as f64,
    };
    Ok(raw)
}

/// Encode a raw numeric value (already descaled) into register words.
/// Integer types are range-checked against the target width.
pub fn encode_raw(raw: f64, layout: &ValueLayout) -> Result<Vec<u16>> {
    if !raw.is_finite() {
        return Err(ModbusError::range(format!(
            "Non-finite value {raw} cannot be encoded"
        )));
    }

    let words = match layout.data_type {
        DataType::Uint16 => {
            let v = raw.round();
            if v < 0.0 || v > u16::MAX as f64 {
                return Err(ModbusError::range(format!("{raw} out of range for UINT16")));
            }
            vec![apply_byte_order(v as u16, layout.byte_order)]
        },
        DataType::Int16 => {
            let v = raw.round();
            if v < i16::MIN as f64 || v > i16::MAX as f64 {
                return Err(ModbusError::range(format!("{raw} out of range for INT16")));
            }
            vec![apply_byte_order(v as i16 as u16, layout.byte_order)]
        },
        DataType::Bool => {
            let word = if raw != 0.0 { 1 } else { 0 };
            vec![apply_byte_order(word, layout.byte_order)]
        },
        DataType::Uint32 => {
            let v = raw.round();
            if v < 0.0 || v > u32::MAX as f64 {
                return Err(ModbusError::range(format!("{raw} out of range for UINT32")));
            }
            split_u32(v as u32, layout).to_vec()
        },
        DataType::Int32 => {
            let v = raw.round();
            if v < i32::MIN as f64 || v > i32::MAX as f64 {
                return Err(ModbusError::range(format!("{raw} out of range for INT32")));
            }
            split_u32(v as i32 as u32, layout).to_vec()
        },
        DataType::Float32 => split_u32((raw as f32).to_bits(), layout).to_vec(),
    };
    Ok(words)
}

/// Engineering value = raw * factor + offset.
pub fn apply_scaling(raw: f64, factor: f64, offset: f64) -> f64 {
    raw * factor + offset
}

/// Invert the linear scaling for writes: raw = (value - offset) / factor.
pub fn invert_scaling(value: f64, factor: f64, offset: f64) -> Result<f64> {
    if factor == 0.0 {
        return Err(ModbusError::validation("Scaling factor must be non-zero"));
    }
    Ok((value - offset) / factor)
}

/// Decode registers straight to the scaled engineering value.
pub fn decode_scaled(words: &[u16], layout: &ValueLayout, factor: f64, offset: f64) -> Result<f64> {
    Ok(apply_scaling(decode_raw(words, layout)?, factor, offset))
}

/// Encode a scaled engineering value to registers.
pub fn encode_scaled(
    value: f64,
    layout: &ValueLayout,
    factor: f64,
    offset: f64,
) -> Result<Vec<u16>> {
    encode_raw(invert_scaling(value, factor, offset)?, layout)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn layout(data_type: DataType, byte_order: ByteOrder, word_order: WordOrder) -> ValueLayout {
        ValueLayout {
            data_type,
            byte_order,
            word_order,
        }
    }

    #[test]
    fn test_float32_big_endian_high_first() {
        // 0x41C80000 = 25.0f32
        let l = layout(DataType::Float32, ByteOrder::Big, WordOrder::HighFirst);
        let raw = decode_raw(&[0x41C8, 0x0000], &l).unwrap();
        assert!((raw - 25.0).abs() < f64::EPSILON);

        let scaled = decode_scaled(&[0x41C8, 0x0000], &l, 0.1, 0.0).unwrap();
        assert!((scaled - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_float32_word_order_low_first() {
        let l = layout(DataType::Float32, ByteOrder::Big, WordOrder::LowFirst);
        let raw = decode_raw(&[0x0000, 0x41C8], &l).unwrap();
        assert!((raw - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_float32_little_endian_bytes() {
        // 0x41C8 byte-swapped is 0xC841
        let l = layout(DataType::Float32, ByteOrder::Little, WordOrder::HighFirst);
        let raw = decode_raw(&[0xC841, 0x0000], &l).unwrap();
        assert!((raw - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_int16_sign_extension() {
        let l = ValueLayout::new(DataType::Int16);
        assert_eq!(decode_raw(&[0xFFFE], &l).unwrap(), -2.0);
        assert_eq!(decode_raw(&[0x7FFF], &l).unwrap(), 32767.0);
    }

    #[test]
    fn test_int32_sign_extension() {
        let l = ValueLayout::new(DataType::Int32);
        assert_eq!(decode_raw(&[0xFFFF, 0xFFFF], &l).unwrap(), -1.0);
    }

    #[test]
    fn test_uint32_assembly() {
        let l = ValueLayout::new(DataType::Uint32);
        assert_eq!(decode_raw(&[0x0001, 0x0000], &l).unwrap(), 65536.0);

        let lf = layout(DataType::Uint32, ByteOrder::Big, WordOrder::LowFirst);
        assert_eq!(decode_raw(&[0x0000, 0x0001], &lf).unwrap(), 65536.0);
    }

    #[test]
    fn test_bool_decode() {
        let l = ValueLayout::new(DataType::Bool);
        assert_eq!(decode_raw(&[0x0000], &l).unwrap(), 0.0);
        assert_eq!(decode_raw(&[0x0001], &l).unwrap(), 1.0);
        assert_eq!(decode_raw(&[0xFF00], &l).unwrap(), 1.0);
    }

    #[test]
    fn test_word_count_mismatch_rejected() {
        let l = ValueLayout::new(DataType::Float32);
        assert!(decode_raw(&[0x41C8], &l).is_err());
        let l = ValueLayout::new(DataType::Int16);
        assert!(decode_raw(&[0x0001, 0x0002], &l).is_err());
    }

    #[test]
    fn test_encode_round_trips() {
        for (dt, value) in [
            (DataType::Int16, -123.0),
            (DataType::Uint16, 40000.0),
            (DataType::Int32, -100000.0),
            (DataType::Uint32, 3000000000.0),
            (DataType::Float32, 2.5),
            (DataType::Bool, 1.0),
        ] {
            let l = ValueLayout::new(dt);
            let words = encode_raw(value, &l).unwrap();
            assert_eq!(words.len(), l.word_count() as usize);
            let back = decode_raw(&words, &l).unwrap();
            assert!((back - value).abs() < 1e-6, "{dt:?}: {back} != {value}");
        }
    }

    #[test]
    fn test_encode_range_checks() {
        assert!(encode_raw(70000.0, &ValueLayout::new(DataType::Uint16)).is_err());
        assert!(encode_raw(-1.0, &ValueLayout::new(DataType::Uint16)).is_err());
        assert!(encode_raw(40000.0, &ValueLayout::new(DataType::Int16)).is_err());
        assert!(encode_raw(f64::NAN, &ValueLayout::new(DataType::Float32)).is_err());
        assert!(encode_raw(f64::INFINITY, &ValueLayout::new(DataType::Uint32)).is_err());
    }

    #[test]
    fn test_scaling_and_inverse() {
        assert_eq!(apply_scaling(250.0, 0.1, -5.0), 20.0);
        let raw = invert_scaling(20.0, 0.1, -5.0).unwrap();
        assert!((raw - 250.0).abs() < 1e-9);
        assert!(invert_scaling(1.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_encode_scaled_write_path() {
        // Write 2.5 degrees with factor 0.1 -> raw 25.0 -> 0x41C80000
        let l = ValueLayout::new(DataType::Float32);
        let words = encode_scaled(2.5, &l, 0.1, 0.0).unwrap();
        assert_eq!(words, vec![0x41C8, 0x0000]);
    }

    #[test]
    fn test_layout_serde_names() {
        let yaml = "data_type: float32\nbyte_order: little\nword_order: low_first\n";
        let l: ValueLayout = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(l.data_type, DataType::Float32);
        assert_eq!(l.byte_order, ByteOrder::Little);
        assert_eq!(l.word_order, WordOrder::LowFirst);

        // Orders default when omitted
        let l: ValueLayout = serde_yaml::from_str("data_type: int16\n").unwrap();
        assert_eq!(l.byte_order, ByteOrder::Big);
        assert_eq!(l.word_order, WordOrder::HighFirst);
    }
}
