//! Register and bit decoding.
//!
//! Pure functions turning raw Modbus payloads into numeric values. Index
//! arguments always address an *encoded element*, not a raw register:
//!
//! | encoding | element `i` reads |
//! |---|---|
//! | `bit` | bit `i % 16` (LSB first) of register `i / 16` |
//! | `int8`, `uint8` | low byte of register `i / 2` when `i` is even, high byte when odd |
//! | `int16`, `uint16` | register `i` |
//! | `int32`, `uint32`, `float32` | registers `i` (high word) and `i + 1` (low word) |
//! | `*_swap` | registers `i + 1` (high word) and `i` (low word) |
//!
//! Every register is big-endian within itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::value::{CommandValue, OnOff, OpenClosed};

/// Decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The element needs data past the end of the supplied payload.
    #[error("{encoding} element {index} is out of range: payload holds only {available} element(s)")]
    OutOfRange {
        encoding: ValueEncoding,
        index: usize,
        available: usize,
    },

    /// The encoding name is not one of the supported value types.
    #[error("Unknown value type '{0}'")]
    UnknownEncoding(String),
}

/// A single 16-bit register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Register(u16);

impl Register {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// The two bytes of the register, most significant first.
    pub fn bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub fn to_unsigned(self) -> u16 {
        self.0
    }
}

impl From<u16> for Register {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Registers returned by a read of input or holding registers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterArray {
    registers: Vec<Register>,
}

impl RegisterArray {
    pub fn new(words: impl IntoIterator<Item = u16>) -> Self {
        Self {
            registers: words.into_iter().map(Register::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Register at zero-based `index`, if present.
    pub fn get(&self, index: usize) -> Option<Register> {
        self.registers.get(index).copied()
    }

    fn fetch(
        &self,
        offset: Option<usize>,
        encoding: ValueEncoding,
        index: usize,
    ) -> Result<Register, DecodeError> {
        offset
            .and_then(|offset| self.get(offset))
            .ok_or(DecodeError::OutOfRange {
                encoding,
                index,
                available: self.len(),
            })
    }
}

impl From<Vec<u16>> for RegisterArray {
    fn from(words: Vec<u16>) -> Self {
        Self::new(words)
    }
}

impl From<&[u16]> for RegisterArray {
    fn from(words: &[u16]) -> Self {
        Self::new(words.iter().copied())
    }
}

/// Bits returned by a read of coils or discrete inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitArray {
    bits: Vec<bool>,
}

impl BitArray {
    pub fn new(bits: impl IntoIterator<Item = bool>) -> Self {
        Self {
            bits: bits.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bit at zero-based `index`, if present.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }
}

impl From<Vec<bool>> for BitArray {
    fn from(bits: Vec<bool>) -> Self {
        Self { bits }
    }
}

/// How a value is laid out in the register space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueEncoding {
    Bit,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Int32Swap,
    Uint32Swap,
    Float32Swap,
}

impl ValueEncoding {
    /// Every supported encoding.
    pub const ALL: [ValueEncoding; 11] = [
        ValueEncoding::Bit,
        ValueEncoding::Int8,
        ValueEncoding::Uint8,
        ValueEncoding::Int16,
        ValueEncoding::Uint16,
        ValueEncoding::Int32,
        ValueEncoding::Uint32,
        ValueEncoding::Float32,
        ValueEncoding::Int32Swap,
        ValueEncoding::Uint32Swap,
        ValueEncoding::Float32Swap,
    ];

    /// Configuration name of the encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueEncoding::Bit => "bit",
            ValueEncoding::Int8 => "int8",
            ValueEncoding::Uint8 => "uint8",
            ValueEncoding::Int16 => "int16",
            ValueEncoding::Uint16 => "uint16",
            ValueEncoding::Int32 => "int32",
            ValueEncoding::Uint32 => "uint32",
            ValueEncoding::Float32 => "float32",
            ValueEncoding::Int32Swap => "int32_swap",
            ValueEncoding::Uint32Swap => "uint32_swap",
            ValueEncoding::Float32Swap => "float32_swap",
        }
    }

    /// Width of one element in bits.
    pub fn bit_width(&self) -> u32 {
        match self {
            ValueEncoding::Bit => 1,
            ValueEncoding::Int8 | ValueEncoding::Uint8 => 8,
            ValueEncoding::Int16 | ValueEncoding::Uint16 => 16,
            ValueEncoding::Int32
            | ValueEncoding::Uint32
            | ValueEncoding::Float32
            | ValueEncoding::Int32Swap
            | ValueEncoding::Uint32Swap
            | ValueEncoding::Float32Swap => 32,
        }
    }

    /// Number of registers one element spans, never less than one.
    pub fn register_count(&self) -> usize {
        std::cmp::max(1, self.bit_width() / 16) as usize
    }

    /// Whether the two 16-bit words are taken low word first.
    pub fn is_word_swapped(&self) -> bool {
        matches!(
            self,
            ValueEncoding::Int32Swap | ValueEncoding::Uint32Swap | ValueEncoding::Float32Swap
        )
    }
}

impl fmt::Display for ValueEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueEncoding {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueEncoding::ALL
            .into_iter()
            .find(|encoding| encoding.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownEncoding(s.to_string()))
    }
}

/// Canonical numeric result of a decode.
///
/// `Float` holds decoded `float32` values, `Double` holds values derived by
/// transformations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NumericValue {
    Integer(i64),
    Float(f32),
    Double(f64),
}

impl NumericValue {
    pub fn is_zero(&self) -> bool {
        match self {
            NumericValue::Integer(v) => *v == 0,
            NumericValue::Float(v) => *v == 0.0,
            NumericValue::Double(v) => *v == 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            NumericValue::Integer(v) => *v as f64,
            NumericValue::Float(v) => f64::from(*v),
            NumericValue::Double(v) => *v,
        }
    }
}

/// Canonical string form, used for trigger matching and map lookups.
impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericValue::Integer(v) => write!(f, "{}", v),
            NumericValue::Float(v) => write!(f, "{}", v),
            NumericValue::Double(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for NumericValue {
    fn from(v: i64) -> Self {
        NumericValue::Integer(v)
    }
}

impl From<f32> for NumericValue {
    fn from(v: f32) -> Self {
        NumericValue::Float(v)
    }
}

/// Decode element `index` of `registers` using `encoding`.
pub fn decode_numeric(
    registers: &RegisterArray,
    index: usize,
    encoding: ValueEncoding,
) -> Result<NumericValue, DecodeError> {
    let fetch = |offset: Option<usize>| registers.fetch(offset, encoding, index);

    let value = match encoding {
        ValueEncoding::Bit => {
            let register = fetch(Some(index / 16))?;
            NumericValue::Integer(i64::from((register.to_unsigned() >> (index % 16)) & 1))
        }
        ValueEncoding::Int8 => {
            let register = fetch(Some(index / 2))?;
            let byte = register.bytes()[1 - index % 2];
            NumericValue::Integer(i64::from(byte as i8))
        }
        ValueEncoding::Uint8 => {
            let register = fetch(Some(index / 2))?;
            NumericValue::Integer(i64::from(
                (register.to_unsigned() >> (8 * (index % 2))) & 0xff,
            ))
        }
        ValueEncoding::Int16 => {
            let register = fetch(Some(index))?;
            NumericValue::Integer(i64::from(i16::from_be_bytes(register.bytes())))
        }
        ValueEncoding::Uint16 => {
            let register = fetch(Some(index))?;
            NumericValue::Integer(i64::from(register.to_unsigned()))
        }
        ValueEncoding::Int32
        | ValueEncoding::Uint32
        | ValueEncoding::Float32
        | ValueEncoding::Int32Swap
        | ValueEncoding::Uint32Swap
        | ValueEncoding::Float32Swap => {
            let (high, low) = if encoding.is_word_swapped() {
                (index.checked_add(1), Some(index))
            } else {
                (Some(index), index.checked_add(1))
            };
            let high = fetch(high)?.bytes();
            let low = fetch(low)?.bytes();
            let bytes = [high[0], high[1], low[0], low[1]];

            match encoding {
                ValueEncoding::Int32 | ValueEncoding::Int32Swap => {
                    NumericValue::Integer(i64::from(i32::from_be_bytes(bytes)))
                }
                ValueEncoding::Uint32 | ValueEncoding::Uint32Swap => {
                    NumericValue::Integer(i64::from(u32::from_be_bytes(bytes)))
                }
                _ => NumericValue::Float(f32::from_be_bytes(bytes)),
            }
        }
    };

    Ok(value)
}

/// Decode using an encoding given by its configuration name.
pub fn decode_named(
    registers: &RegisterArray,
    index: usize,
    encoding: &str,
) -> Result<NumericValue, DecodeError> {
    decode_numeric(registers, index, encoding.parse()?)
}

/// Boolean to write for a command addressed to a coil.
///
/// Returns `None` for commands that carry no boolean meaning; nothing must
/// be written in that case.
pub fn command_to_boolean_intent(command: &CommandValue) -> Option<bool> {
    match command {
        CommandValue::OnOff(OnOff::On) | CommandValue::OpenClosed(OpenClosed::Open) => Some(true),
        CommandValue::OnOff(OnOff::Off) | CommandValue::OpenClosed(OpenClosed::Closed) => {
            Some(false)
        }
        CommandValue::Decimal(value) => Some(!value.is_zero()),
        CommandValue::Text(_) | CommandValue::Refresh => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs(words: &[u16]) -> RegisterArray {
        RegisterArray::from(words)
    }

    #[test]
    fn test_int32_and_swap_example() {
        let registers = regs(&[0x0001, 0x0002]);

        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Int32).unwrap(),
            NumericValue::Integer(65538)
        );
        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Int32Swap).unwrap(),
            NumericValue::Integer(131073)
        );
    }

    #[test]
    fn test_int8_low_byte_first() {
        let registers = regs(&[0x00FF]);

        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Int8).unwrap(),
            NumericValue::Integer(-1)
        );
        assert_eq!(
            decode_numeric(&registers, 1, ValueEncoding::Int8).unwrap(),
            NumericValue::Integer(0)
        );
    }

    #[test]
    fn test_uint8() {
        let registers = regs(&[0x1234, 0xABFE]);

        let values: Vec<_> = (0..4)
            .map(|i| decode_numeric(&registers, i, ValueEncoding::Uint8).unwrap())
            .collect();
        assert_eq!(
            values,
            vec![
                NumericValue::Integer(0x34),
                NumericValue::Integer(0x12),
                NumericValue::Integer(0xFE),
                NumericValue::Integer(0xAB),
            ]
        );
        assert_eq!(
            decode_numeric(&registers, 2, ValueEncoding::Int8).unwrap(),
            NumericValue::Integer(-2)
        );
    }

    #[test]
    fn test_bit_lsb_first() {
        let registers = regs(&[0b0000_0000_0000_0101, 0x8000]);

        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Bit).unwrap(),
            NumericValue::Integer(1)
        );
        assert_eq!(
            decode_numeric(&registers, 1, ValueEncoding::Bit).unwrap(),
            NumericValue::Integer(0)
        );
        assert_eq!(
            decode_numeric(&registers, 2, ValueEncoding::Bit).unwrap(),
            NumericValue::Integer(1)
        );
        assert_eq!(
            decode_numeric(&registers, 31, ValueEncoding::Bit).unwrap(),
            NumericValue::Integer(1)
        );
        assert_eq!(
            decode_numeric(&registers, 16, ValueEncoding::Bit).unwrap(),
            NumericValue::Integer(0)
        );
    }

    #[test]
    fn test_16bit_signedness() {
        let registers = regs(&[0xFFFE]);

        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Int16).unwrap(),
            NumericValue::Integer(-2)
        );
        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Uint16).unwrap(),
            NumericValue::Integer(65534)
        );
    }

    #[test]
    fn test_uint32_does_not_overflow() {
        let registers = regs(&[0xFFFF, 0xFFFF]);

        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Uint32).unwrap(),
            NumericValue::Integer(4_294_967_295)
        );
        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Int32).unwrap(),
            NumericValue::Integer(-1)
        );
    }

    #[test]
    fn test_float32_big_endian_and_swapped() {
        // 123.456 in IEEE 754 = 0x42F6E979
        let registers = regs(&[0x42F6, 0xE979]);
        let NumericValue::Float(value) =
            decode_numeric(&registers, 0, ValueEncoding::Float32).unwrap()
        else {
            panic!("expected a float");
        };
        assert!((value - 123.456).abs() < 0.001);

        let swapped = regs(&[0xE979, 0x42F6]);
        assert_eq!(
            decode_numeric(&swapped, 0, ValueEncoding::Float32Swap).unwrap(),
            NumericValue::Float(value)
        );
    }

    #[test]
    fn test_32bit_uses_element_index_as_register_index() {
        let registers = regs(&[0xAAAA, 0x0000, 0x0010, 0xBBBB]);
        assert_eq!(
            decode_numeric(&registers, 1, ValueEncoding::Uint32).unwrap(),
            NumericValue::Integer(0x10)
        );
    }

    #[test]
    fn test_out_of_range() {
        let registers = regs(&[0x0001]);

        assert_eq!(
            decode_numeric(&registers, 0, ValueEncoding::Int32),
            Err(DecodeError::OutOfRange {
                encoding: ValueEncoding::Int32,
                index: 0,
                available: 1,
            })
        );
        assert!(decode_numeric(&registers, 1, ValueEncoding::Uint16).is_err());
        assert!(decode_numeric(&registers, 2, ValueEncoding::Uint8).is_err());
        assert!(decode_numeric(&registers, 16, ValueEncoding::Bit).is_err());
        assert!(decode_numeric(&registers, usize::MAX, ValueEncoding::Int32Swap).is_err());
        assert!(decode_numeric(&RegisterArray::default(), 0, ValueEncoding::Bit).is_err());
    }

    #[test]
    fn test_decode_named() {
        let registers = regs(&[0x0001, 0x0002]);

        assert_eq!(
            decode_named(&registers, 0, "uint32_swap").unwrap(),
            NumericValue::Integer(0x0002_0001)
        );
        assert_eq!(
            decode_named(&registers, 0, "int64"),
            Err(DecodeError::UnknownEncoding("int64".to_string()))
        );
    }

    #[test]
    fn test_encoding_names_roundtrip() {
        for encoding in ValueEncoding::ALL {
            assert_eq!(encoding.as_str().parse::<ValueEncoding>().unwrap(), encoding);
        }
        assert!("INT16".parse::<ValueEncoding>().is_err());
    }

    #[test]
    fn test_bit_width_table() {
        assert_eq!(ValueEncoding::Bit.bit_width(), 1);
        assert_eq!(ValueEncoding::Uint8.bit_width(), 8);
        assert_eq!(ValueEncoding::Int16.bit_width(), 16);
        assert_eq!(ValueEncoding::Float32Swap.bit_width(), 32);

        assert_eq!(ValueEncoding::Bit.register_count(), 1);
        assert_eq!(ValueEncoding::Int8.register_count(), 1);
        assert_eq!(ValueEncoding::Uint16.register_count(), 1);
        assert_eq!(ValueEncoding::Int32Swap.register_count(), 2);
    }

    #[test]
    fn test_command_to_boolean_intent() {
        assert_eq!(
            command_to_boolean_intent(&CommandValue::OnOff(OnOff::On)),
            Some(true)
        );
        assert_eq!(
            command_to_boolean_intent(&CommandValue::OnOff(OnOff::Off)),
            Some(false)
        );
        assert_eq!(
            command_to_boolean_intent(&CommandValue::OpenClosed(OpenClosed::Open)),
            Some(true)
        );
        assert_eq!(
            command_to_boolean_intent(&CommandValue::OpenClosed(OpenClosed::Closed)),
            Some(false)
        );
        assert_eq!(
            command_to_boolean_intent(&CommandValue::Decimal(NumericValue::Integer(0))),
            Some(false)
        );
        assert_eq!(
            command_to_boolean_intent(&CommandValue::Decimal(NumericValue::Float(-3.5))),
            Some(true)
        );
        assert_eq!(
            command_to_boolean_intent(&CommandValue::Text("ON".into())),
            None
        );
        assert_eq!(command_to_boolean_intent(&CommandValue::Refresh), None);
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(NumericValue::Integer(-42).to_string(), "-42");
        assert_eq!(NumericValue::Float(1.5).to_string(), "1.5");
        assert_eq!(NumericValue::Float(3.0).to_string(), "3");
        assert_eq!(NumericValue::Double(50.0).to_string(), "50");
    }
}
