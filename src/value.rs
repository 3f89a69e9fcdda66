//! Property value marshaling
//!
//! Properties cross the FFI boundary as a type tag plus a 64-bit payload
//! (buffers and strings travel out-of-band and are referenced by pointer
//! or handle). [`PropertyValue`] is the exhaustive sum of supported
//! shapes; anything else (structs, slices of values, maps) is rejected at
//! the boundary with a typed error, never a panic.

use std::fmt;

use thiserror::Error;

/// Wire tag identifying the shape of a property payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueTag {
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Uint8 = 6,
    Uint16 = 7,
    Uint32 = 8,
    Uint64 = 9,
    Float32 = 10,
    Float64 = 11,
    Str = 12,
    Bytes = 13,
    Ptr = 14,
}

impl ValueTag {
    /// Decode a wire tag byte.
    pub fn from_u8(tag: u8) -> Result<Self, ValueError> {
        Ok(match tag {
            1 => ValueTag::Bool,
            2 => ValueTag::Int8,
            3 => ValueTag::Int16,
            4 => ValueTag::Int32,
            5 => ValueTag::Int64,
            6 => ValueTag::Uint8,
            7 => ValueTag::Uint16,
            8 => ValueTag::Uint32,
            9 => ValueTag::Uint64,
            10 => ValueTag::Float32,
            11 => ValueTag::Float64,
            12 => ValueTag::Str,
            13 => ValueTag::Bytes,
            14 => ValueTag::Ptr,
            other => return Err(ValueError::UnknownTag(other)),
        })
    }

    /// Whether payloads with this tag fit entirely in the 64-bit word.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, ValueTag::Str | ValueTag::Bytes)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueTag::Bool => "bool",
            ValueTag::Int8 => "int8",
            ValueTag::Int16 => "int16",
            ValueTag::Int32 => "int32",
            ValueTag::Int64 => "int64",
            ValueTag::Uint8 => "uint8",
            ValueTag::Uint16 => "uint16",
            ValueTag::Uint32 => "uint32",
            ValueTag::Uint64 => "uint64",
            ValueTag::Float32 => "float32",
            ValueTag::Float64 => "float64",
            ValueTag::Str => "string",
            ValueTag::Bytes => "bytes",
            ValueTag::Ptr => "ptr",
        };
        write!(f, "{}", name)
    }
}

/// A property value supported across the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Opaque pointer-sized handle; never dereferenced on this side.
    Ptr(usize),
}

/// Marshaling failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The wire tag byte is not part of the protocol.
    #[error("unknown property tag {0}")]
    UnknownTag(u8),
    /// The tag's payload travels out-of-band and cannot be decoded from
    /// the scalar word alone.
    #[error("{0} payload is not scalar")]
    NotScalar(ValueTag),
    /// The value does not have the shape the caller asked for.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueTag,
        found: ValueTag,
    },
}

impl PropertyValue {
    /// The wire tag for this value.
    pub fn tag(&self) -> ValueTag {
        match self {
            PropertyValue::Bool(_) => ValueTag::Bool,
            PropertyValue::Int8(_) => ValueTag::Int8,
            PropertyValue::Int16(_) => ValueTag::Int16,
            PropertyValue::Int32(_) => ValueTag::Int32,
            PropertyValue::Int64(_) => ValueTag::Int64,
            PropertyValue::Uint8(_) => ValueTag::Uint8,
            PropertyValue::Uint16(_) => ValueTag::Uint16,
            PropertyValue::Uint32(_) => ValueTag::Uint32,
            PropertyValue::Uint64(_) => ValueTag::Uint64,
            PropertyValue::Float32(_) => ValueTag::Float32,
            PropertyValue::Float64(_) => ValueTag::Float64,
            PropertyValue::Str(_) => ValueTag::Str,
            PropertyValue::Bytes(_) => ValueTag::Bytes,
            PropertyValue::Ptr(_) => ValueTag::Ptr,
        }
    }

    /// Decode a scalar value from its tag and 64-bit payload.
    ///
    /// Total over every scalar tag; `Str`/`Bytes` payloads travel
    /// out-of-band and yield [`ValueError::NotScalar`].
    pub fn from_scalar(tag: ValueTag, bits: u64) -> Result<Self, ValueError> {
        Ok(match tag {
            ValueTag::Bool => PropertyValue::Bool(bits != 0),
            ValueTag::Int8 => PropertyValue::Int8(bits as i8),
            ValueTag::Int16 => PropertyValue::Int16(bits as i16),
            ValueTag::Int32 => PropertyValue::Int32(bits as i32),
            ValueTag::Int64 => PropertyValue::Int64(bits as i64),
            ValueTag::Uint8 => PropertyValue::Uint8(bits as u8),
            ValueTag::Uint16 => PropertyValue::Uint16(bits as u16),
            ValueTag::Uint32 => PropertyValue::Uint32(bits as u32),
            ValueTag::Uint64 => PropertyValue::Uint64(bits),
            ValueTag::Float32 => PropertyValue::Float32(f32::from_bits(bits as u32)),
            ValueTag::Float64 => PropertyValue::Float64(f64::from_bits(bits)),
            ValueTag::Ptr => PropertyValue::Ptr(bits as usize),
            ValueTag::Str | ValueTag::Bytes => return Err(ValueError::NotScalar(tag)),
        })
    }

    /// Encode the 64-bit payload word for a scalar value.
    ///
    /// `Str`/`Bytes` must be shipped out-of-band; asking for their scalar
    /// word is a marshaling error.
    pub fn to_scalar(&self) -> Result<u64, ValueError> {
        Ok(match self {
            PropertyValue::Bool(v) => *v as u64,
            PropertyValue::Int8(v) => *v as u8 as u64,
            PropertyValue::Int16(v) => *v as u16 as u64,
            PropertyValue::Int32(v) => *v as u32 as u64,
            PropertyValue::Int64(v) => *v as u64,
            PropertyValue::Uint8(v) => *v as u64,
            PropertyValue::Uint16(v) => *v as u64,
            PropertyValue::Uint32(v) => *v as u64,
            PropertyValue::Uint64(v) => *v,
            PropertyValue::Float32(v) => v.to_bits() as u64,
            PropertyValue::Float64(v) => v.to_bits(),
            PropertyValue::Ptr(v) => *v as u64,
            PropertyValue::Str(_) | PropertyValue::Bytes(_) => {
                return Err(ValueError::NotScalar(self.tag()))
            }
        })
    }

    /// Extract a string, with a typed error on shape mismatch.
    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            PropertyValue::Str(s) => Ok(s),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Str,
                found: other.tag(),
            }),
        }
    }

    /// Extract bytes, with a typed error on shape mismatch.
    pub fn as_bytes(&self) -> Result<&[u8], ValueError> {
        match self {
            PropertyValue::Bytes(b) => Ok(b),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Bytes,
                found: other.tag(),
            }),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int64(v)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::Uint64(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float64(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        PropertyValue::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip_all_tags() {
        let values = [
            PropertyValue::Bool(true),
            PropertyValue::Int8(-5),
            PropertyValue::Int16(-300),
            PropertyValue::Int32(-70_000),
            PropertyValue::Int64(-5_000_000_000),
            PropertyValue::Uint8(200),
            PropertyValue::Uint16(60_000),
            PropertyValue::Uint32(4_000_000_000),
            PropertyValue::Uint64(u64::MAX),
            PropertyValue::Float32(3.5),
            PropertyValue::Float64(-2.25),
            PropertyValue::Ptr(0xDEAD_BEEF),
        ];

        for value in values {
            let bits = value.to_scalar().unwrap();
            let back = PropertyValue::from_scalar(value.tag(), bits).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_buffer_shapes_are_not_scalar() {
        let s = PropertyValue::Str("hi".into());
        assert_eq!(s.to_scalar(), Err(ValueError::NotScalar(ValueTag::Str)));

        assert_eq!(
            PropertyValue::from_scalar(ValueTag::Bytes, 0),
            Err(ValueError::NotScalar(ValueTag::Bytes))
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(ValueTag::from_u8(99), Err(ValueError::UnknownTag(99)));
    }

    #[test]
    fn test_type_mismatch_error() {
        let v = PropertyValue::Int64(1);
        let err = v.as_str().unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                expected: ValueTag::Str,
                found: ValueTag::Int64,
            }
        );
    }
}
