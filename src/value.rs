//! Tagged scalar/buffer values carried by sensor readings and properties.
//!
//! Every counter reading, warning level, and descriptor property is a
//! [`Value`]. Fixed-width kinds compare by raw bits, buffer kinds by
//! content, and heterogeneous numeric kinds through the widest float.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Discriminant for [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    None,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Bytes,
}

/// Per-kind metadata, built once at compile time. Backs the generic
/// bit-compare path and kind introspection.
pub const KINDS: [ValueKind; 13] = [
    ValueKind::None,
    ValueKind::I8,
    ValueKind::I16,
    ValueKind::I32,
    ValueKind::I64,
    ValueKind::U8,
    ValueKind::U16,
    ValueKind::U32,
    ValueKind::U64,
    ValueKind::F32,
    ValueKind::F64,
    ValueKind::Text,
    ValueKind::Bytes,
];

impl ValueKind {
    /// Human-readable kind name.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::None => "none",
            ValueKind::I8 => "int8",
            ValueKind::I16 => "int16",
            ValueKind::I32 => "int32",
            ValueKind::I64 => "int64",
            ValueKind::U8 => "uint8",
            ValueKind::U16 => "uint16",
            ValueKind::U32 => "uint32",
            ValueKind::U64 => "uint64",
            ValueKind::F32 => "float",
            ValueKind::F64 => "double",
            ValueKind::Text => "string",
            ValueKind::Bytes => "bytes",
        }
    }

    /// Width in bytes of the fixed representation; 0 for `None` and buffers.
    pub fn byte_width(self) -> usize {
        match self {
            ValueKind::None | ValueKind::Text | ValueKind::Bytes => 0,
            ValueKind::I8 | ValueKind::U8 => 1,
            ValueKind::I16 | ValueKind::U16 => 2,
            ValueKind::I32 | ValueKind::U32 | ValueKind::F32 => 4,
            ValueKind::I64 | ValueKind::U64 | ValueKind::F64 => 8,
        }
    }

    pub fn is_buffer(self) -> bool {
        matches!(self, ValueKind::Text | ValueKind::Bytes)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::F32 | ValueKind::F64)
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::None | ValueKind::Text | ValueKind::Bytes)
    }
}

/// Change-detection result of an in-place value assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Updated,
    Unchanged,
}

/// A tagged sensor value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    None,
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::I8(_) => ValueKind::I8,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Zero/empty value of the given kind, used to seed fresh samples.
    pub fn default_for(kind: ValueKind) -> Value {
        match kind {
            ValueKind::None => Value::None,
            ValueKind::I8 => Value::I8(0),
            ValueKind::I16 => Value::I16(0),
            ValueKind::I32 => Value::I32(0),
            ValueKind::I64 => Value::I64(0),
            ValueKind::U8 => Value::U8(0),
            ValueKind::U16 => Value::U16(0),
            ValueKind::U32 => Value::U32(0),
            ValueKind::U64 => Value::U64(0),
            ValueKind::F32 => Value::F32(0.0),
            ValueKind::F64 => Value::F64(0.0),
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Raw bit pattern of a fixed-width value, widened to 64 bits.
    ///
    /// `None` for buffer kinds and `Value::None`.
    pub fn bits(&self) -> Option<u64> {
        match *self {
            Value::I8(v) => Some(v as u8 as u64),
            Value::I16(v) => Some(v as u16 as u64),
            Value::I32(v) => Some(v as u32 as u64),
            Value::I64(v) => Some(v as u64),
            Value::U8(v) => Some(v as u64),
            Value::U16(v) => Some(v as u64),
            Value::U32(v) => Some(v as u64),
            Value::U64(v) => Some(v),
            Value::F32(v) => Some(v.to_bits() as u64),
            Value::F64(v) => Some(v.to_bits()),
            Value::None | Value::Text(_) | Value::Bytes(_) => None,
        }
    }

    /// Assign `src` in place. Kinds must match exactly.
    ///
    /// Compares before writing so an identical reading reports
    /// [`Change::Unchanged`] without touching the destination.
    pub fn set_from(&mut self, src: &Value) -> Result<Change> {
        if self.kind() != src.kind() {
            return Err(WatchError::KindMismatch {
                expected: self.kind(),
                found: src.kind(),
            });
        }
        if self.value_equal(src) {
            return Ok(Change::Unchanged);
        }
        *self = src.clone();
        Ok(Change::Updated)
    }

    /// Assign raw buffer content; only valid for `Text` and `Bytes`.
    ///
    /// `Text` destinations require valid UTF-8. The backing storage grows
    /// as needed.
    pub fn set_buffer(&mut self, src: &[u8]) -> Result<Change> {
        match self {
            Value::Text(s) => {
                let text = std::str::from_utf8(src)
                    .map_err(|e| WatchError::Parse(format!("invalid UTF-8: {e}")))?;
                if s == text {
                    return Ok(Change::Unchanged);
                }
                s.clear();
                s.push_str(text);
                Ok(Change::Updated)
            }
            Value::Bytes(b) => {
                if b.as_slice() == src {
                    return Ok(Change::Unchanged);
                }
                b.clear();
                b.extend_from_slice(src);
                Ok(Change::Updated)
            }
            _ => Err(WatchError::NotSupported(format!(
                "buffer assignment to {} value",
                self.kind().name()
            ))),
        }
    }

    /// Render to text: integers in decimal, floats via their shortest
    /// representation, `Bytes` as lowercase hex pairs, `Text` verbatim.
    pub fn render(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::I8(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U8(v) => v.to_string(),
            Value::U16(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => {
                let mut out = String::with_capacity(b.len() * 2);
                for byte in b {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
        }
    }

    /// Render, clipped to at most `max_chars` characters.
    pub fn render_clipped(&self, max_chars: usize) -> String {
        self.render().chars().take(max_chars).collect()
    }

    /// Widen to `f64`. `Text` is parsed; parse failures and non-numeric
    /// kinds are errors.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::I8(v) => Ok(*v as f64),
            Value::I16(v) => Ok(*v as f64),
            Value::I32(v) => Ok(*v as f64),
            Value::I64(v) => Ok(*v as f64),
            Value::U8(v) => Ok(*v as f64),
            Value::U16(v) => Ok(*v as f64),
            Value::U32(v) => Ok(*v as f64),
            Value::U64(v) => Ok(*v as f64),
            Value::F32(v) => Ok(*v as f64),
            Value::F64(v) => Ok(*v),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| WatchError::Parse(format!("not a number: '{s}'"))),
            Value::None | Value::Bytes(_) => Err(WatchError::NotSupported(format!(
                "{} value has no numeric form",
                self.kind().name()
            ))),
        }
    }

    /// Widen to `i64`, reporting overflow distinctly from parse failure.
    pub fn to_i64(&self) -> Result<i64> {
        match self {
            Value::I8(v) => Ok(*v as i64),
            Value::I16(v) => Ok(*v as i64),
            Value::I32(v) => Ok(*v as i64),
            Value::I64(v) => Ok(*v),
            Value::U8(v) => Ok(*v as i64),
            Value::U16(v) => Ok(*v as i64),
            Value::U32(v) => Ok(*v as i64),
            Value::U64(v) => i64::try_from(*v).map_err(|_| WatchError::Overflow(ValueKind::U64)),
            Value::F32(v) => float_to_i64(*v as f64, ValueKind::F32),
            Value::F64(v) => float_to_i64(*v, ValueKind::F64),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| WatchError::Parse(format!("not an integer: '{s}'"))),
            Value::None | Value::Bytes(_) => Err(WatchError::NotSupported(format!(
                "{} value has no numeric form",
                self.kind().name()
            ))),
        }
    }

    /// Equality with the documented fast paths: bit compare for matching
    /// fixed kinds, content compare for matching buffer kinds, widest-float
    /// compare for mixed numerics, and stringized comparison when a buffer
    /// meets a scalar.
    pub fn value_equal(&self, other: &Value) -> bool {
        let (ka, kb) = (self.kind(), other.kind());
        if ka == kb {
            return match (self, other) {
                (Value::None, Value::None) => true,
                (Value::Text(a), Value::Text(b)) => a.len() == b.len() && a == b,
                (Value::Bytes(a), Value::Bytes(b)) => a.len() == b.len() && a == b,
                _ => self.bits() == other.bits(),
            };
        }
        if ka.is_numeric() && kb.is_numeric() {
            // Both widen losslessly enough for second-scale counters.
            return match (self.to_f64(), other.to_f64()) {
                (Ok(a), Ok(b)) => a - b == 0.0,
                _ => false,
            };
        }
        if ka.is_buffer() != kb.is_buffer() {
            return self.render() == other.render();
        }
        false
    }

    /// Three-way comparison following the same path split as
    /// [`Value::value_equal`]. `None` sorts before everything else.
    pub fn compare(&self, other: &Value) -> Ordering {
        let (ka, kb) = (self.kind(), other.kind());
        match (self, other) {
            (Value::None, Value::None) => return Ordering::Equal,
            (Value::None, _) => return Ordering::Less,
            (_, Value::None) => return Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => return a.as_bytes().cmp(b.as_bytes()),
            (Value::Bytes(a), Value::Bytes(b)) => return a.as_slice().cmp(b.as_slice()),
            _ => {}
        }
        if ka.is_numeric() && kb.is_numeric() {
            let diff = match (self.to_f64(), other.to_f64()) {
                (Ok(a), Ok(b)) => a - b,
                _ => return Ordering::Equal,
            };
            return if diff < 0.0 {
                Ordering::Less
            } else if diff > 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            };
        }
        // Buffer against scalar: stringize the scalar.
        self.render().cmp(&other.render())
    }
}

fn float_to_i64(v: f64, kind: ValueKind) -> Result<i64> {
    if v.is_nan() {
        return Err(WatchError::Parse("NaN has no integer form".into()));
    }
    if v < i64::MIN as f64 || v > i64::MAX as f64 {
        return Err(WatchError::Overflow(kind));
    }
    Ok(v as i64)
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
