//! # Variant Values
//!
//! The dynamically typed values carried as RPC arguments and results.
//!
//! ## Wire Format
//! Every value is `[Tag: u8][Payload]`:
//!
//! | tag | variant   | payload                                  |
//! |-----|-----------|------------------------------------------|
//! | 0   | Null      | none                                     |
//! | 1   | Bool      | u8                                       |
//! | 2-3 | I8, I16   | fixed BE                                 |
//! | 4-5 | I32, I64  | zig-zag varint                           |
//! | 6-7 | U8, U16   | fixed BE                                 |
//! | 8-9 | U32, U64  | uvarint                                  |
//! | 10  | F32       | IEEE-754 bits, BE                        |
//! | 11  | F64       | IEEE-754 bits, BE                        |
//! | 12  | String    | uvarint len + UTF-8                      |
//! | 13  | Bytes     | uvarint len + raw                        |
//! | 14  | Array     | uvarint count + values                   |
//! | 15  | Map       | uvarint count + (key, value) pairs       |
//! | 16  | CallChain | see `callchain`                          |
//! | 17  | Error     | zig-zag varint code + message string     |
//!
//! ## Invariants
//! - **Recursion Safety**: Encoding and decoding are bounded by `MAX_RECURSION_DEPTH`.
//! - **Exact Sizing**: `size()` equals the number of bytes `write()` produces.

use bytes::Bytes;
use tidepack::Writer;
use tidepack::size;

use crate::callchain::CallChain;
use crate::error::Error;
use crate::error::Result;
use crate::input::Input;

/// The maximum nesting depth for Values before failing.
pub const MAX_RECURSION_DEPTH: usize = 64;

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const I8: u8 = 2;
    pub const I16: u8 = 3;
    pub const I32: u8 = 4;
    pub const I64: u8 = 5;
    pub const U8: u8 = 6;
    pub const U16: u8 = 7;
    pub const U32: u8 = 8;
    pub const U64: u8 = 9;
    pub const F32: u8 = 10;
    pub const F64: u8 = 11;
    pub const STRING: u8 = 12;
    pub const BYTES: u8 = 13;
    pub const ARRAY: u8 = 14;
    pub const MAP: u8 = 15;
    pub const CALL_CHAIN: u8 = 16;
    pub const ERROR: u8 = 17;
}

/// Well-known fault codes shared by every node.
pub mod code {
    pub const FAILED: i32 = 1;
    pub const UNDELIVERABLE: i32 = 2;
    pub const UNRESOLVED: i32 = 3;
    pub const PERMISSION_DENIED: i32 = 4;
    pub const DECODE: i32 = 5;
    pub const INVALID_PATH: i32 = 6;
    pub const TIMEOUT: i32 = 7;
    pub const CANCELLED: i32 = 8;
    pub const CLOSED: i32 = 9;
    pub const TYPE_MISMATCH: i32 = 10;
    pub const NOT_FOUND: i32 = 11;
    pub const CHAIN_TOO_DEEP: i32 = 12;
    pub const PANICKED: i32 = 13;
    pub const BROKER: i32 = 14;
}

/// An error travelling on the wire, e.g. the error side of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn size(&self) -> usize {
        size::varint(self.code as i64) + size::str(&self.message)
    }

    pub fn write(&self, w: &mut Writer) {
        w.varint(self.code as i64);
        w.str(&self.message);
    }

    pub fn read(input: &mut Input<'_>) -> Result<Self> {
        let code = input.varint()?;
        let code = i32::try_from(code).map_err(|_| Error::TypeMismatch {
            expected: "i32 fault code".into(),
            found: code.to_string(),
        })?;
        Ok(Self { code, message: input.str()?.to_string() })
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A dynamically typed RPC argument or result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
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
    String(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    CallChain(CallChain),
    Error(Fault),
}

impl Value {
    /// Short type description used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::CallChain(_) => "call-chain",
            Value::Error(_) => "error",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Exact number of bytes `write` produces for this value.
    ///
    /// Nesting past `MAX_RECURSION_DEPTH` is not descended into, so for a
    /// value `write` rejects the result is only a lower bound.
    pub fn size(&self) -> usize {
        self.size_impl(0)
    }

    fn size_impl(&self, depth: usize) -> usize {
        if depth > MAX_RECURSION_DEPTH {
            return 1;
        }

        1 + match self {
            Value::Null => 0,
            Value::Bool(_) | Value::I8(_) | Value::U8(_) => 1,
            Value::I16(_) | Value::U16(_) => 2,
            Value::I32(v) => size::varint(*v as i64),
            Value::I64(v) => size::varint(*v),
            Value::U32(v) => size::uvarint(*v as u64),
            Value::U64(v) => size::uvarint(*v),
            Value::F32(_) => 4,
            Value::F64(_) => 8,
            Value::String(v) => size::str(v),
            Value::Bytes(v) => size::bytes(v),
            Value::Array(items) => {
                size::uvarint(items.len() as u64)
                    + items.iter().map(|item| item.size_impl(depth + 1)).sum::<usize>()
            }
            Value::Map(pairs) => {
                size::uvarint(pairs.len() as u64)
                    + pairs
                        .iter()
                        .map(|(k, v)| k.size_impl(depth + 1) + v.size_impl(depth + 1))
                        .sum::<usize>()
            }
            Value::CallChain(chain) => chain.size(),
            Value::Error(fault) => fault.size(),
        }
    }

    /// Encodes this value.
    ///
    /// # Errors
    /// Returns `Error::RecursionLimitExceeded` if the value is too deeply nested.
    pub fn write(&self, w: &mut Writer) -> Result<()> {
        self.write_impl(w, 0)
    }

    fn write_impl(&self, w: &mut Writer, depth: usize) -> Result<()> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }

        match self {
            Value::Null => w.u8(tag::NULL),
            Value::Bool(v) => { w.u8(tag::BOOL); w.bool(*v) }
            Value::I8(v) => { w.u8(tag::I8); w.i8(*v) }
            Value::I16(v) => { w.u8(tag::I16); w.i16(*v) }
            Value::I32(v) => { w.u8(tag::I32); w.varint(*v as i64) }
            Value::I64(v) => { w.u8(tag::I64); w.varint(*v) }
            Value::U8(v) => { w.u8(tag::U8); w.u8(*v) }
            Value::U16(v) => { w.u8(tag::U16); w.u16(*v) }
            Value::U32(v) => { w.u8(tag::U32); w.uvarint(*v as u64) }
            Value::U64(v) => { w.u8(tag::U64); w.uvarint(*v) }
            Value::F32(v) => { w.u8(tag::F32); w.f32(*v) }
            Value::F64(v) => { w.u8(tag::F64); w.f64(*v) }
            Value::String(v) => { w.u8(tag::STRING); w.str(v) }
            Value::Bytes(v) => { w.u8(tag::BYTES); w.bytes(v) }
            Value::Array(items) => {
                w.u8(tag::ARRAY);
                w.uvarint(items.len() as u64);
                for item in items {
                    item.write_impl(w, depth + 1)?;
                }
            }
            Value::Map(pairs) => {
                w.u8(tag::MAP);
                w.uvarint(pairs.len() as u64);
                for (k, v) in pairs {
                    k.write_impl(w, depth + 1)?;
                    v.write_impl(w, depth + 1)?;
                }
            }
            Value::CallChain(chain) => { w.u8(tag::CALL_CHAIN); chain.write(w) }
            Value::Error(fault) => { w.u8(tag::ERROR); fault.write(w) }
        }
        Ok(())
    }

    /// Decodes a single value.
    pub fn read(input: &mut Input<'_>) -> Result<Self> {
        Self::read_impl(input, 0)
    }

    fn read_impl(input: &mut Input<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }

        let t = input.u8()?;
        let value = match t {
            tag::NULL => Value::Null,
            tag::BOOL => Value::Bool(input.bool()?),
            tag::I8 => Value::I8(input.i8()?),
            tag::I16 => Value::I16(input.i16()?),
            tag::I32 => {
                let v = input.varint()?;
                Value::I32(i32::try_from(v).map_err(|_| overflow("i32", v))?)
            }
            tag::I64 => Value::I64(input.varint()?),
            tag::U8 => Value::U8(input.u8()?),
            tag::U16 => Value::U16(input.u16()?),
            tag::U32 => {
                let v = input.uvarint()?;
                Value::U32(u32::try_from(v).map_err(|_| overflow("u32", v))?)
            }
            tag::U64 => Value::U64(input.uvarint()?),
            tag::F32 => Value::F32(input.f32()?),
            tag::F64 => Value::F64(input.f64()?),
            tag::STRING => Value::String(input.str()?.to_string()),
            tag::BYTES => Value::Bytes(input.shared_bytes()?),
            tag::ARRAY => Value::Array(read_items(input, depth + 1)?),
            tag::MAP => {
                let count = input.uvarint()?;
                let mut pairs = Vec::with_capacity(bounded_capacity(count, input.remaining() / 2));
                for _ in 0..count {
                    let k = Self::read_impl(input, depth + 1)?;
                    let v = Self::read_impl(input, depth + 1)?;
                    pairs.push((k, v));
                }
                Value::Map(pairs)
            }
            tag::CALL_CHAIN => Value::CallChain(CallChain::read(input)?),
            tag::ERROR => Value::Error(Fault::read(input)?),
            other => return Err(Error::UnknownValueTag(other)),
        };
        Ok(value)
    }
}

fn overflow(expected: &str, found: impl std::fmt::Display) -> Error {
    Error::TypeMismatch { expected: expected.to_string(), found: found.to_string() }
}

fn bounded_capacity(count: u64, limit: usize) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX).min(limit)
}

fn read_items(input: &mut Input<'_>, depth: usize) -> Result<Vec<Value>> {
    let count = input.uvarint()?;
    // Each value needs at least its tag byte.
    let mut items = Vec::with_capacity(bounded_capacity(count, input.remaining()));
    for _ in 0..count {
        items.push(Value::read_impl(input, depth)?);
    }
    Ok(items)
}

/// Size of a value array (`[Count: uvarint][Values]`), as used for args and rets.
pub fn array_size(items: &[Value]) -> usize {
    size::uvarint(items.len() as u64) + items.iter().map(Value::size).sum::<usize>()
}

/// Encodes a value array.
pub fn write_array(w: &mut Writer, items: &[Value]) -> Result<()> {
    w.uvarint(items.len() as u64);
    for item in items {
        item.write(w)?;
    }
    Ok(())
}

/// Decodes a value array.
pub fn read_array(input: &mut Input<'_>) -> Result<Vec<Value>> {
    read_items(input, 0)
}
