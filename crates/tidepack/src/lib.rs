//! # Tidepack
//!
//! A small, bounded primitive stream used by the tide wire protocol.
//!
//! ## Philosophy
//!
//! - **Fixed Endianness**: All fixed-width integers and floats are Big-Endian.
//! - **Varints**: Lengths are unsigned LEB128 varints; signed ids use zig-zag varints.
//! - **Exact Sizing**: Every write has a matching `size` helper so callers can
//!   compute the final length before a single byte is written.
//! - **Zero-Copy Reads**: `Reader` is a bounds-checked view. Strings and byte
//!   blobs are returned as slices borrowed from the input buffer.
//!
//! ## Format
//!
//! - **Scalars**: `[Data: N]`
//! - **Varints**: `[7 bits per byte, MSB = continuation]`
//! - **Blobs**: `[Len: uvarint][Data: Len]`

#[cfg(test)]
mod tests;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Tidepack read errors. Writes into a `Vec` cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer exhausted while reading.
    UnexpectedEnd { needed: usize, have: usize },
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// A varint ran past ten bytes or overflowed 64 bits.
    VarintOverflow,
    /// A blob length does not fit into the address space.
    LengthOverflow(u64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedEnd { needed, have } => {
                write!(f, "Unexpected end of buffer: needed {} bytes, have {}", needed, have)
            }
            Error::InvalidUtf8 => write!(f, "String data is not valid UTF-8"),
            Error::VarintOverflow => write!(f, "Varint overflows 64 bits"),
            Error::LengthOverflow(len) => write!(f, "Blob length {} overflows usize", len),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Tidepack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Exact encoded sizes, mirroring the `Writer` methods one to one.
pub mod size {
    /// Size of an unsigned varint.
    pub fn uvarint(mut v: u64) -> usize {
        let mut n = 1;
        while v >= 0x80 {
            v >>= 7;
            n += 1;
        }
        n
    }

    /// Size of a zig-zag signed varint.
    pub fn varint(v: i64) -> usize {
        uvarint(super::zigzag(v))
    }

    /// Size of a length-prefixed string.
    pub fn str(v: &str) -> usize {
        uvarint(v.len() as u64) + v.len()
    }

    /// Size of a length-prefixed byte blob.
    pub fn bytes(v: &[u8]) -> usize {
        uvarint(v.len() as u64) + v.len()
    }
}

#[inline]
fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// An append-only Big-Endian writer.
///
/// The writer never validates structure; framing is the caller's concern.
/// Use the functions in [`size`] to pre-compute lengths.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer with default capacity.
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    /// Creates a writer whose buffer holds `cap` bytes without reallocating.
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns a view of the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the final byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Encodes a boolean as a single byte.
    pub fn bool(&mut self, v: bool) { self.buf.push(v as u8) }

    /// Encodes an unsigned 8-bit integer.
    pub fn u8(&mut self, v: u8) { self.buf.push(v) }
    /// Encodes a signed 8-bit integer.
    pub fn i8(&mut self, v: i8) { self.buf.push(v as u8) }

    /// Encodes an unsigned 16-bit integer (BE).
    pub fn u16(&mut self, v: u16) { self.buf.extend_from_slice(&v.to_be_bytes()) }
    /// Encodes a signed 16-bit integer (BE).
    pub fn i16(&mut self, v: i16) { self.buf.extend_from_slice(&v.to_be_bytes()) }

    /// Encodes an unsigned 32-bit integer (BE).
    pub fn u32(&mut self, v: u32) { self.buf.extend_from_slice(&v.to_be_bytes()) }
    /// Encodes a signed 32-bit integer (BE).
    pub fn i32(&mut self, v: i32) { self.buf.extend_from_slice(&v.to_be_bytes()) }

    /// Encodes an unsigned 64-bit integer (BE).
    pub fn u64(&mut self, v: u64) { self.buf.extend_from_slice(&v.to_be_bytes()) }
    /// Encodes a signed 64-bit integer (BE).
    pub fn i64(&mut self, v: i64) { self.buf.extend_from_slice(&v.to_be_bytes()) }

    /// Encodes a 32-bit float as its IEEE-754 bits (BE).
    pub fn f32(&mut self, v: f32) { self.u32(v.to_bits()) }
    /// Encodes a 64-bit float as its IEEE-754 bits (BE).
    pub fn f64(&mut self, v: f64) { self.u64(v.to_bits()) }

    /// Encodes an unsigned LEB128 varint.
    pub fn uvarint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Encodes a zig-zag signed varint.
    pub fn varint(&mut self, v: i64) {
        self.uvarint(zigzag(v))
    }

    /// Encodes a length-prefixed UTF-8 string.
    pub fn str(&mut self, v: &str) {
        self.bytes(v.as_bytes())
    }

    /// Encodes a length-prefixed byte blob.
    pub fn bytes(&mut self, v: &[u8]) {
        self.uvarint(v.len() as u64);
        self.buf.extend_from_slice(v);
    }

    /// Appends bytes verbatim, without a length prefix.
    pub fn raw(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v)
    }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the internal position. Blob reads return slices that
/// borrow the original buffer, so their lifetime is bounded by it.
///
/// # Errors
/// All read operations return `Error::UnexpectedEnd` if the buffer is exhausted.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader at the start of the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The full slice this reader was created over.
    pub fn source(&self) -> &'a [u8] {
        self.buf
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let have = self.remaining();
        if n > have {
            return Err(Error::UnexpectedEnd { needed: n, have });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Decodes a boolean; any non-zero byte is `true`.
    pub fn bool(&mut self) -> Result<bool> { Ok(self.u8()? != 0) }

    /// Decodes u8.
    pub fn u8(&mut self) -> Result<u8> { Ok(self.take(1)?[0]) }
    /// Decodes i8.
    pub fn i8(&mut self) -> Result<i8> { Ok(self.u8()? as i8) }

    /// Decodes u16 (BE).
    pub fn u16(&mut self) -> Result<u16> { Ok(u16::from_be_bytes(self.array()?)) }
    /// Decodes i16 (BE).
    pub fn i16(&mut self) -> Result<i16> { Ok(i16::from_be_bytes(self.array()?)) }

    /// Decodes u32 (BE).
    pub fn u32(&mut self) -> Result<u32> { Ok(u32::from_be_bytes(self.array()?)) }
    /// Decodes i32 (BE).
    pub fn i32(&mut self) -> Result<i32> { Ok(i32::from_be_bytes(self.array()?)) }

    /// Decodes u64 (BE).
    pub fn u64(&mut self) -> Result<u64> { Ok(u64::from_be_bytes(self.array()?)) }
    /// Decodes i64 (BE).
    pub fn i64(&mut self) -> Result<i64> { Ok(i64::from_be_bytes(self.array()?)) }

    /// Decodes f32 from IEEE-754 bits (BE).
    pub fn f32(&mut self) -> Result<f32> { Ok(f32::from_bits(self.u32()?)) }
    /// Decodes f64 from IEEE-754 bits (BE).
    pub fn f64(&mut self) -> Result<f64> { Ok(f64::from_bits(self.u64()?)) }

    /// Decodes an unsigned LEB128 varint.
    pub fn uvarint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.u8()?;
            // The tenth byte may only carry the single remaining bit.
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(Error::VarintOverflow);
            }
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(Error::VarintOverflow)
    }

    /// Decodes a zig-zag signed varint.
    pub fn varint(&mut self) -> Result<i64> {
        Ok(unzigzag(self.uvarint()?))
    }

    fn blob_len(&mut self) -> Result<usize> {
        let len = self.uvarint()?;
        usize::try_from(len).map_err(|_| Error::LengthOverflow(len))
    }

    /// Decodes a length-prefixed UTF-8 string slice.
    pub fn str(&mut self) -> Result<&'a str> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a length-prefixed byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.blob_len()?;
        self.take(len)
    }

    /// Reads `n` bytes verbatim.
    pub fn raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }
}
