//! Shared-buffer reader.
//!
//! Wraps a `tidepack::Reader` over a reference-counted `Bytes` so that byte
//! fields can be handed out as zero-copy `Bytes` views. Every such view keeps
//! the originating buffer alive until the last message referencing it drops.

use std::ops::Deref;
use std::ops::DerefMut;

use bytes::Bytes;
use tidepack::Reader;

use crate::error::Result;

pub struct Input<'a> {
    reader: Reader<'a>,
    buf: &'a Bytes,
}

impl<'a> Input<'a> {
    pub fn new(buf: &'a Bytes) -> Self {
        Self { reader: Reader::new(buf), buf }
    }

    /// Reads a length-prefixed blob as a view into the shared buffer.
    pub fn shared_bytes(&mut self) -> Result<Bytes> {
        let slice = self.reader.bytes()?;
        Ok(self.buf.slice_ref(slice))
    }
}

impl<'a> Deref for Input<'a> {
    type Target = Reader<'a>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<'a> DerefMut for Input<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}
