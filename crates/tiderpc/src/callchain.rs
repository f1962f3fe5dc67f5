//! # Call Chain
//!
//! The provenance record of a call: one hop per trust or relay boundary it
//! crossed. A chain is only ever extended by building a new chain, so a
//! chain captured by a handler never changes underneath it.
//!
//! ## Wire Format
//! - Count: uvarint
//! - Hops: `[Svc: str][Addr: str][TransitAddr: str]` repeated `Count` times

use tidepack::Writer;
use tidepack::size;

use crate::error::Error;
use crate::error::Result;
use crate::input::Input;

/// A single hop: the service a call passed through, the address it came
/// from, and the relay address replies must travel back through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Call {
    pub svc: String,
    pub addr: String,
    pub transit_addr: String,
}

impl Call {
    pub fn new(svc: impl Into<String>, addr: impl Into<String>, transit_addr: impl Into<String>) -> Self {
        Self {
            svc: svc.into(),
            addr: addr.into(),
            transit_addr: transit_addr.into(),
        }
    }

    pub fn size(&self) -> usize {
        size::str(&self.svc) + size::str(&self.addr) + size::str(&self.transit_addr)
    }

    pub fn write(&self, w: &mut Writer) {
        w.str(&self.svc);
        w.str(&self.addr);
        w.str(&self.transit_addr);
    }

    pub fn read(input: &mut Input<'_>) -> Result<Self> {
        Ok(Self {
            svc: input.str()?.to_string(),
            addr: input.str()?.to_string(),
            transit_addr: input.str()?.to_string(),
        })
    }
}

/// Ordered sequence of hops, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallChain(Vec<Call>);

impl CallChain {
    /// The canonical direct-call chain.
    pub const EMPTY: CallChain = CallChain(Vec::new());

    pub fn from_calls(calls: Vec<Call>) -> Self {
        Self(calls)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&Call> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&Call> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Call> {
        self.0.iter()
    }

    /// Returns a new chain with `call` appended.
    pub fn appended(&self, call: Call) -> CallChain {
        let mut calls = Vec::with_capacity(self.0.len() + 1);
        calls.extend(self.0.iter().cloned());
        calls.push(call);
        CallChain(calls)
    }

    /// True if any hop came from, or relayed through, `addr`.
    pub fn visits(&self, addr: &str) -> bool {
        self.0.iter().any(|c| c.addr == addr || c.transit_addr == addr)
    }

    pub fn size(&self) -> usize {
        size::uvarint(self.0.len() as u64) + self.0.iter().map(Call::size).sum::<usize>()
    }

    pub fn write(&self, w: &mut Writer) {
        w.uvarint(self.0.len() as u64);
        for call in &self.0 {
            call.write(w);
        }
    }

    pub fn read(input: &mut Input<'_>) -> Result<Self> {
        let count = input.uvarint()?;
        // Every hop needs at least three length bytes.
        let needed = usize::try_from(count).unwrap_or(usize::MAX).saturating_mul(3);
        if needed > input.remaining() {
            return Err(Error::ShortBuffer { expected: needed, actual: input.remaining() });
        }
        let mut calls = Vec::with_capacity(count as usize);
        for _ in 0..count {
            calls.push(Call::read(input)?);
        }
        Ok(CallChain(calls))
    }
}

impl<'a> IntoIterator for &'a CallChain {
    type Item = &'a Call;
    type IntoIter = std::slice::Iter<'a, Call>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
