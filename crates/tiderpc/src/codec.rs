//! # Envelope Codec
//!
//! Frames a message body behind a fixed head.
//!
//! ## Wire Format
//! ```text
//! [Len: u32][MsgId: u32][Origin.Svc: str][Origin.Addr: str][Origin.Timestamp: i64][Seq: varint][Body]
//! ```
//! `Len` counts the whole frame, head included.
//!
//! ## Invariants
//! - **No Truncation**: a buffer shorter than `Len` is a hard `ShortBuffer`
//!   error. Bytes beyond `Len` belong to the next frame and are not touched.
//! - **Registry First**: the body is only parsed after the id resolves to a
//!   registered prototype.
//! - **Full Consumption**: a body that leaves bytes inside its frame is rejected.
//! - **Zero Copy**: byte fields of the decoded body are views into the frame.

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use tidepack::Writer;
use tidepack::size;

use crate::error::Error;
use crate::error::Result;
use crate::input::Input;
use crate::msg::AsAny;
use crate::msg::Msg;
use crate::msg::MsgId;
use crate::registry::MsgRegistry;

/// `[Len: u32][MsgId: u32]`
const FIXED_HEAD_LEN: usize = 8;

/// Where a message was sent from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Service name of the sender.
    pub svc: String,
    /// Address replies should be published to.
    pub addr: String,
    /// Milliseconds since the unix epoch at encode time.
    pub timestamp: i64,
}

impl Origin {
    pub fn new(svc: impl Into<String>, addr: impl Into<String>, timestamp: i64) -> Self {
        Self { svc: svc.into(), addr: addr.into(), timestamp }
    }

    /// An origin stamped with the current wall-clock time.
    pub fn now(svc: impl Into<String>, addr: impl Into<String>) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self::new(svc, addr, millis)
    }

    pub fn size(&self) -> usize {
        size::str(&self.svc) + size::str(&self.addr) + 8
    }

    fn write(&self, w: &mut Writer) {
        w.str(&self.svc);
        w.str(&self.addr);
        w.i64(self.timestamp);
    }

    fn read(input: &mut Input<'_>) -> Result<Self> {
        Ok(Self {
            svc: input.str()?.to_string(),
            addr: input.str()?.to_string(),
            timestamp: input.i64()?,
        })
    }
}

/// The decoded envelope head.
#[derive(Debug, Clone, PartialEq)]
pub struct MsgHead {
    pub len: u32,
    pub msg_id: MsgId,
    pub origin: Origin,
    pub seq: i64,
}

/// A decoded frame: head plus the concrete body.
#[derive(Debug)]
pub struct Envelope {
    pub head: MsgHead,
    pub msg: Box<dyn Msg>,
}

impl Envelope {
    pub fn msg_id(&self) -> MsgId {
        self.head.msg_id
    }

    pub fn origin(&self) -> &Origin {
        &self.head.origin
    }

    /// Borrows the body as `T` if that is its concrete type.
    pub fn msg_ref<T: Msg>(&self) -> Option<&T> {
        let msg: &dyn Msg = &*self.msg;
        msg.as_any().downcast_ref::<T>()
    }

    /// Splits the envelope into its head and the body as `T`, or `None`
    /// when the body is some other type.
    pub fn into_msg<T: Msg>(self) -> Option<(MsgHead, T)> {
        let Envelope { head, msg } = self;
        AsAny::into_any(msg).downcast::<T>().ok().map(|body| (head, *body))
    }
}

/// Encodes and decodes envelopes against a message registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<MsgRegistry>,
}

impl Codec {
    pub fn new(registry: Arc<MsgRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MsgRegistry {
        &self.registry
    }

    fn head_size(origin: &Origin, seq: i64) -> usize {
        FIXED_HEAD_LEN + origin.size() + size::varint(seq)
    }

    fn begin(origin: &Origin, seq: i64, msg_id: MsgId, body_len: usize) -> Result<(Writer, usize)> {
        let total = Self::head_size(origin, seq) + body_len;
        let len = u32::try_from(total).map_err(|_| Error::MessageTooLarge(total))?;
        let mut w = Writer::with_capacity(total);
        w.u32(len);
        w.u32(msg_id);
        origin.write(&mut w);
        w.varint(seq);
        Ok((w, total))
    }

    /// Encodes `msg` behind a head carrying `origin` and `seq`.
    ///
    /// # Errors
    /// `SizeMismatch` if the message's `size()` disagrees with what it wrote.
    pub fn encode(&self, origin: &Origin, seq: i64, msg: &dyn Msg) -> Result<Bytes> {
        let (mut w, total) = Self::begin(origin, seq, msg.msg_id(), msg.size())?;
        msg.write(&mut w)?;
        if w.len() != total {
            return Err(Error::SizeMismatch { msg_id: msg.msg_id(), expected: total, actual: w.len() });
        }
        Ok(Bytes::from(w.into_bytes()))
    }

    /// Frames an already-encoded body, as relays do with forwarded payloads.
    pub fn encode_raw(&self, origin: &Origin, seq: i64, msg_id: MsgId, body: &[u8]) -> Result<Bytes> {
        let (mut w, _) = Self::begin(origin, seq, msg_id, body.len())?;
        w.raw(body);
        Ok(Bytes::from(w.into_bytes()))
    }

    /// Encodes only the body, with no head.
    pub fn encode_body(&self, msg: &dyn Msg) -> Result<Bytes> {
        let expected = msg.size();
        let mut w = Writer::with_capacity(expected);
        msg.write(&mut w)?;
        if w.len() != expected {
            return Err(Error::SizeMismatch { msg_id: msg.msg_id(), expected, actual: w.len() });
        }
        Ok(Bytes::from(w.into_bytes()))
    }

    /// Decodes one frame from the front of `data`.
    pub fn decode(&self, data: Bytes) -> Result<Envelope> {
        if data.len() < FIXED_HEAD_LEN {
            return Err(Error::ShortBuffer { expected: FIXED_HEAD_LEN, actual: data.len() });
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&data[..4]);
        let len = u32::from_be_bytes(len_bytes);
        if (len as usize) < FIXED_HEAD_LEN {
            return Err(Error::InvalidLength(len));
        }
        if data.len() < len as usize {
            return Err(Error::ShortBuffer { expected: len as usize, actual: data.len() });
        }

        let frame = data.slice(..len as usize);
        let mut input = Input::new(&frame);
        input.u32()?;
        let msg_id = input.u32()?;
        let origin = Origin::read(&mut input)?;
        let seq = input.varint()?;

        let mut msg = self.registry.make(msg_id)?;
        msg.read(&mut input)?;
        if input.remaining() != 0 {
            return Err(Error::TrailingBytes { msg_id, remaining: input.remaining() });
        }

        Ok(Envelope {
            head: MsgHead { len, msg_id, origin, seq },
            msg,
        })
    }

    /// Decodes a bare body of the given id.
    pub fn decode_body(&self, msg_id: MsgId, body: Bytes) -> Result<Box<dyn Msg>> {
        let mut msg = self.registry.make(msg_id)?;
        let mut input = Input::new(&body);
        msg.read(&mut input)?;
        if input.remaining() != 0 {
            return Err(Error::TrailingBytes { msg_id, remaining: input.remaining() });
        }
        Ok(msg)
    }

    /// Decodes a bare body and downcasts it to `T`.
    pub fn decode_body_as<T: Msg>(&self, msg_id: MsgId, body: Bytes) -> Result<T> {
        let msg = self.decode_body(msg_id, body)?;
        let found = self.registry.type_name(msg_id).unwrap_or("unknown");
        AsAny::into_any(msg)
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| Error::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: found.to_string(),
            })
    }
}
