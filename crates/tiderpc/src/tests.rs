use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tidepack::Writer;

use crate::*;

// ============================================================================
//  HELPERS
// ============================================================================

fn codec() -> Codec {
    Codec::new(Arc::new(MsgRegistry::with_builtins()))
}

fn origin() -> Origin {
    Origin::new("game", "service.nd.game.n1", 1_700_000_000_000)
}

fn chain() -> CallChain {
    CallChain::EMPTY.appended(Call::new("gate", "client.nd.e1", "service.nd.gate.g1"))
}

fn sample_values() -> Vec<Value> {
    vec![
        Value::Null,
        Value::Bool(true),
        Value::I8(-3),
        Value::I16(i16::MIN),
        Value::I32(-70_000),
        Value::I64(i64::MIN),
        Value::U8(250),
        Value::U16(u16::MAX),
        Value::U32(u32::MAX),
        Value::U64(u64::MAX),
        Value::F32(0.5),
        Value::F64(-2.25),
        Value::String("héllo".into()),
        Value::Bytes(Bytes::from_static(b"\x00\x01\x02")),
        Value::Array(vec![Value::I32(1), Value::String(String::new())]),
        Value::Map(vec![(Value::String("k".into()), Value::U8(1))]),
        Value::CallChain(chain()),
        Value::Error(Fault::new(code::FAILED, "boom")),
    ]
}

fn roundtrip<T: Msg + Clone + PartialEq>(msg: &T, seq: i64) -> T {
    let codec = codec();
    let bytes = codec.encode(&origin(), seq, msg).unwrap();
    assert_eq!(bytes.len(), 8 + origin().size() + tidepack::size::varint(seq) + msg.size());

    let env = codec.decode(bytes).unwrap();
    assert_eq!(env.head.origin, origin());
    assert_eq!(env.head.seq, seq);
    assert_eq!(env.msg_id(), msg.msg_id());
    let (_, decoded) = env.into_msg::<T>().unwrap();
    decoded
}

// ============================================================================
//  MESSAGE TESTS
// ============================================================================

#[test]
fn test_request_roundtrip() {
    let msg = MsgRpcRequest {
        corr_id: 42,
        call_chain: chain(),
        path: CallPath::entity("e1", "bag", "add").encode().unwrap(),
        args: sample_values(),
    };
    assert_eq!(roundtrip(&msg, 7), msg);
}

#[test]
fn test_request_with_empty_fields() {
    let msg = MsgRpcRequest::default();
    assert_eq!(roundtrip(&msg, 0), msg);
}

#[test]
fn test_extreme_correlation_ids() {
    for corr_id in [i64::MAX, i64::MIN, -1, 0] {
        let msg = MsgRpcReply { corr_id, rets: vec![], error: None };
        assert_eq!(roundtrip(&msg, corr_id), msg);
    }
}

#[test]
fn test_reply_carries_error() {
    let msg = MsgRpcReply {
        corr_id: 9,
        rets: vec![Value::I32(42)],
        error: Some(Fault::new(code::PERMISSION_DENIED, "nope")),
    };
    assert_eq!(roundtrip(&msg, 1), msg);
}

#[test]
fn test_one_way_roundtrip() {
    let msg = MsgOneWayRpc {
        call_chain: CallChain::EMPTY,
        path: "E>e1>c>m".into(),
        args: vec![Value::String("x".into())],
    };
    assert_eq!(roundtrip(&msg, 3), msg);
}

#[test]
fn test_forward_payload_is_zero_copy() {
    let codec = codec();
    let inner = MsgRpcRequest { corr_id: 5, path: "S>bag>list".into(), ..Default::default() };
    let msg = MsgForward {
        transit: "service.nd.gate.g1".into(),
        dst: "service.nd.game.n1".into(),
        corr_id: 5,
        trans_id: msg_id::RPC_REQUEST,
        trans_data: codec.encode_body(&inner).unwrap(),
    };

    let bytes = codec.encode(&origin(), 1, &msg).unwrap();
    let env = codec.decode(bytes.clone()).unwrap();
    let (_, fwd) = env.into_msg::<MsgForward>().unwrap();
    assert_eq!(fwd, msg);

    let start = bytes.as_ptr() as usize;
    let view = fwd.trans_data.as_ptr() as usize;
    assert!(view >= start && view < start + bytes.len());

    let unwrapped: MsgRpcRequest = codec.decode_body_as(fwd.trans_id, fwd.trans_data).unwrap();
    assert_eq!(unwrapped, inner);
}

#[test]
fn test_encode_raw_matches_encode() {
    let codec = codec();
    let msg = MsgOneWayRpc { path: "C>e1>ping".into(), ..Default::default() };
    let body = codec.encode_body(&msg).unwrap();
    assert_eq!(
        codec.encode_raw(&origin(), 4, msg.msg_id(), &body).unwrap(),
        codec.encode(&origin(), 4, &msg).unwrap()
    );
}

#[test]
fn test_into_msg_wrong_type() {
    let codec = codec();
    let bytes = codec.encode(&origin(), 0, &MsgOneWayRpc::default()).unwrap();
    let env = codec.decode(bytes).unwrap();
    assert!(env.msg_ref::<MsgRpcRequest>().is_none());
    assert!(env.into_msg::<MsgRpcRequest>().is_none());
}

// ============================================================================
//  FRAMING TESTS
// ============================================================================

#[test]
fn test_short_buffer_is_an_error() {
    let codec = codec();
    let bytes = codec.encode(&origin(), 0, &MsgRpcReply::default()).unwrap();
    let cut = bytes.slice(..bytes.len() - 1);
    assert_eq!(
        codec.decode(cut).unwrap_err(),
        Error::ShortBuffer { expected: bytes.len(), actual: bytes.len() - 1 }
    );
    assert!(matches!(codec.decode(Bytes::from_static(&[0, 0])), Err(Error::ShortBuffer { .. })));
}

#[test]
fn test_bytes_after_frame_are_ignored() {
    let codec = codec();
    let msg = MsgRpcReply { corr_id: 1, ..Default::default() };
    let mut joined = codec.encode(&origin(), 0, &msg).unwrap().to_vec();
    joined.extend_from_slice(b"next-frame");
    let env = codec.decode(Bytes::from(joined)).unwrap();
    assert_eq!(env.msg_ref::<MsgRpcReply>(), Some(&msg));
}

#[test]
fn test_invalid_length() {
    let mut w = Writer::new();
    w.u32(3);
    w.u32(msg_id::RPC_REPLY);
    assert_eq!(codec().decode(Bytes::from(w.into_bytes())).unwrap_err(), Error::InvalidLength(3));
}

#[test]
fn test_unknown_msg_id() {
    let codec = codec();
    let bytes = codec.encode_raw(&origin(), 0, 999, &[]).unwrap();
    assert_eq!(codec.decode(bytes).unwrap_err(), Error::UnknownMsgId(999));
}

#[test]
fn test_trailing_body_bytes_rejected() {
    let codec = codec();
    let mut body = codec.encode_body(&MsgRpcReply::default()).unwrap().to_vec();
    body.push(0);
    let bytes = codec.encode_raw(&origin(), 0, msg_id::RPC_REPLY, &body).unwrap();
    assert!(matches!(codec.decode(bytes), Err(Error::TrailingBytes { remaining: 1, .. })));
}

#[test]
fn test_random_garbage_never_panics() {
    let codec = codec();
    let mut rng = rand::thread_rng();
    let valid = codec
        .encode(&origin(), 3, &MsgRpcRequest { args: sample_values(), ..Default::default() })
        .unwrap();

    for _ in 0..500 {
        let mut bytes = valid.to_vec();
        let flips = rng.gen_range(1..8);
        for _ in 0..flips {
            let at = rng.gen_range(0..bytes.len());
            bytes[at] = rng.r#gen::<u8>();
        }
        let _ = codec.decode(Bytes::from(bytes));
    }
}

// ============================================================================
//  SIZE INVARIANT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct LyingMsg;

impl Msg for LyingMsg {
    fn msg_id(&self) -> MsgId { custom_msg_id::<Self>() }
    fn size(&self) -> usize { 3 }
    fn write(&self, w: &mut Writer) -> Result<()> {
        w.u8(1);
        Ok(())
    }
    fn read(&mut self, input: &mut Input<'_>) -> Result<()> {
        input.u8()?;
        Ok(())
    }
}

#[test]
fn test_size_mismatch_detected() {
    let codec = codec();
    assert!(matches!(codec.encode(&origin(), 0, &LyingMsg), Err(Error::SizeMismatch { .. })));
    assert!(matches!(codec.encode_body(&LyingMsg), Err(Error::SizeMismatch { .. })));
}

#[test]
fn test_value_sizes_are_exact() {
    for v in sample_values() {
        let mut w = Writer::new();
        v.write(&mut w).unwrap();
        assert_eq!(w.len(), v.size(), "size mismatch for {}", v.type_name());
    }
}

#[test]
fn test_recursion_limit() {
    let mut deep = Value::Null;
    for _ in 0..=value::MAX_RECURSION_DEPTH + 1 {
        deep = Value::Array(vec![deep]);
    }
    let mut w = Writer::new();
    assert_eq!(deep.write(&mut w), Err(Error::RecursionLimitExceeded));

    // Hand-build a frame nested past the limit.
    let mut w = Writer::new();
    for _ in 0..=value::MAX_RECURSION_DEPTH + 1 {
        w.u8(14);
        w.uvarint(1);
    }
    w.u8(0);
    let buf = Bytes::from(w.into_bytes());
    let mut input = Input::new(&buf);
    assert_eq!(Value::read(&mut input), Err(Error::RecursionLimitExceeded));
}

#[test]
fn test_size_stops_at_recursion_limit() {
    let mut nested = Value::Null;
    for _ in 0..value::MAX_RECURSION_DEPTH {
        nested = Value::Array(vec![nested]);
    }
    let mut w = Writer::new();
    nested.write(&mut w).unwrap();
    assert_eq!(w.len(), nested.size());

    let mut deep = nested;
    for _ in 0..50 {
        deep = Value::Map(vec![(Value::Null, deep)]);
    }
    assert!(deep.size() > 0);
    let request = MsgRpcRequest { args: vec![deep], ..Default::default() };
    assert_eq!(codec().encode(&origin(), 0, &request), Err(Error::RecursionLimitExceeded));
}

#[test]
fn test_unknown_value_tag() {
    let buf = Bytes::from_static(&[200]);
    let mut input = Input::new(&buf);
    assert_eq!(Value::read(&mut input), Err(Error::UnknownValueTag(200)));
}

// ============================================================================
//  REGISTRY TESTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Ping {
    nonce: u64,
}

impl Msg for Ping {
    fn msg_id(&self) -> MsgId { custom_msg_id::<Self>() }
    fn size(&self) -> usize { tidepack::size::uvarint(self.nonce) }
    fn write(&self, w: &mut Writer) -> Result<()> {
        w.uvarint(self.nonce);
        Ok(())
    }
    fn read(&mut self, input: &mut Input<'_>) -> Result<()> {
        self.nonce = input.uvarint()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FakeReply;

impl Msg for FakeReply {
    fn msg_id(&self) -> MsgId { msg_id::RPC_REPLY }
    fn size(&self) -> usize { 0 }
    fn write(&self, _: &mut Writer) -> Result<()> { Ok(()) }
    fn read(&mut self, _: &mut Input<'_>) -> Result<()> { Ok(()) }
}

#[test]
fn test_custom_message_registration() {
    let mut reg = MsgRegistry::with_builtins();
    let id = reg.register::<Ping>().unwrap();
    assert!(id >= msg_id::CUSTOMIZE);
    assert_eq!(id, custom_msg_id::<Ping>());
    assert_eq!(custom_msg_id::<Ping>(), custom_msg_id::<Ping>());
    assert_ne!(custom_msg_id::<Ping>(), custom_msg_id::<LyingMsg>());

    let codec = Codec::new(Arc::new(reg));
    let bytes = codec.encode(&origin(), 0, &Ping { nonce: 77 }).unwrap();
    let (_, ping) = codec.decode(bytes).unwrap().into_msg::<Ping>().unwrap();
    assert_eq!(ping.nonce, 77);
}

#[test]
fn test_duplicate_registration_rejected() {
    let mut reg = MsgRegistry::with_builtins();
    let err = reg.register::<FakeReply>().unwrap_err();
    assert!(matches!(err, Error::DuplicateMsgId { id: msg_id::RPC_REPLY, .. }));

    reg.register::<Ping>().unwrap();
    assert!(reg.register::<Ping>().is_err());
}

// ============================================================================
//  CALL PATH TESTS
// ============================================================================

#[test]
fn test_call_path_roundtrip_all_categories() {
    let paths = [
        CallPath::service("bag", "list"),
        CallPath::runtime("e1", "timer", "tick"),
        CallPath::entity("e1", "c", "m"),
        CallPath::client("e1", "notify").exclude_src(),
        CallPath::service("chat", "say").exclude_src(),
    ];
    for cp in paths {
        let encoded = cp.encode().unwrap();
        assert_eq!(encoded, cp.to_string());
        assert_eq!(CallPath::parse(&encoded).unwrap(), cp);
    }
}

#[test]
fn test_call_path_layouts() {
    assert_eq!(CallPath::service("bag", "list").encode().unwrap(), "S>bag>list");
    assert_eq!(CallPath::entity("e1", "c", "m").encode().unwrap(), "E>e1>c>m");
    assert_eq!(CallPath::client("e1", "m").exclude_src().encode().unwrap(), "C!>e1>m");
}

#[test]
fn test_call_path_rejections() {
    for bad in ["X>a>b", "", "S>only", "E>e1>c", "E>e1>c>m>extra", "S>>m", "R>e1>p"] {
        assert!(
            matches!(CallPath::parse(bad), Err(Error::InvalidCallPath(_))),
            "accepted {:?}",
            bad
        );
    }
    assert!(CallPath::entity("e>1", "c", "m").encode().is_err());
    assert!(CallPath::service("", "m").encode().is_err());
}
