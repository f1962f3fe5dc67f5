use crate::*;

// ============================================================================
//  SCALAR TESTS
// ============================================================================

#[test]
fn test_fixed_width_roundtrip() -> Result<()> {
    let mut w = Writer::new();
    w.bool(true);
    w.u8(255);
    w.i8(-128);
    w.u16(u16::MAX);
    w.i16(i16::MIN);
    w.u32(0xDEAD_BEEF);
    w.i32(i32::MIN);
    w.u64(u64::MAX);
    w.i64(i64::MIN);
    w.f32(1.5);
    w.f64(std::f64::consts::PI);

    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);

    assert_eq!(r.bool()?, true);
    assert_eq!(r.u8()?, 255);
    assert_eq!(r.i8()?, -128);
    assert_eq!(r.u16()?, u16::MAX);
    assert_eq!(r.i16()?, i16::MIN);
    assert_eq!(r.u32()?, 0xDEAD_BEEF);
    assert_eq!(r.i32()?, i32::MIN);
    assert_eq!(r.u64()?, u64::MAX);
    assert_eq!(r.i64()?, i64::MIN);
    assert_eq!(r.f32()?, 1.5);
    assert_eq!(r.f64()?, std::f64::consts::PI);
    assert_eq!(r.remaining(), 0);
    Ok(())
}

#[test]
fn test_integers_are_big_endian() {
    let mut w = Writer::new();
    w.u32(0x0102_0304);
    w.u16(0x0A0B);
    assert_eq!(w.as_bytes(), &[0x01, 0x02, 0x03, 0x04, 0x0A, 0x0B]);
}

// ============================================================================
//  VARINT TESTS
// ============================================================================

#[test]
fn test_uvarint_boundaries() -> Result<()> {
    let cases = [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX];
    for v in cases {
        let mut w = Writer::new();
        w.uvarint(v);
        assert_eq!(w.len(), size::uvarint(v), "size mismatch for {}", v);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.uvarint()?, v);
        assert_eq!(r.remaining(), 0);
    }
    Ok(())
}

#[test]
fn test_varint_zigzag_boundaries() -> Result<()> {
    let cases = [0i64, -1, 1, -64, 63, -65, 64, i64::MAX, i64::MIN];
    for v in cases {
        let mut w = Writer::new();
        w.varint(v);
        assert_eq!(w.len(), size::varint(v), "size mismatch for {}", v);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.varint()?, v);
    }
    Ok(())
}

#[test]
fn test_small_signed_values_stay_small() {
    assert_eq!(size::varint(-1), 1);
    assert_eq!(size::varint(63), 1);
    assert_eq!(size::varint(64), 2);
    assert_eq!(size::varint(i64::MAX), MAX_VARINT_LEN);
}

#[test]
fn test_uvarint_overflow_rejected() {
    let bytes = [0xFFu8; 11];
    let mut r = Reader::new(&bytes);
    assert_eq!(r.uvarint(), Err(Error::VarintOverflow));

    // Ten bytes where the last one carries more than the final bit.
    let mut bytes = [0xFFu8; 10];
    bytes[9] = 0x02;
    let mut r = Reader::new(&bytes);
    assert_eq!(r.uvarint(), Err(Error::VarintOverflow));
}

// ============================================================================
//  BLOB TESTS
// ============================================================================

#[test]
fn test_str_and_bytes_roundtrip() -> Result<()> {
    let mut w = Writer::new();
    w.str("");
    w.str("hello 🌊");
    w.bytes(&[]);
    w.bytes(&[1, 2, 3]);
    assert_eq!(w.len(), size::str("") + size::str("hello 🌊") + size::bytes(&[]) + size::bytes(&[1, 2, 3]));

    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    assert_eq!(r.str()?, "");
    assert_eq!(r.str()?, "hello 🌊");
    assert_eq!(r.bytes()?, &[] as &[u8]);
    assert_eq!(r.bytes()?, &[1, 2, 3]);
    Ok(())
}

#[test]
fn test_blobs_borrow_the_source_buffer() -> Result<()> {
    let mut w = Writer::new();
    w.bytes(b"payload");
    let bytes = w.into_bytes();

    let mut r = Reader::new(&bytes);
    let view = r.bytes()?;
    let src = bytes.as_ptr() as usize;
    let ptr = view.as_ptr() as usize;
    assert!(ptr >= src && ptr < src + bytes.len());
    Ok(())
}

#[test]
fn test_invalid_utf8_rejected() {
    let mut w = Writer::new();
    w.bytes(&[0xC3, 0x28]);
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    assert_eq!(r.str(), Err(Error::InvalidUtf8));
}

// ============================================================================
//  BOUNDS TESTS
// ============================================================================

#[test]
fn test_short_buffer_reports_needed_bytes() {
    let bytes = [0u8; 3];
    let mut r = Reader::new(&bytes);
    assert_eq!(r.u32(), Err(Error::UnexpectedEnd { needed: 4, have: 3 }));
    // A failed read does not advance.
    assert_eq!(r.position(), 0);
}

#[test]
fn test_truncated_blob_rejected() {
    let mut w = Writer::new();
    w.str("truncated");
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes[..5]);
    assert!(matches!(r.str(), Err(Error::UnexpectedEnd { .. })));
}

#[test]
fn test_raw_is_unprefixed() -> Result<()> {
    let mut w = Writer::new();
    w.raw(b"abc");
    assert_eq!(w.len(), 3);
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    assert_eq!(r.raw(3)?, b"abc");
    Ok(())
}
