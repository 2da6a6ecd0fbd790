//! Property-based tests for the binary wire codec.
//!
//! Uses proptest to verify the round-trip laws: whatever the writer
//! produces, the reader recovers, and malformed input fails cleanly
//! instead of panicking.
//!
//! Run with: `cargo test --test codec_roundtrip`

use bytes::Bytes;
use proptest::prelude::*;
use serde_json::{json, Value};

use nosql_driver::protocol::{self, ProtocolReader, ProtocolWriter};
use nosql_driver::{ClientConfig, GetRequest, NoSqlRequest, PutRequest};

// =============================================================================
// Strategies
// =============================================================================

/// Generate JSON rows with the shape operations actually carry
fn row_strategy() -> impl Strategy<Value = Value> {
    (
        any::<i64>(),
        "[a-zA-Z0-9 ]{0,40}",
        prop::collection::vec(any::<i32>(), 0..5),
    )
        .prop_map(|(id, name, scores)| {
            json!({
                "id": id,
                "name": name,
                "scores": scores,
            })
        })
}

// =============================================================================
// Round-trip laws
// =============================================================================

proptest! {
    #[test]
    fn roundtrip_packed_i64(v in any::<i64>()) {
        let mut w = ProtocolWriter::new();
        w.write_packed_i64(v);
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        prop_assert_eq!(r.read_packed_i64().unwrap(), v);
        prop_assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn roundtrip_packed_i32(v in any::<i32>()) {
        let mut w = ProtocolWriter::new();
        w.write_packed_i32(v);
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        prop_assert_eq!(r.read_packed_i32().unwrap(), v);
    }

    #[test]
    fn roundtrip_string(s in "\\PC{0,200}") {
        let mut w = ProtocolWriter::new();
        w.write_string(Some(&s));
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        let got = r.read_string().unwrap();
        prop_assert_eq!(got.as_deref(), Some(s.as_str()));
    }

    #[test]
    fn roundtrip_bytes(b in prop::collection::vec(any::<u8>(), 0..500)) {
        let mut w = ProtocolWriter::new();
        w.write_bytes(Some(&b));
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        prop_assert_eq!(r.read_bytes().unwrap(), Some(b));
    }

    #[test]
    fn roundtrip_value(v in row_strategy()) {
        let mut w = ProtocolWriter::new();
        w.write_value(&v).unwrap();
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        prop_assert_eq!(r.read_value().unwrap(), v);
    }

    /// Mixed sequences survive in order
    #[test]
    fn roundtrip_mixed_sequence(
        n in any::<i32>(),
        s in "[a-z]{0,20}",
        flag in any::<bool>(),
    ) {
        let mut w = ProtocolWriter::new();
        w.write_packed_i32(n);
        w.write_string(Some(&s));
        w.write_bool(flag);
        w.write_string(None);
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        prop_assert_eq!(r.read_packed_i32().unwrap(), n);
        let got = r.read_string().unwrap();
        prop_assert_eq!(got.as_deref(), Some(s.as_str()));
        prop_assert_eq!(r.read_bool().unwrap(), flag);
        prop_assert_eq!(r.read_string().unwrap(), None);
    }
}

// =============================================================================
// Encoded request shape
// =============================================================================

proptest! {
    /// Every encoded request starts with the serial version header
    #[test]
    fn encoded_requests_start_with_serial_version(key in row_strategy()) {
        let mut req = GetRequest::new("users", key);
        req.set_defaults(&ClientConfig::default());
        let mut w = ProtocolWriter::new();
        protocol::write_serial_version(&mut w);
        req.serialize(&mut w).unwrap();
        let bytes = w.into_bytes();
        prop_assert_eq!(&bytes[..2], &protocol::SERIAL_VERSION.to_be_bytes()[..]);
    }

    /// Serialization is deterministic for a fixed request
    #[test]
    fn serialization_is_deterministic(value in row_strategy()) {
        let mut req = PutRequest::new("users", value);
        req.set_defaults(&ClientConfig::default());
        let mut a = ProtocolWriter::new();
        req.serialize(&mut a).unwrap();
        let mut b = ProtocolWriter::new();
        req.serialize(&mut b).unwrap();
        prop_assert_eq!(a.into_bytes(), b.into_bytes());
    }
}

// =============================================================================
// Malformed input never panics
// =============================================================================

proptest! {
    #[test]
    fn fuzz_reader_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let mut r = ProtocolReader::new(Bytes::from(bytes));
        // exercise each read path; errors are fine, panics are not
        let _ = r.read_byte();
        let _ = r.read_packed_i32();
        let _ = r.read_string();
        let _ = r.read_bytes();
        let _ = r.read_value();
        let _ = r.read_packed_i64();
    }

    #[test]
    fn fuzz_response_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..500)) {
        let mut req = GetRequest::new("users", json!({"id": 1}));
        let mut r = ProtocolReader::new(Bytes::from(bytes));
        let _ = req.deserialize(&mut r);
    }
}
