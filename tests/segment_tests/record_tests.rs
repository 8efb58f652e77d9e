//! Tests for record encoding
//!
//! These tests verify:
//! - The `<key>,<json>\n` line layout
//! - Negative keys and nested values
//! - Rejection of malformed lines

use hashkv::segment::{Record, RecordError};
use serde_json::json;

// =============================================================================
// Encode Tests
// =============================================================================

#[test]
fn test_encode_layout() {
    let record = Record::new(7, json!({"name": "a"}));

    let line = record.encode().unwrap();

    assert_eq!(line, b"7,{\"name\":\"a\"}\n".to_vec());
}

#[test]
fn test_encode_small_record_is_ten_bytes() {
    let line = Record::new(0, json!({"v": 0})).encode().unwrap();

    assert_eq!(line.len(), 10);
}

#[test]
fn test_encode_negative_key() {
    let line = Record::new(-42, json!(1)).encode().unwrap();

    assert_eq!(line, b"-42,1\n".to_vec());
}

#[test]
fn test_encode_has_single_terminator() {
    // Newlines inside strings are escaped by JSON
    let line = Record::new(1, json!("two\nlines")).encode().unwrap();

    assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
    assert_eq!(line.last(), Some(&b'\n'));
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_decode_encoded_record() {
    let record = Record::new(i64::MIN, json!({"nested": {"list": [1, 2, 3]}, "ok": true}));
    let line = record.encode().unwrap();

    assert_eq!(Record::decode(&line).unwrap(), record);
}

#[test]
fn test_decode_value_containing_commas() {
    let record = Record::decode(b"3,[1,2,3]\n").unwrap();

    assert_eq!(record.key, 3);
    assert_eq!(record.value, json!([1, 2, 3]));
}

#[test]
fn test_decode_unterminated() {
    let result = Record::decode(b"1,{\"a\":1}");

    assert_eq!(result, Err(RecordError::Unterminated));
}

#[test]
fn test_decode_missing_delimiter() {
    let result = Record::decode(b"12345\n");

    assert_eq!(result, Err(RecordError::MissingDelimiter));
}

#[test]
fn test_decode_invalid_key() {
    let result = Record::decode(b"abc,1\n");

    assert_eq!(result, Err(RecordError::InvalidKey("abc".to_string())));
}

#[test]
fn test_decode_invalid_value() {
    let result = Record::decode(b"1,{not json}\n");

    assert!(matches!(result, Err(RecordError::InvalidValue(_))));
}

#[test]
fn test_decode_invalid_utf8() {
    let result = Record::decode(&[b'1', b',', 0xff, b'\n']);

    assert_eq!(result, Err(RecordError::InvalidUtf8));
}
