//! Segment record encoding
//!
//! `<key>,<compact-json-value>\n`

use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::Key;

/// Separates the key from the serialized value
pub const KEY_DELIMITER: u8 = b',';

/// Ends every record line
pub const RECORD_TERMINATOR: u8 = b'\n';

/// A single key/value record as stored in a segment
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Key,
    pub value: Value,
}

/// Why a record line failed to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Line does not end with the terminator (torn write or bad offset)
    #[error("record line is not terminated")]
    Unterminated,

    #[error("record line is not valid UTF-8")]
    InvalidUtf8,

    #[error("record line has no key delimiter")]
    MissingDelimiter,

    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl Record {
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }

    /// Encode as a complete line, terminator included
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = self.key.to_string().into_bytes();
        line.push(KEY_DELIMITER);
        serde_json::to_writer(&mut line, &self.value)?;
        line.push(RECORD_TERMINATOR);
        Ok(line)
    }

    /// Decode one complete line, terminator included
    pub fn decode(line: &[u8]) -> std::result::Result<Self, RecordError> {
        let body = line
            .strip_suffix(&[RECORD_TERMINATOR])
            .ok_or(RecordError::Unterminated)?;
        let text = std::str::from_utf8(body).map_err(|_| RecordError::InvalidUtf8)?;

        let (key_text, value_text) = text
            .split_once(KEY_DELIMITER as char)
            .ok_or(RecordError::MissingDelimiter)?;

        let key = key_text
            .parse::<Key>()
            .map_err(|_| RecordError::InvalidKey(key_text.to_string()))?;
        let value = serde_json::from_str(value_text)
            .map_err(|e| RecordError::InvalidValue(e.to_string()))?;

        Ok(Self { key, value })
    }
}
