// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Response payload reader, the inverse of [`ProtocolWriter`].
//!
//! All read methods fail with [`ErrorCode::BadProtocolMessage`] on a
//! truncated or malformed buffer rather than panicking.
//!
//! [`ProtocolWriter`]: super::ProtocolWriter

use bytes::Bytes;
use serde_json::Value;

use super::writer::unzigzag64;
use crate::error::{ErrorCode, NoSQLError};

/// Cursor over a response body.
#[derive(Debug)]
pub struct ProtocolReader {
    buf: Bytes,
    pos: usize,
}

impl ProtocolReader {
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8, NoSQLError> {
        let b = *self.buf.get(self.pos).ok_or_else(|| truncated("byte"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bool(&mut self) -> Result<bool, NoSQLError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, NoSQLError> {
        let end = self.pos + 2;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| truncated("i16"))?;
        let v = i16::from_be_bytes([slice[0], slice[1]]);
        self.pos = end;
        Ok(v)
    }

    pub fn read_packed_i32(&mut self) -> Result<i32, NoSQLError> {
        let v = self.read_packed_i64()?;
        i32::try_from(v).map_err(|_| malformed("packed i32 out of range"))
    }

    pub fn read_packed_i64(&mut self) -> Result<i64, NoSQLError> {
        let mut shift = 0u32;
        let mut acc = 0u64;
        loop {
            let b = self.read_byte()?;
            acc |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(unzigzag64(acc));
            }
            shift += 7;
            if shift >= 64 {
                return Err(malformed("varint too long"));
            }
        }
    }

    /// Inverse of `write_string`: length -1 yields `None`.
    pub fn read_string(&mut self) -> Result<Option<String>, NoSQLError> {
        match self.read_raw_len("string")? {
            None => Ok(None),
            Some(bytes) => {
                let s = std::str::from_utf8(&bytes).map_err(|_| malformed("invalid utf-8"))?;
                Ok(Some(s.to_owned()))
            }
        }
    }

    /// Inverse of `write_bytes`: length -1 yields `None`.
    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, NoSQLError> {
        self.read_raw_len("bytes")
    }

    /// Inverse of `write_value`.
    pub fn read_value(&mut self) -> Result<Value, NoSQLError> {
        let text = self
            .read_string()?
            .ok_or_else(|| malformed("missing value"))?;
        serde_json::from_str(&text).map_err(|_| malformed("invalid value text"))
    }

    fn read_raw_len(&mut self, what: &'static str) -> Result<Option<Vec<u8>>, NoSQLError> {
        let len = self.read_packed_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        let end = self.pos + len;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| truncated(what))?;
        let out = slice.to_vec();
        self.pos = end;
        Ok(Some(out))
    }
}

fn truncated(what: &'static str) -> NoSQLError {
    NoSQLError::Service {
        code: ErrorCode::BadProtocolMessage,
        message: format!("truncated response reading {what}"),
    }
}

fn malformed(detail: &str) -> NoSQLError {
    NoSQLError::Service {
        code: ErrorCode::BadProtocolMessage,
        message: format!("malformed response: {detail}"),
    }
}
