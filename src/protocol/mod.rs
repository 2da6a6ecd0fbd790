// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binary wire protocol.
//!
//! Every request body starts with the serial version, followed by the
//! operation payload. Every HTTP 200 response body starts with a status
//! byte: zero for success (payload follows), non-zero for a mapped error
//! code followed by a UTF-8 message.
//!
//! Integers use zigzag LEB128 packing; strings are packed-length-prefixed
//! UTF-8 with -1 marking absence. See [`writer::ProtocolWriter`] and
//! [`reader::ProtocolReader`].

pub mod reader;
pub mod writer;

pub use reader::ProtocolReader;
pub use writer::ProtocolWriter;

use crate::error::NoSQLError;

/// Protocol serial version, first bytes of every request.
pub const SERIAL_VERSION: i16 = 3;

/// Fixed URI path for all data operations.
pub const NOSQL_DATA_PATH: &str = "/V2/nosql/data";

/// Hardcoded cloud limit on a serialized request, in bytes.
pub const REQUEST_SIZE_LIMIT: usize = 2 * 1024 * 1024;

/// Upper bound on the read size of a single query batch, in KB.
pub const READ_KB_LIMIT: u32 = 2 * 1024;

/// Operation codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Delete = 0,
    Get = 2,
    Put = 3,
    PutIfAbsent = 4,
    PutIfPresent = 5,
    Query = 7,
    Prepare = 8,
    GetTable = 10,
}

/// Write the serial version header into a request body.
pub fn write_serial_version(w: &mut ProtocolWriter) {
    w.write_i16(SERIAL_VERSION);
}

/// Enforce the cloud request size limit.
///
/// On-premises requests are checked against the transport's configurable
/// content length instead; callers pick which check applies.
pub fn check_request_size_limit(size: usize) -> Result<(), NoSQLError> {
    if size > REQUEST_SIZE_LIMIT {
        return Err(NoSQLError::RequestSizeLimit {
            size,
            limit: REQUEST_SIZE_LIMIT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_version_is_first() {
        let mut w = ProtocolWriter::new();
        write_serial_version(&mut w);
        w.write_byte(OpCode::Get as u8);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..2], &SERIAL_VERSION.to_be_bytes());
    }

    #[test]
    fn test_request_size_limit() {
        assert!(check_request_size_limit(REQUEST_SIZE_LIMIT).is_ok());
        let err = check_request_size_limit(REQUEST_SIZE_LIMIT + 1).unwrap_err();
        match err {
            NoSQLError::RequestSizeLimit { size, limit } => {
                assert_eq!(size, REQUEST_SIZE_LIMIT + 1);
                assert_eq!(limit, REQUEST_SIZE_LIMIT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
