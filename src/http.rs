// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP transport seam.
//!
//! The engine does not own a connection pool; it speaks to an
//! [`HttpTransport`] implementation through a two-phase contract: acquire a
//! pooled channel within a deadline, then run one POST on it. Transport
//! failures surface as [`NoSQLError::Transport`] and are retried by the
//! engine after a short cooldown.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::NoSQLError;

/// Header names stamped on every request.
pub const HEADER_REQUEST_ID: &str = "x-nosql-request-id";
pub const HEADER_HOST: &str = "Host";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_CONNECTION: &str = "Connection";
pub const HEADER_USER_AGENT: &str = "User-Agent";

/// Ordered header list with last-write-wins `set`.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any existing value for `name` (ASCII case-insensitive).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries
            .retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Opaque token for a pooled connection. Transports that do not pool may
/// hand out a dummy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel(pub u64);

/// One serialized request, always POST.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// The raw response handed back by the transport.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub reason: String,
    pub body: Bytes,
}

/// Connection-pool and request-execution contract.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Acquire a channel from the pool, waiting at most `timeout`.
    async fn get_channel(&self, timeout: Duration) -> Result<Channel, NoSQLError>;

    /// Run one request on `channel` and return the raw response. The engine
    /// bounds the await with the remaining iteration budget; the channel
    /// returns to the pool when the call completes, on any path.
    async fn run_request(
        &self,
        request: WireRequest,
        channel: Channel,
    ) -> Result<WireResponse, NoSQLError>;

    /// Largest request body this transport accepts, in bytes. Used for the
    /// on-premises size check.
    fn max_content_length(&self) -> usize;

    /// Tear down the pool. In-flight requests surface transport errors.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_set_replaces_case_insensitively() {
        let mut h = Headers::new();
        h.set("Content-Type", "text/plain");
        h.set("content-type", "application/octet-stream");
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/octet-stream"));
        assert_eq!(h.iter().count(), 1);
    }

    #[test]
    fn test_headers_get_miss() {
        let h = Headers::new();
        assert_eq!(h.get("Accept"), None);
    }
}
