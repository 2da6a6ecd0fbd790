// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operation requests and results.
//!
//! Every operation owns a [`RequestState`] (timeout, table, limiters, retry
//! accounting) and implements [`NoSqlRequest`]: defaulting, validation,
//! capability flags, and its slice of the wire codec. The engine drives
//! requests exclusively through this trait; the concrete types add typed
//! `execute` conveniences on top.

pub mod query;
pub mod rows;
pub mod table;

pub use query::{PreparedStatement, QueryDriver, QueryRequest, QueryResult};
pub use rows::{DeleteRequest, DeleteResult, GetRequest, GetResult, PutOption, PutRequest, PutResult};
pub use table::{GetTableRequest, TableResult};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::error::NoSQLError;
use crate::limiter::RateLimiter;
use crate::protocol::{OpCode, ProtocolReader, ProtocolWriter};
use crate::types::{ConsumedCapacity, RetryStats};

/// Per-request execution state shared by all operation types.
///
/// The engine mutates this across loop iterations: retry stats accumulate,
/// limiters resolved from the table map are cached here, and the start
/// instant anchors the timeout budget.
#[derive(Default)]
pub struct RequestState {
    /// Total budget for the request. Zero until `set_defaults` runs.
    pub timeout: Duration,
    pub table_name: Option<String>,
    pub compartment: Option<String>,
    /// Share of the table's capacity this request may use, in percent.
    /// Zero means "use the config default".
    pub rate_limiter_percentage: f64,
    pub retry_stats: RetryStats,
    pub(crate) read_limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) write_limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) start_time: Option<Instant>,
}

impl RequestState {
    /// Attach a caller-supplied read limiter, overriding the table map.
    pub fn set_read_rate_limiter(&mut self, limiter: Arc<dyn RateLimiter>) {
        self.read_limiter = Some(limiter);
    }

    /// Attach a caller-supplied write limiter, overriding the table map.
    pub fn set_write_rate_limiter(&mut self, limiter: Arc<dyn RateLimiter>) {
        self.write_limiter = Some(limiter);
    }

    #[must_use]
    pub fn read_rate_limiter(&self) -> Option<Arc<dyn RateLimiter>> {
        self.read_limiter.clone()
    }

    #[must_use]
    pub fn write_rate_limiter(&self) -> Option<Arc<dyn RateLimiter>> {
        self.write_limiter.clone()
    }

    /// Budget left before the request deadline, `None` once expired.
    #[must_use]
    pub fn remaining_budget(&self) -> Option<Duration> {
        let start = self.start_time?;
        let elapsed = start.elapsed();
        if elapsed >= self.timeout {
            return None;
        }
        Some(self.timeout - elapsed)
    }

    pub(crate) fn apply_timeout_default(&mut self, default_ms: u64) {
        if self.timeout.is_zero() {
            self.timeout = Duration::from_millis(default_ms);
        }
    }

    pub(crate) fn validate_common(&self) -> Result<(), NoSQLError> {
        if self.timeout.is_zero() {
            return Err(NoSQLError::IllegalArgument(
                "request timeout must be positive".into(),
            ));
        }
        let pct = self.rate_limiter_percentage;
        if pct != 0.0 && !(1.0..=100.0).contains(&pct) {
            return Err(NoSQLError::IllegalArgument(format!(
                "rate limiter percentage must be 0 or in [1,100], got {pct}"
            )));
        }
        if let Some(name) = self.table_name.as_deref() {
            validate_table_name(name)?;
        }
        Ok(())
    }
}

fn validate_table_name(name: &str) -> Result<(), NoSQLError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(NoSQLError::IllegalArgument(format!(
            "invalid table name: '{name}'"
        )));
    }
    Ok(())
}

/// The engine's view of an operation.
pub trait NoSqlRequest: Send {
    fn state(&self) -> &RequestState;
    fn state_mut(&mut self) -> &mut RequestState;

    /// Operation name for logging and metrics.
    fn operation(&self) -> &'static str;

    fn does_reads(&self) -> bool {
        false
    }

    fn does_writes(&self) -> bool {
        false
    }

    /// Fill unset fields from config so everything sent on the wire is
    /// explicit.
    fn set_defaults(&mut self, config: &ClientConfig) {
        self.state_mut().apply_timeout_default(config.request_timeout_ms);
    }

    fn validate(&self) -> Result<(), NoSQLError>;

    /// Write the operation payload (after the serial version header).
    fn serialize(&self, w: &mut ProtocolWriter) -> Result<(), NoSQLError>;

    /// Decode a success payload. Takes `&mut self` because query responses
    /// bind state (the driver) back into the request.
    fn deserialize(&mut self, r: &mut ProtocolReader) -> Result<OperationResult, NoSQLError>;

    /// Downcast hook for the query pre-dispatch state machine.
    fn as_query_mut(&mut self) -> Option<&mut QueryRequest> {
        None
    }
}

/// Write the payload header every operation starts with.
pub(crate) fn write_op_header(w: &mut ProtocolWriter, op: OpCode, state: &RequestState) {
    w.write_byte(op as u8);
    w.write_packed_i32(state.timeout.as_millis() as i32);
    w.write_string(state.table_name.as_deref());
}

/// Decoded result of any operation.
#[derive(Debug)]
pub enum OperationResult {
    Table(TableResult),
    Get(GetResult),
    Put(PutResult),
    Delete(DeleteResult),
    Query(QueryResult),
}

impl OperationResult {
    #[must_use]
    pub fn consumed(&self) -> &ConsumedCapacity {
        match self {
            Self::Table(r) => &r.consumed,
            Self::Get(r) => &r.consumed,
            Self::Put(r) => &r.consumed,
            Self::Delete(r) => &r.consumed,
            Self::Query(r) => &r.consumed,
        }
    }

    pub(crate) fn set_rate_limit_delayed(&mut self, delayed: Duration) {
        let ms = delayed.as_millis() as u64;
        match self {
            Self::Table(r) => r.rate_limit_delayed_ms = ms,
            Self::Get(r) => r.rate_limit_delayed_ms = ms,
            Self::Put(r) => r.rate_limit_delayed_ms = ms,
            Self::Delete(r) => r.rate_limit_delayed_ms = ms,
            Self::Query(r) => r.rate_limit_delayed_ms = ms,
        }
    }

    pub(crate) fn set_retry_stats(&mut self, stats: RetryStats) {
        match self {
            Self::Table(r) => r.retry_stats = stats,
            Self::Get(r) => r.retry_stats = stats,
            Self::Put(r) => r.retry_stats = stats,
            Self::Delete(r) => r.retry_stats = stats,
            Self::Query(r) => r.retry_stats = stats,
        }
    }

    #[must_use]
    pub fn retry_stats(&self) -> &RetryStats {
        match self {
            Self::Table(r) => &r.retry_stats,
            Self::Get(r) => &r.retry_stats,
            Self::Put(r) => &r.retry_stats,
            Self::Delete(r) => &r.retry_stats,
            Self::Query(r) => &r.retry_stats,
        }
    }

    #[must_use]
    pub fn rate_limit_delayed_ms(&self) -> u64 {
        match self {
            Self::Table(r) => r.rate_limit_delayed_ms,
            Self::Get(r) => r.rate_limit_delayed_ms,
            Self::Put(r) => r.rate_limit_delayed_ms,
            Self::Delete(r) => r.rate_limit_delayed_ms,
            Self::Query(r) => r.rate_limit_delayed_ms,
        }
    }
}

/// Read the consumed-capacity block every data response starts with.
pub(crate) fn read_consumed(r: &mut ProtocolReader) -> Result<ConsumedCapacity, NoSQLError> {
    Ok(ConsumedCapacity {
        read_units: r.read_packed_i64()?.max(0) as u64,
        read_kb: r.read_packed_i64()?.max(0) as u64,
        write_units: r.read_packed_i64()?.max(0) as u64,
        write_kb: r.read_packed_i64()?.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("users").is_ok());
        assert!(validate_table_name("ns:Users.audit-2024").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("_leading").is_err());
        assert!(validate_table_name("has space").is_err());
    }

    #[test]
    fn test_common_validation_rejects_bad_percentage() {
        let mut state = RequestState::default();
        state.timeout = Duration::from_secs(1);
        state.rate_limiter_percentage = 0.5;
        assert!(state.validate_common().is_err());
        state.rate_limiter_percentage = 100.0;
        assert!(state.validate_common().is_ok());
        state.rate_limiter_percentage = 0.0;
        assert!(state.validate_common().is_ok());
    }

    #[test]
    fn test_remaining_budget() {
        let mut state = RequestState::default();
        assert!(state.remaining_budget().is_none());
        state.timeout = Duration::from_secs(10);
        state.start_time = Some(Instant::now());
        assert!(state.remaining_budget().unwrap() > Duration::from_secs(9));
        state.start_time = Some(Instant::now() - Duration::from_secs(11));
        assert!(state.remaining_budget().is_none());
    }

    #[test]
    fn test_timeout_default_applies_once() {
        let mut state = RequestState::default();
        state.apply_timeout_default(5_000);
        assert_eq!(state.timeout, Duration::from_millis(5_000));
        state.apply_timeout_default(9_000);
        assert_eq!(state.timeout, Duration::from_millis(5_000));
    }
}
