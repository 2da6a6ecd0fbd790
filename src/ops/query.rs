// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query operation and the client-side continuation.
//!
//! Simple queries complete server-side in one round trip. Advanced queries
//! need a [`QueryDriver`]: the server compiles the statement on the first
//! execute, the deserializer binds a driver into the request, and every
//! later execute is a local no-op returning an empty [`QueryResult`] while
//! the driver accumulates batches on demand.

use std::sync::Weak;
use std::time::Duration;

use serde_json::Value;

use super::{read_consumed, write_op_header, NoSqlRequest, OperationResult, RequestState};
use crate::client::{Client, ClientInner};
use crate::error::NoSQLError;
use crate::protocol::{OpCode, ProtocolReader, ProtocolWriter};
use crate::types::{ConsumedCapacity, RetryStats, TopologyInfo};

/// A server-compiled query in its opaque wire form.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub statement: Vec<u8>,
    /// False when the plan needs client-side driver stages.
    pub is_simple: bool,
}

/// Client-side continuation for an advanced query.
///
/// The driver holds a weak handle to the engine; the engine never retains
/// drivers, so dropping the client invalidates outstanding continuations
/// instead of leaking them.
pub struct QueryDriver {
    client: Weak<ClientInner>,
    topology: Option<TopologyInfo>,
    batch_counter: u32,
}

impl QueryDriver {
    pub(crate) fn new() -> Self {
        Self {
            client: Weak::new(),
            topology: None,
            batch_counter: 0,
        }
    }

    pub(crate) fn set_client(&mut self, client: Weak<ClientInner>) {
        self.client = client;
    }

    pub(crate) fn set_topology(&mut self, topology: Option<TopologyInfo>) {
        self.topology = topology;
    }

    #[must_use]
    pub fn topology(&self) -> Option<&TopologyInfo> {
        self.topology.as_ref()
    }

    /// Whether this driver is bound to `client`.
    #[must_use]
    pub fn is_bound_to(&self, client: &Client) -> bool {
        client.same_inner(&self.client)
    }

    /// Batches fetched so far through this continuation.
    #[must_use]
    pub fn batch_counter(&self) -> u32 {
        self.batch_counter
    }
}

/// Execute a query statement.
pub struct QueryRequest {
    state: RequestState,
    statement: String,
    prepared: Option<PreparedStatement>,
    max_read_kb: u32,
    limit: u32,
    topology: Option<TopologyInfo>,
    driver: Option<QueryDriver>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(statement: &str) -> Self {
        Self {
            state: RequestState::default(),
            statement: statement.to_owned(),
            prepared: None,
            max_read_kb: 0,
            limit: 0,
            topology: None,
            driver: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.state.timeout = timeout;
        self
    }

    #[must_use]
    pub fn table_name(mut self, table_name: &str) -> Self {
        self.state.table_name = Some(table_name.to_owned());
        self
    }

    /// Cap on the read size of one batch, in KB. Zero means unlimited; the
    /// engine clamps unlimited rate-limited queries to a bucket-friendly
    /// value before dispatch.
    #[must_use]
    pub fn max_read_kb(&self) -> u32 {
        self.max_read_kb
    }

    #[must_use]
    pub fn set_max_read_kb(mut self, kb: u32) -> Self {
        self.max_read_kb = kb;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Attach a previously compiled statement.
    #[must_use]
    pub fn prepared(mut self, prepared: PreparedStatement) -> Self {
        self.prepared = Some(prepared);
        self
    }

    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// True until a compilation proves the plan needs driver stages.
    #[must_use]
    pub fn is_simple_query(&self) -> bool {
        self.prepared.as_ref().map_or(true, |p| p.is_simple)
    }

    #[must_use]
    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    #[must_use]
    pub fn driver(&self) -> Option<&QueryDriver> {
        self.driver.as_ref()
    }

    pub(crate) fn driver_mut(&mut self) -> Option<&mut QueryDriver> {
        self.driver.as_mut()
    }

    pub(crate) fn bind_driver(&mut self, driver: QueryDriver) {
        self.driver = Some(driver);
    }

    pub(crate) fn clamp_max_read_kb(&mut self, kb: u32) {
        self.max_read_kb = kb;
    }

    #[must_use]
    pub fn topology_info(&self) -> Option<&TopologyInfo> {
        self.topology.as_ref()
    }

    pub async fn execute(&mut self, client: &Client) -> Result<QueryResult, NoSQLError> {
        match client.execute(self).await? {
            OperationResult::Query(res) => Ok(res),
            _ => Err(NoSQLError::IllegalState(
                "Query returned an unexpected result".into(),
            )),
        }
    }
}

impl NoSqlRequest for QueryRequest {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn operation(&self) -> &'static str {
        "Query"
    }

    fn does_reads(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        self.state.validate_common()?;
        if self.statement.trim().is_empty() && self.prepared.is_none() {
            return Err(NoSQLError::IllegalArgument(
                "Query requires a statement or a prepared statement".into(),
            ));
        }
        Ok(())
    }

    fn serialize(&self, w: &mut ProtocolWriter) -> Result<(), NoSQLError> {
        write_op_header(w, OpCode::Query, &self.state);
        match &self.prepared {
            Some(p) => {
                w.write_bool(true);
                w.write_bytes(Some(&p.statement));
                w.write_bool(p.is_simple);
            }
            None => {
                w.write_bool(false);
                w.write_string(Some(&self.statement));
            }
        }
        w.write_packed_i32(self.max_read_kb as i32);
        w.write_packed_i32(self.limit as i32);
        Ok(())
    }

    fn deserialize(&mut self, r: &mut ProtocolReader) -> Result<OperationResult, NoSQLError> {
        let consumed = read_consumed(r)?;
        let num_results = r.read_packed_i32()?.max(0) as usize;
        let mut rows = Vec::with_capacity(num_results);
        for _ in 0..num_results {
            rows.push(r.read_value()?);
        }
        let continuation_key = r.read_bytes()?;
        let is_advanced = r.read_bool()?;

        if is_advanced {
            if let Some(statement) = r.read_bytes()? {
                // first execute of an unprepared advanced query: the server
                // returns the compiled form
                self.prepared = Some(PreparedStatement {
                    statement,
                    is_simple: false,
                });
            }
            if r.read_bool()? {
                let sequence_number = r.read_packed_i64()?;
                let count = r.read_packed_i32()?.max(0) as usize;
                let mut shard_ids = Vec::with_capacity(count);
                for _ in 0..count {
                    shard_ids.push(r.read_packed_i32()?);
                }
                self.topology = Some(TopologyInfo {
                    sequence_number,
                    shard_ids,
                });
            }
            if self.driver.is_none() {
                let mut driver = QueryDriver::new();
                driver.set_topology(self.topology.clone());
                self.driver = Some(driver);
            }
        }

        Ok(OperationResult::Query(QueryResult {
            rows,
            continuation_key,
            consumed,
            rate_limit_delayed_ms: 0,
            retry_stats: RetryStats::default(),
        }))
    }

    fn as_query_mut(&mut self) -> Option<&mut QueryRequest> {
        Some(self)
    }
}

/// One batch of query results.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    /// Present when more batches remain server-side.
    pub continuation_key: Option<Vec<u8>>,
    pub consumed: ConsumedCapacity,
    pub rate_limit_delayed_ms: u64,
    pub retry_stats: RetryStats,
}

impl QueryResult {
    /// The no-I/O result returned while a driver continuation is bound.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            continuation_key: None,
            consumed: ConsumedCapacity::default(),
            rate_limit_delayed_ms: 0,
            retry_stats: RetryStats::default(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_validate_needs_statement() {
        let mut req = QueryRequest::new("   ");
        req.set_defaults(&ClientConfig::default());
        assert!(req.validate().is_err());

        let mut req = QueryRequest::new("select * from users");
        req.set_defaults(&ClientConfig::default());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_unprepared_query_is_simple_until_compiled() {
        let req = QueryRequest::new("select * from users");
        assert!(!req.is_prepared());
        assert!(req.is_simple_query());

        let req = req.prepared(PreparedStatement {
            statement: vec![1, 2],
            is_simple: false,
        });
        assert!(req.is_prepared());
        assert!(!req.is_simple_query());
    }

    fn advanced_response_payload() -> Vec<u8> {
        let mut w = ProtocolWriter::new();
        for _ in 0..4 {
            w.write_packed_i64(1);
        }
        w.write_packed_i32(1);
        w.write_value(&json!({"id": 1})).unwrap();
        w.write_bytes(None); // no continuation
        w.write_bool(true); // advanced
        w.write_bytes(Some(&[9, 9, 9])); // compiled statement
        w.write_bool(true); // topology follows
        w.write_packed_i64(4);
        w.write_packed_i32(2);
        w.write_packed_i32(0);
        w.write_packed_i32(1);
        w.into_bytes()
    }

    #[test]
    fn test_advanced_response_binds_driver_and_prepared() {
        let mut req = QueryRequest::new("select count(*) from users");
        let mut r = ProtocolReader::new(Bytes::from(advanced_response_payload()));
        let OperationResult::Query(res) = req.deserialize(&mut r).unwrap() else {
            panic!("expected query result");
        };
        assert_eq!(res.rows.len(), 1);
        assert!(req.has_driver());
        assert!(req.is_prepared());
        assert!(!req.is_simple_query());
        let topo = req.driver().unwrap().topology().unwrap();
        assert_eq!(topo.sequence_number, 4);
        assert_eq!(topo.shard_ids, vec![0, 1]);
    }

    #[test]
    fn test_simple_response_leaves_request_unbound() {
        let mut w = ProtocolWriter::new();
        for _ in 0..4 {
            w.write_packed_i64(0);
        }
        w.write_packed_i32(0);
        w.write_bytes(None);
        w.write_bool(false); // simple

        let mut req = QueryRequest::new("select * from users");
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        let OperationResult::Query(res) = req.deserialize(&mut r).unwrap() else {
            panic!("expected query result");
        };
        assert!(res.is_empty());
        assert!(!req.has_driver());
        assert!(!req.is_prepared());
    }

    #[test]
    fn test_empty_result() {
        let res = QueryResult::empty();
        assert!(res.is_empty());
        assert_eq!(res.rate_limit_delayed_ms, 0);
    }
}
