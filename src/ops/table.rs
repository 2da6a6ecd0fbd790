// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Table metadata operation.
//!
//! `GetTable` is both a public operation and the engine's own probe: the
//! background limiter refresh issues one whenever a table first shows up
//! without an entry in the limiter map.

use std::time::Duration;

use super::{write_op_header, NoSqlRequest, OperationResult, RequestState};
use crate::client::Client;
use crate::error::NoSQLError;
use crate::protocol::{OpCode, ProtocolReader, ProtocolWriter};
use crate::types::{ConsumedCapacity, RetryStats, TableLimits, TableState};

/// Fetch a table's state and limits.
#[derive(Default)]
pub struct GetTableRequest {
    state: RequestState,
}

impl GetTableRequest {
    #[must_use]
    pub fn new(table_name: &str) -> Self {
        let mut state = RequestState::default();
        state.table_name = Some(table_name.to_owned());
        Self { state }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.state.timeout = timeout;
        self
    }

    #[must_use]
    pub fn compartment(mut self, compartment: &str) -> Self {
        self.state.compartment = Some(compartment.to_owned());
        self
    }

    /// Execute against `client`, returning the typed result.
    pub async fn execute(&mut self, client: &Client) -> Result<TableResult, NoSQLError> {
        match client.execute(self).await? {
            OperationResult::Table(res) => Ok(res),
            _ => Err(NoSQLError::IllegalState(
                "GetTable returned a non-table result".into(),
            )),
        }
    }
}

impl NoSqlRequest for GetTableRequest {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn operation(&self) -> &'static str {
        "GetTable"
    }

    fn set_defaults(&mut self, config: &crate::config::ClientConfig) {
        self.state
            .apply_timeout_default(config.table_request_timeout_ms);
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        self.state.validate_common()?;
        if self.state.table_name.is_none() {
            return Err(NoSQLError::IllegalArgument(
                "GetTable requires a table name".into(),
            ));
        }
        Ok(())
    }

    fn serialize(&self, w: &mut ProtocolWriter) -> Result<(), NoSQLError> {
        write_op_header(w, OpCode::GetTable, &self.state);
        Ok(())
    }

    fn deserialize(&mut self, r: &mut ProtocolReader) -> Result<OperationResult, NoSQLError> {
        let table_name = r
            .read_string()?
            .or_else(|| self.state.table_name.clone())
            .unwrap_or_default();
        let table_state = TableState::from_wire(r.read_byte()?);
        let limits = if r.read_bool()? {
            Some(TableLimits::new(
                r.read_packed_i32()?.max(0) as u32,
                r.read_packed_i32()?.max(0) as u32,
                r.read_packed_i32()?.max(0) as u32,
            ))
        } else {
            None
        };
        Ok(OperationResult::Table(TableResult {
            table_name,
            table_state,
            limits,
            consumed: ConsumedCapacity::default(),
            rate_limit_delayed_ms: 0,
            retry_stats: RetryStats::default(),
        }))
    }
}

/// Result of a [`GetTableRequest`].
#[derive(Debug, Clone)]
pub struct TableResult {
    pub table_name: String,
    pub table_state: TableState,
    /// Absent for on-premises tables, which have no provisioned throughput.
    pub limits: Option<TableLimits>,
    pub consumed: ConsumedCapacity,
    pub rate_limit_delayed_ms: u64,
    pub retry_stats: RetryStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use bytes::Bytes;

    #[test]
    fn test_validate_requires_table() {
        let mut req = GetTableRequest::default();
        req.set_defaults(&ClientConfig::default());
        assert!(req.validate().is_err());

        let mut req = GetTableRequest::new("users");
        req.set_defaults(&ClientConfig::default());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_defaults_use_table_timeout() {
        let mut req = GetTableRequest::new("users");
        let config = ClientConfig::default();
        req.set_defaults(&config);
        assert_eq!(
            req.state().timeout,
            Duration::from_millis(config.table_request_timeout_ms)
        );
    }

    #[test]
    fn test_deserialize_with_limits() {
        let mut w = ProtocolWriter::new();
        w.write_string(Some("users"));
        w.write_byte(TableState::Active.to_wire());
        w.write_bool(true);
        w.write_packed_i32(500);
        w.write_packed_i32(300);
        w.write_packed_i32(25);

        let mut req = GetTableRequest::new("users");
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        let res = req.deserialize(&mut r).unwrap();
        let OperationResult::Table(res) = res else {
            panic!("expected table result");
        };
        assert_eq!(res.table_name, "users");
        assert_eq!(res.limits, Some(TableLimits::new(500, 300, 25)));
    }

    #[test]
    fn test_deserialize_without_limits() {
        let mut w = ProtocolWriter::new();
        w.write_string(None);
        w.write_byte(TableState::Creating.to_wire());
        w.write_bool(false);

        let mut req = GetTableRequest::new("users");
        let mut r = ProtocolReader::new(Bytes::from(w.into_bytes()));
        let OperationResult::Table(res) = req.deserialize(&mut r).unwrap() else {
            panic!("expected table result");
        };
        // falls back to the requested name
        assert_eq!(res.table_name, "users");
        assert_eq!(res.limits, None);
        assert_eq!(res.table_state, TableState::Creating);
    }
}
