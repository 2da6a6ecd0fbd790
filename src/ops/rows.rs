// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Single-row operations: get, put, delete.
//!
//! Rows travel as JSON values. Keys are JSON objects holding the primary
//! key columns; versions are opaque byte strings used for conditional puts.

use std::time::Duration;

use serde_json::Value;

use super::{read_consumed, write_op_header, NoSqlRequest, OperationResult, RequestState};
use crate::client::Client;
use crate::error::NoSQLError;
use crate::protocol::{OpCode, ProtocolReader, ProtocolWriter};
use crate::types::{ConsumedCapacity, RetryStats};

/// Read a single row by primary key.
pub struct GetRequest {
    state: RequestState,
    key: Value,
}

impl GetRequest {
    #[must_use]
    pub fn new(table_name: &str, key: Value) -> Self {
        let mut state = RequestState::default();
        state.table_name = Some(table_name.to_owned());
        Self { state, key }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.state.timeout = timeout;
        self
    }

    pub async fn execute(&mut self, client: &Client) -> Result<GetResult, NoSQLError> {
        match client.execute(self).await? {
            OperationResult::Get(res) => Ok(res),
            _ => Err(NoSQLError::IllegalState(
                "Get returned an unexpected result".into(),
            )),
        }
    }
}

impl NoSqlRequest for GetRequest {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn operation(&self) -> &'static str {
        "Get"
    }

    fn does_reads(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        self.state.validate_common()?;
        if self.state.table_name.is_none() {
            return Err(NoSQLError::IllegalArgument("Get requires a table name".into()));
        }
        if !self.key.is_object() {
            return Err(NoSQLError::IllegalArgument(
                "Get key must be a JSON object".into(),
            ));
        }
        Ok(())
    }

    fn serialize(&self, w: &mut ProtocolWriter) -> Result<(), NoSQLError> {
        write_op_header(w, OpCode::Get, &self.state);
        w.write_value(&self.key)
    }

    fn deserialize(&mut self, r: &mut ProtocolReader) -> Result<OperationResult, NoSQLError> {
        let consumed = read_consumed(r)?;
        let row = if r.read_bool()? {
            Some(r.read_value()?)
        } else {
            None
        };
        let version = r.read_bytes()?;
        let modification_time = r.read_packed_i64()?;
        Ok(OperationResult::Get(GetResult {
            row,
            version,
            modification_time,
            consumed,
            rate_limit_delayed_ms: 0,
            retry_stats: RetryStats::default(),
        }))
    }
}

/// Result of a [`GetRequest`]. `row` is `None` when the key does not exist.
#[derive(Debug, Clone)]
pub struct GetResult {
    pub row: Option<Value>,
    pub version: Option<Vec<u8>>,
    pub modification_time: i64,
    pub consumed: ConsumedCapacity,
    pub rate_limit_delayed_ms: u64,
    pub retry_stats: RetryStats,
}

/// Conditional variants of put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutOption {
    #[default]
    None,
    IfAbsent,
    IfPresent,
}

impl PutOption {
    fn opcode(self) -> OpCode {
        match self {
            Self::None => OpCode::Put,
            Self::IfAbsent => OpCode::PutIfAbsent,
            Self::IfPresent => OpCode::PutIfPresent,
        }
    }
}

/// Write a single row.
pub struct PutRequest {
    state: RequestState,
    value: Value,
    option: PutOption,
}

impl PutRequest {
    #[must_use]
    pub fn new(table_name: &str, value: Value) -> Self {
        let mut state = RequestState::default();
        state.table_name = Some(table_name.to_owned());
        Self {
            state,
            value,
            option: PutOption::None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.state.timeout = timeout;
        self
    }

    #[must_use]
    pub fn option(mut self, option: PutOption) -> Self {
        self.option = option;
        self
    }

    pub async fn execute(&mut self, client: &Client) -> Result<PutResult, NoSQLError> {
        match client.execute(self).await? {
            OperationResult::Put(res) => Ok(res),
            _ => Err(NoSQLError::IllegalState(
                "Put returned an unexpected result".into(),
            )),
        }
    }
}

impl NoSqlRequest for PutRequest {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn operation(&self) -> &'static str {
        "Put"
    }

    fn does_reads(&self) -> bool {
        // conditional puts read the existing row
        self.option != PutOption::None
    }

    fn does_writes(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        self.state.validate_common()?;
        if self.state.table_name.is_none() {
            return Err(NoSQLError::IllegalArgument("Put requires a table name".into()));
        }
        if !self.value.is_object() {
            return Err(NoSQLError::IllegalArgument(
                "Put value must be a JSON object".into(),
            ));
        }
        Ok(())
    }

    fn serialize(&self, w: &mut ProtocolWriter) -> Result<(), NoSQLError> {
        write_op_header(w, self.option.opcode(), &self.state);
        w.write_value(&self.value)
    }

    fn deserialize(&mut self, r: &mut ProtocolReader) -> Result<OperationResult, NoSQLError> {
        let consumed = read_consumed(r)?;
        let success = r.read_bool()?;
        let version = r.read_bytes()?;
        Ok(OperationResult::Put(PutResult {
            success,
            version,
            consumed,
            rate_limit_delayed_ms: 0,
            retry_stats: RetryStats::default(),
        }))
    }
}

/// Result of a [`PutRequest`]. `success` is false when a conditional put
/// did not apply.
#[derive(Debug, Clone)]
pub struct PutResult {
    pub success: bool,
    pub version: Option<Vec<u8>>,
    pub consumed: ConsumedCapacity,
    pub rate_limit_delayed_ms: u64,
    pub retry_stats: RetryStats,
}

/// Delete a single row by primary key.
pub struct DeleteRequest {
    state: RequestState,
    key: Value,
}

impl DeleteRequest {
    #[must_use]
    pub fn new(table_name: &str, key: Value) -> Self {
        let mut state = RequestState::default();
        state.table_name = Some(table_name.to_owned());
        Self { state, key }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.state.timeout = timeout;
        self
    }

    pub async fn execute(&mut self, client: &Client) -> Result<DeleteResult, NoSQLError> {
        match client.execute(self).await? {
            OperationResult::Delete(res) => Ok(res),
            _ => Err(NoSQLError::IllegalState(
                "Delete returned an unexpected result".into(),
            )),
        }
    }
}

impl NoSqlRequest for DeleteRequest {
    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn operation(&self) -> &'static str {
        "Delete"
    }

    fn does_reads(&self) -> bool {
        true
    }

    fn does_writes(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), NoSQLError> {
        self.state.validate_common()?;
        if self.state.table_name.is_none() {
            return Err(NoSQLError::IllegalArgument(
                "Delete requires a table name".into(),
            ));
        }
        if !self.key.is_object() {
            return Err(NoSQLError::IllegalArgument(
                "Delete key must be a JSON object".into(),
            ));
        }
        Ok(())
    }

    fn serialize(&self, w: &mut ProtocolWriter) -> Result<(), NoSQLError> {
        write_op_header(w, OpCode::Delete, &self.state);
        w.write_value(&self.key)
    }

    fn deserialize(&mut self, r: &mut ProtocolReader) -> Result<OperationResult, NoSQLError> {
        let consumed = read_consumed(r)?;
        let success = r.read_bool()?;
        Ok(OperationResult::Delete(DeleteResult {
            success,
            consumed,
            rate_limit_delayed_ms: 0,
            retry_stats: RetryStats::default(),
        }))
    }
}

/// Result of a [`DeleteRequest`].
#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub success: bool,
    pub consumed: ConsumedCapacity,
    pub rate_limit_delayed_ms: u64,
    pub retry_stats: RetryStats,
}
