//! # NoSQL Driver Execution Core
//!
//! The client-side request execution engine of a driver for a hosted NoSQL
//! key-value/tabular service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Caller                              │
//! │  • Builds typed requests (Get, Put, Delete, Query, ...)    │
//! │  • One shared Client across all tasks                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Execution Engine                         │
//! │  • Defaulting, validation, query pre-dispatch              │
//! │  • Retry loop under one per-request timeout budget         │
//! │  • Error classification with root-cause preservation       │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │      Rate Limiters        │   │       Binary Codec          │
//! │  • Token bucket per       │   │  • Serial version header    │
//! │    (table, direction)     │   │  • Packed ints + strings    │
//! │  • Background refresh of  │   │  • Status byte demux to     │
//! │    table limits           │   │    typed errors             │
//! └───────────────────────────┘   └─────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Collaborators (trait seams)                    │
//! │  • HttpTransport: pooled channels, POST + await            │
//! │  • AuthorizationProvider: auth string + header stamping    │
//! │  • RetryHandler: retry gating and backoff                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nosql_driver::{Client, ClientConfig, GetRequest, NoAuthProvider};
//! use serde_json::json;
//!
//! # async fn run(transport: Arc<dyn nosql_driver::HttpTransport>) -> Result<(), nosql_driver::NoSQLError> {
//! let config = ClientConfig {
//!     endpoint: "http://localhost:8080".into(),
//!     rate_limiting_enabled: true,
//!     ..Default::default()
//! };
//! let client = Client::new(config, transport, Arc::new(NoAuthProvider))?;
//!
//! let res = GetRequest::new("users", json!({"id": 10}))
//!     .execute(&client)
//!     .await?;
//! if let Some(row) = res.row {
//!     println!("found: {row}");
//! }
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Timeout Budgets**: one deadline per request, honored across every
//!   retry, limiter wait, and HTTP await
//! - **Client-Side Rate Limiting**: per-table token buckets seeded from
//!   server-reported limits, refreshed in the background
//! - **Retry Classification**: throttling, security-not-ready, transport,
//!   and terminal errors each take their own path
//! - **Query Continuations**: advanced queries bind a driver-side
//!   continuation and skip the network on re-execution
//! - **Root-Cause Preservation**: timeouts carry the last failure and the
//!   accumulated retry statistics
//!
//! ## Modules
//!
//! - [`client`]: The [`Client`] execution engine and background refresh
//! - [`ops`]: Request and result types per operation
//! - [`limiter`]: Token buckets and the per-table limiter map
//! - [`protocol`]: Binary wire codec
//! - [`retry`]: Retry policy seam and default backoff handler
//! - [`http`], [`auth`]: Collaborator contracts

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod metrics;
pub mod ops;
pub mod protocol;
pub mod retry;
pub mod types;

pub use auth::{AuthorizationProvider, NoAuthProvider};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ErrorCode, NoSQLError};
pub use http::{Channel, Headers, HttpTransport, WireRequest, WireResponse};
pub use limiter::{RateLimiter, RateLimiterMap, SimpleRateLimiter};
pub use ops::{
    DeleteRequest, DeleteResult, GetRequest, GetResult, GetTableRequest, NoSqlRequest,
    OperationResult, PreparedStatement, PutOption, PutRequest, PutResult, QueryDriver,
    QueryRequest, QueryResult, RequestState, TableResult,
};
pub use retry::{DefaultRetryHandler, RetryHandler};
pub use types::{ConsumedCapacity, RetryStats, TableLimits, TableState, TopologyInfo};
