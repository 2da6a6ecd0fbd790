//! Configuration for the driver client.
//!
//! # Example
//!
//! ```
//! use nosql_driver::ClientConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ClientConfig {
//!     endpoint: "http://localhost:8080".into(),
//!     ..Default::default()
//! };
//! assert_eq!(config.request_timeout_ms, 5_000);
//!
//! // Full config
//! let config = ClientConfig {
//!     endpoint: "https://nosql.example.com:443".into(),
//!     rate_limiting_enabled: true,
//!     default_rate_limiter_percentage: 50.0,
//!     default_compartment: Some("dev-tenancy".into()),
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the driver client.
///
/// All fields except `endpoint` have sensible defaults. Collaborators
/// (transport, authorization provider, retry handler) are passed to
/// [`Client::new`](crate::Client::new) separately; this struct is pure data.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Service endpoint URL. Scheme must be `http` or `https`.
    #[serde(default)]
    pub endpoint: String,

    /// Default per-request timeout in milliseconds, applied by
    /// `set_defaults` when a request has none.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for table metadata operations in milliseconds.
    #[serde(default = "default_table_request_timeout_ms")]
    pub table_request_timeout_ms: u64,

    /// Connection pool sizing, passed through to the transport.
    #[serde(default = "default_connection_pool_size")]
    pub connection_pool_size: usize,
    #[serde(default = "default_pool_max_pending")]
    pub pool_max_pending: usize,

    /// Maximum request payload accepted by an on-premises proxy, in bytes.
    /// The cloud path uses the protocol's own hardcoded limit instead.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Maximum HTTP chunk size, passed through to the transport.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Optional HTTP proxy, passed through to the transport.
    #[serde(default)]
    pub proxy_host: Option<String>,
    #[serde(default)]
    pub proxy_port: Option<u16>,

    /// Client-side rate limiting (cloud only, ignored for on-premises auth).
    #[serde(default)]
    pub rate_limiting_enabled: bool,

    /// Default share of a table's capacity one request may consume, in
    /// percent. 0 means "no scaling" (full bucket).
    #[serde(default)]
    pub default_rate_limiter_percentage: f64,

    /// Compartment applied to requests that do not set one.
    #[serde(default)]
    pub default_compartment: Option<String>,

    /// Retry policy knobs consumed by the default retry handler.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_table_request_timeout_ms() -> u64 {
    10_000
}
fn default_connection_pool_size() -> usize {
    2
}
fn default_pool_max_pending() -> usize {
    3
}
fn default_max_content_length() -> usize {
    32 * 1024 * 1024 // 32 MB
}
fn default_max_chunk_size() -> usize {
    64 * 1024
}
fn default_max_retries() -> u32 {
    10
}
fn default_retry_base_delay_ms() -> u64 {
    200
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            table_request_timeout_ms: default_table_request_timeout_ms(),
            connection_pool_size: default_connection_pool_size(),
            pool_max_pending: default_pool_max_pending(),
            max_content_length: default_max_content_length(),
            max_chunk_size: default_max_chunk_size(),
            proxy_host: None,
            proxy_port: None,
            rate_limiting_enabled: false,
            default_rate_limiter_percentage: 0.0,
            default_compartment: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}
