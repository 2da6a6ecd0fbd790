// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The driver client.
//!
//! [`Client`] is a cheap-to-clone handle over the shared execution engine.
//! One instance is meant to be shared across tasks; requests from
//! concurrent callers proceed in parallel, mediated only by the transport's
//! connection pool and the per-table rate limiters. A single background
//! task owns table-limits refreshes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nosql_driver::{Client, ClientConfig, GetTableRequest, NoAuthProvider};
//! # async fn run(transport: Arc<dyn nosql_driver::HttpTransport>) -> Result<(), nosql_driver::NoSQLError> {
//! let config = ClientConfig {
//!     endpoint: "http://localhost:8080".into(),
//!     rate_limiting_enabled: true,
//!     ..Default::default()
//! };
//! let client = Client::new(config, transport, Arc::new(NoAuthProvider))?;
//!
//! let table = GetTableRequest::new("users").execute(&client).await?;
//! println!("limits: {:?}", table.limits);
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod execute;
mod refresh;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tracing::info;
use url::Url;

use crate::auth::AuthorizationProvider;
use crate::config::ClientConfig;
use crate::error::NoSQLError;
use crate::http::HttpTransport;
use crate::limiter::RateLimiterMap;
use crate::ops::{NoSqlRequest, OperationResult};
use crate::protocol::NOSQL_DATA_PATH;
use crate::retry::{DefaultRetryHandler, RetryHandler};

/// Capacity of the refresh worker's queue. A full queue flips the table
/// back to "needs refresh" so a later request re-submits.
const REFRESH_QUEUE_CAPACITY: usize = 16;

/// Shared handle to the execution engine.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) http: Arc<dyn HttpTransport>,
    pub(crate) auth: Arc<dyn AuthorizationProvider>,
    pub(crate) retry: Arc<dyn RetryHandler>,

    /// Absolute request URI, endpoint plus the fixed data path.
    pub(crate) request_uri: String,
    pub(crate) host: String,

    /// Client-scoped request id counter, strictly increasing from 1.
    next_request_id: AtomicU64,
    shutdown: AtomicBool,

    /// Rate limiting state. Always allocated; `limiting_enabled` gates use
    /// so the test hook can flip it without re-plumbing.
    pub(crate) limiting_enabled: AtomicBool,
    pub(crate) rate_limiter_map: RateLimiterMap,
    /// Table name to next-refresh deadline, nanos since `epoch`.
    pub(crate) table_limit_update: DashMap<String, AtomicU64>,
    pub(crate) refresh_gate: parking_lot::Mutex<()>,
    pub(crate) refresh_tx: mpsc::Sender<String>,
    /// Shared with the refresh worker so it can park without holding a
    /// strong handle to the client.
    pub(crate) shutdown_notify: Arc<Notify>,
    pub(crate) epoch: Instant,
}

impl Client {
    /// Create a client with the default retry handler.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthorizationProvider>,
    ) -> Result<Self, NoSQLError> {
        let retry = Arc::new(DefaultRetryHandler::new(
            config.max_retries,
            std::time::Duration::from_millis(config.retry_base_delay_ms),
        ));
        Self::with_retry_handler(config, transport, auth, retry)
    }

    /// Create a client with a caller-supplied retry policy.
    pub fn with_retry_handler(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthorizationProvider>,
        retry: Arc<dyn RetryHandler>,
    ) -> Result<Self, NoSQLError> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| NoSQLError::IllegalArgument(format!("invalid endpoint: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NoSQLError::IllegalArgument(format!(
                "unknown protocol: {}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| NoSQLError::IllegalArgument("endpoint has no host".into()))?
            .to_owned();
        let request_uri = format!(
            "{}{}",
            config.endpoint.trim_end_matches('/'),
            NOSQL_DATA_PATH
        );

        // rate limiting is a cloud feature; the secure store does its own
        let limiting = config.rate_limiting_enabled && !auth.on_premises();
        if limiting {
            info!(endpoint = %config.endpoint, "starting client with rate limiting enabled");
        } else {
            info!(endpoint = %config.endpoint, "starting client with no rate limiting");
        }

        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_CAPACITY);
        let shutdown_notify = Arc::new(Notify::new());
        let inner = Arc::new(ClientInner {
            config,
            http: transport,
            auth,
            retry,
            request_uri,
            host,
            next_request_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            limiting_enabled: AtomicBool::new(limiting),
            rate_limiter_map: RateLimiterMap::new(),
            table_limit_update: DashMap::new(),
            refresh_gate: parking_lot::Mutex::new(()),
            refresh_tx,
            shutdown_notify: shutdown_notify.clone(),
            epoch: Instant::now(),
        });
        refresh::spawn_refresh_worker(Arc::downgrade(&inner), refresh_rx, shutdown_notify);
        Ok(Self { inner })
    }

    /// Execute a request. See the module docs of [`crate::ops`] for the
    /// typed conveniences on each request type.
    #[tracing::instrument(skip_all, fields(operation = request.operation()))]
    pub async fn execute(
        &self,
        request: &mut dyn NoSqlRequest,
    ) -> Result<OperationResult, NoSQLError> {
        self.inner.execute(request).await
    }

    /// Tear down the transport, auth provider, and refresh worker.
    /// Idempotent; in-flight requests surface transport errors.
    pub async fn shutdown(&self) {
        if self
            .inner
            .shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        info!("shutting down driver client");
        self.inner.shutdown_notify.notify_waiters();
        self.inner.http.shutdown().await;
        self.inner.auth.close().await;
    }

    /// Allow tests to enable or disable rate limiting at runtime.
    pub fn enable_rate_limiting(&self, enable: bool) {
        self.inner.limiting_enabled.store(enable, Ordering::SeqCst);
        if !enable {
            self.inner.rate_limiter_map.clear();
            self.inner.table_limit_update.clear();
        }
    }

    /// Allow tests to restore a table's buckets to full capacity.
    pub fn reset_rate_limiters(&self, table: &str) {
        self.inner.rate_limiter_map.reset(table);
    }

    /// Number of tables currently tracked by the limiter map.
    #[must_use]
    pub fn rate_limited_tables(&self) -> usize {
        self.inner.rate_limiter_map.len()
    }

    #[must_use]
    pub(crate) fn same_inner(&self, weak: &Weak<ClientInner>) -> bool {
        Weak::ptr_eq(&Arc::downgrade(&self.inner), weak)
    }
}

impl ClientInner {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn limiting_enabled(&self) -> bool {
        self.limiting_enabled.load(Ordering::SeqCst)
    }
}

/// Process-wide User-Agent, built once.
pub(crate) fn user_agent() -> &'static str {
    static USER_AGENT: OnceLock<String> = OnceLock::new();
    USER_AGENT.get_or_init(|| {
        format!(
            "NoSQL-RustSDK/{} ({}/{}; tokio)",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuthProvider;
    use crate::http::{Channel, WireRequest, WireResponse};
    use async_trait::async_trait;
    use std::time::Duration;

    struct DeadTransport;

    #[async_trait]
    impl HttpTransport for DeadTransport {
        async fn get_channel(&self, _timeout: Duration) -> Result<Channel, NoSQLError> {
            Err(NoSQLError::Transport("no channels".into()))
        }

        async fn run_request(
            &self,
            _request: WireRequest,
            _channel: Channel,
        ) -> Result<WireResponse, NoSQLError> {
            Err(NoSQLError::Transport("dead".into()))
        }

        fn max_content_length(&self) -> usize {
            1024
        }
    }

    fn test_client(endpoint: &str) -> Result<Client, NoSQLError> {
        let config = ClientConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        };
        Client::new(config, Arc::new(DeadTransport), Arc::new(NoAuthProvider))
    }

    #[tokio::test]
    async fn test_rejects_bad_scheme() {
        assert!(test_client("ftp://host:21").is_err());
        assert!(test_client("not a url").is_err());
        assert!(test_client("http://localhost:8080").is_ok());
    }

    #[tokio::test]
    async fn test_request_ids_strictly_increase() {
        let client = test_client("http://localhost:8080").unwrap();
        let a = client.inner.next_request_id();
        let b = client.inner.next_request_id();
        let c = client.inner.next_request_id();
        assert_eq!(a, 1);
        assert!(b > a && c > b);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let client = test_client("http://localhost:8080").unwrap();
        client.shutdown().await;
        client.shutdown().await;
        assert!(client.inner.is_shutdown());
    }

    #[tokio::test]
    async fn test_user_agent_shape() {
        let ua = user_agent();
        assert!(ua.starts_with("NoSQL-RustSDK/"));
        assert!(ua.contains(std::env::consts::OS));
    }

    #[tokio::test]
    async fn test_rate_limiting_disable_clears_map() {
        let client = test_client("http://localhost:8080").unwrap();
        client.inner.rate_limiter_map.update("users", 100.0, 100.0, 30);
        assert_eq!(client.rate_limited_tables(), 1);
        client.enable_rate_limiting(false);
        assert_eq!(client.rate_limited_tables(), 0);
    }
}
