// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background table-limits refresh.
//!
//! On first sight of a table that reads or writes but has no limiter entry,
//! the engine schedules a `GetTable` off the caller's critical path. A
//! single worker task owns all refreshes; the per-table deadline map keeps
//! at most one in flight per table. The worker calls back into `execute`,
//! which is reentrant because no engine-wide lock is held across the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

use super::ClientInner;
use crate::ops::{GetTableRequest, OperationResult};
use crate::types::TableLimits;

/// How often table limits are re-fetched.
const LIMITER_REFRESH: Duration = Duration::from_secs(600);

/// Retry window after a failed refresh.
const REFRESH_FAILURE_RETRY: Duration = Duration::from_millis(100);

/// Timeout for the background `GetTable` probe.
const REFRESH_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Burst horizon for new limiters, overridable for tests.
const DEFAULT_LIMITER_DURATION_SECS: u32 = 30;

fn limiter_duration_secs() -> u32 {
    std::env::var("NOSQL_RL_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_LIMITER_DURATION_SECS)
}

impl ClientInner {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// True when `table` has no deadline yet or its deadline has passed.
    pub(crate) fn table_needs_refresh(&self, table: &str) -> bool {
        match self.table_limit_update.get(table) {
            Some(deadline) => deadline.load(Ordering::Acquire) <= self.now_nanos(),
            None => true,
        }
    }

    /// Arm (`true`) or push out (`false`) the refresh deadline for `table`.
    pub(crate) fn set_table_needs_refresh(&self, table: &str, needs_refresh: bool) {
        let deadline = if needs_refresh {
            0
        } else {
            self.now_nanos() + LIMITER_REFRESH.as_nanos() as u64
        };
        match self.table_limit_update.get(table) {
            Some(entry) => entry.store(deadline, Ordering::Release),
            None => {
                self.table_limit_update
                    .insert(table.to_owned(), AtomicU64::new(deadline));
            }
        }
    }

    fn set_table_retry_after(&self, table: &str, after: Duration) {
        if let Some(entry) = self.table_limit_update.get(table) {
            entry.store(
                self.now_nanos() + after.as_nanos() as u64,
                Ordering::Release,
            );
        }
    }

    /// Queue a limits refresh for `table` if one is due.
    ///
    /// Serialized through `refresh_gate` so the check-and-mark is atomic
    /// with respect to concurrent callers; the single worker then ensures
    /// at most one `GetTable` per table is in flight.
    pub(crate) fn background_update_limiters(&self, table: &str) {
        let _gate = self.refresh_gate.lock();
        if !self.table_needs_refresh(table) {
            return;
        }
        self.set_table_needs_refresh(table, false);

        if self.refresh_tx.try_send(table.to_owned()).is_err() {
            // queue full or worker gone; let a later request re-arm it
            self.set_table_needs_refresh(table, true);
        }
    }

    /// Runs on the worker: fetch limits and seed the limiter map.
    async fn update_table_limiters(self: &Arc<Self>, table: &str) {
        let mut request = GetTableRequest::new(table).timeout(REFRESH_PROBE_TIMEOUT);
        info!(table, "starting background GetTable");
        let limits = match self.execute(&mut request).await {
            Ok(OperationResult::Table(res)) => res.limits,
            Ok(_) => None,
            Err(e) => {
                info!(table, error = %e, "background GetTable failed");
                None
            }
        };

        match limits {
            Some(limits) => {
                if self.update_rate_limiters(table, Some(limits)) {
                    info!(table, "background refresh added limiters");
                }
            }
            None => {
                // table may not exist yet; allow a quick retry
                self.set_table_retry_after(table, REFRESH_FAILURE_RETRY);
            }
        }
    }

    /// Create, resize, or remove the limiters for `table` from a reported
    /// `TableLimits`. Returns true when the map now has an entry.
    pub(crate) fn update_rate_limiters(&self, table: &str, limits: Option<TableLimits>) -> bool {
        if !self.limiting_enabled() {
            return false;
        }
        self.set_table_needs_refresh(table, false);

        let Some(limits) = limits.filter(TableLimits::has_throughput) else {
            self.rate_limiter_map.remove(table);
            info!(table, "removing rate limiting from table");
            return false;
        };

        // The cloud allows a 300-second burst, but other clients may share
        // the table; a shorter horizon keeps usage predictable.
        let duration_secs = limiter_duration_secs();
        self.rate_limiter_map.update(
            table,
            f64::from(limits.read_units),
            f64::from(limits.write_units),
            duration_secs,
        );
        info!(
            table,
            read_units = limits.read_units,
            write_units = limits.write_units,
            "updated table limiters"
        );
        true
    }
}

/// Single-flight refresh worker. One task per client; while parked it holds
/// only a weak handle, so an abandoned client can drop and close the queue.
pub(super) fn spawn_refresh_worker(
    client: Weak<ClientInner>,
    mut rx: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
) {
    tokio::spawn(async move {
        loop {
            let table = tokio::select! {
                _ = shutdown.notified() => break,
                table = rx.recv() => match table {
                    Some(table) => table,
                    None => break,
                },
            };
            let Some(inner) = client.upgrade() else {
                break;
            };
            if inner.is_shutdown() {
                break;
            }
            inner.update_table_limiters(&table).await;
            debug!(table, "refresh worker cycle complete");
        }
        debug!("limiter refresh worker exiting");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuthProvider;
    use crate::client::Client;
    use crate::config::ClientConfig;
    use crate::error::NoSQLError;
    use crate::http::{Channel, HttpTransport, WireRequest, WireResponse};
    use async_trait::async_trait;

    struct DeadTransport;

    #[async_trait]
    impl HttpTransport for DeadTransport {
        async fn get_channel(&self, _timeout: Duration) -> Result<Channel, NoSQLError> {
            Err(NoSQLError::Transport("dead".into()))
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

    fn limited_client() -> Client {
        let config = ClientConfig {
            endpoint: "http://localhost:8080".into(),
            rate_limiting_enabled: true,
            ..Default::default()
        };
        Client::new(config, Arc::new(DeadTransport), Arc::new(NoAuthProvider)).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_table_needs_refresh() {
        let client = limited_client();
        assert!(client.inner.table_needs_refresh("users"));
    }

    #[tokio::test]
    async fn test_marking_refreshed_pushes_deadline_out() {
        let client = limited_client();
        client.inner.set_table_needs_refresh("users", false);
        assert!(!client.inner.table_needs_refresh("users"));
        client.inner.set_table_needs_refresh("users", true);
        assert!(client.inner.table_needs_refresh("users"));
    }

    #[tokio::test]
    async fn test_background_update_marks_in_progress() {
        let client = limited_client();
        client.inner.background_update_limiters("users");
        // marked in progress, a second call is a no-op
        assert!(!client.inner.table_needs_refresh("users"));
        client.inner.background_update_limiters("users");
    }

    #[tokio::test]
    async fn test_update_rate_limiters_creates_and_removes() {
        let client = limited_client();
        let added = client
            .inner
            .update_rate_limiters("users", Some(TableLimits::new(100, 50, 25)));
        assert!(added);
        assert_eq!(client.rate_limited_tables(), 1);

        let kept = client
            .inner
            .update_rate_limiters("users", Some(TableLimits::new(0, 0, 25)));
        assert!(!kept);
        assert_eq!(client.rate_limited_tables(), 0);
    }

    #[tokio::test]
    async fn test_update_rate_limiters_noop_when_disabled() {
        let client = limited_client();
        client.enable_rate_limiting(false);
        let added = client
            .inner
            .update_rate_limiters("users", Some(TableLimits::new(100, 50, 25)));
        assert!(!added);
    }
}
