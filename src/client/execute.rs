// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The request execution loop.
//!
//! One call to `execute` owns a single timeout budget. Every iteration
//! recomputes the remaining budget and bounds each suspension point with
//! it: limiter probes, channel acquisition, the HTTP await, and retry
//! sleeps. The loop exits by returning a decoded result, propagating a
//! terminal error, or falling through to a request-timeout error that
//! carries the last failure as its cause.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout as bounded};
use tracing::{debug, info, warn};

use super::{user_agent, ClientInner};
use crate::config::ClientConfig;
use crate::error::{map_service_error, ErrorCode, NoSQLError};
use crate::http::{
    Headers, WireRequest, WireResponse, HEADER_ACCEPT, HEADER_CONNECTION, HEADER_CONTENT_LENGTH,
    HEADER_CONTENT_TYPE, HEADER_HOST, HEADER_REQUEST_ID, HEADER_USER_AGENT,
};
use crate::limiter::RateLimiter;
use crate::metrics;
use crate::ops::query::{QueryDriver, QueryResult};
use crate::ops::{NoSqlRequest, OperationResult, RequestState};
use crate::protocol::{self, ProtocolReader, ProtocolWriter, READ_KB_LIMIT};
use crate::retry::compute_backoff_delay;
use crate::types::RetryStats;

/// Cooldown between retries when security information is not yet ready.
const SEC_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Retries of the fixed security-error delay before backoff takes over.
const SEC_ERROR_FIXED_RETRIES: u32 = 10;

/// Cooldown after a transport failure; the channel may be stale.
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(10);

fn effective_percent(state: &RequestState, config: &ClientConfig) -> f64 {
    if state.rate_limiter_percentage > 0.0 {
        state.rate_limiter_percentage
    } else {
        config.default_rate_limiter_percentage
    }
}

impl ClientInner {
    /// Top-level request execution. See the module docs.
    pub(crate) async fn execute(
        self: &Arc<Self>,
        request: &mut dyn NoSqlRequest,
    ) -> Result<OperationResult, NoSQLError> {
        request.set_defaults(&self.config);
        request.validate()?;

        // Query pre-dispatch. A bound driver means this is not the first
        // execute; batches are computed through the driver, not here.
        if let Some(q) = request.as_query_mut() {
            if q.has_driver() {
                debug!("query request already has a driver");
                return Ok(OperationResult::Query(QueryResult::empty()));
            }
            if q.is_prepared() && !q.is_simple_query() {
                debug!("query request has no driver, but is prepared");
                let mut driver = QueryDriver::new();
                driver.set_client(Arc::downgrade(self));
                driver.set_topology(q.topology_info().cloned());
                q.bind_driver(driver);
                return Ok(OperationResult::Query(QueryResult::empty()));
            }
            // simple, or advanced-but-unprepared: the server compiles it
            // and the deserializer binds a driver into the request
        }

        let timeout = request.state().timeout;
        request.state_mut().retry_stats = RetryStats::default();

        let mut rate_delayed = Duration::ZERO;
        let mut read_limiter = request.state().read_rate_limiter();
        let mut write_limiter = request.state().write_rate_limiter();
        let mut check_read = read_limiter.is_some();
        let mut check_write = write_limiter.is_some();

        // No limiters on the request: resolve by table, or schedule a
        // background refresh on first sight of the table.
        if self.limiting_enabled() && read_limiter.is_none() && write_limiter.is_none() {
            if let Some(table) = request.state().table_name.clone() {
                read_limiter = self.rate_limiter_map.get_read_limiter(&table);
                write_limiter = self.rate_limiter_map.get_write_limiter(&table);
                if read_limiter.is_none() && write_limiter.is_none() {
                    if request.does_reads() || request.does_writes() {
                        self.background_update_limiters(&table);
                    }
                } else {
                    check_read = request.does_reads();
                    check_write = request.does_writes();
                    if let Some(rl) = &read_limiter {
                        request.state_mut().set_read_rate_limiter(rl.clone());
                    }
                    if let Some(wl) = &write_limiter {
                        request.state_mut().set_write_rate_limiter(wl.clone());
                    }
                }
            }
        }

        // An unlimited query under rate limiting gets a batch size the
        // bucket can absorb, so one query cannot drain it.
        if let Some(rl) = &read_limiter {
            let limit = rl.limit_per_second();
            let pct = match effective_percent(request.state(), &self.config) {
                p if p > 0.0 => p,
                _ => 100.0,
            };
            if let Some(q) = request.as_query_mut() {
                if q.max_read_kb() == 0 {
                    let max_kb = ((pct * limit) / 100.0) as u32;
                    q.clamp_max_read_kb(max_kb.clamp(10, READ_KB_LIMIT));
                }
            }
        }

        let start = Instant::now();
        request.state_mut().start_time = Some(start);
        let mut last_error: Option<NoSQLError> = None;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            let iteration_timeout = timeout - elapsed;

            // Zero-unit probes block only while a bucket is exhausted.
            if check_read {
                if let Some(rl) = &read_limiter {
                    match rl
                        .consume_units_with_timeout(0, iteration_timeout, false)
                        .await
                    {
                        Ok(delayed) => rate_delayed += delayed,
                        Err(e) => {
                            last_error = Some(e);
                            break;
                        }
                    }
                }
            }
            if check_write {
                if let Some(wl) = &write_limiter {
                    match wl
                        .consume_units_with_timeout(0, iteration_timeout, false)
                        .await
                    {
                        Ok(delayed) => rate_delayed += delayed,
                        Err(e) => {
                            last_error = Some(e);
                            break;
                        }
                    }
                }
            }

            if start.elapsed() >= timeout {
                break;
            }

            let auth_string = self.auth.authorization_string().await?;
            self.auth.validate_auth_string(&auth_string)?;

            let num_retries = request.state().retry_stats.retries();
            if num_retries > 0 {
                info!(
                    operation = request.operation(),
                    num_retries,
                    last_error = ?last_error,
                    "retrying request"
                );
            }

            match self.attempt(request, &auth_string, iteration_timeout).await {
                Ok(mut result) => {
                    if let OperationResult::Table(res) = &result {
                        self.update_rate_limiters(&res.table_name, res.limits);
                    }

                    // charge actual usage, even if it forces a bucket negative
                    let percent = effective_percent(request.state(), &self.config);
                    let consumed = *result.consumed();
                    rate_delayed += self
                        .consume_limiter_units(
                            read_limiter.as_ref(),
                            consumed.read_units,
                            percent,
                            iteration_timeout,
                        )
                        .await;
                    rate_delayed += self
                        .consume_limiter_units(
                            write_limiter.as_ref(),
                            consumed.write_units,
                            percent,
                            iteration_timeout,
                        )
                        .await;

                    metrics::record_request(request.operation(), "success");
                    metrics::record_rate_delay(request.operation(), rate_delayed);
                    result.set_rate_limit_delayed(rate_delayed);
                    result.set_retry_stats(request.state().retry_stats.clone());
                    return Ok(result);
                }
                Err(err) => {
                    let code = err.error_code();

                    if code == Some(ErrorCode::RetryAuthentication) {
                        if self.auth.on_premises() {
                            self.auth.bootstrap_login().await?;
                            let state = request.state_mut();
                            state.retry_stats.add_exception(err.label());
                            state.retry_stats.increment_retries();
                            metrics::record_retry(request.operation());
                            last_error = Some(err);
                            continue;
                        }
                        warn!(error = %err, "unexpected authentication error");
                        return Err(err);
                    }

                    if code == Some(ErrorCode::SecurityInfoUnavailable) {
                        request.state_mut().retry_stats.add_exception(err.label());
                        let retries = request.state().retry_stats.retries();
                        let delay = if retries <= SEC_ERROR_FIXED_RETRIES {
                            Some(SEC_ERROR_DELAY)
                        } else {
                            compute_backoff_delay(request.state(), Duration::ZERO)
                        };
                        let Some(delay) = delay else {
                            last_error = Some(err);
                            break;
                        };
                        sleep(delay).await;
                        let state = request.state_mut();
                        state.retry_stats.increment_retries();
                        state.retry_stats.add_delay(delay);
                        metrics::record_retry(request.operation());
                        last_error = Some(err);
                        continue;
                    }

                    if matches!(err, NoSQLError::Service { .. }) && err.is_retryable() {
                        if err.is_write_throttling() {
                            if let Some(wl) = &write_limiter {
                                // check write limits next loop, at full debt
                                check_write = true;
                                if wl.current_rate() < 100.0 {
                                    wl.set_current_rate(100.0);
                                }
                            }
                        }
                        if err.is_read_throttling() {
                            if let Some(rl) = &read_limiter {
                                check_read = true;
                                if rl.current_rate() < 100.0 {
                                    rl.set_current_rate(100.0);
                                }
                            }
                        }
                        debug!(error = %err, "retryable exception");

                        request.state_mut().retry_stats.add_exception(err.label());
                        let retries = request.state().retry_stats.retries();
                        if !self.retry.do_retry(request.state(), retries, &err) {
                            debug!("too many retries");
                            return Err(err);
                        }
                        let slept = self.retry.delay(request.state(), retries, &err).await;
                        let state = request.state_mut();
                        state.retry_stats.add_delay(slept);
                        state.retry_stats.increment_retries();
                        metrics::record_retry(request.operation());
                        last_error = Some(err);
                        continue;
                    }

                    match err {
                        NoSQLError::Transport(_) => {
                            info!(error = %err, "transport failure, retrying");
                            let state = request.state_mut();
                            state.retry_stats.add_exception(err.label());
                            state.retry_stats.increment_retries();
                            metrics::record_retry(request.operation());
                            last_error = Some(err);
                            sleep(TRANSPORT_RETRY_DELAY).await;
                            continue;
                        }
                        NoSQLError::Timeout(_) => {
                            info!(error = %err, "attempt timed out");
                            last_error = Some(err);
                            break;
                        }
                        terminal => {
                            debug!(error = %terminal, "terminal error");
                            metrics::record_request(request.operation(), "error");
                            return Err(terminal);
                        }
                    }
                }
            }
        }

        let retries = request.state().retry_stats.retries();
        let stats = request.state().retry_stats.clone();
        metrics::record_request(request.operation(), "timeout");
        Err(NoSQLError::RequestTimeout {
            timeout_ms: timeout.as_millis() as u64,
            message: format!(
                "request timed out after {retries} retr{}. {stats}",
                if retries == 1 { "y" } else { "ies" }
            ),
            source: last_error.map(Box::new),
        })
    }

    /// One network attempt: serialize, size-check, stamp headers, send,
    /// await, decode. Outbound bytes are moved into the transport; the
    /// response body is owned by the reader, so there is nothing to release
    /// on early exits.
    async fn attempt(
        self: &Arc<Self>,
        request: &mut dyn NoSqlRequest,
        auth_string: &str,
        iteration_timeout: Duration,
    ) -> Result<OperationResult, NoSQLError> {
        let channel = self.http.get_channel(iteration_timeout).await?;
        let request_id = self.next_request_id();

        let mut body = ProtocolWriter::new();
        protocol::write_serial_version(&mut body);
        request.serialize(&mut body)?;

        // On-premises proxies enforce a configurable content length; the
        // cloud check is the protocol's hardcoded limit.
        if self.auth.on_premises() {
            let limit = self.http.max_content_length();
            if body.len() > limit {
                return Err(NoSQLError::RequestSizeLimit {
                    size: body.len(),
                    limit,
                });
            }
        } else {
            protocol::check_request_size_limit(body.len())?;
        }

        let mut headers = Headers::new();
        headers.set(HEADER_CONTENT_TYPE, "application/octet-stream");
        headers.set(HEADER_CONNECTION, "keep-alive");
        headers.set(HEADER_ACCEPT, "application/octet-stream");
        headers.set(HEADER_USER_AGENT, user_agent());
        headers.set(HEADER_HOST, self.host.clone());
        headers.set(HEADER_REQUEST_ID, request_id.to_string());
        headers.set(HEADER_CONTENT_LENGTH, body.len().to_string());

        if request.state().compartment.is_none() {
            request.state_mut().compartment = self.config.default_compartment.clone();
        }
        self.auth.set_required_headers(
            auth_string,
            request.state().compartment.as_deref(),
            &mut headers,
        );

        debug!(operation = request.operation(), request_id, "sending request");
        let wire = WireRequest {
            path: self.request_uri.clone(),
            headers,
            body: body.into_bytes(),
        };
        let response = bounded(iteration_timeout, self.http.run_request(wire, channel))
            .await
            .map_err(|_| NoSQLError::Timeout(iteration_timeout))??;
        debug!(
            operation = request.operation(),
            status = response.status,
            "received response"
        );
        self.process_response(response, request)
    }

    /// Dispatch on HTTP status, then on the protocol status byte.
    fn process_response(
        self: &Arc<Self>,
        response: WireResponse,
        request: &mut dyn NoSqlRequest,
    ) -> Result<OperationResult, NoSQLError> {
        if response.status == 200 {
            let mut r = ProtocolReader::new(response.body);
            let code = r.read_byte()?;
            if code == 0 {
                let result = request.deserialize(&mut r)?;
                // an advanced query compiled by this attempt carries a
                // fresh driver; attach the engine handle before returning
                if let Some(q) = request.as_query_mut() {
                    if !q.is_simple_query() {
                        let weak = Arc::downgrade(self);
                        if let Some(driver) = q.driver_mut() {
                            driver.set_client(weak);
                        }
                    }
                }
                return Ok(result);
            }
            let message = r.read_string()?.unwrap_or_default();
            return Err(map_service_error(code, message));
        }

        if response.status == 400 {
            let message = if response.body.is_empty() {
                response.reason.clone()
            } else {
                String::from_utf8_lossy(&response.body).into_owned()
            };
            return Err(NoSQLError::Service {
                code: ErrorCode::UnknownError,
                message: format!("Error response: {message}"),
            });
        }

        Err(NoSQLError::Service {
            code: ErrorCode::UnknownError,
            message: format!(
                "Error response = {}, reason = {}",
                response.status, response.reason
            ),
        })
    }

    /// Charge actual post-response usage. `always_consume` semantics mean
    /// this never fails; a deadline hit just reports the budget as the
    /// delay incurred.
    async fn consume_limiter_units(
        &self,
        limiter: Option<&Arc<dyn RateLimiter>>,
        units: u64,
        percent: f64,
        iteration_timeout: Duration,
    ) -> Duration {
        let Some(limiter) = limiter else {
            return Duration::ZERO;
        };
        if units == 0 {
            return Duration::ZERO;
        }
        let consumed = if percent > 0.0 {
            limiter
                .consume_units_with_percent(units, iteration_timeout, true, percent)
                .await
        } else {
            limiter
                .consume_units_with_timeout(units, iteration_timeout, true)
                .await
        };
        consumed.unwrap_or(iteration_timeout)
    }
}
