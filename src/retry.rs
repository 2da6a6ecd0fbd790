// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry policy seam and the default exponential-backoff handler.
//!
//! The engine asks [`RetryHandler::do_retry`] whether a retryable failure
//! should be re-attempted; when it says yes, [`RetryHandler::delay`] blocks
//! for the computed backoff and reports how long it slept so the engine can
//! account it in the request's retry stats.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::error::NoSQLError;
use crate::ops::RequestState;

/// Fallback backoff base when the caller passes zero.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Decides whether and how long to wait between attempts.
#[async_trait]
pub trait RetryHandler: Send + Sync {
    /// Whether the request should be re-attempted after `error`.
    fn do_retry(&self, request: &RequestState, num_retries: u32, error: &NoSQLError) -> bool;

    /// Sleep for the backoff appropriate to this failure and return the
    /// time actually slept.
    async fn delay(
        &self,
        request: &RequestState,
        num_retries: u32,
        error: &NoSQLError,
    ) -> Duration;
}

/// Exponential backoff with jitter, capped by the request's remaining
/// timeout budget. Returns `None` when the budget is already exhausted.
#[must_use]
pub fn compute_backoff_delay(request: &RequestState, base_delay: Duration) -> Option<Duration> {
    let base = if base_delay.is_zero() {
        DEFAULT_BASE_DELAY
    } else {
        base_delay
    };
    let shift = request.retry_stats.retries().min(10);
    let mut delay = base.saturating_mul(1u32 << shift);
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
    delay += Duration::from_millis(jitter_ms);

    let remaining = request.remaining_budget()?;
    if remaining.is_zero() {
        return None;
    }
    Some(delay.min(remaining))
}

/// Default policy: bounded retry count, exponential backoff.
///
/// Operation-throttling failures are never retried here; they come from
/// administrative operations where the server-mandated wait dwarfs any
/// reasonable request budget.
#[derive(Debug, Clone)]
pub struct DefaultRetryHandler {
    max_retries: u32,
    base_delay: Duration,
}

impl DefaultRetryHandler {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }
}

impl Default for DefaultRetryHandler {
    fn default() -> Self {
        Self::new(10, DEFAULT_BASE_DELAY)
    }
}

#[async_trait]
impl RetryHandler for DefaultRetryHandler {
    fn do_retry(&self, _request: &RequestState, num_retries: u32, error: &NoSQLError) -> bool {
        use crate::error::ErrorCode;
        if error.error_code() == Some(ErrorCode::OperationLimitExceeded) {
            return false;
        }
        num_retries < self.max_retries
    }

    async fn delay(
        &self,
        request: &RequestState,
        num_retries: u32,
        error: &NoSQLError,
    ) -> Duration {
        let Some(delay) = compute_backoff_delay(request, self.base_delay) else {
            return Duration::ZERO;
        };
        debug!(
            num_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retry backoff"
        );
        sleep(delay).await;
        delay
    }
}
