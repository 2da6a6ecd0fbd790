// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared value types: table limits, consumed capacity, retry statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Server-reported maximum read and write throughput for a table, plus its
/// storage allowance. Drives the capacity of the client-side rate limiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLimits {
    /// Read units per second.
    pub read_units: u32,
    /// Write units per second.
    pub write_units: u32,
    /// Storage allowance in gigabytes.
    pub storage_gb: u32,
}

impl TableLimits {
    #[must_use]
    pub fn new(read_units: u32, write_units: u32, storage_gb: u32) -> Self {
        Self {
            read_units,
            write_units,
            storage_gb,
        }
    }

    /// True when at least one direction has provisioned throughput.
    #[must_use]
    pub fn has_throughput(&self) -> bool {
        self.read_units > 0 || self.write_units > 0
    }
}

/// Lifecycle state of a table as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableState {
    Active,
    Creating,
    Dropped,
    Dropping,
    Updating,
}

impl TableState {
    pub(crate) fn from_wire(b: u8) -> Self {
        match b {
            1 => Self::Creating,
            2 => Self::Dropped,
            3 => Self::Dropping,
            4 => Self::Updating,
            _ => Self::Active,
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Creating => 1,
            Self::Dropped => 2,
            Self::Dropping => 3,
            Self::Updating => 4,
        }
    }
}

/// Units of read and write work consumed by a single operation, as reported
/// in each response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumedCapacity {
    pub read_units: u64,
    pub read_kb: u64,
    pub write_units: u64,
    pub write_kb: u64,
}

/// Retry accounting for one request, accumulated across loop iterations and
/// copied to the result on success or into the timeout message on failure.
///
/// # Example
///
/// ```
/// use nosql_driver::types::RetryStats;
/// use std::time::Duration;
///
/// let mut stats = RetryStats::default();
/// stats.add_exception("Transport");
/// stats.increment_retries();
/// stats.add_delay(Duration::from_millis(10));
///
/// assert_eq!(stats.retries(), 1);
/// assert_eq!(stats.delayed_ms(), 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    retries: u32,
    delayed_ms: u64,
    exceptions: BTreeMap<String, u32>,
}

impl RetryStats {
    /// Number of retries performed (not counting the first attempt).
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Total time spent in retry delays, in milliseconds.
    #[must_use]
    pub fn delayed_ms(&self) -> u64 {
        self.delayed_ms
    }

    /// Per-cause counts of the errors that triggered retries.
    #[must_use]
    pub fn exceptions(&self) -> &BTreeMap<String, u32> {
        &self.exceptions
    }

    pub fn increment_retries(&mut self) {
        self.retries += 1;
    }

    pub fn add_delay(&mut self, delay: Duration) {
        self.delayed_ms += delay.as_millis() as u64;
    }

    pub fn add_exception(&mut self, label: impl Into<String>) {
        *self.exceptions.entry(label.into()).or_insert(0) += 1;
    }
}

impl fmt::Display for RetryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retries={}, delayedMs={}, exceptions={:?}",
            self.retries, self.delayed_ms, self.exceptions
        )
    }
}

/// Shard topology snapshot returned with query compilations. Copied into the
/// query driver when the continuation is bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyInfo {
    pub sequence_number: i64,
    pub shard_ids: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_limits_throughput() {
        assert!(TableLimits::new(100, 0, 1).has_throughput());
        assert!(TableLimits::new(0, 50, 1).has_throughput());
        assert!(!TableLimits::new(0, 0, 5).has_throughput());
    }

    #[test]
    fn test_table_state_wire_roundtrip() {
        for state in [
            TableState::Active,
            TableState::Creating,
            TableState::Dropped,
            TableState::Dropping,
            TableState::Updating,
        ] {
            assert_eq!(TableState::from_wire(state.to_wire()), state);
        }
    }

    #[test]
    fn test_retry_stats_accumulation() {
        let mut stats = RetryStats::default();
        stats.add_exception("Transport");
        stats.add_exception("Transport");
        stats.add_exception("WriteLimitExceeded");
        stats.increment_retries();
        stats.increment_retries();
        stats.add_delay(Duration::from_millis(25));

        assert_eq!(stats.retries(), 2);
        assert_eq!(stats.delayed_ms(), 25);
        assert_eq!(stats.exceptions()["Transport"], 2);
        assert_eq!(stats.exceptions()["WriteLimitExceeded"], 1);
    }

    #[test]
    fn test_retry_stats_display_mentions_counts() {
        let mut stats = RetryStats::default();
        stats.increment_retries();
        stats.add_exception("ServerError");
        let text = stats.to_string();
        assert!(text.contains("retries=1"));
        assert!(text.contains("ServerError"));
    }
}
