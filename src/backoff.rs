//! Per-source failure counting and exponential backoff.
//!
//! Backoff after `n` consecutive failures is `min(2^(n-1), max)` hours. State
//! lives only as long as the process; a fresh run starts clean.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHealth {
    pub failures: u32,
    pub backoff_until: Option<DateTime<Utc>>,
}

/// What a recorded failure did to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    pub failures: u32,
    pub backoff_hours: u64,
    pub backoff_until: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BackoffTracker {
    max_hours: u32,
    sources: HashMap<String, SourceHealth>,
}

/// Hours of backoff after `failures` consecutive failures.
pub fn backoff_hours(failures: u32, max_hours: u32) -> u64 {
    if failures == 0 {
        return 0;
    }
    let exp = failures.saturating_sub(1).min(63);
    (1u64 << exp).min(u64::from(max_hours))
}

impl BackoffTracker {
    pub fn new(max_hours: u32) -> Self {
        Self {
            max_hours,
            sources: HashMap::new(),
        }
    }

    /// `true` while `source` is inside its backoff window.
    pub fn in_backoff(&self, source: &str, now: DateTime<Utc>) -> bool {
        self.sources
            .get(source)
            .and_then(|h| h.backoff_until)
            .is_some_and(|until| now < until)
    }

    pub fn record_failure(&mut self, source: &str, now: DateTime<Utc>) -> FailureRecord {
        let health = self
            .sources
            .entry(source.to_string())
            .or_insert(SourceHealth {
                failures: 0,
                backoff_until: None,
            });
        health.failures += 1;
        let hours = backoff_hours(health.failures, self.max_hours);
        let until = now + Duration::hours(hours as i64);
        health.backoff_until = Some(until);
        debug!(source, failures = health.failures, hours, "Recorded failure");
        FailureRecord {
            failures: health.failures,
            backoff_hours: hours,
            backoff_until: until,
        }
    }

    /// Clear failures and backoff for `source`.
    pub fn record_success(&mut self, source: &str) {
        self.sources.remove(source);
    }

    pub fn health(&self, source: &str) -> Option<SourceHealth> {
        self.sources.get(source).copied()
    }

    pub fn failures(&self, source: &str) -> u32 {
        self.health(source).map(|h| h.failures).unwrap_or(0)
    }
}
