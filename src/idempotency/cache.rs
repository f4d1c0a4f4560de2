//! Processed-task cache and in-progress markers
//!
//! One map keyed by idempotency key. A key is either running (marker) or
//! settled (entry), never both. Every check-then-set happens under a single
//! lock acquisition so concurrent duplicates cannot both start.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::protocol::TaskOutcome;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Retention settings for the cache
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// How long settled results are replayed
    pub result_ttl: Duration,

    /// How long a marker may stay before it is considered stale
    pub in_progress_ttl: Duration,

    /// Sweep period
    pub cleanup_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(24 * 60 * 60),
            in_progress_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Cache Records
// ─────────────────────────────────────────────────────────────────

/// A handler invocation that has started but not settled
#[derive(Debug, Clone, PartialEq)]
pub struct InProgressMarker {
    pub idempotency_key: String,
    pub started_at: DateTime<Utc>,
}

/// A settled invocation, replayed for later duplicates
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTaskEntry {
    pub idempotency_key: String,
    pub outcome: TaskOutcome,
    pub completed_at: DateTime<Utc>,
}

/// What the cache knows about a key
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    InProgress(InProgressMarker),
    Completed(ProcessedTaskEntry),
}

/// Decision for an incoming delivery
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No record: a marker was inserted, run the handler
    Execute,
    /// Already settled: replay this outcome
    Replay(ProcessedTaskEntry),
    /// Another delivery of the key is running
    InProgress(InProgressMarker),
}

/// Counts removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_results: usize,
    pub stale_markers: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired_results + self.stale_markers
    }
}

// ─────────────────────────────────────────────────────────────────
// Idempotency Cache
// ─────────────────────────────────────────────────────────────────

/// Deduplicates task executions by idempotency key
pub struct IdempotencyCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    result_ttl: chrono::Duration,
    in_progress_ttl: chrono::Duration,
}

impl IdempotencyCache {
    /// Create a new cache
    pub fn new(config: &IdempotencyConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            result_ttl: to_chrono(config.result_ttl),
            in_progress_ttl: to_chrono(config.in_progress_ttl),
        }
    }

    /// Decide what to do with a delivery, inserting a marker when it should run
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Utc::now())
    }

    pub fn admit_at(&self, key: &str, now: DateTime<Utc>) -> Admission {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(CacheEntry::Completed(entry)) => Admission::Replay(entry.clone()),
            Some(CacheEntry::InProgress(marker)) => Admission::InProgress(marker.clone()),
            None => {
                entries.insert(
                    key.to_string(),
                    CacheEntry::InProgress(InProgressMarker {
                        idempotency_key: key.to_string(),
                        started_at: now,
                    }),
                );
                Admission::Execute
            }
        }
    }

    /// Replace the marker with the settled outcome. The first completion for
    /// a key wins; returns false if an entry already existed.
    pub fn complete(&self, key: &str, outcome: TaskOutcome) -> bool {
        self.complete_at(key, outcome, Utc::now())
    }

    pub fn complete_at(&self, key: &str, outcome: TaskOutcome, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock();
        if let Some(CacheEntry::Completed(_)) = entries.get(key) {
            debug!(idempotency_key = key, "Result already cached, keeping first completion");
            return false;
        }

        entries.insert(
            key.to_string(),
            CacheEntry::Completed(ProcessedTaskEntry {
                idempotency_key: key.to_string(),
                outcome,
                completed_at: now,
            }),
        );
        true
    }

    /// Remove expired results and stale markers
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let result_ttl = self.result_ttl;
        let in_progress_ttl = self.in_progress_ttl;

        self.entries.lock().retain(|_, entry| match entry {
            CacheEntry::Completed(e) => {
                let keep = now - e.completed_at <= result_ttl;
                if !keep {
                    report.expired_results += 1;
                }
                keep
            }
            CacheEntry::InProgress(m) => {
                let keep = now - m.started_at <= in_progress_ttl;
                if !keep {
                    report.stale_markers += 1;
                }
                keep
            }
        });

        report
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(&IdempotencyConfig::default())
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
