//! Last known good readings, shared between the poll loop and the HTTP side.
//!
//! The poll loop is the only writer and always swaps in a whole snapshot.
//! Readers clone the `Arc` and render from that, so they never see half an update.

use crate::metering_energomera::structs::PollResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadingSnapshot {
    /// register name -> sub name -> raw value
    pub values: BTreeMap<String, BTreeMap<String, String>>,
    pub captured_at: DateTime<Utc>,
    pub identity: Option<String>,
    pub serial_number: Option<String>,
    pub last_error: Option<String>,
}

impl ReadingSnapshot {
    pub fn empty() -> Self {
        ReadingSnapshot {
            values: BTreeMap::new(),
            captured_at: Utc::now(),
            identity: None,
            serial_number: None,
            last_error: None,
        }
    }

    pub fn from_poll(result: PollResult) -> Self {
        let mut snapshot = Self::empty();
        for reading in result.readings {
            snapshot
                .values
                .entry(reading.register_name)
                .or_default()
                .insert(reading.sub_name, reading.raw_value);
        }
        snapshot.identity = Some(result.identity);
        snapshot.serial_number = Some(result.serial_number);
        snapshot
    }

    /// Nothing read during a failed cycle can be trusted, so only the error is kept
    pub fn failed(error: String) -> Self {
        let mut snapshot = Self::empty();
        snapshot.last_error = Some(error);
        snapshot
    }

    pub fn get(&self, register: &str, sub_name: &str) -> Option<&str> {
        self.values.get(register)?.get(sub_name).map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_failure(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Seconds from `since` to `now`, never negative
fn seconds_between(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - since).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollStats {
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub last_success: Option<DateTime<Utc>>,
    /// When the cache was created, stands in for `last_success` until a poll succeeds
    pub started_at: DateTime<Utc>,
}

impl PollStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        PollStats { successful_polls: 0, failed_polls: 0, last_success: None, started_at }
    }

    /// Seconds since the last successful cycle, or since startup if there was none.
    /// Failed cycles do not reset it.
    pub fn seconds_since_success(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.last_success.unwrap_or(self.started_at), now)
    }

    fn count(&mut self, snapshot: &ReadingSnapshot) {
        if snapshot.is_failure() {
            self.failed_polls += 1;
        } else {
            self.successful_polls += 1;
            self.last_success = Some(snapshot.captured_at);
        }
    }
}

#[derive(Clone)]
struct CacheState {
    snapshot: Arc<ReadingSnapshot>,
    stats: PollStats,
}

/// Snapshot and stats sit behind one lock, a reader never sees one updated without the other
pub struct ReadingCache {
    state: RwLock<CacheState>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        ReadingCache {
            state: RwLock::new(CacheState {
                snapshot: Arc::new(ReadingSnapshot::empty()),
                stats: PollStats::new(started_at),
            }),
        }
    }

    pub fn current(&self) -> Arc<ReadingSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).snapshot.clone()
    }

    pub fn stats(&self) -> PollStats {
        self.state.read().unwrap_or_else(PoisonError::into_inner).stats.clone()
    }

    /// Snapshot and stats taken under the same read lock
    pub fn view(&self) -> (Arc<ReadingSnapshot>, PollStats) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.snapshot.clone(), state.stats.clone())
    }

    /// Replaces the current snapshot and counts the cycle
    pub fn publish(&self, snapshot: ReadingSnapshot) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.stats.count(&snapshot);
        state.snapshot = Arc::new(snapshot);
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}
