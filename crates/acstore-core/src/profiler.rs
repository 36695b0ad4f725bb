// crates/acstore-core/src/profiler.rs
// ============================================================================
// Module: Storage Profiler
// Description: Lightweight named timing histograms for store operations.
// Purpose: Let callers measure where store time goes without external
//          tooling.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`StorageProfiler`] collects per-name operation counts, total durations,
//! and latency histograms over fixed microsecond buckets plus one overflow
//! slot. Stores record under `write_new`, `write_existing`, `get_containers`,
//! and `get_container_by_index` once a profiler is attached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Microsecond bucket boundaries used for timing histograms.
pub const PROFILE_BUCKETS_US: [u64; 12] =
    [10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 250_000];

/// Profile name of adding a new container.
pub const PROFILE_WRITE_NEW: &str = "write_new";
/// Profile name of updating an existing container.
pub const PROFILE_WRITE_EXISTING: &str = "write_existing";
/// Profile name of listing containers.
pub const PROFILE_GET_CONTAINERS: &str = "get_containers";
/// Profile name of reading a container by index.
pub const PROFILE_GET_CONTAINER_BY_INDEX: &str = "get_container_by_index";

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Snapshot of one named timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSnapshot {
    /// Number of recorded timings.
    pub count: u64,
    /// Sum of recorded durations in microseconds.
    pub total_duration_us: u64,
    /// Histogram counts (length = `buckets_us.len() + 1`).
    pub histogram: Vec<u64>,
    /// p50 estimate from the histogram.
    pub p50_us: u64,
    /// p95 estimate from the histogram.
    pub p95_us: u64,
}

/// Snapshot of all profiler timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// Timings represented as `<= upper_bound` buckets plus overflow slot.
    pub buckets_us: Vec<u64>,
    /// Timings keyed by profile name.
    pub timings: BTreeMap<String, TimingSnapshot>,
}

// ============================================================================
// SECTION: Profiler
// ============================================================================

/// Mutable counters of one named timing.
#[derive(Debug, Clone, Default)]
struct TimingStats {
    /// Number of recorded timings.
    count: u64,
    /// Sum of recorded durations in microseconds.
    total_duration_us: u64,
    /// Latency histogram.
    histogram: [u64; PROFILE_BUCKETS_US.len() + 1],
}

/// Internal profiler state.
#[derive(Debug, Default)]
struct ProfilerState {
    /// Start instants of running timings.
    started: BTreeMap<String, Instant>,
    /// Recorded timings keyed by profile name.
    timings: BTreeMap<String, TimingStats>,
}

/// Named timing profiler shared by stores.
#[derive(Debug, Default)]
pub struct StorageProfiler {
    /// Profiler state protected by a mutex.
    state: Mutex<ProfilerState>,
}

impl StorageProfiler {
    /// Creates an empty profiler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a named timing, replacing any running timing of that name.
    pub fn start_timing(&self, name: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.started.insert(name.to_string(), Instant::now());
    }

    /// Stops a named timing and records it. Unknown names are ignored.
    pub fn stop_timing(&self, name: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(started) = state.started.remove(name) {
            record_into(&mut state, name, started.elapsed());
        }
    }

    /// Records a measured duration under a name.
    pub fn record(&self, name: &str, elapsed: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        record_into(&mut state, name, elapsed);
    }

    /// Returns a snapshot of all recorded timings.
    #[must_use]
    pub fn snapshot(&self) -> ProfileSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let timings = state
            .timings
            .iter()
            .map(|(name, stats)| {
                (
                    name.clone(),
                    TimingSnapshot {
                        count: stats.count,
                        total_duration_us: stats.total_duration_us,
                        histogram: stats.histogram.to_vec(),
                        p50_us: histogram_percentile(&PROFILE_BUCKETS_US, &stats.histogram, 50),
                        p95_us: histogram_percentile(&PROFILE_BUCKETS_US, &stats.histogram, 95),
                    },
                )
            })
            .collect();
        ProfileSnapshot {
            buckets_us: PROFILE_BUCKETS_US.to_vec(),
            timings,
        }
    }

    /// Clears running and recorded timings.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = ProfilerState::default();
    }
}

/// Adds a duration to the named timing.
fn record_into(state: &mut ProfilerState, name: &str, elapsed: Duration) {
    let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    let bucket_index = histogram_bucket_index_from_bounds(&PROFILE_BUCKETS_US, elapsed_us);
    let stats = state.timings.entry(name.to_string()).or_default();
    stats.count = stats.count.saturating_add(1);
    stats.total_duration_us = stats.total_duration_us.saturating_add(elapsed_us);
    if let Some(slot) = stats.histogram.get_mut(bucket_index) {
        *slot = slot.saturating_add(1);
    }
}

// ============================================================================
// SECTION: Histogram Helpers
// ============================================================================

/// Maps a value onto the first bucket whose upper bound contains it.
fn histogram_bucket_index_from_bounds(bounds: &[u64], value: u64) -> usize {
    for (idx, upper_bound) in bounds.iter().enumerate() {
        if value <= *upper_bound {
            return idx;
        }
    }
    bounds.len()
}

/// Computes approximate percentile value from bucketed histogram counts.
fn histogram_percentile(bounds: &[u64], counts: &[u64], percentile: u32) -> u64 {
    if percentile == 0 || percentile > 100 || counts.is_empty() || bounds.is_empty() {
        return 0;
    }
    let total = counts.iter().fold(0_u64, |acc, value| acc.saturating_add(*value));
    if total == 0 {
        return 0;
    }
    let rank =
        total.saturating_mul(u64::from(percentile)).saturating_add(99).saturating_div(100).max(1);
    let mut running = 0_u64;
    for (idx, count) in counts.iter().enumerate() {
        running = running.saturating_add(*count);
        if running >= rank {
            return bounds.get(idx).or_else(|| bounds.last()).copied().unwrap_or(0);
        }
    }
    bounds.last().copied().unwrap_or(0)
}
