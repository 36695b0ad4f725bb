// crates/acstore-core/tests/profiler.rs
// ============================================================================
// Module: Storage Profiler Tests
// Description: Tests for named timing histograms.
// Purpose: Validate bucket placement, percentiles, and reset behavior.
// Dependencies: acstore-core
// ============================================================================
//! ## Overview
//! Ensures recorded durations land in the expected histogram buckets and that
//! start/stop pairs are tracked per name.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::time::Duration;

use acstore_core::StorageProfiler;
use acstore_core::profiler::PROFILE_BUCKETS_US;

#[test]
fn record_places_durations_in_buckets() {
    let profiler = StorageProfiler::new();
    profiler.record("write_new", Duration::from_micros(5));
    profiler.record("write_new", Duration::from_micros(30));
    profiler.record("write_new", Duration::from_secs(2));

    let snapshot = profiler.snapshot();
    assert_eq!(snapshot.buckets_us, PROFILE_BUCKETS_US.to_vec());
    let timing = &snapshot.timings["write_new"];
    assert_eq!(timing.count, 3);
    assert_eq!(timing.total_duration_us, 2_000_035);
    assert_eq!(timing.histogram.len(), PROFILE_BUCKETS_US.len() + 1);
    assert_eq!(timing.histogram[0], 1);
    assert_eq!(timing.histogram[2], 1);
    assert_eq!(timing.histogram[PROFILE_BUCKETS_US.len()], 1);
    assert_eq!(timing.p50_us, 50);
    assert_eq!(timing.p95_us, 250_000);
}

#[test]
fn start_and_stop_track_names_independently() {
    let profiler = StorageProfiler::new();
    profiler.start_timing("get_containers");
    profiler.start_timing("get_container_by_index");
    profiler.stop_timing("get_containers");
    profiler.stop_timing("never_started");

    let snapshot = profiler.snapshot();
    assert_eq!(snapshot.timings["get_containers"].count, 1);
    assert!(!snapshot.timings.contains_key("get_container_by_index"));
    assert!(!snapshot.timings.contains_key("never_started"));

    profiler.stop_timing("get_container_by_index");
    assert_eq!(profiler.snapshot().timings["get_container_by_index"].count, 1);
}

#[test]
fn reset_clears_everything() {
    let profiler = StorageProfiler::new();
    profiler.record("write_existing", Duration::from_micros(100));
    profiler.start_timing("write_new");
    profiler.reset();
    profiler.stop_timing("write_new");
    assert!(profiler.snapshot().timings.is_empty());
}
