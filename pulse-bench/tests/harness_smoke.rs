//! End-to-end harness runs with short windows.
//!
//! Pinning stays off here: CI environments routinely restrict the CPU set,
//! and pin failures are fatal by design.

use std::time::Duration;

use pulse_bench::config::Config;
use pulse_bench::harness::Harness;

fn short_config() -> Config {
    Config {
        producers: 2,
        consumers: 2,
        capacity: 64,
        blocking: false,
        duration: Duration::from_millis(250),
        warmup: Duration::from_millis(50),
        bucket_width_ns: 100,
        max_buckets: 2_048,
        pinning: false,
        padding: true,
        large_payload: false,
        move_only_payload: false,
        csv_path: std::env::temp_dir().join("pulse-bench-smoke.csv"),
        notes: String::new(),
    }
}

#[test]
fn non_blocking_run_produces_results() {
    let harness = Harness::new(short_config()).unwrap();
    let results = harness.run().unwrap();

    assert!(results.push.ok > 0);
    assert!(results.pop.ok > 0);
    assert!(results.wall_time >= Duration::from_millis(200));
    assert!(results.push_latency.max_ns >= results.push_latency.min_ns);
    assert!(results.pop_latency.max_ns >= results.pop_latency.min_ns);
}

#[test]
fn blocking_run_shuts_down_cleanly() {
    let config = Config {
        blocking: true,
        ..short_config()
    };

    let harness = Harness::new(config).unwrap();
    let results = harness.run().unwrap();

    assert!(results.push.ok > 0);
    assert!(results.pop.ok > 0);
    // Blocking operations never report full/empty.
    assert_eq!(results.push.failures, 0);
    assert_eq!(results.pop.failures, 0);
}

#[test]
fn blocking_run_with_lopsided_workers_shuts_down_cleanly() {
    // More consumers than producers parks consumers in pop() at shutdown;
    // the sentinel phase must release them.
    let config = Config {
        blocking: true,
        producers: 1,
        consumers: 3,
        ..short_config()
    };

    let harness = Harness::new(config).unwrap();
    harness.run().unwrap();
}

#[test]
fn boxed_large_payload_run() {
    let config = Config {
        large_payload: true,
        move_only_payload: true,
        ..short_config()
    };

    let harness = Harness::new(config).unwrap();
    let results = harness.run().unwrap();

    assert!(results.push.ok > 0);
    assert!(results.pop.ok > 0);
}

#[test]
fn packed_layout_run() {
    let config = Config {
        padding: false,
        ..short_config()
    };

    let harness = Harness::new(config).unwrap();
    let results = harness.run().unwrap();

    assert!(results.push.ok > 0);
}

#[test]
fn results_land_in_the_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("smoke/results.csv");

    let config = Config {
        csv_path: csv_path.clone(),
        notes: "smoke".to_string(),
        ..short_config()
    };

    let harness = Harness::new(config).unwrap();
    let results = harness.run().unwrap();
    results.append_csv().unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("producers,"));
    assert!(lines[1].ends_with("smoke"));
}
