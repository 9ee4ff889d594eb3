use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::warn;

use pulse_bench::config::Config;
use pulse_bench::harness::Harness;

#[derive(Parser)]
#[clap(author, version)]
#[clap(name = "pulse-bench")]
#[clap(
    about = "Measures latency and throughput of the pulse MPMC ring under contention",
    long_about = None
)]
struct Cli {
    /// Number of producer threads
    #[clap(short, long, default_value_t = 1)]
    producers: usize,

    /// Number of consumer threads
    #[clap(short, long, default_value_t = 1)]
    consumers: usize,

    /// Ring capacity in elements (power of two)
    #[clap(short = 'k', long, default_value_t = 65_536)]
    capacity: usize,

    /// Blocking push/pop vs non-blocking
    #[clap(long, default_value = "on", value_parser = parse_toggle, action = clap::ArgAction::Set)]
    blocking: bool,

    /// Total duration in ms, warmup included
    #[clap(short, long, default_value_t = 17_500)]
    duration_ms: u64,

    /// Warmup in ms; statistics are discarded during this window
    #[clap(short, long, default_value_t = 2_500)]
    warmup_ms: u64,

    /// Histogram bucket width in ns
    #[clap(long, default_value_t = 5)]
    hist_bucket_ns: u64,

    /// Number of histogram buckets
    #[clap(long, default_value_t = 4_096)]
    hist_buckets: usize,

    /// Pin each worker to a fixed logical CPU
    #[clap(long, default_value = "on", value_parser = parse_toggle, action = clap::ArgAction::Set)]
    pinning: bool,

    /// Keep head/tail tickets on separate cache lines
    #[clap(long, default_value = "on", value_parser = parse_toggle, action = clap::ArgAction::Set)]
    padding: bool,

    /// Use a 1024-byte element instead of an 8-byte one
    #[clap(long, default_value = "off", value_parser = parse_toggle, action = clap::ArgAction::Set)]
    large_payload: bool,

    /// Wrap the element in a uniquely-owned heap allocation
    #[clap(long, default_value = "off", value_parser = parse_toggle, action = clap::ArgAction::Set)]
    move_only_payload: bool,

    /// CSV output path (append mode)
    #[clap(long, default_value = "results/raw/results.csv")]
    csv: PathBuf,

    /// Free-form notes recorded with the run
    #[clap(long, default_value = "")]
    notes: String,
}

fn parse_toggle(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on|off, got '{other}'")),
    }
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            producers: self.producers,
            consumers: self.consumers,
            capacity: self.capacity,
            blocking: self.blocking,
            duration: Duration::from_millis(self.duration_ms),
            warmup: Duration::from_millis(self.warmup_ms),
            bucket_width_ns: self.hist_bucket_ns,
            max_buckets: self.hist_buckets,
            pinning: self.pinning,
            padding: self.padding,
            large_payload: self.large_payload,
            move_only_payload: self.move_only_payload,
            csv_path: self.csv,
            notes: self.notes,
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn print_banner(config: &Config) {
    println!();
    println!("Configuration:");
    println!("  producers: {}", config.producers);
    println!("  consumers: {}", config.consumers);
    println!("  capacity: {}", config.capacity);
    println!("  blocking: {}", on_off(config.blocking));
    println!("  duration (ms): {}", config.duration.as_millis());
    println!("  warmup (ms): {}", config.warmup.as_millis());
    println!("  pinning: {}", on_off(config.pinning));
    println!("  padding: {}", on_off(config.padding));
    println!("  large payload: {}", on_off(config.large_payload));
    println!("  move-only payload: {}", on_off(config.move_only_payload));
    println!("  csv_path: {}", config.csv_path.display());
    println!("  notes: {}", config.notes);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = cli.into_config();

    let harness = Harness::new(config).context("invalid configuration")?;
    print_banner(harness.config());

    let started = Instant::now();
    let results = harness.run().context("benchmark run failed")?;
    let elapsed = started.elapsed();

    let active = results.config.duration - results.config.warmup;
    let messages = (results.push.ok + results.pop.ok) / 2;
    let rate = messages as f64 / active.as_secs_f64();

    println!();
    println!("[bench] ran in {:.2} s", elapsed.as_secs_f64());
    println!(
        "Messages processed (active phase): {} million",
        messages / 1_000_000
    );
    println!(
        "Average speed (active phase): {:.1} million messages/s",
        rate / 1_000_000.0
    );

    if let Err(err) = results.append_csv() {
        warn!(
            "failed to append results to '{}': {err}",
            results.config.csv_path.display()
        );
    }

    Ok(())
}
