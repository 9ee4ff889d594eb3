//! Merged run results and the append-only CSV log.
//!
//! One row is appended per run; the header is written only when the file is
//! missing or empty, so a results file accumulates comparable rows across
//! invocations. Histogram bins are serialised as semicolon-separated counts
//! inside a single CSV field.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::time::Duration;

use crate::config::Config;
use crate::stats::{LatencySummary, OpStats};

/// Everything one benchmark run produced.
#[derive(Debug, Clone)]
pub struct Results {
    /// Immutable snapshot of the configuration that produced this run.
    pub config: Config,
    /// Wall time of the measurement window (warmup excluded).
    pub wall_time: Duration,
    /// Merged producer-side tallies.
    pub push: OpStats,
    /// Merged consumer-side tallies.
    pub pop: OpStats,
    /// Push latency summary derived from the merged histogram.
    pub push_latency: LatencySummary,
    /// Pop latency summary derived from the merged histogram.
    pub pop_latency: LatencySummary,
}

impl Results {
    /// Successful pushes per second over the measurement window.
    pub fn push_ops_per_sec(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 { self.push.ok as f64 / secs } else { 0.0 }
    }

    /// Successful pops per second over the measurement window.
    pub fn pop_ops_per_sec(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 { self.pop.ok as f64 / secs } else { 0.0 }
    }

    /// Appends this run to the configured CSV file.
    ///
    /// Parent directories are created best-effort; the header is written
    /// first iff the file is new or empty. The writer is flushed before
    /// returning.
    pub fn append_csv(&self) -> io::Result<()> {
        let path = &self.config.csv_path;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = fs::create_dir_all(parent);
            }
        }

        let need_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        let mut out = BufWriter::new(file);

        if need_header {
            Self::write_header(&mut out)?;
        }
        self.write_row(&mut out)?;
        out.flush()
    }

    /// Writes the column header.
    pub fn write_header<W: Write>(out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "producers,consumers,capacity,blocking,pinning_on,padding_on,\
             large_payload,move_only_payload,warmup_ms,duration_ms,wall_time_ns,\
             pushes_ok,pops_ok,try_push_failures,try_pop_failures,\
             try_push_failures_pct,try_pop_failures_pct,\
             push_ops_per_sec,pop_ops_per_sec,\
             push_lat_min_ns,push_lat_p50_ns,push_lat_p95_ns,push_lat_p99_ns,\
             push_lat_p999_ns,push_lat_max_ns,push_lat_mean_ns,push_spikes_over_10x_p50,\
             pop_lat_min_ns,pop_lat_p50_ns,pop_lat_p95_ns,pop_lat_p99_ns,\
             pop_lat_p999_ns,pop_lat_max_ns,pop_lat_mean_ns,pop_spikes_over_10x_p50,\
             hist_bucket_ns,push_overflow_pct,pop_overflow_pct,\
             push_hist_bins,pop_hist_bins,notes"
        )
    }

    /// Writes one data row in header order.
    pub fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let config = &self.config;

        write!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},",
            config.producers,
            config.consumers,
            config.capacity,
            config.blocking as u8,
            config.pinning as u8,
            config.padding as u8,
            config.large_payload as u8,
            config.move_only_payload as u8,
            config.warmup.as_millis(),
            config.duration.as_millis(),
            self.wall_time.as_nanos(),
        )?;

        write!(
            out,
            "{},{},{},{},{:.2},{:.2},{},{},",
            self.push.ok,
            self.pop.ok,
            self.push.failures,
            self.pop.failures,
            percentage(self.push.failures, self.push.ok + self.push.failures),
            percentage(self.pop.failures, self.pop.ok + self.pop.failures),
            self.push_ops_per_sec() as u64,
            self.pop_ops_per_sec() as u64,
        )?;

        write_latency_block(out, &self.push_latency)?;
        write_latency_block(out, &self.pop_latency)?;

        write!(
            out,
            "{},{:.2},{:.2},",
            config.bucket_width_ns,
            percentage(self.push.histogram.overflows(), self.push.ok),
            percentage(self.pop.histogram.overflows(), self.pop.ok),
        )?;

        writeln!(
            out,
            "{},{},{}",
            escape_csv(&serialize_bins(self.push.histogram.buckets())),
            escape_csv(&serialize_bins(self.pop.histogram.buckets())),
            escape_csv(&config.notes),
        )
    }
}

fn write_latency_block<W: Write>(out: &mut W, latency: &LatencySummary) -> io::Result<()> {
    write!(
        out,
        "{},{},{},{},{},{},{},{},",
        latency.min_ns,
        latency.p50_ns,
        latency.p95_ns,
        latency.p99_ns,
        latency.p999_ns,
        latency.max_ns,
        latency.mean_ns,
        latency.spikes,
    )
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn serialize_bins(bins: &[u64]) -> String {
    let mut out = String::with_capacity(bins.len() * 2);
    for (i, bin) in bins.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push_str(&bin.to_string());
    }
    out
}

/// Quotes a field if it contains a comma, quote or line break; internal
/// quotes are doubled.
fn escape_csv(field: &str) -> String {
    if !field.contains([',', '"', '\n', '\r']) {
        return field.to_string();
    }

    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}
