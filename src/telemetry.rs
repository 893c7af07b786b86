//! Telemetry snapshotter - periodic rates and coarse-grained alerting.
//!
//! Runs on a fixed wall-clock interval, independent of worker cadence. Each
//! tick takes a counter snapshot, computes rate deltas against the previous
//! one and emits a [`StatsRecord`] to the console consumer plus an optional
//! CSV detection log. It also raises a high-level alert when the aggregate
//! packet or bit rate exceeds its threshold - a second, coarser anomaly signal
//! that catches volumetric attacks diluted across many distinct flows, which
//! the per-flow sketch alone would miss.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::counters::{CounterBank, CounterSnapshot};
use crate::error::Result;

/// One telemetry record per interval. The sink owns presentation; this struct
/// only carries values.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsRecord {
    pub timestamp: DateTime<Utc>,
    pub packets_per_sec: u64,
    pub gbps: f64,
    pub anomaly_count: u64,
    pub syn_count: u64,
    pub udp_count: u64,
    pub icmp_count: u64,
    pub ack_count: u64,
    pub frag_count: u64,
}

impl StatsRecord {
    pub const CSV_HEADER: &'static str = "timestamp,pps,gbps,anomalies,syn,udp,icmp,ack,frag";

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{:.2},{},{},{},{},{},{}",
            self.timestamp.timestamp(),
            self.packets_per_sec,
            self.gbps,
            self.anomaly_count,
            self.syn_count,
            self.udp_count,
            self.icmp_count,
            self.ack_count,
            self.frag_count,
        )
    }
}

/// Computes a record from two successive snapshots.
///
/// Counters are independently monotonic but a snapshot is not transactional,
/// so the deltas are trends, not exact instants. `elapsed_secs` is measured
/// wall-clock time, not the nominal interval.
pub fn compute_record(
    prev: &CounterSnapshot,
    cur: &CounterSnapshot,
    elapsed_secs: f64,
    timestamp: DateTime<Utc>,
) -> StatsRecord {
    let elapsed = elapsed_secs.max(f64::EPSILON);
    let pkt_delta = cur.total_packets.saturating_sub(prev.total_packets);
    let byte_delta = cur.total_bytes.saturating_sub(prev.total_bytes);

    StatsRecord {
        timestamp,
        packets_per_sec: (pkt_delta as f64 / elapsed) as u64,
        gbps: (byte_delta as f64 * 8.0) / elapsed / 1e9,
        anomaly_count: cur.anomaly_count,
        syn_count: cur.syn_count,
        udp_count: cur.udp_count,
        icmp_count: cur.icmp_count,
        ack_count: cur.ack_count,
        frag_count: cur.frag_count,
    }
}

/// True when the aggregate rates cross an alert threshold.
pub fn rate_alert(record: &StatsRecord, config: &TelemetryConfig) -> bool {
    record.packets_per_sec > config.alert_pps || record.gbps > config.alert_gbps
}

/// Optional CSV sink for detection records.
struct CsvLog {
    file: File,
}

impl CsvLog {
    fn open(path: &Path) -> Result<Self> {
        let existed = path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open detection log: {}", path.display()))?;
        if !existed {
            writeln!(file, "{}", StatsRecord::CSV_HEADER)?;
        }
        Ok(Self { file })
    }

    fn append(&mut self, record: &StatsRecord) {
        if let Err(e) = writeln!(self.file, "{}", record.to_csv_line()) {
            warn!("Failed to write detection log: {}", e);
        }
    }
}

/// Async snapshot loop. Sends one record per interval to `report_tx`
/// (non-blocking; a slow consumer drops records, never stalls telemetry) and
/// exits when the shutdown flag is set.
pub async fn run_telemetry(
    bank: Arc<CounterBank>,
    config: TelemetryConfig,
    report_tx: mpsc::Sender<StatsRecord>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut log = match &config.log_file {
        Some(path) => Some(CsvLog::open(Path::new(path))?),
        None => None,
    };

    let mut ticker = interval(Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; swallow it so the
    // first delta spans a real interval.
    ticker.tick().await;

    let mut prev = bank.snapshot();
    let mut last_instant = Instant::now();

    info!(
        "Telemetry started, interval: {}s, alert thresholds: {} pps / {} Gbps",
        config.interval_secs, config.alert_pps, config.alert_gbps
    );

    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let now = Instant::now();
        let cur = bank.snapshot();
        let record = compute_record(
            &prev,
            &cur,
            now.duration_since(last_instant).as_secs_f64(),
            Utc::now(),
        );
        prev = cur;
        last_instant = now;

        if let Some(log) = log.as_mut() {
            log.append(&record);
        }

        if rate_alert(&record, &config) {
            warn!(
                pps = record.packets_per_sec,
                gbps = record.gbps,
                "High rate detected"
            );
        }

        if report_tx.try_send(record).is_err() {
            debug!("Report channel full, dropping telemetry record");
        }
    }

    info!("Telemetry stopped");
    Ok(())
}
