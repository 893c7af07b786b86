//! flowsketch: line-rate DDoS anomaly detection without per-flow state.
//!
//! Estimates per-flow byte volume with a lock-free Count-Min sketch shared by
//! a pool of worker threads and classifies flood and amplification patterns
//! from sketch estimates plus protocol signal counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ Traffic feed │────>│ Worker pool  │     │  Telemetry  │
//! │ (ingestion)  │ chN │ sketch+bank  │<────│ snapshotter │
//! └─────────────┘     └──────────────┘ read └─────────────┘
//!     Thread            N threads              Async
//! ```
//!
//! - **Feed**: one descriptor stream partition per worker (receive-side
//!   partitioning), here produced synthetically in place of a NIC driver
//! - **Workers**: lock-free sketch inserts, counter updates, classification
//! - **Telemetry**: 1 s rate snapshots, CSV log, aggregate-rate alerting

mod classifier;
mod config;
mod counters;
mod descriptor;
mod error;
mod sketch;
mod telemetry;
mod traffic;
mod worker;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::counters::CounterBank;
use crate::sketch::CountMinSketch;
use crate::telemetry::{run_telemetry, StatsRecord};
use crate::traffic::{spawn_feed, FeedStats, GeneratorConfig, TrafficProfile};
use crate::worker::{ChannelSource, WorkerParams, WorkerPool, WorkerStats};

/// flowsketch: sketch-based DDoS detection at line rate.
#[derive(Parser, Debug)]
#[command(name = "flowsketch")]
#[command(version = "0.1.0")]
#[command(about = "Detect DDoS attack patterns via lock-free approximate flow accounting")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run detection against a synthetic traffic feed.
    Run {
        /// Traffic profile: baseline, syn-flood, udp-flood, icmp-flood,
        /// dns-amp, ntp-amp, ssdp-amp, ack-flood, fragmentation, mixed.
        #[arg(short, long, default_value = "mixed")]
        profile: String,

        /// Total packets to feed (0 = run until Ctrl+C).
        #[arg(short = 'n', long, default_value = "1000000")]
        packets: u64,

        /// Worker thread count (0 = auto: cores minus one).
        #[arg(short, long, default_value = "0")]
        workers: usize,

        /// Number of distinct attacking flows in the feed.
        #[arg(long, default_value = "4")]
        attack_flows: usize,

        /// RNG seed for a reproducible feed.
        #[arg(long, default_value = "3184")]
        seed: u64,

        /// Path to a TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// CSV detection log path (overrides config).
        #[arg(long)]
        log_file: Option<String>,

        /// Enable verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a default configuration file to stdout.
    GenerateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            profile,
            packets,
            workers,
            attack_flows,
            seed,
            config,
            log_file,
            verbose,
        } => {
            let log_level = if verbose { Level::DEBUG } else { Level::INFO };
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;

            let mut config = Config::load_or_default(config.as_deref())?;
            if workers > 0 {
                config.worker.workers = workers;
            }
            if log_file.is_some() {
                config.telemetry.log_file = log_file;
            }
            config.validate().context("Invalid configuration")?;

            let profile: TrafficProfile = profile
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid traffic profile")?;

            run_detection(
                config,
                GeneratorConfig {
                    profile,
                    packets,
                    attack_flows,
                    seed,
                },
            )
            .await
        }

        Commands::GenerateConfig => {
            print!("{}", Config::generate_default());
            Ok(())
        }
    }
}

async fn run_detection(config: Config, feed_config: GeneratorConfig) -> Result<()> {
    let num_workers = config.worker.effective_workers();
    info!(
        "Starting detection: {} workers, sketch {}x{}, flush every {} packets",
        num_workers, config.sketch.rows, config.sketch.cols, config.worker.flush_interval
    );

    // Shared state: allocated once, torn down only at process exit.
    let sketch = Arc::new(
        CountMinSketch::new(config.sketch.rows, config.sketch.cols)
            .context("Failed to allocate sketch")?,
    );
    let bank = Arc::new(CounterBank::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    // One bounded queue per worker: the feed partitions the stream so each
    // descriptor reaches exactly one worker.
    let mut senders = Vec::with_capacity(num_workers);
    let mut sources = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        let (tx, rx) = bounded(config.worker.queue_capacity);
        senders.push(tx);
        sources.push(ChannelSource::new(rx));
    }

    let pool = WorkerPool::spawn(
        sources,
        Arc::clone(&sketch),
        Arc::clone(&bank),
        WorkerParams {
            burst: config.worker.burst,
            flush_interval: config.worker.flush_interval,
            thresholds: config.detection,
        },
        Arc::clone(&shutdown),
    )
    .context("Failed to spawn worker pool")?;

    let feed_handle = spawn_feed(feed_config, senders, Arc::clone(&shutdown))
        .context("Failed to start traffic feed")?;

    // Telemetry runs on its own interval, independent of worker cadence.
    let (report_tx, report_rx) = mpsc::channel(100);
    let telemetry_handle = tokio::spawn(run_telemetry(
        Arc::clone(&bank),
        config.telemetry.clone(),
        report_tx,
        Arc::clone(&shutdown),
    ));

    // Join the feed and the pool off the async runtime; signal when drained.
    let (done_tx, done_rx) = oneshot::channel();
    let drain_handle = tokio::task::spawn_blocking(move || {
        let feed_stats = feed_handle.join().unwrap_or_default();
        let worker_stats = pool.join();
        let _ = done_tx.send((feed_stats, worker_stats));
    });

    run_console(report_rx, done_rx, Arc::clone(&shutdown)).await;

    // Stop telemetry and wait for the drain to complete.
    shutdown.store(true, Ordering::Relaxed);
    let _ = drain_handle.await;
    if let Ok(result) = telemetry_handle.await {
        if let Err(e) = result {
            error!("Telemetry error: {}", e);
        }
    }

    print_summary(&bank.snapshot());
    info!("flowsketch stopped");
    Ok(())
}

/// Console consumer: prints one table row per telemetry record until the
/// pipeline drains or the user interrupts.
async fn run_console(
    mut report_rx: mpsc::Receiver<StatsRecord>,
    mut done_rx: oneshot::Receiver<(FeedStats, Vec<WorkerStats>)>,
    shutdown: Arc<AtomicBool>,
) {
    println!(
        "{:<10} {:>15} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Time", "PPS", "Gbps", "Anomaly", "SYN", "UDP", "ICMP", "ACK", "Frag"
    );
    println!("{}", "-".repeat(104));

    let start = Instant::now();
    loop {
        tokio::select! {
            Some(record) = report_rx.recv() => {
                println!(
                    "{:<10} {:>15} {:>10.2} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
                    start.elapsed().as_secs(),
                    record.packets_per_sec,
                    record.gbps,
                    record.anomaly_count,
                    record.syn_count,
                    record.udp_count,
                    record.icmp_count,
                    record.ack_count,
                    record.frag_count,
                );
            }

            result = &mut done_rx => {
                if let Ok((feed, workers)) = result {
                    info!(
                        "Pipeline drained: {} packets fed, {} workers finished",
                        feed.sent,
                        workers.len()
                    );
                }
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                println!("\nReceived Ctrl+C, shutting down...");
                shutdown.store(true, Ordering::Relaxed);
            }
        }
    }
}

/// Final counter snapshot after full worker drain. Totals are exact here:
/// every worker flushed its local batch before exiting.
fn print_summary(snap: &crate::counters::CounterSnapshot) {
    println!("\nDetection Summary");
    println!("{}", "-".repeat(40));
    println!("{:<20} {:>18}", "Total Packets:", snap.total_packets);
    println!("{:<20} {:>18}", "Total Bytes:", snap.total_bytes);
    println!("{:<20} {:>18}", "Anomalies:", snap.anomaly_count);
    println!("{:<20} {:>18}", "SYN Packets:", snap.syn_count);
    println!("{:<20} {:>18}", "UDP Packets:", snap.udp_count);
    println!("{:<20} {:>18}", "ICMP Packets:", snap.icmp_count);
    println!("{:<20} {:>18}", "ACK Packets:", snap.ack_count);
    println!("{:<20} {:>18}", "Fragmented:", snap.frag_count);
}
