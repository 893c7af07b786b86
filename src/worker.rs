//! Worker loop - drives the sketch, counters and classifier from a packet
//! descriptor stream.
//!
//! Each worker owns a disjoint partition of the incoming stream (receive-side
//! partitioning is the ingestion layer's job) and shares only the sketch and
//! the counter bank with its peers. The poll step is non-blocking: when the
//! source has nothing pending the worker spins back to the cancellation check
//! rather than sleeping, keeping latency minimal under load.
//!
//! Cancellation is cooperative. The shutdown flag is checked once per poll
//! iteration, so shutdown latency is bounded by one in-flight batch, and every
//! worker flushes its local totals before exiting - a post-drain snapshot
//! counts each delivered packet exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::classifier::{classify, Thresholds};
use crate::counters::{CounterBank, LocalTotals};
use crate::descriptor::{PacketDescriptor, Protocol};
use crate::error::{ConfigError, Result};
use crate::sketch::CountMinSketch;

/// A source of packet descriptors for one worker.
///
/// Implemented by the ingestion boundary. `poll` must not block: it fills
/// `batch` with at most `max` descriptors and returns immediately with 0 when
/// nothing is pending. Each descriptor is delivered to exactly one worker
/// exactly once.
pub trait PacketSource: Send {
    fn poll(&mut self, batch: &mut Vec<PacketDescriptor>, max: usize) -> usize;

    /// True once no further descriptors will ever arrive. Lets a worker drain
    /// and exit early when the feed finishes before cancellation, and bounds
    /// the post-cancellation drain: a finite source must eventually report
    /// exhaustion or its worker never exits.
    fn is_exhausted(&mut self) -> bool {
        false
    }
}

/// Channel-backed descriptor source: one bounded crossbeam channel per worker.
pub struct ChannelSource {
    rx: Receiver<PacketDescriptor>,
    /// Descriptor stolen by an exhaustion probe; handed back on the next poll.
    pending: Option<PacketDescriptor>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<PacketDescriptor>) -> Self {
        Self { rx, pending: None }
    }
}

impl PacketSource for ChannelSource {
    fn poll(&mut self, batch: &mut Vec<PacketDescriptor>, max: usize) -> usize {
        let mut taken = 0;
        if let Some(desc) = self.pending.take() {
            batch.push(desc);
            taken += 1;
        }
        while taken < max {
            match self.rx.try_recv() {
                Ok(desc) => {
                    batch.push(desc);
                    taken += 1;
                }
                Err(_) => break,
            }
        }
        taken
    }

    fn is_exhausted(&mut self) -> bool {
        if self.pending.is_some() {
            return false;
        }
        match self.rx.try_recv() {
            // Raced a late descriptor; keep it for the next poll.
            Ok(desc) => {
                self.pending = Some(desc);
                false
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => true,
            Err(crossbeam_channel::TryRecvError::Empty) => false,
        }
    }
}

/// Per-worker settings, copied out of the global config at spawn time.
#[derive(Debug, Clone)]
pub struct WorkerParams {
    /// Maximum descriptors taken per poll.
    pub burst: usize,
    /// Local totals flush threshold in packets.
    pub flush_interval: u64,
    pub thresholds: Thresholds,
}

/// Handle to a spawned worker pool.
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns one named OS thread per source. The returned pool joins on
    /// [`WorkerPool::join`]; workers stop when the shutdown flag is set or
    /// their source is exhausted.
    pub fn spawn<S: PacketSource + 'static>(
        sources: Vec<S>,
        sketch: Arc<CountMinSketch>,
        bank: Arc<CounterBank>,
        params: WorkerParams,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(ConfigError::InvalidWorkerCount.into());
        }
        let mut handles = Vec::with_capacity(sources.len());
        for (id, source) in sources.into_iter().enumerate() {
            let sketch = Arc::clone(&sketch);
            let bank = Arc::clone(&bank);
            let shutdown = Arc::clone(&shutdown);
            let params = params.clone();

            let handle = std::thread::Builder::new()
                .name(format!("flow-worker-{id}"))
                .spawn(move || run_worker(id, source, &sketch, &bank, &params, &shutdown))?;
            handles.push(handle);
        }

        Ok(Self { handles, shutdown })
    }

    /// Returns a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Waits for every worker to drain and exit.
    pub fn join(self) -> Vec<WorkerStats> {
        self.handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .collect()
    }
}

/// Per-worker lifetime statistics, reported at exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    pub id: usize,
    pub packets: u64,
    pub bytes: u64,
    pub anomalies: u64,
}

/// The worker state machine: poll, process batch, poll again. Terminal only
/// on cancellation or source exhaustion.
pub fn run_worker<S: PacketSource>(
    id: usize,
    mut source: S,
    sketch: &CountMinSketch,
    bank: &CounterBank,
    params: &WorkerParams,
    shutdown: &AtomicBool,
) -> WorkerStats {
    debug!(worker = id, "worker started");

    let mut stats = WorkerStats {
        id,
        ..Default::default()
    };
    let mut local = LocalTotals::new(params.flush_interval);
    let mut batch: Vec<PacketDescriptor> = Vec::with_capacity(params.burst);

    while !shutdown.load(Ordering::Relaxed) {
        batch.clear();
        let n = source.poll(&mut batch, params.burst);
        if n == 0 {
            if source.is_exhausted() {
                break;
            }
            continue;
        }

        for desc in &batch {
            process_packet(desc, sketch, bank, &params.thresholds, &mut local, &mut stats);
        }
    }

    // Drain until the source is closed. The ingestion side can still be
    // delivering for a short window after the flag is set, so a transient
    // empty poll does not mean the stream has ended; only exhaustion does.
    loop {
        batch.clear();
        let n = source.poll(&mut batch, params.burst);
        if n == 0 {
            if source.is_exhausted() {
                break;
            }
            continue;
        }
        for desc in &batch {
            process_packet(desc, sketch, bank, &params.thresholds, &mut local, &mut stats);
        }
    }

    local.flush(bank);
    info!(
        worker = id,
        packets = stats.packets,
        bytes = stats.bytes,
        anomalies = stats.anomalies,
        "worker drained"
    );
    stats
}

/// The per-packet path. No blocking operations, no allocation.
#[inline]
fn process_packet(
    desc: &PacketDescriptor,
    sketch: &CountMinSketch,
    bank: &CounterBank,
    thresholds: &Thresholds,
    local: &mut LocalTotals,
    stats: &mut WorkerStats,
) {
    // Immediate per-signal counters first; these stay exact.
    match desc.flow.protocol {
        Protocol::Tcp => {
            if desc.flags.syn {
                bank.add_syn();
            }
            if desc.flags.ack {
                bank.add_ack();
            }
        }
        Protocol::Udp => bank.add_udp(),
        Protocol::Icmp => bank.add_icmp(),
        Protocol::Other(_) => {}
    }
    if desc.fragmented {
        bank.add_fragmented();
    }

    // Insert before query so the estimate includes this packet.
    sketch.insert(&desc.flow, desc.length as u64);
    let estimate = sketch.query(&desc.flow);

    let class = classify(&desc.flow, desc.flags, estimate, thresholds);
    if class.is_anomaly() {
        bank.add_anomaly();
        stats.anomalies += 1;
        debug!(
            flow = %desc.flow,
            class = %class,
            severity = class.severity(),
            estimated_bytes = estimate,
            "Anomaly detected"
        );
    }

    stats.packets += 1;
    stats.bytes += desc.length as u64;
    local.record(bank, desc.length as u64);
}
