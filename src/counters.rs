//! Shared aggregate counters updated by every worker thread.
//!
//! Each field is an independently monotonic `AtomicU64` with relaxed ordering.
//! There is deliberately no cross-field atomicity: a snapshot is a sequence of
//! independent reads and may mix values from different instants, which is fine
//! because consumers only derive rate trends from it.
//!
//! The hottest counters (total packets/bytes) are not touched per packet.
//! Workers accumulate them in a [`LocalTotals`] and flush every
//! `flush_interval` packets, trading delayed visibility for far fewer
//! contended atomic ops. Per-signal counters (SYN, ACK, UDP, ICMP, frag) are
//! incremented directly so their final values are always exact.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Default worker-local flush threshold, in packets. Tunable; final totals are
/// exact regardless of the value because workers flush on exit.
pub const DEFAULT_FLUSH_INTERVAL: u64 = 4096;

/// Process-lifetime counter bank. Allocated once, shared by all workers,
/// read-only for the telemetry snapshotter.
#[derive(Debug, Default)]
pub struct CounterBank {
    pub total_packets: AtomicU64,
    pub total_bytes: AtomicU64,
    pub anomaly_count: AtomicU64,
    pub syn_count: AtomicU64,
    pub udp_count: AtomicU64,
    pub icmp_count: AtomicU64,
    pub ack_count: AtomicU64,
    pub frag_count: AtomicU64,
}

impl CounterBank {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_syn(&self) {
        self.syn_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_ack(&self) {
        self.ack_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_udp(&self) {
        self.udp_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_icmp(&self) {
        self.icmp_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_fragmented(&self) {
        self.frag_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_anomaly(&self) {
        self.anomaly_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_totals(&self, packets: u64, bytes: u64) {
        self.total_packets.fetch_add(packets, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Reads every counter. Not a point-in-time transaction.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_packets: self.total_packets.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            anomaly_count: self.anomaly_count.load(Ordering::Relaxed),
            syn_count: self.syn_count.load(Ordering::Relaxed),
            udp_count: self.udp_count.load(Ordering::Relaxed),
            icmp_count: self.icmp_count.load(Ordering::Relaxed),
            ack_count: self.ack_count.load(Ordering::Relaxed),
            frag_count: self.frag_count.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value snapshot of the counter bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub anomaly_count: u64,
    pub syn_count: u64,
    pub udp_count: u64,
    pub icmp_count: u64,
    pub ack_count: u64,
    pub frag_count: u64,
}

/// Worker-local accumulator for the hot total-packet/total-byte counters.
///
/// Call [`LocalTotals::record`] per packet; it flushes to the shared bank once
/// the configured interval is reached. The owning worker must call
/// [`LocalTotals::flush`] before exiting so a post-shutdown snapshot reflects
/// every processed packet exactly once.
#[derive(Debug)]
pub struct LocalTotals {
    packets: u64,
    bytes: u64,
    flush_interval: u64,
}

impl LocalTotals {
    pub fn new(flush_interval: u64) -> Self {
        Self {
            packets: 0,
            bytes: 0,
            flush_interval: flush_interval.max(1),
        }
    }

    /// Records one packet, flushing to `bank` at the configured interval.
    #[inline]
    pub fn record(&mut self, bank: &CounterBank, bytes: u64) {
        self.packets += 1;
        self.bytes += bytes;
        if self.packets >= self.flush_interval {
            self.flush(bank);
        }
    }

    /// Pushes any pending local totals into the shared bank.
    pub fn flush(&mut self, bank: &CounterBank) {
        if self.packets > 0 {
            bank.add_totals(self.packets, self.bytes);
            self.packets = 0;
            self.bytes = 0;
        }
    }

    /// Locally-buffered packets not yet visible in the bank.
    pub fn pending(&self) -> u64 {
        self.packets
    }
}
