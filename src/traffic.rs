//! Synthetic traffic feed.
//!
//! Stands in for the excluded ingestion layer: generates packet descriptor
//! streams shaped like the lab attack profiles (SYN flood, UDP flood,
//! amplification, ICMP flood) plus an organic baseline, and partitions them
//! across the per-worker channels exactly the way receive-side scaling would -
//! each descriptor goes to exactly one worker exactly once.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::descriptor::{FlowKey, PacketDescriptor, Protocol, TcpFlags};
use crate::error::Result;

/// Traffic shape to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficProfile {
    /// Organic-looking background traffic only.
    Baseline,
    SynFlood,
    UdpFlood,
    IcmpFlood,
    DnsAmplification,
    NtpAmplification,
    SsdpAmplification,
    AckFlood,
    /// IP fragmentation flood: every packet carries the fragmented flag.
    Fragmentation,
    /// Attack traffic over a baseline mix.
    #[default]
    Mixed,
}

impl std::str::FromStr for TrafficProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "syn-flood" | "syn_flood" => Ok(Self::SynFlood),
            "udp-flood" | "udp_flood" => Ok(Self::UdpFlood),
            "icmp-flood" | "icmp_flood" => Ok(Self::IcmpFlood),
            "dns-amp" | "dns_amp" => Ok(Self::DnsAmplification),
            "ntp-amp" | "ntp_amp" => Ok(Self::NtpAmplification),
            "ssdp-amp" | "ssdp_amp" => Ok(Self::SsdpAmplification),
            "ack-flood" | "ack_flood" => Ok(Self::AckFlood),
            "fragmentation" | "frag" => Ok(Self::Fragmentation),
            "mixed" => Ok(Self::Mixed),
            _ => Err(format!("Unknown traffic profile: {}", s)),
        }
    }
}

impl std::fmt::Display for TrafficProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baseline => write!(f, "baseline"),
            Self::SynFlood => write!(f, "syn-flood"),
            Self::UdpFlood => write!(f, "udp-flood"),
            Self::IcmpFlood => write!(f, "icmp-flood"),
            Self::DnsAmplification => write!(f, "dns-amp"),
            Self::NtpAmplification => write!(f, "ntp-amp"),
            Self::SsdpAmplification => write!(f, "ssdp-amp"),
            Self::AckFlood => write!(f, "ack-flood"),
            Self::Fragmentation => write!(f, "fragmentation"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Configuration for the synthetic feed.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub profile: TrafficProfile,
    /// Total descriptors to emit (0 = run until cancelled).
    pub packets: u64,
    /// Number of distinct attacking flows.
    pub attack_flows: usize,
    /// RNG seed for reproducible streams.
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            profile: TrafficProfile::Mixed,
            packets: 1_000_000,
            attack_flows: 4,
            seed: 0x0c70,
        }
    }
}

/// Statistics from a completed feed run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedStats {
    pub sent: u64,
}

/// Generates descriptors for a profile. Deterministic for a given seed.
pub struct TrafficGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    attack_flows: Vec<FlowKey>,
    victim: IpAddr,
}

impl TrafficGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let victim = IpAddr::from([10, 10, 1, 2]);
        let attack_flows = (0..config.attack_flows.max(1))
            .map(|_| attack_flow(&mut rng, victim, config.profile))
            .collect();

        Self {
            config,
            rng,
            attack_flows,
            victim,
        }
    }

    /// Produces the next descriptor in the stream.
    pub fn next_packet(&mut self) -> PacketDescriptor {
        match self.config.profile {
            TrafficProfile::Baseline => self.baseline_packet(),
            TrafficProfile::Mixed => {
                // 4 in 5 packets belong to a random attack on the victim.
                if self.rng.gen_ratio(4, 5) {
                    self.attack_packet()
                } else {
                    self.baseline_packet()
                }
            }
            _ => self.attack_packet(),
        }
    }

    fn attack_packet(&mut self) -> PacketDescriptor {
        let flow = self.attack_flows[self.rng.gen_range(0..self.attack_flows.len())].clone();
        let profile = self.config.profile;
        let (length, flags) = match profile {
            TrafficProfile::SynFlood => (64, TcpFlags::SYN),
            TrafficProfile::AckFlood => (64, TcpFlags::ACK),
            TrafficProfile::UdpFlood => (512, TcpFlags::NONE),
            TrafficProfile::IcmpFlood => (1400, TcpFlags::NONE),
            TrafficProfile::DnsAmplification => (1200, TcpFlags::NONE),
            TrafficProfile::NtpAmplification => (468, TcpFlags::NONE),
            TrafficProfile::SsdpAmplification => (1024, TcpFlags::NONE),
            TrafficProfile::Fragmentation => (1480, TcpFlags::NONE),
            // Mixed: pick a shape at random for this flow's protocol.
            _ => match flow.protocol {
                Protocol::Tcp => (64, TcpFlags::SYN),
                Protocol::Icmp => (1400, TcpFlags::NONE),
                _ => (512, TcpFlags::NONE),
            },
        };
        PacketDescriptor::new(flow, length)
            .with_flags(flags)
            .fragmented(profile == TrafficProfile::Fragmentation)
    }

    fn baseline_packet(&mut self) -> PacketDescriptor {
        let proto = match self.rng.gen_range(0..10) {
            0..=6 => Protocol::Tcp,
            7..=8 => Protocol::Udp,
            _ => Protocol::Icmp,
        };
        const SERVICE_PORTS: [u16; 4] = [80, 443, 22, 8080];
        let flow = FlowKey::new(
            random_host(&mut self.rng),
            self.victim,
            self.rng.gen_range(1024..=65535),
            SERVICE_PORTS[self.rng.gen_range(0..SERVICE_PORTS.len())],
            proto,
        );
        let flags = if proto == Protocol::Tcp && self.rng.gen_ratio(1, 10) {
            TcpFlags::SYN
        } else if proto == Protocol::Tcp {
            TcpFlags::ACK
        } else {
            TcpFlags::NONE
        };
        PacketDescriptor::new(flow, self.rng.gen_range(64..=1500)).with_flags(flags)
    }
}

fn random_host(rng: &mut StdRng) -> IpAddr {
    IpAddr::from([198, 51, rng.gen::<u8>(), rng.gen::<u8>().max(1)])
}

/// Builds one attacking flow toward the victim for the given profile, with the
/// destination ports the corresponding real attack would use.
fn attack_flow(rng: &mut StdRng, victim: IpAddr, profile: TrafficProfile) -> FlowKey {
    let src = random_host(rng);
    let src_port = rng.gen_range(1024..=65535);
    match profile {
        TrafficProfile::SynFlood | TrafficProfile::AckFlood => {
            FlowKey::new(src, victim, src_port, 80, Protocol::Tcp)
        }
        // Not port 53: a sustained flood aimed there crosses the DNS
        // amplification threshold long before the volumetric one, so it
        // would classify as amplification instead of a plain UDP flood.
        TrafficProfile::UdpFlood => FlowKey::new(src, victim, src_port, 443, Protocol::Udp),
        TrafficProfile::IcmpFlood => FlowKey::new(src, victim, 0, 0, Protocol::Icmp),
        // Fragments carry no reassembled transport port.
        TrafficProfile::Fragmentation => FlowKey::new(src, victim, src_port, 0, Protocol::Udp),
        TrafficProfile::DnsAmplification => FlowKey::new(src, victim, 53, 53, Protocol::Udp),
        TrafficProfile::NtpAmplification => FlowKey::new(src, victim, 123, 123, Protocol::Udp),
        TrafficProfile::SsdpAmplification => FlowKey::new(src, victim, 1900, 1900, Protocol::Udp),
        // Baseline/Mixed attack flows: random flood shape.
        _ => match rng.gen_range(0..3) {
            0 => FlowKey::new(src, victim, src_port, 80, Protocol::Tcp),
            1 => FlowKey::new(src, victim, 53, 53, Protocol::Udp),
            _ => FlowKey::new(src, victim, 0, 0, Protocol::Icmp),
        },
    }
}

/// Feeds generated descriptors round-robin into the per-worker channels on a
/// dedicated thread, mirroring receive-side partitioning. Blocks on full
/// queues (backpressure) rather than dropping.
pub fn spawn_feed(
    config: GeneratorConfig,
    senders: Vec<Sender<PacketDescriptor>>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<FeedStats>> {
    let handle = std::thread::Builder::new()
        .name("traffic-feed".into())
        .spawn(move || {
            let mut generator = TrafficGenerator::new(config.clone());
            let mut stats = FeedStats::default();
            let workers = senders.len();

            info!(
                profile = %config.profile,
                packets = config.packets,
                workers,
                "traffic feed started"
            );

            let mut i: u64 = 0;
            loop {
                if config.packets > 0 && i >= config.packets {
                    break;
                }
                // Cancellation check at batch granularity, not per packet.
                if i % 1024 == 0 && shutdown.load(Ordering::Relaxed) {
                    break;
                }

                let desc = generator.next_packet();
                if senders[(i % workers as u64) as usize].send(desc).is_err() {
                    debug!("worker queue closed, stopping feed");
                    break;
                }
                stats.sent += 1;
                i += 1;
            }

            info!(sent = stats.sent, "traffic feed finished");
            stats
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_profile_parsing() {
        assert_eq!(
            "syn-flood".parse::<TrafficProfile>().unwrap(),
            TrafficProfile::SynFlood
        );
        assert_eq!(
            "dns_amp".parse::<TrafficProfile>().unwrap(),
            TrafficProfile::DnsAmplification
        );
        assert!("bogus".parse::<TrafficProfile>().is_err());
    }

    #[test]
    fn test_generator_is_deterministic_for_seed() {
        let config = GeneratorConfig {
            profile: TrafficProfile::Mixed,
            packets: 100,
            attack_flows: 2,
            seed: 42,
        };
        let mut a = TrafficGenerator::new(config.clone());
        let mut b = TrafficGenerator::new(config);

        for _ in 0..100 {
            let pa = a.next_packet();
            let pb = b.next_packet();
            assert_eq!(pa.flow, pb.flow);
            assert_eq!(pa.length, pb.length);
        }
    }

    #[test]
    fn test_syn_flood_shape() {
        let mut gen = TrafficGenerator::new(GeneratorConfig {
            profile: TrafficProfile::SynFlood,
            packets: 50,
            attack_flows: 1,
            seed: 1,
        });
        for _ in 0..50 {
            let p = gen.next_packet();
            assert_eq!(p.flow.protocol, Protocol::Tcp);
            assert_eq!(p.flow.dst_port, 80);
            assert_eq!(p.length, 64);
            assert!(p.flags.syn);
            assert!(!p.flags.ack);
        }
    }

    #[test]
    fn test_dns_amp_targets_port_53() {
        let mut gen = TrafficGenerator::new(GeneratorConfig {
            profile: TrafficProfile::DnsAmplification,
            packets: 10,
            attack_flows: 2,
            seed: 1,
        });
        for _ in 0..10 {
            let p = gen.next_packet();
            assert_eq!(p.flow.protocol, Protocol::Udp);
            assert_eq!(p.flow.dst_port, 53);
        }
    }

    #[test]
    fn test_fragmentation_shape() {
        let mut gen = TrafficGenerator::new(GeneratorConfig {
            profile: TrafficProfile::Fragmentation,
            packets: 20,
            attack_flows: 2,
            seed: 5,
        });
        for _ in 0..20 {
            let p = gen.next_packet();
            assert!(p.fragmented);
            assert_eq!(p.flow.protocol, Protocol::Udp);
            assert_eq!(p.flow.dst_port, 0);
            assert_eq!(p.length, 1480);
        }
    }

    #[test]
    fn test_feed_delivers_exact_count_round_robin() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut receivers = Vec::new();
        let mut senders = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = bounded(4096);
            senders.push(tx);
            receivers.push(rx);
        }

        let handle = spawn_feed(
            GeneratorConfig {
                profile: TrafficProfile::Baseline,
                packets: 900,
                attack_flows: 1,
                seed: 7,
            },
            senders,
            shutdown,
        )
        .unwrap();

        let stats = handle.join().unwrap();
        assert_eq!(stats.sent, 900);
        for rx in &receivers {
            assert_eq!(rx.len(), 300);
        }
    }
}
