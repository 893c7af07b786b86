//! Attack classification over sketch estimates and protocol signals.
//!
//! `classify` is a pure decision function evaluated once per packet, after the
//! sketch insert for that packet (so the estimate includes its contribution).
//! The rule order is load-bearing: a flow can satisfy several lower tiers at
//! once, and the first match wins. High-volume classification always takes
//! precedence over protocol-specific floods and amplification checks.

use serde::{Deserialize, Serialize};

use crate::descriptor::{FlowKey, Protocol, TcpFlags};

/// Well-known amplification service ports (logical port numbers).
pub const DNS_PORT: u16 = 53;
pub const NTP_PORT: u16 = 123;
pub const SSDP_PORT: u16 = 1900;

/// Classification outcome for a single packet's flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackClass {
    None,
    SynFlood,
    UdpFlood,
    IcmpFlood,
    Volumetric,
    DnsAmplification,
    NtpAmplification,
    SsdpAmplification,
    AckFlood,
}

impl AttackClass {
    /// True for every outcome that should be tallied as an anomaly.
    pub fn is_anomaly(&self) -> bool {
        !matches!(self, AttackClass::None)
    }

    /// Human-readable severity label for alert output.
    pub fn severity(&self) -> &'static str {
        match self {
            AttackClass::None => "NONE",
            AttackClass::Volumetric | AttackClass::UdpFlood | AttackClass::IcmpFlood => "CRITICAL",
            AttackClass::SynFlood | AttackClass::AckFlood => "HIGH",
            AttackClass::DnsAmplification
            | AttackClass::NtpAmplification
            | AttackClass::SsdpAmplification => "HIGH",
        }
    }
}

impl std::fmt::Display for AttackClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttackClass::None => write!(f, "NONE"),
            AttackClass::SynFlood => write!(f, "SYN_FLOOD"),
            AttackClass::UdpFlood => write!(f, "UDP_FLOOD"),
            AttackClass::IcmpFlood => write!(f, "ICMP_FLOOD"),
            AttackClass::Volumetric => write!(f, "VOLUMETRIC_MIXED"),
            AttackClass::DnsAmplification => write!(f, "DNS_AMPLIFICATION"),
            AttackClass::NtpAmplification => write!(f, "NTP_AMPLIFICATION"),
            AttackClass::SsdpAmplification => write!(f, "SSDP_AMPLIFICATION"),
            AttackClass::AckFlood => write!(f, "ACK_FLOOD"),
        }
    }
}

/// Byte-volume thresholds for the classification tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Tier 1: any flow past this volume is a flood regardless of flags.
    pub high_volume_bytes: u64,
    /// Tier 2/3: SYN-only and ACK-only TCP floods.
    pub tcp_flood_bytes: u64,
    /// Tier 4: DNS amplification (port 53).
    pub dns_amp_bytes: u64,
    /// Tier 4: NTP (port 123) and SSDP (port 1900) amplification.
    pub reflection_amp_bytes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_volume_bytes: 10_000_000,
            tcp_flood_bytes: 5_000_000,
            dns_amp_bytes: 3_000_000,
            reflection_amp_bytes: 2_000_000,
        }
    }
}

/// Classifies one packet's flow given its estimated accumulated byte volume.
///
/// Pure function; the caller tallies non-`None` results into the counter bank.
pub fn classify(
    flow: &FlowKey,
    flags: TcpFlags,
    estimated_bytes: u64,
    thresholds: &Thresholds,
) -> AttackClass {
    // Tier 1: high-volume floods, classified by protocol.
    if estimated_bytes > thresholds.high_volume_bytes {
        return match flow.protocol {
            Protocol::Udp => AttackClass::UdpFlood,
            Protocol::Icmp => AttackClass::IcmpFlood,
            _ => AttackClass::Volumetric,
        };
    }

    // Tiers 2/3: TCP floods distinguished by flag signature.
    if flow.protocol == Protocol::Tcp && estimated_bytes > thresholds.tcp_flood_bytes {
        if flags.syn && !flags.ack {
            return AttackClass::SynFlood;
        }
        if flags.ack && !flags.syn {
            return AttackClass::AckFlood;
        }
    }

    // Tier 4: amplification services, matched on the logical destination port.
    if flow.protocol == Protocol::Udp {
        match flow.dst_port {
            DNS_PORT if estimated_bytes > thresholds.dns_amp_bytes => {
                return AttackClass::DnsAmplification;
            }
            NTP_PORT if estimated_bytes > thresholds.reflection_amp_bytes => {
                return AttackClass::NtpAmplification;
            }
            SSDP_PORT if estimated_bytes > thresholds.reflection_amp_bytes => {
                return AttackClass::SsdpAmplification;
            }
            _ => {}
        }
    }

    AttackClass::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn flow(proto: Protocol, dst_port: u16) -> FlowKey {
        FlowKey::new(
            IpAddr::from([203, 0, 113, 7]),
            IpAddr::from([192, 0, 2, 1]),
            40000,
            dst_port,
            proto,
        )
    }

    fn t() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn test_quiet_flow_is_none() {
        let c = classify(&flow(Protocol::Tcp, 80), TcpFlags::NONE, 1000, &t());
        assert_eq!(c, AttackClass::None);
    }

    #[test]
    fn test_high_volume_by_protocol() {
        assert_eq!(
            classify(&flow(Protocol::Udp, 9999), TcpFlags::NONE, 10_000_001, &t()),
            AttackClass::UdpFlood
        );
        assert_eq!(
            classify(&flow(Protocol::Icmp, 0), TcpFlags::NONE, 10_000_001, &t()),
            AttackClass::IcmpFlood
        );
        assert_eq!(
            classify(&flow(Protocol::Tcp, 80), TcpFlags::NONE, 10_000_001, &t()),
            AttackClass::Volumetric
        );
    }

    #[test]
    fn test_high_volume_tier_wins_over_syn_flood() {
        // A SYN-only flow past the high-volume threshold satisfies both tier 1
        // and tier 2; tier 1 must win.
        let c = classify(&flow(Protocol::Tcp, 80), TcpFlags::SYN, 11_000_000, &t());
        assert_eq!(c, AttackClass::Volumetric);
    }

    #[test]
    fn test_syn_flood_window() {
        let key = flow(Protocol::Tcp, 80);
        // Between the TCP and high-volume thresholds: SYN flood.
        assert_eq!(
            classify(&key, TcpFlags::SYN, 5_000_001, &t()),
            AttackClass::SynFlood
        );
        // At the threshold exactly: not yet.
        assert_eq!(
            classify(&key, TcpFlags::SYN, 5_000_000, &t()),
            AttackClass::None
        );
        // SYN+ACK together is handshake traffic, not a SYN flood signature.
        let synack = TcpFlags { syn: true, ack: true };
        assert_eq!(classify(&key, synack, 6_000_000, &t()), AttackClass::None);
    }

    #[test]
    fn test_ack_flood() {
        let c = classify(&flow(Protocol::Tcp, 80), TcpFlags::ACK, 5_000_001, &t());
        assert_eq!(c, AttackClass::AckFlood);
    }

    #[test]
    fn test_dns_amplification_boundary() {
        let key = flow(Protocol::Udp, DNS_PORT);
        assert_eq!(
            classify(&key, TcpFlags::NONE, 3_000_000, &t()),
            AttackClass::None
        );
        assert_eq!(
            classify(&key, TcpFlags::NONE, 3_000_001, &t()),
            AttackClass::DnsAmplification
        );
    }

    #[test]
    fn test_ntp_and_ssdp_amplification() {
        assert_eq!(
            classify(&flow(Protocol::Udp, NTP_PORT), TcpFlags::NONE, 2_000_001, &t()),
            AttackClass::NtpAmplification
        );
        assert_eq!(
            classify(&flow(Protocol::Udp, SSDP_PORT), TcpFlags::NONE, 2_000_001, &t()),
            AttackClass::SsdpAmplification
        );
        assert_eq!(
            classify(&flow(Protocol::Udp, NTP_PORT), TcpFlags::NONE, 2_000_000, &t()),
            AttackClass::None
        );
    }

    #[test]
    fn test_amplification_port_is_logical_not_byte_swapped() {
        // Port matching is on the logical (host-order) port number. 13568 is
        // the byte-swapped image of 53 and must not match the DNS rule.
        let swapped = flow(Protocol::Udp, 13568);
        assert_eq!(
            classify(&swapped, TcpFlags::NONE, 9_000_000, &t()),
            AttackClass::None
        );
        let dns = flow(Protocol::Udp, 53);
        assert_eq!(
            classify(&dns, TcpFlags::NONE, 9_000_000, &t()),
            AttackClass::DnsAmplification
        );
    }

    #[test]
    fn test_tcp_port_53_is_not_amplification() {
        // Amplification rules only apply to UDP.
        let c = classify(&flow(Protocol::Tcp, DNS_PORT), TcpFlags::NONE, 9_000_000, &t());
        assert_eq!(c, AttackClass::None);
    }

    #[test]
    fn test_anomaly_tally_predicate() {
        assert!(!AttackClass::None.is_anomaly());
        assert!(AttackClass::SynFlood.is_anomaly());
        assert!(AttackClass::Volumetric.is_anomaly());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(format!("{}", AttackClass::SynFlood), "SYN_FLOOD");
        assert_eq!(format!("{}", AttackClass::Volumetric), "VOLUMETRIC_MIXED");
        assert_eq!(
            format!("{}", AttackClass::DnsAmplification),
            "DNS_AMPLIFICATION"
        );
    }
}
