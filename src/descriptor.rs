//! Packet descriptor types shared between the ingestion boundary and the workers.
//!
//! The ingestion layer (kernel-bypass driver, header parsing) lives outside this
//! crate; it hands us one `PacketDescriptor` per received packet. Flow keys are
//! only ever hashed - there is no per-flow table anywhere in the pipeline.

use std::net::IpAddr;

/// Unique identifier for a network flow: the classic 5-tuple.
///
/// Ports are stored as logical (host-order) numbers. For hashing, the key is
/// serialized with [`FlowKey::canonical_bytes`], which has a fixed big-endian
/// layout so the hash is bit-stable across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

/// Maximum canonical encoding length: two IPv6 addresses + two ports + protocol.
pub const FLOW_KEY_MAX_BYTES: usize = 16 + 16 + 2 + 2 + 1;

impl FlowKey {
    pub fn new(
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        protocol: Protocol,
    ) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// Serializes the key into `buf` with a fixed layout and returns the length.
    ///
    /// Layout: source address (4 or 16 raw bytes), destination address, source
    /// port (u16 BE), destination port (u16 BE), protocol number (1 byte). An
    /// IPv4 and an IPv6 address can never alias because the total length differs.
    pub fn canonical_bytes(&self, buf: &mut [u8; FLOW_KEY_MAX_BYTES]) -> usize {
        let mut at = 0;
        for ip in [&self.src_ip, &self.dst_ip] {
            match ip {
                IpAddr::V4(v4) => {
                    buf[at..at + 4].copy_from_slice(&v4.octets());
                    at += 4;
                }
                IpAddr::V6(v6) => {
                    buf[at..at + 16].copy_from_slice(&v6.octets());
                    at += 16;
                }
            }
        }
        buf[at..at + 2].copy_from_slice(&self.src_port.to_be_bytes());
        at += 2;
        buf[at..at + 2].copy_from_slice(&self.dst_port.to_be_bytes());
        at += 2;
        buf[at] = self.protocol.number();
        at + 1
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

/// Transport layer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl Protocol {
    /// IANA protocol number, as carried in the IP header.
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Other(n) => *n,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Other(n) => write!(f, "PROTO:{}", n),
        }
    }
}

/// TCP flag bits relevant to flood classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
}

impl TcpFlags {
    pub const SYN: Self = Self {
        syn: true,
        ack: false,
    };
    pub const ACK: Self = Self {
        syn: false,
        ack: true,
    };
    pub const NONE: Self = Self {
        syn: false,
        ack: false,
    };
}

/// Minimal metadata for one received packet.
///
/// Produced once by the ingestion layer, consumed exactly once by a worker,
/// never retained.
#[derive(Debug, Clone)]
pub struct PacketDescriptor {
    pub flow: FlowKey,
    /// On-wire packet length in bytes.
    pub length: u32,
    pub flags: TcpFlags,
    pub fragmented: bool,
}

impl PacketDescriptor {
    pub fn new(flow: FlowKey, length: u32) -> Self {
        Self {
            flow,
            length,
            flags: TcpFlags::NONE,
            fragmented: false,
        }
    }

    pub fn with_flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn fragmented(mut self, fragmented: bool) -> Self {
        self.fragmented = fragmented;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(src: &str, dst: &str, sport: u16, dport: u16, proto: Protocol) -> FlowKey {
        FlowKey::new(src.parse().unwrap(), dst.parse().unwrap(), sport, dport, proto)
    }

    #[test]
    fn test_flow_key_equality() {
        let a = key("192.168.1.1", "10.0.0.1", 1234, 443, Protocol::Tcp);
        let b = key("192.168.1.1", "10.0.0.1", 1234, 443, Protocol::Tcp);
        let c = key("192.168.1.2", "10.0.0.1", 1234, 443, Protocol::Tcp);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_canonical_bytes_ipv4_layout() {
        let k = key("192.168.1.1", "10.0.0.1", 0x1234, 53, Protocol::Udp);
        let mut buf = [0u8; FLOW_KEY_MAX_BYTES];
        let len = k.canonical_bytes(&mut buf);

        assert_eq!(len, 13);
        assert_eq!(&buf[0..4], &[192, 168, 1, 1]);
        assert_eq!(&buf[4..8], &[10, 0, 0, 1]);
        // Ports are big-endian in the canonical encoding.
        assert_eq!(&buf[8..10], &[0x12, 0x34]);
        assert_eq!(&buf[10..12], &[0x00, 0x35]);
        assert_eq!(buf[12], 17);
    }

    #[test]
    fn test_canonical_bytes_ipv6_length() {
        let k = key("2001:db8::1", "2001:db8::2", 1, 2, Protocol::Tcp);
        let mut buf = [0u8; FLOW_KEY_MAX_BYTES];
        assert_eq!(k.canonical_bytes(&mut buf), FLOW_KEY_MAX_BYTES);
    }

    #[test]
    fn test_canonical_bytes_distinguishes_ports() {
        let a = key("1.1.1.1", "2.2.2.2", 53, 80, Protocol::Udp);
        let b = key("1.1.1.1", "2.2.2.2", 80, 53, Protocol::Udp);

        let mut buf_a = [0u8; FLOW_KEY_MAX_BYTES];
        let mut buf_b = [0u8; FLOW_KEY_MAX_BYTES];
        let la = a.canonical_bytes(&mut buf_a);
        let lb = b.canonical_bytes(&mut buf_b);

        assert_eq!(la, lb);
        assert_ne!(buf_a[..la], buf_b[..lb]);
    }

    #[test]
    fn test_protocol_numbers() {
        assert_eq!(Protocol::Icmp.number(), 1);
        assert_eq!(Protocol::Tcp.number(), 6);
        assert_eq!(Protocol::Udp.number(), 17);
        assert_eq!(Protocol::Other(47).number(), 47);
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(format!("{}", Protocol::Tcp), "TCP");
        assert_eq!(format!("{}", Protocol::Udp), "UDP");
        assert_eq!(format!("{}", Protocol::Other(47)), "PROTO:47");
    }
}
