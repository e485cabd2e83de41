//! Frame classification.
//!
//! Turns a raw [`Frame`] into [`FlowMeta`]: capture timestamp, frame length, network-layer
//! endpoints and transport protocol. Frames lacking either a network layer or a transport layer
//! (ARP, link-only control frames, ICMP, non-first IP fragments, truncated headers) classify to
//! `None` and are meant to be dropped without further side effects.

use std::{fmt, net::IpAddr, time::SystemTime};

use pnet::packet::{
    ethernet::{EtherType, EtherTypes, EthernetPacket},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    vlan::VlanPacket,
    Packet,
};

use crate::{Frame, LinkType};

/// Fixed IPv6 header length.
const IPV6_HEADER_LEN: usize = 40;
/// Fixed length of the IPv6 fragment extension header.
const IPV6_FRAGMENT_LEN: usize = 8;
/// Upper bound on chained IPv6 extension headers before giving up on a frame.
const MAX_EXTENSION_HEADERS: usize = 8;

/// The transport-layer protocols a frame can be classified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Sctp,
    UdpLite,
}

impl TransportProtocol {
    /// The protocol name as stored in measurement records.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Sctp => "SCTP",
            Self::UdpLite => "UDPLite",
        }
    }

    /// The minimum number of header bytes that must be present for the transport layer to be
    /// considered decodable.
    pub const fn min_header_len(&self) -> usize {
        match self {
            Self::Tcp => 20,
            Self::Sctp => 12,
            Self::Udp | Self::UdpLite => 8,
        }
    }

    fn from_next_header(next: IpNextHeaderProtocol) -> Option<Self> {
        match next {
            IpNextHeaderProtocols::Tcp => Some(Self::Tcp),
            IpNextHeaderProtocols::Udp => Some(Self::Udp),
            IpNextHeaderProtocols::Sctp => Some(Self::Sctp),
            IpNextHeaderProtocols::UdpLite => Some(Self::UdpLite),
            _ => None,
        }
    }
}

impl From<TransportProtocol> for IpNextHeaderProtocol {
    fn from(protocol: TransportProtocol) -> Self {
        match protocol {
            TransportProtocol::Tcp => IpNextHeaderProtocols::Tcp,
            TransportProtocol::Udp => IpNextHeaderProtocols::Udp,
            TransportProtocol::Sctp => IpNextHeaderProtocols::Sctp,
            TransportProtocol::UdpLite => IpNextHeaderProtocols::UdpLite,
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow metadata extracted from a classified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowMeta {
    /// Capture timestamp of the frame.
    pub timestamp: SystemTime,
    /// Network-layer source address.
    pub source: IpAddr,
    /// Network-layer destination address.
    pub destination: IpAddr,
    /// Transport-layer protocol.
    pub protocol: TransportProtocol,
    /// Original frame length in bytes.
    pub size: usize,
}

/// Classifies a raw frame. Returns `None` if the frame has no network layer or no transport
/// layer.
pub fn classify(frame: &Frame) -> Option<FlowMeta> {
    let (source, destination, protocol) = match frame.link_type() {
        LinkType::Ethernet => classify_ethernet(frame.data())?,
        LinkType::RawIp => classify_raw_ip(frame.data())?,
    };

    Some(FlowMeta { timestamp: frame.timestamp(), source, destination, protocol, size: frame.len() })
}

type Endpoints = (IpAddr, IpAddr, TransportProtocol);

fn classify_ethernet(data: &[u8]) -> Option<Endpoints> {
    let eth = EthernetPacket::new(data)?;

    match eth.get_ethertype() {
        EtherTypes::Vlan => {
            let vlan = VlanPacket::new(eth.payload())?;
            classify_network(vlan.get_ethertype(), vlan.payload())
        }
        ethertype => classify_network(ethertype, eth.payload()),
    }
}

fn classify_raw_ip(data: &[u8]) -> Option<Endpoints> {
    match data.first()? >> 4 {
        4 => classify_ipv4(data),
        6 => classify_ipv6(data),
        _ => None,
    }
}

fn classify_network(ethertype: EtherType, payload: &[u8]) -> Option<Endpoints> {
    match ethertype {
        EtherTypes::Ipv4 => classify_ipv4(payload),
        EtherTypes::Ipv6 => classify_ipv6(payload),
        _ => None,
    }
}

fn classify_ipv4(data: &[u8]) -> Option<Endpoints> {
    let ip = Ipv4Packet::new(data)?;
    if ip.get_version() != 4 {
        return None;
    }

    // Later fragments carry no transport header.
    if ip.get_fragment_offset() != 0 {
        return None;
    }

    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < Ipv4Packet::minimum_packet_size() {
        return None;
    }

    // A zero total length is what segmentation offload produces; trust the captured bytes.
    let body = if ip.get_total_length() == 0 { data.get(header_len..)? } else { ip.payload() };
    let protocol = transport(ip.get_next_level_protocol(), body)?;

    Some((IpAddr::V4(ip.get_source()), IpAddr::V4(ip.get_destination()), protocol))
}

fn classify_ipv6(data: &[u8]) -> Option<Endpoints> {
    let ip = Ipv6Packet::new(data)?;
    if ip.get_version() != 6 {
        return None;
    }

    // Jumbograms advertise a zero payload length.
    let body =
        if ip.get_payload_length() == 0 { data.get(IPV6_HEADER_LEN..)? } else { ip.payload() };
    let (next, body) = skip_extension_headers(ip.get_next_header(), body)?;
    let protocol = transport(next, body)?;

    Some((IpAddr::V6(ip.get_source()), IpAddr::V6(ip.get_destination()), protocol))
}

/// Walks the IPv6 extension header chain, returning the first upper-layer protocol and its
/// payload. Non-first fragments yield `None`.
fn skip_extension_headers(
    mut next: IpNextHeaderProtocol,
    mut body: &[u8],
) -> Option<(IpNextHeaderProtocol, &[u8])> {
    for _ in 0..MAX_EXTENSION_HEADERS {
        match next {
            IpNextHeaderProtocols::Hopopt |
            IpNextHeaderProtocols::Ipv6Route |
            IpNextHeaderProtocols::Ipv6Opts => {
                // Length is in 8-octet units, not counting the first 8 octets.
                let len = (usize::from(*body.get(1)?) + 1) * 8;
                next = IpNextHeaderProtocol::new(*body.first()?);
                body = body.get(len..)?;
            }
            IpNextHeaderProtocols::Ipv6Frag => {
                let header = body.get(..IPV6_FRAGMENT_LEN)?;
                let offset = u16::from_be_bytes([header[2], header[3]]) >> 3;
                if offset != 0 {
                    return None;
                }

                next = IpNextHeaderProtocol::new(header[0]);
                body = &body[IPV6_FRAGMENT_LEN..];
            }
            _ => return Some((next, body)),
        }
    }

    None
}

fn transport(next: IpNextHeaderProtocol, body: &[u8]) -> Option<TransportProtocol> {
    let protocol = TransportProtocol::from_next_header(next)?;

    let decodable = match protocol {
        TransportProtocol::Tcp => TcpPacket::new(body).is_some(),
        TransportProtocol::Udp => UdpPacket::new(body).is_some(),
        TransportProtocol::Sctp | TransportProtocol::UdpLite => {
            body.len() >= protocol.min_header_len()
        }
    };

    decodable.then_some(protocol)
}
