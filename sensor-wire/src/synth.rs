//! Builders for synthetic frames, used by replays, benchmarks and tests.

use std::{
    net::{Ipv4Addr, Ipv6Addr},
    time::SystemTime,
};

use bytes::Bytes;
use pnet::packet::{
    arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket},
    ethernet::{EtherType, EtherTypes, MutableEthernetPacket},
    ipv4::MutableIpv4Packet,
    ipv6::MutableIpv6Packet,
    tcp::MutableTcpPacket,
};

use crate::{Frame, LinkType, TransportProtocol};

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const ARP_LEN: usize = 28;

/// Builds an Ethernet + IPv4 frame of `size` bytes (grown to fit the headers if needed).
pub fn ipv4_frame(
    timestamp: SystemTime,
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: TransportProtocol,
    size: usize,
) -> Frame {
    let min = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + protocol.min_header_len();
    let len = size.clamp(min, ETHERNET_HEADER_LEN + usize::from(u16::MAX));
    let mut buf = ethernet(EtherTypes::Ipv4, len);

    if let Some(mut ip) = MutableIpv4Packet::new(&mut buf[ETHERNET_HEADER_LEN..]) {
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((len - ETHERNET_HEADER_LEN) as u16);
        ip.set_ttl(64);
        ip.set_next_level_protocol(protocol.into());
        ip.set_source(source);
        ip.set_destination(destination);
    }

    set_transport(&mut buf[ETHERNET_HEADER_LEN + IPV4_HEADER_LEN..], protocol);

    Frame::new(timestamp, LinkType::Ethernet, Bytes::from(buf))
}

/// Builds an Ethernet + IPv6 frame of `size` bytes (grown to fit the headers if needed).
pub fn ipv6_frame(
    timestamp: SystemTime,
    source: Ipv6Addr,
    destination: Ipv6Addr,
    protocol: TransportProtocol,
    size: usize,
) -> Frame {
    let min = ETHERNET_HEADER_LEN + IPV6_HEADER_LEN + protocol.min_header_len();
    let max = ETHERNET_HEADER_LEN + IPV6_HEADER_LEN + usize::from(u16::MAX);
    let len = size.clamp(min, max);
    let mut buf = ethernet(EtherTypes::Ipv6, len);

    if let Some(mut ip) = MutableIpv6Packet::new(&mut buf[ETHERNET_HEADER_LEN..]) {
        ip.set_version(6);
        ip.set_payload_length((len - ETHERNET_HEADER_LEN - IPV6_HEADER_LEN) as u16);
        ip.set_next_header(protocol.into());
        ip.set_hop_limit(64);
        ip.set_source(source);
        ip.set_destination(destination);
    }

    set_transport(&mut buf[ETHERNET_HEADER_LEN + IPV6_HEADER_LEN..], protocol);

    Frame::new(timestamp, LinkType::Ethernet, Bytes::from(buf))
}

/// Builds an ARP request frame. It carries no network or transport layer.
pub fn arp_frame(timestamp: SystemTime) -> Frame {
    let mut buf = ethernet(EtherTypes::Arp, ETHERNET_HEADER_LEN + ARP_LEN);

    if let Some(mut arp) = MutableArpPacket::new(&mut buf[ETHERNET_HEADER_LEN..]) {
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Request);
        arp.set_sender_proto_addr(Ipv4Addr::new(192, 168, 0, 1));
        arp.set_target_proto_addr(Ipv4Addr::new(192, 168, 0, 2));
    }

    Frame::new(timestamp, LinkType::Ethernet, Bytes::from(buf))
}

fn ethernet(ethertype: EtherType, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];

    if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
        eth.set_ethertype(ethertype);
    }

    buf
}

fn set_transport(buf: &mut [u8], protocol: TransportProtocol) {
    if protocol == TransportProtocol::Tcp {
        if let Some(mut tcp) = MutableTcpPacket::new(buf) {
            tcp.set_data_offset(5);
        }
    }
}
