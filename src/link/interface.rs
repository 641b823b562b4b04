use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use crate::ip::datagram::InternetDatagram;

use super::arp::{ArpMessage, OPCODE_REPLY, OPCODE_REQUEST};
use super::frame::{
    format_mac, EthernetAddress, EthernetFrame, EthernetHeader, ETHERNET_BROADCAST,
    ETHERNET_UNKNOWN, ETHERTYPE_ARP, ETHERTYPE_IPV4,
};

/// How long a learned IP-to-Ethernet mapping stays valid.
const MAPPING_TTL_MS: u64 = 30_000;
/// How long before re-asking for the same address.
const ARP_SUPPRESS_MS: u64 = 5_000;
/// How long a datagram waits for resolution before being resent.
const PENDING_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
struct Mapping {
    address: EthernetAddress,
    expires_at: u64,
}

#[derive(Debug)]
struct PendingDatagram {
    expires_at: u64,
    next_hop: Ipv4Addr,
    dgram: InternetDatagram,
}

/// A link-layer interface speaking IPv4 over Ethernet.
///
/// Translates next-hop IP addresses to Ethernet addresses with ARP,
/// holding datagrams while a resolution is outstanding. The embedder
/// drains `frames_out` and feeds received frames to [`recv_frame`].
///
/// [`recv_frame`]: NetworkInterface::recv_frame
#[derive(Debug)]
pub struct NetworkInterface {
    ethernet_address: EthernetAddress,
    ip_address: Ipv4Addr,
    frames_out: VecDeque<EthernetFrame>,
    mappings: HashMap<Ipv4Addr, Mapping>,
    pending: VecDeque<PendingDatagram>,
    /// Addresses asked for recently; no second request until the entry
    /// expires.
    requested: HashMap<Ipv4Addr, u64>,
    clock: u64,
}

impl NetworkInterface {
    pub fn new(ethernet_address: EthernetAddress, ip_address: Ipv4Addr) -> Self {
        log::debug!(
            "interface up: {} / {ip_address}",
            format_mac(&ethernet_address)
        );
        Self {
            ethernet_address,
            ip_address,
            frames_out: VecDeque::new(),
            mappings: HashMap::new(),
            pending: VecDeque::new(),
            requested: HashMap::new(),
            clock: 0,
        }
    }

    /// Send `dgram` toward `next_hop`, resolving the Ethernet address
    /// first if it is not already known.
    pub fn send_datagram(&mut self, dgram: InternetDatagram, next_hop: Ipv4Addr) {
        if let Some(mapping) = self.mappings.get(&next_hop) {
            self.frames_out.push_back(EthernetFrame {
                header: EthernetHeader {
                    dst: mapping.address,
                    src: self.ethernet_address,
                    ethertype: ETHERTYPE_IPV4,
                },
                payload: dgram.to_vec(),
            });
            return;
        }

        let suppressed = self
            .requested
            .get(&next_hop)
            .is_some_and(|expires| self.clock < *expires);
        if !suppressed {
            self.broadcast_request(next_hop);
            self.requested.insert(next_hop, self.clock + ARP_SUPPRESS_MS);
        }
        self.pending.push_back(PendingDatagram {
            expires_at: self.clock + PENDING_TIMEOUT_MS,
            next_hop,
            dgram,
        });
    }

    /// Accept a frame from the wire. IPv4 payloads destined for us parse
    /// into a datagram; ARP payloads update the mapping table and may
    /// produce a reply and release pending datagrams.
    pub fn recv_frame(&mut self, frame: &EthernetFrame) -> Option<InternetDatagram> {
        let header = &frame.header;
        if header.dst != self.ethernet_address && header.dst != ETHERNET_BROADCAST {
            return None;
        }

        match header.ethertype {
            ETHERTYPE_IPV4 => match InternetDatagram::parse(&frame.payload) {
                Ok(dgram) => Some(dgram),
                Err(err) => {
                    log::debug!("dropping undecodable ipv4 payload: {err}");
                    None
                }
            },
            ETHERTYPE_ARP => {
                match ArpMessage::parse(&frame.payload) {
                    Ok(msg) => self.handle_arp(&msg),
                    Err(err) => log::debug!("dropping undecodable arp payload: {err}"),
                }
                None
            }
            _ => None,
        }
    }

    fn handle_arp(&mut self, msg: &ArpMessage) {
        log::debug!(
            "learned {} at {}",
            msg.sender_ip_address,
            format_mac(&msg.sender_ethernet_address)
        );
        self.mappings.insert(
            msg.sender_ip_address,
            Mapping {
                address: msg.sender_ethernet_address,
                expires_at: self.clock + MAPPING_TTL_MS,
            },
        );
        self.requested.remove(&msg.sender_ip_address);

        if msg.opcode == OPCODE_REQUEST && msg.target_ip_address == self.ip_address {
            let reply = ArpMessage {
                opcode: OPCODE_REPLY,
                sender_ethernet_address: self.ethernet_address,
                sender_ip_address: self.ip_address,
                target_ethernet_address: msg.sender_ethernet_address,
                target_ip_address: msg.sender_ip_address,
            };
            self.frames_out.push_back(EthernetFrame {
                header: EthernetHeader {
                    dst: msg.sender_ethernet_address,
                    src: self.ethernet_address,
                    ethertype: ETHERTYPE_ARP,
                },
                payload: reply.to_vec(),
            });
        }

        // anything waiting on an address we now know can go out
        let mut still_pending = VecDeque::new();
        while let Some(entry) = self.pending.pop_front() {
            if self.mappings.contains_key(&entry.next_hop) {
                self.send_datagram(entry.dgram, entry.next_hop);
            } else {
                still_pending.push_back(entry);
            }
        }
        self.pending = still_pending;
    }

    fn broadcast_request(&mut self, next_hop: Ipv4Addr) {
        let request = ArpMessage {
            opcode: OPCODE_REQUEST,
            sender_ethernet_address: self.ethernet_address,
            sender_ip_address: self.ip_address,
            target_ethernet_address: ETHERNET_UNKNOWN,
            target_ip_address: next_hop,
        };
        self.frames_out.push_back(EthernetFrame {
            header: EthernetHeader {
                dst: ETHERNET_BROADCAST,
                src: self.ethernet_address,
                ethertype: ETHERTYPE_ARP,
            },
            payload: request.to_vec(),
        });
    }

    /// Advance time: expire mappings and suppression entries, and resend
    /// datagrams that have waited too long for a resolution.
    pub fn tick(&mut self, ms: u64) {
        self.clock += ms;

        while let Some(front) = self.pending.front() {
            if front.expires_at > self.clock {
                break;
            }
            let entry = self.pending.pop_front().unwrap();
            self.send_datagram(entry.dgram, entry.next_hop);
        }

        self.mappings.retain(|_, m| m.expires_at > self.clock);
        self.requested.retain(|_, expires| *expires > self.clock);
    }

    pub fn frames_out_mut(&mut self) -> &mut VecDeque<EthernetFrame> {
        &mut self.frames_out
    }

    pub fn ethernet_address(&self) -> EthernetAddress {
        self.ethernet_address
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }
}
