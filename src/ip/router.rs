use std::collections::VecDeque;
use std::net::Ipv4Addr;

use crate::link::frame::EthernetFrame;
use crate::link::interface::NetworkInterface;

use super::datagram::InternetDatagram;

/// A [`NetworkInterface`] plus the queue of datagrams it has received and
/// not yet offered to the router.
#[derive(Debug)]
pub struct QueuedInterface {
    interface: NetworkInterface,
    datagrams_out: VecDeque<InternetDatagram>,
}

impl QueuedInterface {
    pub fn new(interface: NetworkInterface) -> Self {
        Self {
            interface,
            datagrams_out: VecDeque::new(),
        }
    }

    pub fn recv_frame(&mut self, frame: &EthernetFrame) {
        if let Some(dgram) = self.interface.recv_frame(frame) {
            self.datagrams_out.push_back(dgram);
        }
    }

    pub fn interface(&self) -> &NetworkInterface {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut NetworkInterface {
        &mut self.interface
    }
}

#[derive(Debug)]
struct RouteEntry {
    prefix: u32,
    prefix_len: u8,
    next_hop: Option<Ipv4Addr>,
    interface_num: usize,
}

impl RouteEntry {
    fn matches(&self, dst: u32) -> bool {
        self.prefix_len == 0 || (dst ^ self.prefix) >> (32 - self.prefix_len) == 0
    }
}

/// An IP router: a longest-prefix-match table over a set of interfaces.
#[derive(Debug, Default)]
pub struct Router {
    interfaces: Vec<QueuedInterface>,
    table: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interface, returning its index for use in routes.
    pub fn add_interface(&mut self, interface: NetworkInterface) -> usize {
        self.interfaces.push(QueuedInterface::new(interface));
        self.interfaces.len() - 1
    }

    pub fn interface(&self, num: usize) -> &QueuedInterface {
        &self.interfaces[num]
    }

    pub fn interface_mut(&mut self, num: usize) -> &mut QueuedInterface {
        &mut self.interfaces[num]
    }

    /// Add a route for destinations matching the top `prefix_len` bits of
    /// `prefix`. `next_hop` is empty for directly attached networks, where
    /// the datagram's own destination is the next hop.
    pub fn add_route(
        &mut self,
        prefix: Ipv4Addr,
        prefix_len: u8,
        next_hop: Option<Ipv4Addr>,
        interface_num: usize,
    ) {
        log::debug!(
            "route {prefix}/{prefix_len} => {} on interface {interface_num}",
            next_hop.map_or_else(|| "(direct)".into(), |hop| hop.to_string()),
        );
        self.table.push(RouteEntry {
            prefix: prefix.into(),
            prefix_len,
            next_hop,
            interface_num,
        });
    }

    /// Forward one datagram: drop on TTL exhaustion, pick the matching
    /// route with the longest prefix (earliest added wins ties), and hand
    /// the datagram to that interface.
    pub fn route_one_datagram(&mut self, mut dgram: InternetDatagram) {
        if dgram.header.time_to_live == 0 {
            return;
        }
        dgram.header.time_to_live -= 1;
        if dgram.header.time_to_live == 0 {
            return;
        }

        let dst = dgram.destination();
        let dst_bits = u32::from(dst);
        let mut best: Option<&RouteEntry> = None;
        for entry in &self.table {
            if entry.matches(dst_bits) && best.map_or(true, |b| entry.prefix_len > b.prefix_len) {
                best = Some(entry);
            }
        }
        let Some(entry) = best else {
            log::debug!("no route to {dst}, dropping");
            return;
        };

        let next_hop = entry.next_hop.unwrap_or(dst);
        self.interfaces[entry.interface_num]
            .interface_mut()
            .send_datagram(dgram, next_hop);
    }

    /// Drain every interface's inbound queue through the routing table.
    pub fn route(&mut self) {
        for num in 0..self.interfaces.len() {
            while let Some(dgram) = self.interfaces[num].datagrams_out.pop_front() {
                self.route_one_datagram(dgram);
            }
        }
    }
}
