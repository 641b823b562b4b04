use std::fmt;

/// A 48-bit Ethernet hardware address.
pub type EthernetAddress = [u8; 6];

/// Destination of a broadcast frame.
pub const ETHERNET_BROADCAST: EthernetAddress = [0xff; 6];

/// Placeholder for an address not yet known (ARP request target).
pub const ETHERNET_UNKNOWN: EthernetAddress = [0x00; 6];

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// Ethernet II header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: EthernetAddress,
    pub src: EthernetAddress,
    pub ethertype: u16,
}

/// An Ethernet frame as exchanged with the embedder: parsed header plus
/// raw payload bytes.
#[derive(Clone, Debug)]
pub struct EthernetFrame {
    pub header: EthernetHeader,
    pub payload: Vec<u8>,
}

pub fn format_mac(addr: &EthernetAddress) -> String {
    addr.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

impl fmt::Display for EthernetHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} type 0x{:04x}",
            format_mac(&self.src),
            format_mac(&self.dst),
            self.ethertype
        )
    }
}
