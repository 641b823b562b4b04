use std::net::Ipv4Addr;

use thiserror::Error;

use super::frame::EthernetAddress;

pub const OPCODE_REQUEST: u16 = 1;
pub const OPCODE_REPLY: u16 = 2;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const MESSAGE_LEN: usize = 28;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArpParseError {
    #[error("arp message truncated: {0} bytes")]
    Truncated(usize),
    #[error("unsupported hardware/protocol pair {htype:#06x}/{ptype:#06x}")]
    UnsupportedPair { htype: u16, ptype: u16 },
}

/// An ARP message for IPv4 over Ethernet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: u16,
    pub sender_ethernet_address: EthernetAddress,
    pub sender_ip_address: Ipv4Addr,
    pub target_ethernet_address: EthernetAddress,
    pub target_ip_address: Ipv4Addr,
}

impl ArpMessage {
    pub fn parse(data: &[u8]) -> Result<Self, ArpParseError> {
        if data.len() < MESSAGE_LEN {
            return Err(ArpParseError::Truncated(data.len()));
        }
        let htype = u16::from_be_bytes([data[0], data[1]]);
        let ptype = u16::from_be_bytes([data[2], data[3]]);
        if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 || data[4] != 6 || data[5] != 4 {
            return Err(ArpParseError::UnsupportedPair { htype, ptype });
        }
        Ok(Self {
            opcode: u16::from_be_bytes([data[6], data[7]]),
            sender_ethernet_address: data[8..14].try_into().unwrap(),
            sender_ip_address: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            target_ethernet_address: data[18..24].try_into().unwrap(),
            target_ip_address: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MESSAGE_LEN);
        out.extend_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        out.extend_from_slice(&PTYPE_IPV4.to_be_bytes());
        out.push(6);
        out.push(4);
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&self.sender_ethernet_address);
        out.extend_from_slice(&self.sender_ip_address.octets());
        out.extend_from_slice(&self.target_ethernet_address);
        out.extend_from_slice(&self.target_ip_address.octets());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let msg = ArpMessage {
            opcode: OPCODE_REQUEST,
            sender_ethernet_address: [1, 2, 3, 4, 5, 6],
            sender_ip_address: Ipv4Addr::new(10, 0, 0, 1),
            target_ethernet_address: [0; 6],
            target_ip_address: Ipv4Addr::new(10, 0, 0, 2),
        };
        let bytes = msg.to_vec();
        assert_eq!(bytes.len(), 28);
        assert_eq!(ArpMessage::parse(&bytes), Ok(msg));
    }

    #[test]
    fn rejects_short_and_foreign_messages() {
        assert_eq!(
            ArpMessage::parse(&[0u8; 10]),
            Err(ArpParseError::Truncated(10))
        );
        let mut bytes = ArpMessage {
            opcode: OPCODE_REPLY,
            sender_ethernet_address: [0; 6],
            sender_ip_address: Ipv4Addr::UNSPECIFIED,
            target_ethernet_address: [0; 6],
            target_ip_address: Ipv4Addr::UNSPECIFIED,
        }
        .to_vec();
        bytes[1] = 6; // some other hardware type
        assert!(matches!(
            ArpMessage::parse(&bytes),
            Err(ArpParseError::UnsupportedPair { .. })
        ));
    }
}
