pub mod arp;
pub mod frame;
pub mod interface;

pub use frame::{EthernetAddress, EthernetFrame, EthernetHeader, ETHERNET_BROADCAST};
pub use interface::NetworkInterface;
