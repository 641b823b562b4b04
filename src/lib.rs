//! A user-space TCP/IP stack.
//!
//! The heart of the crate is [`tcp::TcpConnection`], a reliable, in-order,
//! bidirectional byte stream over an unreliable datagram service. Below it
//! sit an IPv4 [`ip::Router`] with longest-prefix matching and a
//! [`link::NetworkInterface`] that speaks IPv4-over-Ethernet with ARP
//! resolution.
//!
//! Everything is single-threaded and cooperative: the embedder feeds in
//! segments, frames and the passage of time, and drains the outbound
//! queues. The stack itself performs no I/O and spawns no tasks.

pub mod ip;
pub mod link;
pub mod stream;
pub mod tcp;

pub use stream::{ByteStream, StreamReassembler};
pub use tcp::{TcpConfig, TcpConnection, TcpSegment};
