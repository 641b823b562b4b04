use super::sequence::WrappingInt32;

/// Largest payload carried in a single segment.
pub const MAX_PAYLOAD_SIZE: usize = 1452;

/// Retransmissions of the same segment tolerated before the connection
/// aborts with a RST.
pub const MAX_RETX_ATTEMPTS: u32 = 8;

/// Tuning knobs for a [`TcpConnection`](super::connection::TcpConnection).
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Outbound byte stream capacity.
    pub send_capacity: usize,
    /// Inbound reassembly window and byte stream capacity.
    pub recv_capacity: usize,
    /// Initial retransmission timeout in milliseconds.
    pub rt_timeout: u64,
    /// Deterministic initial sequence number; random when unset.
    pub fixed_isn: Option<WrappingInt32>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            send_capacity: 64 * 1024,
            recv_capacity: 64 * 1024,
            rt_timeout: 1000,
            fixed_isn: None,
        }
    }
}
