use etherparse::TcpHeader;

use super::sequence::WrappingInt32;

/// A TCP segment: header plus payload, in memory.
///
/// The header is the wire type from `etherparse`; ports, checksum and the
/// unused flags stay zero until the embedder serializes the segment onto an
/// actual network path.
#[derive(Clone, Debug)]
pub struct TcpSegment {
    pub header: TcpHeader,
    pub payload: Vec<u8>,
}

impl TcpSegment {
    pub fn new(seqno: WrappingInt32) -> Self {
        Self {
            header: TcpHeader::new(0, 0, seqno.raw(), 0),
            payload: Vec::new(),
        }
    }

    pub fn seqno(&self) -> WrappingInt32 {
        WrappingInt32::new(self.header.sequence_number)
    }

    pub fn ackno(&self) -> WrappingInt32 {
        WrappingInt32::new(self.header.acknowledgment_number)
    }

    /// How many sequence numbers this segment occupies: payload bytes plus
    /// one each for SYN and FIN.
    pub fn length_in_sequence_space(&self) -> usize {
        self.payload.len() + self.header.syn as usize + self.header.fin as usize
    }
}
