use crate::stream::{ByteStream, StreamReassembler};

use super::segment::TcpSegment;
use super::sequence::{unwrap, wrap, WrappingInt32};

/// The receiving half of a TCP endpoint.
///
/// Latches the peer's ISN from the first SYN, unwraps segment sequence
/// numbers against the reassembly point, and feeds payloads to a
/// [`StreamReassembler`]. Exposes the ackno and window the sending half
/// advertises back to the peer.
#[derive(Debug)]
pub struct TcpReceiver {
    reassembler: StreamReassembler,
    isn: Option<WrappingInt32>,
    capacity: usize,
}

impl TcpReceiver {
    pub fn new(capacity: usize) -> Self {
        Self {
            reassembler: StreamReassembler::new(capacity),
            isn: None,
            capacity,
        }
    }

    pub fn segment_received(&mut self, seg: &TcpSegment) {
        if seg.header.syn && self.isn.is_none() {
            self.isn = Some(seg.seqno());
        }
        let Some(isn) = self.isn else {
            // nothing before the SYN means anything
            return;
        };

        let checkpoint = self.reassembler.next_index();
        let abs_seqno = unwrap(seg.seqno(), isn, checkpoint);
        // the SYN occupies sequence number zero; payload bytes start one
        // later, so a non-SYN segment claiming the SYN's slot is bogus
        let stream_index = if seg.header.syn {
            abs_seqno
        } else if abs_seqno == 0 {
            return;
        } else {
            abs_seqno - 1
        };

        self.reassembler
            .push_substring(&seg.payload, stream_index, seg.header.fin);
    }

    /// The next sequence number the peer should send, or `None` before the
    /// handshake. The SYN consumes one sequence number ahead of the byte
    /// stream and the FIN one after it.
    pub fn ackno(&self) -> Option<WrappingInt32> {
        let isn = self.isn?;
        let mut abs = self.reassembler.next_index() + 1;
        if self.reassembler.stream_out().input_ended() {
            abs += 1;
        }
        Some(wrap(abs, isn))
    }

    /// Distance between the first unassembled byte and the first byte the
    /// window can no longer hold.
    pub fn window_size(&self) -> usize {
        self.capacity - self.reassembler.stream_out().buffer_size()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.reassembler.unassembled_bytes()
    }

    pub fn stream_out(&self) -> &ByteStream {
        self.reassembler.stream_out()
    }

    pub fn stream_out_mut(&mut self) -> &mut ByteStream {
        self.reassembler.stream_out_mut()
    }
}
