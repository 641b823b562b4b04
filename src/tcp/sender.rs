use std::cmp;
use std::collections::VecDeque;

use crate::stream::ByteStream;

use super::config::MAX_PAYLOAD_SIZE;
use super::segment::TcpSegment;
use super::sequence::{unwrap, wrap, WrappingInt32};
use super::timer::RetransTimer;

/// The sending half of a TCP endpoint.
///
/// Reads from its outbound [`ByteStream`], slices the bytes into segments
/// sized to the peer's advertised window, keeps every unacknowledged
/// segment for retransmission, and backs the retransmission timeout off
/// exponentially while the network is losing the oldest one.
#[derive(Debug)]
pub struct TcpSender {
    isn: WrappingInt32,
    initial_rto: u64,
    timer: RetransTimer,
    stream: ByteStream,
    segments_out: VecDeque<TcpSegment>,
    /// Sent but not fully acknowledged, oldest first, with the absolute
    /// sequence number each was sent at.
    outstanding: VecDeque<(u64, TcpSegment)>,
    next_seqno: u64,
    /// Absolute sequence number just past the newest fully acked segment.
    send_base: u64,
    bytes_in_flight: usize,
    /// Last window the peer advertised; starts at one so the SYN can go out.
    last_window_size: u16,
    syn_sent: bool,
    fin_sent: bool,
    consecutive_retransmissions: u32,
}

impl TcpSender {
    pub fn new(capacity: usize, retx_timeout: u64, fixed_isn: Option<WrappingInt32>) -> Self {
        Self {
            isn: fixed_isn.unwrap_or_else(|| WrappingInt32::new(rand::random())),
            initial_rto: retx_timeout,
            timer: RetransTimer::new(retx_timeout),
            stream: ByteStream::new(capacity),
            segments_out: VecDeque::new(),
            outstanding: VecDeque::new(),
            next_seqno: 0,
            send_base: 0,
            bytes_in_flight: 0,
            last_window_size: 1,
            syn_sent: false,
            fin_sent: false,
            consecutive_retransmissions: 0,
        }
    }

    /// Emit as many segments as the effective window permits. A zero
    /// advertisement is treated as a window of one so a probe keeps the
    /// conversation alive.
    pub fn fill_window(&mut self) {
        loop {
            let window = cmp::max(self.last_window_size as u64, 1);
            let remaining = (self.send_base + window).saturating_sub(self.next_seqno);
            if remaining == 0 {
                return;
            }

            let mut seg = TcpSegment::new(wrap(self.next_seqno, self.isn));
            if !self.syn_sent {
                seg.header.syn = true;
                self.syn_sent = true;
            }

            let payload_limit = cmp::min(
                (remaining - seg.header.syn as u64) as usize,
                cmp::min(self.stream.buffer_size(), MAX_PAYLOAD_SIZE),
            );
            seg.payload = self.stream.read(payload_limit);

            if self.stream.eof()
                && !self.fin_sent
                && (seg.length_in_sequence_space() as u64) < remaining
            {
                seg.header.fin = true;
                self.fin_sent = true;
            }

            let len = seg.length_in_sequence_space();
            if len == 0 {
                return;
            }
            self.send_segment(seg, len);
        }
    }

    fn send_segment(&mut self, seg: TcpSegment, len: usize) {
        self.segments_out.push_back(seg.clone());
        self.outstanding.push_back((self.next_seqno, seg));
        self.next_seqno += len as u64;
        self.bytes_in_flight += len;
        if !self.timer.is_running() {
            self.timer.restart();
        }
    }

    /// Process the peer's ackno and window advertisement.
    pub fn ack_received(&mut self, ackno: WrappingInt32, window_size: u16) {
        let abs_ackno = unwrap(ackno, self.isn, self.next_seqno);
        if abs_ackno > self.next_seqno {
            // acknowledges bytes never sent
            return;
        }
        self.last_window_size = window_size;

        if abs_ackno > self.send_base {
            while let Some((seqno, seg)) = self.outstanding.front() {
                let end = seqno + seg.length_in_sequence_space() as u64;
                if end > abs_ackno {
                    break;
                }
                self.bytes_in_flight -= seg.length_in_sequence_space();
                self.send_base = end;
                self.outstanding.pop_front();
            }

            self.timer.set_rto(self.initial_rto);
            self.consecutive_retransmissions = 0;
            if self.outstanding.is_empty() {
                self.timer.stop();
            } else {
                self.timer.restart();
            }
        }

        // a duplicate ack may still have widened the window
        self.fill_window();
    }

    /// Advance time; on expiry retransmit the oldest outstanding segment
    /// byte-identical and, unless the peer closed the window, double the
    /// timeout.
    pub fn tick(&mut self, ms: u64) {
        if !self.timer.tick(ms) {
            return;
        }
        let Some((seqno, seg)) = self.outstanding.front() else {
            return;
        };
        log::trace!("retransmitting segment at seqno {seqno}");
        self.segments_out.push_back(seg.clone());
        if self.last_window_size > 0 {
            self.consecutive_retransmissions += 1;
            self.timer.double_rto();
        }
        self.timer.restart();
    }

    /// Queue an empty segment carrying the current seqno. It is not
    /// tracked for retransmission; the connection uses this for bare ACKs.
    pub fn send_empty_segment(&mut self) {
        self.segments_out
            .push_back(TcpSegment::new(wrap(self.next_seqno, self.isn)));
    }

    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    pub fn consecutive_retransmissions(&self) -> u32 {
        self.consecutive_retransmissions
    }

    pub fn segments_out(&self) -> &VecDeque<TcpSegment> {
        &self.segments_out
    }

    pub fn segments_out_mut(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    pub fn stream_in(&self) -> &ByteStream {
        &self.stream
    }

    pub fn stream_in_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    pub fn next_seqno_absolute(&self) -> u64 {
        self.next_seqno
    }

    pub fn next_seqno(&self) -> WrappingInt32 {
        wrap(self.next_seqno, self.isn)
    }

    pub fn syn_sent(&self) -> bool {
        self.syn_sent
    }

    pub fn fin_sent(&self) -> bool {
        self.fin_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RTO: u64 = 1000;

    fn sender(capacity: usize) -> TcpSender {
        TcpSender::new(capacity, RTO, Some(WrappingInt32::new(0)))
    }

    fn ack(sender: &mut TcpSender, abs_ackno: u64, window: u16) {
        sender.ack_received(wrap(abs_ackno, WrappingInt32::new(0)), window);
    }

    #[test]
    fn first_fill_sends_syn() {
        let mut s = sender(64);
        s.fill_window();
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert!(seg.header.syn);
        assert_eq!(seg.seqno(), WrappingInt32::new(0));
        assert_eq!(s.next_seqno_absolute(), 1);
        assert_eq!(s.bytes_in_flight(), 1);
        // window still holds the unacked SYN: nothing more goes out
        s.fill_window();
        assert!(s.segments_out().is_empty());
    }

    #[test]
    fn data_flows_after_syn_ack() {
        let mut s = sender(64);
        s.fill_window();
        s.segments_out_mut().clear();
        ack(&mut s, 1, 64);
        s.stream_in_mut().write(b"hello");
        s.fill_window();
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert!(!seg.header.syn);
        assert_eq!(seg.payload, b"hello");
        assert_eq!(seg.seqno(), WrappingInt32::new(1));
        assert_eq!(s.bytes_in_flight(), 5);
        ack(&mut s, 6, 64);
        assert_eq!(s.bytes_in_flight(), 0);
        assert!(!s.timer.is_running());
    }

    #[test]
    fn payload_respects_window_and_mss() {
        let mut s = sender(64 * 1024);
        s.fill_window();
        s.segments_out_mut().clear();
        ack(&mut s, 1, 3);
        s.stream_in_mut().write(b"abcdefgh");
        s.fill_window();
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(seg.payload, b"abc");
        assert!(s.segments_out().is_empty());
        // opening the window releases the rest
        ack(&mut s, 4, 64);
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(seg.payload, b"defgh");
    }

    #[test]
    fn segments_split_at_max_payload() {
        let mut s = sender(64 * 1024);
        s.fill_window();
        ack(&mut s, 1, u16::MAX);
        s.segments_out_mut().clear();
        let data = vec![0x42u8; MAX_PAYLOAD_SIZE + 10];
        s.stream_in_mut().write(&data);
        s.fill_window();
        let first = s.segments_out_mut().pop_front().unwrap();
        let second = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(first.payload.len(), MAX_PAYLOAD_SIZE);
        assert_eq!(second.payload.len(), 10);
    }

    #[test]
    fn retransmission_backs_off_and_resets_on_ack() {
        let mut s = sender(64);
        s.fill_window();
        s.segments_out_mut().clear();
        ack(&mut s, 1, 64);
        s.stream_in_mut().write(b"hello");
        s.fill_window();
        let original = s.segments_out_mut().pop_front().unwrap();

        s.tick(RTO);
        let retx = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(retx.seqno(), original.seqno());
        assert_eq!(retx.payload, original.payload);
        assert_eq!(s.consecutive_retransmissions(), 1);

        // rto doubled: nothing at 1999, fires at 2000
        s.tick(RTO * 2 - 1);
        assert!(s.segments_out().is_empty());
        s.tick(1);
        assert_eq!(s.segments_out().len(), 1);
        assert_eq!(s.consecutive_retransmissions(), 2);
        s.segments_out_mut().clear();

        ack(&mut s, 6, 64);
        assert_eq!(s.consecutive_retransmissions(), 0);
        s.stream_in_mut().write(b"x");
        s.fill_window();
        s.segments_out_mut().clear();
        // back to the initial rto
        s.tick(RTO - 1);
        assert!(s.segments_out().is_empty());
        s.tick(1);
        assert_eq!(s.segments_out().len(), 1);
    }

    #[test]
    fn zero_window_probe_does_not_back_off() {
        let mut s = sender(64);
        s.fill_window();
        s.segments_out_mut().clear();
        ack(&mut s, 1, 0);
        s.stream_in_mut().write(b"probe");
        s.fill_window();
        // effective window of one: a single byte goes out
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(seg.payload, b"p");
        assert!(s.segments_out().is_empty());

        s.tick(RTO);
        assert_eq!(s.segments_out().len(), 1);
        assert_eq!(s.consecutive_retransmissions(), 0);
        // rto unchanged while the window is closed
        s.tick(RTO);
        assert_eq!(s.segments_out().len(), 2);
    }

    #[test]
    fn stale_ack_keeps_flight_but_takes_window() {
        let mut s = sender(64);
        s.fill_window();
        s.segments_out_mut().clear();
        ack(&mut s, 1, 1);
        s.stream_in_mut().write(b"abcd");
        s.fill_window();
        s.segments_out_mut().clear();
        assert_eq!(s.bytes_in_flight(), 1);
        // duplicate ackno, wider window: more data may flow
        ack(&mut s, 1, 64);
        assert_eq!(s.bytes_in_flight(), 4);
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(seg.payload, b"bcd");
    }

    #[test]
    fn future_ack_is_ignored() {
        let mut s = sender(64);
        s.fill_window();
        ack(&mut s, 10, 64);
        assert_eq!(s.bytes_in_flight(), 1);
        assert_eq!(s.last_window_size, 1);
    }

    #[test]
    fn fin_needs_window_room() {
        let mut s = sender(64);
        s.fill_window();
        s.segments_out_mut().clear();
        ack(&mut s, 1, 2);
        s.stream_in_mut().write(b"ab");
        s.stream_in_mut().end_input();
        s.fill_window();
        // payload fills the window; FIN must wait
        let seg = s.segments_out_mut().pop_front().unwrap();
        assert_eq!(seg.payload, b"ab");
        assert!(!seg.header.fin);
        ack(&mut s, 3, 2);
        let fin = s.segments_out_mut().pop_front().unwrap();
        assert!(fin.header.fin);
        assert!(fin.payload.is_empty());
        assert!(s.fin_sent());
    }

    #[test]
    fn empty_segment_is_untracked() {
        let mut s = sender(64);
        s.fill_window();
        let before = s.bytes_in_flight();
        s.send_empty_segment();
        assert_eq!(s.bytes_in_flight(), before);
        assert_eq!(s.next_seqno_absolute(), 1);
        assert_eq!(s.segments_out().len(), 2);
    }

    proptest! {
        // bytes_in_flight == next_seqno - send_base across arbitrary
        // write/fill/ack/tick interleavings.
        #[test]
        fn flight_size_identity(ops in proptest::collection::vec((0u8..4, 0u64..32), 1..48)) {
            let mut s = sender(256);
            s.fill_window();
            for (op, arg) in ops {
                match op {
                    0 => {
                        s.stream_in_mut().write(&vec![0x7Fu8; arg as usize]);
                        s.fill_window();
                    }
                    1 => {
                        let target = s.send_base + arg.min(s.next_seqno - s.send_base);
                        ack(&mut s, target, 32);
                    }
                    2 => s.tick(arg * 100),
                    _ => s.fill_window(),
                }
                prop_assert_eq!(s.bytes_in_flight() as u64, s.next_seqno - s.send_base);
            }
        }
    }
}
