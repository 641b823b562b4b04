use std::cmp;
use std::collections::VecDeque;

use crate::stream::ByteStream;

use super::config::{TcpConfig, MAX_RETX_ATTEMPTS};
use super::receiver::TcpReceiver;
use super::segment::TcpSegment;
use super::sender::TcpSender;
use super::state::State;

/// A full TCP endpoint: one [`TcpSender`], one [`TcpReceiver`], and the
/// connection-level state machine that binds them.
///
/// The two halves never talk to each other directly. Acknowledgment and
/// window information from the receiver is stamped onto each outbound
/// segment as it leaves the sender's queue, and inbound segments are split
/// between the halves as they arrive.
#[derive(Debug)]
pub struct TcpConnection {
    cfg: TcpConfig,
    sender: TcpSender,
    receiver: TcpReceiver,
    segments_out: VecDeque<TcpSegment>,
    time_since_last_seg: u64,
    /// Whether to wait around after both streams finish, in case our final
    /// ack got lost. Cleared when the peer closes first.
    linger_after_streams_finish: bool,
    active: bool,
    rst_pending: bool,
}

impl TcpConnection {
    pub fn new(cfg: TcpConfig) -> Self {
        let sender = TcpSender::new(cfg.send_capacity, cfg.rt_timeout, cfg.fixed_isn);
        let receiver = TcpReceiver::new(cfg.recv_capacity);
        Self {
            cfg,
            sender,
            receiver,
            segments_out: VecDeque::new(),
            time_since_last_seg: 0,
            linger_after_streams_finish: true,
            active: true,
            rst_pending: false,
        }
    }

    /// Initiate the handshake by sending a SYN.
    pub fn connect(&mut self) {
        self.sender.fill_window();
        self.flush_outbound();
    }

    /// Write bytes to the outbound stream and send what the window allows.
    /// Returns how many bytes the stream accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let written = self.sender.stream_in_mut().write(data);
        self.sender.fill_window();
        self.flush_outbound();
        written
    }

    /// Close the outbound stream; a FIN goes out once everything written
    /// has been sent.
    pub fn end_input_stream(&mut self) {
        self.sender.stream_in_mut().end_input();
        self.sender.fill_window();
        self.flush_outbound();
    }

    pub fn segment_received(&mut self, seg: &TcpSegment) {
        if !self.active {
            return;
        }
        self.time_since_last_seg = 0;

        // still listening: only a SYN means anything
        if self.state_listen() && !seg.header.syn {
            return;
        }

        if seg.header.rst {
            log::warn!("connection reset by peer");
            self.abort(false);
            return;
        }

        self.receiver.segment_received(seg);

        if seg.header.ack {
            self.sender
                .ack_received(seg.ackno(), seg.header.window_size);
        }

        // an inbound SYN before we have sent anything is the passive-open
        // path; answer with our own SYN+ACK rather than a bare ack
        if seg.header.syn && self.sender.next_seqno_absolute() == 0 {
            self.connect();
            return;
        }

        // anything that occupied sequence space deserves a reply
        let len = seg.length_in_sequence_space();
        if len > 0 && self.sender.segments_out().is_empty() {
            self.sender.send_empty_segment();
        }

        // keep-alive probe: a zero-length segment one left of the ackno
        if let Some(ackno) = self.receiver.ackno() {
            if len == 0 && seg.header.sequence_number == ackno.raw().wrapping_sub(1) {
                self.sender.send_empty_segment();
            }
        }

        self.flush_outbound();
    }

    /// Advance time. Drives the sender's retransmissions, the abort on too
    /// many of them, and the linger countdown.
    pub fn tick(&mut self, ms: u64) {
        if !self.active {
            return;
        }
        self.time_since_last_seg += ms;
        self.sender.tick(ms);

        if self.sender.consecutive_retransmissions() > MAX_RETX_ATTEMPTS {
            log::warn!("retransmission limit reached, resetting connection");
            self.sender.segments_out_mut().clear();
            self.segments_out.clear();
            self.abort(true);
            return;
        }

        self.flush_outbound();
    }

    /// Move the sender's queued segments to the connection's outbound
    /// queue, stamping each with the receiver's ackno and window, and a RST
    /// if one is owed.
    fn flush_outbound(&mut self) {
        while let Some(mut seg) = self.sender.segments_out_mut().pop_front() {
            if let Some(ackno) = self.receiver.ackno() {
                seg.header.ack = true;
                seg.header.acknowledgment_number = ackno.raw();
                seg.header.window_size =
                    cmp::min(self.receiver.window_size(), u16::MAX as usize) as u16;
            }
            if self.rst_pending {
                seg.header.rst = true;
                self.rst_pending = false;
            }
            self.segments_out.push_back(seg);
        }
        self.check_clean_shutdown();
    }

    fn abort(&mut self, send_rst: bool) {
        self.sender.stream_in_mut().set_error();
        self.receiver.stream_out_mut().set_error();
        self.active = false;
        if !send_rst {
            return;
        }
        self.rst_pending = true;
        if self.sender.segments_out().is_empty() {
            self.sender.send_empty_segment();
        }
        self.flush_outbound();
    }

    /// Decide whether the connection is done. The peer closing first means
    /// no linger is needed; otherwise we wait ten timeouts after the last
    /// segment in case our final ack has to be replayed.
    fn check_clean_shutdown(&mut self) {
        if !self.receiver.stream_out().input_ended() {
            return;
        }
        if !self.sender.stream_in().eof() {
            self.linger_after_streams_finish = false;
        } else if self.sender.fin_sent()
            && self.sender.bytes_in_flight() == 0
            && (!self.linger_after_streams_finish
                || self.time_since_last_seg >= 10 * self.cfg.rt_timeout)
        {
            self.active = false;
        }
    }

    fn state_listen(&self) -> bool {
        self.sender.next_seqno_absolute() == 0 && self.receiver.ackno().is_none()
    }

    /// The classical state name for the current sender/receiver condition.
    pub fn state(&self) -> State {
        if self.sender.stream_in().error() || self.receiver.stream_out().error() {
            return State::Reset;
        }
        if !self.active {
            return State::Closed;
        }
        if self.state_listen() {
            return State::Listen;
        }
        let syn_acked = self.sender.next_seqno_absolute() > 0
            && self.sender.bytes_in_flight() as u64 != self.sender.next_seqno_absolute();
        if self.receiver.ackno().is_none() {
            return State::SynSent;
        }
        if !syn_acked && !self.sender.fin_sent() {
            return State::SynRcvd;
        }
        let peer_closed = self.receiver.stream_out().input_ended();
        match (self.sender.fin_sent(), peer_closed) {
            (false, false) => State::Established,
            (false, true) => State::CloseWait,
            (true, false) => {
                if self.sender.bytes_in_flight() > 0 {
                    State::FinWait1
                } else {
                    State::FinWait2
                }
            }
            (true, true) => {
                if self.sender.bytes_in_flight() > 0 {
                    if self.linger_after_streams_finish {
                        State::Closing
                    } else {
                        State::LastAck
                    }
                } else {
                    State::TimeWait
                }
            }
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn segments_out_mut(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    /// The stream of bytes received from the peer, ready for the reader.
    pub fn inbound_stream(&self) -> &ByteStream {
        self.receiver.stream_out()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut ByteStream {
        self.receiver.stream_out_mut()
    }

    pub fn remaining_outbound_capacity(&self) -> usize {
        self.sender.stream_in().remaining_capacity()
    }

    pub fn bytes_in_flight(&self) -> usize {
        self.sender.bytes_in_flight()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.receiver.unassembled_bytes()
    }

    pub fn time_since_last_segment_received(&self) -> u64 {
        self.time_since_last_seg
    }

    pub fn outbound_eof_acked(&self) -> bool {
        self.sender.fin_sent() && self.sender.bytes_in_flight() == 0
    }
}

impl Drop for TcpConnection {
    /// An endpoint discarded while still active resets the peer,
    /// best-effort: the RST lands on the outbound queue for whatever the
    /// embedder still drains.
    fn drop(&mut self) {
        if self.active {
            log::warn!("unclean shutdown of active connection");
            self.abort(true);
        }
    }
}
