use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Instant;

use etherparse::{IpNumber, Ipv4Header, Ipv4HeaderSlice, TcpHeaderSlice};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use netstack::tcp::WrappingInt32;
use netstack::{TcpConfig, TcpConnection, TcpSegment};

const MTU: usize = 1500;
const TTL: u8 = 64;
const POLL_INTERVAL_MS: u8 = 10;

/// One TCP conversation, keyed from the peer's point of view.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
struct ConnectionId {
    peer: (Ipv4Addr, u16),
    local: (Ipv4Addr, u16),
}

/// Echo server over a tun device: accepts any inbound connection, echoes
/// every byte back, and closes when the peer does.
fn main() -> io::Result<()> {
    env_logger::init();

    let nic = tun_tap::Iface::without_packet_info("tun0", tun_tap::Mode::Tun)?;
    let mut connections: HashMap<ConnectionId, TcpConnection> = HashMap::new();
    let mut buf = [0u8; MTU];
    let mut last_tick = Instant::now();

    loop {
        let fd = unsafe { BorrowedFd::borrow_raw(nic.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let readable = match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
            Ok(n) => n > 0,
            Err(nix::errno::Errno::EINTR) => false,
            Err(err) => return Err(io::Error::from(err)),
        };

        let elapsed = last_tick.elapsed().as_millis() as u64;
        if elapsed > 0 {
            last_tick = Instant::now();
            for conn in connections.values_mut() {
                conn.tick(elapsed);
            }
        }

        if readable {
            let nbytes = nic.recv(&mut buf[..])?;
            handle_packet(&mut connections, &buf[..nbytes]);
        }

        for (id, conn) in connections.iter_mut() {
            echo_step(conn);
            flush_segments(&nic, id, conn)?;
        }
        connections.retain(|id, conn| {
            if conn.active() {
                true
            } else {
                log::debug!("connection {}:{} done", id.peer.0, id.peer.1);
                false
            }
        });
    }
}

fn handle_packet(connections: &mut HashMap<ConnectionId, TcpConnection>, packet: &[u8]) {
    let Ok(iph) = Ipv4HeaderSlice::from_slice(packet) else {
        return;
    };
    if iph.protocol() != IpNumber::TCP {
        return;
    }
    let ip_len = iph.slice().len();
    let Ok(tcph) = TcpHeaderSlice::from_slice(&packet[ip_len..]) else {
        log::debug!("ignoring undecodable tcp header");
        return;
    };
    let data = &packet[ip_len + tcph.slice().len()..];

    let id = ConnectionId {
        peer: (iph.source_addr(), tcph.source_port()),
        local: (iph.destination_addr(), tcph.destination_port()),
    };
    let mut seg = TcpSegment::new(WrappingInt32::new(tcph.sequence_number()));
    seg.header = tcph.to_header();
    seg.payload = data.to_vec();

    match connections.entry(id) {
        Entry::Occupied(mut entry) => entry.get_mut().segment_received(&seg),
        Entry::Vacant(entry) => {
            if !seg.header.syn {
                return;
            }
            log::debug!(
                "accepting {}:{} -> {}:{}",
                id.peer.0,
                id.peer.1,
                id.local.0,
                id.local.1
            );
            entry
                .insert(TcpConnection::new(TcpConfig::default()))
                .segment_received(&seg);
        }
    }
}

/// Copy whatever arrived back into the outbound stream, and close our side
/// once the peer has closed theirs.
fn echo_step(conn: &mut TcpConnection) {
    let pending = conn
        .inbound_stream()
        .buffer_size()
        .min(conn.remaining_outbound_capacity());
    if pending > 0 {
        let data = conn.inbound_stream_mut().read(pending);
        conn.write(&data);
    }
    if conn.inbound_stream().eof() {
        conn.end_input_stream();
    }
}

fn flush_segments(
    nic: &tun_tap::Iface,
    id: &ConnectionId,
    conn: &mut TcpConnection,
) -> io::Result<()> {
    while let Some(seg) = conn.segments_out_mut().pop_front() {
        send_segment(nic, id, seg)?;
    }
    Ok(())
}

fn send_segment(nic: &tun_tap::Iface, id: &ConnectionId, seg: TcpSegment) -> io::Result<()> {
    let mut tcp = seg.header;
    tcp.source_port = id.local.1;
    tcp.destination_port = id.peer.1;

    let ip = Ipv4Header::new(
        (tcp.header_len() as usize + seg.payload.len()) as u16,
        TTL,
        IpNumber::TCP,
        id.local.0.octets(),
        id.peer.0.octets(),
    )
    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    tcp.checksum = tcp
        .calc_checksum_ipv4(&ip, &seg.payload)
        .expect("failed to compute checksum");

    let mut out = Vec::with_capacity(MTU);
    ip.write(&mut out)?;
    tcp.write(&mut out)?;
    out.extend_from_slice(&seg.payload);
    nic.send(&out)?;
    Ok(())
}
