/// A connection progresses through a series of states during its lifetime:
/// `Listen`, `SynSent`, `SynRcvd`, `Established`, `FinWait1`, `FinWait2`,
/// `CloseWait`, `Closing`, `LastAck`, `TimeWait` and the fictional
/// `Closed`, which stands for a connection that no longer exists.
///
/// The connection does not store its state; it is derived on demand from
/// the sender and receiver observables (whether a SYN or FIN has gone out,
/// whether bytes are in flight, whether the inbound stream has ended), so
/// this enum is a diagnostic surface rather than a driver of behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Waiting for a connection request from the peer.
    Listen,
    /// Our SYN is out, nothing heard back.
    SynSent,
    /// Both connection requests seen, waiting for our SYN's ack.
    SynRcvd,
    /// The data-transfer state.
    Established,
    /// We sent FIN, awaiting its ack (or the peer's FIN).
    FinWait1,
    /// Our FIN is acked, awaiting the peer's FIN.
    FinWait2,
    /// Peer sent FIN, local writer still open.
    CloseWait,
    /// Both sides sent FIN, ours not yet acked.
    Closing,
    /// Peer's FIN handled, awaiting the ack of ours.
    LastAck,
    /// Everything acked both ways, lingering for stray retransmissions.
    TimeWait,
    /// Connection finished (or was never opened).
    Closed,
    /// Connection aborted; both streams carry the error flag.
    Reset,
}

impl State {
    /// True once the handshake has completed and sequence numbers are
    /// agreed in both directions.
    pub fn is_synchronized(&self) -> bool {
        !matches!(self, State::Listen | State::SynSent | State::SynRcvd)
    }
}
