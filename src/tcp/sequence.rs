use std::fmt;
use std::ops::Add;

/// A 32-bit sequence number, modulo 2^32.
///
/// TCP headers carry these; the stack works internally with 64-bit absolute
/// sequence numbers that start at zero on the SYN and never wrap. [`wrap`]
/// and [`unwrap`] convert between the two, the latter relative to a
/// checkpoint near the value being recovered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WrappingInt32(u32);

impl WrappingInt32 {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl Add<u32> for WrappingInt32 {
    type Output = WrappingInt32;

    fn add(self, rhs: u32) -> WrappingInt32 {
        WrappingInt32(self.0.wrapping_add(rhs))
    }
}

impl fmt::Display for WrappingInt32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Wrap an absolute sequence number to the 32-bit value sent on the wire.
pub fn wrap(n: u64, isn: WrappingInt32) -> WrappingInt32 {
    WrappingInt32(isn.0.wrapping_add(n as u32))
}

/// Recover the absolute sequence number for `n`, choosing the candidate
/// congruent to `n - isn` (mod 2^32) that lies closest to `checkpoint`.
/// Ties break toward the smaller value.
pub fn unwrap(n: WrappingInt32, isn: WrappingInt32, checkpoint: u64) -> u64 {
    let offset = n.0.wrapping_sub(isn.0) as u64;
    if checkpoint <= offset {
        return offset;
    }
    // round (checkpoint - offset) / 2^32 to the nearest multiple, halves down
    let steps = (checkpoint - offset + (1 << 31) - 1) >> 32;
    offset + (steps << 32)
}
