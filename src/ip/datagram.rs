use std::io;
use std::net::Ipv4Addr;

use etherparse::{IpNumber, Ipv4Header, Ipv4HeaderSlice};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatagramParseError {
    #[error("ipv4 header: {0}")]
    Header(String),
}

/// An IPv4 datagram as routed and queued by the stack: parsed header plus
/// payload bytes.
#[derive(Clone, Debug)]
pub struct InternetDatagram {
    pub header: Ipv4Header,
    pub payload: Vec<u8>,
}

impl InternetDatagram {
    pub fn new(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        ttl: u8,
        protocol: IpNumber,
        payload: Vec<u8>,
    ) -> io::Result<Self> {
        let header = Ipv4Header::new(
            payload.len() as u16,
            ttl,
            protocol,
            source.octets(),
            destination.octets(),
        )
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        Ok(Self { header, payload })
    }

    pub fn parse(data: &[u8]) -> Result<Self, DatagramParseError> {
        let slice = Ipv4HeaderSlice::from_slice(data)
            .map_err(|err| DatagramParseError::Header(err.to_string()))?;
        let header = slice.to_header();
        let payload = data[slice.slice().len()..].to_vec();
        Ok(Self { header, payload })
    }

    /// Serialize header (checksum recomputed) followed by payload.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.header_len() as usize + self.payload.len());
        self.header
            .write(&mut out)
            .expect("writing a header to a Vec cannot fail");
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.source)
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.destination)
    }
}
