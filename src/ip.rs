pub mod datagram;
pub mod router;

pub use datagram::InternetDatagram;
pub use router::{QueuedInterface, Router};
