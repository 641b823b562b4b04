pub mod byte_stream;
pub mod reassembler;

pub use byte_stream::ByteStream;
pub use reassembler::StreamReassembler;
