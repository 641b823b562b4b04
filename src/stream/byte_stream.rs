use std::collections::VecDeque;

/// An in-order byte stream with a finite capacity.
///
/// Bytes written on the "input" side can be read, in order, from the
/// "output" side. The writer may signal that the stream has ended; once the
/// reader has drained everything written before that point, the stream has
/// reached EOF.
#[derive(Debug)]
pub struct ByteStream {
    buffer: VecDeque<u8>,
    capacity: usize,
    bytes_written: u64,
    bytes_read: u64,
    input_ended: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            bytes_written: 0,
            bytes_read: 0,
            input_ended: false,
            error: false,
        }
    }

    /// Append as much of `data` as fits, returning the number of bytes
    /// accepted. A write past capacity silently truncates.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.remaining_capacity());
        self.buffer.extend(&data[..accepted]);
        self.bytes_written += accepted as u64;
        accepted
    }

    /// Signal that nothing more will be written. Idempotent.
    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    /// Copy out up to `len` bytes without consuming them.
    pub fn peek(&self, len: usize) -> Vec<u8> {
        self.buffer.iter().take(len).copied().collect()
    }

    /// Drop up to `len` bytes from the front of the buffer.
    pub fn pop(&mut self, len: usize) {
        let dropped = len.min(self.buffer.len());
        self.buffer.drain(..dropped);
        self.bytes_read += dropped as u64;
    }

    /// Peek-then-pop.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let out = self.peek(len);
        self.pop(out.len());
        out
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    /// The stream is at EOF when the input has ended and the buffer has
    /// been drained.
    pub fn eof(&self) -> bool {
        self.input_ended && self.buffer.is_empty()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn error(&self) -> bool {
        self.error
    }
}
