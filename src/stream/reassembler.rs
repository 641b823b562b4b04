use std::collections::BTreeMap;

use super::byte_stream::ByteStream;

/// Accepts substrings of a byte stream at arbitrary offsets, possibly out
/// of order and overlapping, and writes the stream to an output
/// [`ByteStream`] in order.
///
/// Bytes buffered here plus bytes sitting unread in the output never exceed
/// the capacity; anything past that window is discarded and must be
/// retransmitted by the peer.
#[derive(Debug)]
pub struct StreamReassembler {
    /// Pending fragments keyed by their first stream index. Intervals are
    /// disjoint and non-adjacent; everything begins past `next_index`.
    fragments: BTreeMap<u64, Vec<u8>>,
    /// Stream index of the first byte not yet pushed to the output.
    next_index: u64,
    unassembled: usize,
    eof_index: Option<u64>,
    capacity: usize,
    output: ByteStream,
}

impl StreamReassembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            fragments: BTreeMap::new(),
            next_index: 0,
            unassembled: 0,
            eof_index: None,
            capacity,
            output: ByteStream::new(capacity),
        }
    }

    /// Accept a substring starting at absolute stream index `index`. When
    /// `eof` is set, `index + data.len()` is the total stream length.
    pub fn push_substring(&mut self, data: &[u8], index: u64, eof: bool) {
        if eof {
            self.eof_index = Some(index + data.len() as u64);
        }

        let end = index + data.len() as u64;
        if data.is_empty() || end <= self.next_index {
            // nothing new, but a bare or retransmitted EOF may still close
            // the stream
            self.check_eof();
            return;
        }

        let window_end = self.next_index + (self.capacity - self.output.buffer_size()) as u64;
        if index >= window_end {
            log::debug!("discarding substring at {index} past window end {window_end}");
            return;
        }
        let data = &data[..(end.min(window_end) - index) as usize];

        if index <= self.next_index {
            self.assemble_prefix(data, index);
        } else {
            self.insert_fragment(data, index);
        }
        self.check_eof();
    }

    /// `data` overlaps `next_index`: write the unseen tail to the output,
    /// then fold in any pending fragments the stream has caught up to.
    fn assemble_prefix(&mut self, data: &[u8], index: u64) {
        let skip = (self.next_index - index) as usize;
        let written = self.output.write(&data[skip..]);
        self.next_index += written as u64;

        while let Some((&begin, fragment)) = self.fragments.first_key_value() {
            let frag_end = begin + fragment.len() as u64;
            if frag_end <= self.next_index {
                let fragment = self.fragments.remove(&begin).unwrap();
                self.unassembled -= fragment.len();
            } else if begin <= self.next_index {
                let fragment = self.fragments.remove(&begin).unwrap();
                self.unassembled -= fragment.len();
                let written = self.output.write(&fragment[(self.next_index - begin) as usize..]);
                self.next_index += written as u64;
            } else {
                break;
            }
        }
    }

    /// `data` leaves a gap before `next_index`: buffer it, merging with any
    /// fragment it touches or overlaps. Overlapping bytes in a well-formed
    /// stream agree; earlier-received bytes win if they do not.
    fn insert_fragment(&mut self, data: &[u8], index: u64) {
        let mut new_begin = index;
        let mut new_end = index + data.len() as u64;

        let touching: Vec<u64> = self
            .fragments
            .range(..=new_end)
            .filter(|(begin, fragment)| **begin + fragment.len() as u64 >= new_begin)
            .map(|(begin, _)| *begin)
            .collect();

        let mut absorbed = Vec::with_capacity(touching.len());
        for begin in touching {
            let fragment = self.fragments.remove(&begin).unwrap();
            self.unassembled -= fragment.len();
            new_begin = new_begin.min(begin);
            new_end = new_end.max(begin + fragment.len() as u64);
            absorbed.push((begin, fragment));
        }

        let mut block = vec![0u8; (new_end - new_begin) as usize];
        block[(index - new_begin) as usize..][..data.len()].copy_from_slice(data);
        for (begin, fragment) in absorbed {
            block[(begin - new_begin) as usize..][..fragment.len()].copy_from_slice(&fragment);
        }

        self.unassembled += block.len();
        self.fragments.insert(new_begin, block);
    }

    fn check_eof(&mut self) {
        if self.eof_index == Some(self.next_index) {
            self.output.end_input();
        }
    }

    /// Total bytes buffered in pending fragments.
    pub fn unassembled_bytes(&self) -> usize {
        self.unassembled
    }

    pub fn is_empty(&self) -> bool {
        self.unassembled == 0
    }

    /// Stream index of the first unassembled byte.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stream_out(&self) -> &ByteStream {
        &self.output
    }

    pub fn stream_out_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reassembled(reassembler: &mut StreamReassembler) -> Vec<u8> {
        let n = reassembler.stream_out().buffer_size();
        reassembler.stream_out_mut().read(n)
    }

    #[test]
    fn in_order_passthrough() {
        let mut r = StreamReassembler::new(64);
        r.push_substring(b"abc", 0, false);
        r.push_substring(b"def", 3, true);
        assert_eq!(reassembled(&mut r), b"abcdef");
        assert!(r.stream_out().eof());
        assert_eq!(r.unassembled_bytes(), 0);
    }

    #[test]
    fn out_of_order_is_buffered() {
        let mut r = StreamReassembler::new(64);
        r.push_substring(b"lo", 3, false);
        assert_eq!(r.unassembled_bytes(), 2);
        assert_eq!(r.stream_out().buffer_size(), 0);
        r.push_substring(b"hel", 0, false);
        assert_eq!(r.unassembled_bytes(), 0);
        assert_eq!(reassembled(&mut r), b"hello");
    }

    #[test]
    fn overlapping_fragments_merge() {
        let mut r = StreamReassembler::new(64);
        r.push_substring(b"cde", 2, false);
        r.push_substring(b"defg", 3, false);
        assert_eq!(r.unassembled_bytes(), 5);
        r.push_substring(b"ab", 0, false);
        assert_eq!(reassembled(&mut r), b"abcdefg");
        assert_eq!(r.unassembled_bytes(), 0);
    }

    #[test]
    fn adjacent_fragments_coalesce() {
        let mut r = StreamReassembler::new(64);
        r.push_substring(b"cd", 2, false);
        r.push_substring(b"ef", 4, false);
        assert_eq!(r.fragments.len(), 1);
        assert_eq!(r.unassembled_bytes(), 4);
    }

    #[test]
    fn stale_data_is_ignored() {
        let mut r = StreamReassembler::new(64);
        r.push_substring(b"abcd", 0, false);
        r.push_substring(b"ab", 0, false);
        r.push_substring(b"bcd", 1, false);
        assert_eq!(reassembled(&mut r), b"abcd");
        assert_eq!(r.stream_out().bytes_written(), 4);
    }

    #[test]
    fn bytes_past_window_are_dropped() {
        let mut r = StreamReassembler::new(4);
        r.push_substring(b"abcdef", 0, true);
        assert_eq!(r.stream_out().buffer_size(), 4);
        // the eof index is past what fit; stream must stay open
        assert!(!r.stream_out().input_ended());
        assert_eq!(reassembled(&mut r), b"abcd");
        r.push_substring(b"ef", 4, true);
        assert_eq!(reassembled(&mut r), b"ef");
        assert!(r.stream_out().eof());
    }

    #[test]
    fn unread_output_consumes_window() {
        let mut r = StreamReassembler::new(4);
        r.push_substring(b"abcd", 0, false);
        // output full, nothing else may buffer
        r.push_substring(b"ef", 4, false);
        assert_eq!(r.unassembled_bytes(), 0);
    }

    #[test]
    fn empty_substring_carries_eof() {
        let mut r = StreamReassembler::new(8);
        r.push_substring(b"ab", 0, false);
        r.push_substring(b"", 2, true);
        assert!(r.stream_out().input_ended());
    }

    #[test]
    fn retransmitted_eof_closes_assembled_stream() {
        let mut r = StreamReassembler::new(8);
        r.push_substring(b"ab", 0, false);
        r.push_substring(b"cd", 2, true);
        assert!(r.stream_out().input_ended());
        // a stale retransmit must not reopen or break anything
        r.push_substring(b"cd", 2, true);
        assert_eq!(reassembled(&mut r), b"abcd");
    }

    #[test]
    fn last_eof_index_wins() {
        let mut r = StreamReassembler::new(8);
        // a short FIN-bearing substring arrives first, out of order
        r.push_substring(b"b", 1, true);
        assert_eq!(r.eof_index, Some(2));
        assert!(!r.stream_out().input_ended());
        // the full stream carries the real end; the later value replaces
        // the recorded one and the stream closes once assembled
        r.push_substring(b"abcd", 0, true);
        assert_eq!(r.eof_index, Some(4));
        assert!(r.stream_out().input_ended());
        assert_eq!(reassembled(&mut r), b"abcd");
        assert!(r.stream_out().eof());
    }

    proptest! {
        // Any arrival order of substrings covering [0, n) reassembles the
        // original bytes with nothing left pending.
        #[test]
        fn permutations_reassemble(
            data in proptest::collection::vec(any::<u8>(), 1..128),
            cuts in proptest::collection::btree_set(0usize..128, 0..8),
            seed in any::<u64>(),
        ) {
            let n = data.len();
            let mut bounds: Vec<usize> = cuts.into_iter().filter(|c| *c < n).collect();
            bounds.push(0);
            bounds.push(n);
            bounds.sort_unstable();
            bounds.dedup();
            let mut chunks: Vec<(usize, usize)> =
                bounds.windows(2).map(|w| (w[0], w[1])).collect();
            // deterministic shuffle from the seed
            let mut state = seed | 1;
            for i in (1..chunks.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                chunks.swap(i, (state >> 33) as usize % (i + 1));
            }

            let mut r = StreamReassembler::new(256);
            for (begin, end) in chunks {
                r.push_substring(&data[begin..end], begin as u64, end == n);
            }
            prop_assert_eq!(r.unassembled_bytes(), 0);
            prop_assert!(r.stream_out().input_ended());
            let out = r.stream_out_mut().read(n);
            prop_assert_eq!(out, data);
        }

        // Buffered fragments plus unread output bytes never exceed capacity.
        #[test]
        fn capacity_is_respected(
            pushes in proptest::collection::vec((0u64..64, 1usize..16), 0..32),
        ) {
            let capacity = 20;
            let mut r = StreamReassembler::new(capacity);
            for (index, len) in pushes {
                r.push_substring(&vec![0x5Au8; len], index, false);
                prop_assert!(
                    r.unassembled_bytes() + r.stream_out().buffer_size() <= capacity
                );
            }
        }
    }
}
