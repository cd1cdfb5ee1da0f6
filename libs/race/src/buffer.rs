//! Fixed-capacity relay buffer.

use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};

/// Per-direction buffer of bytes read but not yet written.
///
/// Bytes leave in the order they arrived and the buffer never holds more
/// than [`RelayBuffer::CAPACITY`] bytes.
#[derive(Debug)]
pub struct RelayBuffer {
    data: BytesMut,
}

impl RelayBuffer {
    pub const CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(Self::CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Free space left before the buffer is full.
    pub fn spare(&self) -> usize {
        Self::CAPACITY - self.data.len()
    }

    /// Append as much of `bytes` as fits; returns the number appended.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.spare());
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    /// Unwritten bytes, oldest first.
    pub fn front(&self) -> &[u8] {
        &self.data
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.data.advance(n.min(self.data.len()));
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// One read of at most [`spare`](Self::spare) bytes from `source`.
    ///
    /// Returns whatever the read returned; `Ok(0)` is end of stream.
    pub fn fill_from<R: Read + ?Sized>(&mut self, source: &mut R) -> io::Result<usize> {
        debug_assert!(self.spare() > 0, "fill_from on a full buffer");

        let mut chunk = [0u8; Self::CAPACITY];
        let want = self.spare();
        let n = source.read(&mut chunk[..want])?;
        self.data.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// One write of the buffered bytes to `sink`, consuming what was accepted.
    pub fn drain_into<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<usize> {
        let n = sink.write(&self.data)?;
        self.consume(n);
        Ok(n)
    }
}

impl Default for RelayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Writer that accepts at most `limit` bytes per call.
    struct Trickle {
        limit: usize,
        written: Vec<u8>,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_push_stops_at_capacity() {
        let mut buffer = RelayBuffer::new();
        let big = vec![7u8; RelayBuffer::CAPACITY + 100];

        assert_eq!(buffer.push(&big), RelayBuffer::CAPACITY);
        assert_eq!(buffer.spare(), 0);
        assert_eq!(buffer.push(b"more"), 0);
    }

    #[test]
    fn test_fill_from_respects_spare() {
        let mut buffer = RelayBuffer::new();
        buffer.push(&vec![0u8; RelayBuffer::CAPACITY - 3]);

        let mut source: &[u8] = b"abcdef";
        assert_eq!(buffer.fill_from(&mut source).unwrap(), 3);
        assert_eq!(source, b"def");
        assert_eq!(&buffer.front()[RelayBuffer::CAPACITY - 3..], b"abc");
    }

    #[test]
    fn test_fill_from_end_of_stream() {
        let mut buffer = RelayBuffer::new();
        let mut source: &[u8] = b"";
        assert_eq!(buffer.fill_from(&mut source).unwrap(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_drain_keeps_order() {
        let mut buffer = RelayBuffer::new();
        buffer.push(b"hello world");

        let mut sink = Trickle {
            limit: 5,
            written: Vec::new(),
        };
        assert_eq!(buffer.drain_into(&mut sink).unwrap(), 5);
        assert_eq!(buffer.front(), b" world");

        buffer.push(b"!");
        while !buffer.is_empty() {
            buffer.drain_into(&mut sink).unwrap();
        }
        assert_eq!(sink.written, b"hello world!");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Fill(Vec<u8>),
        Drain(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..6000).prop_map(Op::Fill),
            (1usize..5000).prop_map(Op::Drain),
        ]
    }

    proptest! {
        #[test]
        fn test_fifo_and_capacity(ops in prop::collection::vec(op(), 1..40)) {
            let mut buffer = RelayBuffer::new();
            let mut model: VecDeque<u8> = VecDeque::new();
            let mut drained = Vec::new();
            let mut expected = Vec::new();

            for op in ops {
                match op {
                    Op::Fill(bytes) => {
                        if buffer.spare() == 0 {
                            continue;
                        }
                        let mut source: &[u8] = &bytes;
                        let n = buffer.fill_from(&mut source).unwrap();
                        prop_assert_eq!(n, bytes.len().min(RelayBuffer::CAPACITY - model.len()));
                        model.extend(&bytes[..n]);
                    }
                    Op::Drain(limit) => {
                        let mut sink = Trickle { limit, written: Vec::new() };
                        let n = buffer.drain_into(&mut sink).unwrap();
                        drained.extend_from_slice(&sink.written);
                        expected.extend(model.drain(..n));
                    }
                }

                prop_assert!(buffer.len() <= RelayBuffer::CAPACITY);
                prop_assert_eq!(buffer.len(), model.len());
                let queued: Vec<u8> = model.iter().copied().collect();
                prop_assert_eq!(buffer.front(), queued.as_slice());
            }

            prop_assert_eq!(drained, expected);
        }
    }
}
