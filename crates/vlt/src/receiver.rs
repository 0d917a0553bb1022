// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receive-side buffering with partial-frame carryover.
//!
//! A [`Receiver`] sits between a byte transport and the frame decoder. Each
//! [`Receiver::receive`] call appends one read's worth of bytes after
//! whatever is already buffered; the unconsumed region then holds zero or
//! more complete frames plus at most one trailing partial frame. Frame
//! extraction consumes from the front ([`Receiver::remove`]); before the
//! next read, [`Receiver::move_to_begin`] shifts a trailing partial frame
//! to the buffer start so continuity across reads is preserved.
//!
//! ```text
//!           consumed            filled
//!              v                   v
//! +------------+--------+---------+----------------+
//! | discarded  | frame  | partial |   free space   |
//! +------------+--------+---------+----------------+
//!              \----- available ---/
//! ```
//!
//! The receiver is generic over [`std::io::Read`], so it works unchanged on
//! unix stream sockets, UDP sockets, files and plain fds. It is single-owner
//! state: one connection, one receiver, no internal locking.

use crate::error::{DltError, Result};
use std::io::Read;

/// What kind of transport feeds this receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverKind {
    /// Stream socket to the daemon.
    Socket,
    /// Datagram socket; one receive call per datagram.
    UdpSocket,
    /// Plain file descriptor (FIFO, file).
    Fd,
}

/// Flags for [`Receiver::check_and_get`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GetFlags {
    /// Skip the fixed-size user header in front of the requested bytes.
    pub skip_header: bool,
    /// Consume the bytes (and the skipped header) on success.
    pub consume: bool,
}

/// Buffering receiver over a byte transport.
pub struct Receiver<R> {
    source: R,
    kind: ReceiverKind,
    buf: Vec<u8>,
    /// Start of the unconsumed region.
    consumed: usize,
    /// End of valid bytes.
    filled: usize,
    last_bytes: usize,
    total_bytes: u64,
}

impl<R: Read> Receiver<R> {
    /// Create a receiver with a buffer sized to the largest expected frame.
    pub fn new(source: R, kind: ReceiverKind, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(DltError::WrongParameter("receiver buffer size"));
        }
        Ok(Self {
            source,
            kind,
            buf: vec![0; buffer_size],
            consumed: 0,
            filled: 0,
            last_bytes: 0,
            total_bytes: 0,
        })
    }

    pub fn kind(&self) -> ReceiverKind {
        self.kind
    }

    /// Total buffer size, the largest frame this receiver can ever hold.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes buffered but not yet consumed.
    pub fn available(&self) -> usize {
        self.filled - self.consumed
    }

    /// The unconsumed byte stream (frames + at most one partial frame).
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.consumed..self.filled]
    }

    /// Bytes delivered by the last `receive` call.
    pub fn last_bytes_received(&self) -> usize {
        self.last_bytes
    }

    /// Total bytes delivered over the lifetime of this receiver.
    pub fn total_bytes_received(&self) -> u64 {
        self.total_bytes
    }

    /// Perform one read into the free tail of the buffer.
    ///
    /// Returns the number of bytes read; 0 always signals an orderly close.
    /// If the tail is full but leading bytes were consumed, the unconsumed
    /// region is shifted to the front first so the read has free space.
    pub fn receive(&mut self) -> Result<usize> {
        if self.filled == self.buf.len() {
            if self.consumed == 0 {
                // A frame larger than the buffer cannot make progress.
                return Err(DltError::NotEnoughData);
            }
            self.move_to_begin();
        }
        let n = self.source.read(&mut self.buf[self.filled..])?;
        self.filled += n;
        self.last_bytes = n;
        self.total_bytes += n as u64;
        Ok(n)
    }

    /// If at least `dst.len()` bytes are available (after an optional
    /// skipped user header), copy them out; otherwise report
    /// [`DltError::NotEnoughData`] without consuming anything.
    pub fn check_and_get(&mut self, dst: &mut [u8], flags: GetFlags) -> Result<()> {
        let skip = if flags.skip_header {
            crate::protocol::constants::USER_HEADER_SIZE
        } else {
            0
        };
        let needed = skip + dst.len();
        if self.available() < needed {
            return Err(DltError::NotEnoughData);
        }
        let start = self.consumed + skip;
        dst.copy_from_slice(&self.buf[start..start + dst.len()]);
        if flags.consume {
            self.consumed += needed;
        }
        Ok(())
    }

    /// Discard `size` leading unconsumed bytes.
    pub fn remove(&mut self, size: usize) -> Result<()> {
        if size > self.available() {
            return Err(DltError::WrongParameter("remove beyond buffered data"));
        }
        self.consumed += size;
        Ok(())
    }

    /// Shift the unconsumed tail (a partial frame, if any) to the buffer
    /// start so the next `receive` appends right after it.
    pub fn move_to_begin(&mut self) {
        let len = self.available();
        self.buf.copy_within(self.consumed..self.filled, 0);
        self.consumed = 0;
        self.filled = len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read};

    // Read source delivering a fixed byte stream in caller-chosen chunks,
    // simulating short reads on a socket.
    struct Chunked {
        data: Vec<u8>,
        chunks: Vec<usize>,
        pos: usize,
        call: usize,
    }

    impl Chunked {
        fn new(data: &[u8], chunks: &[usize]) -> Self {
            Self {
                data: data.to_vec(),
                chunks: chunks.to_vec(),
                pos: 0,
                call: 0,
            }
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let want = self.chunks.get(self.call).copied().unwrap_or(usize::MAX);
            self.call += 1;
            let n = want.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn receive_accumulates_and_counts() {
        let mut rcv = Receiver::new(
            Chunked::new(b"hello world", &[5, 6]),
            ReceiverKind::Socket,
            64,
        )
        .unwrap();
        assert_eq!(rcv.receive().unwrap(), 5);
        assert_eq!(rcv.last_bytes_received(), 5);
        assert_eq!(rcv.receive().unwrap(), 6);
        assert_eq!(rcv.available(), 11);
        assert_eq!(rcv.buffered(), b"hello world");
        assert_eq!(rcv.total_bytes_received(), 11);
        // Orderly close.
        assert_eq!(rcv.receive().unwrap(), 0);
    }

    #[test]
    fn check_and_get_without_consume_peeks() {
        let mut rcv =
            Receiver::new(Chunked::new(b"abcdef", &[6]), ReceiverKind::Fd, 32).unwrap();
        rcv.receive().unwrap();

        let mut out = [0u8; 3];
        rcv.check_and_get(&mut out, GetFlags::default()).unwrap();
        assert_eq!(&out, b"abc");
        assert_eq!(rcv.available(), 6);

        rcv.check_and_get(&mut out, GetFlags { skip_header: false, consume: true })
            .unwrap();
        assert_eq!(rcv.available(), 3);
        assert_eq!(rcv.buffered(), b"def");
    }

    #[test]
    fn check_and_get_skips_user_header() {
        use crate::protocol::constants::USER_HEADER_SIZE;
        let mut data = vec![0u8; USER_HEADER_SIZE];
        data.extend_from_slice(b"body");
        let mut rcv = Receiver::new(
            Chunked::new(&data, &[data.len()]),
            ReceiverKind::Socket,
            64,
        )
        .unwrap();
        rcv.receive().unwrap();

        let mut out = [0u8; 4];
        rcv.check_and_get(&mut out, GetFlags { skip_header: true, consume: true })
            .unwrap();
        assert_eq!(&out, b"body");
        assert_eq!(rcv.available(), 0);
    }

    #[test]
    fn not_enough_data_does_not_consume() {
        let mut rcv =
            Receiver::new(Chunked::new(b"ab", &[2]), ReceiverKind::Socket, 32).unwrap();
        rcv.receive().unwrap();
        let mut out = [0u8; 5];
        assert!(matches!(
            rcv.check_and_get(&mut out, GetFlags { skip_header: false, consume: true }),
            Err(DltError::NotEnoughData)
        ));
        assert_eq!(rcv.available(), 2);
    }

    #[test]
    fn partial_frame_continuity_across_reads() {
        // The same stream delivered in awkward chunk sizes must reassemble
        // to the single-read result.
        let stream: Vec<u8> = (0u8..200).collect();
        let mut rcv = Receiver::new(
            Chunked::new(&stream, &[7, 64, 3, 126]),
            ReceiverKind::Socket,
            256,
        )
        .unwrap();

        let mut reassembled = Vec::new();
        loop {
            if rcv.receive().unwrap() == 0 {
                break;
            }
            // Extract "frames" of 10 bytes; keep the partial tail.
            while rcv.available() >= 10 {
                let mut frame = [0u8; 10];
                rcv.check_and_get(&mut frame, GetFlags { skip_header: false, consume: true })
                    .unwrap();
                reassembled.extend_from_slice(&frame);
            }
            rcv.move_to_begin();
        }
        reassembled.extend_from_slice(rcv.buffered());
        assert_eq!(reassembled, stream);
    }

    #[test]
    fn remove_bounds_checked() {
        let mut rcv =
            Receiver::new(Chunked::new(b"abc", &[3]), ReceiverKind::Fd, 16).unwrap();
        rcv.receive().unwrap();
        assert!(rcv.remove(4).is_err());
        rcv.remove(2).unwrap();
        assert_eq!(rcv.buffered(), b"c");
    }

    #[test]
    fn full_tail_with_consumed_space_compacts_and_reads() {
        // 12 bytes through an 8-byte buffer: after consuming from a full
        // buffer, the next receive must reclaim the space and read more
        // instead of reporting a bogus close.
        let stream: Vec<u8> = (0u8..12).collect();
        let mut rcv = Receiver::new(
            Chunked::new(&stream, &[8, 4]),
            ReceiverKind::Socket,
            8,
        )
        .unwrap();
        assert_eq!(rcv.receive().unwrap(), 8);
        let mut out = [0u8; 4];
        rcv.check_and_get(&mut out, GetFlags { skip_header: false, consume: true })
            .unwrap();
        assert_eq!(rcv.receive().unwrap(), 4);
        assert_eq!(rcv.buffered(), &stream[4..]);
        // Now the stream really is done.
        rcv.remove(8).unwrap();
        assert_eq!(rcv.receive().unwrap(), 0);
    }

    #[test]
    fn full_buffer_without_progress_is_an_error() {
        let mut rcv =
            Receiver::new(Chunked::new(&[0u8; 8], &[8]), ReceiverKind::Fd, 8).unwrap();
        rcv.receive().unwrap();
        assert!(matches!(rcv.receive(), Err(DltError::NotEnoughData)));
        // Consuming and compacting restores progress.
        rcv.remove(8).unwrap();
        rcv.move_to_begin();
        assert_eq!(rcv.receive().unwrap(), 0);
    }
}
