use std::io;
use std::os::unix::io::RawFd;

/// Reserved space at the front of the buffer so a length prefix can be written in place without
/// shifting the payload (spec §3/§4.1).
const CHEAP_PREPEND: usize = 8;
const INITIAL_SIZE: usize = 1024;
const EXTRA_BUF_SIZE: usize = 65536;

/// A growable byte buffer with `0 <= reader <= writer <= data.len()` plus the 8-byte prepend
/// reserve. `readable = writer - reader`, `writable = data.len() - writer`, `prependable =
/// reader` (spec §3 invariants).
pub struct Buffer {
    data: Vec<u8>,
    reader: usize,
    writer: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    #[inline]
    pub fn new() -> Buffer {
        Buffer::with_capacity(INITIAL_SIZE)
    }

    #[inline]
    pub fn with_capacity(size: usize) -> Buffer {
        Buffer {
            data: vec![0u8; CHEAP_PREPEND + size],
            reader: CHEAP_PREPEND,
            writer: CHEAP_PREPEND,
        }
    }

    #[inline]
    pub fn readable(&self) -> usize {
        self.writer - self.reader
    }

    #[inline]
    pub fn writable(&self) -> usize {
        self.data.len() - self.writer
    }

    #[inline]
    pub fn prependable(&self) -> usize {
        self.reader
    }

    /// The readable region, left untouched.
    #[inline]
    pub fn peek(&self) -> &[u8] {
        &self.data[self.reader..self.writer]
    }

    /// Advances the reader index by `len`, discarding that many bytes from the front of the
    /// readable region.
    #[inline]
    pub fn retrieve(&mut self, len: usize) {
        assert!(len <= self.readable(), "retrieve past the writer index");
        if len < self.readable() {
            self.reader += len;
        } else {
            self.retrieve_all();
        }
    }

    /// Discards bytes up to (but not including) `offset` bytes past the current reader index —
    /// the realization of the original's pointer-based `retrieveUntil`, typically used after a
    /// `peek()` + manual scan for a delimiter.
    #[inline]
    pub fn retrieve_until(&mut self, offset: usize) {
        self.retrieve(offset);
    }

    /// Resets both indices to the start of the writable region, per spec §8: "retrieveAll resets
    /// both indices to 8."
    #[inline]
    pub fn retrieve_all(&mut self) {
        self.reader = CHEAP_PREPEND;
        self.writer = CHEAP_PREPEND;
    }

    #[inline]
    pub fn retrieve_as_bytes(&mut self, len: usize) -> Vec<u8> {
        let bytes = self.peek()[..len].to_vec();
        self.retrieve(len);
        bytes
    }

    #[inline]
    pub fn retrieve_all_as_bytes(&mut self) -> Vec<u8> {
        let len = self.readable();
        self.retrieve_as_bytes(len)
    }

    /// Appends `bytes` to the writer end, growing or compacting first if there isn't enough
    /// writable room.
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        let end = self.writer + bytes.len();
        self.data[self.writer..end].copy_from_slice(bytes);
        self.writer = end;
    }

    /// Guarantees at least `len` bytes of writable room, per the growth policy in spec §3: "if
    /// `writable + prependable < needed + 8`, resize to `writer + needed`; otherwise compact by
    /// shifting the readable region to offset 8."
    #[inline]
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable() < len {
            self.make_space(len);
        }
    }

    fn make_space(&mut self, len: usize) {
        if self.writable() + self.prependable() < len + CHEAP_PREPEND {
            self.data.resize(self.writer + len, 0);
        } else {
            let readable = self.readable();
            self.data.copy_within(self.reader..self.writer, CHEAP_PREPEND);
            self.reader = CHEAP_PREPEND;
            self.writer = CHEAP_PREPEND + readable;
        }
    }

    /// Writes `bytes` into the prepend reserve, just before the current readable region — used
    /// to stamp a length prefix in front of an already-encoded payload without copying it.
    #[inline]
    pub fn prepend(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.prependable(), "not enough prepend room");
        self.reader -= bytes.len();
        let end = self.reader + bytes.len();
        self.data[self.reader..end].copy_from_slice(bytes);
    }

    /// Scatter-reads from `fd`: one iovec into the buffer's writable tail, a second into a 64
    /// KiB stack buffer, so a single `readv` can drain a socket's backlog even if it exceeds the
    /// buffer's current capacity; overflow is then appended, growing the buffer (spec §4.1).
    pub fn read_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let mut extra = [0u8; EXTRA_BUF_SIZE];
        let writable = self.writable();

        let iov = [
            libc::iovec {
                iov_base: self.data[self.writer..].as_mut_ptr().cast(),
                iov_len: writable,
            },
            libc::iovec {
                iov_base: extra.as_mut_ptr().cast(),
                iov_len: extra.len(),
            },
        ];

        let n = unsafe { libc::readv(fd, iov.as_ptr(), 2) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        let n = n as usize;

        if n <= writable {
            self.writer += n;
        } else {
            self.writer = self.data.len();
            let overflow = n - writable;
            self.append(&extra[..overflow]);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_invariant_holds_after_append_and_retrieve() {
        let mut buf = Buffer::new();
        buf.append(b"hello world");
        assert_eq!(buf.readable(), 11);
        buf.retrieve(6);
        assert_eq!(buf.peek(), b"world");
        assert_eq!(buf.prependable() + buf.readable(), buf.writer);
    }

    #[test]
    fn append_then_retrieve_all_round_trips() {
        let mut buf = Buffer::new();
        let payload: Vec<u8> = (0..200u32).map(|b| b as u8).collect();
        buf.append(&payload);
        let out = buf.retrieve_all_as_bytes();
        assert_eq!(out, payload);
        assert_eq!(buf.readable(), 0);
    }

    #[test]
    fn growth_preserves_readable_bytes_in_order() {
        let mut buf = Buffer::with_capacity(16);
        buf.append(b"0123456789");
        buf.retrieve(8);
        // Forces ensure_writable to grow past the small initial capacity.
        let big: Vec<u8> = (0..4096u32).map(|b| (b % 251) as u8).collect();
        buf.append(&big);
        let mut expected = b"89".to_vec();
        expected.extend_from_slice(&big);
        assert_eq!(buf.peek(), &expected[..]);
    }

    #[test]
    fn prepend_writes_just_before_readable_region() {
        let mut buf = Buffer::new();
        buf.append(b"body");
        buf.prepend(&8u32.to_le_bytes());
        assert_eq!(buf.readable(), 8);
        assert_eq!(&buf.peek()[4..], b"body");
    }

    #[test]
    fn compaction_reclaims_prepend_space_without_resizing() {
        let mut buf = Buffer::with_capacity(32);
        buf.append(&[1u8; 20]);
        buf.retrieve(20);
        // readable is now empty but writer sits near the end; ensure_writable should compact
        // back to offset 8 rather than growing, since writable + prependable >= needed + 8.
        buf.append(&[2u8; 20]);
        assert_eq!(buf.peek(), &[2u8; 20][..]);
    }
}
