use std::net::SocketAddr;

/// Reusable I/O descriptor payload: a fixed-capacity byte block, the
/// filled length, a cursor for partially consumed writes, and the
/// remote address for datagram traffic.
///
/// Buffers travel by value between handles (a proxy forwards the read
/// descriptor of one side as the write descriptor of the other), so
/// payload bytes are moved, never copied.
#[derive(Debug)]
pub struct IoBuf {
    data: Box<[u8]>,
    used: usize,
    start: usize,
    pub peer: Option<SocketAddr>,
}

impl IoBuf {
    pub fn with_capacity(cap: usize) -> Self {
        Self { data: vec![0u8; cap].into_boxed_slice(), used: 0, start: 0, peer: None }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::with_capacity(bytes.len());
        buf.data.copy_from_slice(bytes);
        buf.used = bytes.len();
        buf
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Unconsumed payload bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.start..self.used]
    }

    #[inline]
    pub fn is_drained(&self) -> bool {
        self.start >= self.used
    }

    /// Whole writable storage, for filling by a read.
    #[inline]
    pub fn space(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Marks `n` bytes as filled and rewinds the consume cursor.
    #[inline]
    pub fn set_filled(&mut self, n: usize) {
        weir_utils::soft_assert!(n <= self.data.len());
        self.used = n.min(self.data.len());
        self.start = 0;
    }

    /// Consumes `n` payload bytes from the front.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.used);
    }

    /// Clears the buffer for reuse.
    #[inline]
    pub fn recycle(&mut self) {
        self.used = 0;
        self.start = 0;
        self.peer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_consume_cycle() {
        let mut buf = IoBuf::with_capacity(8);
        buf.space()[..5].copy_from_slice(b"hello");
        buf.set_filled(5);
        assert_eq!(buf.bytes(), b"hello");
        buf.consume(2);
        assert_eq!(buf.bytes(), b"llo");
        buf.consume(10);
        assert!(buf.is_drained());
        buf.recycle();
        assert_eq!(buf.bytes(), b"");
    }
}
