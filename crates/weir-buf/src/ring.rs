use std::collections::VecDeque;

/// Fixed page size of the block chain.
pub const BLOCK_SIZE: usize = 4 * 1024;

struct Block {
    data: Box<[u8; BLOCK_SIZE]>,
    // Filled length. BLOCK_SIZE for naturally filled blocks, less when
    // the block was sealed early to keep a reserved span contiguous.
    // Only meaningful for blocks the tail has moved past.
    end: u32,
}

impl Block {
    fn fresh() -> Self {
        Self { data: Box::new([0u8; BLOCK_SIZE]), end: BLOCK_SIZE as u32 }
    }
}

/// Stream position inside a [`RingBuffer`]: block sequence number plus
/// an offset into that block. Sequence numbers grow monotonically for
/// the lifetime of the buffer, so a recorded position stays meaningful
/// (and checkable) after earlier blocks are freed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufPos {
    seq: u64,
    off: u32,
}

/// Block-linked byte FIFO.
///
/// A singly grown chain of 4 KiB pages with a head cursor (next byte
/// to read) and a tail cursor (next byte to write). Blocks are
/// allocated on demand at the tail and freed once the head has fully
/// traversed them; bytes are never reordered.
///
/// Besides plain write/read the buffer supports the zero-copy calls
/// the I/O paths need: `peek_head`/`commit_head` to drain without
/// copying, `peek_tail`/`commit_tail` to let a producer fill the
/// buffer in place, and `rewrite` to backfill a previously recorded
/// span (chunked-transfer size prefixes are patched this way once the
/// chunk body length is known).
#[derive(Default)]
pub struct RingBuffer {
    blocks: VecDeque<Block>,
    // Sequence number of blocks[0].
    base_seq: u64,
    head: BufPos,
    tail: BufPos,
    len: usize,
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("blocks", &self.blocks.len())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current tail position; valid as a `rewrite` target once bytes
    /// have been written past it.
    #[inline]
    pub fn tail_pos(&self) -> BufPos {
        self.tail
    }

    /// Drops all content and returns every block to the allocator.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.base_seq = 0;
        self.head = BufPos::default();
        self.tail = BufPos::default();
        self.len = 0;
    }

    /// Appends `bytes`, allocating blocks as needed. Never fails short
    /// of allocation failure.
    pub fn write(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            self.ensure_tail_room();
            let off = self.tail.off as usize;
            let n = bytes.len().min(BLOCK_SIZE - off);
            let idx = (self.tail.seq - self.base_seq) as usize;
            self.blocks[idx].data[off..off + n].copy_from_slice(&bytes[..n]);
            self.tail.off += n as u32;
            self.len += n;
            bytes = &bytes[n..];
        }
    }

    /// Contiguous readable view at the head, bounded by the current
    /// block. Empty slice when the buffer is empty.
    pub fn peek_head(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        let pos = self.canon(self.head);
        let idx = (pos.seq - self.base_seq) as usize;
        &self.blocks[idx].data[pos.off as usize..self.readable_end(pos.seq) as usize]
    }

    /// Advances the head cursor by `used` bytes and frees traversed
    /// blocks. `used` beyond the readable length is clamped.
    pub fn commit_head(&mut self, used: usize) {
        let mut used = used.min(self.len);
        self.len -= used;
        loop {
            self.head = self.canon(self.head);
            let end = self.readable_end(self.head.seq);
            let n = (used as u64).min((end - self.head.off) as u64) as u32;
            self.head.off += n;
            used -= n as usize;
            if used == 0 {
                break;
            }
        }
        self.head = self.canon(self.head);
        while self.base_seq < self.head.seq {
            self.blocks.pop_front();
            self.base_seq += 1;
        }
    }

    /// Copies up to `dst.len()` bytes out, advancing the head.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let view = self.peek_head();
            if view.is_empty() {
                break;
            }
            let n = view.len().min(dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&view[..n]);
            copied += n;
            self.commit_head(n);
        }
        copied
    }

    /// Reserves `reserved` bytes at the tail for later backfill and
    /// exposes up to `max` writable bytes directly after them in the
    /// same block. Returns the position of the reserved span (for
    /// `rewrite`) and the writable slice; the caller reports how much
    /// it wrote via `commit_tail`.
    ///
    /// The reserved span is guaranteed contiguous with the writable
    /// span. Its content is undefined until rewritten.
    pub fn peek_tail(&mut self, reserved: usize, max: usize) -> (BufPos, &mut [u8]) {
        assert!(reserved + 1 < BLOCK_SIZE, "reserved span must fit one block");
        self.ensure_tail_room();
        if BLOCK_SIZE - (self.tail.off as usize) < reserved + 1 {
            self.seal_tail_block();
            self.ensure_tail_room();
        }
        let pos = self.tail;
        self.tail.off += reserved as u32;
        self.len += reserved;

        let off = self.tail.off as usize;
        let end = (off + max).min(BLOCK_SIZE);
        let idx = (self.tail.seq - self.base_seq) as usize;
        (pos, &mut self.blocks[idx].data[off..end])
    }

    /// Accounts for `written` bytes placed in the slice returned by
    /// `peek_tail`.
    pub fn commit_tail(&mut self, written: usize) {
        weir_utils::soft_assert!(
            self.tail.off as usize + written <= BLOCK_SIZE,
            "commit beyond peeked block"
        );
        self.tail.off += written as u32;
        self.len += written;
    }

    /// Overwrites `bytes.len()` bytes starting at a previously recorded
    /// position without moving head or tail. Returns false when the
    /// span is no longer inside the buffered region.
    pub fn rewrite(&mut self, pos: BufPos, bytes: &[u8]) -> bool {
        if pos.seq < self.base_seq {
            return false;
        }
        let mut cur = self.canon(pos);
        if self.canon(self.head) > cur || self.pos_after(cur, bytes.len()).is_none() {
            return false;
        }
        let mut bytes = bytes;
        while !bytes.is_empty() {
            let idx = (cur.seq - self.base_seq) as usize;
            let off = cur.off as usize;
            let n = bytes.len().min(self.readable_end(cur.seq) as usize - off);
            self.blocks[idx].data[off..off + n].copy_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            cur.seq += 1;
            cur.off = 0;
        }
        true
    }

    /// Filled length of a block; the tail block fills up to the tail
    /// cursor.
    fn readable_end(&self, seq: u64) -> u32 {
        if seq == self.tail.seq {
            self.tail.off
        } else {
            self.blocks[(seq - self.base_seq) as usize].end
        }
    }

    /// Folds the (seq, end-of-block) representation of a position into
    /// (seq + 1, 0) so stream-equal positions compare equal.
    fn canon(&self, pos: BufPos) -> BufPos {
        if pos.seq < self.tail.seq && pos.off == self.readable_end(pos.seq) {
            BufPos { seq: pos.seq + 1, off: 0 }
        } else {
            pos
        }
    }

    /// Position `len` stream bytes after `pos`; None when that runs
    /// past the tail.
    fn pos_after(&self, mut pos: BufPos, len: usize) -> Option<BufPos> {
        let mut left = len as u64;
        loop {
            if pos.seq > self.tail.seq {
                return None;
            }
            let avail = (self.readable_end(pos.seq) - pos.off) as u64;
            if left <= avail {
                pos.off += left as u32;
                return Some(pos);
            }
            if pos.seq == self.tail.seq {
                return None;
            }
            left -= avail;
            pos.seq += 1;
            pos.off = 0;
        }
    }

    /// Guarantees the tail points at a block with at least one free
    /// byte.
    fn ensure_tail_room(&mut self) {
        if self.blocks.is_empty() {
            self.blocks.push_back(Block::fresh());
            self.base_seq = self.tail.seq;
        } else if self.tail.off as usize == BLOCK_SIZE {
            self.blocks.push_back(Block::fresh());
            self.tail.seq += 1;
            self.tail.off = 0;
        }
    }

    /// Closes the current tail block at its present fill so the next
    /// byte lands in a fresh block. The skipped capacity never enters
    /// the stream.
    fn seal_tail_block(&mut self) {
        let idx = (self.tail.seq - self.base_seq) as usize;
        self.blocks[idx].end = self.tail.off;
        self.blocks.push_back(Block::fresh());
        self.tail.seq += 1;
        self.tail.off = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_order() {
        let mut rb = RingBuffer::new();
        let chunks: Vec<Vec<u8>> = (0u8..50).map(|i| vec![i; (i as usize * 37) % 600 + 1]).collect();
        for c in &chunks {
            rb.write(c);
        }
        let expect: Vec<u8> = chunks.concat();
        assert_eq!(rb.len(), expect.len());

        let mut got = vec![0u8; expect.len()];
        assert_eq!(rb.read(&mut got), expect.len());
        assert_eq!(got, expect);
        assert!(rb.is_empty());
    }

    #[test]
    fn peek_head_never_exceeds_written() {
        let mut rb = RingBuffer::new();
        assert!(rb.peek_head().is_empty());
        rb.write(b"abc");
        assert_eq!(rb.peek_head(), b"abc");
        rb.commit_head(2);
        assert_eq!(rb.peek_head(), b"c");
        // Oversized commit clamps rather than underflowing.
        rb.commit_head(100);
        assert!(rb.peek_head().is_empty());
    }

    #[test]
    fn commit_head_frees_blocks() {
        let mut rb = RingBuffer::new();
        let payload = vec![7u8; BLOCK_SIZE * 3 + 10];
        rb.write(&payload);
        assert_eq!(rb.blocks.len(), 4);
        rb.commit_head(BLOCK_SIZE * 2);
        assert_eq!(rb.blocks.len(), 2);
        let mut rest = vec![0u8; BLOCK_SIZE + 10];
        assert_eq!(rb.read(&mut rest), rest.len());
        assert!(rest.iter().all(|&b| b == 7));
    }

    #[test]
    fn drain_and_refill_across_blocks() {
        let mut rb = RingBuffer::new();
        for round in 0..8u8 {
            let payload = vec![round; BLOCK_SIZE + 100];
            rb.write(&payload);
            let mut out = vec![0u8; payload.len()];
            assert_eq!(rb.read(&mut out), payload.len());
            assert_eq!(out, payload);
            assert!(rb.is_empty());
        }
    }

    #[test]
    fn rewrite_replaces_exact_span() {
        let mut rb = RingBuffer::new();
        rb.write(b"head-");
        let pos = rb.tail_pos();
        rb.write(b"xxxx");
        rb.write(b"-tail");
        assert!(rb.rewrite(pos, b"yyyy"));
        let mut out = vec![0u8; rb.len()];
        rb.read(&mut out);
        assert_eq!(out, b"head-yyyy-tail");
    }

    #[test]
    fn rewrite_spans_block_boundary() {
        let mut rb = RingBuffer::new();
        rb.write(&vec![0u8; BLOCK_SIZE - 2]);
        let pos = rb.tail_pos();
        rb.write(b"....");
        assert!(rb.rewrite(pos, b"abcd"));
        rb.commit_head(BLOCK_SIZE - 2);
        let mut out = vec![0u8; 4];
        rb.read(&mut out);
        assert_eq!(&out, b"abcd");
    }

    #[test]
    fn rewrite_rejects_out_of_range() {
        let mut rb = RingBuffer::new();
        rb.write(b"ab");
        let pos = rb.tail_pos();
        assert!(!rb.rewrite(pos, b"z"), "rewrite past tail must fail");
        rb.write(b"c");
        assert!(rb.rewrite(pos, b"z"));
        rb.commit_head(3);
        assert!(!rb.rewrite(pos, b"z"), "rewrite behind head must fail");
    }

    #[test]
    fn chunk_prefix_backfill() {
        let mut rb = RingBuffer::new();
        let pos = rb.tail_pos();
        rb.write(b"xxxx\r\n");
        rb.write(b"hello");
        assert!(rb.rewrite(pos, b"0005\r\n"));
        let mut out = vec![0u8; rb.len()];
        rb.read(&mut out);
        assert_eq!(out, b"0005\r\nhello");
    }

    #[test]
    fn peek_tail_reserves_contiguous_span() {
        let mut rb = RingBuffer::new();
        let (pos, space) = rb.peek_tail(6, 64);
        let n = 5;
        space[..n].copy_from_slice(b"hello");
        rb.commit_tail(n);
        rb.write(b"\r\n");
        assert!(rb.rewrite(pos, b"0005\r\n"));
        let mut out = vec![0u8; rb.len()];
        rb.read(&mut out);
        assert_eq!(out, b"0005\r\nhello\r\n");
    }

    #[test]
    fn peek_tail_starts_fresh_block_when_cramped() {
        let mut rb = RingBuffer::new();
        rb.write(&vec![1u8; BLOCK_SIZE - 3]);
        let before = rb.len();
        let (pos, space) = rb.peek_tail(6, 100);
        assert!(space.len() >= 94);
        space[0] = 9;
        rb.commit_tail(1);
        assert!(rb.rewrite(pos, b"abcdef"));
        assert_eq!(rb.len(), before + 7);
        // The pre-existing bytes drain first, then the reserved span;
        // the sealed slack in the first block never surfaces.
        let mut out = vec![0u8; rb.len()];
        rb.read(&mut out);
        assert!(out[..BLOCK_SIZE - 3].iter().all(|&b| b == 1));
        assert_eq!(&out[BLOCK_SIZE - 3..], b"abcdef\x09");
    }

    #[test]
    fn reset_clears_everything() {
        let mut rb = RingBuffer::new();
        rb.write(&vec![5u8; BLOCK_SIZE * 2]);
        rb.reset();
        assert!(rb.is_empty());
        assert!(rb.peek_head().is_empty());
        rb.write(b"ok");
        assert_eq!(rb.peek_head(), b"ok");
    }
}
