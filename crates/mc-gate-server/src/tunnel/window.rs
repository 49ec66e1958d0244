//! Fixed-capacity receive buffer with `parsed` and `filled` cursors.
//!
//! `[0, parsed)` holds whole packets ready to relay, `[parsed, filled)` is
//! the tail still waiting for the rest of its packet. Cursors only move
//! across packet boundaries, so a flush never cuts a packet in half.

pub struct ByteWindow {
    buf: Box<[u8]>,
    parsed: usize,
    filled: usize,
}

impl ByteWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            parsed: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn parsed(&self) -> usize {
        self.parsed
    }

    #[cfg(test)]
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Free space after `filled`, for the next socket read.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Record `n` freshly read bytes.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.filled + n <= self.buf.len());
        self.filled += n;
    }

    pub fn unparsed(&self) -> &[u8] {
        &self.buf[self.parsed..self.filled]
    }

    pub fn has_unparsed(&self) -> bool {
        self.parsed < self.filled
    }

    /// Mark the next `n` unparsed bytes as one complete packet.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.parsed + n <= self.filled);
        self.parsed += n;
    }

    /// Drop the packet spanning `[start, parsed)` by sliding the unparsed
    /// tail over it.
    pub fn redact(&mut self, start: usize) {
        debug_assert!(start <= self.parsed);
        let removed = self.parsed - start;
        self.buf.copy_within(self.parsed..self.filled, start);
        self.parsed -= removed;
        self.filled -= removed;
    }

    /// Swap the packet spanning `[start, parsed)` for `packet`. Returns false,
    /// leaving the window untouched, when the result would not fit.
    pub fn replace(&mut self, start: usize, packet: &[u8]) -> bool {
        debug_assert!(start <= self.parsed);
        let old_len = self.parsed - start;
        let new_filled = self.filled - old_len + packet.len();
        if new_filled > self.buf.len() {
            return false;
        }
        let new_parsed = start + packet.len();
        self.buf.copy_within(self.parsed..self.filled, new_parsed);
        self.buf[start..new_parsed].copy_from_slice(packet);
        self.parsed = new_parsed;
        self.filled = new_filled;
        true
    }

    /// Whole packets ready to be written to the peer.
    pub fn flushable(&self) -> &[u8] {
        &self.buf[..self.parsed]
    }

    /// Forget the flushed prefix and move the tail to the front.
    pub fn compact(&mut self) {
        if self.parsed == 0 {
            return;
        }
        self.buf.copy_within(self.parsed..self.filled, 0);
        self.filled -= self.parsed;
        self.parsed = 0;
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.buf.len()
    }
}
