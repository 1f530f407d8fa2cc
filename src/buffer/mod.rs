//! Chunked streaming buffer.
//!
//! A [`Buffer`] is a FIFO byte stream laid out as a sequence of
//! fixed-size chunks. The producer always writes into the last chunk,
//! allocating a new one when it runs out of room; the consumer always
//! reads from the first chunk, and chunks are discarded as the read
//! cursor crosses them.
//!
//! ```text
//!          write cursor (first empty byte)
//!          v
//! AAAAA_AAA__
//! ^
//! read cursor (first unread byte)
//! ```
//!
//! The largest piece of data that can be written or read in one step is
//! one chunk. The buffer itself carries no synchronization; owners that
//! share one between threads scope every access under their own lock
//! (see `Connection`, which does exactly that for its output stream).

use std::collections::VecDeque;

/// Size of one chunk, and therefore the largest contiguous write.
pub const BLOCK_SIZE: usize = 4096;

struct Chunk {
    data: Box<[u8; BLOCK_SIZE]>,
    /// Number of bytes written into this chunk so far.
    fill: usize,
}

impl Chunk {
    fn new() -> Self {
        Self {
            data: Box::new([0; BLOCK_SIZE]),
            fill: 0,
        }
    }
}

/// A cursor into the chunk sequence: `(chunk index, byte offset)`.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Position {
    idx: usize,
    off: usize,
}

/// Chunked FIFO byte stream. See the [module docs](self).
pub struct Buffer {
    chunks: VecDeque<Chunk>,
    wpos: Position,
    rpos: Position,
}

impl Buffer {
    /// Creates an empty buffer with one chunk allocated.
    pub fn new() -> Self {
        let mut buffer = Self {
            chunks: VecDeque::new(),
            wpos: Position { idx: 0, off: 0 },
            rpos: Position { idx: 0, off: 0 },
        };
        buffer.wpos = buffer.add_chunk();
        buffer.rpos = buffer.wpos;
        buffer
    }

    //
    // Writing support
    //

    /// Ensures at least `bytes` of contiguous room in the current write
    /// chunk, allocating a fresh chunk if needed. Returns `false` iff
    /// `bytes` exceeds [`BLOCK_SIZE`].
    ///
    /// If the buffer was fully consumed, skipping to a fresh chunk also
    /// reclaims the exhausted one.
    pub fn reserve(&mut self, bytes: usize) -> bool {
        if bytes > BLOCK_SIZE {
            return false;
        }

        if BLOCK_SIZE - self.wpos.off >= bytes {
            return true;
        }

        // The read cursor follows the writer onto the fresh chunk when
        // everything before it was already consumed.
        let caught_up = self.rpos == self.wpos;

        self.wpos = self.add_chunk();
        if caught_up {
            self.rpos = self.wpos;
            self.drop_chunks(1);
        }

        true
    }

    /// Bytes of room left in the current write chunk.
    pub fn write_size(&self) -> usize {
        BLOCK_SIZE - self.wpos.off
    }

    /// The writable area of the current chunk ([`write_size`] bytes).
    ///
    /// [`write_size`]: Self::write_size
    pub fn write_slice(&mut self) -> &mut [u8] {
        let Position { idx, off } = self.wpos;
        &mut self.chunks[idx].data[off..]
    }

    /// Commits `bytes` written through [`write_slice`]. Returns `false`
    /// when `bytes` is zero or exceeds the current chunk's room.
    ///
    /// [`write_slice`]: Self::write_slice
    pub fn advance(&mut self, bytes: usize) -> bool {
        if bytes == 0 || bytes > self.write_size() {
            return false;
        }

        self.chunks[self.wpos.idx].fill += bytes;
        self.wpos.off += bytes;
        true
    }

    /// Appends `data`, allocating as many chunks as needed.
    pub fn write(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.write_size();
            let piece = data.len().min(room);

            let Position { idx, off } = self.wpos;
            self.chunks[idx].data[off..off + piece].copy_from_slice(&data[..piece]);
            self.chunks[idx].fill += piece;
            self.wpos.off += piece;

            data = &data[piece..];
            if !data.is_empty() || self.wpos.off == BLOCK_SIZE {
                self.wpos = self.add_chunk();
            }
        }
    }

    /// Moves every chunk of `other` into `self`, leaving `other` empty
    /// and reusable.
    ///
    /// # Panics
    ///
    /// Panics if `other` has ever been consumed; only a pristine source
    /// still owns its full stream.
    pub fn append_from(&mut self, other: &mut Buffer) {
        assert!(
            !other.is_consumed(),
            "cannot append from a consumed buffer"
        );

        if other.read_size() == 0 {
            return;
        }

        // Never splice an empty chunk into the middle of the stream.
        let spare = self.maybe_remove_last_chunk();
        let other_spare = other.maybe_remove_last_chunk();

        while let Some(chunk) = other.chunks.pop_front() {
            self.chunks.push_back(chunk);
        }

        // Land the write cursor on writable room: reuse the spare chunk
        // when the stream now ends on a chunk boundary.
        if self.chunks.back().map_or(true, |c| c.fill == BLOCK_SIZE) {
            match spare {
                Some(chunk) => self.chunks.push_back(chunk),
                None => {
                    self.add_chunk();
                }
            }
        }

        self.wpos = Position {
            idx: self.chunks.len() - 1,
            off: self.chunks[self.chunks.len() - 1].fill,
        };

        // The read cursor may have been parked at the end of its chunk.
        if self.rpos.off == self.chunks[self.rpos.idx].fill && self.rpos.idx < self.wpos.idx {
            self.rpos.idx += 1;
            self.rpos.off = 0;
        }

        match other_spare {
            Some(chunk) => other.chunks.push_back(chunk),
            None => {
                other.add_chunk();
            }
        }
        other.wpos = Position { idx: 0, off: 0 };
        other.rpos = other.wpos;
    }

    /// Copies the live span of `other` into `self`; `other` is left
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if `other` has ever been consumed.
    pub fn copy_from(&mut self, other: &Buffer) {
        assert!(!other.is_consumed(), "cannot copy from a consumed buffer");

        if other.read_size() == 0 {
            return;
        }

        for (i, chunk) in other.chunks.iter().enumerate() {
            let len = chunk.fill;
            // The first source chunk may fit in the current write chunk;
            // every later one starts fresh.
            if i != 0 || len > self.write_size() {
                self.wpos = self.add_chunk();
            }

            let Position { idx, off } = self.wpos;
            self.chunks[idx].data[off..off + len].copy_from_slice(&chunk.data[..len]);
            self.chunks[idx].fill += len;
            self.wpos.off += len;
        }

        if self.wpos.off == BLOCK_SIZE {
            self.wpos = self.add_chunk();
        }
    }

    //
    // Reading support
    //

    /// Bytes readable from the current chunk without crossing into the
    /// next one.
    pub fn read_size(&self) -> usize {
        self.chunks[self.rpos.idx].fill - self.rpos.off
    }

    /// The readable area of the current chunk ([`read_size`] bytes).
    ///
    /// [`read_size`]: Self::read_size
    pub fn read_slice(&self) -> &[u8] {
        let chunk = &self.chunks[self.rpos.idx];
        &chunk.data[self.rpos.off..chunk.fill]
    }

    /// Advances the read cursor by `bytes`, dropping every chunk it
    /// fully crosses.
    pub fn consume(&mut self, mut bytes: usize) {
        let mut exhausted = 0;

        while bytes > 0 && self.rpos.idx < self.wpos.idx {
            let piece = bytes.min(self.read_size());
            bytes -= piece;
            self.rpos.off += piece;

            if self.read_size() == 0 {
                exhausted += 1;
                self.rpos.idx += 1;
                self.rpos.off = 0;
            }
        }

        // The write chunk itself is consumed in place, never dropped.
        if bytes > 0 {
            let piece = bytes.min(self.read_size());
            self.rpos.off += piece;
        }

        self.drop_chunks(exhausted);
    }

    //
    // Accessors
    //

    /// Total unread bytes across all chunks.
    pub fn byte_count(&self) -> usize {
        self.read_size()
            + self
                .chunks
                .iter()
                .skip(self.rpos.idx + 1)
                .map(|c| c.fill)
                .sum::<usize>()
    }

    /// Number of chunks currently allocated.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Forward-only view over the unread bytes. Never consumes.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    //
    // Chunk manipulation
    //

    fn add_chunk(&mut self) -> Position {
        self.chunks.push_back(Chunk::new());
        Position {
            idx: self.chunks.len() - 1,
            off: 0,
        }
    }

    fn drop_chunks(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.wpos.idx -= n;
        self.rpos.idx -= n;
        for _ in 0..n {
            self.chunks.pop_front();
        }
    }

    /// Pops the write chunk when it is still empty; the caller must
    /// repair `wpos` afterwards.
    fn maybe_remove_last_chunk(&mut self) -> Option<Chunk> {
        if self.chunks[self.wpos.idx].fill == 0 {
            self.chunks.pop_back()
        } else {
            None
        }
    }

    fn is_consumed(&self) -> bool {
        self.rpos != (Position { idx: 0, off: 0 })
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward-only iterator that peeks at buffer content as if it were
/// contiguous.
///
/// The iterator keeps a budget of positions certainly left in the
/// current chunk so the common advance is a couple of increments; the
/// slow path runs only on chunk crossings.
pub struct Iter<'a> {
    buffer: &'a Buffer,
    pos: Position,
    bytes_read: usize,
    bytes_total: usize,
    budget: usize,
}

impl<'a> Iter<'a> {
    fn new(buffer: &'a Buffer) -> Self {
        let pos = buffer.rpos;
        Self {
            buffer,
            pos,
            bytes_read: 0,
            bytes_total: buffer.byte_count(),
            budget: buffer.chunks[pos.idx].fill - pos.off,
        }
    }

    /// True when no byte is left to peek at.
    pub fn eob(&self) -> bool {
        if self.budget > 0 {
            return false;
        }
        self.pos == self.buffer.wpos
    }

    /// The byte under the cursor. Call only when `!eob()`.
    pub fn peek(&self) -> u8 {
        self.buffer.chunks[self.pos.idx].data[self.pos.off]
    }

    /// Moves the cursor one byte forward.
    pub fn next(&mut self) {
        // Fast path: certainly more content in this chunk.
        if self.budget > 1 {
            self.budget -= 1;
            self.pos.off += 1;
            self.bytes_read += 1;
            return;
        }

        self.slow_next();
    }

    fn slow_next(&mut self) {
        let fill = self.buffer.chunks[self.pos.idx].fill;
        if self.pos.off < fill {
            self.pos.off += 1;
            self.bytes_read += 1;

            // Fell off the chunk; slide to the next one if there is one.
            if self.pos.off == self.buffer.chunks[self.pos.idx].fill
                && self.pos.idx < self.buffer.wpos.idx
            {
                self.pos.idx += 1;
                self.pos.off = 0;
            }

            self.budget = self.buffer.chunks[self.pos.idx].fill - self.pos.off;
        }
    }

    /// Bytes the cursor has moved past so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Unread bytes in the buffer when the iterator was created.
    pub fn bytes_total(&self) -> usize {
        self.bytes_total
    }
}
