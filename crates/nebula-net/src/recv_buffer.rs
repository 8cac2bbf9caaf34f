//! Per-session receive buffer with separate read and write cursors.
//!
//! ```text
//! 0          read_pos          write_pos            capacity
//! |  consumed  |  unread data    |  free space          |
//! ```
//!
//! The socket writes into `[write_pos, capacity)`, the framing layer reads
//! from `[read_pos, write_pos)`. [`RecvBuffer::compact`] moves the unread tail
//! back to offset 0 so the free region stays as large as possible. The
//! capacity is fixed at construction.

/// Growable-cursor, fixed-capacity byte buffer for one connection.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl RecvBuffer {
    /// Create an empty buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written but not yet consumed.
    pub fn data_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Bytes available after the write cursor.
    pub fn free_size(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    /// The unread region `[read_pos, write_pos)`.
    pub fn read_segment(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    /// The writable region `[write_pos, capacity)`.
    pub fn write_segment(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_pos..]
    }

    /// Advance the read cursor after `n` bytes were consumed.
    ///
    /// Returns `false` and leaves the cursor untouched if `n` exceeds the
    /// unread data.
    pub fn on_read(&mut self, n: usize) -> bool {
        if n > self.data_size() {
            return false;
        }
        self.read_pos += n;
        true
    }

    /// Advance the write cursor after `n` bytes were filled in.
    ///
    /// Returns `false` and leaves the cursor untouched if `n` exceeds the
    /// free space.
    pub fn on_write(&mut self, n: usize) -> bool {
        if n > self.free_size() {
            return false;
        }
        self.write_pos += n;
        true
    }

    /// Move unread data to the front of the buffer.
    ///
    /// With nothing left to read both cursors simply reset to 0.
    pub fn compact(&mut self) {
        let data_size = self.data_size();
        if data_size == 0 {
            self.read_pos = 0;
            self.write_pos = 0;
            return;
        }
        if self.read_pos == 0 {
            return;
        }
        self.buf.copy_within(self.read_pos..self.write_pos, 0);
        self.read_pos = 0;
        self.write_pos = data_size;
    }
}
