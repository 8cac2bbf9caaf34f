//! Chunked send-buffer allocator.
//!
//! Outbound packets are serialized straight into a large shared chunk:
//!
//! 1. [`SendBufferAllocator::open`] reserves an upper bound at the chunk's
//!    current offset and hands back a writable slice;
//! 2. the serializer fills a prefix of it;
//! 3. [`SendBufferAllocator::close`] splits the written prefix off as an
//!    immutable, reference-counted [`Bytes`] segment.
//!
//! Segments never return to the chunk. When a reservation no longer fits, the
//! allocator moves on to a fresh chunk and the old allocation lives exactly as
//! long as the last segment still pointing into it (for example a broadcast
//! queued on many sessions).
//!
//! One allocator belongs to one execution context (a room, a task, a worker);
//! it is `Send` but deliberately not shared.

use bytes::{Bytes, BytesMut};

use crate::error::SendBufferError;

/// Bump allocator carving outbound segments out of fixed-size chunks.
#[derive(Debug)]
pub struct SendBufferAllocator {
    chunk_size: usize,
    /// Unused tail of the current chunk.
    chunk: Option<BytesMut>,
    reserved: Option<usize>,
    chunks_allocated: u64,
}

impl SendBufferAllocator {
    /// Default chunk size: 4096 * 100 bytes.
    pub const DEFAULT_CHUNK_SIZE: usize = 4096 * 100;

    /// Create an allocator with [`Self::DEFAULT_CHUNK_SIZE`] chunks.
    pub fn new() -> Self {
        Self::with_chunk_size(Self::DEFAULT_CHUNK_SIZE)
    }

    /// Create an allocator with chunks of `chunk_size` bytes.
    ///
    /// No memory is allocated until the first [`open`](Self::open).
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk: None,
            reserved: None,
            chunks_allocated: 0,
        }
    }

    /// Size of every chunk this allocator creates.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes already handed out from the current chunk.
    pub fn used_size(&self) -> usize {
        self.chunk
            .as_ref()
            .map_or(0, |chunk| self.chunk_size - chunk.len())
    }

    /// Bytes still available in the current chunk.
    pub fn free_size(&self) -> usize {
        self.chunk.as_ref().map_or(0, BytesMut::len)
    }

    /// Number of chunks allocated over this allocator's lifetime.
    pub fn chunks_allocated(&self) -> u64 {
        self.chunks_allocated
    }

    /// Reserve `reserve_size` bytes and return the writable region.
    ///
    /// Starts a new chunk when none is held or the current one cannot fit the
    /// reservation. A reservation larger than a whole chunk is a capacity
    /// fault.
    pub fn open(&mut self, reserve_size: usize) -> Result<&mut [u8], SendBufferError> {
        if reserve_size > self.chunk_size {
            return Err(SendBufferError::ReserveTooLarge {
                requested: reserve_size,
                chunk_size: self.chunk_size,
            });
        }

        if self.free_size() < reserve_size || self.chunk.is_none() {
            tracing::trace!(
                chunk_size = self.chunk_size,
                abandoned_free = self.free_size(),
                "starting new send chunk"
            );
            self.chunk = Some(BytesMut::zeroed(self.chunk_size));
            self.chunks_allocated += 1;
        }

        self.reserved = Some(reserve_size);
        match self.chunk.as_mut() {
            Some(chunk) => Ok(&mut chunk[..reserve_size]),
            None => Err(SendBufferError::NotOpen),
        }
    }

    /// Commit `used_size` bytes of the open reservation as a segment.
    pub fn close(&mut self, used_size: usize) -> Result<Bytes, SendBufferError> {
        let reserved = self.reserved.ok_or(SendBufferError::NotOpen)?;
        if used_size > reserved {
            return Err(SendBufferError::CloseExceedsReserve {
                used: used_size,
                reserved,
            });
        }
        let chunk = self.chunk.as_mut().ok_or(SendBufferError::NotOpen)?;
        self.reserved = None;
        Ok(chunk.split_to(used_size).freeze())
    }
}

impl Default for SendBufferAllocator {
    fn default() -> Self {
        Self::new()
    }
}
