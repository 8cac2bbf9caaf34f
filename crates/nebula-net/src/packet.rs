//! Packet contract and little-endian field codecs.
//!
//! A packet type knows its protocol id, how to decode itself from one
//! complete frame, and how to encode itself into a send chunk. Field layout
//! follows the wire conventions used by every message:
//!
//! - integers and floats: little-endian, fixed width;
//! - strings: `u16` byte length followed by UTF-8 bytes;
//! - lists: `u16` element count followed by the elements.

use bytes::Bytes;

use crate::error::PacketError;
use crate::framing::{FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE};
use crate::send_buffer::SendBufferAllocator;

/// Upper bound reserved for a single packet when encoding.
pub const DEFAULT_RESERVE: usize = 4096;

/// A message type that travels in one frame.
pub trait Packet: Sized {
    /// Protocol id written into the frame header.
    const PROTOCOL: u16;

    /// Decode the packet from a complete frame, header included.
    fn read(frame: &[u8]) -> Result<Self, PacketError>;

    /// Encode the packet into a segment carved from `alloc`.
    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError>;
}

/// Encode one frame with protocol id `protocol` into `alloc`.
///
/// Reserves `reserve` bytes, lets `body` write the fields after the header,
/// back-patches the length and commits exactly the bytes written.
pub fn encode_frame(
    alloc: &mut SendBufferAllocator,
    protocol: u16,
    reserve: usize,
    body: impl FnOnce(&mut PacketWriter<'_>) -> Result<(), PacketError>,
) -> Result<Bytes, PacketError> {
    let region = alloc.open(reserve.min(MAX_FRAME_SIZE))?;
    let mut writer = PacketWriter::new(region, protocol)?;
    body(&mut writer)?;
    let used = writer.finish()?;
    Ok(alloc.close(used)?)
}

/// Bounds-checked field writer over a reserved region.
pub struct PacketWriter<'a> {
    buf: &'a mut [u8],
    protocol: u16,
    pos: usize,
}

impl<'a> PacketWriter<'a> {
    /// Start a frame in `buf`, leaving room for the header.
    pub fn new(buf: &'a mut [u8], protocol: u16) -> Result<Self, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::Overflow {
                needed: HEADER_SIZE,
                remaining: buf.len(),
            });
        }
        Ok(Self {
            buf,
            protocol,
            pos: HEADER_SIZE,
        })
    }

    /// Bytes written so far, header included.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Whether only the header has been accounted for.
    pub fn is_empty(&self) -> bool {
        self.pos == HEADER_SIZE
    }

    fn take(&mut self, n: usize) -> Result<&mut [u8], PacketError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(PacketError::Overflow {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&mut self.buf[start..self.pos])
    }

    /// Write raw bytes without a length prefix.
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        self.take(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Write a `u8`.
    pub fn put_u8(&mut self, v: u8) -> Result<(), PacketError> {
        self.put_slice(&[v])
    }

    /// Write a `bool` as one byte.
    pub fn put_bool(&mut self, v: bool) -> Result<(), PacketError> {
        self.put_u8(u8::from(v))
    }

    /// Write a little-endian `u16`.
    pub fn put_u16(&mut self, v: u16) -> Result<(), PacketError> {
        self.put_slice(&v.to_le_bytes())
    }

    /// Write a little-endian `i32`.
    pub fn put_i32(&mut self, v: i32) -> Result<(), PacketError> {
        self.put_slice(&v.to_le_bytes())
    }

    /// Write a little-endian `u32`.
    pub fn put_u32(&mut self, v: u32) -> Result<(), PacketError> {
        self.put_slice(&v.to_le_bytes())
    }

    /// Write a little-endian `i64`.
    pub fn put_i64(&mut self, v: i64) -> Result<(), PacketError> {
        self.put_slice(&v.to_le_bytes())
    }

    /// Write a little-endian `u64`.
    pub fn put_u64(&mut self, v: u64) -> Result<(), PacketError> {
        self.put_slice(&v.to_le_bytes())
    }

    /// Write a little-endian `f32`.
    pub fn put_f32(&mut self, v: f32) -> Result<(), PacketError> {
        self.put_slice(&v.to_le_bytes())
    }

    /// Write a string as `u16` byte length + UTF-8 bytes.
    pub fn put_str(&mut self, s: &str) -> Result<(), PacketError> {
        self.put_len(s.len())?;
        self.put_slice(s.as_bytes())
    }

    /// Write a `u16` length or element-count prefix.
    pub fn put_len(&mut self, len: usize) -> Result<(), PacketError> {
        let len = u16::try_from(len).map_err(|_| PacketError::FieldTooLong(len))?;
        self.put_u16(len)
    }

    /// Write the header and return the total frame length.
    pub fn finish(mut self) -> Result<usize, PacketError> {
        let size = u16::try_from(self.pos).map_err(|_| PacketError::FieldTooLong(self.pos))?;
        let mut header = [0u8; HEADER_SIZE];
        FrameHeader {
            size,
            protocol: self.protocol,
        }
        .encode(&mut header);
        self.buf[..HEADER_SIZE].copy_from_slice(&header);
        Ok(self.pos)
    }
}

/// Cursor over one frame, positioned after the header.
pub struct PacketReader<'a> {
    frame: &'a [u8],
    header: FrameHeader,
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Validate the header of `frame` against `protocol` and its own length.
    pub fn new(frame: &'a [u8], protocol: u16) -> Result<Self, PacketError> {
        let header = FrameHeader::parse(frame).ok_or(PacketError::Truncated {
            needed: HEADER_SIZE,
            remaining: frame.len(),
        })?;
        if usize::from(header.size) != frame.len() {
            return Err(PacketError::LengthMismatch {
                declared: header.size,
                actual: frame.len(),
            });
        }
        if header.protocol != protocol {
            return Err(PacketError::ProtocolMismatch {
                expected: protocol,
                found: header.protocol,
            });
        }
        Ok(Self {
            frame,
            header,
            pos: HEADER_SIZE,
        })
    }

    /// The frame header.
    pub fn header(&self) -> FrameHeader {
        self.header
    }

    /// Unread bytes left in the frame.
    pub fn remaining(&self) -> usize {
        self.frame.len() - self.pos
    }

    /// End decoding; fails if any bytes of the frame were left unread.
    pub fn finish(self) -> Result<(), PacketError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(PacketError::TrailingBytes { remaining }),
        }
    }

    /// Read `n` raw bytes.
    pub fn get_slice(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(PacketError::Truncated {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.frame[start..self.pos])
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.get_slice(N)?);
        Ok(out)
    }

    /// Read a `u8`.
    pub fn get_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.get_array::<1>()?[0])
    }

    /// Read a one-byte `bool`; any non-zero value is `true`.
    pub fn get_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.get_u8()? != 0)
    }

    /// Read a little-endian `u16`.
    pub fn get_u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_le_bytes(self.get_array()?))
    }

    /// Read a little-endian `i32`.
    pub fn get_i32(&mut self) -> Result<i32, PacketError> {
        Ok(i32::from_le_bytes(self.get_array()?))
    }

    /// Read a little-endian `u32`.
    pub fn get_u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_le_bytes(self.get_array()?))
    }

    /// Read a little-endian `i64`.
    pub fn get_i64(&mut self) -> Result<i64, PacketError> {
        Ok(i64::from_le_bytes(self.get_array()?))
    }

    /// Read a little-endian `u64`.
    pub fn get_u64(&mut self) -> Result<u64, PacketError> {
        Ok(u64::from_le_bytes(self.get_array()?))
    }

    /// Read a little-endian `f32`.
    pub fn get_f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_le_bytes(self.get_array()?))
    }

    /// Read a `u16` length or element-count prefix.
    pub fn get_len(&mut self) -> Result<usize, PacketError> {
        Ok(usize::from(self.get_u16()?))
    }

    /// Read a `u16`-length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String, PacketError> {
        let len = self.get_len()?;
        let bytes = self.get_slice(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| PacketError::InvalidUtf8)
    }
}
