//! Length-prefixed framing over a streaming receive window.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! +-------------------+-------------------+--------------------------+
//! | length (2 bytes)  | protocol (2 bytes)| payload (length-4 bytes) |
//! | u16 little-endian | u16 little-endian |                          |
//! +-------------------+-------------------+--------------------------+
//! ```
//!
//! `length` counts the whole frame including its own header. The framer only
//! trusts it for slicing; whether the payload makes sense is decided by the
//! packet decoder.

use crate::error::FrameError;

/// Size of the frame header: 2-byte length + 2-byte protocol id.
pub const HEADER_SIZE: usize = 4;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Configuration for the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum accepted frame size in bytes, header included. Default: 65535.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared total frame length, header included.
    pub size: u16,
    /// Protocol id of the message carried by the frame.
    pub protocol: u16,
}

impl FrameHeader {
    /// Parse a header from the start of `bytes`, or `None` if fewer than
    /// [`HEADER_SIZE`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            size: u16::from_le_bytes([bytes[0], bytes[1]]),
            protocol: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }

    /// Encode this header into the first [`HEADER_SIZE`] bytes of `out`.
    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out[..2].copy_from_slice(&self.size.to_le_bytes());
        out[2..].copy_from_slice(&self.protocol.to_le_bytes());
    }
}

/// Slice every complete frame out of `window`, in order.
///
/// `on_frame` receives each frame as the exact `[0, length)` slice, header
/// included, and may fail to abort slicing. Returns the number of bytes
/// covered by complete frames; a trailing partial frame is left for the next
/// call.
///
/// A declared length below [`HEADER_SIZE`] or above `config.max_frame_size`
/// is a protocol fault.
pub fn slice_frames<E>(
    window: &[u8],
    config: &FrameConfig,
    mut on_frame: impl FnMut(&[u8]) -> Result<(), E>,
) -> Result<usize, E>
where
    E: From<FrameError>,
{
    let mut consumed = 0;

    loop {
        let rest = &window[consumed..];

        let Some(header) = FrameHeader::parse(rest) else {
            break;
        };

        let declared = usize::from(header.size);
        if declared < HEADER_SIZE {
            return Err(FrameError::LengthTooSmall {
                declared: header.size,
            }
            .into());
        }
        if declared > config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                declared: header.size,
                max: config.max_frame_size,
            }
            .into());
        }

        if rest.len() < declared {
            break;
        }

        on_frame(&rest[..declared])?;
        consumed += declared;
    }

    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(protocol: u16, payload: &[u8]) -> Vec<u8> {
        let size = (HEADER_SIZE + payload.len()) as u16;
        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&protocol.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn collect(window: &[u8], config: &FrameConfig) -> Result<(usize, Vec<Vec<u8>>), FrameError> {
        let mut frames = Vec::new();
        let consumed = slice_frames(window, config, |f| {
            frames.push(f.to_vec());
            Ok::<(), FrameError>(())
        })?;
        Ok((consumed, frames))
    }

    #[test]
    fn test_header_is_little_endian() {
        let header = FrameHeader::parse(&[0x0E, 0x00, 0x05, 0x00]).unwrap();
        assert_eq!(header, FrameHeader { size: 14, protocol: 5 });

        let mut out = [0u8; HEADER_SIZE];
        header.encode(&mut out);
        assert_eq!(out, [0x0E, 0x00, 0x05, 0x00]);
    }

    #[test]
    fn test_need_header_consumes_nothing() {
        let config = FrameConfig::default();
        let (consumed, frames) = collect(&[0x0E, 0x00], &config).unwrap();
        assert_eq!(consumed, 0);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_need_body_consumes_nothing() {
        let config = FrameConfig::default();
        let full = frame(5, &[1; 10]);
        let (consumed, frames) = collect(&full[..9], &config).unwrap();
        assert_eq!(consumed, 0);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_window() {
        let config = FrameConfig::default();
        let one = frame(5, &[7; 10]);
        assert_eq!(one.len(), 14);
        let mut window = one.clone();
        window.extend_from_slice(&one);

        let (consumed, frames) = collect(&window, &config).unwrap();
        assert_eq!(consumed, 28);
        assert_eq!(frames, vec![one.clone(), one]);
    }

    #[test]
    fn test_trailing_partial_frame_left_unconsumed() {
        let config = FrameConfig::default();
        let mut window = frame(1, b"abc");
        window.extend_from_slice(&frame(2, b"defgh")[..5]);

        let (consumed, frames) = collect(&window, &config).unwrap();
        assert_eq!(consumed, 7);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_header_only_frame_is_valid() {
        let config = FrameConfig::default();
        let (consumed, frames) = collect(&frame(9, &[]), &config).unwrap();
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_length_smaller_than_header_rejected() {
        let config = FrameConfig::default();
        let result = collect(&[0x03, 0x00, 0x01, 0x00], &config);
        assert_eq!(result.err(), Some(FrameError::LengthTooSmall { declared: 3 }));
    }

    #[test]
    fn test_oversized_frame_rejected_before_body_arrives() {
        let config = FrameConfig { max_frame_size: 16 };
        let result = collect(&[0x00, 0x04, 0x01, 0x00], &config);
        assert_eq!(
            result.err(),
            Some(FrameError::FrameTooLarge {
                declared: 1024,
                max: 16
            })
        );
    }

    #[test]
    fn test_split_invariance_over_every_split_point() {
        let config = FrameConfig::default();
        let mut stream = Vec::new();
        for (i, payload) in [&b"first"[..], b"", b"second frame", b"3"].iter().enumerate() {
            stream.extend_from_slice(&frame(i as u16, payload));
        }
        let (_, expected) = collect(&stream, &config).unwrap();
        assert_eq!(expected.len(), 4);

        for split in 0..=stream.len() {
            for second_split in split..=stream.len() {
                let chunks = [
                    &stream[..split],
                    &stream[split..second_split],
                    &stream[second_split..],
                ];
                let mut pending = Vec::new();
                let mut delivered = Vec::new();
                for chunk in chunks {
                    pending.extend_from_slice(chunk);
                    let (consumed, frames) = collect(&pending, &config).unwrap();
                    pending.drain(..consumed);
                    delivered.extend(frames);
                }
                assert!(pending.is_empty(), "split at {split}/{second_split}");
                assert_eq!(delivered, expected, "split at {split}/{second_split}");
            }
        }
    }

    #[test]
    fn test_callback_error_stops_slicing() {
        let config = FrameConfig::default();
        let mut window = frame(1, b"a");
        window.extend_from_slice(&frame(2, b"b"));
        let mut seen = 0;
        let result = slice_frames(&window, &config, |_| {
            seen += 1;
            Err(FrameError::LengthTooSmall { declared: 0 })
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }
}
