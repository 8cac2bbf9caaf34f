//! Error types shared across the connection engine.
//!
//! Socket and protocol faults are terminal for a session and end up in
//! [`Session::disconnect`](crate::Session::disconnect); capacity faults are
//! returned to the caller.

/// Errors produced while slicing frames out of a receive window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The declared frame length is smaller than the frame header itself.
    #[error("declared frame length {declared} is smaller than the 4-byte header")]
    LengthTooSmall {
        /// Length read from the frame header.
        declared: u16,
    },

    /// The declared frame length exceeds the configured maximum.
    #[error("declared frame length {declared} exceeds maximum {max}")]
    FrameTooLarge {
        /// Length read from the frame header.
        declared: u16,
        /// The effective maximum frame size.
        max: usize,
    },
}

/// Errors produced by the send-chunk allocator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendBufferError {
    /// The reservation can never fit, even in a fresh chunk.
    #[error("reservation of {requested} bytes exceeds chunk size {chunk_size}")]
    ReserveTooLarge {
        /// Bytes requested by `open`.
        requested: usize,
        /// Capacity of a single chunk.
        chunk_size: usize,
    },

    /// `close` was called without a preceding `open`.
    #[error("close called without an open reservation")]
    NotOpen,

    /// `close` reported more bytes than were reserved.
    #[error("closed {used} bytes but only {reserved} were reserved")]
    CloseExceedsReserve {
        /// Bytes reported by `close`.
        used: usize,
        /// Bytes reserved by the matching `open`.
        reserved: usize,
    },
}

/// Errors produced while encoding or decoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The frame ended before a field could be read.
    #[error("frame truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the frame.
        remaining: usize,
    },

    /// The serializer ran past its reservation.
    #[error("packet overflows its reservation: needed {needed} bytes, {remaining} remaining")]
    Overflow {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the reservation.
        remaining: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A string or list is too long for its 16-bit length prefix.
    #[error("field length {0} does not fit a u16 prefix")]
    FieldTooLong(usize),

    /// The frame carries a different protocol id than the decoder expects.
    #[error("protocol mismatch: expected {expected}, found {found}")]
    ProtocolMismatch {
        /// Protocol id of the decoding type.
        expected: u16,
        /// Protocol id found in the frame header.
        found: u16,
    },

    /// The declared frame length disagrees with the bytes handed to the decoder.
    #[error("declared length {declared} does not match frame length {actual}")]
    LengthMismatch {
        /// Length from the frame header.
        declared: u16,
        /// Length of the slice being decoded.
        actual: usize,
    },

    /// Every field was decoded but bytes were left over in the frame.
    #[error("{remaining} trailing bytes after the last field")]
    TrailingBytes {
        /// Unread bytes at the end of the frame.
        remaining: usize,
    },

    /// Allocating space for the encoded packet failed.
    #[error("send buffer allocation failed: {0}")]
    Alloc(#[from] SendBufferError),
}

/// Errors surfaced by a [`Session`](crate::Session).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `start` was called on a session that already owns a socket.
    #[error("session already started")]
    AlreadyStarted,

    /// `send` was called before `start`.
    #[error("session not started")]
    NotStarted,

    /// The session has been disconnected.
    #[error("session disconnected")]
    Disconnected,

    /// A receive handler reported consuming more bytes than it was given.
    #[error("handler consumed {consumed} bytes but only {available} were available")]
    OverConsumed {
        /// Bytes the handler claimed to consume.
        consumed: usize,
        /// Bytes in the receive window.
        available: usize,
    },

    /// The receive buffer is full and the handler made no progress.
    #[error("receive buffer full ({capacity} bytes) with no complete frame")]
    RecvBufferFull {
        /// Fixed capacity of the receive buffer.
        capacity: usize,
    },

    /// The framing layer rejected the stream.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A packet could not be decoded.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// An I/O error occurred on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
