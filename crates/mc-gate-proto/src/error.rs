//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    /// Not enough bytes buffered yet. Streaming callers retry once more
    /// data has arrived; it is only fatal for a complete datagram.
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("unknown packet id: 0x{0:02X}")]
    UnknownPacketId(u8),

    #[error("invalid entity metadata type {0}")]
    InvalidMetadata(u8),
}

impl ProtoError {
    /// Whether this error only means "wait for more bytes".
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::BufferTooShort { .. })
    }
}
