//! Disconnect/Kick (0xFF) — Bidirectional.
//!
//! The server sends it to kick a client; the client sends it when quitting.
//! Either way the sender closes the socket right after.

use bytes::{Buf, BufMut};

use crate::codec::{read_string16, write_string16, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::packets::{id, Packet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Disconnect {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Whether the reason reports that one side stopped responding, which is
    /// what unattended scanners and heartbeat checkers typically trigger.
    pub fn is_timeout(&self) -> bool {
        let reason = self.reason.to_ascii_lowercase();
        reason.contains("timed out") || reason.contains("took too long")
    }
}

impl ProtoEncode for Disconnect {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        write_string16(buf, &self.reason);
    }
}

impl ProtoDecode for Disconnect {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            reason: read_string16(buf)?,
        })
    }
}

impl Packet for Disconnect {
    const ID: u8 = id::DISCONNECT;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kick_packet_bytes() {
        let bytes = Disconnect::new("Bye").to_bytes();
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(&bytes[1..3], &[0x00, 0x03]);
        assert_eq!(bytes.len(), 1 + 2 + 6);
    }

    #[test]
    fn timeout_detection() {
        assert!(Disconnect::new("Timed out").is_timeout());
        assert!(Disconnect::new("Took too long to log in").is_timeout());
        assert!(Disconnect::new("disconnect.timeout: Timed Out").is_timeout());
        assert!(!Disconnect::new("Quitting").is_timeout());
    }
}
