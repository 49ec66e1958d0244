//! Chat (0x03) — Bidirectional.
//!
//! Serverbound it carries what the player typed (commands included);
//! clientbound it carries a fully rendered line such as `<Steve> hello`.

use bytes::{Buf, BufMut};

use crate::codec::{read_string16, write_string16, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::packets::{id, Packet};

/// Longest chat line a Beta client accepts.
pub const MAX_CHAT_LENGTH: usize = 119;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub message: String,
}

impl Chat {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Split the `<Name> text` form the server uses for player chat.
    pub fn player_line(&self) -> Option<(&str, &str)> {
        let rest = self.message.strip_prefix('<')?;
        let (name, text) = rest.split_once("> ")?;
        if name.is_empty() || name.contains(' ') {
            return None;
        }
        Some((name, text))
    }

    /// Split server-authored text into packets the client will accept:
    /// one per line, long lines cut at [`MAX_CHAT_LENGTH`] characters.
    pub fn wrap(text: &str) -> Vec<Chat> {
        let mut out = Vec::new();
        for line in text.lines() {
            let chars: Vec<char> = line.chars().collect();
            if chars.is_empty() {
                continue;
            }
            for chunk in chars.chunks(MAX_CHAT_LENGTH) {
                out.push(Chat::new(chunk.iter().collect::<String>()));
            }
        }
        out
    }
}

impl ProtoEncode for Chat {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        write_string16(buf, &self.message);
    }
}

impl ProtoDecode for Chat {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            message: read_string16(buf)?,
        })
    }
}

impl Packet for Chat {
    const ID: u8 = id::CHAT;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip() {
        let pkt = Chat::new("hello");
        let mut buf = BytesMut::new();
        pkt.proto_encode(&mut buf);
        let decoded = Chat::proto_decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.message, "hello");
    }

    #[test]
    fn to_bytes_layout() {
        let bytes = Chat::new("ab").to_bytes();
        assert_eq!(&bytes[..], &[0x03, 0x00, 0x02, 0x00, b'a', 0x00, b'b']);
    }

    #[test]
    fn player_line_split() {
        let chat = Chat::new("<Steve> hello there");
        assert_eq!(chat.player_line(), Some(("Steve", "hello there")));
        assert_eq!(Chat::new("Steve joined the game.").player_line(), None);
        assert_eq!(Chat::new("<> x").player_line(), None);
    }

    #[test]
    fn wrap_splits_lines_and_long_text() {
        let long = "x".repeat(MAX_CHAT_LENGTH + 5);
        let packets = Chat::wrap(&format!("first\n\n{long}"));
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].message, "first");
        assert_eq!(packets[1].message.chars().count(), MAX_CHAT_LENGTH);
        assert_eq!(packets[2].message, "xxxxx");
    }
}
