//! Login (0x01) and Handshake (0x02) — Bidirectional.
//!
//! Serverbound, the handshake carries the requested username and the login
//! repeats it together with the protocol version. Clientbound, the login's
//! first field is the player's entity id and the handshake carries the
//! connection hash.

use bytes::{Buf, BufMut};

use crate::codec::{
    read_i32, read_i64, read_i8, read_string16, write_string16, ProtoDecode, ProtoEncode,
};
use crate::error::ProtoError;
use crate::packets::{id, Packet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// Protocol version serverbound, entity id clientbound.
    pub protocol_or_entity: i32,
    pub username: String,
    pub map_seed: i64,
    pub dimension: i8,
}

impl ProtoEncode for Login {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.protocol_or_entity);
        write_string16(buf, &self.username);
        buf.put_i64(self.map_seed);
        buf.put_i8(self.dimension);
    }
}

impl ProtoDecode for Login {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            protocol_or_entity: read_i32(buf)?,
            username: read_string16(buf)?,
            map_seed: read_i64(buf)?,
            dimension: read_i8(buf)?,
        })
    }
}

impl Packet for Login {
    const ID: u8 = id::LOGIN;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Username serverbound, connection hash clientbound.
    pub username: String,
}

impl ProtoEncode for Handshake {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        write_string16(buf, &self.username);
    }
}

impl ProtoDecode for Handshake {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            username: read_string16(buf)?,
        })
    }
}

impl Packet for Handshake {
    const ID: u8 = id::HANDSHAKE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::packet_len;

    #[test]
    fn login_roundtrip() {
        let pkt = Login {
            protocol_or_entity: crate::PROTOCOL_VERSION,
            username: "Notch".into(),
            map_seed: 0,
            dimension: 0,
        };
        let bytes = pkt.to_bytes();
        assert_eq!(packet_len(&bytes).unwrap(), bytes.len());
        let decoded = Login::proto_decode(&mut &bytes[1..]).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn handshake_roundtrip() {
        let pkt = Handshake {
            username: "Notch".into(),
        };
        let bytes = pkt.to_bytes();
        let decoded = Handshake::proto_decode(&mut &bytes[1..]).unwrap();
        assert_eq!(decoded.username, "Notch");
    }
}
