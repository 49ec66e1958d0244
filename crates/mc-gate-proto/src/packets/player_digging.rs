//! Player Digging (0x0E) — Client → Server.

use bytes::{Buf, BufMut};

use crate::codec::{read_i32, read_i8, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::packets::{id, Packet};
use crate::types::BlockPos;

/// Dig status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigStatus {
    Started,
    Finished,
    DropItem,
    /// Any status we don't handle specifically.
    Other(i8),
}

impl DigStatus {
    fn from_i8(v: i8) -> Self {
        match v {
            0 => Self::Started,
            2 => Self::Finished,
            4 => Self::DropItem,
            other => Self::Other(other),
        }
    }

    fn to_i8(self) -> i8 {
        match self {
            Self::Started => 0,
            Self::Finished => 2,
            Self::DropItem => 4,
            Self::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDigging {
    pub status: DigStatus,
    pub x: i32,
    pub y: i8,
    pub z: i32,
    pub face: i8,
}

impl PlayerDigging {
    pub fn position(&self) -> BlockPos {
        BlockPos::new(self.x, self.y as i32, self.z)
    }

    /// Same target, different status.
    pub fn with_status(&self, status: DigStatus) -> Self {
        Self { status, ..*self }
    }
}

impl ProtoEncode for PlayerDigging {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i8(self.status.to_i8());
        buf.put_i32(self.x);
        buf.put_i8(self.y);
        buf.put_i32(self.z);
        buf.put_i8(self.face);
    }
}

impl ProtoDecode for PlayerDigging {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            status: DigStatus::from_i8(read_i8(buf)?),
            x: read_i32(buf)?,
            y: read_i8(buf)?,
            z: read_i32(buf)?,
            face: read_i8(buf)?,
        })
    }
}

impl Packet for PlayerDigging {
    const ID: u8 = id::PLAYER_DIGGING;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_negative_coordinates() {
        let pkt = PlayerDigging {
            status: DigStatus::Started,
            x: 10,
            y: 64,
            z: -3,
            face: 1,
        };
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), 12);
        let decoded = PlayerDigging::proto_decode(&mut &bytes[1..]).unwrap();
        assert_eq!(decoded, pkt);
        assert_eq!(decoded.position(), BlockPos::new(10, 64, -3));
    }

    #[test]
    fn unknown_status_is_preserved() {
        let pkt = PlayerDigging {
            status: DigStatus::Other(3),
            x: 0,
            y: 0,
            z: 0,
            face: 0,
        };
        let bytes = pkt.to_bytes();
        assert_eq!(bytes[1], 3);
        let decoded = PlayerDigging::proto_decode(&mut &bytes[1..]).unwrap();
        assert_eq!(decoded.status, DigStatus::Other(3));
    }
}
