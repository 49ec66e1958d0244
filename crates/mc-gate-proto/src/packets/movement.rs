//! Player Position (0x0B) and Player Position & Look (0x0D).
//!
//! The 0x0D field order differs by direction: the client sends
//! `x, y, stance, z`, the server sends `x, stance, y, z`.

use bytes::{Buf, BufMut};

use crate::codec::{read_bool, read_f32, read_f64, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::packets::{id, Packet};
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub stance: f64,
    pub z: f64,
    pub on_ground: bool,
}

impl ProtoEncode for PlayerPosition {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.stance);
        buf.put_f64(self.z);
        buf.put_u8(self.on_ground as u8);
    }
}

impl ProtoDecode for PlayerPosition {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            x: read_f64(buf)?,
            y: read_f64(buf)?,
            stance: read_f64(buf)?,
            z: read_f64(buf)?,
            on_ground: read_bool(buf)?,
        })
    }
}

impl Packet for PlayerPosition {
    const ID: u8 = id::PLAYER_POSITION;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPositionLook {
    pub x: f64,
    pub y: f64,
    pub stance: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl PlayerPositionLook {
    pub fn decode(buf: &mut impl Buf, direction: Direction) -> Result<Self, ProtoError> {
        let x = read_f64(buf)?;
        let (y, stance) = match direction {
            Direction::Serverbound => (read_f64(buf)?, read_f64(buf)?),
            Direction::Clientbound => {
                let stance = read_f64(buf)?;
                (read_f64(buf)?, stance)
            }
        };
        Ok(Self {
            x,
            y,
            stance,
            z: read_f64(buf)?,
            yaw: read_f32(buf)?,
            pitch: read_f32(buf)?,
            on_ground: read_bool(buf)?,
        })
    }

    pub fn encode(&self, buf: &mut impl BufMut, direction: Direction) {
        buf.put_f64(self.x);
        match direction {
            Direction::Serverbound => {
                buf.put_f64(self.y);
                buf.put_f64(self.stance);
            }
            Direction::Clientbound => {
                buf.put_f64(self.stance);
                buf.put_f64(self.y);
            }
        }
        buf.put_f64(self.z);
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_u8(self.on_ground as u8);
    }
}
