//! Packet definitions and the layout table for Beta 1.7.3.
//!
//! [`layout`] maps every known packet id to the shape of its body, which is
//! enough to find the packet boundary without interpreting the payload.
//! Packets the proxy makes decisions about also get a typed decoder in a
//! submodule.

pub mod block_placement;
pub mod chat;
pub mod disconnect;
pub mod login;
pub mod movement;
pub mod player_digging;
pub mod window_click;

pub use block_placement::BlockPlacement;
pub use chat::Chat;
pub use disconnect::Disconnect;
pub use login::{Handshake, Login};
pub use movement::{PlayerPosition, PlayerPositionLook};
pub use player_digging::{DigStatus, PlayerDigging};
pub use window_click::WindowClick;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{self, ProtoEncode};
use crate::error::ProtoError;

/// Packet IDs.
pub mod id {
    pub const KEEP_ALIVE: u8 = 0x00;
    pub const LOGIN: u8 = 0x01;
    pub const HANDSHAKE: u8 = 0x02;
    pub const CHAT: u8 = 0x03;
    pub const TIME_UPDATE: u8 = 0x04;
    pub const ENTITY_EQUIPMENT: u8 = 0x05;
    pub const SPAWN_POSITION: u8 = 0x06;
    pub const USE_ENTITY: u8 = 0x07;
    pub const UPDATE_HEALTH: u8 = 0x08;
    pub const RESPAWN: u8 = 0x09;
    pub const PLAYER: u8 = 0x0A;
    pub const PLAYER_POSITION: u8 = 0x0B;
    pub const PLAYER_LOOK: u8 = 0x0C;
    pub const PLAYER_POSITION_LOOK: u8 = 0x0D;
    pub const PLAYER_DIGGING: u8 = 0x0E;
    pub const BLOCK_PLACEMENT: u8 = 0x0F;
    pub const HOLDING_CHANGE: u8 = 0x10;
    pub const USE_BED: u8 = 0x11;
    pub const ANIMATION: u8 = 0x12;
    pub const ENTITY_ACTION: u8 = 0x13;
    pub const NAMED_ENTITY_SPAWN: u8 = 0x14;
    pub const PICKUP_SPAWN: u8 = 0x15;
    pub const COLLECT_ITEM: u8 = 0x16;
    pub const ADD_OBJECT: u8 = 0x17;
    pub const MOB_SPAWN: u8 = 0x18;
    pub const ENTITY_PAINTING: u8 = 0x19;
    pub const STANCE_UPDATE: u8 = 0x1B;
    pub const ENTITY_VELOCITY: u8 = 0x1C;
    pub const DESTROY_ENTITY: u8 = 0x1D;
    pub const ENTITY: u8 = 0x1E;
    pub const ENTITY_RELATIVE_MOVE: u8 = 0x1F;
    pub const ENTITY_LOOK: u8 = 0x20;
    pub const ENTITY_LOOK_MOVE: u8 = 0x21;
    pub const ENTITY_TELEPORT: u8 = 0x22;
    pub const ENTITY_STATUS: u8 = 0x26;
    pub const ATTACH_ENTITY: u8 = 0x27;
    pub const ENTITY_METADATA: u8 = 0x28;
    pub const PRE_CHUNK: u8 = 0x32;
    pub const MAP_CHUNK: u8 = 0x33;
    pub const MULTI_BLOCK_CHANGE: u8 = 0x34;
    pub const BLOCK_CHANGE: u8 = 0x35;
    pub const BLOCK_ACTION: u8 = 0x36;
    pub const EXPLOSION: u8 = 0x3C;
    pub const SOUND_EFFECT: u8 = 0x3D;
    pub const NEW_STATE: u8 = 0x46;
    pub const THUNDERBOLT: u8 = 0x47;
    pub const OPEN_WINDOW: u8 = 0x64;
    pub const CLOSE_WINDOW: u8 = 0x65;
    pub const WINDOW_CLICK: u8 = 0x66;
    pub const SET_SLOT: u8 = 0x67;
    pub const WINDOW_ITEMS: u8 = 0x68;
    pub const UPDATE_PROGRESS_BAR: u8 = 0x69;
    pub const TRANSACTION: u8 = 0x6A;
    pub const UPDATE_SIGN: u8 = 0x82;
    pub const ITEM_DATA: u8 = 0x83;
    pub const INCREMENT_STATISTIC: u8 = 0xC8;
    pub const DISCONNECT: u8 = 0xFF;
}

/// A packet with a fixed id that can be serialized on its own.
pub trait Packet: ProtoEncode {
    const ID: u8;

    /// Serialize id + body into a standalone buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(Self::ID);
        self.proto_encode(&mut buf);
        buf.freeze()
    }
}

/// A primitive field in a typed walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String16,
    String8,
}

impl Field {
    fn skip(self, buf: &mut impl Buf) -> Result<(), ProtoError> {
        match self {
            Self::Bool | Self::Byte => codec::skip(buf, 1),
            Self::Short => codec::skip(buf, 2),
            Self::Int | Self::Float => codec::skip(buf, 4),
            Self::Long | Self::Double => codec::skip(buf, 8),
            Self::String16 => codec::skip_string16(buf),
            Self::String8 => codec::skip_string8(buf),
        }
    }
}

/// Packets whose length depends on a parsed count or flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    BlockPlacement,
    AddObject,
    MobSpawn,
    EntityMetadata,
    MapChunk,
    MultiBlockChange,
    Explosion,
    WindowClick,
    SetSlot,
    WindowItems,
    ItemData,
}

impl Special {
    fn skip(self, buf: &mut impl Buf) -> Result<(), ProtoError> {
        match self {
            Self::BlockPlacement => {
                codec::skip(buf, 10)?;
                codec::read_slot(buf)?;
            }
            Self::AddObject => {
                codec::skip(buf, 17)?;
                if codec::read_i32(buf)? > 0 {
                    codec::skip(buf, 6)?;
                }
            }
            Self::MobSpawn => {
                codec::skip(buf, 19)?;
                codec::skip_metadata(buf)?;
            }
            Self::EntityMetadata => {
                codec::skip(buf, 4)?;
                codec::skip_metadata(buf)?;
            }
            Self::MapChunk => {
                codec::skip(buf, 13)?;
                let size = codec::read_i32(buf)?;
                if size < 0 {
                    return Err(ProtoError::NegativeLength(size));
                }
                codec::skip(buf, size as usize)?;
            }
            Self::MultiBlockChange => {
                codec::skip(buf, 8)?;
                let count = codec::read_len16(buf)?;
                codec::skip(buf, count * 4)?;
            }
            Self::Explosion => {
                codec::skip(buf, 28)?;
                let records = codec::read_i32(buf)?;
                if records < 0 {
                    return Err(ProtoError::NegativeLength(records));
                }
                codec::skip(buf, records as usize * 3)?;
            }
            Self::WindowClick => {
                codec::skip(buf, 7)?;
                codec::read_slot(buf)?;
            }
            Self::SetSlot => {
                codec::skip(buf, 3)?;
                codec::read_slot(buf)?;
            }
            Self::WindowItems => {
                codec::skip(buf, 1)?;
                let count = codec::read_len16(buf)?;
                for _ in 0..count {
                    codec::read_slot(buf)?;
                }
            }
            Self::ItemData => {
                codec::skip(buf, 4)?;
                let len = codec::read_u8(buf)? as usize;
                codec::skip(buf, len)?;
            }
        }
        Ok(())
    }
}

/// Shape of a packet body (everything after the id byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Opaque body of a fixed size.
    Fixed(usize),
    /// A sequence of primitive fields.
    Fields(&'static [Field]),
    /// Variable repetition or conditional fields.
    Special(Special),
}

impl Layout {
    /// Advance `buf` past one packet body of this shape.
    pub fn skip(self, buf: &mut impl Buf) -> Result<(), ProtoError> {
        match self {
            Self::Fixed(n) => codec::skip(buf, n),
            Self::Fields(fields) => fields.iter().try_for_each(|f| f.skip(buf)),
            Self::Special(special) => special.skip(buf),
        }
    }
}

use Field::*;

const LOGIN_FIELDS: &[Field] = &[Int, String16, Long, Byte];
const STRING16_ONLY: &[Field] = &[String16];
const POSITION_FIELDS: &[Field] = &[Double, Double, Double, Double, Bool];
const POSITION_LOOK_FIELDS: &[Field] = &[Double, Double, Double, Double, Float, Float, Bool];
const DIGGING_FIELDS: &[Field] = &[Byte, Int, Byte, Int, Byte];
const NAMED_ENTITY_FIELDS: &[Field] = &[Int, String16, Int, Int, Int, Byte, Byte, Short];
const PAINTING_FIELDS: &[Field] = &[Int, String16, Int, Int, Int, Int];
const OPEN_WINDOW_FIELDS: &[Field] = &[Byte, Byte, String8, Byte];
const UPDATE_SIGN_FIELDS: &[Field] = &[Int, Short, Int, String16, String16, String16, String16];

/// Look up the body layout of a packet id. `None` means the id does not
/// exist in this protocol version.
pub fn layout(packet_id: u8) -> Option<Layout> {
    use Layout::{Fields as F, Fixed as X, Special as S};

    let layout = match packet_id {
        id::KEEP_ALIVE => X(0),
        id::LOGIN => F(LOGIN_FIELDS),
        id::HANDSHAKE | id::CHAT | id::DISCONNECT => F(STRING16_ONLY),
        id::TIME_UPDATE => X(8),
        id::ENTITY_EQUIPMENT => X(10),
        id::SPAWN_POSITION => X(12),
        id::USE_ENTITY => X(9),
        id::UPDATE_HEALTH => X(2),
        id::RESPAWN | id::PLAYER => X(1),
        id::PLAYER_POSITION => F(POSITION_FIELDS),
        id::PLAYER_LOOK => X(9),
        id::PLAYER_POSITION_LOOK => F(POSITION_LOOK_FIELDS),
        id::PLAYER_DIGGING => F(DIGGING_FIELDS),
        id::BLOCK_PLACEMENT => S(Special::BlockPlacement),
        id::HOLDING_CHANGE => X(2),
        id::USE_BED => X(14),
        id::ANIMATION | id::ENTITY_ACTION => X(5),
        id::NAMED_ENTITY_SPAWN => F(NAMED_ENTITY_FIELDS),
        id::PICKUP_SPAWN => X(24),
        id::COLLECT_ITEM => X(8),
        id::ADD_OBJECT => S(Special::AddObject),
        id::MOB_SPAWN => S(Special::MobSpawn),
        id::ENTITY_PAINTING => F(PAINTING_FIELDS),
        id::STANCE_UPDATE => X(18),
        id::ENTITY_VELOCITY => X(10),
        id::DESTROY_ENTITY | id::ENTITY => X(4),
        id::ENTITY_RELATIVE_MOVE => X(7),
        id::ENTITY_LOOK => X(6),
        id::ENTITY_LOOK_MOVE => X(9),
        id::ENTITY_TELEPORT => X(18),
        id::ENTITY_STATUS => X(5),
        id::ATTACH_ENTITY => X(8),
        id::ENTITY_METADATA => S(Special::EntityMetadata),
        id::PRE_CHUNK => X(9),
        id::MAP_CHUNK => S(Special::MapChunk),
        id::MULTI_BLOCK_CHANGE => S(Special::MultiBlockChange),
        id::BLOCK_CHANGE => X(11),
        id::BLOCK_ACTION => X(12),
        id::EXPLOSION => S(Special::Explosion),
        id::SOUND_EFFECT | id::THUNDERBOLT => X(17),
        id::NEW_STATE => X(1),
        id::OPEN_WINDOW => F(OPEN_WINDOW_FIELDS),
        id::CLOSE_WINDOW => X(1),
        id::WINDOW_CLICK => S(Special::WindowClick),
        id::SET_SLOT => S(Special::SetSlot),
        id::WINDOW_ITEMS => S(Special::WindowItems),
        id::UPDATE_PROGRESS_BAR => X(5),
        id::TRANSACTION => X(4),
        id::UPDATE_SIGN => F(UPDATE_SIGN_FIELDS),
        id::ITEM_DATA => S(Special::ItemData),
        id::INCREMENT_STATISTIC => X(5),
        _ => return None,
    };
    Some(layout)
}

/// Measure the packet at the start of `data` (id byte included).
///
/// Returns the total length in bytes, `BufferTooShort` if `data` ends before
/// the packet does, or `UnknownPacketId` for an id missing from the table.
pub fn packet_len(data: &[u8]) -> Result<usize, ProtoError> {
    let mut buf = data;
    let packet_id = codec::read_u8(&mut buf)?;
    let layout = layout(packet_id).ok_or(ProtoError::UnknownPacketId(packet_id))?;
    layout.skip(&mut buf)?;
    Ok(data.len() - buf.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_slot, write_string16};
    use crate::types::ItemStack;

    #[test]
    fn keep_alive_is_one_byte() {
        assert_eq!(packet_len(&[id::KEEP_ALIVE, 0x99]).unwrap(), 1);
    }

    #[test]
    fn fixed_layout_needs_whole_body() {
        let data = [id::TIME_UPDATE, 0, 0, 0, 0];
        assert!(packet_len(&data).unwrap_err().is_incomplete());
        let data = [id::TIME_UPDATE, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(packet_len(&data).unwrap(), 9);
    }

    #[test]
    fn unknown_id() {
        assert!(matches!(
            packet_len(&[0xEE, 0, 0]),
            Err(ProtoError::UnknownPacketId(0xEE))
        ));
        assert!(layout(0x1A).is_none());
    }

    #[test]
    fn empty_input_is_incomplete() {
        assert!(packet_len(&[]).unwrap_err().is_incomplete());
    }

    #[test]
    fn sign_update_walks_four_strings() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::UPDATE_SIGN);
        buf.put_i32(1);
        buf.put_i16(64);
        buf.put_i32(-1);
        for line in ["a", "bb", "", "dddd"] {
            write_string16(&mut buf, line);
        }
        let expected = buf.len();
        buf.put_u8(0x00);
        assert_eq!(packet_len(&buf).unwrap(), expected);
    }

    #[test]
    fn window_items_repeats_slots() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::WINDOW_ITEMS);
        buf.put_i8(0);
        buf.put_i16(3);
        write_slot(&mut buf, None);
        write_slot(
            &mut buf,
            Some(&ItemStack {
                id: 1,
                count: 64,
                damage: 0,
            }),
        );
        write_slot(&mut buf, None);
        assert_eq!(packet_len(&buf).unwrap(), 1 + 3 + 2 + 5 + 2);
        assert!(packet_len(&buf[..buf.len() - 1]).unwrap_err().is_incomplete());
    }

    #[test]
    fn map_chunk_uses_declared_size() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::MAP_CHUNK);
        buf.put_slice(&[0; 13]);
        buf.put_i32(5);
        buf.put_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(packet_len(&buf).unwrap(), 1 + 13 + 4 + 5);
    }

    #[test]
    fn map_chunk_negative_size_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::MAP_CHUNK);
        buf.put_slice(&[0; 13]);
        buf.put_i32(-1);
        assert!(matches!(
            packet_len(&buf),
            Err(ProtoError::NegativeLength(-1))
        ));
    }

    #[test]
    fn add_object_flag_adds_velocity() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::ADD_OBJECT);
        buf.put_slice(&[0; 17]);
        buf.put_i32(0);
        assert_eq!(packet_len(&buf).unwrap(), 22);

        let mut buf = BytesMut::new();
        buf.put_u8(id::ADD_OBJECT);
        buf.put_slice(&[0; 17]);
        buf.put_i32(12);
        buf.put_slice(&[0; 6]);
        assert_eq!(packet_len(&buf).unwrap(), 28);
    }

    #[test]
    fn multi_block_change_and_explosion() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::MULTI_BLOCK_CHANGE);
        buf.put_slice(&[0; 8]);
        buf.put_i16(2);
        buf.put_slice(&[0; 8]);
        assert_eq!(packet_len(&buf).unwrap(), 19);

        let mut buf = BytesMut::new();
        buf.put_u8(id::EXPLOSION);
        buf.put_slice(&[0; 28]);
        buf.put_i32(2);
        buf.put_slice(&[0; 6]);
        assert_eq!(packet_len(&buf).unwrap(), 39);
    }

    #[test]
    fn mob_spawn_includes_metadata() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::MOB_SPAWN);
        buf.put_slice(&[0; 19]);
        buf.put_u8(0x00);
        buf.put_u8(0x01);
        buf.put_u8(codec::METADATA_END);
        assert_eq!(packet_len(&buf).unwrap(), 23);
    }

    #[test]
    fn item_data_uses_unsigned_length() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::ITEM_DATA);
        buf.put_slice(&[0; 4]);
        buf.put_u8(200);
        buf.put_slice(&[0; 200]);
        assert_eq!(packet_len(&buf).unwrap(), 206);
    }

    #[test]
    fn open_window_title_is_string8() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::OPEN_WINDOW);
        buf.put_i8(1);
        buf.put_i8(0);
        buf.put_i16(5);
        buf.put_slice(b"Chest");
        buf.put_i8(27);
        assert_eq!(packet_len(&buf).unwrap(), 11);
    }

    #[test]
    fn synthesized_packet_starts_with_id() {
        let bytes = Chat::new("hi").to_bytes();
        assert_eq!(bytes[0], id::CHAT);
        assert_eq!(packet_len(&bytes).unwrap(), bytes.len());
    }
}
