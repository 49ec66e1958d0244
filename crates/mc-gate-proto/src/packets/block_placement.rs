//! Block Placement (0x0F) — Client → Server.
//!
//! Sent on every right click: placing a block, using an item, or opening a
//! chest. A direction of -1 means the item was used in the air and the
//! coordinates are meaningless.

use bytes::{Buf, BufMut};

use crate::codec::{read_i32, read_i8, read_slot, write_slot, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::packets::{id, Packet};
use crate::types::{BlockPos, ItemStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlacement {
    pub x: i32,
    pub y: i8,
    pub z: i32,
    pub direction: i8,
    /// The held item, `None` for an empty hand.
    pub item: Option<ItemStack>,
}

impl BlockPlacement {
    /// The block that was clicked.
    pub fn position(&self) -> BlockPos {
        BlockPos::new(self.x, self.y as i32, self.z)
    }

    pub fn is_use_in_air(&self) -> bool {
        self.direction == -1
    }

    /// Id of the held block or item, if any.
    pub fn block_id(&self) -> Option<i16> {
        self.item.map(|item| item.id)
    }
}

impl ProtoEncode for BlockPlacement {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.x);
        buf.put_i8(self.y);
        buf.put_i32(self.z);
        buf.put_i8(self.direction);
        write_slot(buf, self.item.as_ref());
    }
}

impl ProtoDecode for BlockPlacement {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            x: read_i32(buf)?,
            y: read_i8(buf)?,
            z: read_i32(buf)?,
            direction: read_i8(buf)?,
            item: read_slot(buf)?,
        })
    }
}

impl Packet for BlockPlacement {
    const ID: u8 = id::BLOCK_PLACEMENT;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::packet_len;

    #[test]
    fn empty_hand_is_short() {
        let pkt = BlockPlacement {
            x: 1,
            y: 2,
            z: 3,
            direction: 1,
            item: None,
        };
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), 1 + 10 + 2);
        assert_eq!(packet_len(&bytes).unwrap(), bytes.len());
        assert_eq!(BlockPlacement::proto_decode(&mut &bytes[1..]).unwrap(), pkt);
    }

    #[test]
    fn held_block() {
        let pkt = BlockPlacement {
            x: 1,
            y: 2,
            z: 3,
            direction: 1,
            item: Some(ItemStack {
                id: 46,
                count: 1,
                damage: 0,
            }),
        };
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), 1 + 10 + 5);
        assert_eq!(packet_len(&bytes).unwrap(), bytes.len());
        let decoded = BlockPlacement::proto_decode(&mut &bytes[1..]).unwrap();
        assert_eq!(decoded.block_id(), Some(46));
        assert!(!decoded.is_use_in_air());
    }
}
