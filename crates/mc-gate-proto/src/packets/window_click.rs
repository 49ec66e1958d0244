//! Window Click (0x66) — Client → Server.

use bytes::{Buf, BufMut};

use crate::codec::{read_bool, read_i16, read_i8, read_slot, write_slot, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::packets::{id, Packet};
use crate::types::ItemStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClick {
    pub window_id: i8,
    pub slot: i16,
    pub right_click: bool,
    pub action_number: i16,
    pub shift: bool,
    /// What the client believes is in the clicked slot.
    pub item: Option<ItemStack>,
}

impl ProtoEncode for WindowClick {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i8(self.window_id);
        buf.put_i16(self.slot);
        buf.put_u8(self.right_click as u8);
        buf.put_i16(self.action_number);
        buf.put_u8(self.shift as u8);
        write_slot(buf, self.item.as_ref());
    }
}

impl ProtoDecode for WindowClick {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            window_id: read_i8(buf)?,
            slot: read_i16(buf)?,
            right_click: read_bool(buf)?,
            action_number: read_i16(buf)?,
            shift: read_bool(buf)?,
            item: read_slot(buf)?,
        })
    }
}

impl Packet for WindowClick {
    const ID: u8 = id::WINDOW_CLICK;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::packet_len;

    #[test]
    fn decode_with_item() {
        let pkt = WindowClick {
            window_id: 0,
            slot: 36,
            right_click: false,
            action_number: 7,
            shift: true,
            item: Some(ItemStack {
                id: 46,
                count: 64,
                damage: 0,
            }),
        };
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), 1 + 7 + 5);
        assert_eq!(packet_len(&bytes).unwrap(), bytes.len());
        assert_eq!(WindowClick::proto_decode(&mut &bytes[1..]).unwrap(), pkt);
    }

    #[test]
    fn decode_empty_slot() {
        let mut bytes = WindowClick {
            window_id: 1,
            slot: 0,
            right_click: true,
            action_number: 1,
            shift: false,
            item: None,
        }
        .to_bytes()
        .to_vec();
        bytes.push(0x00);
        assert_eq!(packet_len(&bytes).unwrap(), 1 + 7 + 2);
    }
}
