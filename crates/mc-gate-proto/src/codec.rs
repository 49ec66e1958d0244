//! Protocol encoding/decoding traits and helpers.
//!
//! Every read checks the remaining length first and reports
//! [`ProtoError::BufferTooShort`] instead of panicking, so the same decoders
//! work on a partially received stream.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;
use crate::types::ItemStack;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Fail with `BufferTooShort` unless `needed` bytes are available.
pub fn ensure(buf: &impl Buf, needed: usize) -> Result<(), ProtoError> {
    if buf.remaining() < needed {
        return Err(ProtoError::BufferTooShort {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Advance past `n` opaque bytes.
pub fn skip(buf: &mut impl Buf, n: usize) -> Result<(), ProtoError> {
    ensure(buf, n)?;
    buf.advance(n);
    Ok(())
}

pub fn read_u8(buf: &mut impl Buf) -> Result<u8, ProtoError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_i8(buf: &mut impl Buf) -> Result<i8, ProtoError> {
    ensure(buf, 1)?;
    Ok(buf.get_i8())
}

pub fn read_bool(buf: &mut impl Buf) -> Result<bool, ProtoError> {
    Ok(read_u8(buf)? != 0)
}

pub fn read_i16(buf: &mut impl Buf) -> Result<i16, ProtoError> {
    ensure(buf, 2)?;
    Ok(buf.get_i16())
}

pub fn read_i32(buf: &mut impl Buf) -> Result<i32, ProtoError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn read_i64(buf: &mut impl Buf) -> Result<i64, ProtoError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64())
}

pub fn read_f32(buf: &mut impl Buf) -> Result<f32, ProtoError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32())
}

pub fn read_f64(buf: &mut impl Buf) -> Result<f64, ProtoError> {
    ensure(buf, 8)?;
    Ok(buf.get_f64())
}

/// Read an `i16` length prefix, rejecting negative values.
pub fn read_len16(buf: &mut impl Buf) -> Result<usize, ProtoError> {
    let len = read_i16(buf)?;
    if len < 0 {
        return Err(ProtoError::NegativeLength(len as i32));
    }
    Ok(len as usize)
}

/// Read a string16 (i16 char count + UTF-16BE code units).
///
/// Unpaired surrogates are replaced rather than rejected: the proxy relays
/// the original bytes, the decoded text is only used for policy checks.
pub fn read_string16(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let len = read_len16(buf)?;
    ensure(buf, len * 2)?;
    let units: Vec<u16> = (0..len).map(|_| buf.get_u16()).collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Skip a string16 without decoding it.
pub fn skip_string16(buf: &mut impl Buf) -> Result<(), ProtoError> {
    let len = read_len16(buf)?;
    skip(buf, len * 2)
}

/// Write a string16. Text longer than `i16::MAX` code units is truncated.
pub fn write_string16(buf: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().take(i16::MAX as usize).collect();
    buf.put_i16(units.len() as i16);
    for unit in units {
        buf.put_u16(unit);
    }
}

/// Read a string8 (i16 byte count + modified UTF-8).
pub fn read_string8(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let len = read_len16(buf)?;
    ensure(buf, len)?;
    let data = buf.copy_to_bytes(len);
    Ok(String::from_utf8_lossy(&data).into_owned())
}

pub fn skip_string8(buf: &mut impl Buf) -> Result<(), ProtoError> {
    let len = read_len16(buf)?;
    skip(buf, len)
}

/// Read an item slot: `i16 id`, then `i8 count, i16 damage` unless the id is -1.
pub fn read_slot(buf: &mut impl Buf) -> Result<Option<ItemStack>, ProtoError> {
    let id = read_i16(buf)?;
    if id < 0 {
        return Ok(None);
    }
    let count = read_i8(buf)?;
    let damage = read_i16(buf)?;
    Ok(Some(ItemStack { id, count, damage }))
}

pub fn write_slot(buf: &mut impl BufMut, slot: Option<&ItemStack>) {
    match slot {
        Some(item) => {
            buf.put_i16(item.id);
            buf.put_i8(item.count);
            buf.put_i16(item.damage);
        }
        None => buf.put_i16(-1),
    }
}

/// Terminator byte of an entity metadata stream.
pub const METADATA_END: u8 = 0x7F;

/// Skip an entity metadata stream up to and including its terminator.
pub fn skip_metadata(buf: &mut impl Buf) -> Result<(), ProtoError> {
    loop {
        let header = read_u8(buf)?;
        if header == METADATA_END {
            return Ok(());
        }
        match header >> 5 {
            0 => skip(buf, 1)?,
            1 => skip(buf, 2)?,
            2 | 3 => skip(buf, 4)?,
            4 => skip_string16(buf)?,
            5 => skip(buf, 5)?,
            6 => skip(buf, 12)?,
            other => return Err(ProtoError::InvalidMetadata(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn string16_roundtrip() {
        let mut buf = BytesMut::new();
        write_string16(&mut buf, "Hello, Beta!");
        assert_eq!(buf.len(), 2 + 12 * 2);
        let result = read_string16(&mut buf.freeze()).unwrap();
        assert_eq!(result, "Hello, Beta!");
    }

    #[test]
    fn string16_is_big_endian_utf16() {
        let mut buf = BytesMut::new();
        write_string16(&mut buf, "é");
        assert_eq!(&buf[..], &[0x00, 0x01, 0x00, 0xE9]);
    }

    #[test]
    fn string16_truncated_is_incomplete() {
        let mut buf = BytesMut::new();
        write_string16(&mut buf, "Hello");
        let mut truncated = &buf[..5];
        let err = read_string16(&mut truncated).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut data: &[u8] = &[0xFF, 0xFE];
        assert!(matches!(
            read_string16(&mut data),
            Err(ProtoError::NegativeLength(-2))
        ));
    }

    #[test]
    fn string8_reads_bytes() {
        let mut data: &[u8] = &[0x00, 0x05, b'C', b'h', b'e', b's', b't'];
        assert_eq!(read_string8(&mut data).unwrap(), "Chest");
        assert!(data.is_empty());
    }

    #[test]
    fn empty_slot_is_two_bytes() {
        let mut data: &[u8] = &[0xFF, 0xFF, 0x42];
        assert_eq!(read_slot(&mut data).unwrap(), None);
        assert_eq!(data, &[0x42]);
    }

    #[test]
    fn filled_slot() {
        let mut buf = BytesMut::new();
        let item = ItemStack {
            id: 46,
            count: 64,
            damage: 0,
        };
        write_slot(&mut buf, Some(&item));
        assert_eq!(buf.len(), 5);
        assert_eq!(read_slot(&mut buf.freeze()).unwrap(), Some(item));
    }

    #[test]
    fn metadata_skips_every_type() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x00); // byte
        buf.put_u8(0);
        buf.put_u8(0x21); // short
        buf.put_i16(300);
        buf.put_u8(0x42); // int
        buf.put_i32(7);
        buf.put_u8(0x63); // float
        buf.put_f32(1.5);
        buf.put_u8(0x84); // string16
        write_string16(&mut buf, "hi");
        buf.put_u8(0xA5); // item
        buf.put_slice(&[0, 1, 2, 0, 0]);
        buf.put_u8(0xC6); // position
        buf.put_slice(&[0; 12]);
        buf.put_u8(METADATA_END);
        buf.put_u8(0x99); // next packet

        let mut data = &buf[..];
        skip_metadata(&mut data).unwrap();
        assert_eq!(data, &[0x99]);
    }

    #[test]
    fn metadata_unknown_type_is_invalid() {
        let mut data: &[u8] = &[0xE0, 0x00];
        assert!(matches!(
            skip_metadata(&mut data),
            Err(ProtoError::InvalidMetadata(7))
        ));
    }

    #[test]
    fn metadata_without_terminator_is_incomplete() {
        let mut data: &[u8] = &[0x00, 0x01];
        assert!(skip_metadata(&mut data).unwrap_err().is_incomplete());
    }
}
