//! Minecraft Beta 1.7.3 (protocol 14) wire codec and packet definitions.
//!
//! Only the packets a relaying proxy needs to interpret are decoded into
//! typed structs; everything else is described by the layout table in
//! [`packets`] so its length can be walked without interpretation.

pub mod codec;
pub mod error;
pub mod packets;
pub mod types;

/// Protocol version spoken by Beta 1.7.3 clients and servers.
pub const PROTOCOL_VERSION: i32 = 14;
