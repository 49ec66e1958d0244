//! Error types of the proxy binary.

use mc_gate_proto::error::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why a tunnel stopped relaying abnormally. Never escapes the tunnel task.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol desync: unknown packet id 0x{packet_id:02X} at offset {offset}")]
    UnknownPacket { packet_id: u8, offset: usize },

    #[error("protocol desync: malformed packet at offset {offset}: {source}")]
    Malformed { offset: usize, source: ProtoError },

    #[error("protocol desync: packet larger than the {capacity}-byte window")]
    PacketTooLarge { capacity: usize },
}

impl TunnelError {
    /// Desyncs get a diagnostic dump; plain I/O failures do not.
    pub fn is_desync(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("all {0} connection slots are in use")]
    Exhausted(usize),
}
